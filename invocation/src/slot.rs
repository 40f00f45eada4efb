use std::fmt;

use crate::{ArgumentKey, Error};

/// What an argument slot carries.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ArgKind {
    InputFile,
    OutputFile,
    PublishAddress,
    SubscribeAddress,
    PlainText,
}

/// Which side of a data-flow edge a slot kind can sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// consumes a value produced elsewhere
    Input,
    /// produces a value others can consume
    Output,
    /// never linked
    Neutral,
}

impl ArgKind {
    pub fn direction(self) -> Direction {
        match self {
            ArgKind::InputFile | ArgKind::SubscribeAddress => Direction::Input,
            ArgKind::OutputFile | ArgKind::PublishAddress => Direction::Output,
            ArgKind::PlainText => Direction::Neutral,
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::InputFile => "input file",
            ArgKind::OutputFile => "output file",
            ArgKind::PublishAddress => "publish address",
            ArgKind::SubscribeAddress => "subscribe address",
            ArgKind::PlainText => "plain text",
        };
        f.write_str(name)
    }
}

/// Marks a slot as parametric, and says what sort of value it expects.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Marker {
    Any,
    File,
    TempFile,
    Csv,
    Xml,
    Text,
}

impl Marker {
    /// File extension (with leading dot) for temp files created for this marker.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Marker::Csv => Some(".csv"),
            Marker::Xml => Some(".xml"),
            Marker::Text => Some(".txt"),
            Marker::Any | Marker::File | Marker::TempFile => None,
        }
    }
}

/// Current value of a slot: either a literal string,
/// or a reference to another invocation's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Literal(String),
    Reference(ArgumentKey),
}

impl SlotValue {
    #[inline]
    pub fn literal(&self) -> Option<&str> {
        match self {
            SlotValue::Literal(s) => Some(s),
            SlotValue::Reference(_) => None,
        }
    }

    #[inline]
    pub fn reference(&self) -> Option<ArgumentKey> {
        match self {
            SlotValue::Reference(key) => Some(*key),
            SlotValue::Literal(_) => None,
        }
    }
}

impl From<&str> for SlotValue {
    fn from(s: &str) -> Self {
        SlotValue::Literal(s.to_owned())
    }
}

impl From<String> for SlotValue {
    fn from(s: String) -> Self {
        SlotValue::Literal(s)
    }
}

impl From<ArgumentKey> for SlotValue {
    fn from(key: ArgumentKey) -> Self {
        SlotValue::Reference(key)
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Literal(s) => write!(f, "\"{s}\""),
            SlotValue::Reference(key) => write!(f, "-> {key}"),
        }
    }
}

/// Output slots routed to temp get a fresh temp file as their value at run time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempRoute {
    /// Filename prefix for the temp file.
    pub prefix: Option<String>,
}

/// One declared argument of a module invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSlot {
    kind: ArgKind,
    description: String,
    /// `None` for fixed slots.
    marker: Option<Marker>,
    value: SlotValue,
    /// the literal this slot held before it was pointed at another slot.
    last_literal: String,
    temp_route: Option<TempRoute>,
}

impl ArgumentSlot {
    /// A slot whose value is set at definition time and can't be overridden.
    pub fn fixed(kind: ArgKind, description: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            kind,
            description: description.into(),
            marker: None,
            last_literal: value.clone(),
            value: SlotValue::Literal(value),
            temp_route: None,
        }
    }

    /// A slot whose value can be changed, or pointed at another slot.
    pub fn parametric(
        kind: ArgKind,
        description: impl Into<String>,
        marker: Marker,
        value: impl Into<String>,
    ) -> Self {
        let mut slot = Self::fixed(kind, description, value);
        slot.marker = Some(marker);
        slot
    }

    /// Route this slot's value to a fresh temp file at run time.
    /// Only parametric output-file slots can be routed.
    pub fn routed_to_temp(mut self, prefix: Option<String>) -> Result<Self, Error> {
        if self.kind != ArgKind::OutputFile || self.is_fixed() {
            return Err(Error::NotRoutable(self.kind));
        }
        self.temp_route = Some(TempRoute { prefix });
        Ok(self)
    }

    #[inline]
    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// True if this slot's value can't be overridden after definition.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.marker.is_none()
    }

    #[inline]
    pub fn value(&self) -> &SlotValue {
        &self.value
    }

    /// The current value, if it is a literal.
    #[inline]
    pub fn literal(&self) -> Option<&str> {
        self.value.literal()
    }

    /// The literal to show for this slot, even while it holds a reference.
    pub fn last_literal(&self) -> &str {
        &self.last_literal
    }

    #[inline]
    pub fn temp_route(&self) -> Option<&TempRoute> {
        self.temp_route.as_ref()
    }

    #[inline]
    pub fn is_routed_to_temp(&self) -> bool {
        self.temp_route.is_some()
    }

    /// Set the current value. Fails on fixed slots.
    pub fn set_value(&mut self, value: SlotValue) -> Result<(), Error> {
        if self.is_fixed() {
            return Err(Error::FixedSlot(self.description.clone()));
        }
        if let SlotValue::Literal(s) = &value {
            self.last_literal.clone_from(s);
        }
        self.value = value;
        Ok(())
    }

    /// Replace a reference with the literal this slot held before it.
    /// Returns the reference that was removed, if there was one.
    pub fn restore_literal(&mut self) -> Option<ArgumentKey> {
        let key = self.value.reference()?;
        self.value = SlotValue::Literal(self.last_literal.clone());
        Some(key)
    }

    /// Commit a resolved value, bypassing the fixed check
    /// (used when temp files or references are resolved at run time).
    pub(crate) fn resolve_to(&mut self, literal: String) {
        self.last_literal.clone_from(&literal);
        self.value = SlotValue::Literal(literal);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{InvocationId, SlotIndex};

    fn key() -> ArgumentKey {
        ArgumentKey::new(InvocationId::fresh(), SlotIndex::new(1).unwrap())
    }

    #[test]
    fn test_fixed_slots_reject_values() {
        let mut slot = ArgumentSlot::fixed(ArgKind::PlainText, "mode", "fast");
        assert!(slot.is_fixed());
        assert!(slot.set_value("slow".into()).is_err());
        assert_eq!(Some("fast"), slot.literal());
    }

    #[test]
    fn test_reference_remembers_literal() {
        let mut slot = ArgumentSlot::parametric(ArgKind::InputFile, "in", Marker::Csv, "/tmp/a.csv");
        let k = key();
        slot.set_value(k.into()).unwrap();
        assert_eq!(Some(k), slot.value().reference());
        assert_eq!("/tmp/a.csv", slot.last_literal());

        assert_eq!(Some(k), slot.restore_literal());
        assert_eq!(Some("/tmp/a.csv"), slot.literal());
        assert_eq!(None, slot.restore_literal());
    }

    #[test]
    fn test_only_parametric_outputs_route_to_temp() {
        let out = ArgumentSlot::parametric(ArgKind::OutputFile, "out", Marker::Xml, "");
        assert!(out.routed_to_temp(Some("pre".to_owned())).is_ok());

        let fixed = ArgumentSlot::fixed(ArgKind::OutputFile, "out", "/tmp/x");
        assert!(fixed.routed_to_temp(None).is_err());

        let input = ArgumentSlot::parametric(ArgKind::InputFile, "in", Marker::Csv, "");
        assert!(input.routed_to_temp(None).is_err());
    }

    #[test]
    fn test_directions() {
        assert_eq!(Direction::Input, ArgKind::SubscribeAddress.direction());
        assert_eq!(Direction::Output, ArgKind::PublishAddress.direction());
        assert_eq!(Direction::Neutral, ArgKind::PlainText.direction());
    }
}
