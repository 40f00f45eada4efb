use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::{temp, ArgKind, ArgumentSlot, SlotIndex, SlotValue, TempRoute};

/// A problem with one slot that an editor can show without aborting anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    MissingValue,
    PrefixTooShort(String),
    InputFileMissing(String),
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::MissingValue => f.write_str("no value set"),
            Issue::PrefixTooShort(prefix) => write!(
                f,
                "temp file prefix \"{prefix}\" is shorter than {} characters",
                temp::MIN_PREFIX_LEN
            ),
            Issue::InputFileMissing(path) => write!(f, "input file does not exist: {path}"),
        }
    }
}

/// Receives validation results, one slot at a time.
pub trait ValidationHandler {
    /// The slot at `index` has no problems.
    fn clear(&mut self, index: SlotIndex);
    /// The slot at `index` has `issue`.
    fn set(&mut self, index: SlotIndex, issue: Issue);
}

/// Handler that simply remembers the current issue for each slot.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    issues: BTreeMap<SlotIndex, Issue>,
}

impl ValidationHandler for ValidationReport {
    fn clear(&mut self, index: SlotIndex) {
        self.issues.remove(&index);
    }

    fn set(&mut self, index: SlotIndex, issue: Issue) {
        self.issues.insert(index, issue);
    }
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn get(&self, index: SlotIndex) -> Option<&Issue> {
        self.issues.get(&index)
    }

    /// Iterate through issues in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &Issue)> {
        self.issues.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check a single slot.
pub(crate) fn check_slot(slot: &ArgumentSlot) -> Option<Issue> {
    match slot.kind() {
        ArgKind::InputFile => match slot.value() {
            // produced by another invocation; can't exist yet.
            SlotValue::Reference(_) => None,
            SlotValue::Literal(path) if path.is_empty() => Some(Issue::MissingValue),
            SlotValue::Literal(path) if !Path::new(path).exists() => {
                Some(Issue::InputFileMissing(path.clone()))
            }
            SlotValue::Literal(_) => None,
        },
        ArgKind::OutputFile => match slot.temp_route() {
            Some(TempRoute {
                prefix: Some(prefix),
            }) if !temp::prefix_is_valid(prefix) => Some(Issue::PrefixTooShort(prefix.clone())),
            Some(_) => None,
            None => check_present(slot),
        },
        ArgKind::PublishAddress | ArgKind::SubscribeAddress | ArgKind::PlainText => {
            check_present(slot)
        }
    }
}

fn check_present(slot: &ArgumentSlot) -> Option<Issue> {
    match slot.value() {
        SlotValue::Literal(s) if s.is_empty() => Some(Issue::MissingValue),
        _ => None,
    }
}
