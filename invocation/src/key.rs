use std::fmt;

use crate::{Error, InvocationId};

/// 1-based position of an argument slot within its invocation.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotIndex(u16);

impl SlotIndex {
    /// Largest index a slot can have.
    pub const MAX: usize = u16::MAX as usize;

    /// Create a slot index from a 1-based position.
    /// Zero and anything that doesn't fit are rejected.
    pub fn new(index: usize) -> Result<Self, Error> {
        match u16::try_from(index) {
            Ok(i) if i > 0 => Ok(Self(i)),
            _ => Err(Error::InvalidSlotIndex(index)),
        }
    }

    /// Index of the slot at 0-based `position`.
    /// Callers guarantee `position < SlotIndex::MAX`.
    pub(crate) fn from_position(position: usize) -> Self {
        debug_assert!(position < Self::MAX);
        Self(position as u16 + 1)
    }

    /// The 1-based index.
    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// The 0-based position in the slot list.
    pub fn position(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one argument slot: the owning invocation's identity plus the slot index.
///
/// Keys compare by identity, so two invocations with identical configuration
/// still produce different keys for the same index.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArgumentKey {
    invocation: InvocationId,
    index: SlotIndex,
}

impl ArgumentKey {
    pub fn new(invocation: InvocationId, index: SlotIndex) -> Self {
        Self { invocation, index }
    }

    #[inline]
    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    #[inline]
    pub fn index(&self) -> SlotIndex {
        self.index
    }
}

impl fmt::Display for ArgumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.invocation, self.index)
    }
}
