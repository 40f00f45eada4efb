//! Ids for invocations and their position in a sequence.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! id {
    ($name:ident, $ty:ty) => {
        #[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name($ty);

        impl From<$name> for usize {
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl From<$name> for $ty {
            fn from(id: $name) -> $ty {
                id.0
            }
        }

        impl From<$ty> for $name {
            fn from(val: $ty) -> $name {
                Self(val)
            }
        }
    };
}

id!(InvocationId, u32);
id!(RunNumber, u32);

// id 0 is never handed out, so a defaulted id can't collide with a real one.
static NEXT_INVOCATION_ID: AtomicU32 = AtomicU32::new(1);

impl InvocationId {
    /// Allocate an identity that no other invocation in this process shares.
    pub(crate) fn fresh() -> Self {
        Self(NEXT_INVOCATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv{}", self.0)
    }
}

impl RunNumber {
    /// Run number of an invocation that hasn't been added to a sequence.
    pub const UNASSIGNED: RunNumber = RunNumber(0);

    /// Run number for the invocation at 0-based `position` in a sequence.
    pub fn for_position(position: usize) -> Self {
        Self(position as u32 + 1)
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
