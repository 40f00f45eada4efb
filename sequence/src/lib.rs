use invocation::{ArgKind, ArgumentKey, InvocationId};

mod relation_map;
pub use relation_map::RelationMap;

mod observer;
pub use observer::{LogObserver, SequenceObserver};

mod sequence;
pub use sequence::{InvocationSequence, SequenceState};

mod graph;
pub use graph::DependencyGraph;

mod composite;
pub use composite::MacroInvocation;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invocation {0} is already a member")]
    DuplicateInvocation(InvocationId),
    #[error("Invocation {0} is not a member")]
    UnknownInvocation(InvocationId),
    #[error("Position {position} is out of range for a sequence of {len}")]
    PositionOutOfRange { position: usize, len: usize },
    #[error("Can't relate {0} to {1}: both belong to the same invocation")]
    SelfRelation(ArgumentKey, ArgumentKey),
    #[error("{0} is a {1} slot, not an input")]
    NotInput(ArgumentKey, ArgKind),
    #[error("{0} is a {1} slot, not an output")]
    NotOutput(ArgumentKey, ArgKind),
    #[error("Invocation {0} can't wait for itself")]
    SelfEdge(InvocationId),
    #[error("Run order contains a cycle through {0}")]
    Cycle(InvocationId),
    #[error(transparent)]
    Invocation(#[from] invocation::Error),
}
