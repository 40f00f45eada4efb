use std::path::PathBuf;

mod id;
pub use id::{InvocationId, RunNumber};

mod key;
pub use key::{ArgumentKey, SlotIndex};

mod slot;
pub use slot::{ArgKind, ArgumentSlot, Direction, Marker, SlotValue, TempRoute};

mod module;
pub use module::{ModuleKind, ModuleRef, ProcessOptions};

mod result;
pub use result::{ExecutionResult, ProcessStatus, RunState};

mod runtime;
pub use runtime::Runtime;

pub mod temp;

mod validate;
pub use validate::{Issue, ValidationHandler, ValidationReport};

mod process_spec;
pub use process_spec::ProcessSpec;

mod invocation;
pub use invocation::{ModuleInvocation, ReferenceLookup};

mod errors;
pub use errors::{AggregatedErrors, Errors};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{run} \"{name}\": {source}")]
    Invocation {
        run: RunNumber,
        name: String,
        source: Box<Error>,
    },
    #[error("Slot index must be between 1 and {}, got {0}", SlotIndex::MAX)]
    InvalidSlotIndex(usize),
    #[error("Slot {index} is out of range; invocation has {len} slots")]
    SlotOutOfRange { index: SlotIndex, len: usize },
    #[error("Too many argument slots: {0}")]
    TooManySlots(usize),
    #[error("Slot \"{0}\" is fixed and can't be changed")]
    FixedSlot(String),
    #[error("Only parametric output file slots can be routed to temp, not {0}")]
    NotRoutable(ArgKind),
    #[error("A slot can't reference its own invocation ({0})")]
    SelfReference(ArgumentKey),
    #[error("Slot {index} references {key}, which doesn't exist")]
    DanglingReference { index: SlotIndex, key: ArgumentKey },
    #[error("Slot {index} references {key}, which has not been resolved yet")]
    UnresolvedReference { index: SlotIndex, key: ArgumentKey },
    #[error("Slot {index} ({kind}) has no value")]
    EmptyArgument { index: SlotIndex, kind: ArgKind },
    #[error("Unable to create temp file for slot {index}: {source}")]
    TempFile {
        index: SlotIndex,
        source: std::io::Error,
    },
    #[error("Module location is not a local file: {0}")]
    ModuleNotLocal(String),
    #[error("Module file does not exist: {0:?}")]
    ModuleMissing(PathBuf),
    #[error("Module location is not a file: {0:?}")]
    ModuleNotFile(PathBuf),
    #[error("No entry symbol given for {0} module")]
    MissingEntry(ModuleKind),
    #[error("No interpreter configured for {0} modules")]
    InterpreterNotConfigured(ModuleKind),
    #[error("Unable to build library path: {0}")]
    LibraryPath(String),
    #[error("Path is not valid UTF-8: {0:?}")]
    PathEncoding(PathBuf),
}

impl Error {
    /// The underlying error, without any invocation context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Invocation { source, .. } => source.root(),
            e => e,
        }
    }
}
