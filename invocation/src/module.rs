use std::fmt;
use std::path::PathBuf;

use crate::Error;

const FILE_SCHEME: &str = "file://";
const SCHEME_DELIM: &str = "://";

/// The three sorts of module we know how to launch.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ModuleKind {
    /// a packaged program with its own entry symbol
    Packaged,
    /// a script run by the macro interpreter
    Macro,
    /// a declarative filter definition run by the filter interpreter
    Filter,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::Packaged => "packaged",
            ModuleKind::Macro => "macro",
            ModuleKind::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// Per-module options for the launched process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Overrides the runtime's default maximum memory.
    pub max_memory_mb: Option<u32>,
    /// Extra flags passed to the runtime before the library list.
    pub flags: Vec<String>,
}

/// Where a module lives and how to start it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    /// Path, or `file://` url, of the module file.
    pub location: String,
    pub kind: ModuleKind,
    /// Entry symbol; only packaged modules use their own.
    pub entry: Option<String>,
    pub options: ProcessOptions,
}

impl ModuleRef {
    pub fn new(kind: ModuleKind, location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind,
            entry: None,
            options: ProcessOptions::default(),
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }

    /// Interpret `location` as a local path.
    /// Urls with any scheme other than `file://` aren't locally addressable.
    pub fn local_path(&self) -> Result<PathBuf, Error> {
        if let Some(path) = self.location.strip_prefix(FILE_SCHEME) {
            Ok(PathBuf::from(path))
        } else if self.location.contains(SCHEME_DELIM) {
            Err(Error::ModuleNotLocal(self.location.clone()))
        } else {
            Ok(PathBuf::from(&self.location))
        }
    }

    /// Local path of the module file, checked to exist and be a regular file.
    pub fn checked_file(&self) -> Result<PathBuf, Error> {
        let path = self.local_path()?;
        if !path.exists() {
            Err(Error::ModuleMissing(path))
        } else if !path.is_file() {
            Err(Error::ModuleNotFile(path))
        } else {
            Ok(path)
        }
    }
}
