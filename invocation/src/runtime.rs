use std::path::PathBuf;

const DEFAULT_EXECUTABLE: &str = "java";
const DEFAULT_LIBRARY_FLAG: &str = "-cp";

/// Machine-wide settings used to turn invocations into processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    /// Program that hosts every module.
    pub executable: PathBuf,
    /// Flag that introduces the library list.
    pub library_flag: String,
    /// Libraries every packaged module and filter gets.
    pub system_libs: Vec<PathBuf>,
    pub macro_interpreter: Option<PathBuf>,
    pub macro_entry: Option<String>,
    pub filter_interpreter: Option<PathBuf>,
    pub filter_entry: Option<String>,
    /// Extra libraries the filter interpreter needs to read filter definitions.
    pub schema_libs: Vec<PathBuf>,
    /// Default maximum memory, used when a module doesn't set its own.
    pub max_memory_mb: Option<u32>,
    /// Flags forwarded to every process.
    pub forwarded_flags: Vec<String>,
    /// Where temp files for routed outputs are created.
    pub temp_dir: PathBuf,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            library_flag: DEFAULT_LIBRARY_FLAG.to_owned(),
            system_libs: Vec::with_capacity(0),
            macro_interpreter: None,
            macro_entry: None,
            filter_interpreter: None,
            filter_entry: None,
            schema_libs: Vec::with_capacity(0),
            max_memory_mb: None,
            forwarded_flags: Vec::with_capacity(0),
            temp_dir: std::env::temp_dir(),
        }
    }
}
