use std::path::PathBuf;

use invocation::RunNumber;

use super::Fs;

/// characters that are replaced in invocation names used as file names.
const UNSAFE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

impl Fs {
    /// $LOG_DIR/003-name.log
    pub fn log_file(&self, run: RunNumber, name: &str) -> PathBuf {
        let run: u32 = run.into();
        let name: String = name
            .chars()
            .map(|c| if UNSAFE_CHARS.contains(&c) || c.is_whitespace() { '_' } else { c })
            .collect();
        self.log_prefix.join(format!("{run:03}-{name}.log"))
    }
}
