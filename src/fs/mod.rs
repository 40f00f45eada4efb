use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Defines fns for creating common paths in the log directory
mod paths;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Specified log directory \"{0}\" is not a directory")]
    NotDirectory(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
}

/// All file operations of the app itself go through this struct.
///
/// Destructive operations check that the path in question is a child of the
/// single whitelisted prefix (the log dir), otherwise they will not be performed.
/// Modules write wherever their arguments tell them to; that is up to the user.
#[derive(Debug)]
pub struct Fs {
    /// The directory we are allowed to modify
    log_prefix: PathBuf,
    /// if true, prevents all destructive operations
    dry_run: bool,
}

impl Fs {
    /// Create a new `Fs` with the given log directory.
    pub fn new(log_prefix: &Path, dry_run: bool) -> Self {
        Self {
            log_prefix: log_prefix.to_path_buf(),
            dry_run,
        }
    }

    /// Check whether log dir exists, and create it if not.
    pub fn ensure_log_dir_exists(&mut self, verbose: bool) -> Result<()> {
        if !self.log_prefix.exists() {
            if self.dry_run {
                eprintln!("Dry run. Not creating log directory {:?}", self.log_prefix);
                return Ok(());
            }
            if verbose {
                eprintln!("Log directory {:?} doesn't exist. Creating.", self.log_prefix);
            }
            fs::create_dir_all(&self.log_prefix).context("creating log directory")?;
        } else if !self.log_prefix.is_dir() {
            return Err(Error::NotDirectory(
                self.log_prefix
                    .to_str()
                    .ok_or(PathEncodingError)?
                    .to_string(),
            )
            .into());
        } else if verbose {
            eprintln!(
                "Log directory {:?} already exists. Not creating.",
                self.log_prefix
            );
        }

        self.log_prefix = self.log_prefix.canonicalize()?;
        Ok(())
    }

    /// Create a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).context("creating file")?;
        Ok(f)
    }

    /// Read entire file into a String.
    pub fn read_to_buf<T: AsRef<Path>>(&self, path: T, strbuf: &mut String) -> Result<()> {
        use std::io::Read;
        let path = path.as_ref();
        strbuf.clear();
        let cap = fs::metadata(path)?.len() as usize;
        if cap > strbuf.len() {
            strbuf.reserve(cap - strbuf.len());
        }
        let mut f = fs::File::open(path)?;
        f.read_to_string(strbuf)?;
        Ok(())
    }

    fn is_whitelisted<T: AsRef<Path>>(&self, path: T) -> bool {
        path.as_ref().starts_with(&self.log_prefix)
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if self.dry_run || !self.is_whitelisted(path) {
            Err(Error::NotWhitelisted(path.to_str().ok_or(PathEncodingError)?.to_owned()).into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_only_log_dir_is_writable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = Fs::new(&dir.path().join("logs"), false);
        fs.ensure_log_dir_exists(false)?;

        let log = fs.log_file(invocation::RunNumber::for_position(0), "convert");
        fs.create_file(&log)?;
        assert!(log.exists());

        let outside = dir.path().join("elsewhere.txt");
        assert!(fs.create_file(&outside).is_err());
        Ok(())
    }

    #[test]
    fn test_dry_run_creates_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let logs = dir.path().join("logs");
        let mut fs = Fs::new(&logs, true);
        fs.ensure_log_dir_exists(false)?;
        assert!(!logs.exists());
        Ok(())
    }
}
