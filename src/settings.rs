use std::path::{Path, PathBuf};

use crate::args::Args;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pipeline file not found: \"{0}\"")]
    PipelineNotFound(String),
    #[error("Invalid pipeline path has no parent (should not happen)")]
    PipelineHasNoParent,
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. paths are canonicalized.
#[derive(Debug)]
pub struct Settings {
    pub pipeline: PathBuf,
    pub log_dir: PathBuf,
    pub runtime: Option<PathBuf>,
    pub yes: bool,
    pub dry_run: bool,
    pub keep_going: bool,
    pub verbose: u8,
}

impl Settings {
    /// Get canonicalized parent dir of the pipeline file.
    /// Relative module locations are resolved against it.
    pub fn pipeline_parent_dir(&self) -> Result<&Path, Error> {
        self.pipeline.parent().ok_or(Error::PipelineHasNoParent)
    }
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let pipeline = PathBuf::from(&args.pipeline);
        if !pipeline.exists() {
            return Err(Error::PipelineNotFound(args.pipeline).into());
        }
        let pipeline = pipeline.canonicalize()?;

        Ok(Self {
            pipeline,
            log_dir: PathBuf::from(&args.log_dir),
            runtime: args.runtime.map(PathBuf::from),
            yes: args.yes,
            dry_run: args.dry_run,
            keep_going: args.keep_going,
            verbose: args.verbose,
        })
    }
}
