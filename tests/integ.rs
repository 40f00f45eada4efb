#![cfg(unix)]

use anyhow::Result;
use modchain::{App, Args};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

// stands in for the runtime: skips "-cp <libs>" and dispatches on the entry.
const RUNTIME: &str = r#"#!/bin/sh
shift 2
entry=$1
shift
echo "ran $entry"
case "$entry" in
  Produce) printf hello > "$1" ;;
  Consume) cp "$1" "$2" ;;
  Fail) echo "failing on purpose" >&2; exit 7 ;;
esac
"#;

/// A scratch dir holding the fake runtime, an empty module file and a temp dir.
struct Scratch {
    dir: TempDir,
}

impl Scratch {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        let runtime = dir.path().join("runtime.sh");
        fs::write(&runtime, RUNTIME)?;
        fs::set_permissions(&runtime, fs::Permissions::from_mode(0o755))?;
        fs::write(dir.path().join("module.jar"), "")?;
        fs::create_dir(dir.path().join("tmp"))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_pipeline(&self, body: &str) -> Result<PathBuf> {
        let text = format!(
            "config {{\n  temp_dir = \"{}\"\n}}\n\n{body}",
            self.path("tmp").display()
        );
        let pipeline = self.path("pipeline.mc");
        fs::write(&pipeline, text)?;
        Ok(pipeline)
    }

    fn args(&self, pipeline: &Path) -> Args {
        Args {
            pipeline: pipeline.to_string_lossy().into_owned(),
            log_dir: self.path("logs").to_string_lossy().into_owned(),
            runtime: Some(self.path("runtime.sh").to_string_lossy().into_owned()),
            yes: true,
            dry_run: false,
            keep_going: false,
            verbose: 1,
        }
    }
}

fn run(args: Args) -> Result<()> {
    let settings = args.try_into()?;
    let app = App::new(settings);
    app.run()
}

fn produce_consume(scratch: &Scratch, producer_entry: &str, order: bool) -> String {
    let mut body = format!(
        "invocation produce {{
  module packaged module.jar entry {producer_entry}
  out table csv to_temp table
}}

invocation consume {{
  module packaged module.jar entry Consume
  in table csv
  out result file \"{}\"
}}

link produce.1 to consume.1
",
        scratch.path("result.txt").display()
    );
    if order {
        body.push_str("order consume after produce\n");
    }
    body
}

#[test]
fn test_temp_output_feeds_next_invocation() -> Result<()> {
    let scratch = Scratch::new()?;
    let pipeline = scratch.write_pipeline(&produce_consume(&scratch, "Produce", false))?;
    run(scratch.args(&pipeline))?;

    assert_eq!("hello", fs::read_to_string(scratch.path("result.txt"))?);

    // the temp file was kept for the consumer:
    let temps: Vec<_> = fs::read_dir(scratch.path("tmp"))?.collect::<Result<_, _>>()?;
    assert_eq!(1, temps.len());
    let name = temps[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("table"));
    assert!(name.ends_with(".csv"));

    let log = fs::read_to_string(scratch.path("logs/001-produce.log"))?;
    assert!(log.contains("ran Produce"));
    let log = fs::read_to_string(scratch.path("logs/002-consume.log"))?;
    assert!(log.contains("ran Consume"));
    Ok(())
}

#[test]
fn test_failure_stops_pipeline() -> Result<()> {
    let scratch = Scratch::new()?;
    let pipeline = scratch.write_pipeline(&produce_consume(&scratch, "Fail", false))?;
    let err = run(scratch.args(&pipeline)).unwrap_err();
    assert!(format!("{err:#}").contains("1 failed"));

    assert!(!scratch.path("result.txt").exists());
    assert!(!scratch.path("logs/002-consume.log").exists());
    let log = fs::read_to_string(scratch.path("logs/001-produce.log"))?;
    assert!(log.contains("failing on purpose"));
    Ok(())
}

#[test]
fn test_failure_skips_waiters() -> Result<()> {
    let scratch = Scratch::new()?;
    let pipeline = scratch.write_pipeline(&produce_consume(&scratch, "Fail", true))?;
    let mut args = scratch.args(&pipeline);
    args.keep_going = true;
    let err = run(args).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("1 failed"));
    assert!(msg.contains("1 skipped"));
    assert!(!scratch.path("logs/002-consume.log").exists());
    Ok(())
}

#[test]
fn test_dry_run_runs_nothing() -> Result<()> {
    let scratch = Scratch::new()?;
    let pipeline = scratch.write_pipeline(&produce_consume(&scratch, "Produce", false))?;
    let mut args = scratch.args(&pipeline);
    args.dry_run = true;
    run(args)?;

    assert!(!scratch.path("logs").exists());
    assert!(!scratch.path("result.txt").exists());
    assert_eq!(0, fs::read_dir(scratch.path("tmp"))?.count());
    Ok(())
}

#[test]
fn test_invalid_pipeline_is_rejected() -> Result<()> {
    let scratch = Scratch::new()?;
    let pipeline = scratch.write_pipeline(
        "invocation a {
  module packaged module.jar entry Produce
  in data csv \"/definitely/not/here.csv\"
  out short csv to_temp ab
}
",
    )?;
    let err = run(scratch.args(&pipeline)).unwrap_err();
    assert!(format!("{err:#}").contains("2 errors"));
    assert!(!scratch.path("logs").exists());
    Ok(())
}

#[test]
fn test_link_into_earlier_invocation_is_rejected() -> Result<()> {
    let scratch = Scratch::new()?;
    let pipeline = scratch.write_pipeline(&format!(
        "invocation consume {{
  module packaged module.jar entry Consume
  in table csv
  out result file \"{}\"
}}

invocation produce {{
  module packaged module.jar entry Produce
  out table csv to_temp table
}}

link produce.1 to consume.1
",
        scratch.path("result.txt").display()
    ))?;
    let err = run(scratch.args(&pipeline)).unwrap_err();
    assert!(format!("{err:#}").contains("1 errors"));
    assert!(!scratch.path("logs").exists());
    assert_eq!(0, fs::read_dir(scratch.path("tmp"))?.count());
    Ok(())
}
