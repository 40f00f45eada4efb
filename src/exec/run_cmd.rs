use std::fs::File;
use std::io::{stderr, stdout, Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use wait_timeout::ChildExt;

use super::{CancelToken, Error};

/// how often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// None if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub cancelled: bool,
}

/// Run a subprocess, copying stdout and stderr both to the terminal and to `log`.
/// Kills the child if `cancel` is set while it is running.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_cmd(cmd: &mut Command, log: File, cancel: &CancelToken, verbose: bool) -> Result<Outcome> {
    if verbose {
        eprintln!("{}", "Running command...".magenta());
    }
    let err_log = log.try_clone().context("duplicating log file handle")?;
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        })?;

    let (child_out, child_err) = attach(&mut child)?;

    let thread_out = thread::spawn(move || communicate(child_out, log, stdout()));
    let thread_err = thread::spawn(move || communicate(child_err, err_log, stderr()));

    let mut cancelled = false;
    let status = loop {
        if cancel.is_cancelled() {
            log::info!("cancelling child process {}", child.id());
            cancelled = true;
            break kill(&mut child).context("waiting on killed child process")?;
        }
        if let Some(status) = child
            .wait_timeout(POLL_INTERVAL)
            .context("waiting on child process")?
        {
            break status;
        }
    };

    thread_out
        .join()
        .map_err(|_| Error::OutputThread("stdout"))?
        .context("copying child stdout")?;
    thread_err
        .join()
        .map_err(|_| Error::OutputThread("stderr"))?
        .context("copying child stderr")?;

    if verbose {
        eprintln!("\n{} with {status}.", "Process finished".green());
    }
    Ok(Outcome {
        exit_code: status.code(),
        cancelled,
    })
}

/// Take the child's output pipes. If either is missing the child is killed.
fn attach(child: &mut Child) -> Result<(ChildStdout, ChildStderr), Error> {
    match (child.stdout.take(), child.stderr.take()) {
        (Some(out), Some(err)) => Ok((out, err)),
        (out, _) => {
            if let Err(e) = kill(child) {
                log::warn!("could not reap child process {}: {e}", child.id());
            }
            Err(Error::Pipe(if out.is_none() { "stdout" } else { "stderr" }))
        }
    }
}

fn kill(child: &mut Child) -> std::io::Result<ExitStatus> {
    // the child may already have exited:
    if let Err(e) = child.kill() {
        log::debug!("kill failed: {e}");
    }
    child.wait()
}

fn communicate<R: Read, W: Write>(mut stream: R, mut file: File, mut output: W) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        file.write_all(buf)?;
        output.write_all(buf)?;
    }

    Ok(())
}
