use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{Error, ModuleInvocation, ModuleKind, ModuleRef, Runtime, SlotIndex};

/// Everything needed to launch one invocation as an external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    /// memory option and flags, in order.
    pub options: Vec<String>,
    pub library_flag: String,
    pub libraries: Vec<PathBuf>,
    pub entry: String,
    /// positional arguments, each a resolved literal.
    pub args: Vec<String>,
    /// directory containing the module file.
    pub working_dir: PathBuf,
}

impl ProcessSpec {
    /// Arguments passed to `program`, in order.
    pub fn argv(&self) -> Result<Vec<OsString>, Error> {
        let mut argv = Vec::with_capacity(self.options.len() + self.args.len() + 3);
        argv.extend(self.options.iter().map(OsString::from));
        if !self.libraries.is_empty() {
            let joined = env::join_paths(&self.libraries)
                .map_err(|e| Error::LibraryPath(e.to_string()))?;
            argv.push(OsString::from(&self.library_flag));
            argv.push(joined);
        }
        argv.push(OsString::from(&self.entry));
        argv.extend(self.args.iter().map(OsString::from));
        Ok(argv)
    }

    /// Create a `Command` that runs this spec in its working directory.
    pub fn to_command(&self) -> Result<Command, Error> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.argv()?).current_dir(&self.working_dir);
        Ok(cmd)
    }

    /// Single-line rendering for printing to the user.
    pub fn display(&self) -> String {
        let mut s = self.program.to_string_lossy().into_owned();
        if let Ok(argv) = self.argv() {
            for arg in argv {
                s.push(' ');
                s.push_str(&arg.to_string_lossy());
            }
        }
        s
    }
}

/// Kind-specific start of a process spec.
struct Preamble {
    libraries: Vec<PathBuf>,
    entry: String,
    /// positional arguments that come before the slot values.
    leading: Vec<String>,
}

/// Build the process spec for an invocation whose arguments are all resolved.
pub(crate) fn build(inv: &ModuleInvocation, runtime: &Runtime) -> Result<ProcessSpec, Error> {
    let module = inv.module();
    let module_file = module.checked_file()?;

    let preamble = match module.kind {
        ModuleKind::Packaged => packaged_preamble(module, &module_file, runtime)?,
        ModuleKind::Macro => macro_preamble(&module_file, runtime)?,
        ModuleKind::Filter => filter_preamble(&module_file, runtime)?,
    };

    let mut args = preamble.leading;
    append_positional(inv, &mut args)?;

    let working_dir = module_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let spec = ProcessSpec {
        program: runtime.executable.clone(),
        options: options(module, runtime),
        library_flag: runtime.library_flag.clone(),
        libraries: preamble.libraries,
        entry: preamble.entry,
        args,
        working_dir,
    };
    log::debug!("built process spec for {}: {}", inv.run_number(), spec.display());
    Ok(spec)
}

fn options(module: &ModuleRef, runtime: &Runtime) -> Vec<String> {
    let mut options = Vec::with_capacity(1 + runtime.forwarded_flags.len() + module.options.flags.len());
    if let Some(mb) = module.options.max_memory_mb.or(runtime.max_memory_mb) {
        options.push(format!("-Xmx{mb}m"));
    }
    options.extend(runtime.forwarded_flags.iter().cloned());
    options.extend(module.options.flags.iter().cloned());
    options
}

// module file + system libs; module's own entry symbol.
fn packaged_preamble(module: &ModuleRef, module_file: &Path, runtime: &Runtime) -> Result<Preamble, Error> {
    let entry = module
        .entry
        .clone()
        .ok_or(Error::MissingEntry(ModuleKind::Packaged))?;
    let mut libraries = Vec::with_capacity(1 + runtime.system_libs.len());
    libraries.push(module_file.to_path_buf());
    libraries.extend(runtime.system_libs.iter().cloned());
    Ok(Preamble {
        libraries,
        entry,
        leading: Vec::with_capacity(0),
    })
}

// macro interpreter only; the script is the first positional argument.
fn macro_preamble(module_file: &Path, runtime: &Runtime) -> Result<Preamble, Error> {
    let (interpreter, entry) = interpreter(
        ModuleKind::Macro,
        &runtime.macro_interpreter,
        &runtime.macro_entry,
    )?;
    Ok(Preamble {
        libraries: vec![interpreter],
        entry,
        leading: vec![path_arg(module_file)?],
    })
}

// filter interpreter + schema libs + system libs; the definition is the first positional argument.
fn filter_preamble(module_file: &Path, runtime: &Runtime) -> Result<Preamble, Error> {
    let (interpreter, entry) = interpreter(
        ModuleKind::Filter,
        &runtime.filter_interpreter,
        &runtime.filter_entry,
    )?;
    let mut libraries =
        Vec::with_capacity(1 + runtime.schema_libs.len() + runtime.system_libs.len());
    libraries.push(interpreter);
    libraries.extend(runtime.schema_libs.iter().cloned());
    libraries.extend(runtime.system_libs.iter().cloned());
    Ok(Preamble {
        libraries,
        entry,
        leading: vec![path_arg(module_file)?],
    })
}

fn interpreter(
    kind: ModuleKind,
    location: &Option<PathBuf>,
    entry: &Option<String>,
) -> Result<(PathBuf, String), Error> {
    match (location, entry) {
        (Some(location), Some(entry)) => Ok((location.clone(), entry.clone())),
        _ => Err(Error::InterpreterNotConfigured(kind)),
    }
}

fn path_arg(path: &Path) -> Result<String, Error> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::PathEncoding(path.to_path_buf()))
}

/// Shared by every module kind: each slot's literal, in declaration order.
fn append_positional(inv: &ModuleInvocation, args: &mut Vec<String>) -> Result<(), Error> {
    args.reserve(inv.slots().len());
    for (pos, slot) in inv.slots().iter().enumerate() {
        match slot.literal() {
            Some(value) if !value.is_empty() => args.push(value.to_owned()),
            _ => {
                return Err(Error::EmptyArgument {
                    index: SlotIndex::from_position(pos),
                    kind: slot.kind(),
                })
            }
        }
    }
    Ok(())
}
