use std::env;
use std::path::{Path, PathBuf};

use invocation::{
    ArgKind, ArgumentKey, ArgumentSlot, InvocationId, Marker, ModuleInvocation, ModuleKind,
    ModuleRef, ProcessOptions, Runtime, SlotIndex,
};
use sequence::{LogObserver, MacroInvocation};
use syntax::ast::{ArgSpec, Binding, InvocationBlock, Item, SlotRef, Stmt};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unknown config key \"{0}\"")]
    UnknownConfigKey(String),
    #[error("Unknown module kind \"{0}\" (expected packaged, macro or filter)")]
    UnknownModuleKind(String),
    #[error("Unknown argument kind \"{0}\" (expected in, out, pub, sub or text)")]
    UnknownArgKind(String),
    #[error("Unknown marker \"{0}\" (expected any, file, temp, csv, xml or text)")]
    UnknownMarker(String),
    #[error("Invalid number \"{1}\" for {0}")]
    BadNumber(&'static str, String),
    #[error("Invalid boolean \"{1}\" for {0} (expected true or false)")]
    BadBool(&'static str, String),
    #[error("Invocation \"{0}\" is defined more than once")]
    DuplicateName(String),
    #[error("Invocation \"{0}\" has no module statement")]
    MissingModule(String),
    #[error("Invocation \"{0}\" has more than one module statement")]
    MultipleModules(String),
    #[error("No invocation named \"{0}\"")]
    UnknownName(String),
    #[error("Pipeline defines no invocations")]
    Empty,
    #[error(transparent)]
    Invocation(#[from] invocation::Error),
    #[error(transparent)]
    Sequence(#[from] sequence::Error),
}

/// Everything a pipeline file defines.
#[derive(Debug)]
pub struct Pipeline {
    pub invocations: MacroInvocation,
    pub runtime: Runtime,
}

/// Turn parsed pipeline items into invocations and a runtime.
/// Relative module locations are resolved against `base_dir`.
pub fn load(items: Vec<Item<'_>>, name: &str, base_dir: &Path) -> Result<Pipeline, Error> {
    let mut runtime = Runtime::default();
    let mut run_order_links = None;
    let mut orders = Vec::new();
    let mut links = Vec::new();
    let mut invocations = MacroInvocation::with_observer(name, Box::new(LogObserver));

    for item in items {
        match item {
            Item::Config(lines) => {
                for (key, value) in lines {
                    if let Some(links) = apply_config(&mut runtime, key, value, base_dir)? {
                        run_order_links = Some(links);
                    }
                }
            }
            Item::Invocation(block) => {
                if invocations.find(block.name).is_some() {
                    return Err(Error::DuplicateName(block.name.to_owned()));
                }
                invocations.push(load_invocation(block, base_dir)?)?;
            }
            Item::Order {
                waiter,
                predecessors,
            } => orders.push((waiter, predecessors)),
            Item::Link {
                source,
                destination,
            } => links.push((source, destination)),
        }
    }

    if invocations.sequence().is_empty() {
        return Err(Error::Empty);
    }

    // link and order statements may name invocations defined further down:
    for (source, destination) in &links {
        let source = slot_key(&invocations, source)?;
        let destination = slot_key(&invocations, destination)?;
        invocations.link(source, destination)?;
    }
    for (waiter, predecessors) in &orders {
        let waiter = lookup(&invocations, waiter)?;
        for pred in predecessors {
            let pred = lookup(&invocations, pred)?;
            invocations.connect(waiter, pred)?;
        }
    }
    invocations.set_run_order_links(run_order_links.unwrap_or(!orders.is_empty()));

    log::info!(
        "loaded {} invocations ({} links, {} run order statements)",
        invocations.sequence().len(),
        links.len(),
        orders.len()
    );
    Ok(Pipeline {
        invocations,
        runtime,
    })
}

fn lookup(invocations: &MacroInvocation, name: &str) -> Result<InvocationId, Error> {
    invocations
        .find(name)
        .map(ModuleInvocation::id)
        .ok_or_else(|| Error::UnknownName(name.to_owned()))
}

fn slot_key(invocations: &MacroInvocation, slot: &SlotRef<'_>) -> Result<ArgumentKey, Error> {
    let id = lookup(invocations, slot.invocation)?;
    let index = slot
        .index
        .parse()
        .map_err(|_| Error::BadNumber("slot index", slot.index.to_owned()))?;
    Ok(ArgumentKey::new(id, SlotIndex::new(index)?))
}

/// Apply one config line. Returns the run order setting if that was the key.
fn apply_config(
    runtime: &mut Runtime,
    key: &str,
    value: &str,
    base_dir: &Path,
) -> Result<Option<bool>, Error> {
    match key {
        "executable" => runtime.executable = PathBuf::from(value),
        "library_flag" => runtime.library_flag = value.to_owned(),
        "system_libs" => runtime.system_libs = path_list(value, base_dir),
        "schema_libs" => runtime.schema_libs = path_list(value, base_dir),
        "macro_interpreter" => runtime.macro_interpreter = Some(resolve(value, base_dir)),
        "macro_entry" => runtime.macro_entry = Some(value.to_owned()),
        "filter_interpreter" => runtime.filter_interpreter = Some(resolve(value, base_dir)),
        "filter_entry" => runtime.filter_entry = Some(value.to_owned()),
        "max_memory" => runtime.max_memory_mb = Some(number("max_memory", value)?),
        "vm_flags" => {
            runtime.forwarded_flags = value.split_whitespace().map(str::to_owned).collect()
        }
        "temp_dir" => runtime.temp_dir = resolve(value, base_dir),
        "run_order_links" => {
            return match value {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(Error::BadBool("run_order_links", value.to_owned())),
            }
        }
        _ => return Err(Error::UnknownConfigKey(key.to_owned())),
    }
    Ok(None)
}

fn load_invocation(block: InvocationBlock<'_>, base_dir: &Path) -> Result<ModuleInvocation, Error> {
    let mut module = None;
    let mut options = ProcessOptions::default();
    let mut slots = Vec::with_capacity(block.stmts.len());

    for stmt in block.stmts {
        match stmt {
            Stmt::Module {
                kind,
                location,
                entry,
            } => {
                if module.is_some() {
                    return Err(Error::MultipleModules(block.name.to_owned()));
                }
                let mut m = ModuleRef::new(module_kind(kind)?, module_location(location, base_dir));
                if let Some(entry) = entry {
                    m = m.with_entry(entry);
                }
                module = Some(m);
            }
            Stmt::Memory(mb) => options.max_memory_mb = Some(number("memory", mb)?),
            Stmt::Flag(flag) => options.flags.push(flag.to_owned()),
            Stmt::Arg(arg) => slots.push(load_slot(arg)?),
        }
    }

    let module = module
        .ok_or_else(|| Error::MissingModule(block.name.to_owned()))?
        .with_options(options);
    Ok(ModuleInvocation::new(block.name, module, slots)?)
}

fn load_slot(arg: ArgSpec<'_>) -> Result<ArgumentSlot, Error> {
    let kind = arg_kind(arg.kind)?;
    let slot = match arg.binding {
        Binding::Fixed(value) => ArgumentSlot::fixed(kind, arg.description, value),
        Binding::Parametric { marker, value } => ArgumentSlot::parametric(
            kind,
            arg.description,
            marker_kind(marker)?,
            value.unwrap_or_default(),
        ),
        Binding::ToTemp { marker, prefix } => {
            ArgumentSlot::parametric(kind, arg.description, marker_kind(marker)?, "")
                .routed_to_temp(prefix.map(str::to_owned))?
        }
    };
    Ok(slot)
}

fn module_kind(s: &str) -> Result<ModuleKind, Error> {
    match s {
        "packaged" => Ok(ModuleKind::Packaged),
        "macro" => Ok(ModuleKind::Macro),
        "filter" => Ok(ModuleKind::Filter),
        _ => Err(Error::UnknownModuleKind(s.to_owned())),
    }
}

fn arg_kind(s: &str) -> Result<ArgKind, Error> {
    match s {
        "in" => Ok(ArgKind::InputFile),
        "out" => Ok(ArgKind::OutputFile),
        "pub" => Ok(ArgKind::PublishAddress),
        "sub" => Ok(ArgKind::SubscribeAddress),
        "text" => Ok(ArgKind::PlainText),
        _ => Err(Error::UnknownArgKind(s.to_owned())),
    }
}

fn marker_kind(s: &str) -> Result<Marker, Error> {
    match s {
        "any" => Ok(Marker::Any),
        "file" => Ok(Marker::File),
        "temp" => Ok(Marker::TempFile),
        "csv" => Ok(Marker::Csv),
        "xml" => Ok(Marker::Xml),
        "text" => Ok(Marker::Text),
        _ => Err(Error::UnknownMarker(s.to_owned())),
    }
}

fn number(what: &'static str, s: &str) -> Result<u32, Error> {
    s.parse().map_err(|_| Error::BadNumber(what, s.to_owned()))
}

fn resolve(path: &str, base_dir: &Path) -> PathBuf {
    base_dir.join(path)
}

fn path_list(value: &str, base_dir: &Path) -> Vec<PathBuf> {
    env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| base_dir.join(p))
        .collect()
}

// urls are left alone; relative paths are made absolute.
fn module_location(location: &str, base_dir: &Path) -> String {
    if location.contains("://") || Path::new(location).is_absolute() {
        location.to_owned()
    } else {
        base_dir.join(location).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    const BASE: &str = "/pipelines";

    fn load_str(text: &str) -> Result<Pipeline> {
        let items = syntax::parse(text)?;
        Ok(load(items, "test", Path::new(BASE))?)
    }

    fn load_err(text: &str) -> Error {
        let items = syntax::parse(text).unwrap();
        load(items, "test", Path::new(BASE)).unwrap_err()
    }

    #[test]
    fn test_load_pipeline() -> Result<()> {
        let p = load_str(
            "config {
  system_libs = /opt/a.jar
  max_memory = 512
  vm_flags = \"-Da=1 -Db=2\"
  macro_interpreter = lib/macro.jar
  macro_entry = Runner
}
invocation convert {
  module packaged mods/convert.jar entry Convert
  memory 1024
  in raw csv /data/raw.csv
  out table csv to_temp conv
  text mode fixed fast
}
invocation plot {
  module macro file:///opt/plot.ijm
  in table csv
}
",
        )?;
        assert_eq!(vec![PathBuf::from("/opt/a.jar")], p.runtime.system_libs);
        assert_eq!(Some(512), p.runtime.max_memory_mb);
        assert_eq!(vec!["-Da=1", "-Db=2"], p.runtime.forwarded_flags);
        assert_eq!(
            Some(PathBuf::from("/pipelines/lib/macro.jar")),
            p.runtime.macro_interpreter
        );
        assert!(!p.invocations.run_order_links());

        let convert = p.invocations.find("convert").unwrap();
        assert_eq!("/pipelines/mods/convert.jar", convert.module().location);
        assert_eq!(Some("Convert"), convert.module().entry.as_deref());
        assert_eq!(Some(1024), convert.module().options.max_memory_mb);
        assert_eq!(3, convert.slots().len());
        assert!(convert.slots()[1].is_routed_to_temp());
        assert!(convert.slots()[2].is_fixed());

        let plot = p.invocations.find("plot").unwrap();
        assert_eq!("file:///opt/plot.ijm", plot.module().location);
        assert_eq!(Some(""), plot.slots()[0].literal());
        Ok(())
    }

    #[test]
    fn test_order_enables_links() -> Result<()> {
        let p = load_str(
            "order b after a
invocation a {
  module macro a.ijm
}
invocation b {
  module macro b.ijm
}
",
        )?;
        assert!(p.invocations.run_order_links());
        let a = p.invocations.find("a").unwrap().id();
        let b = p.invocations.find("b").unwrap().id();
        assert_eq!(vec![a], p.invocations.graph().wait_set(b)?.collect::<Vec<_>>());

        let p = load_str(
            "config {
  run_order_links = false
}
invocation a {
  module macro a.ijm
}
invocation b {
  module macro b.ijm
}
order b after a
",
        )?;
        assert!(!p.invocations.run_order_links());
        Ok(())
    }

    #[test]
    fn test_link_to_temp_output() -> Result<()> {
        let p = load_str(
            "link convert.1 to plot.1
invocation convert {
  module macro convert.ijm
  out table csv to_temp
}
invocation plot {
  module macro plot.ijm
  in table csv
}
",
        )?;
        let convert = p.invocations.find("convert").unwrap();
        let plot = p.invocations.find("plot").unwrap();
        let source = convert.key(SlotIndex::new(1)?)?;
        assert_eq!(Some(source), plot.slots()[0].value().reference());
        assert_eq!(1, p.invocations.sequence().relations().len());
        Ok(())
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            load_err("config {\n  colour = blue\n}\n"),
            Error::UnknownConfigKey(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module jar a.jar\n}\n"),
            Error::UnknownModuleKind(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module macro a\n  inout x any\n}\n"),
            Error::UnknownArgKind(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module macro a\n  in x json\n}\n"),
            Error::UnknownMarker(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module macro a\n  memory lots\n}\n"),
            Error::BadNumber(..)
        ));
        assert!(matches!(
            load_err("invocation a {\n  in x any\n}\n"),
            Error::MissingModule(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module macro a\n}\ninvocation a {\n  module macro a\n}\n"),
            Error::DuplicateName(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module macro a\n}\norder a after ghost\n"),
            Error::UnknownName(_)
        ));
        assert!(matches!(
            load_err("invocation a {\n  module macro a\n  in x csv to_temp\n}\n"),
            Error::Invocation(invocation::Error::NotRoutable(_))
        ));
        assert!(matches!(load_err("# nothing\n"), Error::Empty));
        let two = "invocation a {\n  module macro a\n  out x csv\n}\n\
                   invocation b {\n  module macro b\n  in x csv\n}\n";
        assert!(matches!(
            load_err(&format!("{two}link a.0 to b.1\n")),
            Error::Invocation(invocation::Error::InvalidSlotIndex(0))
        ));
        assert!(matches!(
            load_err(&format!("{two}link a.1 to b.9\n")),
            Error::Sequence(sequence::Error::Invocation(invocation::Error::SlotOutOfRange { .. }))
        ));
        assert!(matches!(
            load_err(&format!("{two}link b.1 to a.1\n")),
            Error::Sequence(sequence::Error::NotOutput(..))
        ));
    }
}
