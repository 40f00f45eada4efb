use std::fs;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::process_spec::{self, ProcessSpec};
use crate::validate::{self, ValidationHandler};
use crate::{
    temp, ArgumentKey, ArgumentSlot, Error, ExecutionResult, InvocationId, ModuleRef, RunNumber,
    RunState, Runtime, SlotIndex, SlotValue,
};

/// Gives an invocation read access to the slots its references point at.
pub trait ReferenceLookup {
    /// Current value of the slot `key` points at, or `None` if there is no such slot.
    fn slot_value(&self, key: &ArgumentKey) -> Option<&SlotValue>;
}

impl ReferenceLookup for [ModuleInvocation] {
    fn slot_value(&self, key: &ArgumentKey) -> Option<&SlotValue> {
        self.iter()
            .find(|inv| inv.id() == key.invocation())
            .and_then(|inv| inv.slots.get(key.index().position()))
            .map(ArgumentSlot::value)
    }
}

/// One configured execution of a module.
#[derive(Debug)]
pub struct ModuleInvocation {
    id: InvocationId,
    name: String,
    run_number: RunNumber,
    module: ModuleRef,
    slots: Vec<ArgumentSlot>,
    result: ExecutionResult,
}

impl ModuleInvocation {
    /// Create a new invocation with its own identity.
    pub fn new(
        name: impl Into<String>,
        module: ModuleRef,
        slots: Vec<ArgumentSlot>,
    ) -> Result<Self, Error> {
        if slots.len() >= SlotIndex::MAX {
            return Err(Error::TooManySlots(slots.len()));
        }
        Ok(Self {
            id: InvocationId::fresh(),
            name: name.into(),
            run_number: RunNumber::UNASSIGNED,
            module,
            slots,
            result: ExecutionResult::default(),
        })
    }

    /// A new invocation with the same configuration but a fresh identity
    /// and an empty result record. References are kept as they are.
    pub fn duplicate(&self) -> Self {
        Self {
            id: InvocationId::fresh(),
            name: self.name.clone(),
            run_number: RunNumber::UNASSIGNED,
            module: self.module.clone(),
            slots: self.slots.clone(),
            result: ExecutionResult::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> InvocationId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn run_number(&self) -> RunNumber {
        self.run_number
    }

    /// Assigned by whichever sequence owns this invocation.
    pub fn set_run_number(&mut self, run_number: RunNumber) {
        self.run_number = run_number;
    }

    #[inline]
    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    #[inline]
    pub fn slots(&self) -> &[ArgumentSlot] {
        &self.slots
    }

    /// Get the slot at 1-based `index`.
    pub fn slot(&self, index: SlotIndex) -> Result<&ArgumentSlot, Error> {
        self.slots.get(index.position()).ok_or(Error::SlotOutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    /// Key identifying the slot at `index` of this invocation.
    pub fn key(&self, index: SlotIndex) -> Result<ArgumentKey, Error> {
        self.slot(index)?;
        Ok(ArgumentKey::new(self.id, index))
    }

    /// Iterate through each slot along with its key.
    pub fn keyed_slots(&self) -> impl Iterator<Item = (ArgumentKey, &ArgumentSlot)> {
        let id = self.id;
        self.slots
            .iter()
            .enumerate()
            .map(move |(pos, slot)| (ArgumentKey::new(id, SlotIndex::from_position(pos)), slot))
    }

    /// Every slot that currently holds a reference, with the key it points at.
    pub fn references(&self) -> impl Iterator<Item = (SlotIndex, ArgumentKey)> + '_ {
        self.slots.iter().enumerate().filter_map(|(pos, slot)| {
            slot.value()
                .reference()
                .map(|key| (SlotIndex::from_position(pos), key))
        })
    }

    /// Set the value of the slot at `index`.
    /// A slot can't reference another slot of the same invocation.
    pub fn set_value(&mut self, index: SlotIndex, value: SlotValue) -> Result<(), Error> {
        if let SlotValue::Reference(key) = &value {
            if key.invocation() == self.id {
                return Err(Error::SelfReference(*key));
            }
        }
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index.position())
            .ok_or(Error::SlotOutOfRange { index, len })?;
        slot.set_value(value)
    }

    /// Undo a reference in the slot at `index`, restoring its last literal.
    pub fn restore_literal(&mut self, index: SlotIndex) -> Option<ArgumentKey> {
        self.slots.get_mut(index.position())?.restore_literal()
    }

    /// Report each slot's validity to `handler`.
    pub fn validate(&self, handler: &mut dyn ValidationHandler) {
        for (pos, slot) in self.slots.iter().enumerate() {
            let index = SlotIndex::from_position(pos);
            match validate::check_slot(slot) {
                Some(issue) => handler.set(index, issue),
                None => handler.clear(index),
            }
        }
    }

    /// Resolve every argument to a literal: references are replaced with the
    /// current literal of the slot they point at, and outputs routed to temp
    /// get a new temp file.
    ///
    /// Nothing is changed unless every slot resolves to a non-empty literal.
    /// Returns the indexes of slots that held a reference.
    pub fn correct_arguments<L>(&mut self, lookup: &L, runtime: &Runtime) -> Result<Vec<SlotIndex>, Error>
    where
        L: ReferenceLookup + ?Sized,
    {
        let correction = self
            .plan_correction(lookup, runtime)
            .map_err(|e| self.in_context(e))?;
        let dereferenced = correction.dereferenced.clone();
        let values = correction.persist().map_err(|e| self.in_context(e))?;

        for (pos, literal) in values {
            self.slots[pos].resolve_to(literal);
        }
        log::debug!(
            "corrected arguments of {} \"{}\" ({} references resolved)",
            self.run_number,
            self.name,
            dereferenced.len()
        );
        Ok(dereferenced)
    }

    fn plan_correction<L>(&self, lookup: &L, runtime: &Runtime) -> Result<Correction, Error>
    where
        L: ReferenceLookup + ?Sized,
    {
        let mut correction = Correction::default();

        for (pos, slot) in self.slots.iter().enumerate() {
            let index = SlotIndex::from_position(pos);
            if let SlotValue::Reference(key) = slot.value() {
                let literal = match lookup.slot_value(key) {
                    Some(SlotValue::Literal(s)) => s.clone(),
                    Some(SlotValue::Reference(_)) => {
                        return Err(Error::UnresolvedReference { index, key: *key })
                    }
                    None => return Err(Error::DanglingReference { index, key: *key }),
                };
                if literal.is_empty() {
                    return Err(Error::EmptyArgument {
                        index,
                        kind: slot.kind(),
                    });
                }
                correction.literals.push((pos, literal));
                correction.dereferenced.push(index);
            } else if let Some(route) = slot.temp_route() {
                let file = temp::create(&runtime.temp_dir, route, slot.marker())
                    .map_err(|source| Error::TempFile { index, source })?;
                correction.temp_files.push((pos, file));
            } else if slot.literal().map_or(true, str::is_empty) {
                return Err(Error::EmptyArgument {
                    index,
                    kind: slot.kind(),
                });
            }
        }
        Ok(correction)
    }

    /// Build the process spec for this invocation.
    /// Arguments should have been corrected first.
    pub fn build_process_spec(&self, runtime: &Runtime) -> Result<ProcessSpec, Error> {
        process_spec::build(self, runtime).map_err(|e| self.in_context(e))
    }

    #[inline]
    pub fn result(&self) -> &ExecutionResult {
        &self.result
    }

    /// Replace the result record.
    pub fn set_results(&mut self, result: ExecutionResult) {
        self.result = result;
    }

    /// Forget the last run, leaving configuration alone.
    pub fn reset_results(&mut self) {
        self.result = ExecutionResult::default();
    }

    /// True iff the last run exited with code 0 (the cancelled flag is ignored).
    pub fn is_succeeded(&self) -> bool {
        self.result.is_succeeded()
    }

    pub fn state(&self) -> RunState {
        self.result.state()
    }

    fn in_context(&self, e: Error) -> Error {
        Error::Invocation {
            run: self.run_number,
            name: self.name.clone(),
            source: Box::new(e),
        }
    }
}

/// New values computed by `correct_arguments`, not yet applied.
#[derive(Default)]
struct Correction {
    literals: Vec<(usize, String)>,
    temp_files: Vec<(usize, NamedTempFile)>,
    dereferenced: Vec<SlotIndex>,
}

impl Correction {
    /// Keep temp files on disk and return every new value.
    /// Nothing stays on disk if this fails.
    fn persist(self) -> Result<Vec<(usize, String)>, Error> {
        let mut pending = Vec::with_capacity(self.temp_files.len());
        for (pos, file) in self.temp_files {
            let literal = file
                .path()
                .to_str()
                .map(str::to_owned)
                .ok_or_else(|| Error::PathEncoding(file.path().to_path_buf()))?;
            pending.push((pos, literal, file));
        }

        let mut values = self.literals;
        values.reserve(pending.len());
        let mut kept = Vec::with_capacity(pending.len());
        for (pos, literal, file) in pending {
            match file.into_temp_path().keep() {
                Ok(path) => kept.push(path),
                Err(e) => {
                    remove_kept(&kept);
                    return Err(Error::TempFile {
                        index: SlotIndex::from_position(pos),
                        source: e.error,
                    });
                }
            }
            values.push((pos, literal));
        }
        Ok(values)
    }
}

fn remove_kept(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("could not remove temp file {path:?}: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ArgKind, Marker, ModuleKind, ProcessStatus};
    use anyhow::Result;
    use std::fs::OpenOptions;
    use std::path::{Path, PathBuf};

    fn module() -> ModuleRef {
        ModuleRef::new(ModuleKind::Packaged, "/opt/mods/m.jar").with_entry("Main")
    }

    fn idx(i: usize) -> SlotIndex {
        SlotIndex::new(i).unwrap()
    }

    fn runtime_in(dir: &Path) -> Runtime {
        Runtime {
            temp_dir: dir.to_path_buf(),
            ..Runtime::default()
        }
    }

    #[test]
    fn test_identity_not_value() -> Result<()> {
        let a = ModuleInvocation::new("same", module(), vec![])?;
        let b = ModuleInvocation::new("same", module(), vec![])?;
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), a.duplicate().id());
        Ok(())
    }

    #[test]
    fn test_slot_index_range() -> Result<()> {
        let inv = ModuleInvocation::new(
            "m",
            module(),
            vec![ArgumentSlot::fixed(ArgKind::PlainText, "a", "x")],
        )?;
        assert!(inv.key(idx(1)).is_ok());
        assert!(matches!(
            inv.key(idx(2)),
            Err(Error::SlotOutOfRange { len: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_self_reference_rejected() -> Result<()> {
        let mut inv = ModuleInvocation::new(
            "m",
            module(),
            vec![
                ArgumentSlot::parametric(ArgKind::OutputFile, "out", Marker::Csv, "/tmp/a.csv"),
                ArgumentSlot::parametric(ArgKind::InputFile, "in", Marker::Csv, "/tmp/a.csv"),
            ],
        )?;
        let own = inv.key(idx(1))?;
        assert!(matches!(
            inv.set_value(idx(2), own.into()),
            Err(Error::SelfReference(_))
        ));
        Ok(())
    }

    #[test]
    fn test_correct_dereferences_current_literal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let producer = ModuleInvocation::new(
            "producer",
            module(),
            vec![ArgumentSlot::parametric(
                ArgKind::OutputFile,
                "out",
                Marker::Csv,
                "/data/produced.csv",
            )],
        )?;
        let source = producer.key(idx(1))?;

        let mut consumer = ModuleInvocation::new(
            "consumer",
            module(),
            vec![ArgumentSlot::parametric(
                ArgKind::InputFile,
                "in",
                Marker::Csv,
                "/data/stale.csv",
            )],
        )?;
        consumer.set_value(idx(1), source.into())?;

        let others = [producer];
        let dereferenced = consumer.correct_arguments(&others[..], &runtime_in(dir.path()))?;
        assert_eq!(vec![idx(1)], dereferenced);
        assert_eq!(Some("/data/produced.csv"), consumer.slot(idx(1))?.literal());
        Ok(())
    }

    #[test]
    fn test_temp_outputs_materialized() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut inv = ModuleInvocation::new(
            "m",
            module(),
            vec![
                ArgumentSlot::parametric(ArgKind::OutputFile, "csv", Marker::Csv, "")
                    .routed_to_temp(Some("table".to_owned()))?,
                ArgumentSlot::parametric(ArgKind::OutputFile, "xml", Marker::Xml, "")
                    .routed_to_temp(None)?,
                ArgumentSlot::parametric(ArgKind::OutputFile, "txt", Marker::Text, "")
                    .routed_to_temp(Some("ab".to_owned()))?,
                ArgumentSlot::parametric(ArgKind::OutputFile, "tmp", Marker::TempFile, "")
                    .routed_to_temp(None)?,
            ],
        )?;
        let no_refs: [ModuleInvocation; 0] = [];
        inv.correct_arguments(&no_refs[..], &runtime_in(dir.path()))?;

        let expected = [
            ("table", ".csv"),
            (temp::FALLBACK_PREFIX, ".xml"),
            (temp::FALLBACK_PREFIX, ".txt"),
            (temp::FALLBACK_PREFIX, temp::DEFAULT_EXTENSION),
        ];
        for (slot, (prefix, ext)) in inv.slots().iter().zip(expected) {
            let path = PathBuf::from(slot.literal().unwrap());
            assert_eq!(dir.path(), path.parent().unwrap());
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with(prefix), "{name} starts with {prefix}");
            assert!(name.ends_with(ext), "{name} ends with {ext}");
            assert!(OpenOptions::new().write(true).open(&path).is_ok());
        }

        // a second correction creates new files:
        let first = inv.slots()[0].literal().unwrap().to_owned();
        inv.correct_arguments(&no_refs[..], &runtime_in(dir.path()))?;
        assert_ne!(first, inv.slots()[0].literal().unwrap());
        Ok(())
    }

    #[test]
    fn test_failed_correction_leaves_state_alone() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut inv = ModuleInvocation::new(
            "m",
            module(),
            vec![
                ArgumentSlot::parametric(ArgKind::OutputFile, "out", Marker::Csv, "")
                    .routed_to_temp(None)?,
                ArgumentSlot::parametric(ArgKind::PlainText, "mode", Marker::Any, ""),
            ],
        )?;
        let no_refs: [ModuleInvocation; 0] = [];
        let err = inv
            .correct_arguments(&no_refs[..], &runtime_in(dir.path()))
            .unwrap_err();
        assert!(matches!(
            err.root(),
            Error::EmptyArgument {
                kind: ArgKind::PlainText,
                ..
            }
        ));
        assert_eq!(Some(""), inv.slots()[0].literal());
        // the temp file created before the failure was cleaned up:
        assert_eq!(0, std::fs::read_dir(dir.path())?.count());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unencodable_temp_dir_keeps_nothing() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = tempfile::tempdir()?;
        let dir = root.path().join(OsStr::from_bytes(b"tmp\xff"));
        std::fs::create_dir(&dir)?;
        let mut inv = ModuleInvocation::new(
            "m",
            module(),
            vec![
                ArgumentSlot::parametric(ArgKind::OutputFile, "a", Marker::Csv, "")
                    .routed_to_temp(None)?,
                ArgumentSlot::parametric(ArgKind::OutputFile, "b", Marker::Xml, "")
                    .routed_to_temp(None)?,
            ],
        )?;
        let no_refs: [ModuleInvocation; 0] = [];
        let err = inv
            .correct_arguments(&no_refs[..], &runtime_in(&dir))
            .unwrap_err();
        assert!(matches!(err.root(), Error::PathEncoding(_)));
        assert_eq!(Some(""), inv.slots()[0].literal());
        assert_eq!(0, std::fs::read_dir(&dir)?.count());
        Ok(())
    }

    #[test]
    fn test_dangling_reference_fails() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let gone = ModuleInvocation::new(
            "gone",
            module(),
            vec![ArgumentSlot::fixed(ArgKind::OutputFile, "out", "/x")],
        )?;
        let mut inv = ModuleInvocation::new(
            "m",
            module(),
            vec![ArgumentSlot::parametric(ArgKind::InputFile, "in", Marker::Any, "/x")],
        )?;
        inv.set_value(idx(1), gone.key(idx(1))?.into())?;
        let no_refs: [ModuleInvocation; 0] = [];
        let err = inv
            .correct_arguments(&no_refs[..], &runtime_in(dir.path()))
            .unwrap_err();
        assert!(matches!(err.root(), Error::DanglingReference { .. }));
        assert!(inv.slots()[0].value().reference().is_some());
        Ok(())
    }

    #[test]
    fn test_results_reset_independently() -> Result<()> {
        let mut inv = ModuleInvocation::new(
            "m",
            module(),
            vec![ArgumentSlot::fixed(ArgKind::PlainText, "a", "x")],
        )?;
        inv.set_results(ExecutionResult {
            exit_code: Some(0),
            status: ProcessStatus::Exited,
            ..ExecutionResult::default()
        });
        assert!(inv.is_succeeded());
        assert_eq!(RunState::Succeeded, inv.state());

        inv.reset_results();
        assert_eq!(RunState::Unexecuted, inv.state());
        assert_eq!(1, inv.slots().len());
        Ok(())
    }
}
