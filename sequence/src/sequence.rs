use std::fmt;

use invocation::{
    ArgumentKey, Direction, ExecutionResult, InvocationId, ModuleInvocation, ProcessSpec,
    ReferenceLookup, RunNumber, Runtime, SlotValue, ValidationHandler,
};
use util::HashMap;

use crate::{Error, RelationMap, SequenceObserver};

/// Where a sequence stands relative to its last relation inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Empty,
    /// changed since relations were last inferred
    Modified,
    /// relations are up to date
    Related,
}

/// Ordered invocations, plus the data-flow relations between their slots.
///
/// Every change to a slot's reference goes through this type,
/// so the embedded references and the relation map always agree.
pub struct InvocationSequence {
    invocations: Vec<ModuleInvocation>,
    relations: RelationMap,
    state: SequenceState,
    observer: Option<Box<dyn SequenceObserver>>,
}

impl Default for InvocationSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InvocationSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationSequence")
            .field("invocations", &self.invocations)
            .field("relations", &self.relations)
            .field("state", &self.state)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl InvocationSequence {
    pub fn new() -> Self {
        Self {
            invocations: Vec::new(),
            relations: RelationMap::default(),
            state: SequenceState::Empty,
            observer: None,
        }
    }

    /// Create an empty sequence that reports structural changes to `observer`.
    pub fn with_observer(observer: Box<dyn SequenceObserver>) -> Self {
        Self {
            observer: Some(observer),
            ..Self::new()
        }
    }

    #[inline]
    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Read-only view of the inferred relations.
    #[inline]
    pub fn relations(&self) -> &RelationMap {
        &self.relations
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleInvocation> {
        self.invocations.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = InvocationId> + '_ {
        self.invocations.iter().map(ModuleInvocation::id)
    }

    pub fn contains(&self, id: InvocationId) -> bool {
        self.invocations.iter().any(|inv| inv.id() == id)
    }

    /// 0-based position of invocation `id`.
    pub fn position(&self, id: InvocationId) -> Result<usize, Error> {
        self.invocations
            .iter()
            .position(|inv| inv.id() == id)
            .ok_or(Error::UnknownInvocation(id))
    }

    pub fn get(&self, id: InvocationId) -> Result<&ModuleInvocation, Error> {
        Ok(&self.invocations[self.position(id)?])
    }

    /// Find an invocation by its human name.
    pub fn find(&self, name: &str) -> Option<&ModuleInvocation> {
        self.invocations.iter().find(|inv| inv.name() == name)
    }

    fn get_mut(&mut self, id: InvocationId) -> Result<&mut ModuleInvocation, Error> {
        let pos = self.position(id)?;
        Ok(&mut self.invocations[pos])
    }

    // ---- structural changes ----

    /// Append `inv`. No existing reference can be affected.
    pub fn push(&mut self, inv: ModuleInvocation) -> Result<RunNumber, Error> {
        let position = self.invocations.len();
        self.insert(position, inv)
    }

    /// Insert `inv` at `position`, undoing any reference that spans it
    /// (the new invocation may be a nearer source for those slots).
    pub fn insert(&mut self, position: usize, inv: ModuleInvocation) -> Result<RunNumber, Error> {
        if self.contains(inv.id()) {
            return Err(Error::DuplicateInvocation(inv.id()));
        }
        let len = self.invocations.len();
        if position > len {
            return Err(Error::PositionOutOfRange { position, len });
        }

        if position < len {
            let positions = self.positions();
            self.undo_references(|dest_pos, source| {
                dest_pos >= position
                    && positions
                        .get(&source.invocation())
                        .map_or(false, |src_pos| *src_pos < position)
            });
        }

        self.invocations.insert(position, inv);
        self.renumber();
        self.state = SequenceState::Modified;
        if let Some(observer) = self.observer.as_mut() {
            observer.inserted(&self.invocations[position], position);
        }
        Ok(RunNumber::for_position(position))
    }

    /// Remove invocation `id`, undoing every reference to or from it.
    pub fn remove(&mut self, id: InvocationId) -> Result<ModuleInvocation, Error> {
        let position = self.position(id)?;
        self.undo_references(|_, source| source.invocation() == id);
        self.relations.remove_invocation(id);

        let mut inv = self.invocations.remove(position);
        let restored: Vec<_> = inv.references().map(|(index, _)| index).collect();
        for index in restored {
            inv.restore_literal(index);
        }
        self.renumber();
        self.state = if self.invocations.is_empty() {
            SequenceState::Empty
        } else {
            SequenceState::Modified
        };
        if let Some(observer) = self.observer.as_mut() {
            observer.removed(&inv);
        }
        Ok(inv)
    }

    /// Remove every invocation, undoing every reference.
    pub fn clear(&mut self) -> Vec<ModuleInvocation> {
        self.undo_references(|_, _| true);
        self.relations.clear();
        self.state = SequenceState::Empty;
        if let Some(observer) = self.observer.as_mut() {
            observer.cleared();
        }
        std::mem::take(&mut self.invocations)
    }

    // ---- edges ----

    /// Point `destination` at `source`, recording the relation.
    /// `source` must be an output slot and `destination` an input slot
    /// of a different invocation.
    pub fn link(&mut self, source: ArgumentKey, destination: ArgumentKey) -> Result<bool, Error> {
        if source.invocation() == destination.invocation() {
            return Err(Error::SelfRelation(source, destination));
        }
        let source_kind = self.get(source.invocation())?.slot(source.index())?.kind();
        if source_kind.direction() != Direction::Output {
            return Err(Error::NotOutput(source, source_kind));
        }
        let dest_kind = self
            .get(destination.invocation())?
            .slot(destination.index())?
            .kind();
        if dest_kind.direction() != Direction::Input {
            return Err(Error::NotInput(destination, dest_kind));
        }

        self.get_mut(destination.invocation())?
            .set_value(destination.index(), source.into())?;
        let changed = self.relations.put(source, destination)?;
        if changed {
            self.state = SequenceState::Modified;
        }
        Ok(changed)
    }

    /// Undo the reference held by `destination`, restoring its last literal.
    /// Returns the source it pointed at, if any.
    pub fn unlink(&mut self, destination: ArgumentKey) -> Result<Option<ArgumentKey>, Error> {
        let source = self
            .get_mut(destination.invocation())?
            .restore_literal(destination.index());
        self.relations.remove_destination(&destination);
        if source.is_some() {
            self.state = SequenceState::Modified;
        }
        Ok(source)
    }

    /// Set the value of the slot at `key`.
    /// A reference value is the same as calling `link`.
    pub fn set_value(&mut self, key: ArgumentKey, value: SlotValue) -> Result<(), Error> {
        match value {
            SlotValue::Reference(source) => self.link(source, key).map(|_| ()),
            literal => {
                self.get_mut(key.invocation())?
                    .set_value(key.index(), literal)?;
                self.relations.remove_destination(&key);
                self.state = SequenceState::Modified;
                Ok(())
            }
        }
    }

    /// Rename invocation `id`.
    pub fn set_name(&mut self, id: InvocationId, name: impl Into<String>) -> Result<(), Error> {
        self.get_mut(id)?.set_name(name);
        Ok(())
    }

    /// Rebuild the relation map from scratch.
    ///
    /// One pass in order: each invocation's parametric inputs bind to the
    /// nearest preceding output with an equal, non-empty literal; then its own
    /// outputs become the nearest source for later invocations.
    /// References that are already set are kept unless their source is gone.
    pub fn update_relations(&mut self) -> Result<(), Error> {
        self.relations.clear();
        let slot_counts: HashMap<InvocationId, usize> = self
            .invocations
            .iter()
            .map(|inv| (inv.id(), inv.slots().len()))
            .collect();
        let source_exists = |key: &ArgumentKey| {
            slot_counts
                .get(&key.invocation())
                .map_or(false, |len| key.index().get() <= *len)
        };

        let mut latest_output: HashMap<String, ArgumentKey> = HashMap::default();
        for inv in self.invocations.iter_mut() {
            let mut bindings = Vec::new();
            let mut dangling = Vec::new();

            for (key, slot) in inv.keyed_slots() {
                if slot.is_fixed() || slot.kind().direction() != Direction::Input {
                    continue;
                }
                match slot.value() {
                    SlotValue::Reference(source) if source_exists(source) => {
                        bindings.push((key, *source))
                    }
                    SlotValue::Reference(_) => dangling.push(key),
                    SlotValue::Literal(lit) if !lit.is_empty() => {
                        if let Some(source) = latest_output.get(lit) {
                            bindings.push((key, *source));
                        }
                    }
                    SlotValue::Literal(_) => {}
                }
            }

            for (key, slot) in inv.keyed_slots() {
                if slot.kind().direction() != Direction::Output {
                    continue;
                }
                if let Some(lit) = slot.literal().filter(|lit| !lit.is_empty()) {
                    latest_output.insert(lit.to_owned(), key);
                }
            }

            for key in dangling {
                log::debug!("undoing dangling reference in {key}");
                inv.restore_literal(key.index());
            }
            for (dest, source) in bindings {
                inv.set_value(dest.index(), source.into())?;
                self.relations.put(source, dest)?;
            }
        }

        log::debug!(
            "inferred {} relations over {} invocations",
            self.relations.len(),
            self.invocations.len()
        );
        self.state = if self.invocations.is_empty() {
            SequenceState::Empty
        } else {
            SequenceState::Related
        };
        Ok(())
    }

    // ---- run time ----

    /// Resolve the arguments of invocation `id`, reading referenced
    /// values straight from the other invocations.
    /// Relations consumed by the correction are dropped.
    pub fn correct_arguments(&mut self, id: InvocationId, runtime: &Runtime) -> Result<(), Error> {
        let position = self.position(id)?;
        let (before, rest) = self.invocations.split_at_mut(position);
        let Some((target, after)) = rest.split_first_mut() else {
            return Err(Error::UnknownInvocation(id));
        };
        let lookup = Neighbours {
            before: &*before,
            after: &*after,
        };
        let dereferenced = target.correct_arguments(&lookup, runtime)?;

        for index in dereferenced {
            self.relations
                .remove_destination(&ArgumentKey::new(id, index));
        }
        self.state = SequenceState::Modified;
        Ok(())
    }

    pub fn build_process_spec(&self, id: InvocationId, runtime: &Runtime) -> Result<ProcessSpec, Error> {
        Ok(self.get(id)?.build_process_spec(runtime)?)
    }

    pub fn validate(&self, id: InvocationId, handler: &mut dyn ValidationHandler) -> Result<(), Error> {
        self.get(id)?.validate(handler);
        Ok(())
    }

    pub fn set_results(&mut self, id: InvocationId, result: ExecutionResult) -> Result<(), Error> {
        self.get_mut(id)?.set_results(result);
        Ok(())
    }

    pub fn reset_results(&mut self, id: InvocationId) -> Result<(), Error> {
        self.get_mut(id)?.reset_results();
        Ok(())
    }

    /// Forget the results of every invocation.
    pub fn reset_all_results(&mut self) {
        for inv in &mut self.invocations {
            inv.reset_results();
        }
    }

    // ---- internals ----

    fn positions(&self) -> HashMap<InvocationId, usize> {
        self.ids().enumerate().map(|(pos, id)| (id, pos)).collect()
    }

    fn renumber(&mut self) {
        for (pos, inv) in self.invocations.iter_mut().enumerate() {
            inv.set_run_number(RunNumber::for_position(pos));
        }
    }

    /// Restore the literal of every reference for which
    /// `affected(destination position, source key)` holds, dropping its relation.
    fn undo_references<F>(&mut self, affected: F)
    where
        F: Fn(usize, ArgumentKey) -> bool,
    {
        for (pos, inv) in self.invocations.iter_mut().enumerate() {
            let undo: Vec<_> = inv
                .references()
                .filter(|(_, source)| affected(pos, *source))
                .map(|(index, _)| index)
                .collect();
            for index in undo {
                inv.restore_literal(index);
                let dest = ArgumentKey::new(inv.id(), index);
                log::trace!("undoing reference in {dest}");
                self.relations.remove_destination(&dest);
            }
        }
    }
}

/// Every invocation but the one being corrected.
struct Neighbours<'a> {
    before: &'a [ModuleInvocation],
    after: &'a [ModuleInvocation],
}

impl ReferenceLookup for Neighbours<'_> {
    fn slot_value(&self, key: &ArgumentKey) -> Option<&SlotValue> {
        self.before
            .slot_value(key)
            .or_else(|| self.after.slot_value(key))
    }
}
