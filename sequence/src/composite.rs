use invocation::{
    ArgumentKey, ExecutionResult, InvocationId, ModuleInvocation, ProcessSpec, RunState, Runtime,
    SlotValue, ValidationHandler,
};

use crate::{DependencyGraph, Error, InvocationSequence, SequenceObserver};

/// A named pipeline: a sequence of invocations plus explicit run-order links.
///
/// Invocations are added and removed here so the sequence and the
/// run-order graph always have the same members.
#[derive(Debug, Default)]
pub struct MacroInvocation {
    name: String,
    sequence: InvocationSequence,
    graph: DependencyGraph,
    run_order_links: bool,
}

impl MacroInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_observer(name: impl Into<String>, observer: Box<dyn SequenceObserver>) -> Self {
        Self {
            name: name.into(),
            sequence: InvocationSequence::with_observer(observer),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sequence(&self) -> &InvocationSequence {
        &self.sequence
    }

    #[inline]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// True if the run-order graph decides execution order.
    pub fn run_order_links(&self) -> bool {
        self.run_order_links
    }

    pub fn set_run_order_links(&mut self, enabled: bool) {
        self.run_order_links = enabled;
    }

    pub fn get(&self, id: InvocationId) -> Result<&ModuleInvocation, Error> {
        self.sequence.get(id)
    }

    pub fn find(&self, name: &str) -> Option<&ModuleInvocation> {
        self.sequence.find(name)
    }

    // ---- structural changes ----

    pub fn push(&mut self, inv: ModuleInvocation) -> Result<InvocationId, Error> {
        let id = inv.id();
        self.sequence.push(inv)?;
        self.graph.add(id)?;
        Ok(id)
    }

    pub fn insert(&mut self, position: usize, inv: ModuleInvocation) -> Result<InvocationId, Error> {
        let id = inv.id();
        self.sequence.insert(position, inv)?;
        self.graph.add(id)?;
        Ok(id)
    }

    /// Remove `id` along with its relations and run-order edges.
    pub fn remove(&mut self, id: InvocationId) -> Result<ModuleInvocation, Error> {
        let inv = self.sequence.remove(id)?;
        self.graph.remove(id)?;
        Ok(inv)
    }

    pub fn clear(&mut self) -> Vec<ModuleInvocation> {
        self.graph.clear();
        self.sequence.clear()
    }

    // ---- run order ----

    /// Make `waiter` run only after `predecessor` has finished.
    pub fn connect(&mut self, waiter: InvocationId, predecessor: InvocationId) -> Result<bool, Error> {
        self.graph.connect(waiter, predecessor)
    }

    pub fn disconnect(&mut self, a: InvocationId, b: InvocationId) -> bool {
        self.graph.disconnect(a, b)
    }

    /// Order to run invocations in: a topological order of the run-order graph
    /// (ties broken by run number) when links are enabled, otherwise run number order.
    pub fn execution_order(&self) -> Result<Vec<InvocationId>, Error> {
        if !self.run_order_links {
            return Ok(self.sequence.ids().collect());
        }
        self.graph.topological_order(|id| {
            self.sequence
                .get(id)
                .map(ModuleInvocation::run_number)
                .ok()
        })
    }

    /// True if every invocation `id` waits for has finished.
    /// Always true when run-order links are disabled.
    pub fn is_ready(&self, id: InvocationId) -> Result<bool, Error> {
        if !self.run_order_links {
            return Ok(true);
        }
        self.graph.is_ready(id, |pred| {
            self.sequence
                .get(pred)
                .map_or(false, |inv| inv.result().is_terminal())
        })
    }

    /// Members `id` waits for that did not succeed.
    /// Always empty when run-order links are disabled.
    pub fn blocked_by(&self, id: InvocationId) -> Result<Vec<InvocationId>, Error> {
        if !self.run_order_links {
            return Ok(Vec::new());
        }
        let mut blockers: Vec<_> = self
            .graph
            .wait_set(id)?
            .filter(|pred| {
                self.sequence
                    .get(*pred)
                    .map_or(true, |inv| inv.state() != RunState::Succeeded)
            })
            .collect();
        blockers.sort();
        Ok(blockers)
    }

    // ---- delegated to the sequence ----

    pub fn link(&mut self, source: ArgumentKey, destination: ArgumentKey) -> Result<bool, Error> {
        self.sequence.link(source, destination)
    }

    pub fn unlink(&mut self, destination: ArgumentKey) -> Result<Option<ArgumentKey>, Error> {
        self.sequence.unlink(destination)
    }

    pub fn set_value(&mut self, key: ArgumentKey, value: SlotValue) -> Result<(), Error> {
        self.sequence.set_value(key, value)
    }

    pub fn update_relations(&mut self) -> Result<(), Error> {
        self.sequence.update_relations()
    }

    pub fn correct_arguments(&mut self, id: InvocationId, runtime: &Runtime) -> Result<(), Error> {
        self.sequence.correct_arguments(id, runtime)
    }

    pub fn build_process_spec(&self, id: InvocationId, runtime: &Runtime) -> Result<ProcessSpec, Error> {
        self.sequence.build_process_spec(id, runtime)
    }

    pub fn validate(&self, id: InvocationId, handler: &mut dyn ValidationHandler) -> Result<(), Error> {
        self.sequence.validate(id, handler)
    }

    pub fn set_results(&mut self, id: InvocationId, result: ExecutionResult) -> Result<(), Error> {
        self.sequence.set_results(id, result)
    }

    pub fn reset_results(&mut self) {
        self.sequence.reset_all_results();
    }
}
