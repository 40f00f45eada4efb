use std::cmp::Reverse;
use std::collections::BinaryHeap;

use invocation::InvocationId;
use util::{HashMap, HashSet};

use crate::Error;

#[derive(Debug, Default, Clone)]
struct Edges {
    /// members that must finish before this one
    wait: HashSet<InvocationId>,
    /// members waiting on this one
    next: HashSet<InvocationId>,
}

/// Explicit run-order constraints between invocations,
/// kept separately from the data-flow relations.
///
/// `a` is in `b`'s wait set exactly when `b` is in `a`'s next set.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    members: HashMap<InvocationId, Edges>,
}

impl DependencyGraph {
    pub fn add(&mut self, id: InvocationId) -> Result<(), Error> {
        if self.members.contains_key(&id) {
            return Err(Error::DuplicateInvocation(id));
        }
        self.members.insert(id, Edges::default());
        Ok(())
    }

    /// Remove `id` along with every edge touching it.
    pub fn remove(&mut self, id: InvocationId) -> Result<(), Error> {
        let edges = self
            .members
            .remove(&id)
            .ok_or(Error::UnknownInvocation(id))?;
        for pred in edges.wait {
            if let Some(e) = self.members.get_mut(&pred) {
                e.next.remove(&id);
            }
        }
        for succ in edges.next {
            if let Some(e) = self.members.get_mut(&succ) {
                e.wait.remove(&id);
            }
        }
        Ok(())
    }

    pub fn contains(&self, id: InvocationId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Make `waiter` wait for `predecessor`. Returns true if the edge is new.
    pub fn connect(&mut self, waiter: InvocationId, predecessor: InvocationId) -> Result<bool, Error> {
        if waiter == predecessor {
            return Err(Error::SelfEdge(waiter));
        }
        self.check_member(predecessor)?;
        let added = self
            .members
            .get_mut(&waiter)
            .ok_or(Error::UnknownInvocation(waiter))?
            .wait
            .insert(predecessor);
        if let Some(e) = self.members.get_mut(&predecessor) {
            e.next.insert(waiter);
        }
        if added {
            log::debug!("{waiter} now waits for {predecessor}");
        }
        Ok(added)
    }

    /// Remove the edge between `a` and `b`, in whichever direction it exists.
    /// Returns true if there was one.
    pub fn disconnect(&mut self, a: InvocationId, b: InvocationId) -> bool {
        let forward = self.unlink(a, b);
        let backward = self.unlink(b, a);
        forward || backward
    }

    /// Members `id` waits for.
    pub fn wait_set(&self, id: InvocationId) -> Result<impl Iterator<Item = InvocationId> + '_, Error> {
        Ok(self.edges(id)?.wait.iter().copied())
    }

    /// Members waiting for `id`.
    pub fn next_set(&self, id: InvocationId) -> Result<impl Iterator<Item = InvocationId> + '_, Error> {
        Ok(self.edges(id)?.next.iter().copied())
    }

    /// True if every member `id` waits for is in a terminal state.
    pub fn is_ready<F>(&self, id: InvocationId, is_terminal: F) -> Result<bool, Error>
    where
        F: Fn(InvocationId) -> bool,
    {
        Ok(self.edges(id)?.wait.iter().all(|pred| is_terminal(*pred)))
    }

    /// Fail if the wait edges contain a cycle.
    pub fn check_acyclic(&self) -> Result<(), Error> {
        self.topological_order(|id| id).map(|_| ())
    }

    /// Every member, each after all the members it waits for.
    /// Among members that are ready at the same time, the one with
    /// the smallest `priority` comes first.
    pub fn topological_order<K, F>(&self, priority: F) -> Result<Vec<InvocationId>, Error>
    where
        K: Ord,
        F: Fn(InvocationId) -> K,
    {
        let mut waiting: HashMap<InvocationId, usize> = HashMap::default();
        let mut ready = BinaryHeap::new();
        for (id, edges) in &self.members {
            if edges.wait.is_empty() {
                ready.push(Reverse((priority(*id), *id)));
            } else {
                waiting.insert(*id, edges.wait.len());
            }
        }

        let mut order = Vec::with_capacity(self.members.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for succ in &self.members[&id].next {
                if let Some(count) = waiting.get_mut(succ) {
                    *count -= 1;
                    if *count == 0 {
                        waiting.remove(succ);
                        ready.push(Reverse((priority(*succ), *succ)));
                    }
                }
            }
        }

        match waiting.keys().min() {
            Some(id) => Err(Error::Cycle(*id)),
            None => Ok(order),
        }
    }

    fn edges(&self, id: InvocationId) -> Result<&Edges, Error> {
        self.members.get(&id).ok_or(Error::UnknownInvocation(id))
    }

    fn check_member(&self, id: InvocationId) -> Result<(), Error> {
        self.edges(id).map(|_| ())
    }

    // remove `waiter` waiting for `pred`, both sides.
    fn unlink(&mut self, waiter: InvocationId, pred: InvocationId) -> bool {
        let removed = self
            .members
            .get_mut(&waiter)
            .map_or(false, |e| e.wait.remove(&pred));
        if let Some(e) = self.members.get_mut(&pred) {
            e.next.remove(&waiter);
        }
        removed
    }
}
