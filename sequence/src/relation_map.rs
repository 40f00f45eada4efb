use invocation::{ArgumentKey, InvocationId};
use util::{HashMap, HashSet};

use crate::Error;

/// Data-flow edges between argument slots of different invocations.
///
/// Each destination has at most one source; each source may feed
/// any number of destinations. The two directions are kept as exact inverses.
#[derive(Debug, Clone, Default)]
pub struct RelationMap {
    /// destination -> source
    sources: HashMap<ArgumentKey, ArgumentKey>,
    /// source -> destinations
    destinations: HashMap<ArgumentKey, HashSet<ArgumentKey>>,
}

impl RelationMap {
    /// Make `source` the single source of `destination`,
    /// replacing any previous source. Returns true if anything changed.
    pub fn put(&mut self, source: ArgumentKey, destination: ArgumentKey) -> Result<bool, Error> {
        if source.invocation() == destination.invocation() {
            return Err(Error::SelfRelation(source, destination));
        }
        if self.sources.get(&destination) == Some(&source) {
            return Ok(false);
        }
        if let Some(old) = self.sources.insert(destination, source) {
            self.detach(old, destination);
        }
        self.destinations
            .entry(source)
            .or_default()
            .insert(destination);
        log::trace!("relation {source} -> {destination}");
        Ok(true)
    }

    /// Remove the edge leading into `destination`, returning its source.
    pub fn remove_destination(&mut self, destination: &ArgumentKey) -> Option<ArgumentKey> {
        let source = self.sources.remove(destination)?;
        self.detach(source, *destination);
        Some(source)
    }

    /// Remove every edge where `key` is the source or the destination.
    pub fn remove_relations(&mut self, key: &ArgumentKey) -> bool {
        let mut changed = self.remove_destination(key).is_some();
        if let Some(destinations) = self.destinations.remove(key) {
            for destination in destinations {
                self.sources.remove(&destination);
            }
            changed = true;
        }
        changed
    }

    /// Remove every edge touching any slot of invocation `id`.
    pub fn remove_invocation(&mut self, id: InvocationId) -> bool {
        let before = self.sources.len();
        self.sources
            .retain(|dest, src| dest.invocation() != id && src.invocation() != id);
        self.destinations.retain(|src, dests| {
            if src.invocation() == id {
                return false;
            }
            dests.retain(|dest| dest.invocation() != id);
            !dests.is_empty()
        });
        before != self.sources.len()
    }

    pub fn source_of(&self, destination: &ArgumentKey) -> Option<ArgumentKey> {
        self.sources.get(destination).copied()
    }

    /// Iterate through the destinations fed by `source`, in no particular order.
    pub fn destinations_of(&self, source: &ArgumentKey) -> impl Iterator<Item = ArgumentKey> + '_ {
        self.destinations.get(source).into_iter().flatten().copied()
    }

    /// Iterate through every edge as `(source, destination)`.
    pub fn iter(&self) -> impl Iterator<Item = (ArgumentKey, ArgumentKey)> + '_ {
        self.sources.iter().map(|(dest, src)| (*src, *dest))
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.destinations.clear();
    }

    fn detach(&mut self, source: ArgumentKey, destination: ArgumentKey) {
        if let Some(dests) = self.destinations.get_mut(&source) {
            dests.remove(&destination);
            if dests.is_empty() {
                self.destinations.remove(&source);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use invocation::{ArgKind, ArgumentSlot, ModuleInvocation, ModuleKind, ModuleRef, SlotIndex};

    fn invocation() -> Result<ModuleInvocation> {
        let slots = (0..3)
            .map(|i| ArgumentSlot::fixed(ArgKind::PlainText, format!("a{i}"), "x"))
            .collect();
        Ok(ModuleInvocation::new(
            "m",
            ModuleRef::new(ModuleKind::Macro, "/m.ijm"),
            slots,
        )?)
    }

    fn key(inv: &ModuleInvocation, i: usize) -> Result<ArgumentKey> {
        Ok(inv.key(SlotIndex::new(i)?)?)
    }

    fn dests(map: &RelationMap, src: &ArgumentKey) -> Vec<ArgumentKey> {
        let mut v: Vec<_> = map.destinations_of(src).collect();
        v.sort();
        v
    }

    #[test]
    fn test_put_rejects_same_invocation() -> Result<()> {
        let a = invocation()?;
        let mut map = RelationMap::default();
        assert!(matches!(
            map.put(key(&a, 1)?, key(&a, 2)?),
            Err(Error::SelfRelation(_, _))
        ));
        assert!(map.is_empty());
        Ok(())
    }

    #[test]
    fn test_put_is_mirrored() -> Result<()> {
        let (a, b) = (invocation()?, invocation()?);
        let (s, d) = (key(&a, 1)?, key(&b, 2)?);
        let mut map = RelationMap::default();

        assert!(map.put(s, d)?);
        assert_eq!(Some(s), map.source_of(&d));
        assert_eq!(vec![d], dests(&map, &s));
        // same edge again is a no-op:
        assert!(!map.put(s, d)?);
        assert_eq!(1, map.len());
        Ok(())
    }

    #[test]
    fn test_rebind_moves_destination() -> Result<()> {
        let (a, b, c) = (invocation()?, invocation()?, invocation()?);
        let (s1, s2, d) = (key(&a, 1)?, key(&b, 1)?, key(&c, 3)?);
        let mut map = RelationMap::default();

        map.put(s1, d)?;
        map.put(s2, d)?;
        assert_eq!(Some(s2), map.source_of(&d));
        assert!(dests(&map, &s1).is_empty());
        assert_eq!(vec![d], dests(&map, &s2));
        Ok(())
    }

    #[test]
    fn test_remove_relations_both_directions() -> Result<()> {
        let (a, b, c) = (invocation()?, invocation()?, invocation()?);
        let mut map = RelationMap::default();
        map.put(key(&a, 1)?, key(&b, 1)?)?;
        map.put(key(&b, 1)?, key(&c, 1)?)?;
        map.put(key(&a, 1)?, key(&c, 2)?)?;

        assert!(map.remove_relations(&key(&b, 1)?));
        assert_eq!(None, map.source_of(&key(&b, 1)?));
        assert_eq!(None, map.source_of(&key(&c, 1)?));
        assert_eq!(vec![key(&c, 2)?], dests(&map, &key(&a, 1)?));
        assert!(!map.remove_relations(&key(&b, 1)?));
        Ok(())
    }

    #[test]
    fn test_remove_invocation() -> Result<()> {
        let (a, b, c) = (invocation()?, invocation()?, invocation()?);
        let mut map = RelationMap::default();
        map.put(key(&a, 1)?, key(&b, 1)?)?;
        map.put(key(&b, 2)?, key(&c, 1)?)?;
        map.put(key(&a, 2)?, key(&c, 2)?)?;

        assert!(map.remove_invocation(b.id()));
        assert_eq!(1, map.len());
        assert!(map.iter().all(|(s, d)| s.invocation() != b.id() && d.invocation() != b.id()));
        assert!(dests(&map, &key(&a, 1)?).is_empty());
        assert!(!map.remove_invocation(b.id()));
        Ok(())
    }

    #[test]
    fn test_clone_is_independent() -> Result<()> {
        let (a, b) = (invocation()?, invocation()?);
        let mut map = RelationMap::default();
        map.put(key(&a, 1)?, key(&b, 1)?)?;

        let copy = map.clone();
        map.clear();
        assert_eq!(Some(key(&a, 1)?), copy.source_of(&key(&b, 1)?));
        assert!(map.is_empty());
        Ok(())
    }
}
