//! Generation-checked slot storage backing geom and space handles.
//!
//! Each slot carries a generation that is bumped when its value is removed, so a handle
//! to a destroyed object is rejected instead of silently aliasing whatever reuses the
//! slot later.

/// Index plus generation of an occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

/// A `Vec` of slots that reuses freed locations.
#[derive(Debug)]
pub struct Slots<V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
}

impl<V> Default for Slots<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Slots<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn insert(&mut self, value: V) -> SlotKey {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            SlotKey {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            SlotKey {
                index,
                generation: 0,
            }
        }
    }

    /// Insert a value that needs to know its own key up front.
    pub fn insert_with_key(&mut self, make: impl FnOnce(SlotKey) -> V) -> SlotKey {
        let key = self.next_key();
        let inserted = self.insert(make(key));
        debug_assert_eq!(key, inserted);
        inserted
    }

    fn next_key(&self) -> SlotKey {
        match self.free.last() {
            Some(&index) => SlotKey {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => SlotKey {
                index: self.slots.len() as u32,
                generation: 0,
            },
        }
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<V> {
        let slot = self.slots.get_mut(key.index())?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        Some(value)
    }

    #[inline]
    pub fn get(&self, key: SlotKey) -> Option<&V> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut V> {
        self.slots
            .get_mut(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.get(a), Some(&"a"));
        assert_eq!(slots.remove(a), Some("a"));
        assert_eq!(slots.get(a), None);
        assert_eq!(slots.get(b), Some(&"b"));
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_stale_key_rejected_after_reuse() {
        let mut slots = Slots::new();
        let a = slots.insert(1);
        slots.remove(a);
        let c = slots.insert(3);
        assert_eq!(a.index(), c.index());
        assert_ne!(a.generation(), c.generation());
        assert_eq!(slots.get(a), None);
        assert_eq!(slots.remove(a), None);
        assert_eq!(slots.get(c), Some(&3));
    }

    #[test]
    fn test_insert_with_key_sees_own_key() {
        let mut slots = Slots::new();
        let first = slots.insert(SlotKey { index: 99, generation: 99 });
        slots.remove(first);
        let key = slots.insert_with_key(|key| key);
        assert_eq!(slots.get(key), Some(&key));
    }
}
