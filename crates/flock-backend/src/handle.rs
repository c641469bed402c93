//! Slot+generation table for loaded-model lifetimes.
//!
//! Released handles carry a stale generation and resolve to `None`
//! instead of aliasing a model loaded later into the same slot.
//! Double-release is a safe no-op.

use crate::backend::ModelHandle;

/// Handle encoding: upper 32 bits = slot index, lower 32 bits = generation.
fn encode(slot: u32, generation: u32) -> ModelHandle {
    ModelHandle::from_raw(((slot as u64) << 32) | (generation as u64))
}

fn decode(handle: ModelHandle) -> (u32, u32) {
    let raw = handle.raw();
    ((raw >> 32) as u32, raw as u32)
}

struct Slot<T> {
    generation: u32,
    data: Option<T>,
}

/// Lookup outcome distinguishing never-issued from already-released handles.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Stale {
    Unknown,
    Released,
}

pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
}

impl<T> HandleTable<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> ModelHandle {
        if let Some(slot_idx) = self.free_list.pop() {
            let slot = &mut self.slots[slot_idx as usize];
            slot.data = Some(value);
            encode(slot_idx, slot.generation)
        } else {
            let slot_idx = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                data: Some(value),
            });
            encode(slot_idx, 0)
        }
    }

    pub fn get(&self, handle: ModelHandle) -> Result<&T, Stale> {
        let (slot_idx, generation) = decode(handle);
        let slot = self.slots.get(slot_idx as usize).ok_or(Stale::Unknown)?;
        if generation > slot.generation {
            return Err(Stale::Unknown);
        }
        if generation < slot.generation {
            return Err(Stale::Released);
        }
        slot.data.as_ref().ok_or(Stale::Released)
    }

    /// Remove the value behind a handle.
    ///
    /// Bumps the slot generation. A slot whose generation wraps to zero is
    /// retired rather than recycled, so a wrapped generation can never
    /// resurrect a stale handle.
    pub fn remove(&mut self, handle: ModelHandle) -> Result<T, Stale> {
        self.get(handle)?;
        let (slot_idx, _) = decode(handle);
        let slot = &mut self.slots[slot_idx as usize];
        let value = slot.data.take().ok_or(Stale::Released)?;
        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation != 0 {
            self.free_list.push(slot_idx);
        }
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.data.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_round_trip() {
        let mut table = HandleTable::new();
        let h = table.insert(42i32);
        assert_eq!(table.get(h), Ok(&42));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn released_handle_is_stale_after_slot_reuse() {
        let mut table = HandleTable::new();
        let h1 = table.insert("first");
        assert_eq!(table.remove(h1), Ok("first"));
        let h2 = table.insert("second");
        assert_ne!(h1, h2);
        assert_eq!(table.get(h1), Err(Stale::Released));
        assert_eq!(table.get(h2), Ok(&"second"));
    }

    #[test]
    fn double_remove_reports_released() {
        let mut table = HandleTable::new();
        let h = table.insert(1u8);
        table.remove(h).unwrap();
        assert_eq!(table.remove(h), Err(Stale::Released));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn never_issued_handle_is_unknown() {
        let table: HandleTable<u8> = HandleTable::new();
        assert_eq!(table.get(ModelHandle::from_raw(5 << 32)), Err(Stale::Unknown));
    }
}
