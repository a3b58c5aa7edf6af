//! Wire handle table.
//!
//! Handles are assigned sequentially from [`BASE_WIRE_HANDLE`] in the order
//! referenceable objects appear. A reset marker clears the table; objects
//! already decoded stay in the heap and keep their identity.

use crate::error::{Error, Result};
use crate::graph::Value;
use tracing::trace;

/// First handle assigned after a stream start or reset
pub const BASE_WIRE_HANDLE: u32 = 0x7E_0000;

/// Maps wire handles to decoded values
#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    entries: Vec<Value>,
    epoch: u64,
}

impl HandleTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next handle to a value
    pub fn assign(&mut self, value: Value) -> u32 {
        let handle = self.next_handle();
        self.entries.push(value);
        trace!("Assigned handle {:#x}", handle);
        handle
    }

    /// Returns the value registered for a handle
    pub fn get(&self, handle: u32) -> Option<Value> {
        let index = handle.checked_sub(BASE_WIRE_HANDLE)?;
        self.entries.get(index as usize).copied()
    }

    /// Replaces the value of a handle after substitution
    ///
    /// Fails with [`Error::IllegalState`] if the handle does not currently
    /// hold `old`.
    pub fn replace(&mut self, handle: u32, old: Value, new: Value) -> Result<()> {
        let slot = handle
            .checked_sub(BASE_WIRE_HANDLE)
            .and_then(|index| self.entries.get_mut(index as usize));
        match slot {
            Some(slot) if *slot == old => {
                *slot = new;
                Ok(())
            }
            _ => Err(Error::illegal_state(format!(
                "handle {handle:#x} does not hold the object being replaced"
            ))),
        }
    }

    /// Forgets all handles
    pub fn reset(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }

    /// Handle the next assignment will receive
    pub fn next_handle(&self) -> u32 {
        BASE_WIRE_HANDLE + self.entries.len() as u32
    }

    /// Number of resets seen so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no handles are live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest handle holding the given value
    pub fn find(&self, value: &Value) -> Option<u32> {
        self.entries
            .iter()
            .rposition(|v| v == value)
            .map(|index| BASE_WIRE_HANDLE + index as u32)
    }

    /// Iterates live handles in assignment order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, v)| (BASE_WIRE_HANDLE + i as u32, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sequential_assignment() {
        let mut table = HandleTable::new();
        assert_eq!(table.assign(Value::Int(1)), 0x7E_0000);
        assert_eq!(table.assign(Value::Int(2)), 0x7E_0001);
        assert_eq!(table.next_handle(), 0x7E_0002);
        assert_eq!(table.get(0x7E_0001), Some(Value::Int(2)));
        assert_eq!(table.get(0x7E_0002), None);
        assert_eq!(table.get(0x12), None);
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let mut table = HandleTable::new();
        table.assign(Value::Null);
        table.assign(Value::Null);
        table.reset();

        assert_eq!(table.epoch(), 1);
        assert!(table.is_empty());
        assert_eq!(table.get(BASE_WIRE_HANDLE), None);
        assert_eq!(table.assign(Value::Boolean(true)), BASE_WIRE_HANDLE);
    }

    #[test]
    fn test_replace() {
        let mut table = HandleTable::new();
        let handle = table.assign(Value::Int(7));

        assert!(matches!(
            table.replace(handle, Value::Int(8), Value::Int(9)),
            Err(Error::IllegalState(_))
        ));
        table.replace(handle, Value::Int(7), Value::Int(9)).unwrap();
        assert_eq!(table.get(handle), Some(Value::Int(9)));
        assert_eq!(table.find(&Value::Int(9)), Some(handle));
        assert!(table.replace(handle + 1, Value::Int(9), Value::Null).is_err());
    }
}
