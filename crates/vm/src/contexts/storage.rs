//! Storage context state: the account whose storage the current frame
//! addresses, plus the protected-key configuration. The metered load and
//! store operations that combine this state with the output overlay and
//! the blockchain hook live on [`crate::host::VmHost`].

use warx_common::Address;

/// Result of a storage write, reported back to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum StorageStatus {
    Unchanged = 0,
    Added = 1,
    Modified = 2,
    Deleted = 3,
}

/// Inner prefix (beneath the protected prefix) of time-lock entries.
pub const TIMELOCK_KEY_PREFIX: &[u8] = b"timelock";
/// Inner prefix (beneath the protected prefix) of pending async-call
/// records.
pub const ASYNC_DATA_PREFIX: &[u8] = b"asyncCalls";

pub struct StorageContext {
    address: Address,
    protected_key_prefix: Vec<u8>,
    state_stack: Vec<Address>,
}

impl StorageContext {
    pub fn new(protected_key_prefix: Vec<u8>) -> Self {
        StorageContext {
            address: Address::zero(),
            protected_key_prefix,
            state_stack: Vec::new(),
        }
    }

    pub fn init_state(&mut self) {
        self.address = Address::zero();
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(self.address);
    }

    pub fn pop_set_active_state(&mut self) {
        if let Some(previous) = self.state_stack.pop() {
            self.address = previous;
        }
    }

    pub fn pop_discard(&mut self) {
        self.state_stack.pop();
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    pub fn state_stack_len(&self) -> usize {
        self.state_stack.len()
    }

    /// The account whose storage this frame reads and writes.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn is_protected_key(&self, key: &[u8]) -> bool {
        !self.protected_key_prefix.is_empty() && key.starts_with(&self.protected_key_prefix)
    }

    /// `protectedPrefix ∥ inner ∥ key`
    pub fn protected_key(&self, inner_prefix: &[u8], key: &[u8]) -> Vec<u8> {
        let mut full = self.protected_key_prefix.clone();
        full.extend_from_slice(inner_prefix);
        full.extend_from_slice(key);
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_prefix_detection() {
        let storage = StorageContext::new(b"N$".to_vec());
        assert!(storage.is_protected_key(b"N$anything"));
        assert!(!storage.is_protected_key(b"user-key"));
        assert_eq!(
            storage.protected_key(ASYNC_DATA_PREFIX, b"txhash"),
            b"N$asyncCallstxhash".to_vec()
        );
    }

    #[test]
    fn address_stack() {
        let mut storage = StorageContext::new(Vec::new());
        storage.set_address(Address([1; 32]));
        storage.push_state();
        storage.set_address(Address([2; 32]));
        storage.pop_set_active_state();
        assert_eq!(storage.address(), Address([1; 32]));
    }
}
