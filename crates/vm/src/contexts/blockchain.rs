//! Thin adapter over the external blockchain hook, plus the snapshot
//! stack used to revert hook-side state when a nested frame fails.

use std::rc::Rc;

use num_bigint::BigUint;
use warx_common::Address;

use crate::errors::VMError;
use crate::hooks::BlockchainHook;

pub struct BlockchainContext {
    hook: Rc<dyn BlockchainHook>,
    snapshots: Vec<u64>,
}

impl BlockchainContext {
    pub fn new(hook: Rc<dyn BlockchainHook>) -> Self {
        BlockchainContext {
            hook,
            snapshots: Vec::new(),
        }
    }

    pub fn hook(&self) -> &dyn BlockchainHook {
        self.hook.as_ref()
    }

    pub fn init_state(&mut self) {
        self.snapshots.clear();
    }

    pub fn push_state(&mut self) {
        self.snapshots.push(self.hook.get_snapshot());
    }

    /// Reverts the hook to the snapshot taken when the frame was pushed.
    pub fn pop_set_active_state(&mut self) -> Result<(), VMError> {
        if let Some(snapshot) = self.snapshots.pop() {
            self.hook.revert_to_snapshot(snapshot)?;
        }
        Ok(())
    }

    pub fn pop_discard(&mut self) {
        self.snapshots.pop();
    }

    pub fn clear_state_stack(&mut self) {
        self.snapshots.clear();
    }

    pub fn state_stack_len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn get_balance(&self, address: &Address) -> BigUint {
        self.hook.get_balance(address)
    }

    /// Balance as a 32-byte left-padded big-endian value.
    pub fn get_balance_bytes(&self, address: &Address) -> Vec<u8> {
        let raw = self.hook.get_balance(address).to_bytes_be();
        let mut padded = vec![0u8; warx_common::BALANCE_LEN.saturating_sub(raw.len())];
        padded.extend_from_slice(&raw);
        padded
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.hook.get_nonce(address)
    }

    pub fn get_code(&self, address: &Address) -> Result<Vec<u8>, VMError> {
        let code = self.hook.get_code(address)?;
        if code.is_empty() {
            return Err(VMError::ContractNotFound);
        }
        Ok(code)
    }

    pub fn is_smart_contract(&self, address: &Address) -> bool {
        self.hook.is_smart_contract(address)
    }

    pub fn get_shard_of_address(&self, address: &Address) -> u32 {
        self.hook.get_shard_of_address(address)
    }

    pub fn new_address(
        &self,
        creator: &Address,
        nonce: u64,
        vm_type: &[u8],
    ) -> Result<Address, VMError> {
        self.hook.new_address(creator, nonce, vm_type)
    }

    pub fn block_hash(&self, nonce: u64) -> Vec<u8> {
        self.hook.get_block_hash(nonce)
    }
}
