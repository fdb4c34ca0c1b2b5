//! Per-call effect accumulator: return data, logs, balance deltas,
//! outbound transfers and the final VM output.

use num_bigint::BigUint;
use warx_common::math;
use warx_common::{Address, LogEntry, OutputAccount, ReturnCode, VMOutput};

use crate::errors::VMError;

#[derive(Clone, Default)]
pub struct OutputState {
    pub return_data: Vec<Vec<u8>>,
    pub return_code: ReturnCode,
    pub return_message: String,
    pub gas_refund: BigUint,
    pub output_accounts: rustc_hash::FxHashMap<Address, OutputAccount>,
    pub logs: Vec<LogEntry>,
}

#[derive(Default)]
pub struct OutputContext {
    state: OutputState,
    state_stack: Vec<OutputState>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_state(&mut self) {
        self.state = OutputState::default();
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(self.state.clone());
    }

    pub fn pop_set_active_state(&mut self) {
        if let Some(previous) = self.state_stack.pop() {
            self.state = previous;
        }
    }

    pub fn pop_discard(&mut self) {
        self.state_stack.pop();
    }

    /// Restores the parent state and merges the child frame's output into
    /// it: return data, accounts, logs and refunds of the child land in the
    /// parent, in order, after the parent's own.
    pub fn pop_merge_active_state(&mut self) {
        let child = self.get_vm_output(0);
        if let Some(previous) = self.state_stack.pop() {
            self.state = previous;
        }
        self.merge_vm_output(&child);
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    pub fn state_stack_len(&self) -> usize {
        self.state_stack.len()
    }

    /// Lazily creates the account entry the first time an address is
    /// referenced. Returns whether the entry is new alongside the entry.
    pub fn get_output_account(&mut self, address: Address) -> &mut OutputAccount {
        self.state
            .output_accounts
            .entry(address)
            .or_insert_with(|| OutputAccount::new(address))
    }

    pub fn account(&self, address: &Address) -> Option<&OutputAccount> {
        self.state.output_accounts.get(address)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &OutputAccount)> {
        self.state.output_accounts.iter()
    }

    pub fn finish(&mut self, data: Vec<u8>) {
        self.state.return_data.push(data);
    }

    pub fn prepend_finish(&mut self, data: Vec<u8>) {
        self.state.return_data.insert(0, data);
    }

    pub fn return_data(&self) -> &[Vec<u8>] {
        &self.state.return_data
    }

    pub fn return_code(&self) -> ReturnCode {
        self.state.return_code
    }

    pub fn set_return_code(&mut self, code: ReturnCode) {
        self.state.return_code = code;
    }

    pub fn return_message(&self) -> &str {
        &self.state.return_message
    }

    pub fn set_return_message(&mut self, message: String) {
        self.state.return_message = message;
    }

    pub fn write_log(&mut self, address: Address, topics: Vec<Vec<u8>>, data: Vec<u8>) {
        self.state.logs.push(LogEntry {
            address,
            topics,
            data,
        });
    }

    pub fn gas_refund(&self) -> &BigUint {
        &self.state.gas_refund
    }

    pub fn add_gas_refund(&mut self, refund: u64) {
        self.state.gas_refund += BigUint::from(refund);
    }

    /// Snapshot of the in-progress output as a VMOutput with the given
    /// remaining gas.
    pub fn get_vm_output(&self, gas_remaining: u64) -> VMOutput {
        VMOutput {
            return_data: self.state.return_data.clone(),
            return_code: self.state.return_code,
            return_message: self.state.return_message.clone(),
            gas_remaining,
            gas_refund: self.state.gas_refund.clone(),
            output_accounts: self.state.output_accounts.clone(),
            logs: self.state.logs.clone(),
        }
    }

    /// Merges a nested call's output into the active state.
    pub fn merge_vm_output(&mut self, child: &VMOutput) {
        self.state
            .return_data
            .extend(child.return_data.iter().cloned());
        self.state.gas_refund += &child.gas_refund;
        for (address, account) in &child.output_accounts {
            self.state
                .output_accounts
                .entry(*address)
                .or_insert_with(|| OutputAccount::new(*address))
                .merge(account);
        }
        self.state.logs.extend(child.logs.iter().cloned());
    }

    /// The VM output of a failed run: mapped return code, the error's
    /// message, no effects, no gas left.
    pub fn create_vm_output_in_case_of_error(err: &VMError) -> VMOutput {
        let return_message = match err {
            VMError::SignalError(message) => message.clone(),
            other => other.to_string(),
        };
        VMOutput {
            return_data: Vec::new(),
            return_code: err.return_code(),
            return_message,
            gas_remaining: 0,
            gas_refund: BigUint::default(),
            output_accounts: Default::default(),
            logs: Vec::new(),
        }
    }
}

/// Gas carried by an account's outbound transfers (attached limit plus
/// locked callback reserve).
pub fn gas_transferred_by_account(account: &OutputAccount) -> u64 {
    account.output_transfers.iter().fold(0, |acc, transfer| {
        math::add_u64(acc, math::add_u64(transfer.gas_limit, transfer.gas_locked))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use warx_common::StorageUpdate;

    fn addr(fill: u8) -> Address {
        Address([fill; 32])
    }

    #[test]
    fn pop_set_active_discards_child_effects() {
        let mut output = OutputContext::new();
        output.finish(b"parent".to_vec());
        output.push_state();
        output.init_state();
        output.finish(b"child".to_vec());
        output.get_output_account(addr(9)).balance_delta = BigInt::from(5);

        output.pop_set_active_state();
        assert_eq!(output.return_data(), &[b"parent".to_vec()]);
        assert!(output.account(&addr(9)).is_none());
    }

    #[test]
    fn pop_merge_appends_child_effects_to_parent() {
        let mut output = OutputContext::new();
        output.finish(b"parent".to_vec());
        output.get_output_account(addr(1)).balance_delta = BigInt::from(-3);

        output.push_state();
        output.init_state();
        output.finish(b"child".to_vec());
        output.get_output_account(addr(1)).balance_delta = BigInt::from(1);
        output.get_output_account(addr(2)).storage_updates.insert(
            b"k".to_vec(),
            StorageUpdate {
                offset: b"k".to_vec(),
                data: b"v".to_vec(),
                written: true,
            },
        );

        output.pop_merge_active_state();
        assert_eq!(
            output.return_data(),
            &[b"parent".to_vec(), b"child".to_vec()]
        );
        assert_eq!(
            output.account(&addr(1)).unwrap().balance_delta,
            BigInt::from(-2)
        );
        assert!(output.account(&addr(2)).is_some());
        assert_eq!(output.state_stack_len(), 0);
    }

    #[test]
    fn error_output_has_no_effects_and_no_gas() {
        let out = OutputContext::create_vm_output_in_case_of_error(&VMError::NotEnoughGas);
        assert_eq!(out.return_code, ReturnCode::OutOfGas);
        assert_eq!(out.return_message, "not enough gas");
        assert_eq!(out.gas_remaining, 0);
        assert!(out.output_accounts.is_empty());
        assert!(out.return_data.is_empty());

        let user = OutputContext::create_vm_output_in_case_of_error(&VMError::SignalError(
            "child error".into(),
        ));
        assert_eq!(user.return_code, ReturnCode::UserError);
        assert_eq!(user.return_message, "child error");
    }
}
