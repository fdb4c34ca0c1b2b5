//! Gas bookkeeping state. The metering context is the single source of
//! truth for gas: the initial charge, the execution allowance and the
//! per-account usage trackers. The operations that combine this state with
//! the running instance's consumed points live on [`crate::host::VmHost`].

use rustc_hash::FxHashMap;
use warx_common::math;
use warx_common::{Address, CallType, VMInput};

use crate::errors::VMError;
use crate::gas_schedule::{GasCost, GasScheduleMap};

#[derive(Clone, Default)]
struct MeteringSnapshot {
    initial_gas_provided: u64,
    initial_cost: u64,
    gas_for_execution: u64,
    gas_used_by_accounts: FxHashMap<Address, u64>,
}

pub struct MeteringContext {
    gas_schedule: GasCost,
    block_gas_limit: u64,
    initial_gas_provided: u64,
    initial_cost: u64,
    gas_for_execution: u64,
    gas_used_by_accounts: FxHashMap<Address, u64>,
    state_stack: Vec<MeteringSnapshot>,
}

impl MeteringContext {
    pub fn new(gas_map: &GasScheduleMap, block_gas_limit: u64) -> Result<Self, VMError> {
        Ok(MeteringContext {
            gas_schedule: GasCost::from_map(gas_map)?,
            block_gas_limit,
            initial_gas_provided: 0,
            initial_cost: 0,
            gas_for_execution: 0,
            gas_used_by_accounts: FxHashMap::default(),
            state_stack: Vec::new(),
        })
    }

    pub fn init_state(&mut self) {
        self.initial_gas_provided = 0;
        self.initial_cost = 0;
        self.gas_for_execution = 0;
        self.gas_used_by_accounts.clear();
    }

    /// Resets the state for a new frame. On an async-callback input the
    /// locked gas is released back into the provided gas before anything
    /// is charged.
    pub fn init_state_from_input(&mut self, input: &mut VMInput) {
        self.init_state();
        self.unlock_gas_if_async_callback(input);
        self.initial_gas_provided = input.gas_provided;
        self.gas_for_execution = input.gas_provided;
    }

    fn unlock_gas_if_async_callback(&mut self, input: &mut VMInput) {
        if input.call_type != CallType::AsynchronousCallBack {
            return;
        }
        let gas_provided = math::add_u64(input.gas_provided, input.gas_locked);
        self.gas_for_execution = gas_provided;
        input.gas_provided = gas_provided;
        input.gas_locked = 0;
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(MeteringSnapshot {
            initial_gas_provided: self.initial_gas_provided,
            initial_cost: self.initial_cost,
            gas_for_execution: self.gas_for_execution,
            gas_used_by_accounts: self.gas_used_by_accounts.clone(),
        });
    }

    pub fn pop_set_active_state(&mut self) {
        if let Some(previous) = self.state_stack.pop() {
            self.initial_gas_provided = previous.initial_gas_provided;
            self.initial_cost = previous.initial_cost;
            self.gas_for_execution = previous.gas_for_execution;
            self.gas_used_by_accounts = previous.gas_used_by_accounts;
        }
    }

    pub fn pop_discard(&mut self) {
        self.state_stack.pop();
    }

    /// Restores the parent's scalars and folds the parent's per-account
    /// tracking into the current map, keeping the child's attributions.
    pub fn pop_merge_active_state(&mut self) {
        if let Some(previous) = self.state_stack.pop() {
            self.initial_gas_provided = previous.initial_gas_provided;
            self.initial_cost = previous.initial_cost;
            self.gas_for_execution = previous.gas_for_execution;
            for (address, gas) in previous.gas_used_by_accounts {
                let entry = self.gas_used_by_accounts.entry(address).or_insert(0);
                *entry = math::add_u64(*entry, gas);
            }
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    pub fn state_stack_len(&self) -> usize {
        self.state_stack.len()
    }

    pub fn gas_schedule(&self) -> &GasCost {
        &self.gas_schedule
    }

    pub fn set_gas_schedule(&mut self, gas_map: &GasScheduleMap) {
        match GasCost::from_map(gas_map) {
            Ok(schedule) => self.gas_schedule = schedule,
            Err(err) => {
                tracing::error!(error = %err, "cannot apply new gas schedule");
            }
        }
    }

    pub fn block_gas_limit(&self) -> u64 {
        self.block_gas_limit
    }

    pub fn gas_provided(&self) -> u64 {
        self.initial_gas_provided
    }

    pub fn gas_for_execution(&self) -> u64 {
        self.gas_for_execution
    }

    pub fn initial_cost(&self) -> u64 {
        self.initial_cost
    }

    /// Charges the up-front cost of getting an instance ready to run and
    /// sets the execution allowance to whatever gas is left.
    pub fn deduct_initial_gas(
        &mut self,
        gas_provided: u64,
        code_len: u64,
        base_cost: u64,
        cost_per_byte: u64,
    ) -> Result<(), VMError> {
        let code_cost = math::mul_u64(code_len, cost_per_byte);
        let initial_cost = math::add_u64(base_cost, code_cost);
        if initial_cost > gas_provided {
            return Err(VMError::NotEnoughGas);
        }
        self.initial_cost = initial_cost;
        self.gas_for_execution = gas_provided - initial_cost;
        Ok(())
    }

    pub fn account_gas_used(&self, address: &Address) -> u64 {
        self.gas_used_by_accounts.get(address).copied().unwrap_or(0)
    }

    pub fn set_account_gas_used(&mut self, address: Address, gas: u64) {
        self.gas_used_by_accounts.insert(address, gas);
    }

    pub fn tracked_accounts(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.gas_used_by_accounts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas_schedule::make_gas_map_for_tests;

    fn context() -> MeteringContext {
        MeteringContext::new(&make_gas_map_for_tests(), 10_000_000).unwrap()
    }

    #[test]
    fn async_callback_input_unlocks_gas() {
        let mut metering = context();
        let mut input = VMInput {
            call_type: CallType::AsynchronousCallBack,
            gas_provided: 500,
            gas_locked: 100,
            ..Default::default()
        };
        metering.init_state_from_input(&mut input);
        assert_eq!(input.gas_provided, 600);
        assert_eq!(input.gas_locked, 0);
        assert_eq!(metering.gas_provided(), 600);
        assert_eq!(metering.gas_for_execution(), 600);
    }

    #[test]
    fn direct_input_keeps_locked_gas() {
        let mut metering = context();
        let mut input = VMInput {
            call_type: CallType::DirectCall,
            gas_provided: 500,
            gas_locked: 100,
            ..Default::default()
        };
        metering.init_state_from_input(&mut input);
        assert_eq!(input.gas_provided, 500);
        assert_eq!(input.gas_locked, 100);
    }

    #[test]
    fn initial_gas_deduction() {
        let mut metering = context();
        metering.deduct_initial_gas(1000, 100, 5, 2).unwrap();
        assert_eq!(metering.initial_cost(), 205);
        assert_eq!(metering.gas_for_execution(), 795);

        let err = metering.deduct_initial_gas(100, 100, 5, 2).unwrap_err();
        assert_eq!(err, VMError::NotEnoughGas);
    }

    #[test]
    fn pop_merge_folds_account_tracking() {
        let mut metering = context();
        let parent_account = Address([1u8; 32]);
        let child_account = Address([2u8; 32]);

        metering.set_account_gas_used(parent_account, 50);
        metering.push_state();
        metering.init_state();
        metering.set_account_gas_used(child_account, 30);
        metering.pop_merge_active_state();

        assert_eq!(metering.account_gas_used(&parent_account), 50);
        assert_eq!(metering.account_gas_used(&child_account), 30);
    }
}
