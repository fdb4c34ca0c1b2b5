//! Gas flow: charging the running instance, bounding nested-call budgets
//! and reconciling the final accounting against the provided gas.

use warx_common::math;
use warx_common::{ContractCallInput, VMOutput};

use crate::contexts::output::gas_transferred_by_account;
use crate::errors::VMError;
use crate::host::VmHost;

impl VmHost {
    /// Adds `gas` to the running instance's consumed points, saturating.
    pub fn use_gas(&mut self, gas: u64) {
        let used = math::add_u64(self.runtime.points_used(), gas);
        self.runtime.set_points_used(used);
    }

    /// Gas still available to the current frame.
    pub fn gas_left(&self) -> u64 {
        let gas_for_execution = self.metering.gas_for_execution();
        let used = self.runtime.points_used();
        gas_for_execution.saturating_sub(used)
    }

    /// Charges `gas` only when strictly less than the remaining gas; the
    /// equality case fails too.
    pub fn use_gas_bounded(&mut self, gas: u64) -> Result<(), VMError> {
        if self.gas_left() <= gas {
            return Err(VMError::NotEnoughGas);
        }
        self.use_gas(gas);
        Ok(())
    }

    /// Gives back gas that was reserved but not spent (locked async
    /// callback gas). Bounded below by zero consumed points.
    pub fn restore_gas(&mut self, gas: u64) {
        let used = self.runtime.points_used();
        if gas <= used {
            self.runtime.set_points_used(used - gas);
        }
    }

    /// Adds to the refund counter reported in the VM output.
    pub fn free_gas(&mut self, gas: u64) {
        self.output.add_gas_refund(gas);
    }

    /// Bounds a guest-provided gas limit by the remaining gas. A negative
    /// limit wraps to a huge value and therefore bounds to everything
    /// left, mirroring the original's unsigned conversion.
    pub fn bound_gas_limit(&self, value: i64) -> u64 {
        let limit = value as u64;
        self.gas_left().min(limit)
    }

    /// Total consumption of the current contract: the initial charge plus
    /// every point the instance burned.
    pub fn gas_spent_by_contract(&self) -> u64 {
        math::add_u64(self.metering.initial_cost(), self.runtime.points_used())
    }

    pub fn use_gas_for_async_step(&mut self) -> Result<(), VMError> {
        let step = self.gas_schedule().base_api_cost.async_call_step;
        self.use_gas_bounded(step)
    }

    /// The minimum reserve an async callback will need: recompiling the
    /// caller plus the fixed callback allowance.
    pub fn compute_gas_locked_for_async(&self) -> u64 {
        let schedule = self.gas_schedule();
        let compilation_lock = math::mul_u64(
            self.runtime.sc_code_size(),
            schedule.base_operation_cost.aot_prepare_per_byte,
        );
        let execution_lock = math::add_u64(
            schedule.base_api_cost.async_call_step,
            schedule.base_api_cost.async_callback_gas_lock,
        );
        math::add_u64(compilation_lock, execution_lock)
    }

    /// Charges the cost of loading and preparing existing code.
    pub(crate) fn deduct_initial_gas_for_execution(&mut self, code: &[u8]) -> Result<(), VMError> {
        let base = self.gas_schedule().base_operation_cost.get_code;
        let per_byte = self.gas_schedule().base_operation_cost.aot_prepare_per_byte;
        let gas_provided = self.metering.gas_provided();
        self.metering
            .deduct_initial_gas(gas_provided, code.len() as u64, base, per_byte)
    }

    /// Charges the cost of a deployment initiated by a transaction.
    pub(crate) fn deduct_initial_gas_for_direct_deployment(
        &mut self,
        code: &[u8],
    ) -> Result<(), VMError> {
        let base = self.gas_schedule().base_api_cost.create_contract;
        let per_byte = self.gas_schedule().base_operation_cost.compile_per_byte;
        let gas_provided = self.metering.gas_provided();
        self.metering
            .deduct_initial_gas(gas_provided, code.len() as u64, base, per_byte)
    }

    /// Charges the cost of a deployment initiated by another contract
    /// (compilation only, no base charge).
    pub(crate) fn deduct_initial_gas_for_indirect_deployment(
        &mut self,
        code: &[u8],
    ) -> Result<(), VMError> {
        let per_byte = self.gas_schedule().base_operation_cost.compile_per_byte;
        let gas_provided = self.metering.gas_provided();
        self.metering
            .deduct_initial_gas(gas_provided, code.len() as u64, 0, per_byte)
    }

    /// Attributes the current contract's own consumption to its account
    /// tracker: everything it spent, minus gas attached to transfers and
    /// minus what nested frames already claimed.
    pub(crate) fn update_sc_gas_used(&mut self) {
        let current_address = self.runtime.sc_address();
        let transferred_to_current = self
            .output
            .account(&current_address)
            .map(gas_transferred_by_account)
            .unwrap_or(0);

        let mut used_by_others = 0u64;
        for (address, account) in self.output.accounts() {
            let transferred = gas_transferred_by_account(account);
            let used = if *address != current_address {
                self.metering.account_gas_used(address)
            } else {
                0
            };
            used_by_others = math::add_u64(used_by_others, math::add_u64(used, transferred));
        }

        let mut gas_used = self.gas_spent_by_contract();
        gas_used = math::sub_u64(gas_used, transferred_to_current);
        gas_used = math::sub_u64(gas_used, used_by_others);

        self.output_account(current_address);
        self.metering.set_account_gas_used(current_address, gas_used);
    }

    /// Final accounting after a successful run: writes each account's
    /// tracked gas into the output and asserts the reconciliation
    /// invariant.
    pub(crate) fn update_gas_state_on_success(
        &mut self,
        vm_output: &mut VMOutput,
    ) -> Result<(), VMError> {
        self.update_sc_gas_used();

        for (address, account) in vm_output.output_accounts.iter_mut() {
            account.gas_used = self.metering.account_gas_used(address);
        }
        for (address, _) in self.metering.tracked_accounts() {
            if !vm_output.output_accounts.contains_key(address) {
                return Err(VMError::MissingTrackedOutputAccount);
            }
        }

        self.check_gas(vm_output)
    }

    /// On a fatal failure the whole provided gas is charged to the
    /// current contract's account.
    pub(crate) fn update_gas_state_on_failure(&mut self) {
        let address = self.runtime.sc_address();
        let gas_provided = self.metering.gas_provided();
        let account = self.output_account(address);
        account.gas_used = math::add_u64(account.gas_used, gas_provided);
    }

    /// `Σ account.gasUsed + Σ transfers.gas + gasRemaining = gasProvided`,
    /// violation is fatal.
    fn check_gas(&self, vm_output: &VMOutput) -> Result<(), VMError> {
        let mut gas_used = 0u64;
        for account in vm_output.output_accounts.values() {
            gas_used = math::add_u64(gas_used, account.gas_used);
            gas_used = math::add_u64(gas_used, gas_transferred_by_account(account));
        }
        let total = math::add_u64(gas_used, vm_output.gas_remaining);
        let gas_provided = self.metering.gas_provided();

        if total != gas_provided {
            tracing::error!(total, gas_provided, "gas usage mismatch");
            return Err(VMError::InputAndOutputGasDoesNotMatch);
        }
        Ok(())
    }

    /// Gas consumed by a builtin function, attributed to the caller
    /// instance. Gas the builtin reserved for a follow-up contract
    /// execution is not part of the builtin's own consumption.
    pub(crate) fn track_gas_used_by_builtin_function(
        &mut self,
        builtin_input: &ContractCallInput,
        builtin_output: &VMOutput,
        post_builtin_input: Option<&ContractCallInput>,
    ) {
        let mut gas_used = math::sub_u64(
            builtin_input.vm_input.gas_provided,
            builtin_output.gas_remaining,
        );
        if let Some(post_input) = post_builtin_input {
            gas_used = math::sub_u64(gas_used, post_input.vm_input.gas_provided);
        }
        self.use_gas(gas_used);
        tracing::trace!(gas = gas_used, "gas used by builtin function");
    }
}
