//! The VM host: owner of the execution contexts, entry point of every
//! top-level invocation and dispatcher of nested calls.

pub mod async_call;
pub mod execution;
pub mod gas;
pub mod storage_ops;

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use warx_common::{
    Address, ContractCallInput, ContractCreateInput, VMOutput, CALLBACK_FUNCTION_NAME,
    INIT_FUNCTION_NAME, UPGRADE_FUNCTION_NAME,
};

use crate::contexts::runtime::ApiErrorPolicy;
use crate::contexts::{
    BlockchainContext, ManagedTypesContext, MeteringContext, OutputContext, RuntimeContext,
    StorageContext,
};
use crate::errors::VMError;
use crate::gas_schedule::{GasCost, GasScheduleMap};
use crate::hooks::{BlockchainHook, BuiltinFunctionContainer, VMCrypto};
use crate::wasm_engine::WasmEngine;

/// Construction-time configuration of a host.
pub struct VmHostParameters {
    pub vm_type: Vec<u8>,
    pub block_gas_limit: u64,
    pub gas_schedule: GasScheduleMap,
    pub protected_key_prefix: Vec<u8>,
    /// Whether synchronous-execution API errors abort the whole run
    /// (strict) or surface as failure codes to the guest (lenient).
    pub sync_exec_api_policy: ApiErrorPolicy,
}

impl Default for VmHostParameters {
    fn default() -> Self {
        VmHostParameters {
            vm_type: vec![5, 0],
            block_gas_limit: u64::MAX,
            gas_schedule: crate::gas_schedule::make_gas_map_for_tests(),
            protected_key_prefix: b"N$".to_vec(),
            sync_exec_api_policy: ApiErrorPolicy::Strict,
        }
    }
}

/// The executor host. One host serves one logical thread of execution;
/// concurrent top-level runs require distinct hosts. Exclusive access is
/// enforced through the `&mut self` receivers.
pub struct VmHost {
    pub(crate) crypto: Rc<dyn VMCrypto>,
    pub(crate) builtin_functions: Rc<dyn BuiltinFunctionContainer>,
    pub(crate) engine: Rc<dyn WasmEngine>,
    gas_schedule_map: GasScheduleMap,

    pub(crate) managed_types: ManagedTypesContext,
    pub(crate) blockchain: BlockchainContext,
    pub(crate) metering: MeteringContext,
    pub(crate) output: OutputContext,
    pub(crate) runtime: RuntimeContext,
    pub(crate) storage: StorageContext,
}

impl VmHost {
    pub fn new(
        blockchain_hook: Rc<dyn BlockchainHook>,
        engine: Rc<dyn WasmEngine>,
        crypto: Rc<dyn VMCrypto>,
        builtin_functions: Rc<dyn BuiltinFunctionContainer>,
        parameters: VmHostParameters,
    ) -> Result<Self, VMError> {
        let metering = MeteringContext::new(&parameters.gas_schedule, parameters.block_gas_limit)?;
        engine.set_opcode_costs(&metering.gas_schedule().wasm_opcode_cost);

        Ok(VmHost {
            crypto,
            builtin_functions,
            engine,
            gas_schedule_map: parameters.gas_schedule,
            managed_types: ManagedTypesContext::new(),
            blockchain: BlockchainContext::new(blockchain_hook),
            metering,
            output: OutputContext::new(),
            runtime: RuntimeContext::new(parameters.vm_type, parameters.sync_exec_api_policy),
            storage: StorageContext::new(parameters.protected_key_prefix),
        })
    }

    // context accessors, mostly for tests and diagnostics

    pub fn managed_types(&self) -> &ManagedTypesContext {
        &self.managed_types
    }

    pub fn managed_types_mut(&mut self) -> &mut ManagedTypesContext {
        &mut self.managed_types
    }

    pub fn blockchain(&self) -> &BlockchainContext {
        &self.blockchain
    }

    pub fn metering(&self) -> &MeteringContext {
        &self.metering
    }

    pub fn output(&self) -> &OutputContext {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputContext {
        &mut self.output
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut RuntimeContext {
        &mut self.runtime
    }

    pub fn storage(&self) -> &StorageContext {
        &self.storage
    }

    pub fn gas_schedule(&self) -> &GasCost {
        self.metering.gas_schedule()
    }

    pub fn gas_schedule_map(&self) -> &GasScheduleMap {
        &self.gas_schedule_map
    }

    /// Runtime errors accumulated during the last run, for diagnostics.
    pub fn runtime_errors(&self) -> &[VMError] {
        self.runtime.get_all_errors()
    }

    pub fn are_in_same_shard(&self, left: &Address, right: &Address) -> bool {
        self.blockchain.get_shard_of_address(left) == self.blockchain.get_shard_of_address(right)
    }

    pub fn is_builtin_function_name(&self, name: &str) -> bool {
        self.builtin_functions.is_builtin_function(name)
    }

    /// Atomically replaces the gas schedule and the engine's opcode-cost
    /// table. Never called while an execution is in flight (`&mut self`).
    pub fn gas_schedule_change(&mut self, new_schedule: GasScheduleMap) {
        match GasCost::from_map(&new_schedule) {
            Ok(cost) => {
                self.engine.set_opcode_costs(&cost.wasm_opcode_cost);
                self.metering.set_gas_schedule(&new_schedule);
                self.gas_schedule_map = new_schedule;
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot apply new gas schedule");
            }
        }
    }

    /// Executes the call of an existing contract. The error return is
    /// reserved for panics escaping the execution core; ordinary failures
    /// are reported inside the VM output.
    pub fn run_smart_contract_call(
        &mut self,
        input: &ContractCallInput,
    ) -> Result<VMOutput, VMError> {
        tracing::trace!(function = %input.function, "run smart contract call begin");

        let is_upgrade = input.function == UPGRADE_FUNCTION_NAME;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            if is_upgrade {
                self.do_run_smart_contract_upgrade(input)
            } else {
                self.do_run_smart_contract_call(input)
            }
        }));

        let vm_output = self.contain_panic(result)?;
        tracing::trace!(
            return_code = ?vm_output.return_code,
            return_message = %vm_output.return_message,
            "run smart contract call end"
        );
        Ok(vm_output)
    }

    /// Executes the deployment of a new contract.
    pub fn run_smart_contract_create(
        &mut self,
        input: &ContractCreateInput,
    ) -> Result<VMOutput, VMError> {
        tracing::trace!(
            code_len = input.contract_code.len(),
            "run smart contract create begin"
        );

        let result =
            panic::catch_unwind(AssertUnwindSafe(|| self.do_run_smart_contract_create(input)));

        let vm_output = self.contain_panic(result)?;
        tracing::trace!(
            return_code = ?vm_output.return_code,
            "run smart contract create end"
        );
        Ok(vm_output)
    }

    fn contain_panic(
        &mut self,
        result: Result<VMOutput, Box<dyn std::any::Any + Send>>,
    ) -> Result<VMOutput, VMError> {
        match result {
            Ok(vm_output) => Ok(vm_output),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(message = %message, "panic during execution");
                Err(VMError::ExecutionPanicked(message))
            }
        }
    }

    /// Resets every context for a fresh top-level run.
    pub fn init_state(&mut self) {
        self.clear_context_state_stacks();
        self.managed_types.init_state();
        self.output.init_state();
        self.metering.init_state();
        self.runtime.init_state();
        self.storage.init_state();
        self.blockchain.init_state();
    }

    pub fn clear_context_state_stacks(&mut self) {
        self.managed_types.clear_state_stack();
        self.output.clear_state_stack();
        self.metering.clear_state_stack();
        self.runtime.clear_state_stack();
        self.storage.clear_state_stack();
        self.blockchain.clear_state_stack();
    }

    /// True when every context's snapshot stack is empty; holds before and
    /// after every top-level execution.
    pub fn state_stacks_are_empty(&self) -> bool {
        self.managed_types.state_stack_len() == 0
            && self.output.state_stack_len() == 0
            && self.metering.state_stack_len() == 0
            && self.runtime.state_stack_len() == 0
            && self.storage.state_stack_len() == 0
            && self.blockchain.state_stack_len() == 0
    }

    /// Loads a call input into every context, returning the effective
    /// input (an async callback unlocks its locked gas here).
    pub(crate) fn init_contexts_from_call_input(
        &mut self,
        input: &ContractCallInput,
    ) -> ContractCallInput {
        self.init_state();
        let mut input = input.clone();
        self.metering.init_state_from_input(&mut input.vm_input);
        self.runtime.init_state_from_input(&input);
        self.storage.set_address(input.recipient_addr);
        input
    }

    /// Reserved entry points cannot be invoked by external transactions.
    pub(crate) fn check_allowed_to_execute(&self, input: &ContractCallInput) -> Result<(), VMError> {
        if input.function == INIT_FUNCTION_NAME {
            return Err(VMError::InitFuncCalledInRun);
        }
        if input.function == CALLBACK_FUNCTION_NAME
            && input.vm_input.call_type != warx_common::CallType::AsynchronousCallBack
        {
            return Err(VMError::CallBackFuncCalledInRun);
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
