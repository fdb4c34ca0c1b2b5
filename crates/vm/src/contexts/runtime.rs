//! Runtime context: the current WASM instance, the call input being
//! served, the read-only flag, the async-call state and the instance
//! ceiling across the nested call stack.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use warx_common::{
    Address, ContractCallInput, VMInput, CALLBACK_FUNCTION_NAME, INIT_FUNCTION_NAME,
};

use crate::errors::VMError;
use crate::wasm_engine::{BreakpointValue, WasmInstance};

/// Default ceiling on concurrently live instances across the nested call
/// stack.
pub const MAX_INSTANCE_COUNT: u64 = 10;
/// Default ceiling on locals declared by one function of a module.
pub const MAX_WASM_LOCALS_PER_FUNCTION: u64 = 4000;

/// The async call registered by the `asyncCall` host function, pending
/// resolution when the AsyncCall breakpoint unwinds to the dispatcher.
#[derive(Clone, Debug, Default)]
pub struct AsyncCallInfo {
    pub destination: Address,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub value_bytes: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AsyncCallStatus {
    #[default]
    Pending,
    Resolved,
    Rejected,
}

/// One call of an async context, with its optional custom callbacks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AsyncGeneratedCall {
    #[serde(rename = "status")]
    pub status: AsyncCallStatus,
    #[serde(rename = "destination")]
    pub destination: Address,
    #[serde(rename = "data")]
    pub data: Vec<u8>,
    #[serde(rename = "valueBytes")]
    pub value_bytes: Vec<u8>,
    #[serde(rename = "successCallback")]
    pub success_callback: String,
    #[serde(rename = "errorCallback")]
    pub error_callback: String,
    #[serde(rename = "providedGas")]
    pub provided_gas: u64,
    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,
    #[serde(rename = "gasLocked")]
    pub gas_locked: u64,
}

/// A named group of async calls sharing a completion callback.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AsyncContext {
    #[serde(rename = "callback")]
    pub callback: String,
    #[serde(rename = "asyncCalls")]
    pub async_calls: Vec<AsyncGeneratedCall>,
}

/// The whole async state of one original transaction. Serialized as JSON
/// into protected storage when calls cross a shard boundary; the field
/// order and names below are the wire format and must not change.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AsyncContextInfo {
    #[serde(rename = "callerAddr")]
    pub caller_addr: Vec<u8>,
    #[serde(rename = "returnData")]
    pub return_data: Vec<u8>,
    #[serde(rename = "asyncContextMap")]
    pub async_context_map: BTreeMap<String, AsyncContext>,
}

#[derive(Clone)]
struct RuntimeSnapshot {
    vm_input: VMInput,
    recipient_addr: Address,
    sc_address: Address,
    call_function: String,
    read_only: bool,
    async_call_info: Option<AsyncCallInfo>,
    async_context_info: AsyncContextInfo,
    custom_call_function: Option<String>,
}

/// Error-classification policy for the host-function groups: a lenient
/// group reports failures to the guest instead of aborting execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorPolicy {
    Strict,
    Lenient,
}

pub struct RuntimeContext {
    vm_input: VMInput,
    recipient_addr: Address,
    sc_address: Address,
    call_function: String,
    read_only: bool,
    vm_type: Vec<u8>,
    sc_code_size: u64,

    instance: Option<Rc<dyn WasmInstance>>,
    instance_stack: Vec<Option<Rc<dyn WasmInstance>>>,
    max_instances: u64,
    num_instances: u64,
    max_wasm_locals: u64,

    async_call_info: Option<AsyncCallInfo>,
    async_context_info: AsyncContextInfo,
    custom_call_function: Option<String>,

    state_stack: Vec<RuntimeSnapshot>,
    errors: Vec<VMError>,

    sync_exec_api_policy: ApiErrorPolicy,
}

impl RuntimeContext {
    pub fn new(vm_type: Vec<u8>, sync_exec_api_policy: ApiErrorPolicy) -> Self {
        RuntimeContext {
            vm_input: VMInput::default(),
            recipient_addr: Address::zero(),
            sc_address: Address::zero(),
            call_function: String::new(),
            read_only: false,
            vm_type,
            sc_code_size: 0,
            instance: None,
            instance_stack: Vec::new(),
            max_instances: MAX_INSTANCE_COUNT,
            num_instances: 0,
            max_wasm_locals: MAX_WASM_LOCALS_PER_FUNCTION,
            async_call_info: None,
            async_context_info: AsyncContextInfo::default(),
            custom_call_function: None,
            state_stack: Vec::new(),
            errors: Vec::new(),
            sync_exec_api_policy,
        }
    }

    pub fn init_state(&mut self) {
        self.vm_input = VMInput::default();
        self.recipient_addr = Address::zero();
        self.sc_address = Address::zero();
        self.call_function.clear();
        self.read_only = false;
        self.async_call_info = None;
        self.async_context_info = AsyncContextInfo::default();
        self.custom_call_function = None;
        self.errors.clear();
    }

    /// Loads a call input into the runtime. The read-only flag is the
    /// input's flag OR the inherited one: a read-only frame can never
    /// spawn a writable child.
    pub fn init_state_from_input(&mut self, input: &ContractCallInput) {
        self.vm_input = input.vm_input.clone();
        self.recipient_addr = input.recipient_addr;
        self.sc_address = input.recipient_addr;
        self.call_function = input.function.clone();
        self.read_only = self.read_only || input.vm_input.read_only;
        self.async_call_info = None;
        self.async_context_info = AsyncContextInfo {
            caller_addr: input.vm_input.caller_addr.to_vec(),
            ..Default::default()
        };
        self.custom_call_function = None;
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(RuntimeSnapshot {
            vm_input: self.vm_input.clone(),
            recipient_addr: self.recipient_addr,
            sc_address: self.sc_address,
            call_function: self.call_function.clone(),
            read_only: self.read_only,
            async_call_info: self.async_call_info.clone(),
            async_context_info: self.async_context_info.clone(),
            custom_call_function: self.custom_call_function.clone(),
        });
    }

    pub fn pop_set_active_state(&mut self) {
        if let Some(previous) = self.state_stack.pop() {
            self.vm_input = previous.vm_input;
            self.recipient_addr = previous.recipient_addr;
            self.sc_address = previous.sc_address;
            self.call_function = previous.call_function;
            self.read_only = previous.read_only;
            self.async_call_info = previous.async_call_info;
            self.async_context_info = previous.async_context_info;
            self.custom_call_function = previous.custom_call_function;
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

    pub fn vm_input(&self) -> &VMInput {
        &self.vm_input
    }

    pub fn vm_input_mut(&mut self) -> &mut VMInput {
        &mut self.vm_input
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.vm_input.arguments
    }

    pub fn function(&self) -> &str {
        &self.call_function
    }

    pub fn sc_address(&self) -> Address {
        self.sc_address
    }

    pub fn set_sc_address(&mut self, address: Address) {
        self.sc_address = address;
    }

    pub fn vm_type(&self) -> &[u8] {
        &self.vm_type
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn sc_code_size(&self) -> u64 {
        self.sc_code_size
    }

    pub fn set_sc_code_size(&mut self, size: u64) {
        self.sc_code_size = size;
    }

    pub fn set_max_instances(&mut self, max: u64) {
        self.max_instances = max;
    }

    pub fn max_wasm_locals(&self) -> u64 {
        self.max_wasm_locals
    }

    pub fn current_tx_hash(&self) -> &[u8] {
        &self.vm_input.current_tx_hash
    }

    pub fn original_tx_hash(&self) -> &[u8] {
        &self.vm_input.original_tx_hash
    }

    // instance management

    /// Registers a freshly compiled instance as the current one, checking
    /// the ceiling on concurrently live instances.
    pub fn set_new_instance(&mut self, instance: Rc<dyn WasmInstance>) -> Result<(), VMError> {
        if self.num_instances >= self.max_instances {
            return Err(VMError::MaxInstancesReached);
        }
        self.num_instances += 1;
        self.instance = Some(instance);
        Ok(())
    }

    /// Saves the current instance on the instance stack before a nested
    /// frame takes over.
    pub fn push_instance(&mut self) {
        self.instance_stack.push(self.instance.take());
    }

    /// Releases the current instance and restores the caller's one.
    pub fn pop_instance(&mut self) {
        self.clean_instance();
        self.instance = self.instance_stack.pop().flatten();
    }

    pub fn clean_instance(&mut self) {
        if let Some(instance) = self.instance.take() {
            instance.clean();
            self.num_instances = self.num_instances.saturating_sub(1);
        }
    }

    pub fn instance(&self) -> Result<Rc<dyn WasmInstance>, VMError> {
        self.instance.clone().ok_or(VMError::ExecutionFailed)
    }

    pub fn num_instances(&self) -> u64 {
        self.num_instances
    }

    pub fn points_used(&self) -> u64 {
        match &self.instance {
            Some(instance) => instance.get_points_used(),
            None => 0,
        }
    }

    pub fn set_points_used(&mut self, points: u64) {
        if let Some(instance) = &self.instance {
            instance.set_points_used(points);
        }
    }

    pub fn get_runtime_breakpoint_value(&self) -> BreakpointValue {
        match &self.instance {
            Some(instance) => instance.get_breakpoint_value(),
            None => BreakpointValue::None,
        }
    }

    pub fn set_runtime_breakpoint_value(&mut self, value: BreakpointValue) {
        if let Some(instance) = &self.instance {
            instance.set_breakpoint_value(value);
        }
    }

    // memory access

    pub fn mem_load(&self, offset: i32, length: i32) -> Result<Vec<u8>, VMError> {
        if length < 0 {
            return Err(VMError::NegativeLength);
        }
        if length == 0 {
            return Ok(Vec::new());
        }
        self.instance()?.mem_load(offset, length)
    }

    /// Loads consecutive byte slices with the given lengths.
    pub fn mem_load_multiple(
        &self,
        mut offset: i32,
        lengths: &[i32],
    ) -> Result<Vec<Vec<u8>>, VMError> {
        let mut results = Vec::with_capacity(lengths.len());
        for &length in lengths {
            let data = self.mem_load(offset, length)?;
            offset = offset
                .checked_add(length)
                .ok_or(VMError::MemoryOutOfBounds)?;
            results.push(data);
        }
        Ok(results)
    }

    pub fn mem_store(&self, offset: i32, data: &[u8]) -> Result<(), VMError> {
        if data.is_empty() {
            return Ok(());
        }
        self.instance()?.mem_store(offset, data)
    }

    // function resolution

    /// Validates the module after compilation. The engine already rejects
    /// floating point, oversized locals and unknown imports; the host
    /// additionally requires a memory export.
    pub fn verify_contract_code(&self) -> Result<(), VMError> {
        let instance = self.instance()?;
        if !instance.has_memory() {
            return Err(VMError::ContractInvalid);
        }
        Ok(())
    }

    /// Indirect callers cannot reach the reserved entry points.
    pub fn check_indirect_function_allowed(function: &str) -> Result<(), VMError> {
        if function == INIT_FUNCTION_NAME {
            return Err(VMError::InitFuncCalledInRun);
        }
        if function == CALLBACK_FUNCTION_NAME {
            return Err(VMError::CallBackFuncCalledInRun);
        }
        Ok(())
    }

    /// The exported function this frame must invoke, or FunctionNotFound.
    pub fn function_to_call(&self) -> Result<String, VMError> {
        let function = match &self.custom_call_function {
            Some(custom) => custom.clone(),
            None => self.call_function.clone(),
        };
        let instance = self.instance()?;
        if !instance.has_export(&function) {
            return Err(VMError::FunctionNotFound);
        }
        Ok(function)
    }

    pub fn set_custom_call_function(&mut self, function: String) {
        self.custom_call_function = Some(function);
    }

    pub fn has_custom_call_function(&self) -> bool {
        self.custom_call_function.is_some()
    }

    // async state

    pub fn set_async_call_info(&mut self, info: AsyncCallInfo) {
        self.async_call_info = Some(info);
    }

    pub fn async_call_info(&self) -> Option<&AsyncCallInfo> {
        self.async_call_info.as_ref()
    }

    pub fn take_async_call_info(&mut self) -> Option<AsyncCallInfo> {
        self.async_call_info.take()
    }

    pub fn async_context_info(&self) -> &AsyncContextInfo {
        &self.async_context_info
    }

    pub fn async_context_info_mut(&mut self) -> &mut AsyncContextInfo {
        &mut self.async_context_info
    }

    pub fn get_async_context(&mut self, identifier: &[u8]) -> Result<&mut AsyncContext, VMError> {
        let key = String::from_utf8_lossy(identifier).into_owned();
        self.async_context_info
            .async_context_map
            .get_mut(&key)
            .ok_or(VMError::CallBackFuncNotExpected)
    }

    /// Adds a call to the named async context, creating the context on
    /// first use.
    pub fn add_async_context_call(&mut self, identifier: &[u8], call: AsyncGeneratedCall) {
        let key = String::from_utf8_lossy(identifier).into_owned();
        self.async_context_info
            .async_context_map
            .entry(key)
            .or_default()
            .async_calls
            .push(call);
    }

    // errors and policies

    pub fn add_error(&mut self, err: VMError) {
        self.errors.push(err);
    }

    pub fn get_all_errors(&self) -> &[VMError] {
        &self.errors
    }

    pub fn crypto_api_error_should_fail_execution(&self) -> bool {
        true
    }

    pub fn big_int_api_error_should_fail_execution(&self) -> bool {
        true
    }

    pub fn base_api_error_should_fail_execution(&self) -> bool {
        true
    }

    pub fn sync_exec_api_error_should_fail_execution(&self) -> bool {
        self.sync_exec_api_policy == ApiErrorPolicy::Strict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_is_sticky_across_child_inputs() {
        let mut runtime = RuntimeContext::new(b"wx".to_vec(), ApiErrorPolicy::Strict);
        runtime.set_read_only(true);
        runtime.init_state_from_input(&ContractCallInput::default());
        assert!(runtime.read_only());
    }

    #[test]
    fn async_context_calls_accumulate() {
        let mut runtime = RuntimeContext::new(b"wx".to_vec(), ApiErrorPolicy::Strict);
        runtime.add_async_context_call(b"ctx", AsyncGeneratedCall::default());
        runtime.add_async_context_call(b"ctx", AsyncGeneratedCall::default());
        let context = runtime.get_async_context(b"ctx").unwrap();
        assert_eq!(context.async_calls.len(), 2);
        assert!(runtime.get_async_context(b"other").is_err());
    }

    #[test]
    fn state_stack_round_trip() {
        let mut runtime = RuntimeContext::new(b"wx".to_vec(), ApiErrorPolicy::Strict);
        runtime.init_state_from_input(&ContractCallInput {
            function: "first".into(),
            ..Default::default()
        });
        runtime.push_state();
        runtime.init_state_from_input(&ContractCallInput {
            function: "second".into(),
            ..Default::default()
        });
        assert_eq!(runtime.function(), "second");
        runtime.pop_set_active_state();
        assert_eq!(runtime.function(), "first");
    }
}
