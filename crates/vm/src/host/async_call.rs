//! The asynchronous call protocol: classification, synchronous in-shard
//! resolution with callback, cross-shard queueing via output transfers,
//! and the JSON continuation record kept in protected storage.

use num_bigint::BigUint;
use warx_common::math;
use warx_common::{
    Address, CallType, ContractCallInput, VMInput, VMOutput, CALLBACK_FUNCTION_NAME,
};

use crate::call_args;
use crate::contexts::runtime::{
    AsyncCallInfo, AsyncCallStatus, AsyncContext, AsyncContextInfo, AsyncGeneratedCall,
};
use crate::contexts::storage::ASYNC_DATA_PREFIX;
use crate::errors::VMError;
use crate::host::VmHost;
use crate::wasm_engine::BreakpointValue;

/// How a registered async call will actually be executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsyncCallExecutionMode {
    /// Same shard, destination has code: run synchronously, then the
    /// caller's callback.
    SyncCall,
    /// Builtin function against the same shard.
    AsyncBuiltinFuncIntraShard,
    /// Builtin executed on the sender side while a cross-shard message is
    /// also scheduled.
    AsyncBuiltinFuncCrossShard,
    /// Reverse token transfer to the original caller, no callback.
    EsdtTransferOnCallBack,
    /// No local code or cross-shard: queue an output transfer.
    AsyncUnknown,
}

impl AsyncGeneratedCall {
    pub(crate) fn as_call_info(&self) -> AsyncCallInfo {
        AsyncCallInfo {
            destination: self.destination,
            data: self.data.clone(),
            gas_limit: self.gas_limit,
            gas_locked: self.gas_locked,
            value_bytes: self.value_bytes.clone(),
        }
    }
}

impl VmHost {
    /// Registers an asynchronous call and suspends WASM via the AsyncCall
    /// breakpoint. The callback reserve is locked (consumed) here and
    /// restored when the callback is about to run.
    pub(crate) fn register_async_call(
        &mut self,
        destination: Address,
        data: Vec<u8>,
        value_bytes: Vec<u8>,
    ) -> Result<(), VMError> {
        let gas_locked = self.compute_gas_locked_for_async();
        if self.gas_left() <= gas_locked {
            return Err(VMError::NotEnoughGas);
        }
        self.use_gas(gas_locked);

        let info = AsyncCallInfo {
            destination,
            data,
            gas_limit: self.gas_left(),
            gas_locked,
            value_bytes,
        };
        self.runtime.set_async_call_info(info);
        self.runtime
            .set_runtime_breakpoint_value(BreakpointValue::AsyncCall);
        Ok(())
    }

    /// Resumes from the AsyncCall breakpoint and drives the registered
    /// call through its execution mode.
    pub(crate) fn handle_async_call_breakpoint(&mut self) -> Result<(), VMError> {
        tracing::trace!("async call begin");
        self.runtime
            .set_runtime_breakpoint_value(BreakpointValue::None);

        let info = self
            .runtime
            .async_call_info()
            .cloned()
            .ok_or(VMError::ExecutionFailed)?;
        let exec_mode = self.determine_async_call_execution_mode(&info)?;
        tracing::trace!(mode = ?exec_mode, "async call");

        match exec_mode {
            AsyncCallExecutionMode::AsyncUnknown => self.send_async_call_to_destination(&info),
            AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard => {
                let (_, err) = self.execute_sync_destination_call(&info);
                match err {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            AsyncCallExecutionMode::EsdtTransferOnCallBack => {
                // the contract sends tokens back to its original caller in
                // a reversed async call that has no callback of its own,
                // so the locked callback reserve goes back to the caller
                self.output.prepend_finish(info.data.clone());
                self.restore_gas(info.gas_locked);
                Ok(())
            }
            AsyncCallExecutionMode::SyncCall
            | AsyncCallExecutionMode::AsyncBuiltinFuncIntraShard => {
                let (dest_output, dest_err) = self.execute_sync_destination_call(&info);
                let (cb_output, cb_err) =
                    self.execute_sync_callback_call(&info, &dest_output, dest_err.as_ref());
                self.process_callback_vm_output(&cb_output, cb_err)
            }
        }
    }

    pub(crate) fn determine_async_call_execution_mode(
        &mut self,
        info: &AsyncCallInfo,
    ) -> Result<AsyncCallExecutionMode, VMError> {
        let (function_name, args) = call_args::parse_call_data(&info.data)?;

        let sc_address = self.runtime.sc_address();
        let same_shard = self.are_in_same_shard(&sc_address, &info.destination);

        if self.is_builtin_function_name(&function_name) {
            if same_shard {
                let is_esdt_back_transfer = self
                    .is_esdt_transfer_with_no_call(&sc_address, &info.destination, &function_name, &args);
                if is_esdt_back_transfer
                    && self.runtime.vm_input().call_type == CallType::AsynchronousCall
                    && self.runtime.vm_input().caller_addr == info.destination
                {
                    return Ok(AsyncCallExecutionMode::EsdtTransferOnCallBack);
                }
                return Ok(AsyncCallExecutionMode::AsyncBuiltinFuncIntraShard);
            }
            return Ok(AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard);
        }

        if same_shard && self.blockchain.get_code(&info.destination).is_ok() {
            return Ok(AsyncCallExecutionMode::SyncCall);
        }
        Ok(AsyncCallExecutionMode::AsyncUnknown)
    }

    fn is_esdt_transfer_with_no_call(
        &self,
        sender: &Address,
        destination: &Address,
        function: &str,
        args: &[Vec<u8>],
    ) -> bool {
        match self
            .builtin_functions
            .parse_esdt_transfers(sender, destination, function, args)
        {
            Ok(parsed) => parsed.call_function.is_empty(),
            Err(_) => false,
        }
    }

    /// First return datum parses as a builtin token transfer with no
    /// follow-up call: the destination is handing tokens back.
    fn is_esdt_transfer_on_return_data(
        &self,
        sender: &Address,
        destination: &Address,
        dest_output: &VMOutput,
    ) -> Option<(String, Vec<Vec<u8>>)> {
        let first = dest_output.return_data.first()?;
        let (function, args) = call_args::parse_call_data(first).ok()?;
        let parsed = self
            .builtin_functions
            .parse_esdt_transfers(sender, destination, &function, &args)
            .ok()?;
        if parsed.call_function.is_empty() {
            Some((function, args))
        } else {
            None
        }
    }

    fn execute_sync_destination_call(
        &mut self,
        info: &AsyncCallInfo,
    ) -> (VMOutput, Option<VMError>) {
        let input = match self.create_destination_contract_call_input(info) {
            Ok(input) => input,
            Err(err) => {
                return (
                    crate::contexts::OutputContext::create_vm_output_in_case_of_error(&err),
                    Some(err),
                )
            }
        };
        tracing::trace!(
            dest = ?input.recipient_addr,
            function = %input.function,
            "async call: sync destination call"
        );
        let (vm_output, _, err) = self.execute_on_dest_context(input);
        (vm_output, err)
    }

    fn execute_sync_callback_call(
        &mut self,
        info: &AsyncCallInfo,
        dest_output: &VMOutput,
        dest_err: Option<&VMError>,
    ) -> (VMOutput, Option<VMError>) {
        let input = match self.create_callback_contract_call_input(
            info.gas_locked,
            dest_output,
            info.destination,
            CALLBACK_FUNCTION_NAME,
            dest_err,
        ) {
            Ok(input) => input,
            Err(err) => {
                return (
                    crate::contexts::OutputContext::create_vm_output_in_case_of_error(&err),
                    Some(err),
                )
            }
        };

        // restore the locked gas while still on the caller instance,
        // otherwise it would count as used twice
        self.restore_gas(info.gas_locked);

        let (vm_output, _, err) = self.execute_on_dest_context(input);
        (vm_output, err)
    }

    pub(crate) fn create_destination_contract_call_input(
        &mut self,
        info: &AsyncCallInfo,
    ) -> Result<ContractCallInput, VMError> {
        let (function, arguments) = call_args::parse_call_data(&info.data)?;
        let sender = self.runtime.sc_address();

        Ok(ContractCallInput {
            vm_input: VMInput {
                caller_addr: sender,
                arguments,
                call_value: BigUint::from_bytes_be(&info.value_bytes),
                call_type: CallType::AsynchronousCall,
                gas_price: self.runtime.vm_input().gas_price,
                gas_provided: self.gas_left(),
                gas_locked: info.gas_locked,
                original_tx_hash: self.runtime.original_tx_hash().to_vec(),
                current_tx_hash: self.runtime.current_tx_hash().to_vec(),
                ..Default::default()
            },
            recipient_addr: info.destination,
            function,
        })
    }

    /// The callback input: first argument is the destination's return
    /// code; on success the return data follows, on failure the return
    /// message. The callback's budget is the destination's remaining gas
    /// plus the locked reserve, minus the async step and the cost of
    /// copying the callback data.
    pub(crate) fn create_callback_contract_call_input(
        &mut self,
        gas_locked: u64,
        dest_output: &VMOutput,
        callback_initiator: Address,
        callback_function: &str,
        dest_err: Option<&VMError>,
    ) -> Result<ContractCallInput, VMError> {
        let schedule = self.gas_schedule();
        let async_call_step = schedule.base_api_cost.async_call_step;
        let data_copy_per_byte = schedule.base_operation_cost.data_copy_per_byte;

        let mut arguments = vec![dest_output.return_code.to_bytes()];
        let mut esdt_on_callback = None;
        let mut return_with_error = false;

        if dest_err.is_none() && dest_output.return_code == warx_common::ReturnCode::Ok {
            esdt_on_callback = self.is_esdt_transfer_on_return_data(
                &callback_initiator,
                &self.runtime.sc_address(),
                dest_output,
            );
            arguments.extend(dest_output.return_data.iter().cloned());
        } else {
            arguments.push(dest_output.return_message.as_bytes().to_vec());
            return_with_error = true;
        }

        let mut gas_limit = math::add_u64(dest_output.gas_remaining, gas_locked);
        let data_length = compute_data_length_from_arguments(callback_function, &arguments);
        let gas_to_use = math::add_u64(
            async_call_step,
            math::mul_u64(data_copy_per_byte, data_length as u64),
        );
        if gas_limit <= gas_to_use {
            return Err(VMError::NotEnoughGasForReturnData);
        }
        gas_limit -= gas_to_use;

        let mut input = ContractCallInput {
            vm_input: VMInput {
                caller_addr: callback_initiator,
                arguments,
                call_value: self.compute_call_value_from_last_output_transfer(dest_output),
                call_type: CallType::AsynchronousCallBack,
                gas_price: self.runtime.vm_input().gas_price,
                gas_provided: gas_limit,
                original_tx_hash: self.runtime.original_tx_hash().to_vec(),
                current_tx_hash: self.runtime.current_tx_hash().to_vec(),
                return_call_after_error: return_with_error,
                ..Default::default()
            },
            recipient_addr: self.runtime.sc_address(),
            function: callback_function.to_string(),
        };

        if let Some((function, esdt_args)) = esdt_on_callback {
            input.function = function;
            let mut rewritten = esdt_args;
            rewritten.push(callback_function.as_bytes().to_vec());
            rewritten.push(dest_output.return_code.to_bytes());
            if dest_output.return_data.len() > 1 {
                rewritten.extend(dest_output.return_data[1..].iter().cloned());
            }
            input.vm_input.arguments = rewritten;
        }

        Ok(input)
    }

    /// A destination that produced no return data but sent a plain value
    /// transfer back to the caller passes that value into the callback.
    fn compute_call_value_from_last_output_transfer(&self, dest_output: &VMOutput) -> BigUint {
        if !dest_output.return_data.is_empty() {
            return BigUint::default();
        }
        let receiver = self.runtime.sc_address();
        let Some(account) = dest_output.output_accounts.get(&receiver) else {
            return BigUint::default();
        };
        match account.output_transfers.last() {
            Some(transfer) if transfer.data.is_empty() => transfer.value.clone(),
            _ => BigUint::default(),
        }
    }

    /// A failed callback cannot fail the whole transaction: the error is
    /// recorded in the output instead.
    pub(crate) fn process_callback_vm_output(
        &mut self,
        callback_output: &VMOutput,
        callback_err: Option<VMError>,
    ) -> Result<(), VMError> {
        if callback_err.is_none() {
            return Ok(());
        }

        self.runtime.vm_input_mut().gas_provided = 0;
        self.output
            .set_return_message(callback_output.return_message.clone());
        self.output
            .finish(callback_output.return_code.message().as_bytes().to_vec());
        let tx_hash = self.runtime.current_tx_hash().to_vec();
        self.output.finish(tx_hash);
        Ok(())
    }

    /// Queues the async call as a cross-shard output transfer carrying
    /// all remaining gas plus the locked callback reserve.
    pub(crate) fn send_async_call_to_destination(
        &mut self,
        info: &AsyncCallInfo,
    ) -> Result<(), VMError> {
        let sender = self.runtime.sc_address();
        let value = BigUint::from_bytes_be(&info.value_bytes);
        let result = self.transfer(
            info.destination,
            sender,
            info.gas_limit,
            info.gas_locked,
            &value,
            info.data.clone(),
            CallType::AsynchronousCall,
        );

        let gas_left = self.gas_left();
        self.use_gas(gas_left);
        if let Err(err) = result {
            self.fault(err.clone(), true);
            return Err(err);
        }
        Ok(())
    }

    /// Emits the stored-continuation callback as a cross-shard transfer.
    fn send_storage_callback_to_destination(
        &mut self,
        caller_address: Address,
        return_data: Vec<u8>,
    ) -> Result<(), VMError> {
        let sender = self.runtime.sc_address();
        let value = self.runtime.vm_input().call_value.clone();
        let gas_left = self.gas_left();
        let result = self.transfer(
            caller_address,
            sender,
            gas_left,
            0,
            &value,
            return_data,
            CallType::AsynchronousCallBack,
        );
        let gas_left = self.gas_left();
        self.use_gas(gas_left);
        if let Err(err) = result {
            self.fault(err.clone(), true);
            return Err(err);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // grouped async contexts (createAsyncCall)
    // ------------------------------------------------------------------

    /// Resolves every async call registered through the grouped-context
    /// API: local calls run synchronously with their callbacks, the rest
    /// are serialized to protected storage and queued as transfers.
    pub(crate) fn process_async_info(
        &mut self,
        mut async_info: AsyncContextInfo,
    ) -> Result<AsyncContextInfo, VMError> {
        if async_info.async_context_map.is_empty() {
            return Ok(async_info);
        }

        setup_async_calls_gas(&mut async_info, self.gas_left())?;

        let identifiers: Vec<String> = async_info.async_context_map.keys().cloned().collect();
        for identifier in &identifiers {
            let calls = async_info.async_context_map[identifier].async_calls.clone();
            for (index, call) in calls.iter().enumerate() {
                if !self.can_execute_synchronously(&call.destination) {
                    continue;
                }
                let status = self.process_async_call(call)?;
                if let Some(context) = async_info.async_context_map.get_mut(identifier) {
                    context.async_calls[index].status = status;
                }
            }
        }

        let mut pending = get_pending_async_calls(&async_info);
        if pending.async_context_map.is_empty() {
            return Ok(pending);
        }

        self.save_pending_async_calls(&pending)?;
        setup_async_calls_gas(&mut pending, self.gas_left())?;

        for context in pending.async_context_map.clone().values() {
            for call in &context.async_calls {
                if !self.can_execute_synchronously(&call.destination) {
                    self.send_async_call_to_destination(&call.as_call_info())?;
                }
            }
        }

        Ok(pending)
    }

    fn can_execute_synchronously(&self, destination: &Address) -> bool {
        let sc_address = self.runtime.sc_address();
        self.are_in_same_shard(&sc_address, destination)
            && self.blockchain.get_code(destination).is_ok()
    }

    /// Executes one grouped async call and, if nothing else is pending
    /// below it, its callback. Returns the resulting status.
    fn process_async_call(&mut self, call: &AsyncGeneratedCall) -> Result<AsyncCallStatus, VMError> {
        let info = call.as_call_info();
        let input = self.create_destination_contract_call_input(&info)?;
        let (vm_output, child_async, exec_err) = self.execute_on_dest_context(input);

        let pending = get_pending_async_calls(&child_async);
        if !pending.async_context_map.is_empty() {
            return match exec_err {
                Some(err) => Err(err),
                None => Ok(AsyncCallStatus::Pending),
            };
        }
        self.callback_async(call, &vm_output, exec_err.as_ref())
    }

    fn callback_async(
        &mut self,
        call: &AsyncGeneratedCall,
        vm_output: &VMOutput,
        exec_err: Option<&VMError>,
    ) -> Result<AsyncCallStatus, VMError> {
        let (status, callback_function) = if vm_output.return_code == warx_common::ReturnCode::Ok {
            (AsyncCallStatus::Resolved, call.success_callback.clone())
        } else {
            (AsyncCallStatus::Rejected, call.error_callback.clone())
        };
        if callback_function.is_empty() {
            return Err(VMError::NilCallbackFunction);
        }

        let callback_input = self.create_callback_contract_call_input(
            call.gas_locked,
            vm_output,
            call.destination,
            &callback_function,
            exec_err,
        )?;

        let (cb_output, _, cb_err) = self.execute_on_dest_context(callback_input);
        self.process_callback_vm_output(&cb_output, cb_err)?;
        Ok(status)
    }

    // ------------------------------------------------------------------
    // continuation record in protected storage
    // ------------------------------------------------------------------

    fn async_storage_key(&self) -> Vec<u8> {
        self.storage
            .protected_key(ASYNC_DATA_PREFIX, self.runtime.original_tx_hash())
    }

    pub(crate) fn save_pending_async_calls(
        &mut self,
        pending: &AsyncContextInfo,
    ) -> Result<(), VMError> {
        if pending.async_context_map.is_empty() {
            return Ok(());
        }
        let key = self.async_storage_key();
        let data = serde_json::to_vec(pending)
            .map_err(|err| VMError::InvalidArgument(err.to_string()))?;
        self.set_protected_storage(&key, &data)?;
        Ok(())
    }

    pub(crate) fn get_current_async_info(&mut self) -> Result<AsyncContextInfo, VMError> {
        let key = self.async_storage_key();
        let buffer = self.storage_load_unmetered(&key);
        if buffer.is_empty() {
            return Ok(AsyncContextInfo::default());
        }
        serde_json::from_slice(&buffer).map_err(|err| VMError::InvalidArgument(err.to_string()))
    }

    /// Handles an inbound cross-shard callback: matches the caller
    /// against a pending call, removes it, clears the record when fully
    /// drained and runs (or re-emits) the original caller's callback.
    pub(crate) fn process_callback_stack(&mut self) -> Result<(), VMError> {
        let key = self.async_storage_key();
        let buffer = self.storage_load_unmetered(&key);
        if buffer.is_empty() {
            return Ok(());
        }
        let mut async_info: AsyncContextInfo = serde_json::from_slice(&buffer)
            .map_err(|err| VMError::InvalidArgument(err.to_string()))?;

        let caller = self.runtime.vm_input().caller_addr;
        let mut found: Option<(String, usize)> = None;
        for (identifier, context) in &async_info.async_context_map {
            for (position, call) in context.async_calls.iter().enumerate() {
                if call.destination == caller {
                    found = Some((identifier.clone(), position));
                    break;
                }
            }
            if found.is_some() {
                break;
            }
        }
        let (identifier, position) = found.ok_or(VMError::CallBackFuncNotExpected)?;

        let context_calls = &mut async_info
            .async_context_map
            .get_mut(&identifier)
            .ok_or(VMError::CallBackFuncNotExpected)?
            .async_calls;
        context_calls.swap_remove(position);
        if context_calls.is_empty() {
            async_info.async_context_map.remove(&identifier);
        }

        if !async_info.async_context_map.is_empty() {
            // still waiting for other callbacks
            self.save_pending_async_calls(&async_info)?;
            return Ok(());
        }

        self.set_protected_storage(&key, &[])?;

        let original_caller = Address::from_slice(&async_info.caller_addr)
            .map_err(|_| VMError::CallBackFuncNotExpected)?;
        if !self.can_execute_synchronously(&original_caller) {
            return self
                .send_storage_callback_to_destination(original_caller, async_info.return_data);
        }

        let gas_left = self.gas_left();
        let current_output = self.output.get_vm_output(gas_left);
        let callback_input = self.create_callback_contract_call_input(
            0,
            &current_output,
            original_caller,
            CALLBACK_FUNCTION_NAME,
            None,
        )?;
        let (cb_output, _, cb_err) = self.execute_on_dest_context(callback_input);
        self.process_callback_vm_output(&cb_output, cb_err)
    }

    /// Resolves the function to invoke. On an async-callback input a
    /// pending call whose destination matches the inbound caller swaps in
    /// its registered success callback; that custom callback wins even
    /// when ordinary resolution fails.
    pub(crate) fn get_function_by_call_type(&mut self) -> Result<String, VMError> {
        if self.runtime.vm_input().call_type != CallType::AsynchronousCallBack {
            return self.runtime.function_to_call();
        }

        let async_info = self.get_current_async_info()?;
        let caller = self.runtime.vm_input().caller_addr;

        let mut custom_callback = None;
        'outer: for context in async_info.async_context_map.values() {
            for call in &context.async_calls {
                if call.destination == caller {
                    custom_callback = Some(call.success_callback.clone());
                    self.runtime
                        .set_custom_call_function(call.success_callback.clone());
                    break 'outer;
                }
            }
        }

        match self.runtime.function_to_call() {
            Ok(function) => Ok(function),
            // a matched custom callback wins even when resolution failed;
            // invoking it reports the precise failure
            Err(_) if custom_callback.is_some() => Ok(custom_callback.unwrap_or_default()),
            Err(_) => Err(VMError::NilCallbackFunction),
        }
    }
}

/// Splits the caller's remaining gas over the registered async calls:
/// explicitly provided amounts are honored (their sum may not exceed the
/// remaining gas) and calls with no explicit amount share the rest
/// equally.
pub(crate) fn setup_async_calls_gas(
    async_info: &mut AsyncContextInfo,
    gas_left: u64,
) -> Result<(), VMError> {
    let mut gas_needed = 0u64;
    let mut calls_with_zero_gas = 0u64;

    for context in async_info.async_context_map.values_mut() {
        for call in context.async_calls.iter_mut() {
            gas_needed =
                math::add_u64_checked(gas_needed, call.provided_gas).ok_or(VMError::NotEnoughGas)?;
            if gas_needed > gas_left {
                return Err(VMError::NotEnoughGas);
            }
            if call.provided_gas == 0 {
                calls_with_zero_gas += 1;
                continue;
            }
            call.gas_limit = call.provided_gas;
        }
    }

    if calls_with_zero_gas == 0 {
        return Ok(());
    }
    if gas_left <= gas_needed {
        return Err(VMError::NotEnoughGas);
    }

    let gas_share = (gas_left - gas_needed) / calls_with_zero_gas;
    for context in async_info.async_context_map.values_mut() {
        for call in context.async_calls.iter_mut() {
            if call.provided_gas == 0 {
                call.gas_limit = gas_share;
            }
        }
    }
    Ok(())
}

/// Filters an async record down to its still-pending calls, preserving
/// context callbacks.
pub(crate) fn get_pending_async_calls(async_info: &AsyncContextInfo) -> AsyncContextInfo {
    let mut pending = AsyncContextInfo {
        caller_addr: async_info.caller_addr.clone(),
        return_data: async_info.return_data.clone(),
        async_context_map: Default::default(),
    };

    for (identifier, context) in &async_info.async_context_map {
        let pending_calls: Vec<AsyncGeneratedCall> = context
            .async_calls
            .iter()
            .filter(|call| call.status == AsyncCallStatus::Pending)
            .cloned()
            .collect();
        if pending_calls.is_empty() {
            continue;
        }
        pending.async_context_map.insert(
            identifier.clone(),
            AsyncContext {
                callback: context.callback.clone(),
                async_calls: pending_calls,
            },
        );
    }
    pending
}

/// Length of the data field the callback would have as
/// `callback@arg1@arg2…`.
fn compute_data_length_from_arguments(function: &str, arguments: &[Vec<u8>]) -> usize {
    let mut length = function.len() + arguments.len();
    for argument in arguments {
        length += argument.len();
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(provided_gas: u64) -> AsyncGeneratedCall {
        AsyncGeneratedCall {
            provided_gas,
            ..Default::default()
        }
    }

    fn info_with_calls(calls: Vec<AsyncGeneratedCall>) -> AsyncContextInfo {
        let mut info = AsyncContextInfo::default();
        info.async_context_map.insert(
            "ctx".to_string(),
            AsyncContext {
                callback: String::new(),
                async_calls: calls,
            },
        );
        info
    }

    #[test]
    fn explicit_gas_is_honored_and_rest_is_shared() {
        let mut info = info_with_calls(vec![call(100), call(0), call(0)]);
        setup_async_calls_gas(&mut info, 1000).unwrap();
        let calls = &info.async_context_map["ctx"].async_calls;
        assert_eq!(calls[0].gas_limit, 100);
        assert_eq!(calls[1].gas_limit, 450);
        assert_eq!(calls[2].gas_limit, 450);
    }

    #[test]
    fn overcommitted_gas_fails() {
        let mut info = info_with_calls(vec![call(800), call(300)]);
        assert_eq!(
            setup_async_calls_gas(&mut info, 1000),
            Err(VMError::NotEnoughGas)
        );
    }

    #[test]
    fn equal_provided_and_left_gas_fails_when_sharing_is_needed() {
        let mut info = info_with_calls(vec![call(1000), call(0)]);
        assert_eq!(
            setup_async_calls_gas(&mut info, 1000),
            Err(VMError::NotEnoughGas)
        );
    }

    #[test]
    fn pending_filter_drops_resolved_calls() {
        let mut resolved = call(0);
        resolved.status = AsyncCallStatus::Resolved;
        let info = info_with_calls(vec![resolved, call(0)]);
        let pending = get_pending_async_calls(&info);
        assert_eq!(pending.async_context_map["ctx"].async_calls.len(), 1);

        let mut all_resolved = call(0);
        all_resolved.status = AsyncCallStatus::Rejected;
        let info = info_with_calls(vec![all_resolved]);
        assert!(get_pending_async_calls(&info).async_context_map.is_empty());
    }
}
