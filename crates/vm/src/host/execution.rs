//! The call dispatcher: top-level runs, nested synchronous calls,
//! contract creation and upgrade, builtin dispatch, transfers and the
//! breakpoint state machine.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;
use warx_common::math;
use warx_common::{
    Address, CallType, ContractCallInput, ContractCreateInput, EsdtTransfer, OutputAccount,
    OutputTransfer, ReturnCode, VMOutput, INIT_FUNCTION_NAME,
};

use crate::contexts::runtime::{AsyncContextInfo, RuntimeContext};
use crate::errors::VMError;
use crate::host::VmHost;
use crate::wasm_engine::{BreakpointValue, InstanceOptions};

/// How a nested frame shares state with its parent.
#[derive(Clone, Copy, PartialEq, Eq)]
enum NestedFrameKind {
    /// Fresh output and storage bound to the destination.
    DestContext,
    /// Storage stays bound to the caller; output accumulates in place.
    SameContext,
}

impl VmHost {
    // ------------------------------------------------------------------
    // top-level runs
    // ------------------------------------------------------------------

    pub(crate) fn do_run_smart_contract_call(&mut self, input: &ContractCallInput) -> VMOutput {
        let input = self.init_contexts_from_call_input(input);

        let result = self.execute_top_level_call(&input);
        let vm_output = self.finish_top_level(result);
        self.runtime.clean_instance();
        vm_output
    }

    fn execute_top_level_call(&mut self, input: &ContractCallInput) -> Result<VMOutput, VMError> {
        self.check_allowed_to_execute(input)?;

        let code = self.blockchain.get_code(&input.recipient_addr)?;
        self.deduct_initial_gas_for_execution(&code)?;
        self.start_wasm_instance(&code)?;
        self.call_sc_method()?;
        self.finalize_vm_output_on_success()
    }

    pub(crate) fn do_run_smart_contract_create(&mut self, input: &ContractCreateInput) -> VMOutput {
        let call_input = ContractCallInput {
            vm_input: input.vm_input.clone(),
            recipient_addr: Address::zero(),
            function: INIT_FUNCTION_NAME.to_string(),
        };
        let call_input = self.init_contexts_from_call_input(&call_input);

        let result = self.execute_top_level_create(
            &call_input,
            &input.contract_code,
            &input.contract_code_metadata,
        );
        let vm_output = self.finish_top_level(result);
        self.runtime.clean_instance();
        vm_output
    }

    fn execute_top_level_create(
        &mut self,
        input: &ContractCallInput,
        code: &[u8],
        code_metadata: &[u8],
    ) -> Result<VMOutput, VMError> {
        self.deduct_initial_gas_for_direct_deployment(code)?;

        let caller = input.vm_input.caller_addr;
        let creator_nonce = self.blockchain.get_nonce(&caller);
        let new_address = self
            .blockchain
            .new_address(&caller, creator_nonce, &self.runtime.vm_type().to_vec())?;

        self.runtime.set_sc_address(new_address);
        self.storage.set_address(new_address);
        self.initialize_deployed_account(new_address, caller, code, code_metadata);
        self.transfer_value_only(new_address, caller, &input.vm_input.call_value, false)?;

        self.start_wasm_instance(code)?;
        self.call_sc_method()?;

        self.finalize_vm_output_on_success()
    }

    /// An upgrade is a call whose function is the reserved upgrade name:
    /// `arguments[0]` carries the new code, `arguments[1]` the metadata,
    /// the rest feed `init`. Prior storage is preserved.
    pub(crate) fn do_run_smart_contract_upgrade(&mut self, input: &ContractCallInput) -> VMOutput {
        let input = self.init_contexts_from_call_input(input);

        let result = self.execute_top_level_upgrade(&input);
        let vm_output = self.finish_top_level(result);
        self.runtime.clean_instance();
        vm_output
    }

    fn execute_top_level_upgrade(&mut self, input: &ContractCallInput) -> Result<VMOutput, VMError> {
        self.execute_nested_upgrade(input)?;
        self.finalize_vm_output_on_success()
    }

    fn finish_top_level(&mut self, result: Result<VMOutput, VMError>) -> VMOutput {
        match result {
            Ok(vm_output) => vm_output,
            Err(err) => {
                tracing::trace!(error = %err, "execution failed");
                self.update_gas_state_on_failure();
                crate::contexts::OutputContext::create_vm_output_in_case_of_error(&err)
            }
        }
    }

    fn finalize_vm_output_on_success(&mut self) -> Result<VMOutput, VMError> {
        let gas_remaining = self.gas_left();
        let mut vm_output = self.output.get_vm_output(gas_remaining);
        self.update_gas_state_on_success(&mut vm_output)?;
        Ok(vm_output)
    }

    // ------------------------------------------------------------------
    // instance management and method invocation
    // ------------------------------------------------------------------

    pub(crate) fn start_wasm_instance(&mut self, code: &[u8]) -> Result<(), VMError> {
        let options = InstanceOptions {
            gas_limit: self.metering.gas_for_execution(),
            max_wasm_locals: self.runtime.max_wasm_locals(),
        };
        let instance = self.engine.new_instance(code, &options)?;
        self.runtime.set_new_instance(instance)?;
        self.runtime.set_sc_code_size(code.len() as u64);
        self.runtime.verify_contract_code()?;
        Ok(())
    }

    /// Resolves and invokes the frame's entry point, runs the breakpoint
    /// state machine and the async post-processing.
    pub(crate) fn call_sc_method(&mut self) -> Result<(), VMError> {
        let function = self.get_function_by_call_type()?;

        let instance = self.runtime.instance()?;
        let call_result = instance.call_export(self, &function);
        self.handle_breakpoint(call_result)?;

        match self.runtime.vm_input().call_type {
            CallType::AsynchronousCallBack => self.process_callback_stack()?,
            _ => {
                let async_info = self.runtime.async_context_info().clone();
                self.process_async_info(async_info)?;
            }
        }
        Ok(())
    }

    /// Maps the runtime breakpoint left by the instance onto the frame
    /// outcome; an async-call breakpoint resumes into the async protocol.
    pub(crate) fn handle_breakpoint(
        &mut self,
        call_result: Result<(), VMError>,
    ) -> Result<(), VMError> {
        match self.runtime.get_runtime_breakpoint_value() {
            BreakpointValue::None => call_result,
            BreakpointValue::OutOfGas => Err(VMError::NotEnoughGas),
            BreakpointValue::SignalError => {
                Err(VMError::SignalError(self.output.return_message().to_string()))
            }
            BreakpointValue::ExecutionFailed => Err(self
                .runtime
                .get_all_errors()
                .last()
                .cloned()
                .unwrap_or(VMError::ExecutionFailed)),
            BreakpointValue::AsyncCall => {
                call_result?;
                self.handle_async_call_breakpoint()
            }
        }
    }

    /// Records a host-side failure: the error lands in the runtime's
    /// error list and, when `abort` is set, the breakpoint aborts WASM at
    /// the next check with the message preserved in the output.
    pub fn fault(&mut self, err: VMError, abort: bool) {
        self.runtime.add_error(err.clone());
        if abort {
            self.output.set_return_message(err.to_string());
            self.runtime
                .set_runtime_breakpoint_value(BreakpointValue::ExecutionFailed);
        }
    }

    /// `Err` branch of a host call: record, optionally abort, and yield
    /// `None` so the caller can bail out with its failure code.
    pub(crate) fn fault_on_err<T>(&mut self, result: Result<T, VMError>, abort: bool) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.fault(err, abort);
                None
            }
        }
    }

    /// Guest-signalled failure: UserError with the guest's message.
    pub(crate) fn signal_user_error(&mut self, message: String) {
        self.output.set_return_message(message.clone());
        self.output.set_return_code(ReturnCode::UserError);
        self.runtime.add_error(VMError::SignalError(message));
        self.runtime
            .set_runtime_breakpoint_value(BreakpointValue::SignalError);
    }

    // ------------------------------------------------------------------
    // accounts and transfers
    // ------------------------------------------------------------------

    /// The output entry for `address`, populated with reference balance
    /// and nonce on first touch.
    pub(crate) fn output_account(&mut self, address: Address) -> &mut OutputAccount {
        let exists = self.output.account(&address).is_some();
        if !exists {
            let balance = self.blockchain.get_balance(&address);
            let nonce = self.blockchain.get_nonce(&address);
            let account = self.output.get_output_account(address);
            account.balance = Some(balance);
            account.nonce = nonce;
            account
        } else {
            self.output.get_output_account(address)
        }
    }

    fn initialize_deployed_account(
        &mut self,
        address: Address,
        deployer: Address,
        code: &[u8],
        code_metadata: &[u8],
    ) {
        let account = self.output_account(address);
        account.code = Some(code.to_vec());
        account.code_metadata = code_metadata.to_vec();
        account.code_deployer_address = Some(deployer);
    }

    /// Pure balance movement. Fails when the sender's delta-adjusted
    /// balance cannot cover the value, or when a payable check is
    /// requested and the destination contract refuses payments.
    pub fn transfer_value_only(
        &mut self,
        destination: Address,
        sender: Address,
        value: &BigUint,
        check_payable: bool,
    ) -> Result<(), VMError> {
        if value.is_zero() {
            self.output_account(destination);
            return Ok(());
        }

        let value_signed = BigInt::from_biguint(Sign::Plus, value.clone());
        {
            let sender_account = self.output_account(sender);
            let available = BigInt::from_biguint(
                Sign::Plus,
                sender_account.balance.clone().unwrap_or_default(),
            ) + &sender_account.balance_delta;
            if available < value_signed {
                return Err(VMError::FailedTransfer);
            }
        }

        if check_payable && self.blockchain.is_smart_contract(&destination) {
            let payable = self
                .blockchain
                .hook()
                .is_payable(&destination)
                .unwrap_or(false);
            if !payable {
                return Err(VMError::AccountNotPayable);
            }
        }

        self.output_account(sender).balance_delta -= &value_signed;
        self.output_account(destination).balance_delta += &value_signed;
        Ok(())
    }

    /// Balance movement plus an outbound transfer record on the receiving
    /// account. Gas attached to the transfer is not consumed here; the
    /// call sites that attach gas consume it so the reconciliation
    /// invariant stays closed.
    pub fn transfer(
        &mut self,
        destination: Address,
        sender: Address,
        gas_limit: u64,
        gas_locked: u64,
        value: &BigUint,
        data: Vec<u8>,
        call_type: CallType,
    ) -> Result<(), VMError> {
        let check_payable = call_type == CallType::DirectCall && data.is_empty();
        self.transfer_value_only(destination, sender, value, check_payable)?;

        self.output_account(destination)
            .output_transfers
            .push(OutputTransfer {
                value: value.clone(),
                gas_limit,
                gas_locked,
                data,
                call_type,
                sender_address: sender,
            });
        Ok(())
    }

    // ------------------------------------------------------------------
    // nested synchronous execution
    // ------------------------------------------------------------------

    /// Runs `input` in a child frame against the destination's own
    /// storage. On success the child's effects merge into the parent; on
    /// failure the parent state is restored untouched. Always returns the
    /// child's VM output (an error-shaped one on failure) together with
    /// the child's async state.
    pub fn execute_on_dest_context(
        &mut self,
        input: ContractCallInput,
    ) -> (VMOutput, AsyncContextInfo, Option<VMError>) {
        if self.builtin_functions.is_builtin_function(&input.function) {
            return match self.call_builtin_function(&input) {
                Ok(output) => (output, AsyncContextInfo::default(), None),
                Err(err) => (
                    crate::contexts::OutputContext::create_vm_output_in_case_of_error(&err),
                    AsyncContextInfo::default(),
                    Some(err),
                ),
            };
        }
        self.execute_nested(input, NestedFrameKind::DestContext)
    }

    /// Runs `input` in a child frame sharing the caller's storage:
    /// storage writes land on the caller's address and managed-type
    /// changes survive into the parent.
    pub fn execute_on_same_context(
        &mut self,
        input: ContractCallInput,
    ) -> (VMOutput, Option<VMError>) {
        let (vm_output, _, err) = self.execute_nested(input, NestedFrameKind::SameContext);
        (vm_output, err)
    }

    fn execute_nested(
        &mut self,
        input: ContractCallInput,
        kind: NestedFrameKind,
    ) -> (VMOutput, AsyncContextInfo, Option<VMError>) {
        self.push_nested_frame(&input, kind);
        let child_gas_provided = self.metering.gas_provided();

        match self.execute_nested_frame(&input, kind) {
            Ok(()) => {
                let gas_remaining = self.gas_left();
                self.update_sc_gas_used();
                let vm_output = self.output.get_vm_output(gas_remaining);
                let async_info = self.runtime.async_context_info().clone();

                self.pop_nested_frame_on_success(kind);
                self.use_gas(math::sub_u64(child_gas_provided, gas_remaining));
                (vm_output, async_info, None)
            }
            Err(err) => {
                self.pop_nested_frame_on_failure(kind);
                self.use_gas(child_gas_provided);
                (
                    crate::contexts::OutputContext::create_vm_output_in_case_of_error(&err),
                    AsyncContextInfo::default(),
                    Some(err),
                )
            }
        }
    }

    fn push_nested_frame(&mut self, input: &ContractCallInput, kind: NestedFrameKind) {
        self.managed_types.push_state();
        self.blockchain.push_state();
        self.metering.push_state();
        self.output.push_state();
        if kind == NestedFrameKind::DestContext {
            self.output.init_state();
        }
        self.storage.push_state();
        if kind == NestedFrameKind::DestContext {
            self.storage.set_address(input.recipient_addr);
        }
        self.runtime.push_instance();
        self.runtime.push_state();

        let mut input = input.clone();
        self.metering.init_state_from_input(&mut input.vm_input);
        self.runtime.init_state_from_input(&input);
    }

    fn execute_nested_frame(
        &mut self,
        input: &ContractCallInput,
        _kind: NestedFrameKind,
    ) -> Result<(), VMError> {
        if input.function == warx_common::UPGRADE_FUNCTION_NAME {
            return self.execute_nested_upgrade(input);
        }

        RuntimeContext::check_indirect_function_allowed(&input.function).or_else(|err| {
            // async callbacks legitimately enter through callBack
            if input.vm_input.call_type == CallType::AsynchronousCallBack {
                Ok(())
            } else {
                Err(err)
            }
        })?;

        self.transfer_value_only(
            input.recipient_addr,
            input.vm_input.caller_addr,
            &input.vm_input.call_value,
            false,
        )?;

        let code = self.blockchain.get_code(&input.recipient_addr)?;
        self.deduct_initial_gas_for_execution(&code)?;
        self.start_wasm_instance(&code)?;
        self.call_sc_method()
    }

    /// An upgrade arriving through the async path and resolved in-shard:
    /// install the new code on the destination and run its `init`,
    /// preserving prior storage.
    fn execute_nested_upgrade(&mut self, input: &ContractCallInput) -> Result<(), VMError> {
        if input.vm_input.arguments.len() < 2 {
            return Err(VMError::InvalidArgument(
                "upgrade requires code and code metadata".to_string(),
            ));
        }
        let code = input.vm_input.arguments[0].clone();
        let code_metadata = input.vm_input.arguments[1].clone();
        let init_args = input.vm_input.arguments[2..].to_vec();

        self.deduct_initial_gas_for_direct_deployment(&code)?;

        let destination = input.recipient_addr;
        self.runtime.vm_input_mut().arguments = init_args;
        {
            let account = self.output_account(destination);
            account.code = Some(code.clone());
            account.code_metadata = code_metadata;
            account.code_deployer_address = Some(input.vm_input.caller_addr);
        }
        self.transfer_value_only(
            destination,
            input.vm_input.caller_addr,
            &input.vm_input.call_value,
            false,
        )?;

        self.start_wasm_instance(&code)?;
        let instance = self.runtime.instance()?;
        let call_result = instance.call_export(self, INIT_FUNCTION_NAME);
        self.handle_breakpoint(call_result)
    }

    fn pop_nested_frame_on_success(&mut self, kind: NestedFrameKind) {
        match kind {
            NestedFrameKind::DestContext => {
                self.output.pop_merge_active_state();
                self.managed_types.pop_set_active_state();
            }
            NestedFrameKind::SameContext => {
                // the child accumulated into the shared state; the pushed
                // snapshot is only needed for the failure path
                self.output.pop_discard();
                self.managed_types.pop_discard();
            }
        }
        self.metering.pop_merge_active_state();
        self.storage.pop_set_active_state();
        self.runtime.pop_instance();
        self.runtime.pop_set_active_state();
        self.blockchain.pop_discard();
    }

    fn pop_nested_frame_on_failure(&mut self, kind: NestedFrameKind) {
        let _ = kind;
        self.output.pop_set_active_state();
        self.managed_types.pop_set_active_state();
        self.metering.pop_set_active_state();
        self.storage.pop_set_active_state();
        self.runtime.pop_instance();
        self.runtime.pop_set_active_state();
        if let Err(err) = self.blockchain.pop_set_active_state() {
            tracing::error!(error = %err, "snapshot revert failed");
        }
    }

    // ------------------------------------------------------------------
    // contract creation from inside a contract
    // ------------------------------------------------------------------

    /// Deploys a new contract from a running one: derives the address,
    /// charges the indirect-deployment gas, runs `init` on the new code in
    /// a child frame and returns the new address. The initial gas is
    /// deducted before the address is derived, so derivation observes the
    /// creator's pre-call nonce.
    pub fn create_new_contract(&mut self, input: &ContractCreateInput) -> Result<Address, VMError> {
        if self.runtime.read_only() {
            return Err(VMError::CannotWriteOnReadOnly);
        }

        let call_input = ContractCallInput {
            vm_input: input.vm_input.clone(),
            recipient_addr: Address::zero(),
            function: INIT_FUNCTION_NAME.to_string(),
        };
        self.push_nested_frame(&call_input, NestedFrameKind::DestContext);
        let child_gas_provided = self.metering.gas_provided();

        match self.execute_create_frame(input) {
            Ok(new_address) => {
                let gas_remaining = self.gas_left();
                self.update_sc_gas_used();
                let vm_output = self.output.get_vm_output(gas_remaining);

                self.pop_nested_frame_on_success(NestedFrameKind::DestContext);
                self.use_gas(math::sub_u64(child_gas_provided, vm_output.gas_remaining));
                Ok(new_address)
            }
            Err(err) => {
                self.pop_nested_frame_on_failure(NestedFrameKind::DestContext);
                self.use_gas(child_gas_provided);
                let abort = self.runtime.base_api_error_should_fail_execution();
                self.fault(err.clone(), abort);
                Err(err)
            }
        }
    }

    fn execute_create_frame(&mut self, input: &ContractCreateInput) -> Result<Address, VMError> {
        self.deduct_initial_gas_for_indirect_deployment(&input.contract_code)?;

        let creator = input.vm_input.caller_addr;
        let creator_nonce = self.blockchain.get_nonce(&creator);
        let vm_type = self.runtime.vm_type().to_vec();
        let new_address = self
            .blockchain
            .new_address(&creator, creator_nonce, &vm_type)?;

        self.runtime.set_sc_address(new_address);
        self.storage.set_address(new_address);
        self.initialize_deployed_account(
            new_address,
            creator,
            &input.contract_code,
            &input.contract_code_metadata,
        );
        self.transfer_value_only(new_address, creator, &input.vm_input.call_value, false)?;

        self.start_wasm_instance(&input.contract_code)?;
        let instance = self.runtime.instance()?;
        let call_result = instance.call_export(self, INIT_FUNCTION_NAME);
        self.handle_breakpoint(call_result)?;

        Ok(new_address)
    }

    // ------------------------------------------------------------------
    // builtin functions and ESDT transfers
    // ------------------------------------------------------------------

    /// Executes a protocol builtin through the blockchain hook, charges
    /// its consumption to the running instance and merges its effects.
    pub(crate) fn call_builtin_function(
        &mut self,
        input: &ContractCallInput,
    ) -> Result<VMOutput, VMError> {
        let builtin_output = self.blockchain.hook().process_builtin_function(input)?;
        self.track_gas_used_by_builtin_function(input, &builtin_output, None);
        self.output.merge_vm_output(&builtin_output);
        Ok(builtin_output)
    }

    /// Models an ESDT transfer as an internally executed builtin call.
    /// Returns the gas remaining for a follow-up contract call on a
    /// same-shard smart-contract target.
    pub fn execute_esdt_transfer(
        &mut self,
        destination: Address,
        sender: Address,
        transfers: &[EsdtTransfer],
        gas_limit: u64,
        call_type: CallType,
    ) -> Result<(VMOutput, u64), VMError> {
        if transfers.is_empty() {
            return Err(VMError::FailedTransfer);
        }

        let (function, arguments) = encode_esdt_transfer_call(&destination, transfers);
        let builtin_input = ContractCallInput {
            vm_input: warx_common::VMInput {
                caller_addr: sender,
                arguments,
                call_value: BigUint::default(),
                call_type,
                gas_price: self.runtime.vm_input().gas_price,
                gas_provided: gas_limit.min(self.gas_left()),
                original_tx_hash: self.runtime.original_tx_hash().to_vec(),
                current_tx_hash: self.runtime.current_tx_hash().to_vec(),
                ..Default::default()
            },
            recipient_addr: if transfers.len() == 1 && transfers[0].token_nonce == 0 {
                destination
            } else {
                sender
            },
            function,
        };

        let builtin_output = self.blockchain.hook().process_builtin_function(&builtin_input)?;
        let gas_for_execution = builtin_output.gas_remaining;
        self.track_gas_used_by_builtin_function(&builtin_input, &builtin_output, None);
        self.output.merge_vm_output(&builtin_output);
        Ok((builtin_output, gas_for_execution))
    }
}

/// The canonical builtin encoding of token transfers: fungible single
/// transfers address the token contract at the destination, NFT transfers
/// and batches go through the sender with the destination embedded.
fn encode_esdt_transfer_call(
    destination: &Address,
    transfers: &[EsdtTransfer],
) -> (String, Vec<Vec<u8>>) {
    if transfers.len() == 1 {
        let transfer = &transfers[0];
        if transfer.token_nonce == 0 {
            return (
                "ESDTTransfer".to_string(),
                vec![
                    transfer.token_name.clone(),
                    transfer.value.to_bytes_be(),
                ],
            );
        }
        return (
            "ESDTNFTTransfer".to_string(),
            vec![
                transfer.token_name.clone(),
                BigUint::from(transfer.token_nonce).to_bytes_be(),
                transfer.value.to_bytes_be(),
                destination.to_vec(),
            ],
        );
    }

    let mut arguments = vec![
        destination.to_vec(),
        BigUint::from(transfers.len() as u64).to_bytes_be(),
    ];
    for transfer in transfers {
        arguments.push(transfer.token_name.clone());
        arguments.push(BigUint::from(transfer.token_nonce).to_bytes_be());
        arguments.push(transfer.value.to_bytes_be());
    }
    ("MultiESDTNFTTransfer".to_string(), arguments)
}
