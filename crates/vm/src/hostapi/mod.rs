//! The host functions exposed to WASM contracts, grouped the way the
//! guest-side API groups them. Each function charges its gas first, then
//! operates on the contexts through the host; failures are recorded via
//! [`VmHost::fault`] with the abort decision spelled at the call site.
//!
//! Functions take `&mut VmHost` as their first parameter: they are the
//! import surface bound to the instance at creation, not host methods.

pub mod base_ops;
pub mod big_int_ops;
pub mod crypto_ops;
pub mod managed_buffer_ops;
pub mod small_int_ops;

use num_bigint::BigUint;
use warx_common::math;
use warx_common::{Address, ContractCallInput, EsdtTransfer, VMInput};

use crate::errors::VMError;
use crate::host::VmHost;

/// Arguments of an indirect contract call, read out of guest memory.
pub(crate) struct IndirectCallArgs {
    pub dest: Address,
    pub value: BigUint,
    pub function: Vec<u8>,
    pub args: Vec<Vec<u8>>,
}

/// Reads `num_arguments` length-prefixed arguments from guest memory:
/// little-endian i32 lengths at `lengths_offset`, payloads packed at
/// `data_offset`. Returns the arguments and their total byte size.
pub(crate) fn get_arguments_from_memory(
    host: &mut VmHost,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> Result<(Vec<Vec<u8>>, i32), VMError> {
    if num_arguments < 0 {
        return Err(VMError::InvalidArgument(format!(
            "negative numArguments ({num_arguments})"
        )));
    }

    let lengths_data = host
        .runtime()
        .mem_load(lengths_offset, num_arguments.saturating_mul(4))?;
    let lengths: Vec<i32> = lengths_data
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    let data = host.runtime().mem_load_multiple(data_offset, &lengths)?;
    let total: i32 = lengths.iter().sum();
    Ok((data, total))
}

/// Reads destination, value, function name and arguments of an indirect
/// call, charging the copy cost for the argument bytes.
#[allow(clippy::too_many_arguments)]
pub(crate) fn extract_indirect_call_args(
    host: &mut VmHost,
    dest_offset: i32,
    value_offset: Option<i32>,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> Result<IndirectCallArgs, VMError> {
    let dest_bytes = host
        .runtime()
        .mem_load(dest_offset, warx_common::ADDRESS_LEN as i32)?;
    let dest = Address::from_slice(&dest_bytes).map_err(|_| VMError::MemoryOutOfBounds)?;

    let value = match value_offset {
        Some(offset) => {
            let value_bytes = host
                .runtime()
                .mem_load(offset, warx_common::BALANCE_LEN as i32)?;
            BigUint::from_bytes_be(&value_bytes)
        }
        None => BigUint::default(),
    };

    let function = host.runtime().mem_load(function_offset, function_length)?;
    let (args, actual_len) =
        get_arguments_from_memory(host, num_arguments, lengths_offset, data_offset)?;

    let copy_cost = math::mul_u64(
        host.gas_schedule().base_operation_cost.data_copy_per_byte,
        actual_len as u64,
    );
    host.use_gas(copy_cost);

    Ok(IndirectCallArgs {
        dest,
        value,
        function,
        args,
    })
}

/// Builds the call input of an indirect (contract-to-contract) call. A
/// synchronous execution request across shards is rejected here.
pub(crate) fn prepare_indirect_contract_call_input(
    host: &mut VmHost,
    sender: Address,
    value: BigUint,
    gas_limit: i64,
    destination: Address,
    function: &[u8],
    args: Vec<Vec<u8>>,
    sync_execution_required: bool,
) -> Result<ContractCallInput, VMError> {
    let sc_address = host.runtime().sc_address();
    if sync_execution_required && !host.are_in_same_shard(&sc_address, &destination) {
        return Err(VMError::SyncExecutionNotInSameShard);
    }

    Ok(ContractCallInput {
        vm_input: VMInput {
            caller_addr: sender,
            arguments: args,
            call_value: value,
            gas_price: 0,
            gas_provided: host.bound_gas_limit(gas_limit),
            original_tx_hash: host.runtime().original_tx_hash().to_vec(),
            current_tx_hash: host.runtime().current_tx_hash().to_vec(),
            ..Default::default()
        },
        recipient_addr: destination,
        function: String::from_utf8_lossy(function).into_owned(),
    })
}

/// The transfer at `index` of the current input, if any.
pub(crate) fn esdt_transfer_from_input(input: &VMInput, index: i32) -> Option<&EsdtTransfer> {
    if index < 0 {
        return None;
    }
    input.esdt_transfers.get(index as usize)
}

/// The compatibility surface without an index argument allows exactly one
/// attached transfer.
pub(crate) fn fail_if_more_than_one_esdt_transfer(host: &mut VmHost) -> bool {
    if host.runtime().vm_input().esdt_transfers.len() > 1 {
        let abort = host.runtime().base_api_error_should_fail_execution();
        host.fault(VMError::TooManyEsdtTransfers, abort);
        return true;
    }
    false
}
