//! Environment, arguments, storage, logging, transfers and
//! cross-contract calls: the general-purpose half of the guest API.
//!
//! Failure codes follow the guest convention: 0 success, 1 (or -1 for
//! index-shaped results) failure.

use num_bigint::BigUint;
use warx_common::math;
use warx_common::{Address, CallType, ContractCreateInput, EsdtTokenType, EsdtTransfer};
use warx_common::{ADDRESS_LEN, BALANCE_LEN, CODE_METADATA_LEN, HASH_LEN, UPGRADE_FUNCTION_NAME};

use crate::call_args;
use crate::contexts::runtime::AsyncGeneratedCall;
use crate::contexts::storage::TIMELOCK_KEY_PREFIX;
use crate::errors::VMError;
use crate::host::VmHost;
use crate::hostapi::{
    extract_indirect_call_args, get_arguments_from_memory, prepare_indirect_contract_call_input,
};
use crate::wasm_engine::BreakpointValue;

// ---------------------------------------------------------------------
// environment & arguments
// ---------------------------------------------------------------------

pub fn get_gas_left(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_gas_left;
    host.use_gas(cost);
    host.gas_left() as i64
}

pub fn get_sc_address(host: &mut VmHost, result_offset: i32) {
    let cost = host.gas_schedule().base_api_cost.get_sc_address;
    host.use_gas(cost);

    let address = host.runtime().sc_address();
    let result = host.runtime().mem_store(result_offset, address.as_bytes());
    let abort = host.runtime().base_api_error_should_fail_execution();
    host.fault_on_err(result, abort);
}

pub fn get_owner_address(host: &mut VmHost, result_offset: i32) {
    let cost = host.gas_schedule().base_api_cost.get_owner_address;
    host.use_gas(cost);

    let sc_address = host.runtime().sc_address();
    let abort = host.runtime().base_api_error_should_fail_execution();
    let owner = match host.fault_on_err(host.blockchain().hook().get_owner_address(&sc_address), abort)
    {
        Some(owner) => owner,
        None => return,
    };
    let result = host.runtime().mem_store(result_offset, owner.as_bytes());
    host.fault_on_err(result, abort);
}

pub fn get_caller(host: &mut VmHost, result_offset: i32) {
    let cost = host.gas_schedule().base_api_cost.get_caller;
    host.use_gas(cost);

    let caller = host.runtime().vm_input().caller_addr;
    let result = host.runtime().mem_store(result_offset, caller.as_bytes());
    let abort = host.runtime().base_api_error_should_fail_execution();
    host.fault_on_err(result, abort);
}

pub fn get_shard_of_address(host: &mut VmHost, address_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_shard_of_address;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let load = host.runtime().mem_load(address_offset, ADDRESS_LEN as i32);
    let Some(address_bytes) = host.fault_on_err(load, abort) else {
        return 0;
    };
    let Ok(address) = Address::from_slice(&address_bytes) else {
        return 0;
    };
    host.blockchain().get_shard_of_address(&address) as i32
}

pub fn is_smart_contract(host: &mut VmHost, address_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.is_smart_contract;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let load = host.runtime().mem_load(address_offset, ADDRESS_LEN as i32);
    let Some(address_bytes) = host.fault_on_err(load, abort) else {
        return 0;
    };
    let Ok(address) = Address::from_slice(&address_bytes) else {
        return 0;
    };
    host.blockchain().is_smart_contract(&address) as i32
}

pub fn signal_error(host: &mut VmHost, message_offset: i32, message_length: i32) {
    let cost = host.gas_schedule().base_api_cost.signal_error;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let load = host.runtime().mem_load(message_offset, message_length);
    let Some(message) = host.fault_on_err(load, abort) else {
        return;
    };
    host.signal_user_error(String::from_utf8_lossy(&message).into_owned());
}

pub fn get_external_balance(host: &mut VmHost, address_offset: i32, result_offset: i32) {
    let cost = host.gas_schedule().base_api_cost.get_external_balance;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let load = host.runtime().mem_load(address_offset, ADDRESS_LEN as i32);
    let Some(address_bytes) = host.fault_on_err(load, abort) else {
        return;
    };
    let Ok(address) = Address::from_slice(&address_bytes) else {
        return;
    };
    let balance = host.blockchain().get_balance_bytes(&address);
    let result = host.runtime().mem_store(result_offset, &balance);
    host.fault_on_err(result, abort);
}

pub fn block_hash(host: &mut VmHost, nonce: i64, result_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_block_hash;
    host.use_gas(cost);

    let hash = host.blockchain().block_hash(nonce as u64);
    let result = host.runtime().mem_store(result_offset, &hash);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    0
}

pub fn get_argument_length(host: &mut VmHost, id: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_argument;
    host.use_gas(cost);

    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        return -1;
    }
    args[id as usize].len() as i32
}

/// Out-of-range indices return -1 and leave guest memory untouched.
pub fn get_argument(host: &mut VmHost, id: i32, arg_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_argument;
    host.use_gas(cost);

    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        return -1;
    }
    let argument = args[id as usize].clone();
    let result = host.runtime().mem_store(arg_offset, &argument);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    argument.len() as i32
}

pub fn get_function(host: &mut VmHost, function_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_function;
    host.use_gas(cost);

    let function = host.runtime().function().as_bytes().to_vec();
    let result = host.runtime().mem_store(function_offset, &function);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    function.len() as i32
}

pub fn get_num_arguments(host: &mut VmHost) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_num_arguments;
    host.use_gas(cost);
    host.runtime().arguments().len() as i32
}

pub fn check_no_payment(host: &mut VmHost) {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    use num_traits::Zero;
    let input = host.runtime().vm_input();
    if !input.call_value.is_zero() {
        let abort = host.runtime().base_api_error_should_fail_execution();
        host.fault(VMError::NonPayableFunctionEgld, abort);
        return;
    }
    if !input.esdt_transfers.is_empty() {
        let abort = host.runtime().base_api_error_should_fail_execution();
        host.fault(VMError::NonPayableFunctionEsdt, abort);
    }
}

pub fn get_call_value(host: &mut VmHost, result_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    let value = host.runtime().vm_input().call_value.to_bytes_be();
    let value = left_pad_balance(&value);
    let result = host.runtime().mem_store(result_offset, &value);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    value.len() as i32
}

pub fn get_num_esdt_transfers(host: &mut VmHost) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);
    host.runtime().vm_input().esdt_transfers.len() as i32
}

pub fn get_esdt_value(host: &mut VmHost, result_offset: i32) -> i32 {
    if super::fail_if_more_than_one_esdt_transfer(host) {
        return -1;
    }
    get_esdt_value_by_index(host, result_offset, 0)
}

pub fn get_esdt_value_by_index(host: &mut VmHost, result_offset: i32, index: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    let value = match super::esdt_transfer_from_input(host.runtime().vm_input(), index) {
        Some(transfer) => transfer.value.to_bytes_be(),
        None => Vec::new(),
    };
    let result = host.runtime().mem_store(result_offset, &value);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    value.len() as i32
}

pub fn get_esdt_token_name(host: &mut VmHost, result_offset: i32) -> i32 {
    if super::fail_if_more_than_one_esdt_transfer(host) {
        return -1;
    }
    get_esdt_token_name_by_index(host, result_offset, 0)
}

pub fn get_esdt_token_name_by_index(host: &mut VmHost, result_offset: i32, index: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    let name = match super::esdt_transfer_from_input(host.runtime().vm_input(), index) {
        Some(transfer) => transfer.token_name.clone(),
        None => Vec::new(),
    };
    let result = host.runtime().mem_store(result_offset, &name);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    name.len() as i32
}

pub fn get_esdt_token_nonce(host: &mut VmHost) -> i64 {
    if super::fail_if_more_than_one_esdt_transfer(host) {
        return 0;
    }
    get_esdt_token_nonce_by_index(host, 0)
}

pub fn get_esdt_token_nonce_by_index(host: &mut VmHost, index: i32) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    match super::esdt_transfer_from_input(host.runtime().vm_input(), index) {
        Some(transfer) => transfer.token_nonce as i64,
        None => 0,
    }
}

pub fn get_esdt_token_type(host: &mut VmHost) -> i32 {
    if super::fail_if_more_than_one_esdt_transfer(host) {
        return -1;
    }
    get_esdt_token_type_by_index(host, 0)
}

pub fn get_esdt_token_type_by_index(host: &mut VmHost, index: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    match super::esdt_transfer_from_input(host.runtime().vm_input(), index) {
        Some(transfer) => match transfer.token_type {
            EsdtTokenType::Fungible => 0,
            EsdtTokenType::NonFungible => 1,
            EsdtTokenType::SemiFungible => 2,
        },
        None => 0,
    }
}

pub fn get_call_value_token_name(
    host: &mut VmHost,
    call_value_offset: i32,
    token_name_offset: i32,
) -> i32 {
    if super::fail_if_more_than_one_esdt_transfer(host) {
        return -1;
    }
    get_call_value_token_name_by_index(host, call_value_offset, token_name_offset, 0)
}

/// Writes the effective call value (the token value when a transfer is
/// attached, the plain value otherwise) and the token name; returns the
/// name's length.
pub fn get_call_value_token_name_by_index(
    host: &mut VmHost,
    call_value_offset: i32,
    token_name_offset: i32,
    index: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_call_value;
    host.use_gas(cost);

    let (value, token_name) =
        match super::esdt_transfer_from_input(host.runtime().vm_input(), index) {
            Some(transfer) => (transfer.value.to_bytes_be(), transfer.token_name.clone()),
            None => (
                host.runtime().vm_input().call_value.to_bytes_be(),
                Vec::new(),
            ),
        };
    let value = left_pad_balance(&value);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let store_value = host.runtime().mem_store(call_value_offset, &value);
    if host.fault_on_err(store_value, abort).is_none() {
        return -1;
    }
    let store_name = host.runtime().mem_store(token_name_offset, &token_name);
    if host.fault_on_err(store_name, abort).is_none() {
        return -1;
    }
    token_name.len() as i32
}

pub fn get_esdt_balance(
    host: &mut VmHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
    result_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_external_balance;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(token) = load_esdt_token(host, address_offset, token_id_offset, token_id_len, nonce)
    else {
        return -1;
    };
    let value = token.value.to_bytes_be();
    let result = host.runtime().mem_store(result_offset, &value);
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    value.len() as i32
}

pub fn get_esdt_nft_name_length(
    host: &mut VmHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_external_balance;
    host.use_gas(cost);
    match load_esdt_token(host, address_offset, token_id_offset, token_id_len, nonce) {
        Some(token) => token.name.len() as i32,
        None => -1,
    }
}

pub fn get_esdt_nft_attribute_length(
    host: &mut VmHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_external_balance;
    host.use_gas(cost);
    match load_esdt_token(host, address_offset, token_id_offset, token_id_len, nonce) {
        Some(token) => token.attributes.len() as i32,
        None => -1,
    }
}

pub fn get_esdt_nft_uri_length(
    host: &mut VmHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_external_balance;
    host.use_gas(cost);
    match load_esdt_token(host, address_offset, token_id_offset, token_id_len, nonce) {
        Some(token) => token.uris.first().map(|uri| uri.len()).unwrap_or(0) as i32,
        None => -1,
    }
}

fn load_esdt_token(
    host: &mut VmHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
) -> Option<crate::hooks::EsdtTokenData> {
    let abort = host.runtime().base_api_error_should_fail_execution();
    let address_bytes = host.fault_on_err(
        host.runtime().mem_load(address_offset, ADDRESS_LEN as i32),
        abort,
    )?;
    let token_id = host.fault_on_err(
        host.runtime().mem_load(token_id_offset, token_id_len),
        abort,
    )?;
    let address = Address::from_slice(&address_bytes).ok()?;
    host.fault_on_err(
        host.blockchain()
            .hook()
            .get_esdt_token(&address, &token_id, nonce as u64),
        abort,
    )
}

// ---------------------------------------------------------------------
// block metadata
// ---------------------------------------------------------------------

pub fn get_block_timestamp(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_timestamp;
    host.use_gas(cost);
    host.blockchain().hook().current_timestamp() as i64
}

pub fn get_block_nonce(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_nonce;
    host.use_gas(cost);
    host.blockchain().hook().current_nonce() as i64
}

pub fn get_block_round(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_round;
    host.use_gas(cost);
    host.blockchain().hook().current_round() as i64
}

pub fn get_block_epoch(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_epoch;
    host.use_gas(cost);
    host.blockchain().hook().current_epoch() as i64
}

pub fn get_block_random_seed(host: &mut VmHost, pointer: i32) {
    let cost = host.gas_schedule().base_api_cost.get_block_random_seed;
    host.use_gas(cost);
    let seed = host.blockchain().hook().current_random_seed();
    let result = host.runtime().mem_store(pointer, &seed);
    let abort = host.runtime().base_api_error_should_fail_execution();
    host.fault_on_err(result, abort);
}

pub fn get_prev_block_timestamp(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_timestamp;
    host.use_gas(cost);
    host.blockchain().hook().last_timestamp() as i64
}

pub fn get_prev_block_nonce(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_nonce;
    host.use_gas(cost);
    host.blockchain().hook().last_nonce() as i64
}

pub fn get_prev_block_round(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_round;
    host.use_gas(cost);
    host.blockchain().hook().last_round() as i64
}

pub fn get_prev_block_epoch(host: &mut VmHost) -> i64 {
    let cost = host.gas_schedule().base_api_cost.get_block_epoch;
    host.use_gas(cost);
    host.blockchain().hook().last_epoch() as i64
}

pub fn get_prev_block_random_seed(host: &mut VmHost, pointer: i32) {
    let cost = host.gas_schedule().base_api_cost.get_block_random_seed;
    host.use_gas(cost);
    let seed = host.blockchain().hook().last_random_seed();
    let result = host.runtime().mem_store(pointer, &seed);
    let abort = host.runtime().base_api_error_should_fail_execution();
    host.fault_on_err(result, abort);
}

pub fn get_state_root_hash(host: &mut VmHost, pointer: i32) {
    let cost = host.gas_schedule().base_api_cost.get_state_root_hash;
    host.use_gas(cost);
    let hash = host.blockchain().hook().get_state_root_hash();
    let result = host.runtime().mem_store(pointer, &hash);
    let abort = host.runtime().base_api_error_should_fail_execution();
    host.fault_on_err(result, abort);
}

pub fn get_original_tx_hash(host: &mut VmHost, data_offset: i32) {
    let cost = host.gas_schedule().base_api_cost.get_original_tx_hash;
    host.use_gas(cost);
    let hash = host.runtime().original_tx_hash().to_vec();
    let result = host.runtime().mem_store(data_offset, &hash);
    let abort = host.runtime().base_api_error_should_fail_execution();
    host.fault_on_err(result, abort);
}

// ---------------------------------------------------------------------
// storage & logging
// ---------------------------------------------------------------------

pub fn storage_store(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.storage_store;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return -1;
    };
    let stored = host.storage_store(&key, &data);
    match host.fault_on_err(stored, abort) {
        Some(status) => status as i32,
        None => -1,
    }
}

pub fn storage_load(host: &mut VmHost, key_offset: i32, key_length: i32, data_offset: i32) -> i32 {
    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let data = host.storage_load(&key);
    if host
        .fault_on_err(host.runtime().mem_store(data_offset, &data), abort)
        .is_none()
    {
        return -1;
    }
    data.len() as i32
}

pub fn storage_load_length(host: &mut VmHost, key_offset: i32, key_length: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.storage_load;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    host.storage_load_unmetered(&key).len() as i32
}

pub fn storage_load_from_address(
    host: &mut VmHost,
    address_offset: i32,
    key_offset: i32,
    key_length: i32,
    data_offset: i32,
) -> i32 {
    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let Some(address_bytes) = host.fault_on_err(
        host.runtime().mem_load(address_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return -1;
    };
    let Ok(address) = Address::from_slice(&address_bytes) else {
        return -1;
    };
    let data = host.storage_load_from_address(&address, &key);
    if host
        .fault_on_err(host.runtime().mem_store(data_offset, &data), abort)
        .is_none()
    {
        return -1;
    }
    data.len() as i32
}

pub fn set_storage_lock(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    lock_timestamp: i64,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.int64_storage_store;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let timelock_key = host.storage().protected_key(TIMELOCK_KEY_PREFIX, &key);
    let timestamp_bytes = BigUint::from(lock_timestamp.max(0) as u64).to_bytes_be();
    let stored = host.set_protected_storage(&timelock_key, &timestamp_bytes);
    match host.fault_on_err(stored, abort) {
        Some(status) => status as i32,
        None => -1,
    }
}

pub fn get_storage_lock(host: &mut VmHost, key_offset: i32, key_length: i32) -> i64 {
    let cost = host.gas_schedule().base_api_cost.storage_load;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let timelock_key = host.storage().protected_key(TIMELOCK_KEY_PREFIX, &key);
    let data = host.storage_load(&timelock_key);
    let value = BigUint::from_bytes_be(&data);
    use num_traits::ToPrimitive;
    value.to_i64().unwrap_or(i64::MAX)
}

/// Locked iff the lock timestamp is strictly in the future.
pub fn is_storage_locked(host: &mut VmHost, key_offset: i32, key_length: i32) -> i32 {
    let timelock = get_storage_lock(host, key_offset, key_length);
    if timelock < 0 {
        return -1;
    }
    let current_timestamp = get_block_timestamp(host);
    (timelock > current_timestamp) as i32
}

pub fn clear_storage_lock(host: &mut VmHost, key_offset: i32, key_length: i32) -> i32 {
    set_storage_lock(host, key_offset, key_length, 0)
}

/// Legacy log entry: topics are fixed-width hashes.
pub fn write_log(
    host: &mut VmHost,
    data_pointer: i32,
    data_length: i32,
    topic_pointer: i32,
    num_topics: i32,
) {
    let base = host.gas_schedule().base_api_cost.log;
    let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
    let total_len = (data_length as u64)
        .saturating_add((num_topics as u64).saturating_mul(HASH_LEN as u64));
    host.use_gas(math::add_u64(base, math::mul_u64(per_byte, total_len)));

    let abort = host.runtime().base_api_error_should_fail_execution();
    if num_topics < 0 {
        host.fault(VMError::NegativeLength, abort);
        return;
    }
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_pointer, data_length), abort)
    else {
        return;
    };
    let Some(raw_topics) = host.fault_on_err(
        host.runtime()
            .mem_load(topic_pointer, num_topics.saturating_mul(HASH_LEN as i32)),
        abort,
    ) else {
        return;
    };
    let topics: Vec<Vec<u8>> = raw_topics.chunks(HASH_LEN).map(|c| c.to_vec()).collect();
    let address = host.runtime().sc_address();
    host.output_mut().write_log(address, topics, data);
}

/// Variable-length topics, the modern form.
pub fn write_event_log(
    host: &mut VmHost,
    num_topics: i32,
    topic_lengths_offset: i32,
    topic_offset: i32,
    data_offset: i32,
    data_length: i32,
) {
    let abort = host.runtime().base_api_error_should_fail_execution();
    let topics = match get_arguments_from_memory(host, num_topics, topic_lengths_offset, topic_offset)
    {
        Ok((topics, topic_bytes)) => {
            let base = host.gas_schedule().base_api_cost.log;
            let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
            let total = (data_length as u64).saturating_add(topic_bytes as u64);
            host.use_gas(math::add_u64(base, math::mul_u64(per_byte, total)));
            topics
        }
        Err(err) => {
            host.fault(err, abort);
            return;
        }
    };
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return;
    };
    let address = host.runtime().sc_address();
    host.output_mut().write_log(address, topics, data);
}

pub fn finish(host: &mut VmHost, pointer: i32, length: i32) {
    let base = host.gas_schedule().base_api_cost.finish;
    let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
    host.use_gas(math::add_u64(
        base,
        math::mul_u64(per_byte, length.max(0) as u64),
    ));

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(data) = host.fault_on_err(host.runtime().mem_load(pointer, length), abort) else {
        return;
    };
    host.output_mut().finish(data);
}

pub fn get_num_return_data(host: &mut VmHost) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_num_return_data;
    host.use_gas(cost);
    host.output().return_data().len() as i32
}

pub fn get_return_data_size(host: &mut VmHost, result_id: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_return_data_size;
    host.use_gas(cost);

    let return_data = host.output().return_data();
    if result_id < 0 || result_id as usize >= return_data.len() {
        return 0;
    }
    return_data[result_id as usize].len() as i32
}

pub fn get_return_data(host: &mut VmHost, result_id: i32, data_offset: i32) -> i32 {
    let cost = host.gas_schedule().base_api_cost.get_return_data;
    host.use_gas(cost);

    let return_data = host.output().return_data();
    if result_id < 0 || result_id as usize >= return_data.len() {
        return 0;
    }
    let data = return_data[result_id as usize].clone();
    let result = host.runtime().mem_store(data_offset, &data);
    let abort = host.runtime().base_api_error_should_fail_execution();
    if host.fault_on_err(result, abort).is_none() {
        return 0;
    }
    data.len() as i32
}

// ---------------------------------------------------------------------
// transfers & cross-contract calls
// ---------------------------------------------------------------------

/// Plain value transfer; call data naming a builtin function is refused.
pub fn transfer_value(
    host: &mut VmHost,
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    length: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.transfer_value;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let sender = host.runtime().sc_address();
    let Some(dest_bytes) = host.fault_on_err(
        host.runtime().mem_load(dest_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return 1;
    };
    let Ok(dest) = Address::from_slice(&dest_bytes) else {
        return 1;
    };
    let Some(value_bytes) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return 1;
    };

    let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
    host.use_gas(math::mul_u64(per_byte, length.max(0) as u64));

    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, length), abort) else {
        return 1;
    };

    if is_builtin_call(host, &data) {
        return 1;
    }

    let value = BigUint::from_bytes_be(&value_bytes);
    let result = host.transfer(dest, sender, 0, 0, &value, data, CallType::DirectCall);
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    0
}

fn is_builtin_call(host: &VmHost, data: &[u8]) -> bool {
    match call_args::parse_call_data(data) {
        Ok((function, _)) => host.is_builtin_function_name(&function),
        Err(_) => false,
    }
}

/// Value transfer with an optional follow-up execution: same-shard
/// contract targets execute on the destination context with the value
/// pre-applied, everything else becomes an outbound transfer with the
/// call serialized as `func@hexArg…`.
#[allow(clippy::too_many_arguments)]
pub fn transfer_value_execute(
    host: &mut VmHost,
    dest_offset: i32,
    value_offset: i32,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.transfer_value;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let extracted = extract_indirect_call_args(
        host,
        dest_offset,
        Some(value_offset),
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    transfer_value_execute_typed(
        host,
        call_args.dest,
        call_args.value,
        gas_limit,
        call_args.function,
        call_args.args,
    )
}

pub(crate) fn transfer_value_execute_typed(
    host: &mut VmHost,
    dest: Address,
    value: BigUint,
    gas_limit: i64,
    function: Vec<u8>,
    args: Vec<Vec<u8>>,
) -> i32 {
    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let sender = host.runtime().sc_address();

    let call_input = if !function.is_empty() {
        let prepared = prepare_indirect_contract_call_input(
            host,
            sender,
            value.clone(),
            gas_limit,
            dest,
            &function,
            args,
            false,
        );
        match host.fault_on_err(prepared, abort) {
            Some(input) => Some(input),
            None => return 1,
        }
    } else {
        None
    };

    if let Some(input) = &call_input {
        if host.is_builtin_function_name(&input.function) {
            return 1;
        }
    }

    if host.are_in_same_shard(&sender, &dest)
        && call_input.is_some()
        && host.blockchain().is_smart_contract(&dest)
    {
        tracing::trace!("pre-transfer execution begin");
        let (_, _, err) = host.execute_on_dest_context(call_input.unwrap_or_default());
        if err.is_some() {
            tracing::trace!("pre-transfer execution failed");
            return 1;
        }
        return 0;
    }

    let data = match &call_input {
        Some(input) => call_args::build_call_data(&input.function, &input.vm_input.arguments),
        None => Vec::new(),
    };
    let attached_gas = host.bound_gas_limit(gas_limit);
    let result = host.transfer(
        dest,
        sender,
        attached_gas,
        0,
        &value,
        data,
        CallType::DirectCall,
    );
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    host.use_gas(attached_gas);
    0
}

#[allow(clippy::too_many_arguments)]
pub fn transfer_esdt_execute(
    host: &mut VmHost,
    dest_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    value_offset: i32,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    transfer_esdt_nft_execute(
        host,
        dest_offset,
        token_id_offset,
        token_id_len,
        value_offset,
        0,
        gas_limit,
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn transfer_esdt_nft_execute(
    host: &mut VmHost,
    dest_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    value_offset: i32,
    token_nonce: i64,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.transfer_value;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let Some(token_id) = host.fault_on_err(
        host.runtime().mem_load(token_id_offset, token_id_len),
        abort,
    ) else {
        return 1;
    };
    let extracted = extract_indirect_call_args(
        host,
        dest_offset,
        Some(value_offset),
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    let transfer = EsdtTransfer {
        token_name: token_id,
        token_nonce: token_nonce.max(0) as u64,
        value: call_args.value,
        token_type: if token_nonce > 0 {
            EsdtTokenType::NonFungible
        } else {
            EsdtTokenType::Fungible
        },
    };
    transfer_esdt_nft_execute_typed(
        host,
        call_args.dest,
        vec![transfer],
        gas_limit,
        call_args.function,
        call_args.args,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn multi_transfer_esdt_nft_execute(
    host: &mut VmHost,
    dest_offset: i32,
    num_token_transfers: i32,
    token_transfers_args_offset: i32,
    token_transfer_lengths_offset: i32,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.transfer_value;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    if num_token_transfers <= 0 {
        host.fault(VMError::FailedTransfer, abort);
        return 1;
    }

    // each transfer is a (tokenID, nonceBytes, valueBytes) triple
    let raw = get_arguments_from_memory(
        host,
        num_token_transfers.saturating_mul(3),
        token_transfer_lengths_offset,
        token_transfers_args_offset,
    );
    let Some((fields, _)) = host.fault_on_err(raw, abort) else {
        return 1;
    };
    let mut transfers = Vec::with_capacity(num_token_transfers as usize);
    for triple in fields.chunks_exact(3) {
        let nonce_value = BigUint::from_bytes_be(&triple[1]);
        use num_traits::ToPrimitive;
        let token_nonce = nonce_value.to_u64().unwrap_or(0);
        transfers.push(EsdtTransfer {
            token_name: triple[0].clone(),
            token_nonce,
            value: BigUint::from_bytes_be(&triple[2]),
            token_type: if token_nonce > 0 {
                EsdtTokenType::NonFungible
            } else {
                EsdtTokenType::Fungible
            },
        });
    }

    let extracted = extract_indirect_call_args(
        host,
        dest_offset,
        None,
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    transfer_esdt_nft_execute_typed(
        host,
        call_args.dest,
        transfers,
        gas_limit,
        call_args.function,
        call_args.args,
    )
}

pub(crate) fn transfer_esdt_nft_execute_typed(
    host: &mut VmHost,
    dest: Address,
    transfers: Vec<EsdtTransfer>,
    gas_limit: i64,
    function: Vec<u8>,
    args: Vec<Vec<u8>>,
) -> i32 {
    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let sender = host.runtime().sc_address();
    let bounded_gas = host.bound_gas_limit(gas_limit);

    let transfer_result =
        host.execute_esdt_transfer(dest, sender, &transfers, bounded_gas, CallType::DirectCall);
    let Some((_, gas_for_execution)) = host.fault_on_err(transfer_result, abort) else {
        return 1;
    };

    if !function.is_empty()
        && host.are_in_same_shard(&sender, &dest)
        && host.blockchain().is_smart_contract(&dest)
    {
        let prepared = prepare_indirect_contract_call_input(
            host,
            sender,
            BigUint::default(),
            gas_for_execution as i64,
            dest,
            &function,
            args,
            true,
        );
        let Some(input) = host.fault_on_err(prepared, abort) else {
            return 1;
        };
        let (_, _, err) = host.execute_on_dest_context(input);
        if err.is_some() {
            return 1;
        }
    }
    0
}

#[allow(clippy::too_many_arguments)]
pub fn execute_on_same_context(
    host: &mut VmHost,
    gas_limit: i64,
    address_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.execute_on_same_context;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let extracted = extract_indirect_call_args(
        host,
        address_offset,
        Some(value_offset),
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    let sender = host.runtime().sc_address();
    let prepared = prepare_indirect_contract_call_input(
        host,
        sender,
        call_args.value,
        gas_limit,
        call_args.dest,
        &call_args.function,
        call_args.args,
        true,
    );
    let Some(input) = host.fault_on_err(prepared, abort) else {
        return 1;
    };
    if host.is_builtin_function_name(&input.function) {
        return 1;
    }

    let (_, err) = host.execute_on_same_context(input);
    match err {
        Some(err) => {
            host.fault(err, abort);
            1
        }
        None => 0,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn execute_on_dest_context(
    host: &mut VmHost,
    gas_limit: i64,
    address_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.execute_on_dest_context;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let extracted = extract_indirect_call_args(
        host,
        address_offset,
        Some(value_offset),
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    let sender = host.runtime().sc_address();
    let prepared = prepare_indirect_contract_call_input(
        host,
        sender,
        call_args.value,
        gas_limit,
        call_args.dest,
        &call_args.function,
        call_args.args,
        true,
    );
    let Some(input) = host.fault_on_err(prepared, abort) else {
        return 1;
    };

    let (_, _, err) = host.execute_on_dest_context(input);
    match err {
        Some(err) => {
            host.fault(err, abort);
            1
        }
        None => 0,
    }
}

/// Like execute-on-dest-context, but the callee sees the original caller
/// as its caller.
#[allow(clippy::too_many_arguments)]
pub fn execute_on_dest_context_by_caller(
    host: &mut VmHost,
    gas_limit: i64,
    address_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.execute_on_dest_context;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let extracted = extract_indirect_call_args(
        host,
        address_offset,
        Some(value_offset),
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    let sender = host.runtime().vm_input().caller_addr;
    let prepared = prepare_indirect_contract_call_input(
        host,
        sender,
        call_args.value,
        gas_limit,
        call_args.dest,
        &call_args.function,
        call_args.args,
        true,
    );
    let Some(input) = host.fault_on_err(prepared, abort) else {
        return 1;
    };
    if host.is_builtin_function_name(&input.function) {
        return 1;
    }

    let (_, _, err) = host.execute_on_dest_context(input);
    match err {
        Some(err) => {
            host.fault(err, abort);
            1
        }
        None => 0,
    }
}

/// Like execute-on-same-context, but the callee inherits the caller's own
/// call value.
#[allow(clippy::too_many_arguments)]
pub fn delegate_execution(
    host: &mut VmHost,
    gas_limit: i64,
    address_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.delegate_execution;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let extracted = extract_indirect_call_args(
        host,
        address_offset,
        None,
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    let sender = host.runtime().sc_address();
    let value = host.runtime().vm_input().call_value.clone();
    let prepared = prepare_indirect_contract_call_input(
        host,
        sender,
        value,
        gas_limit,
        call_args.dest,
        &call_args.function,
        call_args.args,
        true,
    );
    let Some(input) = host.fault_on_err(prepared, abort) else {
        return 1;
    };
    if host.is_builtin_function_name(&input.function) {
        return 1;
    }

    let (_, err) = host.execute_on_same_context(input);
    match err {
        Some(err) => {
            host.fault(err, abort);
            1
        }
        None => 0,
    }
}

/// Executes the callee with storage writes inhibited.
#[allow(clippy::too_many_arguments)]
pub fn execute_read_only(
    host: &mut VmHost,
    gas_limit: i64,
    address_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.execute_read_only;
    host.use_gas(cost);

    let abort = host.runtime().sync_exec_api_error_should_fail_execution();
    let extracted = extract_indirect_call_args(
        host,
        address_offset,
        None,
        function_offset,
        function_length,
        num_arguments,
        lengths_offset,
        data_offset,
    );
    let Some(call_args) = host.fault_on_err(extracted, abort) else {
        return 1;
    };

    let sender = host.runtime().sc_address();
    let value = host.runtime().vm_input().call_value.clone();
    let prepared = prepare_indirect_contract_call_input(
        host,
        sender,
        value,
        gas_limit,
        call_args.dest,
        &call_args.function,
        call_args.args,
        true,
    );
    let Some(input) = host.fault_on_err(prepared, abort) else {
        return 1;
    };
    if host.is_builtin_function_name(&input.function) {
        return 1;
    }

    host.runtime_mut().set_read_only(true);
    let (_, err) = host.execute_on_same_context(input);
    host.runtime_mut().set_read_only(false);
    match err {
        Some(err) => {
            host.fault(err, abort);
            1
        }
        None => 0,
    }
}

// ---------------------------------------------------------------------
// async calls
// ---------------------------------------------------------------------

pub fn async_call(
    host: &mut VmHost,
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    length: i32,
) {
    let step = host.gas_schedule().base_api_cost.async_call_step;
    host.use_gas(step);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(dest_bytes) = host.fault_on_err(
        host.runtime().mem_load(dest_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Ok(dest) = Address::from_slice(&dest_bytes) else {
        return;
    };
    let Some(value) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return;
    };

    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, length.max(0) as u64));

    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, length), abort) else {
        return;
    };

    match host.register_async_call(dest, data, value) {
        Ok(()) => {}
        Err(VMError::NotEnoughGas) => {
            host.runtime_mut()
                .set_runtime_breakpoint_value(BreakpointValue::OutOfGas);
        }
        Err(err) => host.fault(err, abort),
    }
}

/// Adds a call with custom callbacks to a named async context.
#[allow(clippy::too_many_arguments)]
pub fn create_async_call(
    host: &mut VmHost,
    context_identifier_offset: i32,
    identifier_length: i32,
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    data_length: i32,
    success_offset: i32,
    success_length: i32,
    error_offset: i32,
    error_length: i32,
    gas: i64,
) {
    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(identifier) = host.fault_on_err(
        host.runtime()
            .mem_load(context_identifier_offset, identifier_length),
        abort,
    ) else {
        return;
    };
    let Some(dest_bytes) = host.fault_on_err(
        host.runtime().mem_load(dest_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Ok(dest) = Address::from_slice(&dest_bytes) else {
        return;
    };
    let Some(value) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return;
    };
    let Some(success_callback) =
        host.fault_on_err(host.runtime().mem_load(success_offset, success_length), abort)
    else {
        return;
    };
    let Some(error_callback) =
        host.fault_on_err(host.runtime().mem_load(error_offset, error_length), abort)
    else {
        return;
    };

    host.runtime_mut().add_async_context_call(
        &identifier,
        AsyncGeneratedCall {
            destination: dest,
            data,
            value_bytes: value,
            success_callback: String::from_utf8_lossy(&success_callback).into_owned(),
            error_callback: String::from_utf8_lossy(&error_callback).into_owned(),
            provided_gas: gas.max(0) as u64,
            ..Default::default()
        },
    );
}

/// Registers a context-wide completion callback.
pub fn set_async_context_callback(
    host: &mut VmHost,
    context_identifier_offset: i32,
    identifier_length: i32,
    callback_offset: i32,
    callback_length: i32,
) -> i32 {
    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(identifier) = host.fault_on_err(
        host.runtime()
            .mem_load(context_identifier_offset, identifier_length),
        abort,
    ) else {
        return -1;
    };
    let Some(callback) = host.fault_on_err(
        host.runtime().mem_load(callback_offset, callback_length),
        abort,
    ) else {
        return -1;
    };

    let updated = match host.runtime_mut().get_async_context(&identifier) {
        Ok(context) => {
            context.callback = String::from_utf8_lossy(&callback).into_owned();
            Ok(())
        }
        Err(err) => Err(err),
    };
    match updated {
        Ok(()) => 0,
        Err(err) => {
            host.fault(err, abort);
            -1
        }
    }
}

// ---------------------------------------------------------------------
// contract creation & upgrade
// ---------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
pub fn create_contract(
    host: &mut VmHost,
    gas_limit: i64,
    value_offset: i32,
    code_offset: i32,
    code_metadata_offset: i32,
    length: i32,
    result_offset: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.create_contract;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let sender = host.runtime().sc_address();
    let Some(value_bytes) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return 1;
    };
    let Some(code) = host.fault_on_err(host.runtime().mem_load(code_offset, length), abort) else {
        return 1;
    };
    let Some(code_metadata) = host.fault_on_err(
        host.runtime()
            .mem_load(code_metadata_offset, CODE_METADATA_LEN as i32),
        abort,
    ) else {
        return 1;
    };
    let arguments = get_arguments_from_memory(host, num_arguments, lengths_offset, data_offset);
    let Some((arguments, actual_len)) = host.fault_on_err(arguments, abort) else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, actual_len as u64));

    let create_input = ContractCreateInput {
        vm_input: warx_common::VMInput {
            caller_addr: sender,
            arguments,
            call_value: BigUint::from_bytes_be(&value_bytes),
            gas_provided: host.bound_gas_limit(gas_limit),
            original_tx_hash: host.runtime().original_tx_hash().to_vec(),
            current_tx_hash: host.runtime().current_tx_hash().to_vec(),
            ..Default::default()
        },
        contract_code: code,
        contract_code_metadata: code_metadata,
    };

    let new_address = match host.create_new_contract(&create_input) {
        Ok(address) => address,
        Err(_) => return 1,
    };
    let result = host.runtime().mem_store(result_offset, new_address.as_bytes());
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    0
}

/// Deploys a contract whose code is read from an already-deployed source
/// contract.
#[allow(clippy::too_many_arguments)]
pub fn deploy_from_source_contract(
    host: &mut VmHost,
    gas_limit: i64,
    value_offset: i32,
    source_address_offset: i32,
    code_metadata_offset: i32,
    result_address_offset: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.create_contract;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let sender = host.runtime().sc_address();
    let Some(value_bytes) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return 1;
    };
    let Some(source_bytes) = host.fault_on_err(
        host.runtime()
            .mem_load(source_address_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return 1;
    };
    let Ok(source_address) = Address::from_slice(&source_bytes) else {
        return 1;
    };
    let Some(code_metadata) = host.fault_on_err(
        host.runtime()
            .mem_load(code_metadata_offset, CODE_METADATA_LEN as i32),
        abort,
    ) else {
        return 1;
    };
    let arguments = get_arguments_from_memory(host, num_arguments, lengths_offset, data_offset);
    let Some((arguments, actual_len)) = host.fault_on_err(arguments, abort) else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, actual_len as u64));

    let Some(code) = host.fault_on_err(host.blockchain().get_code(&source_address), abort) else {
        return 1;
    };

    let create_input = ContractCreateInput {
        vm_input: warx_common::VMInput {
            caller_addr: sender,
            arguments,
            call_value: BigUint::from_bytes_be(&value_bytes),
            gas_provided: host.bound_gas_limit(gas_limit),
            original_tx_hash: host.runtime().original_tx_hash().to_vec(),
            current_tx_hash: host.runtime().current_tx_hash().to_vec(),
            ..Default::default()
        },
        contract_code: code,
        contract_code_metadata: code_metadata,
    };

    let new_address = match host.create_new_contract(&create_input) {
        Ok(address) => address,
        Err(_) => return 1,
    };
    let result = host
        .runtime()
        .mem_store(result_address_offset, new_address.as_bytes());
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    0
}

/// Encodes an upgrade as an asynchronous call to the reserved upgrade
/// entry point, with code and metadata hex-encoded in the call data.
#[allow(clippy::too_many_arguments)]
pub fn upgrade_contract(
    host: &mut VmHost,
    dest_offset: i32,
    gas_limit: i64,
    value_offset: i32,
    code_offset: i32,
    code_metadata_offset: i32,
    length: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) {
    let cost = host.gas_schedule().base_api_cost.create_contract;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(value) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Some(code) = host.fault_on_err(host.runtime().mem_load(code_offset, length), abort) else {
        return;
    };
    let Some(code_metadata) = host.fault_on_err(
        host.runtime()
            .mem_load(code_metadata_offset, CODE_METADATA_LEN as i32),
        abort,
    ) else {
        return;
    };
    let arguments = get_arguments_from_memory(host, num_arguments, lengths_offset, data_offset);
    let Some((arguments, actual_len)) = host.fault_on_err(arguments, abort) else {
        return;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, actual_len as u64));

    let Some(dest_bytes) = host.fault_on_err(
        host.runtime().mem_load(dest_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Ok(dest) = Address::from_slice(&dest_bytes) else {
        return;
    };

    host.use_gas(math::mul_u64(per_byte, length.max(0) as u64));
    upgrade_contract_typed(host, dest, code, code_metadata, value, arguments, gas_limit);
}

#[allow(clippy::too_many_arguments)]
pub fn upgrade_from_source_contract(
    host: &mut VmHost,
    dest_offset: i32,
    gas_limit: i64,
    value_offset: i32,
    source_address_offset: i32,
    code_metadata_offset: i32,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) {
    let cost = host.gas_schedule().base_api_cost.create_contract;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(value) = host.fault_on_err(
        host.runtime().mem_load(value_offset, BALANCE_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Some(source_bytes) = host.fault_on_err(
        host.runtime()
            .mem_load(source_address_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Ok(source_address) = Address::from_slice(&source_bytes) else {
        return;
    };
    let Some(code_metadata) = host.fault_on_err(
        host.runtime()
            .mem_load(code_metadata_offset, CODE_METADATA_LEN as i32),
        abort,
    ) else {
        return;
    };
    let arguments = get_arguments_from_memory(host, num_arguments, lengths_offset, data_offset);
    let Some((arguments, actual_len)) = host.fault_on_err(arguments, abort) else {
        return;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, actual_len as u64));

    let Some(dest_bytes) = host.fault_on_err(
        host.runtime().mem_load(dest_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Ok(dest) = Address::from_slice(&dest_bytes) else {
        return;
    };

    let Some(code) = host.fault_on_err(host.blockchain().get_code(&source_address), abort) else {
        return;
    };
    upgrade_contract_typed(host, dest, code, code_metadata, value, arguments, gas_limit);
}

fn upgrade_contract_typed(
    host: &mut VmHost,
    dest: Address,
    code: Vec<u8>,
    code_metadata: Vec<u8>,
    value: Vec<u8>,
    arguments: Vec<Vec<u8>>,
    gas_limit: i64,
) {
    let schedule = host.gas_schedule();
    let min_async_call_cost = math::add_u64(
        math::mul_u64(2, schedule.base_api_cost.async_call_step),
        schedule.base_api_cost.async_callback_gas_lock,
    );
    if (gas_limit.max(0) as u64) < min_async_call_cost {
        host.runtime_mut()
            .set_runtime_breakpoint_value(BreakpointValue::OutOfGas);
        return;
    }

    // resolved like any other async call once the breakpoint unwinds
    let mut call_data = format!("{UPGRADE_FUNCTION_NAME}@{}@{}", hex::encode(&code), hex::encode(&code_metadata));
    for argument in &arguments {
        call_data.push('@');
        call_data.push_str(&hex::encode(argument));
    }

    let result = host.register_async_call(dest, call_data.into_bytes(), value);
    if let Err(err) = result {
        tracing::trace!(error = %err, "upgradeContract");
        if err == VMError::NotEnoughGas {
            host.runtime_mut()
                .set_runtime_breakpoint_value(BreakpointValue::OutOfGas);
        }
    }
}

fn left_pad_balance(value: &[u8]) -> Vec<u8> {
    let mut padded = vec![0u8; BALANCE_LEN.saturating_sub(value.len())];
    padded.extend_from_slice(value);
    padded
}
