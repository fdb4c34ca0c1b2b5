//! Small-integer (int64) argument, finish and storage operations, with
//! range checks on everything loaded back into 64 bits.

use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;
use warx_common::twos;

use crate::errors::VMError;
use crate::host::VmHost;

pub fn small_int_get_unsigned_argument(host: &mut VmHost, id: i32) -> i64 {
    let cost = host.gas_schedule().base_api_cost.int64_get_argument;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        host.fault(VMError::ArgIndexOutOfRange, abort);
        return 0;
    }
    let value = BigUint::from_bytes_be(&args[id as usize]);
    match value.to_u64() {
        Some(value) => value as i64,
        None => {
            host.fault(VMError::ArgOutOfRange, abort);
            0
        }
    }
}

pub fn small_int_get_signed_argument(host: &mut VmHost, id: i32) -> i64 {
    let cost = host.gas_schedule().base_api_cost.int64_get_argument;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        host.fault(VMError::ArgIndexOutOfRange, abort);
        return 0;
    }
    let value = twos::set_bytes(&args[id as usize]);
    match value.to_i64() {
        Some(value) => value,
        None => {
            host.fault(VMError::ArgOutOfRange, abort);
            0
        }
    }
}

pub fn small_int_finish_unsigned(host: &mut VmHost, value: i64) {
    let cost = host.gas_schedule().base_api_cost.int64_finish;
    host.use_gas(cost);

    let bytes = BigUint::from(value as u64).to_bytes_be();
    let bytes = if value == 0 { Vec::new() } else { bytes };
    host.output_mut().finish(bytes);
}

pub fn small_int_finish_signed(host: &mut VmHost, value: i64) {
    let cost = host.gas_schedule().base_api_cost.int64_finish;
    host.use_gas(cost);

    let bytes = twos::to_bytes(&BigInt::from(value));
    host.output_mut().finish(bytes);
}

pub fn small_int_storage_store_unsigned(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    value: i64,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.int64_storage_store;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let bytes = if value == 0 {
        Vec::new()
    } else {
        BigUint::from(value as u64).to_bytes_be()
    };
    let stored = host.storage_store(&key, &bytes);
    match host.fault_on_err(stored, abort) {
        Some(status) => status as i32,
        None => -1,
    }
}

pub fn small_int_storage_store_signed(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    value: i64,
) -> i32 {
    let cost = host.gas_schedule().base_api_cost.int64_storage_store;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let bytes = twos::to_bytes(&BigInt::from(value));
    let stored = host.storage_store(&key, &bytes);
    match host.fault_on_err(stored, abort) {
        Some(status) => status as i32,
        None => -1,
    }
}

pub fn small_int_storage_load_unsigned(host: &mut VmHost, key_offset: i32, key_length: i32) -> i64 {
    let cost = host.gas_schedule().base_api_cost.int64_storage_load;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return 0;
    };
    let data = host.storage_load(&key);
    let value = BigUint::from_bytes_be(&data);
    match value.to_u64() {
        Some(value) => value as i64,
        None => {
            host.fault(VMError::StorageValueOutOfRange, abort);
            0
        }
    }
}

pub fn small_int_storage_load_signed(host: &mut VmHost, key_offset: i32, key_length: i32) -> i64 {
    let cost = host.gas_schedule().base_api_cost.int64_storage_load;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return 0;
    };
    let data = host.storage_load(&key);
    let value = twos::set_bytes(&data);
    match value.to_i64() {
        Some(value) => value,
        None => {
            host.fault(VMError::StorageValueOutOfRange, abort);
            0
        }
    }
}

// legacy aliases

pub fn int64_get_argument(host: &mut VmHost, id: i32) -> i64 {
    small_int_get_signed_argument(host, id)
}

pub fn int64_finish(host: &mut VmHost, value: i64) {
    small_int_finish_signed(host, value)
}

pub fn int64_storage_store(host: &mut VmHost, key_offset: i32, key_length: i32, value: i64) -> i32 {
    small_int_storage_store_unsigned(host, key_offset, key_length, value)
}

pub fn int64_storage_load(host: &mut VmHost, key_offset: i32, key_length: i32) -> i64 {
    small_int_storage_load_unsigned(host, key_offset, key_length)
}
