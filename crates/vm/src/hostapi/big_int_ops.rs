//! Arbitrary-precision integer surface. Values live in the managed-types
//! handle table; guests only move handles.
//!
//! Division follows the two classic conventions side by side: `tDiv`/`tMod`
//! truncate toward zero, `eDiv`/`eMod` are Euclidean (non-negative
//! remainder). Bitwise operations require non-negative operands.

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use warx_common::math;
use warx_common::{twos, ADDRESS_LEN};

use crate::contexts::managed_types::{Handle, MAX_BIG_INT_BYTE_LEN_FOR_NORMAL_COST};
use crate::errors::VMError;
use crate::host::VmHost;
use warx_common::Address;

/// Copying big values costs gas in proportion to their size; values up to
/// 32 bytes copy for free.
fn consume_gas_for_big_int_copy(host: &mut VmHost, values: &[&BigInt]) {
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    for value in values {
        let byte_len = (value.bits() / 8) as usize;
        if byte_len > MAX_BIG_INT_BYTE_LEN_FOR_NORMAL_COST {
            host.use_gas(math::mul_u64(byte_len as u64, per_byte));
        }
    }
}

fn consume_gas_for_big_int_result_bytes(host: &mut VmHost, byte_len: &BigInt) {
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    let projected = byte_len * BigInt::from(per_byte);
    let gas = if projected.is_negative() {
        0
    } else {
        projected.to_u64().unwrap_or(u64::MAX)
    };
    host.use_gas(gas);
}

pub fn big_int_new(host: &mut VmHost, small_value: i64) -> Handle {
    let cost = host.gas_schedule().big_int_api_cost.big_int_new;
    host.use_gas(cost);
    host.managed_types_mut().put_big_int(small_value)
}

pub fn big_int_get_unsigned_argument(host: &mut VmHost, id: i32, destination_handle: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_argument;
    host.use_gas(cost);

    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        return;
    }
    let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&args[id as usize]));
    host.managed_types_mut().set_big_int(destination_handle, value);
}

pub fn big_int_get_signed_argument(host: &mut VmHost, id: i32, destination_handle: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_argument;
    host.use_gas(cost);

    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        return;
    }
    let value = twos::set_bytes(&args[id as usize]);
    host.managed_types_mut().set_big_int(destination_handle, value);
}

pub fn big_int_storage_store_unsigned(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    source_handle: Handle,
) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_storage_store;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let value = host.managed_types_mut().big_int_or_create(source_handle).clone();
    let bytes = value.magnitude().to_bytes_be();
    let bytes = if value.is_zero() { Vec::new() } else { bytes };
    let stored = host.storage_store(&key, &bytes);
    match host.fault_on_err(stored, abort) {
        Some(status) => status as i32,
        None => -1,
    }
}

pub fn big_int_storage_load_unsigned(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    destination_handle: Handle,
) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_storage_load;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let data = host.storage_load(&key);
    let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&data));
    host.managed_types_mut().set_big_int(destination_handle, value);
    data.len() as i32
}

pub fn big_int_get_call_value(host: &mut VmHost, destination_handle: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_call_value;
    host.use_gas(cost);

    let value = host.runtime().vm_input().call_value.clone();
    host.managed_types_mut()
        .set_big_int(destination_handle, BigInt::from_biguint(Sign::Plus, value));
}

pub fn big_int_get_esdt_call_value(host: &mut VmHost, destination_handle: Handle) {
    if super::fail_if_more_than_one_esdt_transfer(host) {
        return;
    }
    big_int_get_esdt_call_value_by_index(host, destination_handle, 0)
}

pub fn big_int_get_esdt_call_value_by_index(
    host: &mut VmHost,
    destination_handle: Handle,
    index: i32,
) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_call_value;
    host.use_gas(cost);

    let value = match super::esdt_transfer_from_input(host.runtime().vm_input(), index) {
        Some(transfer) => transfer.value.clone(),
        None => BigUint::default(),
    };
    host.managed_types_mut()
        .set_big_int(destination_handle, BigInt::from_biguint(Sign::Plus, value));
}

pub fn big_int_get_external_balance(host: &mut VmHost, address_offset: i32, result_handle: Handle) {
    let cost = host
        .gas_schedule()
        .big_int_api_cost
        .big_int_get_external_balance;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let Some(address_bytes) = host.fault_on_err(
        host.runtime().mem_load(address_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Ok(address) = Address::from_slice(&address_bytes) else {
        return;
    };
    let balance = host.blockchain().get_balance(&address);
    host.managed_types_mut()
        .set_big_int(result_handle, BigInt::from_biguint(Sign::Plus, balance));
}

pub fn big_int_get_esdt_external_balance(
    host: &mut VmHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
    result_handle: Handle,
) {
    let cost = host
        .gas_schedule()
        .big_int_api_cost
        .big_int_get_external_balance;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let Some(address_bytes) = host.fault_on_err(
        host.runtime().mem_load(address_offset, ADDRESS_LEN as i32),
        abort,
    ) else {
        return;
    };
    let Some(token_id) = host.fault_on_err(
        host.runtime().mem_load(token_id_offset, token_id_len),
        abort,
    ) else {
        return;
    };
    let Ok(address) = Address::from_slice(&address_bytes) else {
        return;
    };
    let token = host
        .blockchain()
        .hook()
        .get_esdt_token(&address, &token_id, nonce.max(0) as u64);
    let Some(token) = host.fault_on_err(token, abort) else {
        return;
    };
    host.managed_types_mut().set_big_int(
        result_handle,
        BigInt::from_biguint(Sign::Plus, token.value),
    );
}

pub fn big_int_unsigned_byte_length(host: &mut VmHost, reference_handle: Handle) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_byte_length;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(reference_handle).cloned();
    match host.fault_on_err(value, abort) {
        Some(value) if value.is_zero() => 0,
        Some(value) => value.magnitude().to_bytes_be().len() as i32,
        None => -1,
    }
}

pub fn big_int_signed_byte_length(host: &mut VmHost, reference_handle: Handle) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_byte_length;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(reference_handle).cloned();
    match host.fault_on_err(value, abort) {
        Some(value) => twos::to_bytes(&value).len() as i32,
        None => 0,
    }
}

pub fn big_int_get_unsigned_bytes(
    host: &mut VmHost,
    reference_handle: Handle,
    byte_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_bytes;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(reference_handle).cloned();
    let Some(value) = host.fault_on_err(value, abort) else {
        return -1;
    };
    let bytes = if value.is_zero() {
        Vec::new()
    } else {
        value.magnitude().to_bytes_be()
    };
    let result = host.runtime().mem_store(byte_offset, &bytes);
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
    bytes.len() as i32
}

pub fn big_int_get_signed_bytes(
    host: &mut VmHost,
    reference_handle: Handle,
    byte_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_bytes;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(reference_handle).cloned();
    let Some(value) = host.fault_on_err(value, abort) else {
        return -1;
    };
    let bytes = twos::to_bytes(&value);
    let result = host.runtime().mem_store(byte_offset, &bytes);
    if host.fault_on_err(result, abort).is_none() {
        return -1;
    }
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
    bytes.len() as i32
}

pub fn big_int_set_unsigned_bytes(
    host: &mut VmHost,
    destination_handle: Handle,
    byte_offset: i32,
    byte_length: i32,
) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_set_bytes;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let Some(bytes) = host.fault_on_err(host.runtime().mem_load(byte_offset, byte_length), abort)
    else {
        return;
    };
    let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&bytes));
    host.managed_types_mut().set_big_int(destination_handle, value);

    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
}

pub fn big_int_set_signed_bytes(
    host: &mut VmHost,
    destination_handle: Handle,
    byte_offset: i32,
    byte_length: i32,
) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_set_bytes;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let Some(bytes) = host.fault_on_err(host.runtime().mem_load(byte_offset, byte_length), abort)
    else {
        return;
    };
    let value = twos::set_bytes(&bytes);
    host.managed_types_mut().set_big_int(destination_handle, value);

    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
}

pub fn big_int_is_int64(host: &mut VmHost, handle: Handle) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_is_int64;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(handle).cloned();
    match host.fault_on_err(value, abort) {
        Some(value) => value.to_i64().is_some() as i32,
        None => -1,
    }
}

pub fn big_int_get_int64(host: &mut VmHost, handle: Handle) -> i64 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_int64;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(handle).cloned();
    match host.fault_on_err(value, abort) {
        Some(value) => value.to_i64().unwrap_or_default(),
        None => 0,
    }
}

pub fn big_int_get_or_create_int64(host: &mut VmHost, handle: Handle) -> i64 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_get_int64;
    host.use_gas(cost);
    host.managed_types_mut()
        .big_int_or_create(handle)
        .to_i64()
        .unwrap_or_default()
}

pub fn big_int_set_int64(host: &mut VmHost, destination_handle: Handle, value: i64) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_set_int64;
    host.use_gas(cost);
    host.managed_types_mut()
        .set_big_int(destination_handle, BigInt::from(value));
}

fn binary_op(
    host: &mut VmHost,
    cost: u64,
    destination_handle: Handle,
    op1_handle: Handle,
    op2_handle: Handle,
    op: impl FnOnce(&BigInt, &BigInt) -> Result<BigInt, VMError>,
) {
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let operands = host.managed_types().get_two_big_ints(op1_handle, op2_handle);
    let Some((a, b)) = host.fault_on_err(operands, abort) else {
        return;
    };
    consume_gas_for_big_int_copy(host, &[&a, &b]);
    match op(&a, &b) {
        Ok(result) => host.managed_types_mut().set_big_int(destination_handle, result),
        Err(err) => host.fault(err, abort),
    }
}

fn unary_op(
    host: &mut VmHost,
    cost: u64,
    destination_handle: Handle,
    op_handle: Handle,
    op: impl FnOnce(&BigInt) -> Result<BigInt, VMError>,
) {
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let operand = host.managed_types().get_big_int(op_handle).cloned();
    let Some(a) = host.fault_on_err(operand, abort) else {
        return;
    };
    consume_gas_for_big_int_copy(host, &[&a]);
    match op(&a) {
        Ok(result) => host.managed_types_mut().set_big_int(destination_handle, result),
        Err(err) => host.fault(err, abort),
    }
}

pub fn big_int_add(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_add;
    binary_op(host, cost, dest, op1, op2, |a, b| Ok(a + b));
}

pub fn big_int_sub(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_sub;
    binary_op(host, cost, dest, op1, op2, |a, b| Ok(a - b));
}

pub fn big_int_mul(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_mul;
    binary_op(host, cost, dest, op1, op2, |a, b| Ok(a * b));
}

/// Truncated division (toward zero).
pub fn big_int_t_div(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_t_div;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if b.is_zero() {
            return Err(VMError::DivZero);
        }
        Ok(a / b)
    });
}

/// Truncated remainder: the sign follows the dividend.
pub fn big_int_t_mod(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_t_mod;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if b.is_zero() {
            return Err(VMError::DivZero);
        }
        Ok(a % b)
    });
}

/// Euclidean division: the remainder is always non-negative.
pub fn big_int_e_div(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_e_div;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if b.is_zero() {
            return Err(VMError::DivZero);
        }
        let (mut quotient, remainder) = a.div_rem(b);
        if remainder.is_negative() {
            if b.is_positive() {
                quotient -= 1;
            } else {
                quotient += 1;
            }
        }
        Ok(quotient)
    });
}

/// Euclidean remainder, in `[0, |b|)`.
pub fn big_int_e_mod(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_e_mod;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if b.is_zero() {
            return Err(VMError::DivZero);
        }
        let mut remainder = a % b;
        if remainder.is_negative() {
            remainder += b.abs();
        }
        Ok(remainder)
    });
}

pub fn big_int_sqrt(host: &mut VmHost, dest: Handle, op: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_sqrt;
    unary_op(host, cost, dest, op, |a| {
        if a.is_negative() {
            return Err(VMError::BadLowerBounds);
        }
        Ok(a.sqrt())
    });
}

pub fn big_int_pow(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_pow;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let operands = host.managed_types().get_two_big_ints(op1, op2);
    let Some((a, b)) = host.fault_on_err(operands, abort) else {
        return;
    };

    // projected result length in bytes, charged before computing
    let result_byte_len = (&b * BigInt::from(a.bits())) / BigInt::from(8);
    consume_gas_for_big_int_result_bytes(host, &result_byte_len);
    consume_gas_for_big_int_copy(host, &[&a, &b]);

    if b.is_negative() {
        host.fault(VMError::BadLowerBounds, abort);
        return;
    }
    let exponent = match b.to_u32() {
        Some(exponent) => exponent,
        None => {
            host.fault(VMError::BadLowerBounds, abort);
            return;
        }
    };
    host.managed_types_mut().set_big_int(dest, a.pow(exponent));
}

/// Floor of the base-2 logarithm; -1 is unreachable for valid operands
/// because log2 of zero reports bad bounds.
pub fn big_int_log2(host: &mut VmHost, op_handle: Handle) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_log;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(op_handle).cloned();
    let Some(a) = host.fault_on_err(value, abort) else {
        return -1;
    };
    consume_gas_for_big_int_copy(host, &[&a]);
    if a.is_negative() {
        host.fault(VMError::BadLowerBounds, abort);
        return -1;
    }
    a.bits() as i32 - 1
}

pub fn big_int_abs(host: &mut VmHost, dest: Handle, op: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_abs;
    unary_op(host, cost, dest, op, |a| Ok(a.abs()));
}

pub fn big_int_neg(host: &mut VmHost, dest: Handle, op: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_neg;
    unary_op(host, cost, dest, op, |a| Ok(-a));
}

pub fn big_int_sign(host: &mut VmHost, op_handle: Handle) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_sign;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(op_handle).cloned();
    match host.fault_on_err(value, abort) {
        Some(value) => match value.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        },
        None => -2,
    }
}

pub fn big_int_cmp(host: &mut VmHost, op1_handle: Handle, op2_handle: Handle) -> i32 {
    let cost = host.gas_schedule().big_int_api_cost.big_int_cmp;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let operands = host.managed_types().get_two_big_ints(op1_handle, op2_handle);
    let Some((a, b)) = host.fault_on_err(operands, abort) else {
        return -2;
    };
    consume_gas_for_big_int_copy(host, &[&a, &b]);
    match a.cmp(&b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

pub fn big_int_not(host: &mut VmHost, dest: Handle, op: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_not;
    unary_op(host, cost, dest, op, |a| {
        if a.is_negative() {
            return Err(VMError::BitwiseNegative);
        }
        Ok(!a)
    });
}

pub fn big_int_and(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_and;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if a.is_negative() || b.is_negative() {
            return Err(VMError::BitwiseNegative);
        }
        Ok(a & b)
    });
}

pub fn big_int_or(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_or;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if a.is_negative() || b.is_negative() {
            return Err(VMError::BitwiseNegative);
        }
        Ok(a | b)
    });
}

pub fn big_int_xor(host: &mut VmHost, dest: Handle, op1: Handle, op2: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_xor;
    binary_op(host, cost, dest, op1, op2, |a, b| {
        if a.is_negative() || b.is_negative() {
            return Err(VMError::BitwiseNegative);
        }
        Ok(a ^ b)
    });
}

pub fn big_int_shr(host: &mut VmHost, dest: Handle, op_handle: Handle, bits: i32) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_shr;
    unary_op(host, cost, dest, op_handle, |a| {
        if a.is_negative() || bits < 0 {
            return Err(VMError::ShiftNegative);
        }
        Ok(a >> (bits as usize))
    });
}

pub fn big_int_shl(host: &mut VmHost, dest: Handle, op_handle: Handle, bits: i32) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_shl;
    unary_op(host, cost, dest, op_handle, |a| {
        if a.is_negative() || bits < 0 {
            return Err(VMError::ShiftNegative);
        }
        Ok(a << (bits as usize))
    });
}

pub fn big_int_finish_unsigned(host: &mut VmHost, reference_handle: Handle) {
    let cost = host
        .gas_schedule()
        .big_int_api_cost
        .big_int_finish_unsigned;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(reference_handle).cloned();
    let Some(value) = host.fault_on_err(value, abort) else {
        return;
    };
    let bytes = if value.is_zero() {
        Vec::new()
    } else {
        value.magnitude().to_bytes_be()
    };
    let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
    host.output_mut().finish(bytes);
}

pub fn big_int_finish_signed(host: &mut VmHost, reference_handle: Handle) {
    let cost = host.gas_schedule().big_int_api_cost.big_int_finish_signed;
    host.use_gas(cost);

    let abort = host.runtime().big_int_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(reference_handle).cloned();
    let Some(value) = host.fault_on_err(value, abort) else {
        return;
    };
    let bytes = twos::to_bytes(&value);
    let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
    host.output_mut().finish(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn host_with_frame() -> VmHost {
        let mut world = MockWorld::new();
        world.create_account(test_address(b"contract"), 0);
        let mut host = world.new_host();
        start_direct_frame(&mut host, test_address(b"contract"), 10_000_000);
        host
    }

    #[test]
    fn truncated_and_euclidean_division_identities() {
        let mut host = host_with_frame();
        for (a, b) in [(7i64, 3i64), (-7, 3), (7, -3), (-7, -3)] {
            let ha = big_int_new(&mut host, a);
            let hb = big_int_new(&mut host, b);
            let hq = big_int_new(&mut host, 0);
            let hr = big_int_new(&mut host, 0);
            big_int_t_div(&mut host, hq, ha, hb);
            big_int_t_mod(&mut host, hr, ha, hb);
            let q = big_int_get_int64(&mut host, hq);
            let r = big_int_get_int64(&mut host, hr);
            assert_eq!(q * b + r, a, "truncated identity for {a}/{b}");
            assert!(r == 0 || (r < 0) == (a < 0), "truncated sign for {a}/{b}");

            let heq = big_int_new(&mut host, 0);
            let her = big_int_new(&mut host, 0);
            big_int_e_div(&mut host, heq, ha, hb);
            big_int_e_mod(&mut host, her, ha, hb);
            let eq = big_int_get_int64(&mut host, heq);
            let er = big_int_get_int64(&mut host, her);
            assert_eq!(eq * b + er, a, "euclidean identity for {a}/{b}");
            assert!(er >= 0, "euclidean remainder for {a}/{b}");
        }
    }

    #[test]
    fn division_by_zero_aborts() {
        let mut host = host_with_frame();
        let ha = big_int_new(&mut host, 1);
        let hb = big_int_new(&mut host, 0);
        let hq = big_int_new(&mut host, 0);
        big_int_t_div(&mut host, hq, ha, hb);
        assert!(host.runtime_errors().contains(&VMError::DivZero));
    }

    #[test]
    fn bitwise_on_negative_aborts() {
        let mut host = host_with_frame();
        let ha = big_int_new(&mut host, -1);
        let hb = big_int_new(&mut host, 1);
        let hd = big_int_new(&mut host, 0);
        big_int_and(&mut host, hd, ha, hb);
        assert!(host.runtime_errors().contains(&VMError::BitwiseNegative));

        big_int_shl(&mut host, hd, hb, -1);
        assert!(host.runtime_errors().contains(&VMError::ShiftNegative));
    }

    #[test]
    fn signed_bytes_round_trip() {
        let mut host = host_with_frame();
        let handle = big_int_new(&mut host, -129);
        let len = big_int_get_signed_bytes(&mut host, handle, 64);
        assert_eq!(len, 2);

        let dest = big_int_new(&mut host, 0);
        big_int_set_signed_bytes(&mut host, dest, 64, len);
        assert_eq!(big_int_get_int64(&mut host, dest), -129);
    }

    #[test]
    fn sqrt_of_negative_reports_bad_bounds() {
        let mut host = host_with_frame();
        let ha = big_int_new(&mut host, -4);
        let hd = big_int_new(&mut host, 0);
        big_int_sqrt(&mut host, hd, ha);
        assert!(host.runtime_errors().contains(&VMError::BadLowerBounds));
    }
}
