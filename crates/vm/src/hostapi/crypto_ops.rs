//! Hashes, signature verification and elliptic-curve arithmetic. The
//! primitives themselves live behind the crypto hook; this layer handles
//! memory traffic, gas and the curve-dependent cost multipliers.

use num_bigint::BigInt;
use warx_common::math;

use crate::contexts::managed_types::{EllipticCurveParams, Handle};
use crate::errors::VMError;
use crate::host::VmHost;

const BLS_PUBLIC_KEY_LENGTH: i32 = 96;
const BLS_SIGNATURE_LENGTH: i32 = 48;
const ED25519_PUBLIC_KEY_LENGTH: i32 = 32;
const ED25519_SIGNATURE_LENGTH: i32 = 64;
const SECP256K1_COMPRESSED_KEY_LENGTH: i32 = 33;
const SECP256K1_UNCOMPRESSED_KEY_LENGTH: i32 = 65;

pub fn sha256(host: &mut VmHost, data_offset: i32, length: i32, result_offset: i32) -> i32 {
    let copy_gas = math::mul_u64(
        host.gas_schedule().base_operation_cost.data_copy_per_byte,
        length.max(0) as u64,
    );
    let cost = math::add_u64(host.gas_schedule().crypto_api_cost.sha256, copy_gas);
    host.use_gas(cost);

    hash_op(host, data_offset, length, result_offset, |crypto, data| {
        crypto.sha256(data)
    })
}

pub fn keccak256(host: &mut VmHost, data_offset: i32, length: i32, result_offset: i32) -> i32 {
    let copy_gas = math::mul_u64(
        host.gas_schedule().base_operation_cost.data_copy_per_byte,
        length.max(0) as u64,
    );
    let cost = math::add_u64(host.gas_schedule().crypto_api_cost.keccak256, copy_gas);
    host.use_gas(cost);

    hash_op(host, data_offset, length, result_offset, |crypto, data| {
        crypto.keccak256(data)
    })
}

pub fn ripemd160(host: &mut VmHost, data_offset: i32, length: i32, result_offset: i32) -> i32 {
    let copy_gas = math::mul_u64(
        host.gas_schedule().base_operation_cost.data_copy_per_byte,
        length.max(0) as u64,
    );
    let cost = math::add_u64(host.gas_schedule().crypto_api_cost.ripemd160, copy_gas);
    host.use_gas(cost);

    hash_op(host, data_offset, length, result_offset, |crypto, data| {
        crypto.ripemd160(data)
    })
}

fn hash_op(
    host: &mut VmHost,
    data_offset: i32,
    length: i32,
    result_offset: i32,
    op: impl FnOnce(&dyn crate::hooks::VMCrypto, &[u8]) -> Result<Vec<u8>, VMError>,
) -> i32 {
    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, length), abort) else {
        return 1;
    };
    let result = match op(host.crypto.as_ref(), &data) {
        Ok(result) => result,
        Err(_) => return 1,
    };
    let stored = host.runtime().mem_store(result_offset, &result);
    if host.fault_on_err(stored, abort).is_none() {
        return 1;
    }
    0
}

pub fn verify_bls(
    host: &mut VmHost,
    key_offset: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().crypto_api_cost.verify_bls;
    host.use_gas(cost);
    verify_op(
        host,
        key_offset,
        BLS_PUBLIC_KEY_LENGTH,
        message_offset,
        message_length,
        sig_offset,
        BLS_SIGNATURE_LENGTH,
        |crypto, key, message, sig| crypto.verify_bls(key, message, sig),
    )
}

pub fn verify_ed25519(
    host: &mut VmHost,
    key_offset: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().crypto_api_cost.verify_ed25519;
    host.use_gas(cost);
    verify_op(
        host,
        key_offset,
        ED25519_PUBLIC_KEY_LENGTH,
        message_offset,
        message_length,
        sig_offset,
        ED25519_SIGNATURE_LENGTH,
        |crypto, key, message, sig| crypto.verify_ed25519(key, message, sig),
    )
}

/// The signature is DER-framed: byte 0 is the header, byte 1 the length
/// of the remainder.
pub fn verify_secp256k1(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
) -> i32 {
    let cost = host.gas_schedule().crypto_api_cost.verify_secp256k1;
    host.use_gas(cost);

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    if key_length != SECP256K1_COMPRESSED_KEY_LENGTH
        && key_length != SECP256K1_UNCOMPRESSED_KEY_LENGTH
    {
        host.fault(VMError::InvalidPublicKeySize, abort);
        return 1;
    }
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return 1;
    };

    let copy_gas = math::mul_u64(
        host.gas_schedule().base_operation_cost.data_copy_per_byte,
        message_length.max(0) as u64,
    );
    host.use_gas(copy_gas);
    let Some(message) = host.fault_on_err(
        host.runtime().mem_load(message_offset, message_length),
        abort,
    ) else {
        return 1;
    };

    const SIG_HEADER_LENGTH: i32 = 2;
    let Some(sig_header) = host.fault_on_err(
        host.runtime().mem_load(sig_offset, SIG_HEADER_LENGTH),
        abort,
    ) else {
        return 1;
    };
    let sig_length = sig_header[1] as i32 + SIG_HEADER_LENGTH;
    let Some(sig) = host.fault_on_err(host.runtime().mem_load(sig_offset, sig_length), abort)
    else {
        return 1;
    };

    match host.crypto.verify_secp256k1(&key, &message, &sig) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[allow(clippy::too_many_arguments)]
fn verify_op(
    host: &mut VmHost,
    key_offset: i32,
    key_length: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
    sig_length: i32,
    op: impl FnOnce(&dyn crate::hooks::VMCrypto, &[u8], &[u8], &[u8]) -> Result<(), VMError>,
) -> i32 {
    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return 1;
    };

    let copy_gas = math::mul_u64(
        host.gas_schedule().base_operation_cost.data_copy_per_byte,
        message_length.max(0) as u64,
    );
    host.use_gas(copy_gas);
    let Some(message) = host.fault_on_err(
        host.runtime().mem_load(message_offset, message_length),
        abort,
    ) else {
        return 1;
    };
    let Some(sig) = host.fault_on_err(host.runtime().mem_load(sig_offset, sig_length), abort)
    else {
        return 1;
    };

    match op(host.crypto.as_ref(), &key, &message, &sig) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

// ---------------------------------------------------------------------
// elliptic curves
// ---------------------------------------------------------------------

/// Registers the parameters of a named curve and returns its handle.
/// Supported field sizes are 224, 256, 384 and 521 bits.
pub fn create_ec(host: &mut VmHost, data_offset: i32, data_length: i32) -> Handle {
    let cost = host.gas_schedule().crypto_api_cost.ecc_new;
    host.use_gas(cost);

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some(name_bytes) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return -1;
    };
    let name = String::from_utf8_lossy(&name_bytes).into_owned();
    let Some(params) = curve_params_by_name(&name) else {
        host.fault(VMError::NoEllipticCurveUnderThisHandle, abort);
        return -1;
    };
    host.managed_types_mut().put_elliptic_curve(&params)
}

/// Curve arithmetic lives in the crypto hook; the host only keeps the
/// field size and name for gas classification.
fn curve_params_by_name(name: &str) -> Option<EllipticCurveParams> {
    let bit_size = match name {
        "P-224" => 224,
        "P-256" => 256,
        "P-384" => 384,
        "P-521" => 521,
        _ => return None,
    };
    Some(EllipticCurveParams {
        bit_size,
        name: name.to_string(),
        ..Default::default()
    })
}

fn charge_curve_op(host: &mut VmHost, base_cost: u64, multiplier: i32) -> bool {
    if multiplier < 0 {
        let abort = host.runtime().crypto_api_error_should_fail_execution();
        host.fault(VMError::NoEllipticCurveUnderThisHandle, abort);
        return false;
    }
    host.use_gas(math::mul_u64(base_cost, multiplier as u64) / 100);
    true
}

fn read_big_int_pair(
    host: &mut VmHost,
    handle1: Handle,
    handle2: Handle,
) -> Option<(BigInt, BigInt)> {
    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let values = host.managed_types().get_two_big_ints(handle1, handle2);
    host.fault_on_err(values, abort)
}

/// Point addition; result coordinates land in the destination handles.
#[allow(clippy::too_many_arguments)]
pub fn add_ec(
    host: &mut VmHost,
    x_result_handle: Handle,
    y_result_handle: Handle,
    ec_handle: Handle,
    x1_handle: Handle,
    y1_handle: Handle,
    x2_handle: Handle,
    y2_handle: Handle,
) {
    let base_cost = host.gas_schedule().crypto_api_cost.ecc_add;
    let multiplier = host.managed_types().curve_gas_cost_multiplier(ec_handle);
    if !charge_curve_op(host, base_cost, multiplier) {
        return;
    }

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some((x1, y1)) = read_big_int_pair(host, x1_handle, y1_handle) else {
        return;
    };
    let Some((x2, y2)) = read_big_int_pair(host, x2_handle, y2_handle) else {
        return;
    };
    let curve = host.managed_types().get_elliptic_curve(ec_handle).cloned();
    let Some(curve) = host.fault_on_err(curve, abort) else {
        return;
    };

    let result = host.crypto.ec_add(&curve, &x1, &y1, &x2, &y2);
    match host.fault_on_err(result, abort) {
        Some((x, y)) => {
            host.managed_types_mut().set_big_int(x_result_handle, x);
            host.managed_types_mut().set_big_int(y_result_handle, y);
        }
        None => {}
    }
}

pub fn double_ec(
    host: &mut VmHost,
    x_result_handle: Handle,
    y_result_handle: Handle,
    ec_handle: Handle,
    x_handle: Handle,
    y_handle: Handle,
) {
    let base_cost = host.gas_schedule().crypto_api_cost.ecc_double;
    let multiplier = host.managed_types().curve_gas_cost_multiplier(ec_handle);
    if !charge_curve_op(host, base_cost, multiplier) {
        return;
    }

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some((x, y)) = read_big_int_pair(host, x_handle, y_handle) else {
        return;
    };
    let curve = host.managed_types().get_elliptic_curve(ec_handle).cloned();
    let Some(curve) = host.fault_on_err(curve, abort) else {
        return;
    };

    let result = host.crypto.ec_double(&curve, &x, &y);
    if let Some((rx, ry)) = host.fault_on_err(result, abort) {
        host.managed_types_mut().set_big_int(x_result_handle, rx);
        host.managed_types_mut().set_big_int(y_result_handle, ry);
    }
}

pub fn is_on_curve_ec(
    host: &mut VmHost,
    ec_handle: Handle,
    x_handle: Handle,
    y_handle: Handle,
) -> i32 {
    let base_cost = host.gas_schedule().crypto_api_cost.ecc_is_on_curve;
    let multiplier = host.managed_types().curve_gas_cost_multiplier(ec_handle);
    if !charge_curve_op(host, base_cost, multiplier) {
        return -1;
    }

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some((x, y)) = read_big_int_pair(host, x_handle, y_handle) else {
        return -1;
    };
    let curve = host.managed_types().get_elliptic_curve(ec_handle).cloned();
    let Some(curve) = host.fault_on_err(curve, abort) else {
        return -1;
    };

    let result = host.crypto.ec_is_on_curve(&curve, &x, &y);
    match host.fault_on_err(result, abort) {
        Some(on_curve) => on_curve as i32,
        None => -1,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn scalar_mult_ec(
    host: &mut VmHost,
    x_result_handle: Handle,
    y_result_handle: Handle,
    ec_handle: Handle,
    x_handle: Handle,
    y_handle: Handle,
    data_offset: i32,
    length: i32,
) -> i32 {
    let base_cost = host.gas_schedule().crypto_api_cost.ecc_scalar_mult;
    let multiplier = host
        .managed_types()
        .scalar_mult_curve_gas_cost_multiplier(ec_handle);
    if !charge_curve_op(host, base_cost, multiplier) {
        return 1;
    }

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some(scalar) = host.fault_on_err(host.runtime().mem_load(data_offset, length), abort)
    else {
        return 1;
    };
    let Some((x, y)) = read_big_int_pair(host, x_handle, y_handle) else {
        return 1;
    };
    let curve = host.managed_types().get_elliptic_curve(ec_handle).cloned();
    let Some(curve) = host.fault_on_err(curve, abort) else {
        return 1;
    };

    let result = host.crypto.ec_scalar_mult(&curve, &x, &y, &scalar);
    match host.fault_on_err(result, abort) {
        Some((rx, ry)) => {
            host.managed_types_mut().set_big_int(x_result_handle, rx);
            host.managed_types_mut().set_big_int(y_result_handle, ry);
            0
        }
        None => 1,
    }
}

pub fn scalar_base_mult_ec(
    host: &mut VmHost,
    x_result_handle: Handle,
    y_result_handle: Handle,
    ec_handle: Handle,
    data_offset: i32,
    length: i32,
) -> i32 {
    let base_cost = host.gas_schedule().crypto_api_cost.ecc_scalar_base_mult;
    let multiplier = host
        .managed_types()
        .scalar_mult_curve_gas_cost_multiplier(ec_handle);
    if !charge_curve_op(host, base_cost, multiplier) {
        return 1;
    }

    let abort = host.runtime().crypto_api_error_should_fail_execution();
    let Some(scalar) = host.fault_on_err(host.runtime().mem_load(data_offset, length), abort)
    else {
        return 1;
    };
    let curve = host.managed_types().get_elliptic_curve(ec_handle).cloned();
    let Some(curve) = host.fault_on_err(curve, abort) else {
        return 1;
    };

    let result = host.crypto.ec_scalar_base_mult(&curve, &scalar);
    match host.fault_on_err(result, abort) {
        Some((rx, ry)) => {
            host.managed_types_mut().set_big_int(x_result_handle, rx);
            host.managed_types_mut().set_big_int(y_result_handle, ry);
            0
        }
        None => 1,
    }
}

pub fn get_curve_length_ec(host: &mut VmHost, ec_handle: Handle) -> i32 {
    let cost = host.gas_schedule().crypto_api_cost.ecc_new;
    host.use_gas(cost);
    host.managed_types().curve_size_of_field(ec_handle)
}

pub fn get_priv_key_byte_length_ec(host: &mut VmHost, ec_handle: Handle) -> i32 {
    let cost = host.gas_schedule().crypto_api_cost.ecc_new;
    host.use_gas(cost);
    host.managed_types().private_key_byte_length(ec_handle)
}
