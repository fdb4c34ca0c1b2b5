//! Managed byte buffers: owned host-side byte sequences addressed by
//! handle, with bounds-checked slicing and conversions to and from the
//! big-int table.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;
use warx_common::{math, twos};

use crate::contexts::managed_types::Handle;
use crate::host::VmHost;

pub fn m_buffer_new(host: &mut VmHost) -> Handle {
    let cost = host.gas_schedule().managed_buffer_api_cost.m_buffer_new;
    host.use_gas(cost);
    host.managed_types_mut().new_managed_buffer()
}

pub fn m_buffer_new_from_bytes(host: &mut VmHost, data_offset: i32, data_length: i32) -> Handle {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_new_from_bytes;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return -1;
    };
    host.managed_types_mut().new_managed_buffer_from_bytes(data)
}

pub fn m_buffer_set_bytes(
    host: &mut VmHost,
    handle: Handle,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_set_bytes;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, data.len() as u64));
    host.managed_types_mut().set_bytes(handle, data);
    0
}

pub fn m_buffer_get_bytes(host: &mut VmHost, handle: Handle, result_offset: i32) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_get_bytes;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let bytes = host.managed_types().get_bytes(handle).cloned();
    let Some(bytes) = host.fault_on_err(bytes, abort) else {
        return 1;
    };
    let result = host.runtime().mem_store(result_offset, &bytes);
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
    0
}

pub fn m_buffer_append(
    host: &mut VmHost,
    handle: Handle,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    let cost = host.gas_schedule().managed_buffer_api_cost.m_buffer_append;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, data.len() as u64));

    if !host.managed_types_mut().append_bytes(handle, &data) {
        let abort = host.runtime().base_api_error_should_fail_execution();
        host.fault(crate::errors::VMError::NoManagedBufferUnderThisHandle, abort);
        return 1;
    }
    0
}

pub fn m_buffer_get_length(host: &mut VmHost, handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_get_length;
    host.use_gas(cost);
    host.managed_types().buffer_length(handle)
}

/// Copies `[starting_position, starting_position+slice_length)` of the
/// buffer into guest memory.
pub fn m_buffer_get_byte_slice(
    host: &mut VmHost,
    source_handle: Handle,
    starting_position: i32,
    slice_length: i32,
    result_offset: i32,
) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_copy_byte_slice;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let slice = host
        .managed_types()
        .get_slice(source_handle, starting_position, slice_length);
    let Some(slice) = host.fault_on_err(slice, abort) else {
        return 1;
    };
    let result = host.runtime().mem_store(result_offset, &slice);
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, slice.len() as u64));
    0
}

/// Copies a slice between two managed buffers.
pub fn m_buffer_copy_byte_slice(
    host: &mut VmHost,
    source_handle: Handle,
    starting_position: i32,
    slice_length: i32,
    destination_handle: Handle,
) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_copy_byte_slice;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let slice = host
        .managed_types()
        .get_slice(source_handle, starting_position, slice_length);
    let Some(slice) = host.fault_on_err(slice, abort) else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, slice.len() as u64));
    host.managed_types_mut().set_bytes(destination_handle, slice);
    0
}

/// Removes a slice in place; truncates when the range reaches past the
/// end.
pub fn m_buffer_delete_slice(
    host: &mut VmHost,
    handle: Handle,
    starting_position: i32,
    slice_length: i32,
) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_set_byte_slice;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let result = host
        .managed_types_mut()
        .delete_slice(handle, starting_position, slice_length);
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    0
}

/// Inserts guest bytes into the buffer at the given position.
pub fn m_buffer_insert_slice(
    host: &mut VmHost,
    handle: Handle,
    starting_position: i32,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_set_byte_slice;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(data) = host.fault_on_err(host.runtime().mem_load(data_offset, data_length), abort)
    else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(math::mul_u64(per_byte, data.len() as u64));

    let result = host
        .managed_types_mut()
        .insert_slice(handle, starting_position, &data);
    if host.fault_on_err(result, abort).is_none() {
        return 1;
    }
    0
}

pub fn m_buffer_finish(host: &mut VmHost, handle: Handle) -> i32 {
    let cost = host.gas_schedule().managed_buffer_api_cost.m_buffer_finish;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let bytes = host.managed_types().get_bytes(handle).cloned();
    let Some(bytes) = host.fault_on_err(bytes, abort) else {
        return 1;
    };
    let per_byte = host.gas_schedule().base_operation_cost.persist_per_byte;
    host.use_gas(math::mul_u64(per_byte, bytes.len() as u64));
    host.output_mut().finish(bytes);
    0
}

pub fn m_buffer_get_argument(host: &mut VmHost, id: i32) -> Handle {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_get_argument;
    host.use_gas(cost);

    let args = host.runtime().arguments();
    if id < 0 || id as usize >= args.len() {
        return -1;
    }
    let argument = args[id as usize].clone();
    host.managed_types_mut().new_managed_buffer_from_bytes(argument)
}

pub fn m_buffer_storage_store(host: &mut VmHost, key_offset: i32, key_length: i32, handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_storage_store;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let bytes = host.managed_types().get_bytes(handle).cloned();
    let Some(bytes) = host.fault_on_err(bytes, abort) else {
        return -1;
    };
    let stored = host.storage_store(&key, &bytes);
    match host.fault_on_err(stored, abort) {
        Some(status) => status as i32,
        None => -1,
    }
}

pub fn m_buffer_storage_load(host: &mut VmHost, key_offset: i32, key_length: i32, handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_storage_load;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let Some(key) = host.fault_on_err(host.runtime().mem_load(key_offset, key_length), abort)
    else {
        return -1;
    };
    let data = host.storage_load(&key);
    let length = data.len() as i32;
    host.managed_types_mut().set_bytes(handle, data);
    length
}

pub fn m_buffer_to_big_int_unsigned(host: &mut VmHost, buffer_handle: Handle, big_int_handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_to_big_int;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let bytes = host.managed_types().get_bytes(buffer_handle).cloned();
    let Some(bytes) = host.fault_on_err(bytes, abort) else {
        return 1;
    };
    let value = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&bytes));
    host.managed_types_mut().set_big_int(big_int_handle, value);
    0
}

pub fn m_buffer_to_big_int_signed(host: &mut VmHost, buffer_handle: Handle, big_int_handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_to_big_int;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let bytes = host.managed_types().get_bytes(buffer_handle).cloned();
    let Some(bytes) = host.fault_on_err(bytes, abort) else {
        return 1;
    };
    host.managed_types_mut()
        .set_big_int(big_int_handle, twos::set_bytes(&bytes));
    0
}

pub fn m_buffer_from_big_int_unsigned(host: &mut VmHost, buffer_handle: Handle, big_int_handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_from_big_int;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(big_int_handle).cloned();
    let Some(value) = host.fault_on_err(value, abort) else {
        return 1;
    };
    let bytes = if value.is_zero() {
        Vec::new()
    } else {
        value.magnitude().to_bytes_be()
    };
    host.managed_types_mut().set_bytes(buffer_handle, bytes);
    0
}

pub fn m_buffer_from_big_int_signed(host: &mut VmHost, buffer_handle: Handle, big_int_handle: Handle) -> i32 {
    let cost = host
        .gas_schedule()
        .managed_buffer_api_cost
        .m_buffer_from_big_int;
    host.use_gas(cost);

    let abort = host.runtime().base_api_error_should_fail_execution();
    let value = host.managed_types().get_big_int(big_int_handle).cloned();
    let Some(value) = host.fault_on_err(value, abort) else {
        return 1;
    };
    host.managed_types_mut()
        .set_bytes(buffer_handle, twos::to_bytes(&value));
    0
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
    fn buffer_big_int_round_trip() {
        let mut host = host_with_frame();
        let buffer = host
            .managed_types_mut()
            .new_managed_buffer_from_bytes(vec![0x01, 0x00]);
        let number = host.managed_types_mut().put_big_int(0);

        assert_eq!(m_buffer_to_big_int_unsigned(&mut host, buffer, number), 0);
        assert_eq!(
            host.managed_types().get_big_int(number).unwrap(),
            &BigInt::from(256)
        );

        let back = m_buffer_new(&mut host);
        assert_eq!(m_buffer_from_big_int_unsigned(&mut host, back, number), 0);
        assert_eq!(
            host.managed_types().get_bytes(back).unwrap(),
            &vec![0x01, 0x00]
        );
    }

    #[test]
    fn missing_handles_record_errors() {
        let mut host = host_with_frame();
        assert_eq!(m_buffer_get_length(&mut host, 55), -1);
        assert_eq!(m_buffer_finish(&mut host, 55), 1);
        assert!(host
            .runtime_errors()
            .contains(&crate::errors::VMError::NoManagedBufferUnderThisHandle));
    }
}
