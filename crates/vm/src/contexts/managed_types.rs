//! Handle table for big integers, managed byte buffers and elliptic-curve
//! parameter objects. Guests only ever see the small integer handles;
//! forging a handle at most reaches another value of the same frame.

use num_bigint::BigInt;
use rustc_hash::FxHashMap;

use crate::errors::VMError;

pub type Handle = i32;

/// Big-int values up to this byte length copy for free; beyond it a copy
/// charges `dataCopyPerByte` per byte.
pub const MAX_BIG_INT_BYTE_LEN_FOR_NORMAL_COST: usize = 32;

const P224_CURVE_MULTIPLIER: i32 = 100;
const P256_CURVE_MULTIPLIER: i32 = 135;
const P384_CURVE_MULTIPLIER: i32 = 200;
const P521_CURVE_MULTIPLIER: i32 = 250;

const P224_CURVE_SCALAR_MULT_MULTIPLIER: i32 = 100;
const P256_CURVE_SCALAR_MULT_MULTIPLIER: i32 = 110;
const P384_CURVE_SCALAR_MULT_MULTIPLIER: i32 = 150;
const P521_CURVE_SCALAR_MULT_MULTIPLIER: i32 = 190;

const P224_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER: i32 = 2000;
const P256_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER: i32 = 100;
const P384_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER: i32 = 200;
const P521_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER: i32 = 400;

/// Parameters of a short Weierstrass curve. Copied by value when stored
/// under a new handle; immutable once inserted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EllipticCurveParams {
    pub p: BigInt,
    pub n: BigInt,
    pub b: BigInt,
    pub gx: BigInt,
    pub gy: BigInt,
    pub bit_size: u32,
    pub name: String,
}

#[derive(Clone, Default)]
struct ManagedTypesState {
    big_int_values: FxHashMap<Handle, BigInt>,
    ec_values: FxHashMap<Handle, EllipticCurveParams>,
    m_buffer_values: FxHashMap<Handle, Vec<u8>>,
}

#[derive(Default)]
pub struct ManagedTypesContext {
    values: ManagedTypesState,
    state_stack: Vec<ManagedTypesState>,
}

impl ManagedTypesContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_state(&mut self) {
        self.values = ManagedTypesState::default();
    }

    /// Deep-copies big ints (fresh allocations per handle), copies buffer
    /// contents by value and clones the immutable curve params.
    pub fn push_state(&mut self) {
        self.state_stack.push(self.values.clone());
    }

    pub fn pop_set_active_state(&mut self) {
        if let Some(previous) = self.state_stack.pop() {
            self.values = previous;
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

    // big ints

    pub fn big_int_or_create(&mut self, handle: Handle) -> &mut BigInt {
        self.values.big_int_values.entry(handle).or_default()
    }

    pub fn get_big_int(&self, handle: Handle) -> Result<&BigInt, VMError> {
        self.values
            .big_int_values
            .get(&handle)
            .ok_or(VMError::NoBigIntUnderThisHandle)
    }

    pub fn get_two_big_ints(
        &self,
        handle1: Handle,
        handle2: Handle,
    ) -> Result<(BigInt, BigInt), VMError> {
        Ok((
            self.get_big_int(handle1)?.clone(),
            self.get_big_int(handle2)?.clone(),
        ))
    }

    pub fn set_big_int(&mut self, handle: Handle, value: BigInt) {
        self.values.big_int_values.insert(handle, value);
    }

    /// Allocates a new handle: starts at the table size and probes upward
    /// until an unused slot is found, so handles stay stable under
    /// intervening insertions.
    pub fn put_big_int(&mut self, value: i64) -> Handle {
        let handle = Self::next_handle(self.values.big_int_values.len(), |h| {
            self.values.big_int_values.contains_key(&h)
        });
        self.values.big_int_values.insert(handle, BigInt::from(value));
        handle
    }

    // elliptic curves

    pub fn get_elliptic_curve(&self, handle: Handle) -> Result<&EllipticCurveParams, VMError> {
        self.values
            .ec_values
            .get(&handle)
            .ok_or(VMError::NoEllipticCurveUnderThisHandle)
    }

    pub fn put_elliptic_curve(&mut self, curve: &EllipticCurveParams) -> Handle {
        let handle = Self::next_handle(self.values.ec_values.len(), |h| {
            self.values.ec_values.contains_key(&h)
        });
        self.values.ec_values.insert(handle, curve.clone());
        handle
    }

    pub fn curve_size_of_field(&self, handle: Handle) -> i32 {
        match self.values.ec_values.get(&handle) {
            Some(curve) => curve.bit_size as i32,
            None => -1,
        }
    }

    /// Base-cost multiplier (×100) for add/double/is-on-curve, by field
    /// size.
    pub fn curve_gas_cost_multiplier(&self, handle: Handle) -> i32 {
        match self.curve_size_of_field(handle) {
            224 => P224_CURVE_MULTIPLIER,
            256 => P256_CURVE_MULTIPLIER,
            384 => P384_CURVE_MULTIPLIER,
            521 => P521_CURVE_MULTIPLIER,
            _ => -1,
        }
    }

    pub fn scalar_mult_curve_gas_cost_multiplier(&self, handle: Handle) -> i32 {
        match self.curve_size_of_field(handle) {
            224 => P224_CURVE_SCALAR_MULT_MULTIPLIER,
            256 => P256_CURVE_SCALAR_MULT_MULTIPLIER,
            384 => P384_CURVE_SCALAR_MULT_MULTIPLIER,
            521 => P521_CURVE_SCALAR_MULT_MULTIPLIER,
            _ => -1,
        }
    }

    pub fn unmarshal_compressed_curve_gas_cost_multiplier(&self, handle: Handle) -> i32 {
        match self.curve_size_of_field(handle) {
            224 => P224_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER,
            256 => P256_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER,
            384 => P384_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER,
            521 => P521_CURVE_UNMARSHAL_COMPRESSED_MULTIPLIER,
            _ => -1,
        }
    }

    pub fn private_key_byte_length(&self, handle: Handle) -> i32 {
        match self.values.ec_values.get(&handle) {
            Some(curve) => ((curve.n.bits() as i32) + 7) / 8,
            None => -1,
        }
    }

    // managed buffers

    pub fn new_managed_buffer(&mut self) -> Handle {
        let handle = Self::next_handle(self.values.m_buffer_values.len(), |h| {
            self.values.m_buffer_values.contains_key(&h)
        });
        self.values.m_buffer_values.insert(handle, Vec::new());
        handle
    }

    pub fn new_managed_buffer_from_bytes(&mut self, bytes: Vec<u8>) -> Handle {
        let handle = self.new_managed_buffer();
        self.set_bytes(handle, bytes);
        handle
    }

    pub fn set_bytes(&mut self, handle: Handle, bytes: Vec<u8>) {
        self.values.m_buffer_values.insert(handle, bytes);
    }

    pub fn get_bytes(&self, handle: Handle) -> Result<&Vec<u8>, VMError> {
        self.values
            .m_buffer_values
            .get(&handle)
            .ok_or(VMError::NoManagedBufferUnderThisHandle)
    }

    pub fn append_bytes(&mut self, handle: Handle, bytes: &[u8]) -> bool {
        match self.values.m_buffer_values.get_mut(&handle) {
            Some(buffer) => {
                buffer.extend_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    pub fn buffer_length(&self, handle: Handle) -> i32 {
        match self.values.m_buffer_values.get(&handle) {
            Some(buffer) => buffer.len() as i32,
            None => -1,
        }
    }

    /// Bounds-checked copy; slicing exactly to the end is allowed.
    pub fn get_slice(
        &self,
        handle: Handle,
        start_position: i32,
        slice_length: i32,
    ) -> Result<Vec<u8>, VMError> {
        let buffer = self.get_bytes(handle)?;
        if start_position < 0 || slice_length < 0 {
            return Err(VMError::BadBounds);
        }
        let start = start_position as usize;
        let length = slice_length as usize;
        if length > buffer.len().wrapping_sub(start) || start > buffer.len() {
            return Err(VMError::BadBounds);
        }
        Ok(buffer[start..start + length].to_vec())
    }

    /// Removes a slice: truncates when the range reaches past the end,
    /// splices otherwise. Returns the new contents.
    pub fn delete_slice(
        &mut self,
        handle: Handle,
        start_position: i32,
        slice_length: i32,
    ) -> Result<Vec<u8>, VMError> {
        if start_position < 0 || slice_length < 0 {
            return Err(VMError::BadBounds);
        }
        let buffer = self
            .values
            .m_buffer_values
            .get_mut(&handle)
            .ok_or(VMError::NoManagedBufferUnderThisHandle)?;
        let start = (start_position as usize).min(buffer.len());
        let length = slice_length as usize;
        if length > buffer.len() - start {
            buffer.truncate(start);
        } else {
            buffer.drain(start..start + length);
        }
        Ok(buffer.clone())
    }

    /// Inserts a slice at `start_position`. Appending at the very end is
    /// rejected (`start_position` must address an existing byte).
    pub fn insert_slice(
        &mut self,
        handle: Handle,
        start_position: i32,
        slice: &[u8],
    ) -> Result<Vec<u8>, VMError> {
        let buffer = self
            .values
            .m_buffer_values
            .get_mut(&handle)
            .ok_or(VMError::NoManagedBufferUnderThisHandle)?;
        if start_position < 0 || start_position as usize + 1 > buffer.len() {
            return Err(VMError::BadBounds);
        }
        let start = start_position as usize;
        buffer.splice(start..start, slice.iter().copied());
        Ok(buffer.clone())
    }

    fn next_handle(start: usize, occupied: impl Fn(Handle) -> bool) -> Handle {
        let mut handle = start as Handle;
        while occupied(handle) {
            handle += 1;
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_allocation_probes_past_occupied_slots() {
        let mut context = ManagedTypesContext::new();
        let first = context.put_big_int(1);
        let second = context.put_big_int(2);
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        // a buffer table is independent of the big-int table
        assert_eq!(context.new_managed_buffer(), 0);
    }

    #[test]
    fn get_put_round_trip() {
        let mut context = ManagedTypesContext::new();
        let handle = context.put_big_int(42);
        assert_eq!(context.get_big_int(handle).unwrap(), &BigInt::from(42));
        assert_eq!(
            context.get_big_int(handle + 1),
            Err(VMError::NoBigIntUnderThisHandle)
        );
    }

    #[test]
    fn push_pop_restores_parent_values() {
        let mut context = ManagedTypesContext::new();
        let handle = context.put_big_int(7);
        context.push_state();
        *context.big_int_or_create(handle) = BigInt::from(100);
        let child_handle = context.put_big_int(55);
        context.pop_set_active_state();
        assert_eq!(context.get_big_int(handle).unwrap(), &BigInt::from(7));
        assert!(context.get_big_int(child_handle).is_err());
    }

    #[test]
    fn pop_discard_keeps_child_changes() {
        let mut context = ManagedTypesContext::new();
        let handle = context.put_big_int(7);
        context.push_state();
        *context.big_int_or_create(handle) = BigInt::from(8);
        context.pop_discard();
        assert_eq!(context.get_big_int(handle).unwrap(), &BigInt::from(8));
    }

    #[test]
    fn slice_to_the_end_is_allowed() {
        let mut context = ManagedTypesContext::new();
        let handle = context.new_managed_buffer_from_bytes(b"abcdef".to_vec());
        assert_eq!(context.get_slice(handle, 2, 4).unwrap(), b"cdef".to_vec());
        assert_eq!(context.get_slice(handle, 2, 5), Err(VMError::BadBounds));
        assert_eq!(context.get_slice(handle, -1, 1), Err(VMError::BadBounds));
        assert_eq!(context.get_slice(handle, 0, -1), Err(VMError::BadBounds));
    }

    #[test]
    fn delete_slice_truncates_or_splices() {
        let mut context = ManagedTypesContext::new();
        let handle = context.new_managed_buffer_from_bytes(b"abcdef".to_vec());
        assert_eq!(context.delete_slice(handle, 1, 2).unwrap(), b"adef".to_vec());
        assert_eq!(context.delete_slice(handle, 2, 100).unwrap(), b"ad".to_vec());
    }

    #[test]
    fn insert_slice_rejects_append_at_end() {
        let mut context = ManagedTypesContext::new();
        let handle = context.new_managed_buffer_from_bytes(b"ad".to_vec());
        assert_eq!(
            context.insert_slice(handle, 1, b"bc").unwrap(),
            b"abcd".to_vec()
        );
        assert_eq!(context.insert_slice(handle, 4, b"x"), Err(VMError::BadBounds));
    }

    #[test]
    fn curve_multipliers_follow_field_size() {
        let mut context = ManagedTypesContext::new();
        let handle = context.put_elliptic_curve(&EllipticCurveParams {
            bit_size: 256,
            ..Default::default()
        });
        assert_eq!(context.curve_gas_cost_multiplier(handle), 135);
        assert_eq!(context.scalar_mult_curve_gas_cost_multiplier(handle), 110);
        assert_eq!(
            context.unmarshal_compressed_curve_gas_cost_multiplier(handle),
            100
        );
        assert_eq!(context.curve_gas_cost_multiplier(handle + 1), -1);
    }
}
