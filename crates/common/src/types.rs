use serde::{Deserialize, Serialize};

/// Length in bytes of an account address.
pub const ADDRESS_LEN: usize = 32;
/// Length in bytes of a serialized balance (left-padded big-endian).
pub const BALANCE_LEN: usize = 32;
/// Length in bytes of a block or transaction hash.
pub const HASH_LEN: usize = 32;
/// Length in bytes of the code metadata field.
pub const CODE_METADATA_LEN: usize = 2;

/// Function invoked on contract deployment.
pub const INIT_FUNCTION_NAME: &str = "init";
/// Function invoked when an asynchronous call returns to its originator.
pub const CALLBACK_FUNCTION_NAME: &str = "callBack";
/// Reserved function name synthesized by the dispatcher for upgrades.
pub const UPGRADE_FUNCTION_NAME: &str = "upgradeContract";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid address length {0}")]
    InvalidAddressLength(usize),
}

/// A 32-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const fn zero() -> Self {
        Address([0u8; ADDRESS_LEN])
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypeError> {
        if slice.len() != ADDRESS_LEN {
            return Err(TypeError::InvalidAddressLength(slice.len()));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(slice);
        Ok(Address(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_slice_rejects_bad_lengths() {
        assert!(Address::from_slice(&[0u8; 31]).is_err());
        assert!(Address::from_slice(&[0u8; 33]).is_err());
        assert!(Address::from_slice(&[7u8; 32]).is_ok());
    }
}
