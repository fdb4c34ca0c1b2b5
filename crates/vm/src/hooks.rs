//! Contracts of the external collaborators: the blockchain state hook, the
//! cryptographic primitives and the builtin-function container.
//!
//! The host never reaches past these traits; tests plug in the mocks from
//! [`crate::testing`].

use num_bigint::{BigInt, BigUint};
use warx_common::{Address, ContractCallInput, EsdtTokenType, VMOutput};

use crate::contexts::managed_types::EllipticCurveParams;
use crate::errors::VMError;

/// Token data as stored by the protocol for one (account, token, nonce).
#[derive(Clone, Debug, Default)]
pub struct EsdtTokenData {
    pub value: BigUint,
    pub token_type: EsdtTokenType,
    pub name: Vec<u8>,
    pub attributes: Vec<u8>,
    pub uris: Vec<Vec<u8>>,
}

/// Read access to chain state plus the few write-side services the VM
/// needs (address derivation, snapshots, builtin execution). Every method
/// is synchronous; errors surface as host-function failures.
pub trait BlockchainHook {
    fn account_exists(&self, address: &Address) -> bool;
    fn new_address(
        &self,
        creator: &Address,
        creator_nonce: u64,
        vm_type: &[u8],
    ) -> Result<Address, VMError>;
    fn get_balance(&self, address: &Address) -> BigUint;
    fn get_nonce(&self, address: &Address) -> u64;
    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Result<Vec<u8>, VMError>;
    fn is_smart_contract(&self, address: &Address) -> bool;
    fn is_payable(&self, address: &Address) -> Result<bool, VMError>;
    fn get_code(&self, address: &Address) -> Result<Vec<u8>, VMError>;
    fn get_code_metadata(&self, address: &Address) -> Result<Vec<u8>, VMError>;
    fn get_owner_address(&self, address: &Address) -> Result<Address, VMError>;
    fn get_shard_of_address(&self, address: &Address) -> u32;
    fn get_block_hash(&self, nonce: u64) -> Vec<u8>;

    fn current_timestamp(&self) -> u64;
    fn current_nonce(&self) -> u64;
    fn current_round(&self) -> u64;
    fn current_epoch(&self) -> u64;
    fn current_random_seed(&self) -> Vec<u8>;
    fn last_timestamp(&self) -> u64;
    fn last_nonce(&self) -> u64;
    fn last_round(&self) -> u64;
    fn last_epoch(&self) -> u64;
    fn last_random_seed(&self) -> Vec<u8>;
    fn get_state_root_hash(&self) -> Vec<u8>;

    fn get_esdt_token(
        &self,
        address: &Address,
        token_id: &[u8],
        nonce: u64,
    ) -> Result<EsdtTokenData, VMError>;

    /// Executes a protocol builtin function and returns its output. The
    /// hook owns builtin semantics; the VM only accounts for the gas.
    fn process_builtin_function(&self, input: &ContractCallInput) -> Result<VMOutput, VMError>;

    fn get_snapshot(&self) -> u64;
    fn revert_to_snapshot(&self, snapshot: u64) -> Result<(), VMError>;
}

/// An ESDT transfer (or batch) recognized inside generic call data.
#[derive(Clone, Debug, Default)]
pub struct ParsedEsdtTransfers {
    pub transfers: Vec<warx_common::EsdtTransfer>,
    pub receiver: Address,
    pub call_function: String,
    pub call_args: Vec<Vec<u8>>,
}

/// Name membership and call-data parsing for protocol builtin functions.
pub trait BuiltinFunctionContainer {
    fn is_builtin_function(&self, name: &str) -> bool;

    fn parse_esdt_transfers(
        &self,
        sender: &Address,
        destination: &Address,
        function: &str,
        args: &[Vec<u8>],
    ) -> Result<ParsedEsdtTransfers, VMError>;
}

/// Cryptographic primitives. Hash outputs are fixed-length byte vectors;
/// verification returns `Ok(())` for a valid signature and
/// `SignatureVerificationFailed` otherwise.
pub trait VMCrypto {
    fn sha256(&self, data: &[u8]) -> Result<Vec<u8>, VMError>;
    fn keccak256(&self, data: &[u8]) -> Result<Vec<u8>, VMError>;
    fn ripemd160(&self, data: &[u8]) -> Result<Vec<u8>, VMError>;

    fn verify_bls(&self, key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), VMError>;
    fn verify_ed25519(&self, key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), VMError>;
    fn verify_secp256k1(&self, key: &[u8], message: &[u8], signature: &[u8])
        -> Result<(), VMError>;

    fn ec_add(
        &self,
        curve: &EllipticCurveParams,
        x1: &BigInt,
        y1: &BigInt,
        x2: &BigInt,
        y2: &BigInt,
    ) -> Result<(BigInt, BigInt), VMError>;
    fn ec_double(
        &self,
        curve: &EllipticCurveParams,
        x: &BigInt,
        y: &BigInt,
    ) -> Result<(BigInt, BigInt), VMError>;
    fn ec_is_on_curve(
        &self,
        curve: &EllipticCurveParams,
        x: &BigInt,
        y: &BigInt,
    ) -> Result<bool, VMError>;
    fn ec_scalar_mult(
        &self,
        curve: &EllipticCurveParams,
        x: &BigInt,
        y: &BigInt,
        scalar: &[u8],
    ) -> Result<(BigInt, BigInt), VMError>;
    fn ec_scalar_base_mult(
        &self,
        curve: &EllipticCurveParams,
        scalar: &[u8],
    ) -> Result<(BigInt, BigInt), VMError>;
}
