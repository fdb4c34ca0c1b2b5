use num_bigint::{BigInt, BigUint};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::call_input::CallType;
use crate::types::Address;

/// Outcome of a VM invocation, visible to the outside world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReturnCode {
    #[default]
    Ok,
    FunctionNotFound,
    ContractNotFound,
    UserError,
    OutOfGas,
    ContractInvalid,
    ExecutionFailed,
}

impl ReturnCode {
    /// Stable textual form, used when a return code travels as call data.
    pub fn message(&self) -> &'static str {
        match self {
            ReturnCode::Ok => "ok",
            ReturnCode::FunctionNotFound => "function not found",
            ReturnCode::ContractNotFound => "contract not found",
            ReturnCode::UserError => "user error",
            ReturnCode::OutOfGas => "out of gas",
            ReturnCode::ContractInvalid => "contract invalid",
            ReturnCode::ExecutionFailed => "execution failed",
        }
    }

    pub fn as_u64(&self) -> u64 {
        match self {
            ReturnCode::Ok => 0,
            ReturnCode::FunctionNotFound => 1,
            ReturnCode::ContractNotFound => 2,
            ReturnCode::UserError => 4,
            ReturnCode::OutOfGas => 5,
            ReturnCode::ContractInvalid => 7,
            ReturnCode::ExecutionFailed => 10,
        }
    }

    /// Minimal big-endian encoding of the numeric code; empty for `Ok`.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ReturnCode::Ok => Vec::new(),
            other => BigUint::from(other.as_u64()).to_bytes_be(),
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// One dirty storage entry of an output account.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StorageUpdate {
    pub offset: Vec<u8>,
    pub data: Vec<u8>,
    pub written: bool,
}

/// A value or call leaving the VM towards another account.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct OutputTransfer {
    pub value: BigUint,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub data: Vec<u8>,
    pub call_type: CallType,
    pub sender_address: Address,
}

/// Accumulated effects on one account during an execution.
///
/// `balance` is reference information read from the blockchain; the only
/// authoritative change is `balance_delta`.
#[derive(Clone, Debug, Default)]
pub struct OutputAccount {
    pub address: Address,
    pub nonce: u64,
    pub balance: Option<BigUint>,
    pub balance_delta: BigInt,
    pub storage_updates: FxHashMap<Vec<u8>, StorageUpdate>,
    pub code: Option<Vec<u8>>,
    pub code_metadata: Vec<u8>,
    pub code_deployer_address: Option<Address>,
    pub output_transfers: Vec<OutputTransfer>,
    pub gas_used: u64,
}

impl OutputAccount {
    pub fn new(address: Address) -> Self {
        OutputAccount {
            address,
            ..Default::default()
        }
    }

    /// Folds `other` into `self`: deltas are summed, storage updates are
    /// overwritten key by key (last writer wins), transfers are appended in
    /// order, code and deployer take the newer value when present.
    pub fn merge(&mut self, other: &OutputAccount) {
        self.address = other.address;
        if other.nonce > self.nonce {
            self.nonce = other.nonce;
        }
        if other.balance.is_some() {
            self.balance = other.balance.clone();
        }
        self.balance_delta += &other.balance_delta;
        for (key, update) in &other.storage_updates {
            self.storage_updates.insert(key.clone(), update.clone());
        }
        if other.code.is_some() {
            self.code = other.code.clone();
            self.code_metadata = other.code_metadata.clone();
        }
        if other.code_deployer_address.is_some() {
            self.code_deployer_address = other.code_deployer_address;
        }
        self.output_transfers
            .extend(other.output_transfers.iter().cloned());
        self.gas_used = crate::math::add_u64(self.gas_used, other.gas_used);
    }
}

/// Log entry emitted by a contract.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// The structured result of a VM invocation: the wire format consumed by
/// the outer dispatcher.
#[derive(Clone, Debug, Default)]
pub struct VMOutput {
    pub return_data: Vec<Vec<u8>>,
    pub return_code: ReturnCode,
    pub return_message: String,
    pub gas_remaining: u64,
    pub gas_refund: BigUint,
    pub output_accounts: FxHashMap<Address, OutputAccount>,
    pub logs: Vec<LogEntry>,
}

impl VMOutput {
    /// Merges a nested call's output into this one. Return code and message
    /// are not touched; the caller decides what the frame outcome is.
    pub fn merge(&mut self, child: &VMOutput) {
        self.return_data.extend(child.return_data.iter().cloned());
        self.gas_refund += &child.gas_refund;
        for (address, account) in &child.output_accounts {
            self.output_accounts
                .entry(*address)
                .or_insert_with(|| OutputAccount::new(*address))
                .merge(account);
        }
        self.logs.extend(child.logs.iter().cloned());
    }

    pub fn account(&self, address: &Address) -> Option<&OutputAccount> {
        self.output_accounts.get(address)
    }
}
