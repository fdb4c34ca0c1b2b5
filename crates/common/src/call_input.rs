use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::types::Address;

/// How a call entered the VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CallType {
    #[default]
    DirectCall,
    AsynchronousCall,
    AsynchronousCallBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EsdtTokenType {
    #[default]
    Fungible,
    NonFungible,
    SemiFungible,
}

/// A single token payment attached to a call. A zero nonce implies a
/// fungible token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EsdtTransfer {
    pub token_name: Vec<u8>,
    pub token_nonce: u64,
    pub value: BigUint,
    pub token_type: EsdtTokenType,
}

impl EsdtTransfer {
    pub fn fungible(token_name: Vec<u8>, value: BigUint) -> Self {
        EsdtTransfer {
            token_name,
            token_nonce: 0,
            value,
            token_type: EsdtTokenType::Fungible,
        }
    }
}

/// The common part of every VM invocation.
#[derive(Clone, Debug, Default)]
pub struct VMInput {
    pub caller_addr: Address,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: BigUint,
    pub esdt_transfers: Vec<EsdtTransfer>,
    pub call_type: CallType,
    pub gas_price: u64,
    pub gas_provided: u64,
    pub gas_locked: u64,
    pub original_tx_hash: Vec<u8>,
    pub current_tx_hash: Vec<u8>,
    pub read_only: bool,
    /// Set on callback inputs created after a failed destination call.
    pub return_call_after_error: bool,
}

/// Input for calling an existing contract.
#[derive(Clone, Debug, Default)]
pub struct ContractCallInput {
    pub vm_input: VMInput,
    pub recipient_addr: Address,
    pub function: String,
}

/// Input for deploying a new contract.
#[derive(Clone, Debug, Default)]
pub struct ContractCreateInput {
    pub vm_input: VMInput,
    pub contract_code: Vec<u8>,
    pub contract_code_metadata: Vec<u8>,
}

impl ContractCallInput {
    pub fn caller(&self) -> Address {
        self.vm_input.caller_addr
    }

    pub fn gas_provided(&self) -> u64 {
        self.vm_input.gas_provided
    }
}
