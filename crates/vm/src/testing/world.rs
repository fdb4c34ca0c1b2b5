//! Mock blockchain world: accounts, storage, token balances, builtin
//! functions and a toy crypto implementation. State lives behind
//! `Rc<RefCell<…>>` so the world handle stays usable while a host holds
//! the hook.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use num_bigint::{BigInt, BigUint};
use rustc_hash::FxHashMap;
use warx_common::{
    Address, ContractCallInput, EsdtTransfer, OutputAccount, OutputTransfer, VMOutput,
};

use crate::contexts::managed_types::EllipticCurveParams;
use crate::errors::VMError;
use crate::hooks::{
    BlockchainHook, BuiltinFunctionContainer, EsdtTokenData, ParsedEsdtTransfers, VMCrypto,
};
use crate::host::{VmHost, VmHostParameters};
use crate::testing::MockEngine;

#[derive(Clone, Default)]
pub struct MockAccount {
    pub nonce: u64,
    pub balance: BigUint,
    pub code: Vec<u8>,
    pub code_metadata: Vec<u8>,
    pub owner: Address,
    pub storage: FxHashMap<Vec<u8>, Vec<u8>>,
    pub shard_id: u32,
    pub payable: bool,
    pub esdt: FxHashMap<(Vec<u8>, u64), BigUint>,
}

#[derive(Clone, Default)]
struct WorldState {
    accounts: FxHashMap<Address, MockAccount>,
    new_addresses: FxHashMap<(Address, u64), Address>,
    block_timestamp: u64,
    block_nonce: u64,
    block_round: u64,
    block_epoch: u64,
    state_root: Vec<u8>,
    snapshots: Vec<FxHashMap<Address, MockAccount>>,
}

/// The mock world doubles as the blockchain hook. Cloning shares state.
#[derive(Clone, Default)]
pub struct MockWorld {
    state: Rc<RefCell<WorldState>>,
    pub engine: MockEngine,
    pub builtins: MockBuiltins,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_account(&mut self, address: Address, balance: u64) -> &mut Self {
        self.state.borrow_mut().accounts.insert(
            address,
            MockAccount {
                balance: BigUint::from(balance),
                payable: true,
                ..Default::default()
            },
        );
        self
    }

    /// Registers an account with code and a mock contract behind it.
    pub fn deploy_contract(
        &mut self,
        address: Address,
        balance: u64,
        contract: crate::testing::MockContract,
    ) {
        // code bytes only need to be unique per address
        let code = address.to_vec();
        self.create_account(address, balance);
        self.state
            .borrow_mut()
            .accounts
            .get_mut(&address)
            .expect("account just created")
            .code = code.clone();
        self.engine.register_contract(code, contract);
    }

    pub fn set_account_shard(&mut self, address: Address, shard_id: u32) {
        if let Some(account) = self.state.borrow_mut().accounts.get_mut(&address) {
            account.shard_id = shard_id;
        }
    }

    pub fn set_account_payable(&mut self, address: Address, payable: bool) {
        if let Some(account) = self.state.borrow_mut().accounts.get_mut(&address) {
            account.payable = payable;
        }
    }

    pub fn set_account_storage(&mut self, address: Address, key: &[u8], value: &[u8]) {
        if let Some(account) = self.state.borrow_mut().accounts.get_mut(&address) {
            account.storage.insert(key.to_vec(), value.to_vec());
        }
    }

    pub fn set_account_esdt(&mut self, address: Address, token: &[u8], nonce: u64, value: u64) {
        if let Some(account) = self.state.borrow_mut().accounts.get_mut(&address) {
            account
                .esdt
                .insert((token.to_vec(), nonce), BigUint::from(value));
        }
    }

    pub fn register_new_address(&mut self, creator: Address, nonce: u64, new_address: Address) {
        self.state
            .borrow_mut()
            .new_addresses
            .insert((creator, nonce), new_address);
    }

    pub fn set_block_info(&mut self, timestamp: u64, nonce: u64, round: u64, epoch: u64) {
        let mut state = self.state.borrow_mut();
        state.block_timestamp = timestamp;
        state.block_nonce = nonce;
        state.block_round = round;
        state.block_epoch = epoch;
    }

    pub fn account(&self, address: &Address) -> Option<MockAccount> {
        self.state.borrow().accounts.get(address).cloned()
    }

    /// A host wired to this world with the all-ones test gas schedule.
    pub fn new_host(&self) -> VmHost {
        self.new_host_with_parameters(VmHostParameters::default())
    }

    pub fn new_host_with_parameters(&self, parameters: VmHostParameters) -> VmHost {
        VmHost::new(
            Rc::new(self.clone()),
            Rc::new(self.engine.clone()),
            Rc::new(MockCrypto),
            Rc::new(self.builtins.clone()),
            parameters,
        )
        .expect("host construction")
    }
}

impl BlockchainHook for MockWorld {
    fn account_exists(&self, address: &Address) -> bool {
        self.state.borrow().accounts.contains_key(address)
    }

    fn new_address(
        &self,
        creator: &Address,
        creator_nonce: u64,
        _vm_type: &[u8],
    ) -> Result<Address, VMError> {
        if let Some(address) = self
            .state
            .borrow()
            .new_addresses
            .get(&(*creator, creator_nonce))
        {
            return Ok(*address);
        }
        // deterministic fallback derivation
        let mut bytes = creator.0;
        bytes[0] = bytes[0].wrapping_add(creator_nonce as u8).wrapping_add(1);
        Ok(Address(bytes))
    }

    fn get_balance(&self, address: &Address) -> BigUint {
        self.state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.balance.clone())
            .unwrap_or_default()
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.nonce)
            .unwrap_or(0)
    }

    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Result<Vec<u8>, VMError> {
        Ok(self
            .state
            .borrow()
            .accounts
            .get(address)
            .and_then(|account| account.storage.get(key).cloned())
            .unwrap_or_default())
    }

    fn is_smart_contract(&self, address: &Address) -> bool {
        self.state
            .borrow()
            .accounts
            .get(address)
            .map(|account| !account.code.is_empty())
            .unwrap_or(false)
    }

    fn is_payable(&self, address: &Address) -> Result<bool, VMError> {
        Ok(self
            .state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.payable)
            .unwrap_or(true))
    }

    fn get_code(&self, address: &Address) -> Result<Vec<u8>, VMError> {
        self.state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.code.clone())
            .ok_or(VMError::ContractNotFound)
    }

    fn get_code_metadata(&self, address: &Address) -> Result<Vec<u8>, VMError> {
        Ok(self
            .state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.code_metadata.clone())
            .unwrap_or_default())
    }

    fn get_owner_address(&self, address: &Address) -> Result<Address, VMError> {
        self.state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.owner)
            .ok_or(VMError::ContractNotFound)
    }

    fn get_shard_of_address(&self, address: &Address) -> u32 {
        self.state
            .borrow()
            .accounts
            .get(address)
            .map(|account| account.shard_id)
            .unwrap_or(0)
    }

    fn get_block_hash(&self, nonce: u64) -> Vec<u8> {
        let mut hash = vec![0u8; warx_common::HASH_LEN];
        hash[..8].copy_from_slice(&nonce.to_be_bytes());
        hash
    }

    fn current_timestamp(&self) -> u64 {
        self.state.borrow().block_timestamp
    }

    fn current_nonce(&self) -> u64 {
        self.state.borrow().block_nonce
    }

    fn current_round(&self) -> u64 {
        self.state.borrow().block_round
    }

    fn current_epoch(&self) -> u64 {
        self.state.borrow().block_epoch
    }

    fn current_random_seed(&self) -> Vec<u8> {
        vec![7u8; warx_common::HASH_LEN]
    }

    fn last_timestamp(&self) -> u64 {
        self.state.borrow().block_timestamp.saturating_sub(6)
    }

    fn last_nonce(&self) -> u64 {
        self.state.borrow().block_nonce.saturating_sub(1)
    }

    fn last_round(&self) -> u64 {
        self.state.borrow().block_round.saturating_sub(1)
    }

    fn last_epoch(&self) -> u64 {
        self.state.borrow().block_epoch
    }

    fn last_random_seed(&self) -> Vec<u8> {
        vec![6u8; warx_common::HASH_LEN]
    }

    fn get_state_root_hash(&self) -> Vec<u8> {
        let root = self.state.borrow().state_root.clone();
        if root.is_empty() {
            vec![3u8; warx_common::HASH_LEN]
        } else {
            root
        }
    }

    fn get_esdt_token(
        &self,
        address: &Address,
        token_id: &[u8],
        nonce: u64,
    ) -> Result<EsdtTokenData, VMError> {
        let value = self
            .state
            .borrow()
            .accounts
            .get(address)
            .and_then(|account| account.esdt.get(&(token_id.to_vec(), nonce)).cloned())
            .unwrap_or_default();
        Ok(EsdtTokenData {
            value,
            name: token_id.to_vec(),
            ..Default::default()
        })
    }

    /// A minimal ESDT-transfer builtin: moves the token balance and
    /// reports the move as an output transfer on the receiving account.
    fn process_builtin_function(&self, input: &ContractCallInput) -> Result<VMOutput, VMError> {
        let parsed = self.builtins.parse_esdt_transfers(
            &input.vm_input.caller_addr,
            &input.recipient_addr,
            &input.function,
            &input.vm_input.arguments,
        )?;

        let sender = input.vm_input.caller_addr;
        let receiver = parsed.receiver;
        {
            let mut state = self.state.borrow_mut();
            for transfer in &parsed.transfers {
                let key = (transfer.token_name.clone(), transfer.token_nonce);
                let sender_balance = state
                    .accounts
                    .get(&sender)
                    .and_then(|account| account.esdt.get(&key).cloned())
                    .unwrap_or_default();
                if sender_balance < transfer.value {
                    return Err(VMError::FailedTransfer);
                }
                if let Some(account) = state.accounts.get_mut(&sender) {
                    account.esdt.insert(key.clone(), sender_balance - &transfer.value);
                }
                let receiver_account = state.accounts.entry(receiver).or_default();
                let receiver_balance = receiver_account.esdt.entry(key).or_default();
                *receiver_balance += &transfer.value;
            }
        }

        let mut vm_output = VMOutput {
            gas_remaining: input.vm_input.gas_provided / 2,
            ..Default::default()
        };
        let account = vm_output
            .output_accounts
            .entry(receiver)
            .or_insert_with(|| OutputAccount::new(receiver));
        account.output_transfers.push(OutputTransfer {
            value: BigUint::default(),
            gas_limit: 0,
            gas_locked: 0,
            data: crate::call_args::build_call_data(&input.function, &input.vm_input.arguments),
            call_type: input.vm_input.call_type,
            sender_address: sender,
        });
        Ok(vm_output)
    }

    fn get_snapshot(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        let accounts = state.accounts.clone();
        state.snapshots.push(accounts);
        state.snapshots.len() as u64
    }

    fn revert_to_snapshot(&self, snapshot: u64) -> Result<(), VMError> {
        let mut state = self.state.borrow_mut();
        if snapshot == 0 || snapshot as usize > state.snapshots.len() {
            return Err(VMError::BlockchainHook("unknown snapshot".to_string()));
        }
        state.snapshots.truncate(snapshot as usize);
        let accounts = state
            .snapshots
            .pop()
            .ok_or_else(|| VMError::BlockchainHook("unknown snapshot".to_string()))?;
        state.accounts = accounts;
        Ok(())
    }
}

/// Builtin container recognizing the canonical token-transfer functions.
#[derive(Clone)]
pub struct MockBuiltins {
    names: HashSet<String>,
}

impl Default for MockBuiltins {
    fn default() -> Self {
        let names = ["ESDTTransfer", "ESDTNFTTransfer", "MultiESDTNFTTransfer"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        MockBuiltins { names }
    }
}

impl BuiltinFunctionContainer for MockBuiltins {
    fn is_builtin_function(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn parse_esdt_transfers(
        &self,
        _sender: &Address,
        destination: &Address,
        function: &str,
        args: &[Vec<u8>],
    ) -> Result<ParsedEsdtTransfers, VMError> {
        match function {
            "ESDTTransfer" => {
                if args.len() < 2 {
                    return Err(VMError::FailedTransfer);
                }
                let transfer = EsdtTransfer::fungible(
                    args[0].clone(),
                    BigUint::from_bytes_be(&args[1]),
                );
                let (call_function, call_args) = split_call(&args[2..]);
                Ok(ParsedEsdtTransfers {
                    transfers: vec![transfer],
                    receiver: *destination,
                    call_function,
                    call_args,
                })
            }
            "ESDTNFTTransfer" => {
                if args.len() < 4 {
                    return Err(VMError::FailedTransfer);
                }
                use num_traits::ToPrimitive;
                let nonce = BigUint::from_bytes_be(&args[1]).to_u64().unwrap_or(0);
                let transfer = EsdtTransfer {
                    token_name: args[0].clone(),
                    token_nonce: nonce,
                    value: BigUint::from_bytes_be(&args[2]),
                    token_type: warx_common::EsdtTokenType::NonFungible,
                };
                let receiver =
                    Address::from_slice(&args[3]).map_err(|_| VMError::FailedTransfer)?;
                let (call_function, call_args) = split_call(&args[4..]);
                Ok(ParsedEsdtTransfers {
                    transfers: vec![transfer],
                    receiver,
                    call_function,
                    call_args,
                })
            }
            _ => Err(VMError::FunctionNotFound),
        }
    }
}

fn split_call(rest: &[Vec<u8>]) -> (String, Vec<Vec<u8>>) {
    match rest.split_first() {
        Some((function, args)) => (
            String::from_utf8_lossy(function).into_owned(),
            args.to_vec(),
        ),
        None => (String::new(), Vec::new()),
    }
}

/// Toy crypto: deterministic folds for hashes, first-byte flags for
/// signatures, component-wise arithmetic for curve points.
pub struct MockCrypto;

fn fold_hash(seed: u8, width: usize, data: &[u8]) -> Vec<u8> {
    let mut out = vec![seed; width];
    for (index, byte) in data.iter().enumerate() {
        out[index % width] ^= *byte;
        out[(index + 1) % width] = out[(index + 1) % width].wrapping_add(*byte);
    }
    out
}

impl VMCrypto for MockCrypto {
    fn sha256(&self, data: &[u8]) -> Result<Vec<u8>, VMError> {
        Ok(fold_hash(0x51, 32, data))
    }

    fn keccak256(&self, data: &[u8]) -> Result<Vec<u8>, VMError> {
        Ok(fold_hash(0xA3, 32, data))
    }

    fn ripemd160(&self, data: &[u8]) -> Result<Vec<u8>, VMError> {
        Ok(fold_hash(0x2C, 20, data))
    }

    fn verify_bls(&self, _key: &[u8], _message: &[u8], signature: &[u8]) -> Result<(), VMError> {
        verify_by_flag(signature)
    }

    fn verify_ed25519(&self, _key: &[u8], _message: &[u8], signature: &[u8]) -> Result<(), VMError> {
        verify_by_flag(signature)
    }

    fn verify_secp256k1(
        &self,
        _key: &[u8],
        _message: &[u8],
        signature: &[u8],
    ) -> Result<(), VMError> {
        // DER header first
        if signature.len() < 2 || signature[0] != 0x30 {
            return Err(VMError::SignatureVerificationFailed);
        }
        verify_by_flag(&signature[2..])
    }

    fn ec_add(
        &self,
        _curve: &EllipticCurveParams,
        x1: &BigInt,
        y1: &BigInt,
        x2: &BigInt,
        y2: &BigInt,
    ) -> Result<(BigInt, BigInt), VMError> {
        Ok((x1 + x2, y1 + y2))
    }

    fn ec_double(
        &self,
        _curve: &EllipticCurveParams,
        x: &BigInt,
        y: &BigInt,
    ) -> Result<(BigInt, BigInt), VMError> {
        Ok((x * 2, y * 2))
    }

    fn ec_is_on_curve(
        &self,
        _curve: &EllipticCurveParams,
        x: &BigInt,
        y: &BigInt,
    ) -> Result<bool, VMError> {
        use num_traits::Signed;
        Ok(!x.is_negative() && !y.is_negative())
    }

    fn ec_scalar_mult(
        &self,
        _curve: &EllipticCurveParams,
        x: &BigInt,
        y: &BigInt,
        scalar: &[u8],
    ) -> Result<(BigInt, BigInt), VMError> {
        let factor = BigInt::from(scalar.iter().map(|b| *b as u64).sum::<u64>() + 1);
        Ok((x * &factor, y * factor))
    }

    fn ec_scalar_base_mult(
        &self,
        curve: &EllipticCurveParams,
        scalar: &[u8],
    ) -> Result<(BigInt, BigInt), VMError> {
        let factor = BigInt::from(scalar.iter().map(|b| *b as u64).sum::<u64>() + 1);
        Ok((&curve.gx + &factor, &curve.gy + factor))
    }
}

/// A signature whose first byte is 1 verifies; everything else fails.
fn verify_by_flag(signature: &[u8]) -> Result<(), VMError> {
    if signature.first() == Some(&1) {
        Ok(())
    } else {
        Err(VMError::SignatureVerificationFailed)
    }
}
