//! Gas-cost configuration.
//!
//! The schedule is loaded from a two-level map of named unsigned costs
//! (section name → cost name → value), the shape in which node operators
//! ship gas-schedule files. Construction fails if any required key is
//! missing. The WASM opcode section is passed through to the engine as-is.

use rustc_hash::FxHashMap;

pub type GasScheduleMap = FxHashMap<String, FxHashMap<String, u64>>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GasScheduleError {
    #[error("gas schedule section missing: {0}")]
    MissingSection(String),
    #[error("gas schedule key missing: {section}.{key}")]
    MissingKey { section: String, key: String },
}

macro_rules! gas_section {
    ($name:ident, $section:literal, { $($field:ident => $key:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: u64,)+
        }

        impl $name {
            pub const SECTION: &'static str = $section;

            pub fn from_map(map: &GasScheduleMap) -> Result<Self, GasScheduleError> {
                let section = map
                    .get($section)
                    .ok_or_else(|| GasScheduleError::MissingSection($section.to_string()))?;
                Ok($name {
                    $($field: *section.get($key).ok_or_else(|| GasScheduleError::MissingKey {
                        section: $section.to_string(),
                        key: $key.to_string(),
                    })?,)+
                })
            }

            pub fn fill_map(map: &mut GasScheduleMap, value: u64) {
                let section = map.entry($section.to_string()).or_default();
                $(section.insert($key.to_string(), value);)+
            }
        }
    };
}

gas_section!(BaseOperationCost, "BaseOperationCost", {
    store_per_byte => "StorePerByte",
    release_per_byte => "ReleasePerByte",
    data_copy_per_byte => "DataCopyPerByte",
    persist_per_byte => "PersistPerByte",
    compile_per_byte => "CompilePerByte",
    aot_prepare_per_byte => "AoTPreparePerByte",
    get_code => "GetCode",
});

gas_section!(BaseApiCost, "ElrondAPICost", {
    get_sc_address => "GetSCAddress",
    get_owner_address => "GetOwnerAddress",
    is_smart_contract => "IsSmartContract",
    get_shard_of_address => "GetShardOfAddress",
    get_external_balance => "GetExternalBalance",
    get_block_hash => "GetBlockHash",
    get_original_tx_hash => "GetOriginalTxHash",
    transfer_value => "TransferValue",
    get_argument => "GetArgument",
    get_function => "GetFunction",
    get_num_arguments => "GetNumArguments",
    storage_store => "StorageStore",
    storage_load => "StorageLoad",
    get_caller => "GetCaller",
    get_call_value => "GetCallValue",
    check_no_payment => "CheckNoPayment",
    log => "Log",
    finish => "Finish",
    signal_error => "SignalError",
    get_gas_left => "GetGasLeft",
    get_block_timestamp => "GetBlockTimeStamp",
    get_block_nonce => "GetBlockNonce",
    get_block_round => "GetBlockRound",
    get_block_epoch => "GetBlockEpoch",
    get_block_random_seed => "GetBlockRandomSeed",
    get_state_root_hash => "GetStateRootHash",
    execute_on_same_context => "ExecuteOnSameContext",
    execute_on_dest_context => "ExecuteOnDestContext",
    delegate_execution => "DelegateExecution",
    execute_read_only => "ExecuteReadOnly",
    async_call_step => "AsyncCallStep",
    async_callback_gas_lock => "AsyncCallbackGasLock",
    create_contract => "CreateContract",
    get_return_data_size => "GetReturnDataSize",
    get_return_data => "GetReturnData",
    get_num_return_data => "GetNumReturnData",
    int64_get_argument => "Int64GetArgument",
    int64_finish => "Int64Finish",
    int64_storage_store => "Int64StorageStore",
    int64_storage_load => "Int64StorageLoad",
});

gas_section!(BigIntApiCost, "BigIntAPICost", {
    big_int_new => "BigIntNew",
    big_int_byte_length => "BigIntByteLength",
    big_int_get_bytes => "BigIntGetBytes",
    big_int_set_bytes => "BigIntSetBytes",
    big_int_is_int64 => "BigIntIsInt64",
    big_int_get_int64 => "BigIntGetInt64",
    big_int_set_int64 => "BigIntSetInt64",
    big_int_add => "BigIntAdd",
    big_int_sub => "BigIntSub",
    big_int_mul => "BigIntMul",
    big_int_t_div => "BigIntTDiv",
    big_int_t_mod => "BigIntTMod",
    big_int_e_div => "BigIntEDiv",
    big_int_e_mod => "BigIntEMod",
    big_int_sqrt => "BigIntSqrt",
    big_int_pow => "BigIntPow",
    big_int_log => "BigIntLog",
    big_int_abs => "BigIntAbs",
    big_int_neg => "BigIntNeg",
    big_int_sign => "BigIntSign",
    big_int_cmp => "BigIntCmp",
    big_int_not => "BigIntNot",
    big_int_and => "BigIntAnd",
    big_int_or => "BigIntOr",
    big_int_xor => "BigIntXor",
    big_int_shr => "BigIntShr",
    big_int_shl => "BigIntShl",
    big_int_finish_signed => "BigIntFinishSigned",
    big_int_finish_unsigned => "BigIntFinishUnsigned",
    big_int_storage_store => "BigIntStorageStoreUnsigned",
    big_int_storage_load => "BigIntStorageLoadUnsigned",
    big_int_get_argument => "BigIntGetArgument",
    big_int_get_call_value => "BigIntGetCallValue",
    big_int_get_external_balance => "BigIntGetExternalBalance",
});

gas_section!(CryptoApiCost, "CryptoAPICost", {
    sha256 => "SHA256",
    keccak256 => "Keccak256",
    ripemd160 => "Ripemd160",
    verify_bls => "VerifyBLS",
    verify_ed25519 => "VerifyEd25519",
    verify_secp256k1 => "VerifySecp256k1",
    ecc_add => "EllipticCurveAdd",
    ecc_double => "EllipticCurveDouble",
    ecc_is_on_curve => "EllipticCurveIsOnCurve",
    ecc_scalar_mult => "EllipticCurveScalarMult",
    ecc_scalar_base_mult => "EllipticCurveScalarBaseMult",
    ecc_unmarshal_compressed => "EllipticCurveUnmarshalCompressed",
    ecc_new => "EllipticCurveNew",
});

gas_section!(ManagedBufferApiCost, "ManagedBufferAPICost", {
    m_buffer_new => "MBufferNew",
    m_buffer_new_from_bytes => "MBufferNewFromBytes",
    m_buffer_set_bytes => "MBufferSetBytes",
    m_buffer_get_bytes => "MBufferGetBytes",
    m_buffer_append => "MBufferAppend",
    m_buffer_get_length => "MBufferGetLength",
    m_buffer_copy_byte_slice => "MBufferCopyByteSlice",
    m_buffer_set_byte_slice => "MBufferSetByteSlice",
    m_buffer_finish => "MBufferFinish",
    m_buffer_storage_store => "MBufferStorageStore",
    m_buffer_storage_load => "MBufferStorageLoad",
    m_buffer_get_argument => "MBufferGetArgument",
    m_buffer_to_big_int => "MBufferToBigIntUnsigned",
    m_buffer_from_big_int => "MBufferFromBigIntUnsigned",
});

/// Per-opcode instruction costs, owned by the WASM engine. The host only
/// forwards this table; it never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WasmOpcodeCost(pub FxHashMap<String, u64>);

pub const WASM_OPCODE_COST_SECTION: &str = "WASMOpcodeCost";

/// The complete gas schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasCost {
    pub base_operation_cost: BaseOperationCost,
    pub base_api_cost: BaseApiCost,
    pub big_int_api_cost: BigIntApiCost,
    pub crypto_api_cost: CryptoApiCost,
    pub managed_buffer_api_cost: ManagedBufferApiCost,
    pub wasm_opcode_cost: WasmOpcodeCost,
}

impl GasCost {
    pub fn from_map(map: &GasScheduleMap) -> Result<Self, GasScheduleError> {
        let wasm_opcode_cost = map
            .get(WASM_OPCODE_COST_SECTION)
            .map(|section| WasmOpcodeCost(section.clone()))
            .ok_or_else(|| GasScheduleError::MissingSection(WASM_OPCODE_COST_SECTION.into()))?;

        Ok(GasCost {
            base_operation_cost: BaseOperationCost::from_map(map)?,
            base_api_cost: BaseApiCost::from_map(map)?,
            big_int_api_cost: BigIntApiCost::from_map(map)?,
            crypto_api_cost: CryptoApiCost::from_map(map)?,
            managed_buffer_api_cost: ManagedBufferApiCost::from_map(map)?,
            wasm_opcode_cost,
        })
    }
}

/// A complete schedule with every cost set to `value`, for tests and local
/// tooling.
pub fn make_gas_map(value: u64) -> GasScheduleMap {
    let mut map = GasScheduleMap::default();
    BaseOperationCost::fill_map(&mut map, value);
    BaseApiCost::fill_map(&mut map, value);
    BigIntApiCost::fill_map(&mut map, value);
    CryptoApiCost::fill_map(&mut map, value);
    ManagedBufferApiCost::fill_map(&mut map, value);
    map.entry(WASM_OPCODE_COST_SECTION.to_string())
        .or_default()
        .insert("Unreachable".to_string(), value);
    map
}

/// Every cost set to 1, the conventional schedule for unit tests.
pub fn make_gas_map_for_tests() -> GasScheduleMap {
    make_gas_map(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_map_accepts_complete_schedule() {
        let map = make_gas_map_for_tests();
        let cost = GasCost::from_map(&map).unwrap();
        assert_eq!(cost.base_operation_cost.data_copy_per_byte, 1);
        assert_eq!(cost.base_api_cost.async_call_step, 1);
        assert_eq!(cost.big_int_api_cost.big_int_t_div, 1);
        assert_eq!(cost.crypto_api_cost.ecc_scalar_mult, 1);
        assert_eq!(cost.managed_buffer_api_cost.m_buffer_append, 1);
    }

    #[test]
    fn from_map_fails_on_missing_key() {
        let mut map = make_gas_map_for_tests();
        map.get_mut("BigIntAPICost").unwrap().remove("BigIntTDiv");
        let err = GasCost::from_map(&map).unwrap_err();
        assert_eq!(
            err,
            GasScheduleError::MissingKey {
                section: "BigIntAPICost".into(),
                key: "BigIntTDiv".into()
            }
        );
    }

    #[test]
    fn from_map_fails_on_missing_section() {
        let mut map = make_gas_map_for_tests();
        map.remove("CryptoAPICost");
        assert!(matches!(
            GasCost::from_map(&map),
            Err(GasScheduleError::MissingSection(section)) if section == "CryptoAPICost"
        ));
    }
}
