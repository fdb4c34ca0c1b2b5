use warx_common::ReturnCode;

use crate::gas_schedule::GasScheduleError;

/// Every failure the executor host can produce. Messages are stable: they
/// travel in VM outputs and are matched by downstream tooling.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VMError {
    // gas
    #[error("not enough gas")]
    NotEnoughGas,
    #[error("not enough gas for return data")]
    NotEnoughGasForReturnData,
    #[error("input and output gas does not match")]
    InputAndOutputGasDoesNotMatch,

    // memory
    #[error("memory access out of bounds")]
    MemoryOutOfBounds,
    #[error("bad bounds")]
    BadBounds,
    #[error("negative length")]
    NegativeLength,

    // handles
    #[error("no bigInt under the given handle")]
    NoBigIntUnderThisHandle,
    #[error("no managed buffer under the given handle")]
    NoManagedBufferUnderThisHandle,
    #[error("no elliptic curve under the given handle")]
    NoEllipticCurveUnderThisHandle,

    // arguments
    #[error("argument index out of range")]
    ArgIndexOutOfRange,
    #[error("argument out of range")]
    ArgOutOfRange,
    #[error("storage value out of range")]
    StorageValueOutOfRange,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // arithmetic
    #[error("division by zero")]
    DivZero,
    #[error("bad lower bounds")]
    BadLowerBounds,
    #[error("bitwise operations only allowed on positive integers")]
    BitwiseNegative,
    #[error("shift operations only allowed on positive integers and by a positive amount")]
    ShiftNegative,

    // transfers
    #[error("failed transfer")]
    FailedTransfer,
    #[error("function does not accept EGLD payment")]
    NonPayableFunctionEgld,
    #[error("function does not accept ESDT payment")]
    NonPayableFunctionEsdt,
    #[error("sending value to non payable contract")]
    AccountNotPayable,
    #[error("too many ESDT transfers")]
    TooManyEsdtTransfers,

    // calls
    #[error("contract not found")]
    ContractNotFound,
    #[error("function not found")]
    FunctionNotFound,
    #[error("cannot call init function directly")]
    InitFuncCalledInRun,
    #[error("cannot call callBack function directly")]
    CallBackFuncCalledInRun,
    #[error("sync execution request is not in the same shard")]
    SyncExecutionNotInSameShard,
    #[error("max instances reached")]
    MaxInstancesReached,
    #[error("nil callback function")]
    NilCallbackFunction,
    #[error("callback function not expected")]
    CallBackFuncNotExpected,

    // storage
    #[error("cannot write on read only mode")]
    CannotWriteOnReadOnly,
    #[error("the storage key is protected")]
    StoreReservedKey,

    // crypto
    #[error("invalid public key size")]
    InvalidPublicKeySize,
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    // execution
    #[error("execution failed")]
    ExecutionFailed,
    #[error("execution failed: {0}")]
    ExecutionPanicked(String),
    #[error("invalid contract code")]
    ContractInvalid,
    #[error("{0}")]
    SignalError(String),

    // internal, always fatal
    #[error("output account tracked for gas is missing")]
    MissingTrackedOutputAccount,
    #[error(transparent)]
    GasSchedule(#[from] GasScheduleError),
    #[error("blockchain hook error: {0}")]
    BlockchainHook(String),
}

impl VMError {
    /// Maps an execution error onto the return code reported in the VM
    /// output of a failed run.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            VMError::NotEnoughGas => ReturnCode::OutOfGas,
            VMError::FunctionNotFound | VMError::NilCallbackFunction => {
                ReturnCode::FunctionNotFound
            }
            VMError::ContractNotFound => ReturnCode::ContractNotFound,
            VMError::ContractInvalid => ReturnCode::ContractInvalid,
            VMError::SignalError(_)
            | VMError::InitFuncCalledInRun
            | VMError::CallBackFuncCalledInRun
            | VMError::NonPayableFunctionEgld
            | VMError::NonPayableFunctionEsdt => ReturnCode::UserError,
            _ => ReturnCode::ExecutionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_code_mapping() {
        assert_eq!(VMError::NotEnoughGas.return_code(), ReturnCode::OutOfGas);
        assert_eq!(
            VMError::FunctionNotFound.return_code(),
            ReturnCode::FunctionNotFound
        );
        assert_eq!(
            VMError::ContractInvalid.return_code(),
            ReturnCode::ContractInvalid
        );
        assert_eq!(
            VMError::SignalError("boom".into()).return_code(),
            ReturnCode::UserError
        );
        assert_eq!(
            VMError::MemoryOutOfBounds.return_code(),
            ReturnCode::ExecutionFailed
        );
    }

    #[test]
    fn messages_are_stable() {
        assert_eq!(VMError::NotEnoughGas.to_string(), "not enough gas");
        assert_eq!(
            VMError::SyncExecutionNotInSameShard.to_string(),
            "sync execution request is not in the same shard"
        );
        assert_eq!(
            VMError::SignalError("child error".into()).to_string(),
            "child error"
        );
    }
}
