//! Metered storage access: the overlay of dirty writes in the output
//! accounts over the blockchain hook's persisted state.

use warx_common::math;
use warx_common::{Address, StorageUpdate};

use crate::contexts::storage::StorageStatus;
use crate::errors::VMError;
use crate::host::VmHost;

impl VmHost {
    /// Metered read from the current contract's storage. An unset key
    /// reads as an empty byte sequence.
    pub fn storage_load(&mut self, key: &[u8]) -> Vec<u8> {
        let base = self.gas_schedule().base_api_cost.storage_load;
        self.use_gas(base);
        let data = self.storage_load_unmetered(key);
        let copy_cost = math::mul_u64(
            self.gas_schedule().base_operation_cost.data_copy_per_byte,
            data.len() as u64,
        );
        self.use_gas(copy_cost);
        data
    }

    /// Unmetered read, for host-internal bookkeeping.
    pub fn storage_load_unmetered(&self, key: &[u8]) -> Vec<u8> {
        self.storage_load_from_address_unmetered(&self.storage.address(), key)
    }

    /// Read-only cross-account load.
    pub fn storage_load_from_address(&mut self, address: &Address, key: &[u8]) -> Vec<u8> {
        let base = self.gas_schedule().base_api_cost.storage_load;
        self.use_gas(base);
        let data = self.storage_load_from_address_unmetered(address, key);
        let copy_cost = math::mul_u64(
            self.gas_schedule().base_operation_cost.data_copy_per_byte,
            data.len() as u64,
        );
        self.use_gas(copy_cost);
        data
    }

    fn storage_load_from_address_unmetered(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        if let Some(account) = self.output.account(address) {
            if let Some(update) = account.storage_updates.get(key) {
                if update.written {
                    return update.data.clone();
                }
            }
        }
        self.blockchain
            .hook()
            .get_storage_data(address, key)
            .unwrap_or_default()
    }

    /// Guest-facing write; protected keys are off limits.
    pub fn storage_store(&mut self, key: &[u8], value: &[u8]) -> Result<StorageStatus, VMError> {
        if self.storage.is_protected_key(key) {
            return Err(VMError::StoreReservedKey);
        }
        self.storage_store_internal(key, value)
    }

    /// Host-internal write beneath the protected prefix (async records,
    /// time locks).
    pub fn set_protected_storage(
        &mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<StorageStatus, VMError> {
        self.storage_store_internal(key, value)
    }

    fn storage_store_internal(&mut self, key: &[u8], value: &[u8]) -> Result<StorageStatus, VMError> {
        if self.runtime.read_only() {
            return Err(VMError::CannotWriteOnReadOnly);
        }

        let address = self.storage.address();
        let old_value = self.storage_load_unmetered(key);
        let schedule = self.gas_schedule().base_operation_cost.clone();

        let status = if old_value == value {
            StorageStatus::Unchanged
        } else if value.is_empty() {
            self.free_gas(math::mul_u64(
                schedule.release_per_byte,
                old_value.len() as u64,
            ));
            StorageStatus::Deleted
        } else if old_value.is_empty() {
            self.use_gas(math::mul_u64(schedule.store_per_byte, value.len() as u64));
            StorageStatus::Added
        } else {
            self.use_gas(math::mul_u64(schedule.persist_per_byte, value.len() as u64));
            self.free_gas(math::mul_u64(
                schedule.release_per_byte,
                old_value.len() as u64,
            ));
            StorageStatus::Modified
        };

        if status != StorageStatus::Unchanged {
            let account = self.output_account(address);
            account.storage_updates.insert(
                key.to_vec(),
                StorageUpdate {
                    offset: key.to_vec(),
                    data: value.to_vec(),
                    written: true,
                },
            );
        }
        Ok(status)
    }
}
