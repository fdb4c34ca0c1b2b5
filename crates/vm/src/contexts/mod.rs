//! The execution contexts of the host. Each context owns a *current*
//! value plus a stack of prior snapshots; the call dispatcher pushes a
//! snapshot when entering a nested frame and pops it (restore, discard or
//! merge) when the frame ends.

pub mod blockchain;
pub mod managed_types;
pub mod metering;
pub mod output;
pub mod runtime;
pub mod storage;

pub use blockchain::BlockchainContext;
pub use managed_types::ManagedTypesContext;
pub use metering::MeteringContext;
pub use output::OutputContext;
pub use runtime::RuntimeContext;
pub use storage::StorageContext;
