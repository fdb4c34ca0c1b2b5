//! # Warx VM executor host
//!
//! The execution core of a WASM smart-contract VM. Given a call input and
//! a blockchain state hook, it loads the callee's code, binds the
//! host-function surface to the WASM instance, executes the requested
//! entry point under gas metering and produces a structured [`VMOutput`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           VmHost                             │
//! │  ┌───────────┐ ┌──────────┐ ┌─────────┐ ┌────────────────┐  │
//! │  │  Runtime  │ │ Metering │ │ Output  │ │  ManagedTypes  │  │
//! │  └───────────┘ └──────────┘ └─────────┘ └────────────────┘  │
//! │  ┌───────────┐ ┌──────────┐    host functions (hostapi)     │
//! │  │  Storage  │ │Blockchain│                                 │
//! │  └───────────┘ └──────────┘                                 │
//! └──────────────────────────────────────────────────────────────┘
//!            │                │                  │
//!            ▼                ▼                  ▼
//!      WasmEngine       BlockchainHook       VMCrypto
//!      (external)         (external)        (external)
//! ```
//!
//! Each context keeps a *current* value and a stack of prior snapshots;
//! nested calls push before entering a child frame and pop (restore,
//! discard or merge) on the way out. Gas is reconciled on every successful
//! top-level run: the sum of per-account gas, outbound transfer gas and
//! the remaining gas must equal the provided gas.
//!
//! The WASM engine, the blockchain hook, the builtin-function container
//! and the cryptographic primitives are collaborators reached through
//! traits; `testing` provides in-repo mocks for all of them.

pub mod call_args;
pub mod contexts;
pub mod errors;
pub mod gas_schedule;
pub mod host;
pub mod hostapi;
pub mod hooks;
pub mod testing;
pub mod wasm_engine;

pub use errors::VMError;
pub use gas_schedule::{GasCost, GasScheduleMap};
pub use host::{VmHost, VmHostParameters};

pub use warx_common as common;
