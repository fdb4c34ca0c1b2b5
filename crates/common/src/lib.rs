//! Shared primitive types of the Warx VM: addresses, call inputs, VM
//! outputs and the small numeric codecs they rely on.
//!
//! Everything in this crate is plain data; the execution semantics live in
//! `warx-vm`.

pub mod call_input;
pub mod math;
pub mod twos;
pub mod types;
pub mod vm_output;

pub use call_input::*;
pub use types::*;
pub use vm_output::*;
