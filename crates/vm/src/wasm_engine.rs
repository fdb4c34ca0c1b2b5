//! Contract between the host and the WASM engine.
//!
//! The engine compiles bytecode into instances, meters instructions and
//! honors runtime breakpoints; the host drives instances through these
//! traits and never touches engine internals. Instances use interior
//! mutability so the host can hold them behind `Rc` across re-entrant
//! calls.

use std::rc::Rc;

use crate::errors::VMError;
use crate::gas_schedule::WasmOpcodeCost;
use crate::host::VmHost;

/// VM-level flag that makes the engine halt execution at the next metering
/// check. Numeric values are fixed by the engine ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum BreakpointValue {
    #[default]
    None = 0,
    ExecutionFailed = 1,
    AsyncCall = 2,
    SignalError = 3,
    OutOfGas = 4,
}

/// Compilation options for one instance.
#[derive(Clone, Debug, Default)]
pub struct InstanceOptions {
    pub gas_limit: u64,
    /// Upper bound on locals declared by any single function; modules over
    /// the limit are rejected as invalid.
    pub max_wasm_locals: u64,
}

/// A loaded, executable WASM module bound to the host-function surface.
pub trait WasmInstance {
    /// Invokes an exported function. Host functions called by the guest
    /// re-enter the host through the `host` reference.
    fn call_export(&self, host: &mut VmHost, func_name: &str) -> Result<(), VMError>;

    fn has_memory(&self) -> bool;
    fn exported_functions(&self) -> Vec<String>;
    fn has_export(&self, name: &str) -> bool {
        self.exported_functions().iter().any(|f| f == name)
    }

    /// Reads `length` bytes of linear memory starting at `offset`.
    fn mem_load(&self, offset: i32, length: i32) -> Result<Vec<u8>, VMError>;
    /// Writes `data` into linear memory at `offset`, growing if the engine
    /// allows it.
    fn mem_store(&self, offset: i32, data: &[u8]) -> Result<(), VMError>;

    fn get_points_used(&self) -> u64;
    fn set_points_used(&self, points: u64);

    fn get_breakpoint_value(&self) -> BreakpointValue;
    fn set_breakpoint_value(&self, value: BreakpointValue);

    /// Releases engine-side resources. Called exactly once per frame pop.
    fn clean(&self) {}
}

/// Compiles bytecode into instances. A single engine serves the whole
/// nested-call stack of a host.
pub trait WasmEngine {
    /// Compiles and validates `code`. Modules with no memory export, with
    /// floating-point types or instructions, with more locals than
    /// `options.max_wasm_locals` in any function, or importing unknown
    /// host functions are rejected with `ContractInvalid`.
    fn new_instance(
        &self,
        code: &[u8],
        options: &InstanceOptions,
    ) -> Result<Rc<dyn WasmInstance>, VMError>;

    /// Atomically replaces the engine's opcode-cost table.
    fn set_opcode_costs(&self, costs: &WasmOpcodeCost);
}
