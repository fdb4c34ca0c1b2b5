//! Mock WASM engine and instances. A mock contract maps export names to
//! Rust closures; the closure receives the host and drives the same
//! host-function surface a compiled module would.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::errors::VMError;
use crate::gas_schedule::WasmOpcodeCost;
use crate::host::VmHost;
use crate::wasm_engine::{BreakpointValue, InstanceOptions, WasmEngine, WasmInstance};

pub type ExportFn = Rc<dyn Fn(&mut VmHost) -> Result<(), VMError>>;

/// A contract definition: exports plus validation flags the mock engine
/// reports for it.
#[derive(Clone, Default)]
pub struct MockContract {
    exports: FxHashMap<String, ExportFn>,
    missing_memory: bool,
    invalid_code: bool,
}

impl MockContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export(
        mut self,
        name: &str,
        body: impl Fn(&mut VmHost) -> Result<(), VMError> + 'static,
    ) -> Self {
        self.exports.insert(name.to_string(), Rc::new(body));
        self
    }

    /// Simulates a module without a memory export.
    pub fn without_memory(mut self) -> Self {
        self.missing_memory = true;
        self
    }

    /// Simulates a module the engine rejects at compile time (floating
    /// point, too many locals, unknown imports).
    pub fn invalid(mut self) -> Self {
        self.invalid_code = true;
        self
    }
}

const MOCK_MEMORY_SIZE: usize = 65536;

pub struct MockInstance {
    exports: FxHashMap<String, ExportFn>,
    memory: RefCell<Vec<u8>>,
    points_used: Cell<u64>,
    breakpoint: Cell<BreakpointValue>,
    has_memory: bool,
}

impl MockInstance {
    fn from_contract(contract: &MockContract) -> Self {
        MockInstance {
            exports: contract.exports.clone(),
            memory: RefCell::new(vec![0u8; MOCK_MEMORY_SIZE]),
            points_used: Cell::new(0),
            breakpoint: Cell::new(BreakpointValue::None),
            has_memory: !contract.missing_memory,
        }
    }

    /// An instance with no exports, for plumbing tests that only need
    /// metering and memory.
    pub fn bare() -> Self {
        MockInstance {
            exports: FxHashMap::default(),
            memory: RefCell::new(vec![0u8; MOCK_MEMORY_SIZE]),
            points_used: Cell::new(0),
            breakpoint: Cell::new(BreakpointValue::None),
            has_memory: true,
        }
    }
}

impl WasmInstance for MockInstance {
    fn call_export(&self, host: &mut VmHost, func_name: &str) -> Result<(), VMError> {
        let export = self
            .exports
            .get(func_name)
            .cloned()
            .ok_or(VMError::FunctionNotFound)?;
        export(host)
    }

    fn has_memory(&self) -> bool {
        self.has_memory
    }

    fn exported_functions(&self) -> Vec<String> {
        self.exports.keys().cloned().collect()
    }

    fn mem_load(&self, offset: i32, length: i32) -> Result<Vec<u8>, VMError> {
        if offset < 0 || length < 0 {
            return Err(VMError::MemoryOutOfBounds);
        }
        let memory = self.memory.borrow();
        let start = offset as usize;
        let end = start
            .checked_add(length as usize)
            .ok_or(VMError::MemoryOutOfBounds)?;
        memory
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or(VMError::MemoryOutOfBounds)
    }

    fn mem_store(&self, offset: i32, data: &[u8]) -> Result<(), VMError> {
        if offset < 0 {
            return Err(VMError::MemoryOutOfBounds);
        }
        let mut memory = self.memory.borrow_mut();
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .ok_or(VMError::MemoryOutOfBounds)?;
        if end > memory.len() {
            return Err(VMError::MemoryOutOfBounds);
        }
        memory[start..end].copy_from_slice(data);
        Ok(())
    }

    fn get_points_used(&self) -> u64 {
        self.points_used.get()
    }

    fn set_points_used(&self, points: u64) {
        self.points_used.set(points);
    }

    fn get_breakpoint_value(&self) -> BreakpointValue {
        self.breakpoint.get()
    }

    fn set_breakpoint_value(&self, value: BreakpointValue) {
        self.breakpoint.set(value);
    }
}

/// Engine serving contracts registered by code bytes.
#[derive(Clone, Default)]
pub struct MockEngine {
    contracts: Rc<RefCell<FxHashMap<Vec<u8>, MockContract>>>,
    opcode_costs_set: Rc<Cell<u64>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_contract(&self, code: Vec<u8>, contract: MockContract) {
        self.contracts.borrow_mut().insert(code, contract);
    }

    /// How many times the opcode-cost table was pushed to the engine.
    pub fn opcode_cost_updates(&self) -> u64 {
        self.opcode_costs_set.get()
    }
}

impl WasmEngine for MockEngine {
    fn new_instance(
        &self,
        code: &[u8],
        _options: &InstanceOptions,
    ) -> Result<Rc<dyn WasmInstance>, VMError> {
        let contracts = self.contracts.borrow();
        let contract = contracts.get(code).ok_or(VMError::ContractInvalid)?;
        if contract.invalid_code {
            return Err(VMError::ContractInvalid);
        }
        Ok(Rc::new(MockInstance::from_contract(contract)))
    }

    fn set_opcode_costs(&self, _costs: &WasmOpcodeCost) {
        self.opcode_costs_set.set(self.opcode_costs_set.get() + 1);
    }
}
