//! In-repo mocks for the four external collaborators, used by unit and
//! integration tests alike. Contracts are plain Rust closures invoking
//! the host-function surface, so scenarios run without real bytecode.

pub mod instance;
pub mod world;

use std::rc::Rc;

use warx_common::{Address, ContractCallInput, VMInput, ADDRESS_LEN};

use crate::host::VmHost;

pub use instance::{MockContract, MockEngine, MockInstance};
pub use world::{MockBuiltins, MockCrypto, MockWorld};

/// Right-pads a short name into a full-width test address.
pub fn test_address(name: &[u8]) -> Address {
    let mut bytes = [b'.'; ADDRESS_LEN];
    let len = name.len().min(ADDRESS_LEN);
    bytes[..len].copy_from_slice(&name[..len]);
    Address(bytes)
}

/// Initializes the host contexts for a direct call frame against
/// `address`, with a bare instance so gas accounting has points to track.
/// Unit-test plumbing; full scenarios go through the public entry points.
pub fn start_direct_frame(host: &mut VmHost, address: Address, gas_provided: u64) {
    let input = ContractCallInput {
        vm_input: VMInput {
            caller_addr: test_address(b"caller"),
            gas_provided,
            ..Default::default()
        },
        recipient_addr: address,
        function: "test".to_string(),
    };
    host.init_contexts_from_call_input(&input);
    host.runtime_mut()
        .set_new_instance(Rc::new(MockInstance::bare()))
        .expect("instance limit in test frame");
}
