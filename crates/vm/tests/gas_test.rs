//! Gas metering boundaries, schedule updates and the host-function edge
//! cases around argument and storage access.

use warx_vm::common::{Address, ContractCallInput, ReturnCode, VMInput};
use warx_vm::gas_schedule::make_gas_map_for_tests;
use warx_vm::hostapi::base_ops;
use warx_vm::testing::{start_direct_frame, test_address, MockContract, MockWorld};

fn call_input(caller: Address, recipient: Address, function: &str, gas: u64) -> ContractCallInput {
    ContractCallInput {
        vm_input: VMInput {
            caller_addr: caller,
            gas_provided: gas,
            ..Default::default()
        },
        recipient_addr: recipient,
        function: function.to_string(),
    }
}

#[test]
fn use_gas_bounded_fails_on_equality() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 1_000);

    let gas_left = host.gas_left();
    assert!(host.use_gas_bounded(gas_left).is_err());
    assert!(host.use_gas_bounded(gas_left - 1).is_ok());
    assert_eq!(host.gas_left(), 1);
}

#[test]
fn gas_left_is_clamped_at_zero() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 100);

    host.use_gas(5_000);
    assert_eq!(host.gas_left(), 0);
    host.restore_gas(5_000);
    assert_eq!(host.gas_left(), 100);
}

#[test]
fn bound_gas_limit_clamps_to_remaining() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 500);

    assert_eq!(host.bound_gas_limit(200), 200);
    assert_eq!(host.bound_gas_limit(5_000), 500);
    // a negative limit converts to a huge unsigned value and clamps
    assert_eq!(host.bound_gas_limit(-1), 500);
}

#[test]
fn storage_load_of_unset_key_is_empty() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 100_000);

    host.runtime().mem_store(0, b"nothere").unwrap();
    assert_eq!(base_ops::storage_load_length(&mut host, 0, 7), 0);
    assert_eq!(base_ops::storage_load(&mut host, 0, 7, 100), 0);
}

#[test]
fn get_argument_out_of_range_returns_minus_one() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 100_000);

    assert_eq!(base_ops::get_num_arguments(&mut host), 0);
    assert_eq!(base_ops::get_argument(&mut host, 0, 0), -1);
    assert_eq!(base_ops::get_argument(&mut host, -1, 0), -1);
    assert_eq!(base_ops::get_argument_length(&mut host, 3), -1);
    // memory untouched
    assert_eq!(host.runtime().mem_load(0, 4).unwrap(), vec![0, 0, 0, 0]);
}

#[test]
fn storage_locks_follow_block_timestamp() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    world.set_block_info(1000, 1, 1, 1);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 1_000_000);

    host.runtime().mem_store(0, b"lockme").unwrap();
    base_ops::set_storage_lock(&mut host, 0, 6, 2000);
    assert_eq!(base_ops::get_storage_lock(&mut host, 0, 6), 2000);
    assert_eq!(base_ops::is_storage_locked(&mut host, 0, 6), 1);

    base_ops::clear_storage_lock(&mut host, 0, 6);
    assert_eq!(base_ops::is_storage_locked(&mut host, 0, 6), 0);
}

#[test]
fn gas_schedule_change_reaches_the_engine() {
    let world = MockWorld::new();
    let mut host = world.new_host();
    assert_eq!(world.engine.opcode_cost_updates(), 1);

    let mut new_schedule = make_gas_map_for_tests();
    new_schedule
        .get_mut("ElrondAPICost")
        .unwrap()
        .insert("GetGasLeft".to_string(), 42);
    host.gas_schedule_change(new_schedule);

    assert_eq!(world.engine.opcode_cost_updates(), 2);
    assert_eq!(host.gas_schedule().base_api_cost.get_gas_left, 42);
}

#[test]
fn broken_gas_schedule_is_rejected_and_kept_out() {
    let world = MockWorld::new();
    let mut host = world.new_host();

    let mut broken = make_gas_map_for_tests();
    broken.remove("BigIntAPICost");
    host.gas_schedule_change(broken);

    // the old schedule stays in force and the engine is not reconfigured
    assert_eq!(world.engine.opcode_cost_updates(), 1);
    assert_eq!(host.gas_schedule().big_int_api_cost.big_int_add, 1);
}

#[test]
fn whole_gas_is_charged_on_fatal_failure() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"brokensc");
    world.create_account(user, 0);
    world.deploy_contract(
        contract,
        0,
        MockContract::new().with_export("breakdown", |host| {
            host.fault(warx_vm::VMError::ExecutionFailed, true);
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, contract, "breakdown", 30_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::ExecutionFailed);
    assert_eq!(vm_output.gas_remaining, 0);
    assert!(vm_output.return_data.is_empty());
    assert!(vm_output.output_accounts.is_empty());
}

#[test]
fn state_stacks_are_empty_after_every_run() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"anysc");
    world.create_account(user, 0);
    world.deploy_contract(contract, 0, MockContract::new().with_export("noop", |_| Ok(())));

    let mut host = world.new_host();
    for _ in 0..3 {
        let vm_output = host
            .run_smart_contract_call(&call_input(user, contract, "noop", 10_000))
            .unwrap();
        assert_eq!(vm_output.return_code, ReturnCode::Ok);
        assert!(host.state_stacks_are_empty());
    }
}
