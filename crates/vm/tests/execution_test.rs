//! End-to-end execution scenarios driven through the public entry points,
//! with mock contracts standing in for compiled modules.

use num_bigint::BigUint;
use warx_vm::common::{
    Address, CallType, ContractCallInput, ContractCreateInput, ReturnCode, VMInput, VMOutput,
};
use warx_vm::contexts::runtime::ApiErrorPolicy;
use warx_vm::errors::VMError;
use warx_vm::hostapi::{base_ops, big_int_ops};
use warx_vm::testing::{test_address, MockContract, MockWorld};
use warx_vm::{VmHost, VmHostParameters};

const DEST_OFFSET: i32 = 0;
const VALUE_OFFSET: i32 = 32;
const FUNC_OFFSET: i32 = 64;
const ARG_LENGTHS_OFFSET: i32 = 200;
const ARG_DATA_OFFSET: i32 = 232;

fn call_input(caller: Address, recipient: Address, function: &str, gas: u64) -> ContractCallInput {
    ContractCallInput {
        vm_input: VMInput {
            caller_addr: caller,
            gas_provided: gas,
            current_tx_hash: b"txhash".to_vec(),
            original_tx_hash: b"txhash".to_vec(),
            ..Default::default()
        },
        recipient_addr: recipient,
        function: function.to_string(),
    }
}

/// Account gas plus transfer gas plus remaining gas must equal the
/// provided gas.
fn assert_gas_reconciled(vm_output: &VMOutput, gas_provided: u64) {
    let mut total = vm_output.gas_remaining;
    for account in vm_output.output_accounts.values() {
        total += account.gas_used;
        for transfer in &account.output_transfers {
            total += transfer.gas_limit + transfer.gas_locked;
        }
    }
    assert_eq!(total, gas_provided, "gas reconciliation");
}

/// Writes an indirect-call layout (destination, 32-byte value, function
/// name, one optional argument) into the mock instance memory.
fn stage_call(host: &mut VmHost, dest: Address, value: u64, function: &str, arg: Option<&[u8]>) {
    let runtime = host.runtime();
    runtime.mem_store(DEST_OFFSET, dest.as_bytes()).unwrap();
    let mut value_bytes = [0u8; 32];
    let raw = BigUint::from(value).to_bytes_be();
    value_bytes[32 - raw.len()..].copy_from_slice(&raw);
    runtime.mem_store(VALUE_OFFSET, &value_bytes).unwrap();
    runtime.mem_store(FUNC_OFFSET, function.as_bytes()).unwrap();
    if let Some(arg) = arg {
        let length = (arg.len() as i32).to_le_bytes();
        runtime.mem_store(ARG_LENGTHS_OFFSET, &length).unwrap();
        runtime.mem_store(ARG_DATA_OFFSET, arg).unwrap();
    }
}

// ---------------------------------------------------------------------
// counter increment
// ---------------------------------------------------------------------

#[test]
fn counter_increment_updates_storage() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let counter_sc = test_address(b"counterSC");
    world.create_account(user, 1000);
    world.deploy_contract(
        counter_sc,
        0,
        MockContract::new().with_export("increment", |host| {
            host.runtime().mem_store(0, b"COUNTER")?;
            let counter = big_int_ops::big_int_new(host, 0);
            big_int_ops::big_int_storage_load_unsigned(host, 0, 7, counter);
            let one = big_int_ops::big_int_new(host, 1);
            big_int_ops::big_int_add(host, counter, counter, one);
            big_int_ops::big_int_storage_store_unsigned(host, 0, 7, counter);
            Ok(())
        }),
    );
    world.set_account_storage(counter_sc, b"COUNTER", &BigUint::from(1001u32).to_bytes_be());

    let mut host = world.new_host();
    let input = call_input(user, counter_sc, "increment", 100_000);
    let vm_output = host.run_smart_contract_call(&input).unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    let account = vm_output.account(&counter_sc).expect("contract account");
    let update = account
        .storage_updates
        .get(&b"COUNTER".to_vec())
        .expect("counter update");
    assert_eq!(update.data, BigUint::from(1002u32).to_bytes_be());
    assert_gas_reconciled(&vm_output, 100_000);
    assert!(host.state_stacks_are_empty());
}

// ---------------------------------------------------------------------
// reserved names and resolution failures
// ---------------------------------------------------------------------

#[test]
fn reserved_entry_points_are_rejected() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"contract");
    world.create_account(user, 0);
    world.deploy_contract(
        contract,
        0,
        MockContract::new()
            .with_export("init", |_| Ok(()))
            .with_export("callBack", |_| Ok(())),
    );

    let mut host = world.new_host();
    let init_output = host
        .run_smart_contract_call(&call_input(user, contract, "init", 10_000))
        .unwrap();
    assert_eq!(init_output.return_code, ReturnCode::UserError);
    assert_eq!(init_output.return_message, "cannot call init function directly");

    let callback_output = host
        .run_smart_contract_call(&call_input(user, contract, "callBack", 10_000))
        .unwrap();
    assert_eq!(callback_output.return_code, ReturnCode::UserError);
}

#[test]
fn missing_function_and_missing_contract() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"contract");
    world.create_account(user, 0);
    world.deploy_contract(contract, 0, MockContract::new().with_export("real", |_| Ok(())));

    let mut host = world.new_host();
    let missing_function = host
        .run_smart_contract_call(&call_input(user, contract, "unknown", 10_000))
        .unwrap();
    assert_eq!(missing_function.return_code, ReturnCode::FunctionNotFound);

    let missing_contract = host
        .run_smart_contract_call(&call_input(user, test_address(b"ghost"), "fn", 10_000))
        .unwrap();
    assert_eq!(missing_contract.return_code, ReturnCode::ContractNotFound);
}

#[test]
fn invalid_modules_are_rejected_at_load() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let bad = test_address(b"floatful");
    let memoryless = test_address(b"nomemory");
    world.create_account(user, 0);
    world.deploy_contract(bad, 0, MockContract::new().invalid());
    world.deploy_contract(
        memoryless,
        0,
        MockContract::new()
            .with_export("anything", |_| Ok(()))
            .without_memory(),
    );

    let mut host = world.new_host();
    let rejected = host
        .run_smart_contract_call(&call_input(user, bad, "anything", 10_000))
        .unwrap();
    assert_eq!(rejected.return_code, ReturnCode::ContractInvalid);

    let no_memory = host
        .run_smart_contract_call(&call_input(user, memoryless, "anything", 10_000))
        .unwrap();
    assert_eq!(no_memory.return_code, ReturnCode::ContractInvalid);
}

#[test]
fn guest_signal_error_maps_to_user_error() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"moody");
    world.create_account(user, 0);
    world.deploy_contract(
        contract,
        0,
        MockContract::new().with_export("refuse", |host| {
            host.runtime().mem_store(0, b"not today")?;
            base_ops::signal_error(host, 0, 9);
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, contract, "refuse", 10_000))
        .unwrap();
    assert_eq!(vm_output.return_code, ReturnCode::UserError);
    assert_eq!(vm_output.return_message, "not today");
    assert_eq!(vm_output.gas_remaining, 0);
    assert!(vm_output.output_accounts.is_empty());
}

// ---------------------------------------------------------------------
// out-of-gas nested call
// ---------------------------------------------------------------------

fn out_of_gas_world() -> (MockWorld, Address, Address, Address) {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    let child = test_address(b"childSC");
    world.create_account(user, 1000);
    world.deploy_contract(
        parent,
        1000,
        MockContract::new().with_export("callChild", move |host| {
            host.storage_store(b"parentKey", b"parentValue")?;
            stage_call(host, test_address(b"childSC"), 0, "loopForever", None);
            let status = base_ops::execute_on_dest_context(
                host,
                20_000,
                DEST_OFFSET,
                VALUE_OFFSET,
                FUNC_OFFSET,
                11,
                0,
                ARG_LENGTHS_OFFSET,
                ARG_DATA_OFFSET,
            );
            if status != 0 {
                host.output_mut().finish(b"fail".to_vec());
            }
            Ok(())
        }),
    );
    world.deploy_contract(
        child,
        1000,
        MockContract::new().with_export("loopForever", |host| {
            loop {
                host.use_gas_bounded(1000)?;
            }
        }),
    );
    (world, user, parent, child)
}

#[test]
fn nested_out_of_gas_strict_fails_whole_call() {
    let (world, user, parent, _) = out_of_gas_world();
    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "callChild", 50_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::OutOfGas);
    assert_eq!(vm_output.gas_remaining, 0);
    assert!(host.state_stacks_are_empty());
}

#[test]
fn nested_out_of_gas_lenient_keeps_parent_effects() {
    let (world, user, parent, child) = out_of_gas_world();
    let mut host = world.new_host_with_parameters(VmHostParameters {
        sync_exec_api_policy: ApiErrorPolicy::Lenient,
        ..Default::default()
    });
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "callChild", 50_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"fail".to_vec()]);
    // the parent's storage write survives; the child frame left nothing
    let parent_account = vm_output.account(&parent).expect("parent account");
    assert!(parent_account
        .storage_updates
        .contains_key(&b"parentKey".to_vec()));
    assert!(vm_output.account(&child).is_none());
    assert_gas_reconciled(&vm_output, 50_000);
}

// ---------------------------------------------------------------------
// recursive execute-on-same-context
// ---------------------------------------------------------------------

fn recursive_contract() -> MockContract {
    MockContract::new().with_export("recurse", |host| {
        let argument = host.runtime().arguments()[0].clone();
        let n = argument[0];

        host.storage_store(
            format!("Rkey{n:03}").as_bytes(),
            format!("Rvalue{n:03}").as_bytes(),
        )?;
        host.output_mut().finish(format!("Rfinish{n:03}").into_bytes());
        *host.managed_types_mut().big_int_or_create(0) += 1;

        if n == 0 {
            return Ok(());
        }
        let self_address = host.runtime().sc_address();
        stage_call(host, self_address, 0, "recurse", Some(&[n - 1]));
        let status = base_ops::execute_on_same_context(
            host,
            i64::MAX,
            DEST_OFFSET,
            VALUE_OFFSET,
            FUNC_OFFSET,
            7,
            1,
            ARG_LENGTHS_OFFSET,
            ARG_DATA_OFFSET,
        );
        if status != 0 {
            host.output_mut().finish(b"fail".to_vec());
        }
        Ok(())
    })
}

#[test]
fn recursive_same_context_shares_storage_and_handles() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"recursive");
    world.create_account(user, 0);
    world.deploy_contract(contract, 0, recursive_contract());

    let mut host = world.new_host();
    let mut input = call_input(user, contract, "recurse", 1_000_000);
    input.vm_input.arguments = vec![vec![5]];
    let vm_output = host.run_smart_contract_call(&input).unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    let account = vm_output.account(&contract).expect("contract account");
    for n in 0..=5u8 {
        let update = account
            .storage_updates
            .get(format!("Rkey{n:03}").as_bytes())
            .unwrap_or_else(|| panic!("missing Rkey{n:03}"));
        assert_eq!(update.data, format!("Rvalue{n:03}").into_bytes());
    }
    assert_eq!(vm_output.return_data.len(), 6);
    assert_eq!(
        host.managed_types().get_big_int(0).unwrap(),
        &num_bigint::BigInt::from(6)
    );
    assert_gas_reconciled(&vm_output, 1_000_000);
}

#[test]
fn recursion_past_the_instance_ceiling_fails() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"recursive");
    world.create_account(user, 0);
    world.deploy_contract(contract, 0, recursive_contract());

    // strict policy: the eleventh instance aborts the whole call
    let mut host = world.new_host();
    let mut input = call_input(user, contract, "recurse", 10_000_000);
    input.vm_input.arguments = vec![vec![11]];
    let vm_output = host.run_smart_contract_call(&input).unwrap();
    assert_eq!(vm_output.return_code, ReturnCode::ExecutionFailed);
    assert_eq!(vm_output.return_message, "max instances reached");

    // lenient policy: partial execution with "fail" appended
    let mut host = world.new_host_with_parameters(VmHostParameters {
        sync_exec_api_policy: ApiErrorPolicy::Lenient,
        ..Default::default()
    });
    let vm_output = host.run_smart_contract_call(&input).unwrap();
    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data.last().unwrap(), &b"fail".to_vec());
}

// ---------------------------------------------------------------------
// deploy and upgrade
// ---------------------------------------------------------------------

#[test]
fn top_level_create_runs_init_and_stores_code() {
    let mut world = MockWorld::new();
    let owner = test_address(b"owner");
    let deployed = test_address(b"deployed");
    world.create_account(owner, 5000);
    world.register_new_address(owner, 0, deployed);
    world.engine.register_contract(
        b"child-code".to_vec(),
        MockContract::new().with_export("init", |host| {
            host.output_mut().finish(b"init successful".to_vec());
            host.storage_store(b"initialized", b"yes")?;
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let input = ContractCreateInput {
        vm_input: VMInput {
            caller_addr: owner,
            gas_provided: 100_000,
            call_value: BigUint::from(25u32),
            ..Default::default()
        },
        contract_code: b"child-code".to_vec(),
        contract_code_metadata: vec![1, 0],
    };
    let vm_output = host.run_smart_contract_create(&input).unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"init successful".to_vec()]);
    let account = vm_output.account(&deployed).expect("deployed account");
    assert_eq!(account.code.as_deref(), Some(b"child-code".as_ref()));
    assert_eq!(account.code_metadata, vec![1, 0]);
    assert_eq!(account.code_deployer_address, Some(owner));
    assert_eq!(
        account.balance_delta,
        num_bigint::BigInt::from(25)
    );
    assert!(account.storage_updates.contains_key(&b"initialized".to_vec()));
    assert_gas_reconciled(&vm_output, 100_000);
}

#[test]
fn create_with_insufficient_gas_is_out_of_gas() {
    let mut world = MockWorld::new();
    let owner = test_address(b"owner");
    world.create_account(owner, 0);
    world
        .engine
        .register_contract(b"child-code".to_vec(), MockContract::new());

    let mut host = world.new_host();
    let input = ContractCreateInput {
        vm_input: VMInput {
            caller_addr: owner,
            // create base cost (1) + code length exceeds this budget
            gas_provided: 5,
            ..Default::default()
        },
        contract_code: b"child-code".to_vec(),
        contract_code_metadata: vec![0, 0],
    };
    let vm_output = host.run_smart_contract_create(&input).unwrap();
    assert_eq!(vm_output.return_code, ReturnCode::OutOfGas);
}

#[test]
fn indirect_deploy_through_host_function() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let deployer = test_address(b"deployer");
    let deployed = test_address(b"freshchild");
    world.create_account(user, 0);
    world.deploy_contract(
        deployer,
        1000,
        MockContract::new().with_export("deployChild", |host| {
            // code bytes, metadata, zero value staged in guest memory
            host.runtime().mem_store(0, &[0u8; 32])?; // value
            host.runtime().mem_store(100, b"child-code")?;
            host.runtime().mem_store(150, &[1, 0])?;
            let status = base_ops::create_contract(host, 50_000, 0, 100, 150, 10, 300, 0, 400, 400);
            if status != 0 {
                host.output_mut().finish(b"deploy failed".to_vec());
                return Ok(());
            }
            let new_address = host.runtime().mem_load(300, 32)?;
            host.output_mut().finish(new_address);
            Ok(())
        }),
    );
    world.register_new_address(deployer, 0, deployed);
    world.engine.register_contract(
        b"child-code".to_vec(),
        MockContract::new().with_export("init", |host| {
            host.output_mut().finish(b"child init".to_vec());
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, deployer, "deployChild", 200_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(
        vm_output.return_data,
        vec![b"child init".to_vec(), deployed.to_vec()]
    );
    let account = vm_output.account(&deployed).expect("deployed account");
    assert_eq!(account.code.as_deref(), Some(b"child-code".as_ref()));
    assert_gas_reconciled(&vm_output, 200_000);
}

#[test]
fn upgrade_preserves_storage_and_runs_init() {
    let mut world = MockWorld::new();
    let owner = test_address(b"owner");
    let contract = test_address(b"upgrademe");
    world.create_account(owner, 0);
    world.deploy_contract(
        contract,
        0,
        MockContract::new().with_export("oldFunction", |_| Ok(())),
    );
    world.set_account_storage(contract, b"precious", b"data");
    world.engine.register_contract(
        b"new-code".to_vec(),
        MockContract::new().with_export("init", |host| {
            // prior storage must be readable from the new code
            let preserved = host.storage_load_unmetered(b"precious");
            host.output_mut().finish(preserved);
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let mut input = call_input(owner, contract, "upgradeContract", 100_000);
    input.vm_input.arguments = vec![b"new-code".to_vec(), vec![1, 0]];
    let vm_output = host.run_smart_contract_call(&input).unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"data".to_vec()]);
    let account = vm_output.account(&contract).expect("upgraded account");
    assert_eq!(account.code.as_deref(), Some(b"new-code".as_ref()));
    assert_gas_reconciled(&vm_output, 100_000);
}

// ---------------------------------------------------------------------
// read-only frames
// ---------------------------------------------------------------------

#[test]
fn execute_read_only_inhibits_storage_writes() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    let child = test_address(b"childSC");
    world.create_account(user, 0);
    world.deploy_contract(
        parent,
        0,
        MockContract::new().with_export("readChild", move |host| {
            stage_call(host, test_address(b"childSC"), 0, "tryWrite", None);
            let status = base_ops::execute_read_only(
                host,
                i64::MAX,
                DEST_OFFSET,
                FUNC_OFFSET,
                8,
                0,
                ARG_LENGTHS_OFFSET,
                ARG_DATA_OFFSET,
            );
            if status != 0 {
                host.output_mut().finish(b"fail".to_vec());
            }
            Ok(())
        }),
    );
    world.deploy_contract(
        child,
        0,
        MockContract::new().with_export("tryWrite", |host| {
            match host.storage_store(b"key", b"value") {
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            }
        }),
    );

    let mut host = world.new_host_with_parameters(VmHostParameters {
        sync_exec_api_policy: ApiErrorPolicy::Lenient,
        ..Default::default()
    });
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "readChild", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"fail".to_vec()]);
    // no storage updates anywhere in the output
    for account in vm_output.output_accounts.values() {
        assert!(account.storage_updates.is_empty());
    }
}

// ---------------------------------------------------------------------
// panics are contained
// ---------------------------------------------------------------------

#[test]
fn guest_panic_is_contained_as_error() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"panicky");
    world.create_account(user, 0);
    world.deploy_contract(
        contract,
        0,
        MockContract::new().with_export("explode", |_| panic!("boom")),
    );

    let mut host = world.new_host();
    let result = host.run_smart_contract_call(&call_input(user, contract, "explode", 10_000));
    match result {
        Err(VMError::ExecutionPanicked(message)) => assert!(message.contains("boom")),
        other => panic!("expected contained panic, got {other:?}"),
    }
}
