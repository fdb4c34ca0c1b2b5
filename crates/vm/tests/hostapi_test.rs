//! Host-function surface details: token transfers with follow-up
//! execution, crypto verification traffic and event logs.

use num_bigint::BigUint;
use warx_vm::common::{Address, ContractCallInput, ReturnCode, VMInput};
use warx_vm::hostapi::{base_ops, crypto_ops};
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
fn esdt_transfer_with_follow_up_execution() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let sender_sc = test_address(b"senderSC");
    let token_sc = test_address(b"tokenrecv");
    world.create_account(user, 0);
    world.deploy_contract(
        sender_sc,
        1000,
        MockContract::new().with_export("payTokens", |host| {
            let runtime = host.runtime();
            runtime
                .mem_store(0, test_address(b"tokenrecv").as_bytes())
                .unwrap();
            runtime.mem_store(40, b"TKN")?;
            let mut value = [0u8; 32];
            value[31] = 5;
            runtime.mem_store(60, &value)?;
            runtime.mem_store(100, b"acceptTokens")?;
            let status = base_ops::transfer_esdt_execute(
                host, 0, 40, 3, 60, 20_000, 100, 12, 0, 300, 300,
            );
            if status != 0 {
                host.output_mut().finish(b"fail".to_vec());
            }
            Ok(())
        }),
    );
    world.deploy_contract(
        token_sc,
        0,
        MockContract::new().with_export("acceptTokens", |host| {
            host.output_mut().finish(b"got tokens".to_vec());
            Ok(())
        }),
    );
    world.set_account_esdt(sender_sc, b"TKN", 0, 100);

    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, sender_sc, "payTokens", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"got tokens".to_vec()]);

    // token balances moved in the world behind the builtin
    let sender_account = world.account(&sender_sc).unwrap();
    assert_eq!(
        sender_account.esdt[&(b"TKN".to_vec(), 0)],
        BigUint::from(95u32)
    );
    let receiver_account = world.account(&token_sc).unwrap();
    assert_eq!(
        receiver_account.esdt[&(b"TKN".to_vec(), 0)],
        BigUint::from(5u32)
    );

    // the builtin reported the transfer as an outbound record
    let token_account = vm_output.account(&token_sc).expect("token receiver");
    assert!(token_account
        .output_transfers
        .iter()
        .any(|transfer| transfer.data.starts_with(b"ESDTTransfer@")));
}

#[test]
fn esdt_transfer_with_insufficient_balance_fails() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let sender_sc = test_address(b"senderSC");
    let receiver = test_address(b"tokenrecv");
    world.create_account(user, 0);
    world.create_account(receiver, 0);
    world.deploy_contract(
        sender_sc,
        1000,
        MockContract::new().with_export("payTokens", |host| {
            let runtime = host.runtime();
            runtime
                .mem_store(0, test_address(b"tokenrecv").as_bytes())
                .unwrap();
            runtime.mem_store(40, b"TKN")?;
            let mut value = [0u8; 32];
            value[31] = 5;
            runtime.mem_store(60, &value)?;
            let status =
                base_ops::transfer_esdt_execute(host, 0, 40, 3, 60, 20_000, 100, 0, 0, 300, 300);
            if status != 0 {
                host.output_mut().finish(b"fail".to_vec());
            }
            Ok(())
        }),
    );
    // no TKN balance for the sender

    let mut host = world.new_host_with_parameters(warx_vm::VmHostParameters {
        sync_exec_api_policy: warx_vm::contexts::runtime::ApiErrorPolicy::Lenient,
        ..Default::default()
    });
    let vm_output = host
        .run_smart_contract_call(&call_input(user, sender_sc, "payTokens", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"fail".to_vec()]);
}

#[test]
fn crypto_verification_and_hashing() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 1_000_000);

    let runtime = host.runtime();
    runtime.mem_store(0, &[9u8; 32]).unwrap(); // public key
    runtime.mem_store(100, b"hello").unwrap(); // message
    let mut good_signature = [0u8; 64];
    good_signature[0] = 1;
    runtime.mem_store(200, &good_signature).unwrap();

    assert_eq!(crypto_ops::verify_ed25519(&mut host, 0, 100, 5, 200), 0);

    host.runtime().mem_store(200, &[0u8; 64]).unwrap();
    assert_eq!(crypto_ops::verify_ed25519(&mut host, 0, 100, 5, 200), -1);

    assert_eq!(crypto_ops::sha256(&mut host, 100, 5, 300), 0);
    let digest = host.runtime().mem_load(300, 32).unwrap();
    assert_eq!(digest.len(), 32);
    // hashing is deterministic over the same input
    assert_eq!(crypto_ops::sha256(&mut host, 100, 5, 400), 0);
    assert_eq!(host.runtime().mem_load(400, 32).unwrap(), digest);
}

#[test]
fn elliptic_curve_operations_charge_by_field_size() {
    let mut world = MockWorld::new();
    world.create_account(test_address(b"contract"), 0);
    let mut host = world.new_host();
    start_direct_frame(&mut host, test_address(b"contract"), 1_000_000);

    host.runtime().mem_store(0, b"P-256").unwrap();
    let curve = crypto_ops::create_ec(&mut host, 0, 5);
    assert!(curve >= 0);
    assert_eq!(crypto_ops::get_curve_length_ec(&mut host, curve), 256);

    let x1 = host.managed_types_mut().put_big_int(10);
    let y1 = host.managed_types_mut().put_big_int(20);
    let x2 = host.managed_types_mut().put_big_int(1);
    let y2 = host.managed_types_mut().put_big_int(2);
    let xr = host.managed_types_mut().put_big_int(0);
    let yr = host.managed_types_mut().put_big_int(0);

    crypto_ops::add_ec(&mut host, xr, yr, curve, x1, y1, x2, y2);
    assert_eq!(
        host.managed_types().get_big_int(xr).unwrap(),
        &num_bigint::BigInt::from(11)
    );
    assert_eq!(
        host.managed_types().get_big_int(yr).unwrap(),
        &num_bigint::BigInt::from(22)
    );

    assert_eq!(crypto_ops::is_on_curve_ec(&mut host, curve, x1, y1), 1);

    // unknown curve handles report failure
    assert_eq!(crypto_ops::is_on_curve_ec(&mut host, curve + 10, x1, y1), -1);
}

#[test]
fn upgrade_through_host_function_resolves_in_shard() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    let child = test_address(b"childSC");
    world.create_account(user, 0);
    world.deploy_contract(
        parent,
        1000,
        MockContract::new()
            .with_export("upgradeChild", |host| {
                let runtime = host.runtime();
                runtime
                    .mem_store(0, test_address(b"childSC").as_bytes())
                    .unwrap();
                runtime.mem_store(32, &[0u8; 32])?;
                runtime.mem_store(100, b"new-code")?;
                runtime.mem_store(150, &[1, 0])?;
                base_ops::upgrade_contract(host, 0, 20_000, 32, 100, 150, 8, 0, 300, 300);
                Ok(())
            })
            .with_export("callBack", |host| {
                host.output_mut().finish(b"upgraded".to_vec());
                Ok(())
            }),
    );
    world.deploy_contract(
        child,
        0,
        MockContract::new().with_export("oldFunction", |_| Ok(())),
    );
    world.engine.register_contract(
        b"new-code".to_vec(),
        MockContract::new().with_export("init", |host| {
            host.output_mut().finish(b"new init".to_vec());
            Ok(())
        }),
    );

    // the callback reserve must cover re-entering the parent
    let mut schedule = warx_vm::gas_schedule::make_gas_map_for_tests();
    schedule
        .get_mut("ElrondAPICost")
        .unwrap()
        .insert("AsyncCallbackGasLock".to_string(), 3000);
    let mut host = world.new_host_with_parameters(warx_vm::VmHostParameters {
        gas_schedule: schedule,
        ..Default::default()
    });
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "upgradeChild", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(
        vm_output.return_data,
        vec![b"new init".to_vec(), b"upgraded".to_vec()]
    );
    let child_account = vm_output.account(&child).expect("child account");
    assert_eq!(child_account.code.as_deref(), Some(b"new-code".as_ref()));
    assert_eq!(child_account.code_metadata, vec![1, 0]);
}

#[test]
fn event_logs_carry_topics_and_data() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let contract = test_address(b"logger");
    world.create_account(user, 0);
    world.deploy_contract(
        contract,
        0,
        MockContract::new().with_export("emit", |host| {
            let runtime = host.runtime();
            // two topics with lengths 3 and 5, packed back to back
            runtime.mem_store(0, &3i32.to_le_bytes())?;
            runtime.mem_store(4, &5i32.to_le_bytes())?;
            runtime.mem_store(50, b"abc")?;
            runtime.mem_store(53, b"defgh")?;
            runtime.mem_store(100, b"payload")?;
            base_ops::write_event_log(host, 2, 0, 50, 100, 7);
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, contract, "emit", 50_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.logs.len(), 1);
    let log = &vm_output.logs[0];
    assert_eq!(log.address, contract);
    assert_eq!(log.topics, vec![b"abc".to_vec(), b"defgh".to_vec()]);
    assert_eq!(log.data, b"payload".to_vec());
}
