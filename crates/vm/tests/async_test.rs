//! Asynchronous call scenarios: in-shard resolution with callbacks,
//! cross-shard queueing, and the stored continuation record.

use num_bigint::{BigInt, BigUint};
use warx_vm::common::{
    Address, CallType, ContractCallInput, ReturnCode, VMInput, VMOutput,
};
use warx_vm::gas_schedule::make_gas_map_for_tests;
use warx_vm::hostapi::base_ops;
use warx_vm::testing::{test_address, MockContract, MockWorld};
use warx_vm::{VmHost, VmHostParameters};

/// The callback reserve must cover re-entering the caller: the original
/// test setup raises the callback gas lock the same way.
fn host_with_callback_lock(world: &MockWorld) -> VmHost {
    let mut schedule = make_gas_map_for_tests();
    schedule
        .get_mut("ElrondAPICost")
        .unwrap()
        .insert("AsyncCallbackGasLock".to_string(), 3000);
    world.new_host_with_parameters(VmHostParameters {
        gas_schedule: schedule,
        ..Default::default()
    })
}

const DEST_OFFSET: i32 = 0;
const VALUE_OFFSET: i32 = 32;
const DATA_OFFSET: i32 = 64;

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

/// Stages destination, 32-byte value and call data in guest memory, then
/// fires the asyncCall host function.
fn guest_async_call(host: &mut VmHost, dest: Address, value: u64, data: &[u8]) {
    let runtime = host.runtime();
    runtime.mem_store(DEST_OFFSET, dest.as_bytes()).unwrap();
    let mut value_bytes = [0u8; 32];
    let raw = BigUint::from(value).to_bytes_be();
    value_bytes[32 - raw.len()..].copy_from_slice(&raw);
    runtime.mem_store(VALUE_OFFSET, &value_bytes).unwrap();
    runtime.mem_store(DATA_OFFSET, data).unwrap();
    base_ops::async_call(host, DEST_OFFSET, VALUE_OFFSET, DATA_OFFSET, data.len() as i32);
}

/// Parent sets storage, pays the third party 3, finishes two markers and
/// async-calls the child with 7. The callback forwards 4 to the vault
/// when the child never reported paying it.
fn async_parent_contract(fail_child: bool) -> MockContract {
    MockContract::new()
        .with_export("performAsyncCall", move |host| {
            let third_party = test_address(b"thirdparty");
            host.storage_store(b"parentKeyA", b"parentDataA")?;
            host.storage_store(b"parentKeyB", b"parentDataB")?;
            host.output_mut().finish(b"parentFinishA".to_vec());
            host.output_mut().finish(b"parentFinishB".to_vec());
            let parent = host.runtime().sc_address();
            host.transfer(
                third_party,
                parent,
                0,
                0,
                &BigUint::from(3u32),
                b"hello".to_vec(),
                CallType::DirectCall,
            )?;

            let data: &[u8] = if fail_child {
                b"transferToThirdParty@03@01"
            } else {
                b"transferToThirdParty@03@00"
            };
            guest_async_call(host, test_address(b"childSC"), 7, data);
            Ok(())
        })
        .with_export("callBack", |host| {
            let parent = host.runtime().sc_address();
            let args = host.runtime().arguments().to_vec();
            let child_succeeded = args[0].is_empty();
            if child_succeeded {
                host.output_mut().finish(vec![0]);
            } else {
                // the vault never got its share; send it directly
                host.transfer(
                    test_address(b"vaultsc"),
                    parent,
                    0,
                    0,
                    &BigUint::from(4u32),
                    Vec::new(),
                    CallType::DirectCall,
                )?;
            }
            host.output_mut().finish(b"succ".to_vec());
            Ok(())
        })
}

/// Child stores its arguments, pays the third party 3 and the vault 4,
/// and reports both payments; argument `01` makes it signal an error
/// instead.
fn async_child_contract() -> MockContract {
    MockContract::new().with_export("transferToThirdParty", |host| {
        let args = host.runtime().arguments().to_vec();
        let must_fail = args.get(1).map(|a| a == &vec![1u8]).unwrap_or(false);
        if must_fail {
            host.runtime().mem_store(500, b"child error")?;
            base_ops::signal_error(host, 500, 11);
            return Ok(());
        }

        let child = host.runtime().sc_address();
        host.storage_store(b"childKey", b"childData")?;
        host.output_mut().finish(vec![0]);
        host.transfer(
            test_address(b"thirdparty"),
            child,
            0,
            0,
            &BigUint::from(3u32),
            b" there".to_vec(),
            CallType::DirectCall,
        )?;
        host.output_mut().finish(b"thirdparty".to_vec());
        host.transfer(
            test_address(b"vaultsc"),
            child,
            0,
            0,
            &BigUint::from(4u32),
            Vec::new(),
            CallType::DirectCall,
        )?;
        host.output_mut().finish(b"vault".to_vec());
        Ok(())
    })
}

fn async_world(fail_child: bool) -> (MockWorld, Address, Address, Address, Address, Address) {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    let child = test_address(b"childSC");
    let third_party = test_address(b"thirdparty");
    let vault = test_address(b"vaultsc");
    world.create_account(user, 1000);
    world.create_account(third_party, 0);
    world.create_account(vault, 0);
    world.deploy_contract(parent, 1000, async_parent_contract(fail_child));
    world.deploy_contract(child, 1000, async_child_contract());
    (world, user, parent, child, third_party, vault)
}

#[test]
fn async_call_success_runs_child_and_callback() {
    let (world, user, parent, child, third_party, vault) = async_world(false);
    let mut host = host_with_callback_lock(&world);
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "performAsyncCall", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(
        vm_output.return_data,
        vec![
            b"parentFinishA".to_vec(),
            b"parentFinishB".to_vec(),
            vec![0],
            b"thirdparty".to_vec(),
            b"vault".to_vec(),
            vec![0],
            b"succ".to_vec(),
        ]
    );

    // third party receives 3 from the parent and 3 from the child
    let third_account = vm_output.account(&third_party).expect("third party");
    assert_eq!(third_account.balance_delta, BigInt::from(6));
    assert_eq!(third_account.output_transfers.len(), 2);
    assert_eq!(third_account.output_transfers[0].sender_address, parent);
    assert_eq!(third_account.output_transfers[0].value, BigUint::from(3u32));
    assert_eq!(third_account.output_transfers[1].sender_address, child);
    assert_eq!(third_account.output_transfers[1].value, BigUint::from(3u32));

    let vault_account = vm_output.account(&vault).expect("vault");
    assert_eq!(vault_account.balance_delta, BigInt::from(4));
    assert_eq!(vault_account.output_transfers.len(), 1);
    assert_eq!(vault_account.output_transfers[0].sender_address, child);

    // child paid out exactly what it received
    let child_account = vm_output.account(&child).expect("child");
    assert_eq!(child_account.balance_delta, BigInt::from(0));
    assert!(child_account
        .storage_updates
        .contains_key(&b"childKey".to_vec()));

    let parent_account = vm_output.account(&parent).expect("parent");
    assert_eq!(parent_account.balance_delta, BigInt::from(-10));

    assert_gas_reconciled(&vm_output, 100_000);
    assert!(host.state_stacks_are_empty());
}

#[test]
fn async_call_child_failure_discards_child_effects() {
    let (world, user, parent, child, third_party, vault) = async_world(true);
    let mut host = host_with_callback_lock(&world);
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "performAsyncCall", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(
        vm_output.return_data,
        vec![
            b"parentFinishA".to_vec(),
            b"parentFinishB".to_vec(),
            b"succ".to_vec(),
        ]
    );

    // only the parent's 3 reached the third party
    let third_account = vm_output.account(&third_party).expect("third party");
    assert_eq!(third_account.balance_delta, BigInt::from(3));
    assert_eq!(third_account.output_transfers.len(), 1);

    // the callback sent the vault its 4 directly
    let vault_account = vm_output.account(&vault).expect("vault");
    assert_eq!(vault_account.balance_delta, BigInt::from(4));
    assert_eq!(vault_account.output_transfers[0].sender_address, parent);

    // nothing from the failed child frame survived
    if let Some(child_account) = vm_output.account(&child) {
        assert!(child_account.storage_updates.is_empty());
        assert_eq!(child_account.balance_delta, BigInt::from(0));
    }

    assert_gas_reconciled(&vm_output, 100_000);
}

#[test]
fn callback_receives_return_code_and_message_on_failure() {
    let (world, user, parent, _, _, _) = async_world(true);

    // replace the parent callback with one that records its arguments
    let mut world = world;
    world.deploy_contract(
        parent,
        1000,
        async_parent_contract(true).with_export("callBack", |host| {
            let args = host.runtime().arguments().to_vec();
            host.output_mut().finish(args[0].clone());
            host.output_mut().finish(args[1].clone());
            Ok(())
        }),
    );

    let mut host = host_with_callback_lock(&world);
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "performAsyncCall", 100_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    let data = &vm_output.return_data;
    // [parentFinishA, parentFinishB, retCode(UserError), "child error"]
    assert_eq!(data.len(), 4);
    assert_eq!(data[2], ReturnCode::UserError.to_bytes());
    assert_eq!(data[3], b"child error".to_vec());
}

// ---------------------------------------------------------------------
// cross-shard async
// ---------------------------------------------------------------------

#[test]
fn cross_shard_async_queues_transfer_with_all_remaining_gas() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    let remote = test_address(b"remotechild");
    world.create_account(user, 0);
    world.create_account(remote, 0);
    world.set_account_shard(remote, 1);
    world.deploy_contract(
        parent,
        1000,
        MockContract::new().with_export("callRemote", move |host| {
            guest_async_call(host, test_address(b"remotechild"), 5, b"remoteFunction@aa");
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let gas_provided = 50_000;
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "callRemote", gas_provided))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.gas_remaining, 0);

    let remote_account = vm_output.account(&remote).expect("remote account");
    assert_eq!(remote_account.output_transfers.len(), 1);
    let transfer = &remote_account.output_transfers[0];
    assert_eq!(transfer.call_type, CallType::AsynchronousCall);
    assert_eq!(transfer.value, BigUint::from(5u32));
    assert_eq!(transfer.data, b"remoteFunction@aa".to_vec());
    assert!(transfer.gas_limit > 0);
    assert!(transfer.gas_locked > 0);
    assert_gas_reconciled(&vm_output, gas_provided);
}

// ---------------------------------------------------------------------
// grouped async contexts and the stored continuation
// ---------------------------------------------------------------------

fn async_record_key() -> Vec<u8> {
    let mut key = b"N$asyncCalls".to_vec();
    key.extend_from_slice(b"txhash");
    key
}

#[test]
fn pending_cross_shard_group_is_saved_to_protected_storage() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    let remote = test_address(b"remotechild");
    world.create_account(user, 0);
    world.create_account(remote, 0);
    world.set_account_shard(remote, 1);
    world.deploy_contract(
        parent,
        1000,
        MockContract::new()
            .with_export("groupCall", move |host| {
                let runtime = host.runtime();
                runtime.mem_store(0, b"ctx").unwrap();
                runtime
                    .mem_store(100, test_address(b"remotechild").as_bytes())
                    .unwrap();
                runtime.mem_store(140, &[0u8; 32]).unwrap();
                runtime.mem_store(180, b"remoteFunction@aa").unwrap();
                runtime.mem_store(220, b"onSuccess").unwrap();
                runtime.mem_store(240, b"onError").unwrap();
                base_ops::create_async_call(
                    host, 0, 3, 100, 140, 180, 17, 220, 9, 240, 7, 0,
                );
                Ok(())
            })
            .with_export("onSuccess", |host| {
                host.output_mut().finish(b"custom callback ran".to_vec());
                Ok(())
            }),
    );

    let mut host = world.new_host();
    let vm_output = host
        .run_smart_contract_call(&call_input(user, parent, "groupCall", 50_000))
        .unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);

    // the pending record lands under the protected async prefix
    let parent_account = vm_output.account(&parent).expect("parent account");
    let record = parent_account
        .storage_updates
        .get(&async_record_key())
        .expect("async record");
    assert!(record.written);
    let text = String::from_utf8(record.data.clone()).unwrap();
    assert!(text.contains("asyncContextMap"));
    assert!(text.contains("onSuccess"));

    // and the cross-shard transfer is queued
    let remote_account = vm_output.account(&remote).expect("remote account");
    assert_eq!(remote_account.output_transfers.len(), 1);
    assert_eq!(
        remote_account.output_transfers[0].call_type,
        CallType::AsynchronousCall
    );

    // second transaction: the callback comes home and drains the record
    world.set_account_storage(parent, &async_record_key(), &record.data);
    let mut host = world.new_host();
    let mut callback_input = call_input(remote, parent, "callBack", 50_000);
    callback_input.vm_input.call_type = CallType::AsynchronousCallBack;
    let callback_output = host.run_smart_contract_call(&callback_input).unwrap();

    assert_eq!(
        callback_output.return_code,
        ReturnCode::Ok,
        "{}",
        callback_output.return_message
    );
    // the registered success callback was substituted for callBack
    assert!(callback_output
        .return_data
        .contains(&b"custom callback ran".to_vec()));
    // the drained record is cleared
    let parent_account = callback_output.account(&parent).expect("parent account");
    let cleared = parent_account
        .storage_updates
        .get(&async_record_key())
        .expect("cleared record");
    assert!(cleared.data.is_empty());
}

#[test]
fn callback_without_stored_record_is_a_no_op() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    world.create_account(user, 0);
    world.deploy_contract(
        parent,
        0,
        MockContract::new().with_export("callBack", |host| {
            host.output_mut().finish(b"plain callback".to_vec());
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let mut input = call_input(user, parent, "callBack", 20_000);
    input.vm_input.call_type = CallType::AsynchronousCallBack;
    let vm_output = host.run_smart_contract_call(&input).unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    assert_eq!(vm_output.return_data, vec![b"plain callback".to_vec()]);
}

#[test]
fn async_callback_input_unlocks_reserved_gas() {
    let mut world = MockWorld::new();
    let user = test_address(b"user");
    let parent = test_address(b"parentSC");
    world.create_account(user, 0);
    world.deploy_contract(
        parent,
        0,
        MockContract::new().with_export("callBack", |host| {
            let gas_left = host.gas_left();
            host.output_mut().finish(gas_left.to_be_bytes().to_vec());
            Ok(())
        }),
    );

    let mut host = world.new_host();
    let mut input = call_input(user, parent, "callBack", 10_000);
    input.vm_input.call_type = CallType::AsynchronousCallBack;
    input.vm_input.gas_locked = 5_000;
    let vm_output = host.run_smart_contract_call(&input).unwrap();

    assert_eq!(vm_output.return_code, ReturnCode::Ok, "{}", vm_output.return_message);
    let reported = u64::from_be_bytes(vm_output.return_data[0].clone().try_into().unwrap());
    // locked gas was folded into the provided gas before the initial charge
    assert!(reported > 10_000);
    assert_gas_reconciled(&vm_output, 15_000);
}
