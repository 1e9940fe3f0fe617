use std::sync::Arc;

use test_case::test_case;

use super::messages::*;
use super::*;
use crate::codec::tests::{
    build_coinbase_tx_hex, build_contract_call_tx_hex, build_token_transfer_tx_hex,
};
use crate::store::memory::MemoryStore;
use stacks_ingest_types::events::StxTransferEventData;
use stacks_ingest_types::DbTxTypeId;

pub fn block_hash(marker: u64) -> String {
    format!("0x{:064x}", marker)
}

pub fn index_block_hash(marker: u64) -> String {
    format!("0x{:064x}", 0xaa000000u64 + marker)
}

pub fn tx_entry(txid: &str, tx_index: u32, raw_tx: String) -> NewTransaction {
    NewTransaction {
        txid: txid.to_string(),
        tx_index,
        status: "success".to_string(),
        raw_result: "0x0703".to_string(),
        raw_tx,
        execution_cost: None,
        microblock_sequence: None,
        microblock_hash: None,
        microblock_parent_hash: None,
        contract_interface: None,
        contract_abi: None,
    }
}

pub fn empty_event(txid: &str, event_index: u32, event_type: &str) -> NewEvent {
    NewEvent {
        txid: txid.to_string(),
        committed: true,
        event_index,
        event_type: event_type.to_string(),
        contract_event: None,
        stx_transfer_event: None,
        stx_mint_event: None,
        stx_burn_event: None,
        stx_lock_event: None,
        ft_transfer_event: None,
        ft_mint_event: None,
        ft_burn_event: None,
        nft_transfer_event: None,
        nft_mint_event: None,
        nft_burn_event: None,
    }
}

pub fn stx_transfer_event(txid: &str, event_index: u32, amount: u64) -> NewEvent {
    let mut event = empty_event(txid, event_index, "stx_transfer_event");
    event.stx_transfer_event = Some(StxTransferEventData {
        sender: "ST3J8EVYHVKH6XXPD61EE8XEHW4Y2K83861225AB1".to_string(),
        recipient: "ST2QKZ4FKHAH1NQKYKYAYZPY440FEPK7GZ1R5HBP2".to_string(),
        amount: amount.to_string(),
        memo: None,
    });
    event
}

pub fn new_block_message(block_height: u32, marker: u64) -> NewBlock {
    NewBlock {
        block_height,
        block_hash: block_hash(marker),
        index_block_hash: index_block_hash(marker),
        burn_block_height: 600000 + block_height,
        burn_block_hash: format!("0x{:064x}", 0xbb000000u64 + marker),
        burn_block_time: 1660000000 + block_height as i64,
        miner_txid: "0x4321".to_string(),
        parent_block_hash: block_hash(marker.saturating_sub(1)),
        parent_index_block_hash: index_block_hash(marker.saturating_sub(1)),
        parent_microblock: stacks_ingest_types::EMPTY_MICROBLOCK_HASH.to_string(),
        parent_microblock_sequence: 0,
        parent_burn_block_hash: format!("0x{:064x}", 0xbb000000u64 + marker - 1),
        parent_burn_block_height: 600000 + block_height - 1,
        parent_burn_block_timestamp: 1660000000 + block_height as i64 - 600,
        transactions: vec![],
        events: vec![],
        matured_miner_rewards: vec![],
    }
}

fn transfer_amount(payload: &DbEventPayload) -> u128 {
    match payload {
        DbEventPayload::StxAsset {
            sub: DbAssetEventSub::Transfer { amount, .. },
        } => *amount,
        other => panic!("expected stx transfer payload, got {:?}", other),
    }
}

#[test]
fn coinbase_block_with_no_events_yields_an_empty_receipt() {
    let mut message = new_block_message(100, 100);
    message.transactions = vec![tx_entry("0xc0c0", 0, build_coinbase_tx_hex(0, 1))];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.txs.len(), 1);
    assert_eq!(update.txs[0].tx.event_count, 0);
    assert!(update.txs[0].events.is_empty());
    assert_eq!(update.txs[0].tx.type_id, DbTxTypeId::Coinbase);
    assert_eq!(update.block.block_height, 100);
    assert!(update.microblocks.is_empty());
    assert!(update.miner_rewards.is_empty());
}

#[test]
fn event_indexes_renumber_per_transaction_preserving_emission_order() {
    let mut message = new_block_message(101, 101);
    message.transactions = vec![
        tx_entry("0x0101", 0, build_token_transfer_tx_hex(180, 0, 500, 1)),
        tx_entry("0x0202", 1, build_token_transfer_tx_hex(180, 1, 600, 2)),
    ];
    // Block-relative arrival order: 3 (T2), 0 (T1), 2 (T2), 1 (T1).
    message.events = vec![
        stx_transfer_event("0x0202", 3, 3000),
        stx_transfer_event("0x0101", 0, 0),
        stx_transfer_event("0x0202", 2, 2000),
        stx_transfer_event("0x0101", 1, 1000),
    ];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();

    let t1 = &update.txs[0];
    assert_eq!(t1.tx.event_count, 2);
    assert_eq!(
        t1.events.iter().map(|e| e.event_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(
        t1.events
            .iter()
            .map(|e| transfer_amount(&e.payload))
            .collect::<Vec<_>>(),
        vec![0, 1000]
    );

    let t2 = &update.txs[1];
    assert_eq!(t2.tx.event_count, 2);
    assert_eq!(
        t2.events.iter().map(|e| e.event_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(
        t2.events
            .iter()
            .map(|e| transfer_amount(&e.payload))
            .collect::<Vec<_>>(),
        vec![2000, 3000]
    );
}

#[test]
fn uncommitted_events_never_reach_the_bundle() {
    let mut message = new_block_message(102, 102);
    message.transactions = vec![tx_entry(
        "0x0101",
        0,
        build_token_transfer_tx_hex(180, 0, 500, 1),
    )];
    let mut rolled_back = stx_transfer_event("0x0101", 0, 111);
    rolled_back.committed = false;
    message.events = vec![rolled_back, stx_transfer_event("0x0101", 1, 222)];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.txs[0].tx.event_count, 1);
    assert_eq!(transfer_amount(&update.txs[0].events[0].payload), 222);
}

#[test]
fn event_referencing_an_absent_transaction_is_fatal() {
    let mut message = new_block_message(103, 103);
    message.transactions = vec![tx_entry(
        "0x0101",
        0,
        build_token_transfer_tx_hex(180, 0, 500, 1),
    )];
    message.events = vec![stx_transfer_event("0xdead", 0, 1)];

    match assemble_block_update(&message, &Context::empty()) {
        Err(IngestError::ReferenceMissing(_)) => {}
        other => panic!("expected missing-reference error, got {:?}", other.err()),
    }
}

#[test]
fn unknown_event_types_are_rejected() {
    let mut message = new_block_message(104, 104);
    message.transactions = vec![tx_entry(
        "0x0101",
        0,
        build_token_transfer_tx_hex(180, 0, 500, 1),
    )];
    message.events = vec![empty_event("0x0101", 0, "teleport_event")];

    match assemble_block_update(&message, &Context::empty()) {
        Err(IngestError::Decode(_)) => {}
        other => panic!("expected decode error, got {:?}", other.err()),
    }
}

#[test]
fn malformed_raw_tx_aborts_the_whole_block() {
    let mut message = new_block_message(105, 105);
    message.transactions = vec![
        tx_entry("0x0101", 0, build_coinbase_tx_hex(0, 1)),
        tx_entry("0x0202", 1, "0x00ff00".to_string()),
    ];
    assert!(assemble_block_update(&message, &Context::empty()).is_err());
}

#[test]
fn microblocks_are_reconstructed_from_transaction_headers() {
    let mut message = new_block_message(106, 106);
    let mut tx0 = tx_entry("0x0101", 0, build_token_transfer_tx_hex(180, 0, 1, 1));
    tx0.microblock_hash = Some("0xmba".to_string());
    tx0.microblock_sequence = Some(0);
    tx0.microblock_parent_hash = Some("0xparent".to_string());
    let mut tx1 = tx_entry("0x0202", 1, build_token_transfer_tx_hex(180, 1, 2, 2));
    tx1.microblock_hash = Some("0xmba".to_string());
    tx1.microblock_sequence = Some(0);
    tx1.microblock_parent_hash = Some("0xparent".to_string());
    let mut tx2 = tx_entry("0x0303", 2, build_token_transfer_tx_hex(180, 2, 3, 3));
    tx2.microblock_hash = Some("0xmbb".to_string());
    tx2.microblock_sequence = Some(1);
    tx2.microblock_parent_hash = Some("0xmba".to_string());
    // Anchored directly, not part of the stream.
    let tx3 = tx_entry("0x0404", 3, build_coinbase_tx_hex(3, 4));
    message.transactions = vec![tx0, tx1, tx2, tx3];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.microblocks.len(), 2);
    assert_eq!(update.microblocks[0].microblock_hash, "0xmba");
    assert_eq!(update.microblocks[0].microblock_sequence, 0);
    assert_eq!(update.microblocks[0].microblock_parent_hash, "0xparent");
    assert_eq!(update.microblocks[1].microblock_hash, "0xmbb");
    assert_eq!(update.microblocks[1].microblock_sequence, 1);
    assert_eq!(
        update.microblocks[0].index_block_hash,
        message.index_block_hash
    );
    assert_eq!(update.microblocks[0].block_height, 106);
}

#[test]
fn microblock_sequence_gaps_are_tolerated() {
    let mut message = new_block_message(107, 107);
    let mut tx0 = tx_entry("0x0101", 0, build_token_transfer_tx_hex(180, 0, 1, 1));
    tx0.microblock_hash = Some("0xmba".to_string());
    tx0.microblock_sequence = Some(0);
    tx0.microblock_parent_hash = Some("0xparent".to_string());
    let mut tx1 = tx_entry("0x0202", 1, build_token_transfer_tx_hex(180, 1, 2, 2));
    tx1.microblock_hash = Some("0xmbc".to_string());
    tx1.microblock_sequence = Some(2);
    tx1.microblock_parent_hash = Some("0xmbb".to_string());
    message.transactions = vec![tx0, tx1];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.microblocks.len(), 2);
    assert_eq!(
        update
            .microblocks
            .iter()
            .map(|mb| mb.microblock_sequence)
            .collect::<Vec<_>>(),
        vec![0, 2]
    );
}

#[test]
fn matured_miner_rewards_are_collected() {
    let mut message = new_block_message(108, 108);
    message.matured_miner_rewards = vec![MaturedMinerReward {
        from_index_consensus_hash: index_block_hash(7).to_string(),
        from_stacks_block_hash: block_hash(7).to_string(),
        recipient: "ST2QKZ4FKHAH1NQKYKYAYZPY440FEPK7GZ1R5HBP2".to_string(),
        coinbase_amount: "4000000000".to_string(),
        tx_fees_anchored: "1200".to_string(),
        tx_fees_streamed_confirmed: "34".to_string(),
        tx_fees_streamed_produced: "0".to_string(),
    }];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.miner_rewards.len(), 1);
    let reward = &update.miner_rewards[0];
    assert_eq!(reward.coinbase_amount, 4_000_000_000);
    assert_eq!(reward.mature_block_height, 108);
    assert_eq!(reward.from_index_block_hash, index_block_hash(7));
}

#[test]
fn burn_block_rewards_and_slots_are_indexed_in_emission_order() {
    let store = Arc::new(MemoryStore::new());
    let payload = json!({
        "burn_block_hash": "0xburn01",
        "burn_block_height": 700001,
        "burn_amount": 12000,
        "reward_recipients": [
            { "recipient": "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", "amt": 5000 },
            { "recipient": "1BitcoinEaterAddressDontSendf59kuE", "amt": 5000 },
        ],
        "reward_slot_holders": [
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
            "1BitcoinEaterAddressDontSendf59kuE",
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
        ],
    });
    handle_new_burn_block(&payload, store.as_ref(), &Context::empty()).unwrap();

    let rewards = store.burnchain_rewards_for("0xburn01");
    assert_eq!(rewards.len(), 2);
    assert_eq!(
        rewards.iter().map(|r| r.reward_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
    let holders = store.reward_slot_holders_for("0xburn01");
    assert_eq!(holders.len(), 3);
    assert_eq!(
        holders.iter().map(|h| h.slot_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[test]
fn mempool_admission_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let raw_tx = build_token_transfer_tx_hex(180, 0, 500, 1);
    let payload = json!([raw_tx]);

    handle_new_mempool_txs(&payload, store.as_ref(), &Context::empty()).unwrap();
    handle_new_mempool_txs(&payload, store.as_ref(), &Context::empty()).unwrap();

    assert_eq!(store.mempool_size(), 1);
}

#[test_case("ReplaceByFee", MempoolDropReason::ReplaceByFee; "replace by fee")]
#[test_case("ReplaceAcrossFork", MempoolDropReason::ReplaceAcrossFork; "replace across fork")]
#[test_case("TooExpensive", MempoolDropReason::TooExpensive; "too expensive")]
#[test_case("StaleGarbageCollect", MempoolDropReason::StaleGarbageCollect; "stale")]
#[test_case("Problematic", MempoolDropReason::Problematic; "problematic")]
#[test_case("SomeFutureReason", MempoolDropReason::Dropped; "unknown reason")]
fn dropped_mempool_txs_take_the_mapped_status(reason: &str, expected: MempoolDropReason) {
    let store = Arc::new(MemoryStore::new());
    let raw_tx = build_token_transfer_tx_hex(180, 0, 500, 1);
    let tx_id = codec::decode_transaction(&raw_tx).unwrap().tx_id;

    handle_new_mempool_txs(&json!([raw_tx]), store.as_ref(), &Context::empty()).unwrap();
    handle_drop_mempool_txs(
        &json!({ "dropped_txids": [tx_id], "reason": reason }),
        store.as_ref(),
        &Context::empty(),
    )
    .unwrap();

    let entry = store.get_mempool_tx(&tx_id).unwrap();
    assert!(entry.pruned);
    assert_eq!(entry.status, MempoolTxStatus::Dropped(expected));
}

#[test]
fn attachments_outside_the_registry_are_filtered() {
    use clarity::codec::StacksMessageCodec;
    use clarity::vm::types::{TupleData, Value as ClarityValue};
    use clarity::vm::ClarityName;

    let metadata = ClarityValue::Tuple(
        TupleData::from_data(vec![
            (
                ClarityName::try_from("op").unwrap(),
                ClarityValue::string_ascii_from_bytes(b"update".to_vec()).unwrap(),
            ),
            (
                ClarityName::try_from("name").unwrap(),
                ClarityValue::buff_from(b"alice".to_vec()).unwrap(),
            ),
            (
                ClarityName::try_from("namespace").unwrap(),
                ClarityValue::buff_from(b"btc".to_vec()).unwrap(),
            ),
        ])
        .unwrap(),
    );
    let mut metadata_bytes = vec![];
    metadata.consensus_serialize(&mut metadata_bytes).unwrap();
    let metadata_hex = format!("0x{}", hex::encode(&metadata_bytes));

    let store = Arc::new(MemoryStore::new());
    let payload = json!([
        {
            "attachment_index": 0,
            "index_block_hash": index_block_hash(9),
            "block_height": 900,
            "content_hash": "0xfeed",
            "contract_id": crate::bns::BNS_MAINNET_CONTRACT,
            "metadata": metadata_hex,
            "tx_id": "0x0909",
            "content": "0xdeadbeef",
        },
        {
            "attachment_index": 1,
            "index_block_hash": index_block_hash(9),
            "block_height": 900,
            "content_hash": "0xf00d",
            "contract_id": "SP2QKZ4FKHAH1NQKYKYAYZPY440FEPK7GZ1R5HBP2.not-bns",
            "metadata": metadata_hex,
            "tx_id": "0x0a0a",
            "content": "0xdeadbeef",
        },
    ]);
    handle_new_attachments(&payload, store.as_ref(), &Context::empty()).unwrap();

    let attachments = store.attachments();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].op, "update");
    assert_eq!(attachments[0].name, "alice");
    assert_eq!(attachments[0].zonefile, "deadbeef");
}

#[test]
fn a_dispatched_block_is_visible_atomically() {
    let store = Arc::new(MemoryStore::new());
    let mut message = new_block_message(200, 200);
    message.transactions = vec![tx_entry(
        "0x0101",
        0,
        build_token_transfer_tx_hex(180, 0, 500, 1),
    )];
    message.events = vec![stx_transfer_event("0x0101", 0, 500)];

    dispatch_record(
        EventKind::BlockReceived,
        &json!(message),
        store.as_ref(),
        &Context::empty(),
    )
    .unwrap();

    let stored = store.get_block(&message.index_block_hash).unwrap();
    assert!(stored.block.canonical);
    assert_eq!(stored.txs.len(), 1);
    assert_eq!(stored.txs[0].tx.event_count, 1);
    assert_eq!(stored.txs[0].events.len(), 1);
    let tx = store.get_tx("0x0101").unwrap();
    assert_eq!(tx.block_height, 200);
}

#[test]
fn bns_contract_logs_attach_names_to_their_transaction() {
    use clarity::codec::StacksMessageCodec;
    use clarity::vm::types::{TupleData, Value as ClarityValue};
    use clarity::vm::ClarityName;
    use stacks_ingest_types::events::SmartContractLogEventData;

    let log_value = ClarityValue::Tuple(
        TupleData::from_data(vec![
            (
                ClarityName::try_from("name").unwrap(),
                ClarityValue::buff_from(b"alice".to_vec()).unwrap(),
            ),
            (
                ClarityName::try_from("namespace").unwrap(),
                ClarityValue::buff_from(b"btc".to_vec()).unwrap(),
            ),
        ])
        .unwrap(),
    );
    let mut value_bytes = vec![];
    log_value.consensus_serialize(&mut value_bytes).unwrap();

    let mut message = new_block_message(210, 210);
    message.transactions = vec![tx_entry(
        "0x0101",
        0,
        build_contract_call_tx_hex(
            crate::bns::BNS_TESTNET_CONTRACT,
            "name-register",
            vec![],
            180,
            0,
            1,
        ),
    )];
    let mut log_event = empty_event("0x0101", 0, "contract_event");
    log_event.contract_event = Some(SmartContractLogEventData {
        contract_identifier: crate::bns::BNS_TESTNET_CONTRACT.to_string(),
        topic: "name-register".to_string(),
        raw_value: format!("0x{}", hex::encode(&value_bytes)),
    });
    message.events = vec![log_event];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.txs[0].names.len(), 1);
    assert_eq!(update.txs[0].names[0].name, "alice");
    assert_eq!(update.txs[0].names[0].registered_at, 210);
    // The log itself still lands in the event stream.
    assert_eq!(update.txs[0].tx.event_count, 1);
}

#[test]
fn renewal_without_log_synthesizes_a_name_record() {
    use clarity::vm::types::Value as ClarityValue;

    let mut message = new_block_message(211, 211);
    message.transactions = vec![tx_entry(
        "0x0101",
        0,
        build_contract_call_tx_hex(
            crate::bns::BNS_TESTNET_CONTRACT,
            "name-renewal",
            vec![
                ClarityValue::buff_from(b"btc".to_vec()).unwrap(),
                ClarityValue::buff_from(b"alice".to_vec()).unwrap(),
                ClarityValue::UInt(2500),
                ClarityValue::none(),
                ClarityValue::none(),
            ],
            180,
            0,
            1,
        ),
    )];

    let update = assemble_block_update(&message, &Context::empty()).unwrap();
    assert_eq!(update.txs[0].names.len(), 1);
    let name = &update.txs[0].names[0];
    assert_eq!(name.status, "name-renewal");
    assert_eq!(name.name, "alice");
    assert_eq!(name.registered_at, 211);
    assert_eq!(name.address, update.txs[0].tx.sender_address);
}
