pub mod messages;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::Value as JsonValue;
use stacks_ingest_types::names::{BnsName, BnsNamespace, DbBnsAttachment};
use stacks_ingest_types::{
    BlockUpdate, DbAssetEventSub, DbBlock, DbBurnchainReward, DbEvent, DbEventPayload,
    DbMempoolTx, DbMicroblock, DbMinerReward, DbNftEventSub, DbRewardSlotHolder, DbTx,
    ExecutionCost, MempoolDropReason, MempoolTxStatus, MicroblockUpdate, TxUpdate,
};

use crate::bns::{self, BnsLogRecord};
use crate::codec::{self, clarity_value_bytes, DecodeError, DecodedTx};
use crate::store::{IngestionStore, StoreError};
use crate::try_warn;
use crate::utils::Context;

use self::messages::{
    DropMempoolTxMessage, EventKind, NewAttachment, NewBlock, NewBurnBlock, NewEvent,
    NewMicroblockTrail,
};

#[derive(Debug)]
pub enum IngestError {
    Decode(DecodeError),
    ReferenceMissing(String),
    Store(StoreError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            IngestError::Decode(e) => write!(f, "{}", e),
            IngestError::ReferenceMissing(e) => write!(f, "missing reference: {}", e),
            IngestError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl From<DecodeError> for IngestError {
    fn from(e: DecodeError) -> IngestError {
        IngestError::Decode(e)
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> IngestError {
        IngestError::Store(e)
    }
}

/// Apply one recorded `(path, payload)` pair to the store. This is the
/// single entry point shared by the run loop and event replay.
pub fn dispatch_record(
    kind: EventKind,
    payload: &JsonValue,
    store: &dyn IngestionStore,
    ctx: &Context,
) -> Result<(), IngestError> {
    match kind {
        EventKind::BlockReceived => handle_new_block(payload, store, ctx),
        EventKind::MicroblocksReceived => handle_new_microblocks(payload, store, ctx),
        EventKind::BurnBlockReceived => handle_new_burn_block(payload, store, ctx),
        EventKind::MempoolTxsReceived => handle_new_mempool_txs(payload, store, ctx),
        EventKind::MempoolTxsDropped => handle_drop_mempool_txs(payload, store, ctx),
        EventKind::AttachmentsReceived => handle_new_attachments(payload, store, ctx),
    }
}

pub fn handle_new_block(
    payload: &JsonValue,
    store: &dyn IngestionStore,
    ctx: &Context,
) -> Result<(), IngestError> {
    let message: NewBlock = Deserialize::deserialize(payload)
        .map_err(|e| DecodeError::Message(format!("unable to parse block: {}", e)))?;
    let update = assemble_block_update(&message, ctx)?;
    store.update_block(update)?;
    Ok(())
}

pub fn handle_new_microblocks(
    payload: &JsonValue,
    store: &dyn IngestionStore,
    ctx: &Context,
) -> Result<(), IngestError> {
    let message: NewMicroblockTrail = Deserialize::deserialize(payload)
        .map_err(|e| DecodeError::Message(format!("unable to parse microblock trail: {}", e)))?;
    let update = assemble_microblock_update(&message, ctx)?;
    store.update_microblocks(update)?;
    Ok(())
}

pub fn handle_new_burn_block(
    payload: &JsonValue,
    store: &dyn IngestionStore,
    _ctx: &Context,
) -> Result<(), IngestError> {
    let message: NewBurnBlock = Deserialize::deserialize(payload)
        .map_err(|e| DecodeError::Message(format!("unable to parse burn block: {}", e)))?;

    let rewards = message
        .reward_recipients
        .iter()
        .enumerate()
        .map(|(i, recipient)| DbBurnchainReward {
            burn_block_hash: message.burn_block_hash.clone(),
            burn_block_height: message.burn_block_height,
            burn_amount: message.burn_amount as u128,
            reward_recipient: recipient.recipient.clone(),
            reward_amount: recipient.amt as u128,
            reward_index: i as u32,
        })
        .collect();
    let slot_holders = message
        .reward_slot_holders
        .iter()
        .enumerate()
        .map(|(i, address)| DbRewardSlotHolder {
            burn_block_hash: message.burn_block_hash.clone(),
            burn_block_height: message.burn_block_height,
            address: address.clone(),
            slot_index: i as u32,
        })
        .collect();

    // The store treats the pair as one transaction for this burn block.
    store.update_burnchain_rewards(&message.burn_block_hash, message.burn_block_height, rewards)?;
    store.update_reward_slot_holders(
        &message.burn_block_hash,
        message.burn_block_height,
        slot_holders,
    )?;
    Ok(())
}

pub fn handle_new_mempool_txs(
    payload: &JsonValue,
    store: &dyn IngestionStore,
    _ctx: &Context,
) -> Result<(), IngestError> {
    let raw_txs: Vec<String> = Deserialize::deserialize(payload)
        .map_err(|e| DecodeError::Message(format!("unable to parse mempool batch: {}", e)))?;
    // TODO: stamp admissions with a node-provided receipt time once the
    // node reports one; the local clock stands in for it.
    let receipt_date = epoch_seconds();
    let mut txs = Vec::with_capacity(raw_txs.len());
    for raw_tx in raw_txs.iter() {
        let decoded = codec::decode_transaction(raw_tx)?;
        txs.push(DbMempoolTx {
            tx_id: decoded.tx_id.clone(),
            nonce: decoded.nonce,
            type_id: decoded.type_id(),
            sender_address: decoded.sender_address.clone(),
            sponsor_address: decoded.sponsor_address.clone(),
            origin_hash_mode: decoded.origin_hash_mode,
            fee: decoded.fee,
            raw_tx: decoded.raw_tx.clone(),
            payload: decoded.payload.clone(),
            receipt_date,
            pruned: false,
            status: MempoolTxStatus::Pending,
        });
    }
    store.update_mempool_txs(txs)?;
    Ok(())
}

pub fn handle_drop_mempool_txs(
    payload: &JsonValue,
    store: &dyn IngestionStore,
    _ctx: &Context,
) -> Result<(), IngestError> {
    let message: DropMempoolTxMessage = Deserialize::deserialize(payload)
        .map_err(|e| DecodeError::Message(format!("unable to parse drop batch: {}", e)))?;
    let reason = MempoolDropReason::from_reason(&message.reason);
    store.drop_mempool_txs(reason, &message.dropped_txids)?;
    Ok(())
}

pub fn handle_new_attachments(
    payload: &JsonValue,
    store: &dyn IngestionStore,
    _ctx: &Context,
) -> Result<(), IngestError> {
    let message: Vec<NewAttachment> = Deserialize::deserialize(payload)
        .map_err(|e| DecodeError::Message(format!("unable to parse attachments: {}", e)))?;
    let mut attachments = vec![];
    for attachment in message.iter() {
        if !bns::is_bns_contract(&attachment.contract_id) {
            continue;
        }
        let metadata = bns::decode_attachment_metadata(&attachment.metadata)?;
        attachments.push(DbBnsAttachment {
            op: metadata.op,
            name: metadata.name,
            namespace_id: metadata.namespace,
            zonefile_hash: attachment.content_hash.clone(),
            zonefile: bns::strip_zonefile_content(&attachment.content),
            attachment_index: attachment.attachment_index,
            index_block_hash: attachment.index_block_hash.clone(),
            block_height: attachment.block_height,
            tx_id: attachment.tx_id.clone(),
        });
    }
    store.update_attachments(attachments)?;
    Ok(())
}

/// Decode every transaction, scatter the block's events onto their owners,
/// normalize per-transaction event indexes, reconstruct the confirmed
/// microblock stream and collect matured rewards: the complete causal
/// bundle for one anchor block.
pub fn assemble_block_update(message: &NewBlock, ctx: &Context) -> Result<BlockUpdate, IngestError> {
    let mut block_cost = ExecutionCost::default();
    let mut builders: Vec<TxBundleBuilder> = vec![];
    let mut builder_index: HashMap<String, usize> = HashMap::new();

    for tx in message.transactions.iter() {
        let decoded = codec::decode_transaction(&tx.raw_tx)?;
        if let Some(cost) = tx.execution_cost.as_ref() {
            block_cost.add(cost);
        }
        let db_tx = DbTx {
            tx_id: tx.txid.clone(),
            tx_index: tx.tx_index,
            nonce: decoded.nonce,
            type_id: decoded.type_id(),
            index_block_hash: message.index_block_hash.clone(),
            block_hash: message.block_hash.clone(),
            block_height: message.block_height as i64,
            burn_block_time: message.burn_block_time,
            parent_block_hash: message.parent_block_hash.clone(),
            parent_index_block_hash: message.parent_index_block_hash.clone(),
            microblock_hash: tx.microblock_hash.clone(),
            microblock_sequence: tx.microblock_sequence,
            sender_address: decoded.sender_address.clone(),
            sponsor_address: decoded.sponsor_address.clone(),
            origin_hash_mode: decoded.origin_hash_mode,
            fee: decoded.fee,
            anchor_mode: decoded.anchor_mode,
            post_condition_mode: decoded.post_condition_mode,
            post_conditions: decoded.post_conditions.clone(),
            raw_tx: decoded.raw_tx.clone(),
            payload: decoded.payload.clone(),
            status: tx.status.clone(),
            raw_result: tx.raw_result.clone(),
            event_count: 0,
            execution_cost: tx.execution_cost.clone(),
            contract_abi: tx.contract_interface().cloned(),
            canonical: true,
        };
        builder_index.insert(tx.txid.clone(), builders.len());
        builders.push(TxBundleBuilder::new(db_tx, decoded));
    }

    scatter_events(&message.events, &mut builders, &builder_index)?;

    let mut txs = Vec::with_capacity(builders.len());
    for mut builder in builders.into_iter() {
        builder.synthesize_missing_renewal(message.block_height as u64)?;
        txs.push(builder.settle());
    }

    let microblocks = reconstruct_anchored_microblocks(message, ctx);
    let miner_rewards = collect_miner_rewards(message)?;

    Ok(BlockUpdate {
        block: DbBlock {
            block_hash: message.block_hash.clone(),
            index_block_hash: message.index_block_hash.clone(),
            parent_index_block_hash: message.parent_index_block_hash.clone(),
            parent_block_hash: message.parent_block_hash.clone(),
            parent_microblock_hash: message.parent_microblock.clone(),
            parent_microblock_sequence: message.parent_microblock_sequence,
            block_height: message.block_height,
            burn_block_time: message.burn_block_time,
            burn_block_hash: message.burn_block_hash.clone(),
            burn_block_height: message.burn_block_height,
            miner_txid: message.miner_txid.clone(),
            execution_cost: block_cost,
            canonical: true,
        },
        microblocks,
        txs,
        miner_rewards,
    })
}

/// Same pipeline as the anchor path, with sentinels standing in for every
/// anchor-only field until the confirming block arrives.
pub fn assemble_microblock_update(
    message: &NewMicroblockTrail,
    ctx: &Context,
) -> Result<MicroblockUpdate, IngestError> {
    let mut builders: Vec<TxBundleBuilder> = vec![];
    let mut builder_index: HashMap<String, usize> = HashMap::new();

    for tx in message.transactions.iter() {
        let decoded = codec::decode_transaction(&tx.raw_tx)?;
        let db_tx = DbTx {
            tx_id: tx.txid.clone(),
            tx_index: tx.tx_index,
            nonce: decoded.nonce,
            type_id: decoded.type_id(),
            index_block_hash: String::new(),
            block_hash: String::new(),
            block_height: -1,
            burn_block_time: -1,
            parent_block_hash: String::new(),
            parent_index_block_hash: message.parent_index_block_hash.clone(),
            microblock_hash: Some(tx.microblock_hash.clone()),
            microblock_sequence: Some(tx.microblock_sequence),
            sender_address: decoded.sender_address.clone(),
            sponsor_address: decoded.sponsor_address.clone(),
            origin_hash_mode: decoded.origin_hash_mode,
            fee: decoded.fee,
            anchor_mode: decoded.anchor_mode,
            post_condition_mode: decoded.post_condition_mode,
            post_conditions: decoded.post_conditions.clone(),
            raw_tx: decoded.raw_tx.clone(),
            payload: decoded.payload.clone(),
            status: tx.status.clone(),
            raw_result: tx.raw_result.clone(),
            event_count: 0,
            execution_cost: tx.execution_cost.clone(),
            contract_abi: tx
                .contract_interface
                .as_ref()
                .or(tx.contract_abi.as_ref())
                .cloned(),
            canonical: true,
        };
        builder_index.insert(tx.txid.clone(), builders.len());
        builders.push(TxBundleBuilder::new(db_tx, decoded));
    }

    scatter_events(&message.events, &mut builders, &builder_index)?;

    let mut txs = Vec::with_capacity(builders.len());
    for builder in builders.into_iter() {
        txs.push(builder.settle());
    }

    let headers: Vec<MicroblockHeader> = message
        .transactions
        .iter()
        .map(|tx| MicroblockHeader {
            hash: tx.microblock_hash.clone(),
            sequence: tx.microblock_sequence,
            parent_hash: tx.microblock_parent_hash.clone(),
            tx_index: tx.tx_index,
        })
        .collect();
    let microblocks = group_microblock_headers(headers, ctx)
        .into_iter()
        .map(|group| DbMicroblock {
            microblock_hash: group.hash,
            microblock_sequence: group.sequence,
            microblock_parent_hash: group.parent_hash,
            parent_index_block_hash: message.parent_index_block_hash.clone(),
            parent_burn_block_height: message.burn_block_height,
            parent_burn_block_hash: message.burn_block_hash.clone(),
            parent_burn_block_time: message.burn_block_timestamp,
            block_height: -1,
            parent_block_height: -1,
            parent_block_hash: String::new(),
            index_block_hash: String::new(),
            block_hash: String::new(),
            canonical: true,
            microblock_canonical: true,
        })
        .collect();

    Ok(MicroblockUpdate { microblocks, txs })
}

fn collect_miner_rewards(message: &NewBlock) -> Result<Vec<DbMinerReward>, IngestError> {
    let mut rewards = Vec::with_capacity(message.matured_miner_rewards.len());
    for reward in message.matured_miner_rewards.iter() {
        rewards.push(DbMinerReward {
            block_hash: message.block_hash.clone(),
            index_block_hash: message.index_block_hash.clone(),
            from_index_block_hash: reward.from_index_consensus_hash.clone(),
            mature_block_height: message.block_height,
            recipient: reward.recipient.clone(),
            coinbase_amount: parse_u128(&reward.coinbase_amount, "coinbase_amount")?,
            tx_fees_anchored: parse_u128(&reward.tx_fees_anchored, "tx_fees_anchored")?,
            tx_fees_streamed_confirmed: parse_u128(
                &reward.tx_fees_streamed_confirmed,
                "tx_fees_streamed_confirmed",
            )?,
            tx_fees_streamed_produced: parse_u128(
                &reward.tx_fees_streamed_produced,
                "tx_fees_streamed_produced",
            )?,
            canonical: true,
        });
    }
    Ok(rewards)
}

/// One transaction's scratch state while a block bundle is assembled:
/// the row under construction, the parsed transaction, and the per-kind
/// event buckets filled during scatter.
struct TxBundleBuilder {
    tx: DbTx,
    decoded: DecodedTx,
    buckets: EventBuckets,
    names: Vec<BnsName>,
    namespaces: Vec<BnsNamespace>,
}

impl TxBundleBuilder {
    fn new(tx: DbTx, decoded: DecodedTx) -> TxBundleBuilder {
        TxBundleBuilder {
            tx,
            decoded,
            buckets: EventBuckets::default(),
            names: vec![],
            namespaces: vec![],
        }
    }

    /// A renewal that carries no zonefile hash emits no contract log; the
    /// record is rebuilt from the call arguments instead.
    fn synthesize_missing_renewal(&mut self, block_height: u64) -> Result<(), IngestError> {
        let has_renewal_log = self.names.iter().any(|name| name.status == "name-renewal");
        if has_renewal_log {
            return Ok(());
        }
        if let Some(name) = bns::extract_renewal_from_contract_call(&self.decoded, block_height)? {
            self.names.push(name);
        }
        Ok(())
    }

    fn settle(self) -> TxUpdate {
        let TxBundleBuilder {
            mut tx,
            buckets,
            names,
            namespaces,
            ..
        } = self;
        let events = buckets.settle(&tx);
        tx.event_count = events.len() as u32;
        TxUpdate {
            tx,
            events,
            names,
            namespaces,
        }
    }
}

/// Per-kind event buckets. Entries keep the node's block-relative
/// `event_index` so the merged sequence can be re-sorted into emission
/// order before renumbering.
#[derive(Default)]
struct EventBuckets {
    contract_logs: Vec<(u32, DbEventPayload)>,
    stx_lock_events: Vec<(u32, DbEventPayload)>,
    stx_events: Vec<(u32, DbEventPayload)>,
    ft_events: Vec<(u32, DbEventPayload)>,
    nft_events: Vec<(u32, DbEventPayload)>,
}

impl EventBuckets {
    /// Merge, re-sort by original index (stable, so duplicate indexes keep
    /// input order), renumber from zero.
    fn settle(self, tx: &DbTx) -> Vec<DbEvent> {
        let mut merged = self.contract_logs;
        merged.extend(self.stx_lock_events);
        merged.extend(self.stx_events);
        merged.extend(self.ft_events);
        merged.extend(self.nft_events);
        merged.sort_by_key(|(original_index, _)| *original_index);
        merged
            .into_iter()
            .enumerate()
            .map(|(i, (_, payload))| DbEvent {
                event_index: i as u32,
                tx_id: tx.tx_id.clone(),
                tx_index: tx.tx_index,
                block_height: tx.block_height,
                canonical: true,
                payload,
            })
            .collect()
    }
}

fn scatter_events(
    events: &[NewEvent],
    builders: &mut [TxBundleBuilder],
    builder_index: &HashMap<String, usize>,
) -> Result<(), IngestError> {
    for event in events.iter() {
        if !event.committed {
            continue;
        }
        let builder = builder_index
            .get(&event.txid)
            .and_then(|i| builders.get_mut(*i))
            .ok_or_else(|| {
                IngestError::ReferenceMissing(format!(
                    "event {} references absent transaction {}",
                    event.event_index, event.txid
                ))
            })?;

        match event.event_type.as_str() {
            "contract_event" => {
                let data = event.contract_event.as_ref().ok_or_else(|| {
                    missing_event_payload("contract_event", event.event_index)
                })?;
                if let Some(record) = bns::extract_from_contract_log(
                    &data.contract_identifier,
                    &data.topic,
                    &data.raw_value,
                    &event.txid,
                    builder.tx.block_height.max(0) as u64,
                )? {
                    match record {
                        BnsLogRecord::Name(name) => builder.names.push(name),
                        BnsLogRecord::Namespace(namespace) => builder.namespaces.push(namespace),
                    }
                }
                builder.buckets.contract_logs.push((
                    event.event_index,
                    DbEventPayload::SmartContractLog {
                        contract_identifier: data.contract_identifier.clone(),
                        topic: data.topic.clone(),
                        value: clarity_value_bytes(&data.raw_value)?,
                    },
                ));
            }
            "stx_lock_event" => {
                let data = event.stx_lock_event.as_ref().ok_or_else(|| {
                    missing_event_payload("stx_lock_event", event.event_index)
                })?;
                builder.buckets.stx_lock_events.push((
                    event.event_index,
                    DbEventPayload::StxLock {
                        locked_amount: parse_u128(&data.locked_amount, "locked_amount")?,
                        unlock_height: parse_u32(&data.unlock_height, "unlock_height")?,
                        locked_address: data.locked_address.clone(),
                    },
                ));
            }
            "stx_transfer_event" => {
                let data = event.stx_transfer_event.as_ref().ok_or_else(|| {
                    missing_event_payload("stx_transfer_event", event.event_index)
                })?;
                builder.buckets.stx_events.push((
                    event.event_index,
                    DbEventPayload::StxAsset {
                        sub: DbAssetEventSub::Transfer {
                            sender: data.sender.clone(),
                            recipient: data.recipient.clone(),
                            amount: parse_u128(&data.amount, "amount")?,
                        },
                    },
                ));
            }
            "stx_mint_event" => {
                let data = event.stx_mint_event.as_ref().ok_or_else(|| {
                    missing_event_payload("stx_mint_event", event.event_index)
                })?;
                builder.buckets.stx_events.push((
                    event.event_index,
                    DbEventPayload::StxAsset {
                        sub: DbAssetEventSub::Mint {
                            recipient: data.recipient.clone(),
                            amount: parse_u128(&data.amount, "amount")?,
                        },
                    },
                ));
            }
            "stx_burn_event" => {
                let data = event.stx_burn_event.as_ref().ok_or_else(|| {
                    missing_event_payload("stx_burn_event", event.event_index)
                })?;
                builder.buckets.stx_events.push((
                    event.event_index,
                    DbEventPayload::StxAsset {
                        sub: DbAssetEventSub::Burn {
                            sender: data.sender.clone(),
                            amount: parse_u128(&data.amount, "amount")?,
                        },
                    },
                ));
            }
            "ft_transfer_event" => {
                let data = event.ft_transfer_event.as_ref().ok_or_else(|| {
                    missing_event_payload("ft_transfer_event", event.event_index)
                })?;
                builder.buckets.ft_events.push((
                    event.event_index,
                    DbEventPayload::FungibleTokenAsset {
                        asset_identifier: data.asset_identifier.clone(),
                        sub: DbAssetEventSub::Transfer {
                            sender: data.sender.clone(),
                            recipient: data.recipient.clone(),
                            amount: parse_u128(&data.amount, "amount")?,
                        },
                    },
                ));
            }
            "ft_mint_event" => {
                let data = event.ft_mint_event.as_ref().ok_or_else(|| {
                    missing_event_payload("ft_mint_event", event.event_index)
                })?;
                builder.buckets.ft_events.push((
                    event.event_index,
                    DbEventPayload::FungibleTokenAsset {
                        asset_identifier: data.asset_identifier.clone(),
                        sub: DbAssetEventSub::Mint {
                            recipient: data.recipient.clone(),
                            amount: parse_u128(&data.amount, "amount")?,
                        },
                    },
                ));
            }
            "ft_burn_event" => {
                let data = event.ft_burn_event.as_ref().ok_or_else(|| {
                    missing_event_payload("ft_burn_event", event.event_index)
                })?;
                builder.buckets.ft_events.push((
                    event.event_index,
                    DbEventPayload::FungibleTokenAsset {
                        asset_identifier: data.asset_identifier.clone(),
                        sub: DbAssetEventSub::Burn {
                            sender: data.sender.clone(),
                            amount: parse_u128(&data.amount, "amount")?,
                        },
                    },
                ));
            }
            "nft_transfer_event" => {
                let data = event.nft_transfer_event.as_ref().ok_or_else(|| {
                    missing_event_payload("nft_transfer_event", event.event_index)
                })?;
                builder.buckets.nft_events.push((
                    event.event_index,
                    DbEventPayload::NonFungibleTokenAsset {
                        asset_identifier: data.asset_identifier.clone(),
                        value: clarity_value_bytes(&data.raw_value)?,
                        sub: DbNftEventSub::Transfer {
                            sender: data.sender.clone(),
                            recipient: data.recipient.clone(),
                        },
                    },
                ));
            }
            "nft_mint_event" => {
                let data = event.nft_mint_event.as_ref().ok_or_else(|| {
                    missing_event_payload("nft_mint_event", event.event_index)
                })?;
                builder.buckets.nft_events.push((
                    event.event_index,
                    DbEventPayload::NonFungibleTokenAsset {
                        asset_identifier: data.asset_identifier.clone(),
                        value: clarity_value_bytes(&data.raw_value)?,
                        sub: DbNftEventSub::Mint {
                            recipient: data.recipient.clone(),
                        },
                    },
                ));
            }
            "nft_burn_event" => {
                let data = event.nft_burn_event.as_ref().ok_or_else(|| {
                    missing_event_payload("nft_burn_event", event.event_index)
                })?;
                builder.buckets.nft_events.push((
                    event.event_index,
                    DbEventPayload::NonFungibleTokenAsset {
                        asset_identifier: data.asset_identifier.clone(),
                        value: clarity_value_bytes(&data.raw_value)?,
                        sub: DbNftEventSub::Burn {
                            sender: data.sender.clone(),
                        },
                    },
                ));
            }
            unknown => {
                return Err(DecodeError::Message(format!(
                    "unknown event type {} at index {}",
                    unknown, event.event_index
                ))
                .into());
            }
        }
    }
    Ok(())
}

struct MicroblockHeader {
    hash: String,
    sequence: u16,
    parent_hash: String,
    tx_index: u32,
}

struct MicroblockGroup {
    hash: String,
    sequence: u16,
    parent_hash: String,
}

/// A microblock is implied by the headers its transactions carry: group by
/// `(sequence, hash)` and let the earliest transaction of each group speak
/// for it. Gaps in the sequence are accepted (the stream was partially
/// orphaned) but worth surfacing.
fn group_microblock_headers(headers: Vec<MicroblockHeader>, ctx: &Context) -> Vec<MicroblockGroup> {
    let mut groups: BTreeMap<(u16, String), MicroblockHeader> = BTreeMap::new();
    for header in headers.into_iter() {
        let key = (header.sequence, header.hash.clone());
        match groups.get(&key) {
            Some(existing) if existing.tx_index <= header.tx_index => {}
            _ => {
                groups.insert(key, header);
            }
        }
    }

    let mut previous_sequence: Option<u16> = None;
    let mut result = vec![];
    for ((sequence, hash), representative) in groups.into_iter() {
        if let Some(previous) = previous_sequence {
            if sequence != previous + 1 {
                try_warn!(
                    ctx,
                    "microblock sequence gap between {} and {} in stream containing {}",
                    previous,
                    sequence,
                    hash
                );
            }
        }
        previous_sequence = Some(sequence);
        result.push(MicroblockGroup {
            hash,
            sequence,
            parent_hash: representative.parent_hash,
        });
    }
    result
}

fn reconstruct_anchored_microblocks(message: &NewBlock, ctx: &Context) -> Vec<DbMicroblock> {
    let headers: Vec<MicroblockHeader> = message
        .transactions
        .iter()
        .filter_map(|tx| match (&tx.microblock_hash, tx.microblock_sequence) {
            (Some(hash), Some(sequence)) => Some(MicroblockHeader {
                hash: hash.clone(),
                sequence,
                parent_hash: tx.microblock_parent_hash.clone().unwrap_or_default(),
                tx_index: tx.tx_index,
            }),
            _ => None,
        })
        .collect();

    group_microblock_headers(headers, ctx)
        .into_iter()
        .map(|group| DbMicroblock {
            microblock_hash: group.hash,
            microblock_sequence: group.sequence,
            microblock_parent_hash: group.parent_hash,
            parent_index_block_hash: message.parent_index_block_hash.clone(),
            parent_burn_block_height: message.parent_burn_block_height,
            parent_burn_block_hash: message.parent_burn_block_hash.clone(),
            parent_burn_block_time: message.parent_burn_block_timestamp,
            block_height: message.block_height as i64,
            parent_block_height: message.block_height as i64 - 1,
            parent_block_hash: message.parent_block_hash.clone(),
            index_block_hash: message.index_block_hash.clone(),
            block_hash: message.block_hash.clone(),
            canonical: true,
            microblock_canonical: true,
        })
        .collect()
}

fn missing_event_payload(event_type: &str, event_index: u32) -> IngestError {
    DecodeError::Message(format!(
        "event {} tagged {} carries no matching payload",
        event_index, event_type
    ))
    .into()
}

fn parse_u128(value: &str, what: &str) -> Result<u128, IngestError> {
    value
        .parse::<u128>()
        .map_err(|e| DecodeError::Message(format!("invalid {}: {}", what, e)).into())
}

fn parse_u32(value: &str, what: &str) -> Result<u32, IngestError> {
    value
        .parse::<u32>()
        .map_err(|e| DecodeError::Message(format!("invalid {}: {}", what, e)).into())
}

fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
pub mod tests;
