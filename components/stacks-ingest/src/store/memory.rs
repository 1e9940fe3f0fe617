//! In-memory reference implementation of the store contract, including
//! canonical-chain resolution. Used by the binary, replay, and the test
//! suite; relational backends implement the same trait.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value as JsonValue;
use stacks_ingest_types::names::{BnsSubdomain, DbBnsAttachment};
use stacks_ingest_types::{
    BlockUpdate, DbBlock, DbBurnchainReward, DbMempoolTx, DbMicroblock, DbRewardSlotHolder, DbTx,
    MempoolDropReason, MempoolTxStatus, MicroblockUpdate, RawEventRecord, TxUpdate,
    EMPTY_MICROBLOCK_HASH,
};

use super::{IngestionStore, StoreError};

struct StoredBlock {
    update: BlockUpdate,
    commit_seq: u64,
}

#[derive(Default)]
struct ChainState {
    commit_seq: u64,
    blocks: BTreeMap<String, StoredBlock>,
    microblocks: BTreeMap<(String, String), DbMicroblock>,
    unanchored_txs: BTreeMap<String, TxUpdate>,
    mempool: BTreeMap<String, DbMempoolTx>,
    burnchain_rewards: BTreeMap<(String, u32), Vec<DbBurnchainReward>>,
    reward_slot_holders: BTreeMap<(String, u32), Vec<DbRewardSlotHolder>>,
    attachments: Vec<DbBnsAttachment>,
    subdomains: Vec<BnsSubdomain>,
}

pub struct MemoryStore {
    chain: Mutex<ChainState>,
    raw_events: Mutex<Vec<RawEventRecord>>,
    raw_seq: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            chain: Mutex::new(ChainState::default()),
            raw_events: Mutex::new(vec![]),
            raw_seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<ChainState>, StoreError> {
        self.chain
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("poisoned store lock: {}", e)))
    }

    pub fn get_block(&self, index_block_hash: &str) -> Option<BlockUpdate> {
        let chain = self.chain.lock().ok()?;
        chain
            .blocks
            .get(index_block_hash)
            .map(|stored| stored.update.clone())
    }

    pub fn block_commit_seq(&self, index_block_hash: &str) -> Option<u64> {
        let chain = self.chain.lock().ok()?;
        chain
            .blocks
            .get(index_block_hash)
            .map(|stored| stored.commit_seq)
    }

    pub fn canonical_block_at_height(&self, block_height: u32) -> Option<DbBlock> {
        let chain = self.chain.lock().ok()?;
        chain
            .blocks
            .values()
            .find(|stored| {
                stored.update.block.canonical && stored.update.block.block_height == block_height
            })
            .map(|stored| stored.update.block.clone())
    }

    /// The canonical copy of a mined transaction, if any.
    pub fn get_tx(&self, tx_id: &str) -> Option<DbTx> {
        let chain = self.chain.lock().ok()?;
        for stored in chain.blocks.values() {
            for tx_update in stored.update.txs.iter() {
                if tx_update.tx.tx_id == tx_id && tx_update.tx.canonical {
                    return Some(tx_update.tx.clone());
                }
            }
        }
        chain
            .unanchored_txs
            .get(tx_id)
            .map(|tx_update| tx_update.tx.clone())
    }

    pub fn get_mempool_tx(&self, tx_id: &str) -> Option<DbMempoolTx> {
        let chain = self.chain.lock().ok()?;
        chain.mempool.get(tx_id).cloned()
    }

    pub fn mempool_size(&self) -> usize {
        self.chain.lock().map(|chain| chain.mempool.len()).unwrap_or(0)
    }

    pub fn get_microblock(
        &self,
        parent_index_block_hash: &str,
        microblock_hash: &str,
    ) -> Option<DbMicroblock> {
        let chain = self.chain.lock().ok()?;
        chain
            .microblocks
            .get(&(
                parent_index_block_hash.to_string(),
                microblock_hash.to_string(),
            ))
            .cloned()
    }

    pub fn burnchain_rewards_for(&self, burn_block_hash: &str) -> Vec<DbBurnchainReward> {
        let chain = match self.chain.lock() {
            Ok(chain) => chain,
            Err(_) => return vec![],
        };
        chain
            .burnchain_rewards
            .iter()
            .filter(|((hash, _), _)| hash == burn_block_hash)
            .flat_map(|(_, rewards)| rewards.clone())
            .collect()
    }

    pub fn reward_slot_holders_for(&self, burn_block_hash: &str) -> Vec<DbRewardSlotHolder> {
        let chain = match self.chain.lock() {
            Ok(chain) => chain,
            Err(_) => return vec![],
        };
        chain
            .reward_slot_holders
            .iter()
            .filter(|((hash, _), _)| hash == burn_block_hash)
            .flat_map(|(_, holders)| holders.clone())
            .collect()
    }

    pub fn attachments(&self) -> Vec<DbBnsAttachment> {
        self.chain
            .lock()
            .map(|chain| chain.attachments.clone())
            .unwrap_or_default()
    }

    pub fn subdomains(&self) -> Vec<BnsSubdomain> {
        self.chain
            .lock()
            .map(|chain| chain.subdomains.clone())
            .unwrap_or_default()
    }

    /// Deterministic digest of the persisted state, with autogenerated
    /// bookkeeping (receipt dates, commit sequences) masked out. Two
    /// stores fed the same event sequence produce equal snapshots.
    pub fn snapshot(&self) -> JsonValue {
        let chain = match self.chain.lock() {
            Ok(chain) => chain,
            Err(_) => return JsonValue::Null,
        };
        let blocks: Vec<JsonValue> = chain
            .blocks
            .values()
            .map(|stored| json!(stored.update))
            .collect();
        let microblocks: Vec<JsonValue> =
            chain.microblocks.values().map(|mb| json!(mb)).collect();
        let mempool: Vec<JsonValue> = chain
            .mempool
            .values()
            .map(|tx| {
                let mut masked = tx.clone();
                masked.receipt_date = 0;
                json!(masked)
            })
            .collect();
        json!({
            "blocks": blocks,
            "microblocks": microblocks,
            "unanchored_txs": chain.unanchored_txs.values().collect::<Vec<_>>(),
            "mempool": mempool,
            "burnchain_rewards": chain.burnchain_rewards.values().collect::<Vec<_>>(),
            "reward_slot_holders": chain.reward_slot_holders.values().collect::<Vec<_>>(),
            "attachments": chain.attachments,
            "subdomains": chain.subdomains,
        })
    }

    fn confirm_microblock_stream(chain: &mut ChainState, block: &DbBlock) {
        let confirms_stream = !block.parent_microblock_hash.is_empty()
            && block.parent_microblock_hash != EMPTY_MICROBLOCK_HASH;
        for ((parent, _), microblock) in chain.microblocks.iter_mut() {
            if parent != &block.parent_index_block_hash {
                continue;
            }
            if confirms_stream && microblock.microblock_sequence <= block.parent_microblock_sequence
            {
                microblock.index_block_hash = block.index_block_hash.clone();
                microblock.block_hash = block.block_hash.clone();
                microblock.block_height = block.block_height as i64;
                microblock.parent_block_hash = block.parent_block_hash.clone();
                microblock.parent_block_height = block.block_height as i64 - 1;
                microblock.microblock_canonical = true;
            } else if !microblock.is_confirmed() {
                // Left behind by the miner: the stream forked or stopped
                // before this sequence.
                microblock.microblock_canonical = false;
            }
        }
    }

    fn resolve_canonical_chain(chain: &mut ChainState) {
        let tip = chain
            .blocks
            .values()
            .max_by_key(|stored| (stored.update.block.block_height, stored.commit_seq))
            .map(|stored| stored.update.block.index_block_hash.clone());
        let tip = match tip {
            Some(tip) => tip,
            None => return,
        };

        let mut canonical_hashes = HashSet::new();
        let mut cursor = tip;
        while let Some(stored) = chain.blocks.get(&cursor) {
            if !canonical_hashes.insert(cursor.clone()) {
                break;
            }
            cursor = stored.update.block.parent_index_block_hash.clone();
        }

        for (index_block_hash, stored) in chain.blocks.iter_mut() {
            let canonical = canonical_hashes.contains(index_block_hash);
            let update = &mut stored.update;
            update.block.canonical = canonical;
            for microblock in update.microblocks.iter_mut() {
                microblock.canonical = canonical;
            }
            for tx_update in update.txs.iter_mut() {
                tx_update.tx.canonical = canonical;
                for event in tx_update.events.iter_mut() {
                    event.canonical = canonical;
                }
                for name in tx_update.names.iter_mut() {
                    name.canonical = canonical;
                }
                for namespace in tx_update.namespaces.iter_mut() {
                    namespace.canonical = canonical;
                }
            }
            for reward in update.miner_rewards.iter_mut() {
                reward.canonical = canonical;
            }
        }

        let ChainState {
            ref blocks,
            ref mut microblocks,
            ..
        } = *chain;
        for ((parent_index_block_hash, _), microblock) in microblocks.iter_mut() {
            microblock.canonical = if microblock.is_confirmed() {
                canonical_hashes.contains(&microblock.index_block_hash)
            } else {
                // An unconfirmed stream follows the fate of its parent.
                !blocks.contains_key(parent_index_block_hash)
                    || canonical_hashes.contains(parent_index_block_hash)
            };
        }
    }
}

impl IngestionStore for MemoryStore {
    fn update_block(&self, update: BlockUpdate) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        if let Some(existing) = chain.blocks.get(&update.block.index_block_hash) {
            if existing.update.block == update.block {
                return Ok(());
            }
            return Err(StoreError::Conflict(format!(
                "divergent content for block {}",
                update.block.index_block_hash
            )));
        }

        Self::confirm_microblock_stream(&mut chain, &update.block);

        for microblock in update.microblocks.iter() {
            chain.microblocks.insert(
                (
                    microblock.parent_index_block_hash.clone(),
                    microblock.microblock_hash.clone(),
                ),
                microblock.clone(),
            );
        }

        for tx_update in update.txs.iter() {
            chain.unanchored_txs.remove(&tx_update.tx.tx_id);
            if let Some(mempool_entry) = chain.mempool.get_mut(&tx_update.tx.tx_id) {
                mempool_entry.pruned = true;
            }
        }

        chain.commit_seq += 1;
        let commit_seq = chain.commit_seq;
        chain.blocks.insert(
            update.block.index_block_hash.clone(),
            StoredBlock { update, commit_seq },
        );
        Self::resolve_canonical_chain(&mut chain);
        Ok(())
    }

    fn update_microblocks(&self, update: MicroblockUpdate) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        for microblock in update.microblocks.into_iter() {
            let key = (
                microblock.parent_index_block_hash.clone(),
                microblock.microblock_hash.clone(),
            );
            match chain.microblocks.get(&key) {
                // Never regress a confirmed microblock to its streamed shape.
                Some(existing) if existing.is_confirmed() => {}
                _ => {
                    chain.microblocks.insert(key, microblock);
                }
            }
        }
        for tx_update in update.txs.into_iter() {
            if let Some(mempool_entry) = chain.mempool.get_mut(&tx_update.tx.tx_id) {
                mempool_entry.pruned = true;
            }
            chain
                .unanchored_txs
                .insert(tx_update.tx.tx_id.clone(), tx_update);
        }
        chain.commit_seq += 1;
        Ok(())
    }

    fn update_burnchain_rewards(
        &self,
        burn_block_hash: &str,
        burn_block_height: u32,
        rewards: Vec<DbBurnchainReward>,
    ) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        chain
            .burnchain_rewards
            .insert((burn_block_hash.to_string(), burn_block_height), rewards);
        chain.commit_seq += 1;
        Ok(())
    }

    fn update_reward_slot_holders(
        &self,
        burn_block_hash: &str,
        burn_block_height: u32,
        slot_holders: Vec<DbRewardSlotHolder>,
    ) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        chain
            .reward_slot_holders
            .insert((burn_block_hash.to_string(), burn_block_height), slot_holders);
        chain.commit_seq += 1;
        Ok(())
    }

    fn update_mempool_txs(&self, txs: Vec<DbMempoolTx>) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        for mut tx in txs.into_iter() {
            if let Some(existing) = chain.mempool.get(&tx.tx_id) {
                // Re-announcement of a known transaction keeps the original
                // receipt date.
                tx.receipt_date = existing.receipt_date;
            }
            chain.mempool.insert(tx.tx_id.clone(), tx);
        }
        chain.commit_seq += 1;
        Ok(())
    }

    fn drop_mempool_txs(
        &self,
        reason: MempoolDropReason,
        tx_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        for tx_id in tx_ids.iter() {
            if let Some(entry) = chain.mempool.get_mut(tx_id) {
                entry.pruned = true;
                entry.status = MempoolTxStatus::Dropped(reason);
            }
        }
        chain.commit_seq += 1;
        Ok(())
    }

    fn update_attachments(&self, attachments: Vec<DbBnsAttachment>) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        for attachment in attachments.into_iter() {
            let known = chain.attachments.iter().any(|existing| {
                existing.zonefile_hash == attachment.zonefile_hash
                    && existing.tx_id == attachment.tx_id
                    && existing.index_block_hash == attachment.index_block_hash
            });
            if !known {
                chain.attachments.push(attachment);
            }
        }
        chain.commit_seq += 1;
        Ok(())
    }

    fn update_subdomains(&self, subdomains: Vec<BnsSubdomain>) -> Result<(), StoreError> {
        let mut chain = self.lock()?;
        chain.subdomains.extend(subdomains);
        chain.commit_seq += 1;
        Ok(())
    }

    fn store_raw_event_request(
        &self,
        path: &str,
        payload: &JsonValue,
    ) -> Result<u64, StoreError> {
        let seq = self.raw_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut raw_events = self
            .raw_events
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("poisoned raw-event lock: {}", e)))?;
        raw_events.push(RawEventRecord {
            seq,
            path: path.to_string(),
            payload: payload.to_string(),
        });
        Ok(seq)
    }

    fn raw_event_requests(&self) -> Result<Vec<RawEventRecord>, StoreError> {
        let raw_events = self
            .raw_events
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("poisoned raw-event lock: {}", e)))?;
        Ok(raw_events.clone())
    }

    fn prune_raw_event_requests(&self) -> Result<(), StoreError> {
        let mut raw_events = self
            .raw_events
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("poisoned raw-event lock: {}", e)))?;
        raw_events.clear();
        Ok(())
    }

    fn commit_sequence(&self) -> u64 {
        self.chain.lock().map(|chain| chain.commit_seq).unwrap_or(0)
    }

    fn has_ingested_data(&self) -> bool {
        let has_chain_data = self
            .chain
            .lock()
            .map(|chain| {
                !chain.blocks.is_empty()
                    || !chain.microblocks.is_empty()
                    || !chain.mempool.is_empty()
            })
            .unwrap_or(false);
        has_chain_data || self.raw_seq.load(Ordering::SeqCst) > 0
    }
}
