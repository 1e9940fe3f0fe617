pub mod memory;

use std::fmt::Display;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use stacks_ingest_types::names::{BnsSubdomain, DbBnsAttachment};
use stacks_ingest_types::{
    BlockUpdate, DbBurnchainReward, DbMempoolTx, DbRewardSlotHolder, MempoolDropReason,
    MicroblockUpdate, RawEventRecord,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A constraint violation; the typical cause is duplicate delivery and
    /// the node's retry is safe.
    Conflict(String),
    /// Transient connectivity; the node's retry is the recovery path.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StoreError::Conflict(e) => write!(f, "store conflict: {}", e),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {}", e),
        }
    }
}

/// The contract the ingestion engine holds against its backing store.
///
/// Every update call carries a complete causal bundle and commits
/// atomically. Inserts arrive with `canonical = true`; reorg resolution is
/// the store's duty: when a new anchor block's parent chain diverges from
/// the previously canonical branch, the store flips canonicality on the
/// losing branch. Implementations synchronize internally (connections are
/// pooled outside the engine), and the raw-event append must not contend
/// with the typed write path.
pub trait IngestionStore: Send + Sync {
    fn update_block(&self, update: BlockUpdate) -> Result<(), StoreError>;

    /// Accepts unconfirmed microblocks carrying sentinel anchor fields;
    /// the confirming anchor block back-fills them.
    fn update_microblocks(&self, update: MicroblockUpdate) -> Result<(), StoreError>;

    /// The two burnchain calls for one burn block are keyed on
    /// `(burn_block_hash, burn_block_height)` and treated as a
    /// transactional pair.
    fn update_burnchain_rewards(
        &self,
        burn_block_hash: &str,
        burn_block_height: u32,
        rewards: Vec<DbBurnchainReward>,
    ) -> Result<(), StoreError>;

    fn update_reward_slot_holders(
        &self,
        burn_block_hash: &str,
        burn_block_height: u32,
        slot_holders: Vec<DbRewardSlotHolder>,
    ) -> Result<(), StoreError>;

    /// Idempotent on `tx_id`.
    fn update_mempool_txs(&self, txs: Vec<DbMempoolTx>) -> Result<(), StoreError>;

    fn drop_mempool_txs(
        &self,
        reason: MempoolDropReason,
        tx_ids: &[String],
    ) -> Result<(), StoreError>;

    fn update_attachments(&self, attachments: Vec<DbBnsAttachment>) -> Result<(), StoreError>;

    fn update_subdomains(&self, subdomains: Vec<BnsSubdomain>) -> Result<(), StoreError>;

    /// Append-only; returns the assigned monotonic sequence number.
    fn store_raw_event_request(&self, path: &str, payload: &JsonValue)
        -> Result<u64, StoreError>;

    /// All raw records in ascending `seq` order.
    fn raw_event_requests(&self) -> Result<Vec<RawEventRecord>, StoreError>;

    fn prune_raw_event_requests(&self) -> Result<(), StoreError>;

    /// Monotonic counter bumped by every typed commit; exposes the
    /// happened-before order of writes.
    fn commit_sequence(&self) -> u64;

    /// Whether any chain, mempool or raw-event state has been persisted.
    fn has_ingested_data(&self) -> bool;
}

pub type StoreHandle = Arc<dyn IngestionStore>;
