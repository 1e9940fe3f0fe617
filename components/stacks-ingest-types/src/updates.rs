use crate::names::{BnsName, BnsNamespace};
use crate::records::{DbBlock, DbEvent, DbMicroblock, DbMinerReward, DbTx};

/// One transaction together with everything it causes: its normalized
/// events and any name-system records it produced. Every event references
/// the transaction it travels with.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TxUpdate {
    pub tx: DbTx,
    pub events: Vec<DbEvent>,
    pub names: Vec<BnsName>,
    pub namespaces: Vec<BnsNamespace>,
}

/// The complete causal bundle of one anchor block, committed atomically.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BlockUpdate {
    pub block: DbBlock,
    pub microblocks: Vec<DbMicroblock>,
    pub txs: Vec<TxUpdate>,
    pub miner_rewards: Vec<DbMinerReward>,
}

/// A batch of streamed microblocks awaiting anchor confirmation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MicroblockUpdate {
    pub microblocks: Vec<DbMicroblock>,
    pub txs: Vec<TxUpdate>,
}
