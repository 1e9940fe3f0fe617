//! JSON bodies of the node's event endpoints. One schema per endpoint;
//! anything outside these shapes is rejected rather than silently
//! admitted.

use serde_json::Value as JsonValue;
use stacks_ingest_types::events::{
    FtBurnEventData, FtMintEventData, FtTransferEventData, NftBurnEventData, NftMintEventData,
    NftTransferEventData, SmartContractLogEventData, StxBurnEventData, StxLockEventData,
    StxMintEventData, StxTransferEventData,
};
use stacks_ingest_types::ExecutionCost;

/// The endpoint a payload arrived on. Doubles as the record kind of the
/// raw event log, serialized as the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EventKind {
    #[serde(rename = "/new_block")]
    BlockReceived,
    #[serde(rename = "/new_microblocks")]
    MicroblocksReceived,
    #[serde(rename = "/new_burn_block")]
    BurnBlockReceived,
    #[serde(rename = "/new_mempool_tx")]
    MempoolTxsReceived,
    #[serde(rename = "/drop_mempool_tx")]
    MempoolTxsDropped,
    #[serde(rename = "/attachments/new")]
    AttachmentsReceived,
}

impl EventKind {
    pub fn path(&self) -> &'static str {
        match self {
            EventKind::BlockReceived => "/new_block",
            EventKind::MicroblocksReceived => "/new_microblocks",
            EventKind::BurnBlockReceived => "/new_burn_block",
            EventKind::MempoolTxsReceived => "/new_mempool_tx",
            EventKind::MempoolTxsDropped => "/drop_mempool_tx",
            EventKind::AttachmentsReceived => "/attachments/new",
        }
    }

    pub fn from_path(path: &str) -> Option<EventKind> {
        match path {
            "/new_block" => Some(EventKind::BlockReceived),
            "/new_microblocks" => Some(EventKind::MicroblocksReceived),
            "/new_burn_block" => Some(EventKind::BurnBlockReceived),
            "/new_mempool_tx" => Some(EventKind::MempoolTxsReceived),
            "/drop_mempool_tx" => Some(EventKind::MempoolTxsDropped),
            "/attachments/new" => Some(EventKind::AttachmentsReceived),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewBlock {
    pub block_height: u32,
    pub block_hash: String,
    pub index_block_hash: String,
    pub burn_block_height: u32,
    pub burn_block_hash: String,
    pub burn_block_time: i64,
    pub miner_txid: String,
    pub parent_block_hash: String,
    pub parent_index_block_hash: String,
    pub parent_microblock: String,
    pub parent_microblock_sequence: u16,
    pub parent_burn_block_hash: String,
    pub parent_burn_block_height: u32,
    pub parent_burn_block_timestamp: i64,
    pub transactions: Vec<NewTransaction>,
    pub events: Vec<NewEvent>,
    pub matured_miner_rewards: Vec<MaturedMinerReward>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewTransaction {
    pub txid: String,
    pub tx_index: u32,
    pub status: String,
    pub raw_result: String,
    pub raw_tx: String,
    pub execution_cost: Option<ExecutionCost>,
    pub microblock_sequence: Option<u16>,
    pub microblock_hash: Option<String>,
    pub microblock_parent_hash: Option<String>,
    pub contract_interface: Option<JsonValue>,
    /// @deprecated the node used to emit `contract_abi` instead
    pub contract_abi: Option<JsonValue>,
}

impl NewTransaction {
    pub fn contract_interface(&self) -> Option<&JsonValue> {
        self.contract_interface
            .as_ref()
            .or(self.contract_abi.as_ref())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MaturedMinerReward {
    pub from_index_consensus_hash: String,
    pub from_stacks_block_hash: String,
    pub recipient: String,
    pub coinbase_amount: String,
    /// micro-STX amount
    pub tx_fees_anchored: String,
    /// micro-STX amount
    pub tx_fees_streamed_confirmed: String,
    /// micro-STX amount
    pub tx_fees_streamed_produced: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewEvent {
    pub txid: String,
    pub committed: bool,
    pub event_index: u32,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_event: Option<SmartContractLogEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx_transfer_event: Option<StxTransferEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx_mint_event: Option<StxMintEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx_burn_event: Option<StxBurnEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx_lock_event: Option<StxLockEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ft_transfer_event: Option<FtTransferEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ft_mint_event: Option<FtMintEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ft_burn_event: Option<FtBurnEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft_transfer_event: Option<NftTransferEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft_mint_event: Option<NftMintEventData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft_burn_event: Option<NftBurnEventData>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewMicroblockTrail {
    pub parent_index_block_hash: String,
    pub burn_block_hash: String,
    pub burn_block_height: u32,
    pub burn_block_timestamp: i64,
    pub transactions: Vec<NewMicroblockTransaction>,
    pub events: Vec<NewEvent>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewMicroblockTransaction {
    pub txid: String,
    pub tx_index: u32,
    pub status: String,
    pub raw_result: String,
    pub raw_tx: String,
    pub execution_cost: Option<ExecutionCost>,
    pub microblock_sequence: u16,
    pub microblock_hash: String,
    pub microblock_parent_hash: String,
    pub contract_interface: Option<JsonValue>,
    pub contract_abi: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewBurnBlock {
    pub burn_block_hash: String,
    pub burn_block_height: u32,
    pub burn_amount: u64,
    pub reward_recipients: Vec<RewardRecipient>,
    pub reward_slot_holders: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RewardRecipient {
    pub recipient: String,
    pub amt: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DropMempoolTxMessage {
    pub dropped_txids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewAttachment {
    pub attachment_index: u32,
    pub index_block_hash: String,
    pub block_height: u64,
    pub content_hash: String,
    pub contract_id: String,
    pub metadata: String,
    pub tx_id: String,
    pub content: String,
}
