use std::fmt::Display;

use serde_json::Value as JsonValue;

/// Runtime cost counters attached by the node to transactions, and
/// aggregated per block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionCost {
    pub read_count: u64,
    pub read_length: u64,
    pub runtime: u64,
    pub write_count: u64,
    pub write_length: u64,
}

impl ExecutionCost {
    pub fn add(&mut self, other: &ExecutionCost) {
        self.read_count += other.read_count;
        self.read_length += other.read_length;
        self.runtime += other.runtime;
        self.write_count += other.write_count;
        self.write_length += other.write_length;
    }
}

/// An anchor block as persisted. Inserted with `canonical = true`; the
/// store flips canonicality when resolving a reorg.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbBlock {
    pub block_hash: String,
    pub index_block_hash: String,
    pub parent_index_block_hash: String,
    pub parent_block_hash: String,
    pub parent_microblock_hash: String,
    pub parent_microblock_sequence: u16,
    pub block_height: u32,
    pub burn_block_time: i64,
    pub burn_block_hash: String,
    pub burn_block_height: u32,
    pub miner_txid: String,
    pub execution_cost: ExecutionCost,
    pub canonical: bool,
}

/// A streamed microblock. Until the confirming anchor block arrives,
/// `index_block_hash` and `block_hash` hold empty sentinels and
/// `block_height` is -1.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbMicroblock {
    pub microblock_hash: String,
    pub microblock_sequence: u16,
    pub microblock_parent_hash: String,
    pub parent_index_block_hash: String,
    pub parent_burn_block_height: u32,
    pub parent_burn_block_hash: String,
    pub parent_burn_block_time: i64,
    pub block_height: i64,
    pub parent_block_height: i64,
    pub parent_block_hash: String,
    pub index_block_hash: String,
    pub block_hash: String,
    pub canonical: bool,
    pub microblock_canonical: bool,
}

impl DbMicroblock {
    pub fn is_confirmed(&self) -> bool {
        !self.index_block_hash.is_empty()
    }
}

/// Discriminant stored alongside each transaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[repr(u8)]
pub enum DbTxTypeId {
    TokenTransfer = 0x00,
    SmartContract = 0x01,
    ContractCall = 0x02,
    PoisonMicroblock = 0x03,
    Coinbase = 0x04,
    VersionedSmartContract = 0x06,
}

/// The decoded transaction payload. Closed set: a payload the decoder
/// does not recognize is a decode error, never a silent admission.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum DbTxPayload {
    TokenTransfer {
        recipient: String,
        amount: u64,
        memo: Vec<u8>,
    },
    ContractCall {
        contract_identifier: String,
        function_name: String,
        function_args: Vec<String>,
    },
    SmartContract {
        contract_identifier: String,
        source_code: String,
    },
    VersionedSmartContract {
        contract_identifier: String,
        source_code: String,
        clarity_version: u8,
    },
    PoisonMicroblock {
        microblock_header_1: Vec<u8>,
        microblock_header_2: Vec<u8>,
    },
    Coinbase {
        payload: Vec<u8>,
        alt_recipient: Option<String>,
    },
}

impl DbTxPayload {
    pub fn type_id(&self) -> DbTxTypeId {
        match self {
            DbTxPayload::TokenTransfer { .. } => DbTxTypeId::TokenTransfer,
            DbTxPayload::ContractCall { .. } => DbTxTypeId::ContractCall,
            DbTxPayload::SmartContract { .. } => DbTxTypeId::SmartContract,
            DbTxPayload::VersionedSmartContract { .. } => DbTxTypeId::VersionedSmartContract,
            DbTxPayload::PoisonMicroblock { .. } => DbTxTypeId::PoisonMicroblock,
            DbTxPayload::Coinbase { .. } => DbTxTypeId::Coinbase,
        }
    }
}

/// A mined transaction as persisted, anchored or streamed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbTx {
    pub tx_id: String,
    pub tx_index: u32,
    pub nonce: u64,
    pub type_id: DbTxTypeId,
    pub index_block_hash: String,
    pub block_hash: String,
    pub block_height: i64,
    pub burn_block_time: i64,
    pub parent_block_hash: String,
    pub parent_index_block_hash: String,
    pub microblock_hash: Option<String>,
    pub microblock_sequence: Option<u16>,
    pub sender_address: String,
    pub sponsor_address: Option<String>,
    pub origin_hash_mode: u8,
    pub fee: u64,
    pub anchor_mode: u8,
    pub post_condition_mode: u8,
    pub post_conditions: Vec<u8>,
    pub raw_tx: Vec<u8>,
    pub payload: DbTxPayload,
    pub status: String,
    pub raw_result: String,
    pub event_count: u32,
    pub execution_cost: Option<ExecutionCost>,
    pub contract_abi: Option<JsonValue>,
    pub canonical: bool,
}

/// A typed transaction side-effect. `event_index` is the per-transaction
/// index assigned during normalization, 0-based and contiguous.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbEvent {
    pub event_index: u32,
    pub tx_id: String,
    pub tx_index: u32,
    pub block_height: i64,
    pub canonical: bool,
    pub payload: DbEventPayload,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum DbEventPayload {
    SmartContractLog {
        contract_identifier: String,
        topic: String,
        value: Vec<u8>,
    },
    StxLock {
        locked_amount: u128,
        unlock_height: u32,
        locked_address: String,
    },
    StxAsset {
        sub: DbAssetEventSub,
    },
    FungibleTokenAsset {
        asset_identifier: String,
        sub: DbAssetEventSub,
    },
    NonFungibleTokenAsset {
        asset_identifier: String,
        value: Vec<u8>,
        sub: DbNftEventSub,
    },
}

impl DbEventPayload {
    /// The raw Clarity value carried by log and NFT events, `0x`-prefixed
    /// for display and export surfaces.
    pub fn value_hex(&self) -> Option<String> {
        match self {
            DbEventPayload::SmartContractLog { value, .. }
            | DbEventPayload::NonFungibleTokenAsset { value, .. } => {
                Some(format!("0x{}", hex::encode(value)))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum DbAssetEventSub {
    Transfer {
        sender: String,
        recipient: String,
        amount: u128,
    },
    Mint {
        recipient: String,
        amount: u128,
    },
    Burn {
        sender: String,
        amount: u128,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum DbNftEventSub {
    Transfer { sender: String, recipient: String },
    Mint { recipient: String },
    Burn { sender: String },
}

/// A matured miner reward, delivered with the anchor block at which it
/// matures.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbMinerReward {
    pub block_hash: String,
    pub index_block_hash: String,
    pub from_index_block_hash: String,
    pub mature_block_height: u32,
    pub recipient: String,
    pub coinbase_amount: u128,
    pub tx_fees_anchored: u128,
    pub tx_fees_streamed_confirmed: u128,
    pub tx_fees_streamed_produced: u128,
    pub canonical: bool,
}

/// A burnchain-level reward payout, stored in emission order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbBurnchainReward {
    pub burn_block_hash: String,
    pub burn_block_height: u32,
    pub burn_amount: u128,
    pub reward_recipient: String,
    pub reward_amount: u128,
    pub reward_index: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbRewardSlotHolder {
    pub burn_block_hash: String,
    pub burn_block_height: u32,
    pub address: String,
    pub slot_index: u32,
}

/// Final status of a transaction evicted from the mempool, as reported by
/// the node's free-form drop reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MempoolDropReason {
    ReplaceByFee,
    ReplaceAcrossFork,
    TooExpensive,
    StaleGarbageCollect,
    Problematic,
    Dropped,
}

impl MempoolDropReason {
    /// Total mapping: unknown reasons collapse onto the generic variant.
    pub fn from_reason(reason: &str) -> MempoolDropReason {
        match reason {
            "ReplaceByFee" => MempoolDropReason::ReplaceByFee,
            "ReplaceAcrossFork" => MempoolDropReason::ReplaceAcrossFork,
            "TooExpensive" => MempoolDropReason::TooExpensive,
            "StaleGarbageCollect" => MempoolDropReason::StaleGarbageCollect,
            "Problematic" => MempoolDropReason::Problematic,
            _ => MempoolDropReason::Dropped,
        }
    }
}

impl Display for MempoolDropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let label = match self {
            MempoolDropReason::ReplaceByFee => "ReplaceByFee",
            MempoolDropReason::ReplaceAcrossFork => "ReplaceAcrossFork",
            MempoolDropReason::TooExpensive => "TooExpensive",
            MempoolDropReason::StaleGarbageCollect => "StaleGarbageCollect",
            MempoolDropReason::Problematic => "Problematic",
            MempoolDropReason::Dropped => "Dropped",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum MempoolTxStatus {
    Pending,
    Dropped(MempoolDropReason),
}

/// A transaction admitted to the mempool: the decoded shell plus receipt
/// bookkeeping. Upserts are idempotent on `tx_id`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DbMempoolTx {
    pub tx_id: String,
    pub nonce: u64,
    pub type_id: DbTxTypeId,
    pub sender_address: String,
    pub sponsor_address: Option<String>,
    pub origin_hash_mode: u8,
    pub fee: u64,
    pub raw_tx: Vec<u8>,
    pub payload: DbTxPayload,
    pub receipt_date: i64,
    pub pruned: bool,
    pub status: MempoolTxStatus,
}

/// One verbatim `(path, payload)` pair recorded ahead of every typed
/// handler. `seq` is assigned by the store, monotonically.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawEventRecord {
    pub seq: u64,
    pub path: String,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_type_ids_are_stable() {
        let coinbase = DbTxPayload::Coinbase {
            payload: vec![0; 32],
            alt_recipient: None,
        };
        assert_eq!(coinbase.type_id(), DbTxTypeId::Coinbase);
        assert_eq!(DbTxTypeId::Coinbase as u8, 0x04);
        assert_eq!(DbTxTypeId::VersionedSmartContract as u8, 0x06);
    }

    #[test]
    fn drop_reason_mapping_is_total() {
        assert_eq!(
            MempoolDropReason::from_reason("ReplaceByFee"),
            MempoolDropReason::ReplaceByFee
        );
        assert_eq!(
            MempoolDropReason::from_reason("StaleGarbageCollect"),
            MempoolDropReason::StaleGarbageCollect
        );
        assert_eq!(
            MempoolDropReason::from_reason("SomethingTheNodeInvented"),
            MempoolDropReason::Dropped
        );
        assert_eq!(
            MempoolDropReason::from_reason(""),
            MempoolDropReason::Dropped
        );
    }

    #[test]
    fn event_value_hex_covers_value_bearing_payloads() {
        let log = DbEventPayload::SmartContractLog {
            contract_identifier: "SP000000000000000000002Q6VF78.bns".to_string(),
            topic: "print".to_string(),
            value: vec![0x0c, 0x00, 0x00, 0x00, 0x00],
        };
        assert_eq!(log.value_hex().as_deref(), Some("0x0c00000000"));
        let lock = DbEventPayload::StxLock {
            locked_amount: 1,
            unlock_height: 2,
            locked_address: "SP000000000000000000002Q6VF78".to_string(),
        };
        assert!(lock.value_hex().is_none());
    }

    #[test]
    fn execution_cost_aggregates() {
        let mut total = ExecutionCost::default();
        total.add(&ExecutionCost {
            read_count: 1,
            read_length: 10,
            runtime: 100,
            write_count: 2,
            write_length: 20,
        });
        total.add(&ExecutionCost {
            read_count: 3,
            read_length: 30,
            runtime: 300,
            write_count: 4,
            write_length: 40,
        });
        assert_eq!(total.read_count, 4);
        assert_eq!(total.runtime, 400);
        assert_eq!(total.write_length, 60);
    }
}
