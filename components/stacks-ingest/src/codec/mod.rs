use std::fmt::Display;
use std::io::Cursor;

use clarity::codec::{write_next, StacksMessageCodec};
use clarity::vm::types::Value as ClarityValue;
use clarity::vm::ClarityVersion;
use stacks_codec::codec::{
    StacksTransaction, TransactionAuth, TransactionPayload, TransactionSpendingCondition,
};
use stacks_ingest_types::{DbTxPayload, DbTxTypeId};

/// Failure to decode a binary blob or a node message. Always fatal to the
/// message that carried the offending bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Transaction(String),
    ClarityValue(String),
    Message(String),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DecodeError::Transaction(e) => write!(f, "unable to decode transaction: {}", e),
            DecodeError::ClarityValue(e) => write!(f, "unable to decode clarity value: {}", e),
            DecodeError::Message(e) => write!(f, "unable to decode message: {}", e),
        }
    }
}

/// A raw transaction blob decoded into the fields the store persists,
/// alongside the parsed transaction for callers that need to reach into
/// the payload (the name-system extractor does).
pub struct DecodedTx {
    pub tx: StacksTransaction,
    pub tx_id: String,
    pub fee: u64,
    pub nonce: u64,
    pub sender_address: String,
    pub sponsor_address: Option<String>,
    pub origin_hash_mode: u8,
    pub anchor_mode: u8,
    pub post_condition_mode: u8,
    pub post_conditions: Vec<u8>,
    pub raw_tx: Vec<u8>,
    pub payload: DbTxPayload,
}

impl DecodedTx {
    pub fn type_id(&self) -> DbTxTypeId {
        self.payload.type_id()
    }
}

/// Decode a `0x`-prefixed hex transaction blob as emitted by the node.
pub fn decode_transaction(raw_tx: &str) -> Result<DecodedTx, DecodeError> {
    let stripped = raw_tx.strip_prefix("0x").unwrap_or(raw_tx);
    let tx_bytes = hex::decode(stripped)
        .map_err(|e| DecodeError::Transaction(format!("invalid hex: {}", e)))?;
    let tx = StacksTransaction::consensus_deserialize(&mut Cursor::new(&tx_bytes))
        .map_err(|e| DecodeError::Transaction(e.to_string()))?;

    let mainnet = tx.is_mainnet();
    let (fee, nonce, sender_address, sponsor_address, origin_hash_mode) = match tx.auth {
        TransactionAuth::Standard(ref conditions) => (
            conditions.tx_fee(),
            conditions.nonce(),
            spending_condition_address(conditions, mainnet),
            None,
            spending_condition_hash_mode(conditions),
        ),
        TransactionAuth::Sponsored(ref sender_conditions, ref sponsor_conditions) => (
            sponsor_conditions.tx_fee(),
            sender_conditions.nonce(),
            spending_condition_address(sender_conditions, mainnet),
            Some(spending_condition_address(sponsor_conditions, mainnet)),
            spending_condition_hash_mode(sender_conditions),
        ),
    };

    let payload = decode_tx_payload(&tx)?;

    let mut post_conditions = vec![];
    write_next(&mut post_conditions, &tx.post_conditions)
        .map_err(|e| DecodeError::Transaction(format!("invalid post conditions: {}", e)))?;

    Ok(DecodedTx {
        tx_id: format!("0x{}", hex::encode(tx.txid().0)),
        fee,
        nonce,
        sender_address,
        sponsor_address,
        origin_hash_mode,
        anchor_mode: tx.anchor_mode as u8,
        post_condition_mode: tx.post_condition_mode as u8,
        post_conditions,
        raw_tx: tx_bytes,
        payload,
        tx,
    })
}

fn decode_tx_payload(tx: &StacksTransaction) -> Result<DbTxPayload, DecodeError> {
    let payload = match tx.payload {
        TransactionPayload::TokenTransfer(ref recipient, amount, ref memo) => {
            DbTxPayload::TokenTransfer {
                recipient: recipient.to_string(),
                amount,
                memo: memo.0.to_vec(),
            }
        }
        TransactionPayload::ContractCall(ref contract_call) => DbTxPayload::ContractCall {
            contract_identifier: format!(
                "{}.{}",
                contract_call.address, contract_call.contract_name
            ),
            function_name: contract_call.function_name.to_string(),
            function_args: contract_call
                .function_args
                .iter()
                .map(|arg| format!("{}", arg))
                .collect(),
        },
        TransactionPayload::SmartContract(ref smart_contract, ref version) => {
            let contract_identifier = format!("{}.{}", tx.origin_address(), smart_contract.name);
            let source_code = smart_contract.code_body.to_string();
            match version {
                None => DbTxPayload::SmartContract {
                    contract_identifier,
                    source_code,
                },
                Some(version) => DbTxPayload::VersionedSmartContract {
                    contract_identifier,
                    source_code,
                    clarity_version: clarity_version_marker(version),
                },
            }
        }
        TransactionPayload::PoisonMicroblock(ref header_1, ref header_2) => {
            let mut microblock_header_1 = vec![];
            let mut microblock_header_2 = vec![];
            header_1
                .consensus_serialize(&mut microblock_header_1)
                .map_err(|e| DecodeError::Transaction(format!("invalid poison header: {}", e)))?;
            header_2
                .consensus_serialize(&mut microblock_header_2)
                .map_err(|e| DecodeError::Transaction(format!("invalid poison header: {}", e)))?;
            DbTxPayload::PoisonMicroblock {
                microblock_header_1,
                microblock_header_2,
            }
        }
        // The VRF proof a Nakamoto coinbase carries in the third slot is
        // consensus data the store does not keep; every coinbase shape
        // lands on the same row.
        TransactionPayload::Coinbase(ref payload, ref alt_recipient, _) => {
            DbTxPayload::Coinbase {
                payload: payload.0.to_vec(),
                alt_recipient: alt_recipient.as_ref().map(|principal| principal.to_string()),
            }
        }
        ref other => {
            return Err(DecodeError::Transaction(format!(
                "unsupported transaction payload {}",
                other.name()
            )))
        }
    };
    Ok(payload)
}

fn clarity_version_marker(version: &ClarityVersion) -> u8 {
    match version {
        ClarityVersion::Clarity1 => 1,
        ClarityVersion::Clarity2 => 2,
        _ => 3,
    }
}

fn spending_condition_address(condition: &TransactionSpendingCondition, mainnet: bool) -> String {
    if mainnet {
        condition.address_mainnet().to_string()
    } else {
        condition.address_testnet().to_string()
    }
}

fn spending_condition_hash_mode(condition: &TransactionSpendingCondition) -> u8 {
    match condition {
        TransactionSpendingCondition::Singlesig(data) => data.hash_mode.clone() as u8,
        TransactionSpendingCondition::Multisig(data) => data.hash_mode.clone() as u8,
        TransactionSpendingCondition::OrderIndependentMultisig(data) => {
            data.hash_mode.clone() as u8
        }
    }
}

/// Decode a `0x`-prefixed hex Clarity value. `None` on any malformation;
/// callers that require the value decide whether that is fatal.
pub fn try_decode_clarity_value(hex_value: &str) -> Option<ClarityValue> {
    let hex_value = hex_value.strip_prefix("0x")?;
    let value_bytes = hex::decode(hex_value).ok()?;
    ClarityValue::consensus_deserialize(&mut Cursor::new(&value_bytes)).ok()
}

/// Decode a hex Clarity value, or surface the malformation.
pub fn decode_clarity_value(hex_value: &str) -> Result<ClarityValue, DecodeError> {
    try_decode_clarity_value(hex_value)
        .ok_or_else(|| DecodeError::ClarityValue(format!("malformed value {}", hex_value)))
}

/// Hex-decode a Clarity value blob to its raw bytes, stripping the `0x`
/// prefix. Used where the store keeps the consensus bytes verbatim.
pub fn clarity_value_bytes(hex_value: &str) -> Result<Vec<u8>, DecodeError> {
    let stripped = hex_value.strip_prefix("0x").unwrap_or(hex_value);
    hex::decode(stripped).map_err(|e| DecodeError::ClarityValue(format!("invalid hex: {}", e)))
}
