use clarity::vm::types::{CharType, SequenceData, TupleData, Value as ClarityValue};
use stacks_codec::codec::TransactionPayload;
use stacks_ingest_types::names::{BnsName, BnsNamespace};

use crate::codec::{decode_clarity_value, DecodeError, DecodedTx};

/// The name registry contracts the extractor recognizes.
pub const BNS_MAINNET_CONTRACT: &str = "SP000000000000000000002Q6VF78.bns";
pub const BNS_TESTNET_CONTRACT: &str = "ST000000000000000000002AMW42H.bns";

/// Log topics producing a name record.
const NAME_TOPICS: [&str; 5] = [
    "name-register",
    "name-update",
    "name-transfer",
    "name-renewal",
    "name-revoke",
];

/// Log topics producing a namespace record.
const NAMESPACE_TOPICS: [&str; 2] = ["namespace-ready", "namespace-reveal"];

/// Operations a zonefile attachment may carry in its metadata tuple.
pub const ATTACHMENT_OPS: [&str; 4] = ["register", "update", "transfer", "renewal"];

pub fn is_bns_contract(contract_identifier: &str) -> bool {
    contract_identifier == BNS_MAINNET_CONTRACT || contract_identifier == BNS_TESTNET_CONTRACT
}

/// A record derived from one registry contract log.
#[derive(Debug, Clone, PartialEq)]
pub enum BnsLogRecord {
    Name(BnsName),
    Namespace(BnsNamespace),
}

/// Derive a name or namespace record from a contract log emitted by the
/// registry. Logs with topics outside the recognized sets are ignored; a
/// recognized topic with a malformed tuple is a decode error.
pub fn extract_from_contract_log(
    contract_identifier: &str,
    topic: &str,
    value_hex: &str,
    tx_id: &str,
    block_height: u64,
) -> Result<Option<BnsLogRecord>, DecodeError> {
    if !is_bns_contract(contract_identifier) {
        return Ok(None);
    }
    if NAME_TOPICS.contains(&topic) {
        let tuple = expect_tuple(decode_clarity_value(value_hex)?, topic)?;
        let name = field_string(&tuple, "name")
            .ok_or_else(|| malformed(topic, "name"))?;
        let namespace_id = field_string(&tuple, "namespace")
            .ok_or_else(|| malformed(topic, "namespace"))?;
        return Ok(Some(BnsLogRecord::Name(BnsName {
            name,
            namespace_id,
            address: field_principal(&tuple, "owner").unwrap_or_default(),
            registered_at: block_height,
            expire_block: field_uint(&tuple, "expire-block").unwrap_or(0) as u64,
            zonefile_hash: field_buff_hex(&tuple, "zonefile-hash"),
            zonefile: None,
            status: topic.to_string(),
            tx_id: tx_id.to_string(),
            canonical: true,
        })));
    }
    if NAMESPACE_TOPICS.contains(&topic) {
        let tuple = expect_tuple(decode_clarity_value(value_hex)?, topic)?;
        let namespace_id = field_string(&tuple, "namespace")
            .ok_or_else(|| malformed(topic, "namespace"))?;
        let (reveal_block, ready_block) = if topic == "namespace-reveal" {
            (block_height, 0)
        } else {
            (field_uint(&tuple, "reveal-block").unwrap_or(0) as u64, block_height)
        };
        return Ok(Some(BnsLogRecord::Namespace(BnsNamespace {
            namespace_id,
            address: field_principal(&tuple, "owner").unwrap_or_default(),
            reveal_block,
            ready_block,
            lifetime: field_uint(&tuple, "lifetime").unwrap_or(0) as u64,
            status: topic.to_string(),
            tx_id: tx_id.to_string(),
            canonical: true,
        })));
    }
    Ok(None)
}

/// A renewal carrying no zonefile hash emits no log; the record is
/// synthesized from the contract-call arguments instead:
/// `(name-renewal namespace name stx-to-burn (optional new-owner)
/// (optional zonefile-hash))`.
pub fn extract_renewal_from_contract_call(
    decoded: &DecodedTx,
    block_height: u64,
) -> Result<Option<BnsName>, DecodeError> {
    let contract_call = match decoded.tx.payload {
        TransactionPayload::ContractCall(ref data) => data,
        _ => return Ok(None),
    };
    let contract_identifier = format!(
        "{}.{}",
        contract_call.address, contract_call.contract_name
    );
    if !is_bns_contract(&contract_identifier) || contract_call.function_name.as_str() != "name-renewal"
    {
        return Ok(None);
    }
    if contract_call.function_args.len() < 3 {
        return Err(DecodeError::Transaction(
            "name-renewal call with missing arguments".to_string(),
        ));
    }
    let namespace_id = value_string(&contract_call.function_args[0])
        .ok_or_else(|| malformed("name-renewal", "namespace"))?;
    let name = value_string(&contract_call.function_args[1])
        .ok_or_else(|| malformed("name-renewal", "name"))?;
    let new_owner = contract_call
        .function_args
        .get(3)
        .and_then(unwrap_optional)
        .and_then(|value| match value {
            ClarityValue::Principal(principal) => Some(principal.to_string()),
            _ => None,
        });
    let zonefile_hash = contract_call
        .function_args
        .get(4)
        .and_then(unwrap_optional)
        .and_then(value_buff_hex);

    Ok(Some(BnsName {
        name,
        namespace_id,
        address: new_owner.unwrap_or_else(|| decoded.sender_address.clone()),
        registered_at: block_height,
        expire_block: 0,
        zonefile_hash,
        zonefile: None,
        status: "name-renewal".to_string(),
        tx_id: decoded.tx_id.clone(),
        canonical: true,
    }))
}

/// The `{op, name, namespace}` triple decoded from an attachment's
/// metadata blob. The node wraps it either flat or under
/// `attachment.metadata`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentMetadata {
    pub op: String,
    pub name: String,
    pub namespace: String,
    pub tx_sender: Option<String>,
}

pub fn decode_attachment_metadata(metadata_hex: &str) -> Result<AttachmentMetadata, DecodeError> {
    let value = decode_clarity_value(metadata_hex)?;
    let outer = expect_tuple(value, "attachment metadata")?;
    let metadata = match outer.data_map.get("attachment") {
        Some(ClarityValue::Tuple(attachment)) => match attachment.data_map.get("metadata") {
            Some(ClarityValue::Tuple(metadata)) => metadata.clone(),
            _ => {
                return Err(malformed("attachment metadata", "attachment.metadata"));
            }
        },
        _ => outer,
    };
    let op = field_string(&metadata, "op").ok_or_else(|| malformed("attachment metadata", "op"))?;
    if !ATTACHMENT_OPS.contains(&op.as_str()) {
        return Err(DecodeError::Message(format!(
            "unrecognized attachment op {}",
            op
        )));
    }
    Ok(AttachmentMetadata {
        op,
        name: field_string(&metadata, "name")
            .ok_or_else(|| malformed("attachment metadata", "name"))?,
        namespace: field_string(&metadata, "namespace")
            .ok_or_else(|| malformed("attachment metadata", "namespace"))?,
        tx_sender: field_principal(&metadata, "tx-sender"),
    })
}

/// Zonefile bodies travel hex-encoded with a leading `0x`.
pub fn strip_zonefile_content(content: &str) -> String {
    content
        .strip_prefix("0x")
        .unwrap_or(content)
        .to_string()
}

fn malformed(topic: &str, field: &str) -> DecodeError {
    DecodeError::ClarityValue(format!("{} payload missing field {}", topic, field))
}

fn expect_tuple(value: ClarityValue, topic: &str) -> Result<TupleData, DecodeError> {
    match value {
        ClarityValue::Tuple(tuple) => Ok(tuple),
        _ => Err(DecodeError::ClarityValue(format!(
            "{} payload is not a tuple",
            topic
        ))),
    }
}

fn unwrap_optional(value: &ClarityValue) -> Option<&ClarityValue> {
    match value {
        ClarityValue::Optional(optional) => optional.data.as_deref(),
        other => Some(other),
    }
}

fn value_string(value: &ClarityValue) -> Option<String> {
    match unwrap_optional(value)? {
        ClarityValue::Sequence(SequenceData::String(CharType::ASCII(data))) => {
            String::from_utf8(data.data.clone()).ok()
        }
        ClarityValue::Sequence(SequenceData::String(CharType::UTF8(data))) => {
            let bytes: Vec<u8> = data.data.iter().flatten().copied().collect();
            String::from_utf8(bytes).ok()
        }
        ClarityValue::Sequence(SequenceData::Buffer(data)) => {
            String::from_utf8(data.data.clone()).ok()
        }
        _ => None,
    }
}

fn value_buff_hex(value: &ClarityValue) -> Option<String> {
    match unwrap_optional(value)? {
        ClarityValue::Sequence(SequenceData::Buffer(data)) => {
            Some(format!("0x{}", hex::encode(&data.data)))
        }
        _ => None,
    }
}

fn field_string(tuple: &TupleData, key: &str) -> Option<String> {
    tuple.data_map.get(key).and_then(value_string)
}

fn field_buff_hex(tuple: &TupleData, key: &str) -> Option<String> {
    tuple.data_map.get(key).and_then(value_buff_hex)
}

fn field_uint(tuple: &TupleData, key: &str) -> Option<u128> {
    match tuple.data_map.get(key).and_then(unwrap_optional) {
        Some(ClarityValue::UInt(value)) => Some(*value),
        _ => None,
    }
}

fn field_principal(tuple: &TupleData, key: &str) -> Option<String> {
    match tuple.data_map.get(key).and_then(unwrap_optional) {
        Some(ClarityValue::Principal(principal)) => Some(principal.to_string()),
        _ => None,
    }
}
