//! Wire shapes of the typed event payloads emitted by the node inside
//! `/new_block` and `/new_microblocks` bodies. Amounts travel as decimal
//! strings; Clarity values travel as `0x`-prefixed hex.

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StxTransferEventData {
    pub sender: String,
    pub recipient: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StxMintEventData {
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StxBurnEventData {
    pub sender: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StxLockEventData {
    pub locked_amount: String,
    pub unlock_height: String,
    pub locked_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FtTransferEventData {
    pub asset_identifier: String,
    pub sender: String,
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FtMintEventData {
    pub asset_identifier: String,
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FtBurnEventData {
    pub asset_identifier: String,
    pub sender: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NftTransferEventData {
    pub asset_identifier: String,
    pub sender: String,
    pub recipient: String,
    pub raw_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NftMintEventData {
    pub asset_identifier: String,
    pub recipient: String,
    pub raw_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NftBurnEventData {
    pub asset_identifier: String,
    pub sender: String,
    pub raw_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SmartContractLogEventData {
    pub contract_identifier: String,
    pub topic: String,
    pub raw_value: String,
}
