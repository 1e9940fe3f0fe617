//! Name-system records derived from the registry contracts.

/// A name registration, update, transfer, renewal or revocation, keyed by
/// `(name, namespace_id, registered_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BnsName {
    pub name: String,
    pub namespace_id: String,
    pub address: String,
    pub registered_at: u64,
    pub expire_block: u64,
    pub zonefile_hash: Option<String>,
    pub zonefile: Option<String>,
    pub status: String,
    pub tx_id: String,
    pub canonical: bool,
}

/// A namespace reveal or launch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BnsNamespace {
    pub namespace_id: String,
    pub address: String,
    pub reveal_block: u64,
    pub ready_block: u64,
    pub lifetime: u64,
    pub status: String,
    pub tx_id: String,
    pub canonical: bool,
}

/// A subdomain row, fed from zonefile processing. Keyed by
/// `(fully_qualified_subdomain, block_height)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BnsSubdomain {
    pub name: String,
    pub namespace_id: String,
    pub fully_qualified_subdomain: String,
    pub owner: String,
    pub zonefile_hash: String,
    pub zonefile: String,
    pub block_height: u64,
    pub tx_id: String,
    pub canonical: bool,
}

/// A zonefile attachment paired with its decoded metadata, keyed by
/// `(zonefile_hash, tx_id, index_block_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DbBnsAttachment {
    pub op: String,
    pub name: String,
    pub namespace_id: String,
    pub zonefile_hash: String,
    pub zonefile: String,
    pub attachment_index: u32,
    pub index_block_hash: String,
    pub block_height: u64,
    pub tx_id: String,
}
