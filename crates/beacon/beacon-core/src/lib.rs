use alloy::primitives::{
    Address,
    B256,
};
use serde::{
    Deserialize,
    Serialize,
};

/// The persisted fact that the contract was deployed. Written exactly once,
/// right after the deployment receipt is obtained, and treated as
/// authoritative on every subsequent start: while this record is readable,
/// no further deployment happens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeploymentRecord {
    /// The on-chain contract address.
    pub address: Address,
    /// The hash of the deployment transaction.
    #[serde(rename = "tx")]
    pub transaction_hash: B256,
}

/// Body of `GET /address`. `address` is `null` until an address has been
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AddressResponse {
    pub address: Option<Address>,
}
