use serde::{Deserialize, Serialize};

use crate::node_api::FileId;

#[derive(Serialize, Deserialize, Debug)]
pub struct StoreQuery {
    pub file_name: String,
    pub checksum: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StoreResponse {
    pub local_ref: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct LocalRefQuery {
    #[serde(default)]
    pub local_ref: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VerifyQuery {
    pub expected_checksum: String,
    #[serde(default)]
    pub local_ref: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub valid: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HeartbeatResponse {
    pub alive: bool,
    pub node_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListIdsResponse {
    pub file_ids: Vec<FileId>,
}
