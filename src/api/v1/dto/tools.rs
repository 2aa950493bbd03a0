use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    pub status: &'static str,
    pub tool: String,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct ToolListing {
    pub name: String,
    pub permission: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_argument: Option<&'static str>,
    /// False when the caller may call it but this server has no handler.
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub status: &'static str,
    pub tools: Vec<ToolListing>,
}
