use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    pub hits: Hits,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
    /// Sort values, fed back as `search_after` for the next page
    #[serde(default)]
    pub sort: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        reason: Option<String>,
    },
    Plain(String),
}

impl ErrorResponse {
    pub fn reason(&self) -> String {
        match &self.error {
            ErrorBody::Detailed {
                kind,
                reason: Some(reason),
            } => format!("{}: {}", kind, reason),
            ErrorBody::Detailed { kind, reason: None } => kind.clone(),
            ErrorBody::Plain(message) => message.clone(),
        }
    }
}
