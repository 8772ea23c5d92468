use crate::{config::AuthMode, config::Settings, ClientError, ErrorResponse, Result, SearchResponse};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use elastic_log_query::Query;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

static USER_AGENT: &str = concat!("elastic-log-", env!("CARGO_PKG_VERSION"));

/// Body of one `_search` page
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    #[serde(skip)]
    pub index: String,
    pub query: Query,
    pub sort: Vec<Value>,
    pub size: usize,
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,
}

impl SearchRequest {
    /// Ascending by timestamp, with `_seq_no` as the tie breaker
    pub fn new(index: &str, query: Query, timestamp_field: &str, size: usize) -> Self {
        Self {
            index: index.to_string(),
            query,
            sort: vec![json!({ timestamp_field: { "order": "asc" } }), json!("_seq_no")],
            size,
            source: None,
            search_after: None,
        }
    }

    pub fn with_source(mut self, fields: Vec<String>) -> Self {
        self.source = (!fields.is_empty()).then_some(fields);
        self
    }

    pub fn path(&self) -> String {
        format!(
            "/{}/_search?track_total_hits=false",
            urlencoding::encode(&self.index)
        )
    }
}

/// Anything able to run one search page, the HTTP client or a test double
pub trait SearchBackend {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

pub struct Client {
    base_url: String,
    authorization: Option<String>,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {}", base_url, err)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                base_url
            )));
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ClientError::Reqwest)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: None,
            http,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Self::with_timeout(&settings.base_url()?, settings.timeout)?;
        Ok(match (settings.credentials(), settings.auth_mode) {
            (Some((username, password)), AuthMode::BasicAuth) => {
                client.with_basic_auth(username, password)
            }
            (Some((id, secret)), AuthMode::ApiKey) => client.with_api_key(id, secret),
            (None, _) => client,
        })
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{}:{}", username, password));
        self.authorization = Some(format!("Basic {}", token));
        self
    }

    pub fn with_api_key(mut self, id: &str, secret: &str) -> Self {
        let token = STANDARD.encode(format!("{}:{}", id, secret));
        self.authorization = Some(format!("ApiKey {}", token));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request<T>(&self, path: &str, body: String) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(authorization) = &self.authorization {
            let value = HeaderValue::from_str(authorization)
                .map_err(|err| ClientError::Config(format!("Invalid credentials: {}", err)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .map_err(ClientError::Reqwest)?;

        self.handle_response::<T>(response)
    }

    fn handle_response<T>(&self, response: reqwest::blocking::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status_code = response.status().as_u16();
        let raw_body = response.text().map_err(ClientError::Reqwest)?;
        if (200..300).contains(&status_code) {
            Ok(serde_json::from_str::<T>(&raw_body)?)
        } else if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&raw_body) {
            Err(ClientError::Api {
                status: status_code,
                reason: error_response.reason(),
            })
        } else {
            Err(ClientError::Http {
                status: status_code,
                body: raw_body,
            })
        }
    }
}

impl SearchBackend for Client {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let body = serde_json::to_string(request)?;
        self.request::<SearchResponse>(&request.path(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = SearchRequest::new("filebeat-*", Query::exists("http"), "@timestamp", 100);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "query": {"exists": {"field": "http"}},
                "sort": [{"@timestamp": {"order": "asc"}}, "_seq_no"],
                "size": 100
            })
        );
    }

    #[test]
    fn test_request_with_source_and_cursor() {
        let mut request = SearchRequest::new("logs", Query::exists("a"), "ts", 10)
            .with_source(vec!["message".to_string(), "level".to_string()]);
        request.search_after = Some(vec![json!(1645963200000u64), json!(3)]);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["_source"], json!(["message", "level"]));
        assert_eq!(body["search_after"], json!([1645963200000u64, 3]));
    }

    #[test]
    fn test_empty_source_is_omitted() {
        let request = SearchRequest::new("logs", Query::exists("a"), "ts", 10).with_source(vec![]);
        assert!(serde_json::to_value(&request).unwrap().get("_source").is_none());
    }

    #[test]
    fn test_path_encodes_index() {
        let request = SearchRequest::new("logs 2022", Query::exists("a"), "ts", 10);
        assert_eq!(request.path(), "/logs%202022/_search?track_total_hits=false");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(Client::new("not a url"), Err(ClientError::InvalidUrl(_))));
        assert!(matches!(Client::new("ftp://es"), Err(ClientError::InvalidUrl(_))));
        assert_eq!(Client::new("http://es:9200/").unwrap().base_url(), "http://es:9200");
    }
}
