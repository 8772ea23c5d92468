use base64::{engine::general_purpose::STANDARD, Engine as _};
use elastic_log_client::{
    config::{AuthMode, Settings},
    http::{Client, SearchBackend, SearchRequest},
    scan::SearchAfterScan,
    ClientError,
};
use elastic_log_query::Query;
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn request(size: usize) -> SearchRequest {
    SearchRequest::new("logs", Query::exists("message"), "@timestamp", size)
}

fn settings(url: String, auth_mode: AuthMode) -> Settings {
    Settings {
        url,
        username: Some("id".to_string()),
        password: Some("secret".to_string()),
        auth_mode,
        timeout: Duration::from_secs(5),
    }
}

#[test]
fn search_posts_query_to_index() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::UrlEncoded(
            "track_total_hits".into(),
            "false".into(),
        ))
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "query": {"exists": {"field": "message"}},
            "sort": [{"@timestamp": {"order": "asc"}}, "_seq_no"],
            "size": 10
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "took": 2,
                "timed_out": false,
                "hits": {"hits": [
                    {"_index": "logs", "_id": "1", "_source": {"message": "hello"}, "sort": [1, 0]}
                ]}
            })
            .to_string(),
        )
        .create();

    let client = Client::new(&server.url()).unwrap();
    let response = client.search(&request(10)).unwrap();
    mock.assert();
    assert_eq!(response.hits.hits.len(), 1);
    assert_eq!(response.hits.hits[0].source, json!({"message": "hello"}));
}

#[test]
fn api_key_header_is_sent() {
    let mut server = Server::new();
    let expected = format!("ApiKey {}", STANDARD.encode("id:secret"));
    let mock = server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::Any)
        .match_header("authorization", expected.as_str())
        .with_status(200)
        .with_body(r#"{"hits": {"hits": []}}"#)
        .create();

    let client = Client::from_settings(&settings(server.url(), AuthMode::ApiKey)).unwrap();
    client.search(&request(10)).unwrap();
    mock.assert();
}

#[test]
fn basic_auth_header_is_sent() {
    let mut server = Server::new();
    let expected = format!("Basic {}", STANDARD.encode("id:secret"));
    let mock = server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::Any)
        .match_header("authorization", expected.as_str())
        .with_status(200)
        .with_body(r#"{"hits": {"hits": []}}"#)
        .create();

    let client = Client::from_settings(&settings(server.url(), AuthMode::BasicAuth)).unwrap();
    client.search(&request(10)).unwrap();
    mock.assert();
}

#[test]
fn error_body_maps_to_api_error() {
    let mut server = Server::new();
    server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(
            json!({
                "error": {"type": "parsing_exception", "reason": "unknown query [matc]"},
                "status": 400
            })
            .to_string(),
        )
        .create();

    let client = Client::new(&server.url()).unwrap();
    match client.search(&request(10)) {
        Err(ClientError::Api { status, reason }) => {
            assert_eq!(status, 400);
            assert_eq!(reason, "parsing_exception: unknown query [matc]");
        }
        other => panic!("expected an API error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unparseable_error_maps_to_http_error() {
    let mut server = Server::new();
    server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("Bad Gateway")
        .create();

    let client = Client::new(&server.url()).unwrap();
    let err = client.search(&request(10)).unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 502, ref body } if body == "Bad Gateway"));
    assert!(!err.is_transient());
}

#[test]
fn scan_streams_pages_over_http() {
    let mut server = Server::new();
    let first = server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::Any)
        .match_body(Matcher::Json(json!({
            "query": {"exists": {"field": "message"}},
            "sort": [{"@timestamp": {"order": "asc"}}, "_seq_no"],
            "size": 2
        })))
        .with_status(200)
        .with_body(
            json!({"hits": {"hits": [
                {"_id": "1", "_source": {"n": 1}, "sort": [100, 1]},
                {"_id": "2", "_source": {"n": 2}, "sort": [100, 2]}
            ]}})
            .to_string(),
        )
        .create();
    let second = server
        .mock("POST", "/logs/_search")
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({"search_after": [100, 2]})))
        .with_status(200)
        .with_body(r#"{"hits": {"hits": []}}"#)
        .create();

    let client = Client::new(&server.url()).unwrap();
    let sources: Vec<_> = SearchAfterScan::new(&client, request(2))
        .map(|hit| hit.unwrap().source)
        .collect();

    first.assert();
    second.assert();
    assert_eq!(sources, vec![json!({"n": 1}), json!({"n": 2})]);
}

#[test]
fn scan_retries_connection_failures_until_budget_is_spent() {
    use elastic_log_client::backoff::ExponentialBackoff;
    use std::{cell::Cell, rc::Rc};

    let sleeps = Rc::new(Cell::new(0));
    let counter = Rc::clone(&sleeps);
    let backoff = ExponentialBackoff::new(2.0, Duration::from_millis(1), 4)
        .with_sleeper(move |_| counter.set(counter.get() + 1));

    // Nothing listens on port 1, every attempt is refused
    let client = Client::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let mut scan = SearchAfterScan::with_backoff(&client, request(10), backoff);

    let err = match scan.next() {
        Some(Err(err)) => err,
        other => panic!("expected a connection error, got {:?}", other.map(|hit| hit.map(|h| h.id))),
    };
    assert!(err.is_transient(), "{err} should be transient");
    assert_eq!(sleeps.get(), 3);
    assert!(scan.next().is_none());
    assert_eq!(scan.pages(), 0);
}
