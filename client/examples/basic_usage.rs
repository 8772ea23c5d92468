use std::{error::Error, process::exit};

use chrono::{Duration, Utc};
use elastic_log_client::http::{Client, SearchRequest};
use elastic_log_client::scan::SearchAfterScan;
use elastic_log_query::{translate_kql, KqlParser, TimeRange};

fn main() -> Result<(), Box<dyn Error>> {
    // Expect the base URL first and a KQL query after
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <base_url> <kql query>", args[0]);
        exit(1);
    }

    let client = Client::new(&args[1])?;

    // Everything from the last fifteen minutes matching the query
    let start = (Utc::now() - Duration::minutes(15)).naive_utc();
    let range = TimeRange::new("@timestamp", start, None);
    let query = translate_kql(&KqlParser::new(), &args[2], &range)?;
    println!("Query: {}", query.to_json());

    let request = SearchRequest::new("filebeat-*", query, "@timestamp", 500)
        .with_source(vec!["message".to_string(), "log.level".to_string()]);

    let mut scan = SearchAfterScan::new(&client, request);
    let mut count = 0;
    for hit in scan.by_ref() {
        let hit = hit?;
        println!("{} {}", hit.id, hit.source);
        count += 1;
    }
    println!("\nStreamed {} hits over {} pages", count, scan.pages());

    Ok(())
}
