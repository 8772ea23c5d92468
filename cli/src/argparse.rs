use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::Parser;

pub const DEFAULT_PAGE_SIZE: u32 = 2000;
pub const DEFAULT_INDEX: &str = "filebeat-*";
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Parser, Debug)]
#[command(
    name = "elastic-log",
    about = "Stream logs matching a KQL query out of Elasticsearch",
    version,
    after_help = elastic_log_query::lexer::KQL_HELP
)]
pub struct Cli {
    /// KQL query, or specifiers such as `level=error` with --legacy-specifiers
    #[arg(value_name = "QUERY", required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Hits fetched per request
    #[arg(short = 'p', long, default_value_t = DEFAULT_PAGE_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub page_size: u32,

    /// Index pattern to search
    #[arg(short, long, default_value = DEFAULT_INDEX)]
    pub index: String,

    /// Start of the time window, UTC; defaults to one hour ago
    #[arg(short, long, value_parser = parse_datetime)]
    pub start: Option<NaiveDateTime>,

    /// End of the time window, UTC; open ended when omitted
    #[arg(short, long, value_parser = parse_datetime)]
    pub end: Option<NaiveDateTime>,

    /// Only return these `_source` fields, comma separated
    #[arg(long, value_delimiter = ',')]
    pub source: Vec<String>,

    /// Field holding each document's timestamp
    #[arg(short, long, default_value = DEFAULT_TIMESTAMP_FIELD)]
    pub timestamp_field: String,

    /// Treat QUERY as flat `field<op>value` specifiers
    #[arg(long)]
    pub legacy_specifiers: bool,

    /// Print the parsed query and the request body instead of searching
    #[arg(long)]
    pub explain: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Accepts `2022-02-27`, `2022-02-27T12:00:00[.fff]`, `2022-02-27 12:00:00`
/// or RFC 3339 with an offset, which is converted to UTC.
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(datetime);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            format!(
                "invalid datetime {:?}, expected YYYY-MM-DD[THH:MM:SS] or RFC 3339",
                value
            )
        })
}
