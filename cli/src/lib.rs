//! Command line front end: turns arguments into a query, then streams every
//! matching hit's `_source` to stdout, one JSON document per line.

use std::io::{self, Write};

use chrono::{Duration, NaiveDateTime, Utc};
use elastic_log_client::{
    backoff::ExponentialBackoff,
    config::Settings,
    http::{Client, SearchBackend, SearchRequest},
    scan::SearchAfterScan,
    scan_log, ClientError,
};
use elastic_log_query::{
    translate_kql, translate_specifiers, KqlParser, Query, QueryError, Specifier, TimeRange,
};
use tracing::{info, warn};

use crate::argparse::Cli;

pub mod argparse;
pub mod logger;

pub const EXIT_OPERATIONAL: i32 = 1;
pub const EXIT_VALIDATION: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Failed to encode hit: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Bad input exits with 2, everything else with 1
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Query(_) => EXIT_VALIDATION,
            CliError::Client(_) | CliError::Json(_) | CliError::Io(_) => EXIT_OPERATIONAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

impl Cli {
    /// The time window, starting an hour before `now` unless given
    pub fn time_range(&self, now: NaiveDateTime) -> Result<TimeRange> {
        let start = self.start.unwrap_or(now - Duration::hours(1));
        if let Some(end) = self.end {
            if end < start {
                return Err(CliError::Usage(format!(
                    "--end ({}) is before --start ({})",
                    end, start
                )));
            }
        }
        Ok(TimeRange::new(self.timestamp_field.as_str(), start, self.end))
    }

    /// The single KQL query; several words must be quoted as one argument
    fn kql_query(&self) -> Result<&str> {
        match self.query.as_slice() {
            [query] => Ok(query),
            _ => Err(CliError::Usage(format!(
                "expected one KQL query, found {} arguments; quote the query or pass --legacy-specifiers",
                self.query.len()
            ))),
        }
    }

    pub fn build_query(&self, parser: &KqlParser, range: &TimeRange) -> Result<Query> {
        if self.legacy_specifiers {
            Ok(translate_specifiers(&self.query, range)?)
        } else {
            Ok(translate_kql(parser, self.kql_query()?, range)?)
        }
    }

    /// Human readable form of what was parsed, before translation
    pub fn describe_query(&self, parser: &KqlParser) -> Result<String> {
        if self.legacy_specifiers {
            let specifiers = self
                .query
                .iter()
                .map(|specifier| specifier.parse::<Specifier>().map(|s| s.to_string()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(specifiers.join("\n"))
        } else {
            Ok(parser.parse(self.kql_query()?)?.to_string())
        }
    }

    pub fn search_request(&self, query: Query) -> SearchRequest {
        SearchRequest::new(
            &self.index,
            query,
            &self.timestamp_field,
            self.page_size as usize,
        )
        .with_source(self.source.clone())
    }
}

/// Print the parsed query and the request body that would be sent
pub fn explain(cli: &Cli, now: NaiveDateTime, out: &mut impl Write) -> Result<()> {
    let parser = KqlParser::new();
    let range = cli.time_range(now)?;
    let request = cli.search_request(cli.build_query(&parser, &range)?);

    writeln!(out, "{}", cli.describe_query(&parser)?)?;
    writeln!(out, "POST {}", request.path())?;
    writeln!(out, "{}", serde_json::to_string_pretty(&request)?)?;
    Ok(())
}

/// Write every hit's `_source` as a line of JSON, returning the number written
pub fn stream<B: SearchBackend + ?Sized>(
    backend: &B,
    request: SearchRequest,
    backoff: ExponentialBackoff,
    out: &mut impl Write,
) -> Result<usize> {
    let index = request.index.clone();
    let mut scan = SearchAfterScan::with_backoff(backend, request, backoff);
    let mut count = 0;

    while let Some(hit) = scan.next() {
        let line = serde_json::to_string(&hit?.source)?;
        if let Err(err) = writeln!(out, "{}", line) {
            return output_closed(err, &index, count);
        }
        count += 1;
        // Page written out, push it through before waiting on the next one
        if scan.buffered() == 0 {
            if let Err(err) = out.flush() {
                return output_closed(err, &index, count);
            }
        }
    }
    if let Err(err) = out.flush() {
        return output_closed(err, &index, count);
    }

    scan_log!(info, "cli", index, "streamed {} hits in {} pages", count, scan.pages());
    Ok(count)
}

/// A reader going away (`| head`) ends the stream quietly, any other
/// write failure is an error
fn output_closed(err: io::Error, index: &str, count: usize) -> Result<usize> {
    if err.kind() == io::ErrorKind::BrokenPipe {
        scan_log!(debug, "cli", index, "output closed after {} hits, stopping", count);
        Ok(count)
    } else {
        Err(err.into())
    }
}

/// Default backoff, logging a warning before every sleep
pub fn logging_backoff() -> ExponentialBackoff {
    ExponentialBackoff::default().on_backoff(|err, delay| {
        warn!(
            "Search failed, retrying in {:.1}s: {}",
            delay.as_secs_f64(),
            err
        );
    })
}

pub fn run(cli: &Cli) -> Result<()> {
    let now = Utc::now().naive_utc();
    // Line buffered, so hits show up as they arrive
    let mut out = io::stdout().lock();

    if cli.explain {
        return explain(cli, now, &mut out);
    }

    let range = cli.time_range(now)?;
    let query = cli.build_query(&KqlParser::new(), &range)?;

    let settings = Settings::from_env()?;
    let client = Client::from_settings(&settings)?;
    info!(
        "Searching {} on {} from {}",
        cli.index,
        client.base_url(),
        range.start
    );

    stream(&client, cli.search_request(query), logging_backoff(), &mut out)?;
    Ok(())
}
