//! Simulate command implementation.
//!
//! Seeds an in-process two-replica account, wraps the loopback transport
//! with scripted faults and pages through the table, reporting every
//! physical attempt of every page.

use crate::OutputFormat;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use strata_client::{
    AttemptResult, ClientConfig, LoopbackTransport, OperationContext, RetryPolicy, TableClient,
};
use strata_protocol::{LocationMode, PayloadFormat, StorageLocation, TableQuery};
use strata_testkit::{
    sample_entity, test_endpoints, Fault, FaultInjectingTransport, TestAccount, TABLE,
};
use thiserror::Error;

/// Rows per seeded partition.
const PARTITION_ROWS: usize = 100;

/// Errors raised before the simulation starts.
#[derive(Error, Debug)]
pub enum SimulateError {
    /// A `--fail` entry was neither a status, `network` nor `hang`.
    #[error("unrecognized fault {0:?}: expected a status code, `network` or `hang`")]
    UnknownFault(String),
}

/// Simulation inputs.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Retry policy of the client.
    pub policy: RetryPolicy,
    /// Rows to seed.
    pub rows: usize,
    /// Take count.
    pub take: Option<i64>,
    /// Faults replacing the first sends.
    pub faults: Vec<Fault>,
    /// Replica held in a 503 outage.
    pub outage: Option<StorageLocation>,
    /// Location mode.
    pub mode: LocationMode,
    /// Payload format.
    pub payload: PayloadFormat,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
}

/// Attempts of one page.
#[derive(Debug, Serialize)]
pub struct PageReport {
    /// 1-based page number.
    pub page: usize,
    /// Correlation id shared by the page's attempts.
    pub client_request_id: String,
    /// Entities delivered.
    pub entities: usize,
    /// Every physical attempt.
    pub attempts: Vec<AttemptResult>,
    /// Terminal error, if the page failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whole-session summary.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Rows seeded.
    pub rows: usize,
    /// Take count.
    pub take: Option<i64>,
    /// Location mode.
    pub mode: LocationMode,
    /// Retry policy name.
    pub policy: &'static str,
    /// Entities delivered across all pages.
    pub total_entities: usize,
    /// Per-page attempt history.
    pub pages: Vec<PageReport>,
}

/// Parses `--fail` entries.
pub fn parse_faults(raw: &[String]) -> Result<Vec<Fault>, SimulateError> {
    raw.iter()
        .map(|entry| match entry.trim() {
            "network" => Ok(Fault::Network),
            "hang" => Ok(Fault::Hang),
            other => other
                .parse::<u16>()
                .map(Fault::Status)
                .map_err(|_| SimulateError::UnknownFault(other.to_string())),
        })
        .collect()
}

fn seed(account: &TestAccount, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let server = account.primary();
    server.create_table(TABLE);
    let mut remaining = rows;
    let mut batch = 0;
    while remaining > 0 {
        let count = remaining.min(PARTITION_ROWS);
        let partition = format!("tables_batch_{batch}");
        let entities = (0..count)
            .map(|row| sample_entity(partition.clone(), format!("{row:04}")))
            .collect();
        server.insert_batch(TABLE, entities)?;
        remaining -= count;
        batch += 1;
    }
    Ok(())
}

/// Runs the simulation and returns the report.
pub async fn simulate(settings: Settings) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let account = TestAccount::new();
    seed(&account, settings.rows)?;
    if let Some(location) = settings.outage {
        account.service.set_outage(location, 503);
    }

    let transport =
        FaultInjectingTransport::new(LoopbackTransport::new(Arc::clone(&account.service)));
    transport.push_faults(settings.faults.iter().cloned());
    let config = ClientConfig::new(test_endpoints())
        .with_retry_policy(settings.policy.clone())
        .with_location_mode(settings.mode)
        .with_payload_format(settings.payload)
        .with_attempt_timeout(settings.attempt_timeout);
    let client = TableClient::new(config, transport);

    let mut query = TableQuery::new();
    if let Some(take) = settings.take {
        query = query.take(take)?;
    }
    let mut session = client.table(TABLE)?.execute_query(query).enumerate();

    let mut report = SimulationReport {
        rows: settings.rows,
        take: settings.take,
        mode: settings.mode,
        policy: settings.policy.name(),
        total_entities: 0,
        pages: Vec::new(),
    };
    loop {
        let ctx = OperationContext::new();
        let outcome = session.next_page(&ctx).await;
        let mut page = PageReport {
            page: report.pages.len() + 1,
            client_request_id: ctx.client_request_id().to_string(),
            entities: 0,
            attempts: ctx.attempts(),
            error: None,
        };
        match outcome {
            Ok(Some(entities)) => {
                page.entities = entities.len();
                report.total_entities += entities.len();
                report.pages.push(page);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "simulated query failed");
                page.error = Some(err.to_string());
                report.pages.push(page);
                break;
            }
        }
    }
    Ok(report)
}

/// Runs the simulate command.
pub fn run(settings: Settings, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(settings))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text_output(&report),
    }
    Ok(())
}

fn print_text_output(report: &SimulationReport) {
    println!(
        "Simulated query: {} rows, take {}, mode {}, {} retries",
        report.rows,
        report
            .take
            .map_or_else(|| "all".to_string(), |t| t.to_string()),
        report.mode,
        report.policy
    );
    println!("================");

    for page in &report.pages {
        println!(
            "page {} [{}]: {} entities, {} attempt(s)",
            page.page,
            page.client_request_id,
            page.entities,
            page.attempts.len()
        );
        for (n, attempt) in page.attempts.iter().enumerate() {
            print!(
                "  #{} {:9} {:>5} {:>6} ms",
                n + 1,
                attempt.location,
                attempt
                    .status_code
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
                attempt.duration().as_millis()
            );
            if let Some(error) = &attempt.error {
                print!("  {error}");
            }
            println!();
        }
        if let Some(error) = &page.error {
            println!("  failed: {error}");
        }
    }
    println!("total: {} entities", report.total_entities);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            policy: RetryPolicy::linear(3, Duration::from_millis(1)),
            rows: 250,
            take: None,
            faults: Vec::new(),
            outage: None,
            mode: LocationMode::PrimaryThenSecondary,
            payload: PayloadFormat::Json,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn fault_parsing() {
        let raw = ["503".to_string(), " network".to_string(), "hang".to_string()];
        assert_eq!(
            parse_faults(&raw).unwrap(),
            vec![Fault::Status(503), Fault::Network, Fault::Hang]
        );
        assert!(parse_faults(&["teapot".to_string()]).is_err());
    }

    #[tokio::test]
    async fn faults_show_up_in_attempt_history() {
        let report = simulate(Settings {
            faults: vec![Fault::Status(503)],
            ..settings()
        })
        .await
        .unwrap();
        assert_eq!(report.total_entities, 250);
        assert_eq!(report.pages.len(), 1);
        let locations: Vec<_> = report.pages[0].attempts.iter().map(|a| a.location).collect();
        assert_eq!(
            locations,
            vec![StorageLocation::Primary, StorageLocation::Secondary]
        );
    }

    #[tokio::test]
    async fn exhausted_page_is_reported() {
        let report = simulate(Settings {
            outage: Some(StorageLocation::Primary),
            mode: LocationMode::PrimaryOnly,
            ..settings()
        })
        .await
        .unwrap();
        assert_eq!(report.total_entities, 0);
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.pages[0].attempts.len(), 3);
        assert!(report.pages[0].error.is_some());
    }
}
