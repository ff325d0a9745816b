//! Backoff command implementation.

use crate::OutputFormat;
use serde::Serialize;
use strata_client::RetryPolicy;
use strata_protocol::{LocationMode, StorageLocation};

/// One retry in the schedule.
#[derive(Debug, Serialize)]
pub struct ScheduleEntry {
    /// Attempt that failed.
    pub after_attempt: u32,
    /// Delay before the next attempt, in milliseconds.
    pub delay_ms: u64,
    /// Replica of the next attempt.
    pub next_location: StorageLocation,
}

/// Computes the schedule for a policy whose attempts all fail transiently.
pub fn schedule(
    policy: &RetryPolicy,
    attempts: u32,
    mode: LocationMode,
    request_id: &str,
) -> Vec<ScheduleEntry> {
    policy
        .delay_schedule(attempts, mode, request_id)
        .into_iter()
        .zip(1..)
        .map(|(decision, after_attempt)| ScheduleEntry {
            after_attempt,
            delay_ms: u64::try_from(decision.backoff.as_millis()).unwrap_or(u64::MAX),
            next_location: decision.next_location,
        })
        .collect()
}

/// Runs the backoff command.
pub fn run(
    policy: &RetryPolicy,
    attempts: u32,
    mode: LocationMode,
    request_id: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = schedule(policy, attempts, mode, request_id);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            println!("Retry schedule ({} policy, mode {})", policy.name(), mode);
            println!("================");
            if entries.is_empty() {
                println!("no retries");
            }
            let mut total = 0u64;
            for entry in &entries {
                total = total.saturating_add(entry.delay_ms);
                println!(
                    "after attempt {:>2}: wait {:>8} ms -> {} (cumulative {} ms)",
                    entry.after_attempt, entry.delay_ms, entry.next_location, total
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn linear_schedule_alternates_in_fallback_mode() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(250));
        let entries = schedule(&policy, 3, LocationMode::PrimaryThenSecondary, "id");
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.delay_ms == 250));
        assert_eq!(entries[0].next_location, StorageLocation::Secondary);
        assert_eq!(entries[1].next_location, StorageLocation::Primary);
    }

    #[test]
    fn no_retry_has_empty_schedule() {
        let entries = schedule(&RetryPolicy::NoRetry, 5, LocationMode::PrimaryOnly, "id");
        assert!(entries.is_empty());
    }
}
