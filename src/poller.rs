use crate::config::Config;
use crate::error::FritzError;
use crate::log_entry::{normalize_grouped, LogEntry};
use crate::output;
use crate::session::FritzClient;
use chrono::NaiveDateTime;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tokio::time::{sleep, Duration};

/// Dedup state carried between polls: the newest timestamp seen so far and the
/// signatures of all entries at exactly that timestamp, so duplicates within
/// one router-clock second are still caught on the next poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    #[serde(with = "crate::log_entry::iso_timestamp")]
    pub last_timestamp: NaiveDateTime,
    pub last_signatures: BTreeSet<String>,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            // Older than any real router timestamp, so the first poll emits
            // everything.
            last_timestamp: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.naive_utc(),
            last_signatures: BTreeSet::new(),
        }
    }
}

impl PollState {
    /// Loads persisted state, falling back to the defaults when no file exists yet.
    pub fn load(path: &Path) -> Result<Self, FritzError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), FritzError> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Selects the entries of one poll that have not been seen before and
    /// advances the state past them. Entries are processed in ascending
    /// timestamp order; the sort is stable, so entries sharing a timestamp
    /// keep their payload order. Entries older than `last_timestamp` are
    /// dropped, equal ones are admitted only with an unseen signature.
    pub fn select_new(&mut self, mut entries: Vec<LogEntry>) -> Vec<LogEntry> {
        entries.sort_by_key(|entry| entry.timestamp);
        let mut new_entries = Vec::new();
        for entry in entries {
            if entry.timestamp > self.last_timestamp {
                self.last_timestamp = entry.timestamp;
                self.last_signatures.clear();
                self.last_signatures.insert(entry.signature());
                new_entries.push(entry);
            } else if entry.timestamp == self.last_timestamp
                && self.last_signatures.insert(entry.signature())
            {
                new_entries.push(entry);
            }
        }
        new_entries
    }
}

/// Applies one successful poll to the state and hands the new entries to the
/// sink. Signatures are computed on the raw message; the grouped suffix is
/// only stripped from entries that get emitted. A sink failure rolls the
/// state back so the same entries are selected again on the next poll, and
/// returns false so the stale state is not persisted either.
fn process_poll<F>(state: &mut PollState, entries: Vec<LogEntry>, emit: F) -> bool
where
    F: FnOnce(&[LogEntry]) -> anyhow::Result<()>,
{
    let previous = state.clone();
    let new_entries = state.select_new(entries);
    if new_entries.is_empty() {
        return true;
    }
    info!("Emitting {} new log entries", new_entries.len());
    let normalized: Vec<LogEntry> = new_entries.into_iter().map(normalize_grouped).collect();
    match emit(&normalized) {
        Ok(()) => true,
        Err(err) => {
            error!(
                "Failed to write {} entries, keeping previous poll state: {}",
                normalized.len(),
                err
            );
            *state = previous;
            false
        }
    }
}

/// Continuous agent loop: fetch, dedup, emit, persist, sleep. Fetch failures
/// are logged and skipped, they never terminate the loop; that iteration
/// contributes no state change.
pub async fn run(mut client: FritzClient, config: &Config) -> Result<(), FritzError> {
    let mut state = match &config.state_file {
        Some(path) => PollState::load(path)?,
        None => PollState::default(),
    };
    let interval = Duration::from_secs(config.interval);

    loop {
        match client.fetch_log_with_retry().await {
            Err(err) => {
                error!("Fetch failed: {}", err);
            }
            Ok((entries, _payload)) => {
                let emitted = process_poll(&mut state, entries, |batch| {
                    output::emit_entries(batch, config.output_format, &config.output)
                });
                if emitted {
                    if let Some(path) = &config.state_file {
                        if let Err(err) = state.save(path) {
                            error!("Failed to persist poll state: {}", err);
                        }
                    }
                }
            }
        }
        sleep(interval).await;
    }
}
