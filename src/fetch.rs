use crate::error::FritzError;
use crate::log_entry::{parse_timestamp, LogEntry};
use crate::session::FritzClient;
use log::{debug, warn};
use serde_json::Value;

impl FritzClient {
    /// Fetches the event log page. Returns the structured entries together
    /// with the raw decoded payload so callers can persist the verbatim form.
    pub async fn fetch_log(&mut self) -> Result<(Vec<LogEntry>, Value), FritzError> {
        let sid = self.ensure_login().await?;
        let url = format!("{}/data.lua", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("xhr", "1"),
                ("lang", "de"),
                ("page", "log"),
                ("sid", sid.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FritzError::Fetch(format!(
                "unexpected HTTP status {}",
                status
            )));
        }

        let payload: Value = response.json().await?;
        let items = payload
            .get("data")
            .and_then(|data| data.get("log"))
            .and_then(Value::as_array)
            .ok_or_else(|| FritzError::Fetch("unexpected response shape".to_string()))?;

        let entries = entries_from_payload(items)?;
        debug!("Fetched {} log entries", entries.len());
        Ok((entries, payload))
    }

    /// Fetch with a single automatic re-authentication. Any failure discards
    /// the cached session, logs in fresh and retries exactly once; a second
    /// failure propagates. Retrying across cycles is the poller's job.
    pub async fn fetch_log_with_retry(&mut self) -> Result<(Vec<LogEntry>, Value), FritzError> {
        match self.fetch_log().await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!("Fetch failed ({}), re-authenticating once", err);
                self.invalidate_session();
                self.login().await?;
                self.fetch_log().await
            }
        }
    }
}

/// Converts raw log items into entries. Items without a date or time are
/// silently dropped; a present but unrecognized date/time fails the fetch.
fn entries_from_payload(items: &[Value]) -> Result<Vec<LogEntry>, FritzError> {
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let date = field_string(item, "date");
        let time = field_string(item, "time");
        if date.is_empty() || time.is_empty() {
            continue;
        }
        let timestamp = parse_timestamp(&date, &time).ok_or_else(|| {
            FritzError::Fetch(format!("unrecognized date/time: {} {}", date, time))
        })?;
        entries.push(LogEntry::new(
            timestamp,
            field_string(item, "group"),
            field_string(item, "id"),
            field_string(item, "msg"),
        ));
    }
    Ok(entries)
}

fn field_string(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}
