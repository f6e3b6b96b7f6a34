use crate::log_entry::LogEntry;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jsonl,
    Text,
}

fn is_stdout(target: &str) -> bool {
    let normalized = target.trim().to_ascii_lowercase();
    normalized == "-" || normalized == "stdout"
}

fn render(entry: &LogEntry, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(entry.to_text_line()),
        OutputFormat::Jsonl => {
            serde_json::to_string(entry).context("Failed to serialize log entry")
        }
    }
}

/// Writes one line per entry, in order, to stdout or appended to a file.
pub fn emit_entries(entries: &[LogEntry], format: OutputFormat, target: &str) -> Result<()> {
    if is_stdout(target) {
        for entry in entries {
            println!("{}", render(entry, format)?);
        }
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(target)
        .with_context(|| format!("Failed to open output file: {}", target))?;
    for entry in entries {
        writeln!(file, "{}", render(entry, format)?)?;
    }
    Ok(())
}

/// Writes the raw decoded payload verbatim, overwriting any previous dump.
pub fn emit_payload(payload: &Value, target: &str) -> Result<()> {
    let line = serde_json::to_string(payload).context("Failed to serialize payload")?;
    if is_stdout(target) {
        println!("{}", line);
        return Ok(());
    }
    std::fs::write(target, format!("{}\n", line))
        .with_context(|| format!("Failed to write payload file: {}", target))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(msg: &str) -> LogEntry {
        LogEntry::new(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            "WLAN".to_string(),
            "1".to_string(),
            msg.to_string(),
        )
    }

    #[test]
    fn recognizes_stdout_aliases() {
        assert!(is_stdout("-"));
        assert!(is_stdout("stdout"));
        assert!(is_stdout(" STDOUT "));
        assert!(!is_stdout("log.txt"));
    }

    #[test]
    fn renders_both_formats() {
        let e = entry("x");
        assert_eq!(
            render(&e, OutputFormat::Text).unwrap(),
            "01.01.24 10:00:00 WLAN 1 x"
        );
        let json = render(&e, OutputFormat::Jsonl).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["timestamp"], "2024-01-01T10:00:00");
    }

    #[test]
    fn file_output_appends_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let target = path.to_str().unwrap();

        emit_entries(&[entry("first")], OutputFormat::Text, target).unwrap();
        emit_entries(&[entry("second")], OutputFormat::Text, target).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].ends_with("second"));
    }

    #[test]
    fn payload_output_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        let target = path.to_str().unwrap();

        emit_payload(&serde_json::json!({"a": 1}), target).unwrap();
        emit_payload(&serde_json::json!({"b": 2}), target).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"b\":2}\n");
    }
}
