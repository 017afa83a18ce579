//! Rendering of check results.
//!
//! Rendering is total: every [`CheckResult`] variant has an output and no
//! input makes these functions panic.

use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

use crate::result::{CheckReport, CheckResult, Status};
use crate::target::Strategy;

/// Output format selected on the command line or in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// One sentence per target
    Text,
    /// Pretty printed JSON array
    Json,
    /// Summary table
    Table,
}

/// Serializable view of one report.
#[derive(Debug, Serialize)]
pub struct ReportRecord<'a> {
    pub hostname: &'a str,
    pub port: u16,
    pub strategy: Strategy,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_left: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<'a> ReportRecord<'a> {
    pub fn new(report: &'a CheckReport, now: DateTime<Utc>) -> Self {
        let expiry = report.result.expiry();
        ReportRecord {
            hostname: &report.target.hostname,
            port: report.target.port,
            strategy: report.target.strategy,
            status: report.result.status(),
            failure: report.result.failure_kind(),
            not_after: expiry.map(|e| e.not_after),
            expires: expiry.map(|e| e.formatted()),
            days_left: expiry.map(|e| e.days_remaining(now)),
            expired: expiry.map(|e| e.is_expired(now)),
            reason: report.result.reason(),
        }
    }
}

/// Turns check reports into text for the terminal.
#[derive(Debug, Clone)]
pub struct Reporter {
    pub format: OutputFormat,
    /// Colour the text output
    pub color: bool,
    /// Reference time for "days left"
    pub now: DateTime<Utc>,
}

impl Reporter {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Reporter {
            format,
            color,
            now: Utc::now(),
        }
    }

    pub fn render(&self, reports: &[CheckReport]) -> String {
        match self.format {
            OutputFormat::Text => reports.iter().map(|r| self.render_text(r)).collect(),
            OutputFormat::Json => self.render_json(reports),
            OutputFormat::Table => self.render_table(reports),
        }
    }

    /// One report in the sentence form.
    pub fn render_text(&self, report: &CheckReport) -> String {
        let host = self.paint(&report.target.hostname, Paint::Good);
        let port = self.paint(&report.target.port.to_string(), Paint::Good);
        match &report.result {
            CheckResult::Success(expiry) => format!(
                "The Certificate for {} on port {} expires on\n\t{}.\n\n",
                host,
                port,
                self.paint(&expiry.formatted(), Paint::Bad)
            ),
            failure => format!(
                "Failed to check {} on port {}: {}\n\n",
                host,
                port,
                self.paint(&failure.reason().unwrap_or_default(), Paint::Bad)
            ),
        }
    }

    fn render_json(&self, reports: &[CheckReport]) -> String {
        let records: Vec<ReportRecord> = reports
            .iter()
            .map(|r| ReportRecord::new(r, self.now))
            .collect();
        match serde_json::to_string_pretty(&records) {
            Ok(json) => json + "\n",
            Err(e) => format!("{{\"error\": {:?}}}\n", e.to_string()),
        }
    }

    fn render_table(&self, reports: &[CheckReport]) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Host", "Port", "Protocol", "Status", "Expires", "Days Left"]);

        for report in reports {
            let target = &report.target;
            let (status, expires, days) = match &report.result {
                CheckResult::Success(expiry) if expiry.is_expired(self.now) => (
                    "EXPIRED".to_string(),
                    expiry.formatted(),
                    expiry.days_remaining(self.now).to_string(),
                ),
                CheckResult::Success(expiry) => (
                    "OK".to_string(),
                    expiry.formatted(),
                    expiry.days_remaining(self.now).to_string(),
                ),
                failure => (
                    failure.failure_kind().unwrap_or("failed").to_uppercase(),
                    failure.reason().unwrap_or_default(),
                    "-".to_string(),
                ),
            };
            table.add_row(vec![
                target.hostname.clone(),
                target.port.to_string(),
                target.strategy.label().to_string(),
                status,
                expires,
                days,
            ]);
        }
        format!("{}\n", table)
    }

    fn paint(&self, text: &str, paint: Paint) -> String {
        if !self.color {
            return text.to_string();
        }
        match paint {
            Paint::Good => text.green().to_string(),
            Paint::Bad => text.red().to_string(),
        }
    }
}

#[derive(Clone, Copy)]
enum Paint {
    Good,
    Bad,
}

/// Process exit code for a batch: 0 when every target succeeded, otherwise
/// `failure_code`.
pub fn exit_code(reports: &[CheckReport], failure_code: i32) -> i32 {
    if reports.iter().all(|r| r.result.is_success()) {
        0
    } else {
        failure_code
    }
}
