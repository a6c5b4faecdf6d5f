use std::fmt::Write as _;

use serde_json::Value;

use crate::{probe::ProbeReport, recorder::pretty_json};

const BANNER_WIDTH: usize = 60;

pub fn render_summary(report: &ProbeReport) -> String {
    let banner = "=".repeat(BANNER_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "{banner}");
    let _ = writeln!(out, "SUMMARY OF RECEIVED EVENTS:");
    let _ = writeln!(out, "{banner}");
    for event in &report.recorded.events {
        let _ = writeln!(out, "Event: {}", event.name);
    }

    if !report.steps.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Steps:");
        let width = report
            .steps
            .iter()
            .map(|record| record.label.len())
            .max()
            .unwrap_or(0);
        for record in &report.steps {
            let _ = writeln!(
                out,
                "  {:<width$}  {:>6}ms  {}",
                record.label,
                record.elapsed.as_millis(),
                record.outcome
            );
        }
    }

    if let Some(reason) = &report.connection_lost {
        let _ = writeln!(out);
        let _ = writeln!(out, "Connection lost: {reason}");
    }
    if report.interrupted {
        let _ = writeln!(out);
        let _ = writeln!(out, "Run interrupted before the plan finished.");
    }

    if let Some(notifications) = report
        .recorded
        .notification_list
        .as_ref()
        .filter(|value| has_content(value))
    {
        let _ = writeln!(out);
        let _ = writeln!(out, "Notification List Data Structure:");
        let _ = writeln!(out, "{}", pretty_json(notifications));
    }

    out
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::String(text) => !text.is_empty(),
        Value::Bool(flag) => *flag,
        Value::Number(_) => true,
    }
}
