//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file,
//! one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::plan::Plan;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a run start event.
pub fn log_run_started(audit: &mut AuditLog, request_file: &str, model_id: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "request_file": request_file,
            "model": model_id,
        }),
    )
}

/// Convenience: log the solver outcome.
pub fn log_optimization(audit: &mut AuditLog, plan: &Plan) -> Result<()> {
    audit.log(
        "optimization_finished",
        serde_json::json!({
            "backend": plan.backend,
            "status": plan.solver_status.as_str(),
            "objective": plan.objective_value.map(|v| v.to_string()),
            "solve_time_seconds": plan.solve_time_seconds,
        }),
    )
}

/// Convenience: log derived transactions.
pub fn log_transactions(audit: &mut AuditLog, plan: &Plan) -> Result<()> {
    let tx_data: Vec<_> = plan
        .record
        .transactions
        .iter()
        .map(|t| {
            serde_json::json!({
                "security_id": t.security_id.as_str(),
                "type": t.kind.to_string(),
                "quantity": t.quantity,
            })
        })
        .collect();

    audit.log(
        "transactions_derived",
        serde_json::json!({
            "rebalance_id": plan.record.id.to_string(),
            "trade_date": plan.record.trade_date.to_string(),
            "transactions": tx_data,
        }),
    )
}

/// Convenience: log the drift report.
pub fn log_drift(audit: &mut AuditLog, plan: &Plan) -> Result<()> {
    let drift_data: Vec<_> = plan
        .record
        .drifts
        .iter()
        .map(|d| {
            serde_json::json!({
                "security_id": d.security_id.as_str(),
                "target": d.target.to_string(),
                "actual": d.actual.to_string(),
                "drift": d.actual_drift.to_string(),
                "in_band": d.is_within_band(),
            })
        })
        .collect();

    audit.log(
        "drift_report",
        serde_json::json!({
            "max_abs_drift": plan.record.max_abs_drift().to_string(),
            "positions": drift_data,
        }),
    )
}

/// Convenience: log run completion.
pub fn log_run_completed(audit: &mut AuditLog, plan_file: Option<&Path>) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "plan_file": plan_file.map(|p| p.display().to_string()),
        }),
    )
}
