//! Run metrics
//!
//! Counters and histograms for validated rows and import submissions. No
//! exporter is installed by this crate; the macros are no-ops until an
//! embedding program installs a recorder.

pub const PIPELINE_ADD: &str = "add";
pub const PIPELINE_REMOVE: &str = "remove";

/// Record a row that passed validation and was staged
pub fn record_row_accepted(pipeline: &'static str) {
    ::metrics::counter!("recon_fields_rows_accepted_total", "pipeline" => pipeline).increment(1);
}

/// Record a row dropped during validation
pub fn record_row_rejected(pipeline: &'static str, reason: &'static str) {
    ::metrics::counter!(
        "recon_fields_rows_rejected_total",
        "pipeline" => pipeline,
        "reason" => reason
    )
    .increment(1);
}

/// Record a batch with nothing to stage
pub fn record_short_circuit(pipeline: &'static str) {
    ::metrics::counter!("recon_fields_runs_short_circuited_total", "pipeline" => pipeline).increment(1);
}

/// Record a submitted import and the size of the document
pub fn record_import_submitted(pipeline: &'static str, staged: usize, bytes: usize) {
    ::metrics::counter!("recon_fields_imports_submitted_total", "pipeline" => pipeline).increment(1);
    ::metrics::histogram!("recon_fields_import_fields_staged", "pipeline" => pipeline).record(staged as f64);
    ::metrics::histogram!("recon_fields_import_bytes", "pipeline" => pipeline).record(bytes as f64);
}

pub fn record_import_failed(pipeline: &'static str) {
    ::metrics::counter!("recon_fields_imports_failed_total", "pipeline" => pipeline).increment(1);
}

/// Record the wall time of a run
pub fn record_run_duration(pipeline: &'static str, duration_secs: f64) {
    ::metrics::histogram!("recon_fields_run_duration_seconds", "pipeline" => pipeline).record(duration_secs);
}
