//! Analysis worker boundary.
//!
//! Every request runs the pure analyzer on its own OS thread and reports
//! back over a oneshot channel, so a crash or hang in the analysis can
//! never take the async runtime with it. The caller enforces a timeout;
//! both outcomes surface as [`ScanError`] and leave the file unchecked.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use refugio_shared::stego;
use refugio_shared::types::ScanReport;

use crate::error::ScanError;

/// Runs hidden-data analysis off the async runtime.
#[derive(Debug, Clone)]
pub struct FileScanner {
    entropy_threshold: f64,
    timeout: Duration,
}

impl FileScanner {
    pub fn new(entropy_threshold: f64, timeout: Duration) -> Self {
        Self {
            entropy_threshold,
            timeout,
        }
    }

    /// Analyze a file's bytes on an isolated worker thread.
    pub async fn scan(&self, data: Vec<u8>, file_name: &str) -> Result<ScanReport, ScanError> {
        let (tx, rx) = oneshot::channel();
        let threshold = self.entropy_threshold;
        let name = file_name.to_string();

        std::thread::spawn(move || {
            let report = stego::inspect(&data, &name, threshold);
            // The receiver may have timed out and gone away.
            let _ = tx.send(report);
        });

        let result = await_report(rx, self.timeout).await;
        match &result {
            Ok(report) => debug!(
                file = %file_name,
                passed = report.passed,
                entropy = report.entropy,
                "analysis completed"
            ),
            Err(e) => warn!(file = %file_name, error = %e, "analysis failed"),
        }
        result
    }
}

async fn await_report(
    rx: oneshot::Receiver<ScanReport>,
    timeout: Duration,
) -> Result<ScanReport, ScanError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(_)) => Err(ScanError::WorkerCrashed),
        Err(_) => Err(ScanError::Timeout(timeout)),
    }
}
