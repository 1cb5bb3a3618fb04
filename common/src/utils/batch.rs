use serde::Serialize;

/// How many individual item errors a batch keeps for reporting.
pub const ERROR_SAMPLE_LIMIT: usize = 5;

/// Outcome of a batch job that continues past individual item failures.
/// The job counts as successful only with zero failures.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// First few item errors, capped at [`ERROR_SAMPLE_LIMIT`].
    pub error_sample: Vec<String>,
}

impl BatchReport {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, error: impl std::fmt::Display) {
        self.processed += 1;
        self.failed += 1;
        if self.error_sample.len() < ERROR_SAMPLE_LIMIT {
            self.error_sample.push(error.to_string());
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
