//! Sample domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::RunStatus;

/// One sequenced sample enrolled under a run.
///
/// `run_id` is a lookup-only back-reference, not an ownership edge: sample
/// records outlive any deletion of the run they point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: Uuid,
    pub sample_id: String,
    pub run_id: Uuid,
    pub barcode: Option<String>,
    pub status: RunStatus,
    /// Comma-joined list of source file paths for this sample.
    pub input_files: String,
    /// Expected report artifact path under the run's output folder.
    pub output_file: String,
}

impl Sample {
    /// Expected report path for a sample under a run output folder.
    pub fn report_path(output_folder: &str, sample_id: &str) -> String {
        format!("{output_folder}/{sample_id}/report/{sample_id}.multiqc_report.html")
    }
}
