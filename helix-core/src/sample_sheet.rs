//! Sample sheet parsing
//!
//! The sample sheet is a plain CSV with a header row. The run name lives in
//! the `Run_name` column of the first data row; per-sample input files are
//! grouped by `sample_id` with the paths comma-joined, first row winning for
//! every other column.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::RunStatus;
use crate::domain::sample::Sample;

/// One parsed row of the sample sheet, recorded verbatim on the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSheetRow {
    pub run_name: String,
    pub sample_id: String,
    pub barcode: Option<String>,
    pub input_file: String,
}

/// Parsed sample sheet
#[derive(Debug, Clone)]
pub struct SampleSheet {
    pub rows: Vec<SampleSheetRow>,
}

#[derive(Debug, thiserror::Error)]
pub enum SampleSheetError {
    #[error("sample sheet is empty")]
    Empty,

    #[error("sample sheet is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("sample sheet row {row} has {got} fields, header has {expected}")]
    RaggedRow { row: usize, expected: usize, got: usize },
}

impl SampleSheet {
    /// Parses CSV text. Fields are not quoted in practice, so this is a
    /// straight split on commas with whitespace trimming.
    pub fn parse(text: &str) -> Result<Self, SampleSheetError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let header = lines.next().ok_or(SampleSheetError::Empty)?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();

        let col = |name: &'static str| -> Result<usize, SampleSheetError> {
            columns
                .iter()
                .position(|c| *c == name)
                .ok_or(SampleSheetError::MissingColumn(name))
        };

        let run_name_idx = col("Run_name")?;
        let sample_id_idx = col("sample_id")?;
        let input_file_idx = col("input_file")?;
        let barcode_idx = columns.iter().position(|c| *c == "BARCODE");

        let mut rows = Vec::new();
        for (i, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns.len() {
                return Err(SampleSheetError::RaggedRow {
                    row: i + 2,
                    expected: columns.len(),
                    got: fields.len(),
                });
            }

            rows.push(SampleSheetRow {
                run_name: fields[run_name_idx].to_string(),
                sample_id: fields[sample_id_idx].to_string(),
                barcode: barcode_idx.map(|b| fields[b].to_string()),
                input_file: fields[input_file_idx].to_string(),
            });
        }

        if rows.is_empty() {
            return Err(SampleSheetError::Empty);
        }

        Ok(Self { rows })
    }

    /// The run name, taken from the first data row.
    pub fn run_name(&self) -> &str {
        &self.rows[0].run_name
    }

    /// Groups rows by sample id into enrollable [`Sample`] records.
    ///
    /// Input files for the same sample id are comma-joined in sheet order;
    /// the first row for a sample wins for the remaining columns.
    pub fn resolve_samples(&self, run_id: Uuid, output_folder: &str) -> Vec<Sample> {
        let mut order: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !order.contains(&row.sample_id.as_str()) {
                order.push(&row.sample_id);
            }
        }

        order
            .into_iter()
            .map(|sample_id| {
                let group: Vec<&SampleSheetRow> = self
                    .rows
                    .iter()
                    .filter(|r| r.sample_id == sample_id)
                    .collect();
                let input_files = group
                    .iter()
                    .map(|r| r.input_file.as_str())
                    .collect::<Vec<_>>()
                    .join(",");

                Sample {
                    id: Uuid::new_v4(),
                    sample_id: sample_id.to_string(),
                    run_id,
                    barcode: group[0].barcode.clone(),
                    status: RunStatus::Created,
                    input_files,
                    output_file: Sample::report_path(output_folder, sample_id),
                }
            })
            .collect()
    }
}
