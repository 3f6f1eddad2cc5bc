use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::scanner::ScanResult;

use super::report::StoreReport;
use super::tree::render_reports;

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: String,
    pub detections: Vec<StoreReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JsonOutput {
    pub files_scanned: usize,
    pub total_detections: usize,
    pub total_values: usize,
    pub files: Vec<FileReport>,
}

pub struct OutputFormatter;

impl OutputFormatter {
    pub fn format(results: &[ScanResult], format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&Self::build_output(results))?),
            OutputFormat::Tree => Ok(Self::build_tree(results)),
        }
    }

    /// Files without detections or errors are counted but not listed.
    pub fn build_output(results: &[ScanResult]) -> JsonOutput {
        let files: Vec<FileReport> = results
            .iter()
            .filter(|r| !r.detections.is_empty() || !r.errors.is_empty())
            .map(|r| FileReport {
                file: r.file_path.clone(),
                detections: r.detections.clone(),
                errors: r.errors.clone(),
            })
            .collect();

        let total_detections: usize = results.iter().map(|r| r.detections.len()).sum();
        let total_values: usize = results
            .iter()
            .flat_map(|r| &r.detections)
            .map(|d| d.all_values().len())
            .sum();

        JsonOutput {
            files_scanned: results.len(),
            total_detections,
            total_values,
            files,
        }
    }

    pub fn build_tree(results: &[ScanResult]) -> String {
        let mut out = String::new();
        for result in results {
            if result.detections.is_empty() && result.errors.is_empty() {
                continue;
            }
            out.push_str(&format!("== {}\n", result.file_path));
            for error in &result.errors {
                out.push_str(&format!("error: {error}\n"));
            }
            out.push_str(&render_reports(&result.detections));
        }
        out
    }
}
