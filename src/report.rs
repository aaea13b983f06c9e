use anyhow::{Context, Result};
use chrono::Local;
use serde_json::to_string_pretty;
use std::fs;
use std::path::Path;

use crate::types::CompatibilityReport;

/// Supported report formats
#[derive(Debug, Clone, Copy)]
pub enum ReportFormat {
    Json,
    Csv,
    Tsv,
    All,
}

/// Writes a `CompatibilityReport` in the shape consumed by the rendering
/// layer: camelCase JSON with per-gene ordered outcome lists, the overall
/// risk tier, and the skipped/failed gene lists with reasons.
pub struct ReportGenerator {
    output_dir: String,
}

impl ReportGenerator {
    pub fn new(output_dir: &Path) -> Result<Self> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create output directory: {}", output_dir.display())
            })?;
        }

        Ok(Self {
            output_dir: output_dir.to_string_lossy().to_string(),
        })
    }

    /// Generate report files in the specified format(s), returning the
    /// paths written.
    pub fn generate(
        &self,
        report: &CompatibilityReport,
        format: ReportFormat,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        match format {
            ReportFormat::Json => written.push(self.write_json(report)?),
            ReportFormat::Csv => written.extend(self.write_tabular(report, "csv", b',')?),
            ReportFormat::Tsv => written.extend(self.write_tabular(report, "tsv", b'\t')?),
            ReportFormat::All => {
                written.push(self.write_json(report)?);
                written.extend(self.write_tabular(report, "csv", b',')?);
                written.extend(self.write_tabular(report, "tsv", b'\t')?);
            }
        }
        Ok(written)
    }

    /// Serialize the full report to the rendering-layer JSON shape
    pub fn to_json(report: &CompatibilityReport) -> Result<String> {
        to_string_pretty(report).context("Failed to serialize compatibility report to JSON")
    }

    fn write_json(&self, report: &CompatibilityReport) -> Result<String> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let filename = format!("{}/compatibility_{}.json", self.output_dir, timestamp);

        let json_content = Self::to_json(report)?;
        fs::write(&filename, json_content)
            .with_context(|| format!("Failed to write JSON report to {}", filename))?;

        Ok(filename)
    }

    fn write_tabular(
        &self,
        report: &CompatibilityReport,
        extension: &str,
        delimiter: u8,
    ) -> Result<Vec<String>> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut written = Vec::new();

        let filename = format!(
            "{}/compatibility_{}.{}",
            self.output_dir, timestamp, extension
        );
        self.write_outcomes(report, &filename, delimiter)?;
        written.push(filename);

        if let Some(joint) = &report.joint_probabilities {
            if !joint.is_empty() {
                let filename = format!(
                    "{}/joint_probabilities_{}.{}",
                    self.output_dir, timestamp, extension
                );
                self.write_joint(report, &filename, delimiter)?;
                written.push(filename);
            }
        }

        Ok(written)
    }

    fn write_outcomes(
        &self,
        report: &CompatibilityReport,
        filename: &str,
        delimiter: u8,
    ) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)
            .with_context(|| format!("Failed to create report file: {}", filename))?;

        wtr.write_record([
            "gene",
            "parent_a",
            "parent_b",
            "diplotype",
            "phenotype",
            "risk",
            "probability",
        ])?;

        for outcome in &report.outcomes {
            for entry in &outcome.entries {
                let probability = format!("{:.4}", entry.probability);
                wtr.write_record([
                    outcome.gene.as_str(),
                    outcome.parent_a.as_str(),
                    outcome.parent_b.as_str(),
                    entry.diplotype.as_str(),
                    entry.phenotype.as_str(),
                    entry.risk.label(),
                    probability.as_str(),
                ])?;
            }
        }

        wtr.flush()?;
        Ok(())
    }

    fn write_joint(
        &self,
        report: &CompatibilityReport,
        filename: &str,
        delimiter: u8,
    ) -> Result<()> {
        let joint = match &report.joint_probabilities {
            Some(joint) => joint,
            None => return Ok(()),
        };

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)
            .with_context(|| format!("Failed to create joint table file: {}", filename))?;

        wtr.write_record(["offspring_profile", "probability"])?;

        for row in joint {
            let profile: Vec<String> = row
                .diplotypes
                .iter()
                .map(|(gene, diplotype)| format!("{}={}", gene, diplotype))
                .collect();
            wtr.write_record([profile.join("; "), format!("{:.6}", row.probability)])?;
        }

        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CrossOutcome, OutcomeEntry, RiskTier};

    fn sample_report() -> CompatibilityReport {
        CompatibilityReport {
            outcomes: vec![CrossOutcome {
                gene: "CYP2C19".to_string(),
                parent_a: "*1/*2".to_string(),
                parent_b: "*1/*1".to_string(),
                entries: vec![
                    OutcomeEntry {
                        diplotype: "*1/*1".to_string(),
                        phenotype: "Normal Metabolizer".to_string(),
                        risk: RiskTier::Normal,
                        probability: 0.5,
                    },
                    OutcomeEntry {
                        diplotype: "*1/*2".to_string(),
                        phenotype: "Intermediate Metabolizer".to_string(),
                        risk: RiskTier::Caution,
                        probability: 0.5,
                    },
                ],
            }],
            overall_risk: RiskTier::Caution,
            skipped_genes: vec![],
            failed_genes: vec![],
            coverage_caveats: vec![],
            joint_probabilities: None,
        }
    }

    #[test]
    fn json_uses_rendering_layer_field_names() {
        let json = ReportGenerator::to_json(&sample_report()).unwrap();
        assert!(json.contains("\"overallRisk\": \"caution\""));
        assert!(json.contains("\"skippedGenes\""));
        assert!(json.contains("\"failedGenes\""));
        assert!(json.contains("\"parentA\": \"*1/*2\""));
        // Joint table omitted when not computed
        assert!(!json.contains("jointProbabilities"));
    }

    #[test]
    fn writes_json_and_csv_reports() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path()).unwrap();

        let written = generator
            .generate(&sample_report(), ReportFormat::All)
            .unwrap();
        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(std::path::Path::new(path).exists());
        }

        let csv_path = written.iter().find(|p| p.ends_with(".csv")).unwrap();
        let content = fs::read_to_string(csv_path).unwrap();
        assert!(content.starts_with("gene,parent_a,parent_b"));
        assert!(content.contains("CYP2C19,*1/*2,*1/*1,*1/*1,Normal Metabolizer,normal,0.5000"));
    }
}
