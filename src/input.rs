use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::types::{CompatibilityError, Diplotype, DIPLOTYPE_SEPARATOR};

/// One parent's genotype data: gene symbol → diplotype.
///
/// Arrives at the boundary as a JSON object of the form
/// `{ "CYP2C19": "*1/*2", ... }`; genes absent from this map are skipped
/// by the aggregator, never defaulted to a wild-type diplotype. A gene
/// whose diplotype string is malformed is kept aside as a per-gene parse
/// error so the remaining genes still get evaluated.
#[derive(Debug, Clone, Default)]
pub struct ParentInput {
    genes: BTreeMap<String, Diplotype>,
    malformed: BTreeMap<String, CompatibilityError>,
}

impl ParentInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from the JSON request-body shape.
    ///
    /// Only a body that is not a gene → diplotype object is an error here.
    /// Malformed diplotype strings are recorded per gene and surface later
    /// in the report's failure list.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let map: BTreeMap<String, String> =
            serde_json::from_str(raw).context("Parent input is not a gene → diplotype object")?;

        let mut input = Self::new();
        for (gene, diplotype) in map {
            match parse_diplotype_str(&gene, &diplotype) {
                Ok(parsed) => {
                    input.genes.insert(gene, parsed);
                }
                Err(err) => {
                    input.malformed.insert(gene, err);
                }
            }
        }
        Ok(input)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read parent input: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("Failed to parse parent input: {}", path.display()))
    }

    pub fn set(&mut self, gene: impl Into<String>, diplotype: Diplotype) {
        self.genes.insert(gene.into(), diplotype);
    }

    pub fn get(&self, gene: &str) -> Option<&Diplotype> {
        self.genes.get(gene)
    }

    /// The parse error for a gene whose diplotype string was malformed
    pub fn parse_error(&self, gene: &str) -> Option<&CompatibilityError> {
        self.malformed.get(gene)
    }

    pub fn genes(&self) -> impl Iterator<Item = &str> {
        self.genes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Split a diplotype string on the `/` separator into exactly two allele
/// tokens. Any other token count is a format error.
pub fn parse_diplotype_str(gene: &str, raw: &str) -> Result<Diplotype, CompatibilityError> {
    let tokens: Vec<&str> = raw.split(DIPLOTYPE_SEPARATOR).collect();
    if tokens.len() != 2 {
        return Err(CompatibilityError::InvalidAllele {
            gene: gene.to_string(),
            allele: raw.to_string(),
            reason: format!(
                "diplotype must contain exactly two alleles separated by '{}'",
                DIPLOTYPE_SEPARATOR
            ),
        });
    }
    Ok(Diplotype::new(tokens[0], tokens[1]))
}
