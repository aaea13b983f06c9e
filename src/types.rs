use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Separator between the two alleles of a diplotype string
pub const DIPLOTYPE_SEPARATOR: char = '/';

/// Identifies which side of the couple a piece of input came from.
///
/// `Both` covers the case where a requested gene is absent from both
/// parents' inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentId {
    #[serde(rename = "parentA")]
    A,
    #[serde(rename = "parentB")]
    B,
    #[serde(rename = "both")]
    Both,
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentId::A => write!(f, "parent A"),
            ParentId::B => write!(f, "parent B"),
            ParentId::Both => write!(f, "both parents"),
        }
    }
}

/// Errors produced while evaluating a couple's compatibility.
///
/// All variants except `NoUsableGenes` are per-gene and non-fatal: the
/// aggregator collects them into the report's failure list instead of
/// aborting the whole request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompatibilityError {
    #[error("invalid allele '{allele}' for gene {gene}: {reason}")]
    InvalidAllele {
        gene: String,
        allele: String,
        reason: String,
    },

    #[error("gene {0} is not present in the reference table")]
    UnknownGene(String),

    #[error("gene {gene} is missing from {parent}")]
    IncompleteParentData { gene: String, parent: ParentId },

    #[error("no genes could be evaluated for this couple")]
    NoUsableGenes,
}

/// An unordered pair of star alleles carried by one individual at one gene.
///
/// Identity is order-independent: `Diplotype::new("*1", "*4")` equals
/// `Diplotype::new("*4", "*1")`. The canonical key (alleles sorted
/// lexicographically, joined with `/`) is the sole source of truth for
/// equality and table lookups; the raw input order is preserved separately
/// so display strings match what the caller supplied.
#[derive(Debug, Clone)]
pub struct Diplotype {
    allele1: String,
    allele2: String,
}

impl Diplotype {
    pub fn new(allele1: impl Into<String>, allele2: impl Into<String>) -> Self {
        Self {
            allele1: allele1.into(),
            allele2: allele2.into(),
        }
    }

    /// The two alleles in the order they were supplied
    pub fn alleles(&self) -> (&str, &str) {
        (&self.allele1, &self.allele2)
    }

    fn ordered(&self) -> (&str, &str) {
        if self.allele1 <= self.allele2 {
            (&self.allele1, &self.allele2)
        } else {
            (&self.allele2, &self.allele1)
        }
    }

    /// Order-independent key used for merging and table lookups
    pub fn canonical_key(&self) -> String {
        let (first, second) = self.ordered();
        format!("{}{}{}", first, DIPLOTYPE_SEPARATOR, second)
    }
}

impl PartialEq for Diplotype {
    fn eq(&self, other: &Self) -> bool {
        self.ordered() == other.ordered()
    }
}

impl Eq for Diplotype {}

impl Hash for Diplotype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ordered().hash(state);
    }
}

impl fmt::Display for Diplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.allele1, DIPLOTYPE_SEPARATOR, self.allele2)
    }
}

/// Ordered risk classification for an offspring diplotype.
///
/// `Unknown` is deliberately outside the severity order: it marks a
/// diplotype the reference table has no entry for and is never promoted to
/// a severity level when computing the overall tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Normal,
    Caution,
    Warning,
    Danger,
    Unknown,
}

impl RiskTier {
    /// Position in the severity order, `None` for `Unknown`
    pub fn severity(&self) -> Option<u8> {
        match self {
            RiskTier::Normal => Some(0),
            RiskTier::Caution => Some(1),
            RiskTier::Warning => Some(2),
            RiskTier::Danger => Some(3),
            RiskTier::Unknown => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Normal => "normal",
            RiskTier::Caution => "caution",
            RiskTier::Warning => "warning",
            RiskTier::Danger => "danger",
            RiskTier::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One merged offspring outcome for a single gene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEntry {
    /// Canonical diplotype key, e.g. `*1/*4`
    pub diplotype: String,
    pub phenotype: String,
    pub risk: RiskTier,
    pub probability: f64,
}

/// Result of a Punnett cross for one gene between two parental diplotypes.
///
/// Entries are sorted by descending probability, ties broken by ascending
/// canonical key, and their probabilities sum to 1.0 within tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossOutcome {
    pub gene: String,
    /// Parent A's diplotype in its as-supplied display order
    pub parent_a: String,
    pub parent_b: String,
    pub entries: Vec<OutcomeEntry>,
}

/// A gene that was requested but present in only one parent's input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedGene {
    pub gene: String,
    pub missing_from: ParentId,
}

/// A gene that could not be evaluated, with the error that stopped it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedGene {
    pub gene: String,
    pub reason: String,
}

/// An offspring diplotype the reference table has no entry for.
///
/// Surfaced so the rendering layer can flag incomplete coverage; these
/// never contribute to the overall risk tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageCaveat {
    pub gene: String,
    pub diplotype: String,
    pub probability: f64,
}

/// One row of the joint probability table: a specific combination of
/// per-gene offspring diplotypes and its probability under independent
/// assortment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointOutcome {
    /// Gene symbol → canonical offspring diplotype
    pub diplotypes: BTreeMap<String, String>,
    pub probability: f64,
}

/// Full compatibility report for a couple, created fresh per request and
/// never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub outcomes: Vec<CrossOutcome>,
    pub overall_risk: RiskTier,
    pub skipped_genes: Vec<SkippedGene>,
    pub failed_genes: Vec<FailedGene>,
    pub coverage_caveats: Vec<CoverageCaveat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joint_probabilities: Option<Vec<JointOutcome>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diplotype_equality_ignores_allele_order() {
        let a = Diplotype::new("*1", "*4");
        let b = Diplotype::new("*4", "*1");
        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn canonical_key_is_idempotent() {
        let d = Diplotype::new("*17", "*2");
        let key = d.canonical_key();
        let parts: Vec<&str> = key.split(DIPLOTYPE_SEPARATOR).collect();
        let reparsed = Diplotype::new(parts[0], parts[1]);
        assert_eq!(reparsed.canonical_key(), key);
    }

    #[test]
    fn display_preserves_input_order() {
        let d = Diplotype::new("*4", "*1");
        assert_eq!(d.to_string(), "*4/*1");
        assert_eq!(d.canonical_key(), "*1/*4");
    }

    #[test]
    fn risk_tier_severity_order() {
        assert!(RiskTier::Normal.severity() < RiskTier::Caution.severity());
        assert!(RiskTier::Caution.severity() < RiskTier::Warning.severity());
        assert!(RiskTier::Warning.severity() < RiskTier::Danger.severity());
    }

    #[test]
    fn unknown_tier_has_no_severity() {
        assert_eq!(RiskTier::Unknown.severity(), None);
    }

    #[test]
    fn risk_tier_serializes_lowercase() {
        let json = serde_json::to_string(&RiskTier::Danger).unwrap();
        assert_eq!(json, "\"danger\"");
    }

    #[test]
    fn parent_id_serializes_for_rendering_layer() {
        assert_eq!(serde_json::to_string(&ParentId::A).unwrap(), "\"parentA\"");
        assert_eq!(serde_json::to_string(&ParentId::Both).unwrap(), "\"both\"");
        assert_eq!(ParentId::Both.to_string(), "both parents");
    }
}
