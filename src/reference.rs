use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::types::{CompatibilityError, Diplotype, RiskTier, DIPLOTYPE_SEPARATOR};

/// Phenotype and risk tier assigned to one canonical diplotype
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeAssignment {
    pub phenotype: String,
    pub risk: RiskTier,
}

impl PhenotypeAssignment {
    /// Fallback for diplotypes the reference table has no entry for.
    /// Reference tables are necessarily incomplete for rare allele
    /// combinations, so this is a data-quality signal rather than an error.
    pub fn unknown() -> Self {
        Self {
            phenotype: "Unknown".to_string(),
            risk: RiskTier::Unknown,
        }
    }
}

/// Reference data for one gene: the recognized allele set and the lookup
/// from canonical diplotype key to phenotype/risk.
///
/// Loaded once at startup and shared read-only by all computations.
#[derive(Debug, Clone)]
pub struct GeneProfile {
    symbol: String,
    alleles: BTreeSet<String>,
    diplotypes: HashMap<String, PhenotypeAssignment>,
}

impl GeneProfile {
    pub fn new(symbol: impl Into<String>, alleles: impl IntoIterator<Item = String>) -> Self {
        Self {
            symbol: symbol.into(),
            alleles: alleles.into_iter().collect(),
            diplotypes: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn alleles(&self) -> impl Iterator<Item = &str> {
        self.alleles.iter().map(String::as_str)
    }

    pub fn recognizes(&self, allele: &str) -> bool {
        self.alleles.contains(allele)
    }

    /// Record the phenotype/risk for one diplotype, keyed canonically
    pub fn assign(
        &mut self,
        diplotype: &Diplotype,
        phenotype: impl Into<String>,
        risk: RiskTier,
    ) {
        self.diplotypes.insert(
            diplotype.canonical_key(),
            PhenotypeAssignment {
                phenotype: phenotype.into(),
                risk,
            },
        );
    }

    /// Check both alleles of a parental diplotype against the declared set
    pub fn validate_diplotype(&self, diplotype: &Diplotype) -> Result<(), CompatibilityError> {
        let (a1, a2) = diplotype.alleles();
        for allele in [a1, a2] {
            if allele.is_empty() {
                return Err(CompatibilityError::InvalidAllele {
                    gene: self.symbol.clone(),
                    allele: allele.to_string(),
                    reason: "empty allele label".to_string(),
                });
            }
            if !self.recognizes(allele) {
                return Err(CompatibilityError::InvalidAllele {
                    gene: self.symbol.clone(),
                    allele: allele.to_string(),
                    reason: "not in the gene's declared allele set".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve a canonical diplotype key to its phenotype/risk, falling
    /// back to `Unknown` when the table has no entry.
    pub fn resolve(&self, canonical_key: &str) -> PhenotypeAssignment {
        self.diplotypes
            .get(canonical_key)
            .cloned()
            .unwrap_or_else(PhenotypeAssignment::unknown)
    }
}

/// Immutable gene symbol → `GeneProfile` mapping for the whole process
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    genes: BTreeMap<String, GeneProfile>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The builtin CPIC-aligned table, constructed once per process
    pub fn builtin() -> &'static ReferenceTable {
        &BUILTIN_TABLE
    }

    /// Load a reference table from a TOML file.
    ///
    /// Schema: `[genes.<SYMBOL>]` with an `alleles` list and a
    /// `[genes.<SYMBOL>.diplotypes]` table mapping `"A/B"` keys to
    /// `{ phenotype, risk }`. Diplotype keys are canonicalized on load.
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference table: {}", path.display()))?;
        let parsed: ReferenceFile = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse reference table: {}", path.display()))?;

        let mut table = Self::new();
        for (symbol, entry) in parsed.genes {
            let mut profile = GeneProfile::new(symbol.clone(), entry.alleles);

            for (key, assignment) in entry.diplotypes {
                let tokens: Vec<&str> = key.split(DIPLOTYPE_SEPARATOR).collect();
                if tokens.len() != 2 {
                    return Err(anyhow!(
                        "gene {}: diplotype key '{}' must contain exactly two alleles",
                        symbol,
                        key
                    ));
                }
                let diplotype = Diplotype::new(tokens[0], tokens[1]);
                profile.validate_diplotype(&diplotype).map_err(|e| {
                    anyhow!("gene {}: diplotype key '{}': {}", symbol, key, e)
                })?;
                profile.assign(&diplotype, assignment.phenotype, assignment.risk);
            }

            table.insert(profile);
        }

        if table.is_empty() {
            return Err(anyhow!(
                "reference table {} declares no genes",
                path.display()
            ));
        }

        Ok(table)
    }

    pub fn insert(&mut self, profile: GeneProfile) {
        self.genes.insert(profile.symbol().to_string(), profile);
    }

    pub fn gene(&self, symbol: &str) -> Result<&GeneProfile, CompatibilityError> {
        self.genes
            .get(symbol)
            .ok_or_else(|| CompatibilityError::UnknownGene(symbol.to_string()))
    }

    pub fn gene_symbols(&self) -> impl Iterator<Item = &str> {
        self.genes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    genes: BTreeMap<String, GeneEntry>,
}

#[derive(Debug, Deserialize)]
struct GeneEntry {
    alleles: Vec<String>,
    #[serde(default)]
    diplotypes: BTreeMap<String, DiplotypeEntry>,
}

#[derive(Debug, Deserialize)]
struct DiplotypeEntry {
    phenotype: String,
    risk: RiskTier,
}

// ---------------------------------------------------------------------------
// Builtin CPIC-aligned reference data
// ---------------------------------------------------------------------------

/// Functional status of a star allele, per CPIC allele-function assignments
#[derive(Debug, Clone, Copy)]
enum AlleleFunction {
    Normal,
    Decreased,
    NoFunction,
    Increased,
}

impl AlleleFunction {
    fn activity_value(&self) -> f64 {
        match self {
            AlleleFunction::Normal => 1.0,
            AlleleFunction::Decreased => 0.5,
            AlleleFunction::NoFunction => 0.0,
            AlleleFunction::Increased => 1.5,
        }
    }
}

/// Metabolizer phenotype labels
const ULTRA_RAPID: &str = "Ultra-rapid Metabolizer";
const NORMAL_METABOLIZER: &str = "Normal Metabolizer";
const INTERMEDIATE: &str = "Intermediate Metabolizer";
const POOR: &str = "Poor Metabolizer";

/// Map a summed diplotype activity score to phenotype and risk tier.
///
/// Thresholds follow the CPIC activity-score convention: two normal-function
/// copies score 2.0 (Normal Metabolizer), a single no-function copy drops
/// the carrier to Intermediate, two no-function copies to Poor.
fn classify_activity_score(total: f64) -> (&'static str, RiskTier) {
    if total >= 2.5 {
        (ULTRA_RAPID, RiskTier::Warning)
    } else if total >= 1.5 {
        (NORMAL_METABOLIZER, RiskTier::Normal)
    } else if total >= 1.0 {
        (INTERMEDIATE, RiskTier::Caution)
    } else {
        (POOR, RiskTier::Danger)
    }
}

type GeneFunctions = (&'static str, &'static [(&'static str, AlleleFunction)]);

/// Star-allele function assignments for the builtin genes
const BUILTIN_GENES: &[GeneFunctions] = &[
    (
        "CYP2C19",
        &[
            ("*1", AlleleFunction::Normal),
            ("*2", AlleleFunction::NoFunction),
            ("*3", AlleleFunction::NoFunction),
            ("*4", AlleleFunction::NoFunction),
            ("*17", AlleleFunction::Increased),
        ],
    ),
    (
        "CYP2C9",
        &[
            ("*1", AlleleFunction::Normal),
            ("*2", AlleleFunction::Decreased),
            ("*3", AlleleFunction::Decreased),
            ("*5", AlleleFunction::Decreased),
            ("*6", AlleleFunction::NoFunction),
            ("*8", AlleleFunction::Decreased),
            ("*11", AlleleFunction::Decreased),
        ],
    ),
    (
        "SLCO1B1",
        &[
            ("*1", AlleleFunction::Normal),
            ("*5", AlleleFunction::Decreased),
            ("*15", AlleleFunction::Decreased),
            ("*17", AlleleFunction::Decreased),
        ],
    ),
    (
        "TPMT",
        &[
            ("*1", AlleleFunction::Normal),
            ("*2", AlleleFunction::NoFunction),
            ("*3A", AlleleFunction::NoFunction),
            ("*3B", AlleleFunction::NoFunction),
            ("*3C", AlleleFunction::NoFunction),
        ],
    ),
    (
        "DPYD",
        &[
            ("*1", AlleleFunction::Normal),
            ("*2A", AlleleFunction::NoFunction),
            ("*13", AlleleFunction::NoFunction),
            ("c.2846A>T", AlleleFunction::Decreased),
            ("HapB3", AlleleFunction::Decreased),
        ],
    ),
];

fn build_builtin_table() -> ReferenceTable {
    let mut table = ReferenceTable::new();

    for (symbol, functions) in BUILTIN_GENES {
        let mut profile = GeneProfile::new(
            *symbol,
            functions.iter().map(|(allele, _)| allele.to_string()),
        );

        // Every unordered allele pair gets an entry so the builtin table
        // has full coverage of its own allele set.
        for (i, (allele_a, func_a)) in functions.iter().enumerate() {
            for (allele_b, func_b) in &functions[i..] {
                let total = func_a.activity_value() + func_b.activity_value();
                let (phenotype, risk) = classify_activity_score(total);
                profile.assign(&Diplotype::new(*allele_a, *allele_b), phenotype, risk);
            }
        }

        table.insert(profile);
    }

    table
}

lazy_static! {
    static ref BUILTIN_TABLE: ReferenceTable = build_builtin_table();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_table_covers_expected_genes() {
        let table = ReferenceTable::builtin();
        let symbols: Vec<&str> = table.gene_symbols().collect();
        assert_eq!(
            symbols,
            vec!["CYP2C19", "CYP2C9", "DPYD", "SLCO1B1", "TPMT"]
        );
    }

    #[test]
    fn builtin_wild_type_is_normal_metabolizer() {
        let gene = ReferenceTable::builtin().gene("CYP2C19").unwrap();
        let assignment = gene.resolve("*1/*1");
        assert_eq!(assignment.phenotype, NORMAL_METABOLIZER);
        assert_eq!(assignment.risk, RiskTier::Normal);
    }

    #[test]
    fn builtin_double_no_function_is_poor_metabolizer() {
        let gene = ReferenceTable::builtin().gene("CYP2C19").unwrap();
        let assignment = gene.resolve("*2/*2");
        assert_eq!(assignment.phenotype, POOR);
        assert_eq!(assignment.risk, RiskTier::Danger);
    }

    #[test]
    fn builtin_increased_function_is_ultra_rapid() {
        let gene = ReferenceTable::builtin().gene("CYP2C19").unwrap();
        let assignment = gene.resolve(&Diplotype::new("*17", "*17").canonical_key());
        assert_eq!(assignment.phenotype, ULTRA_RAPID);
        assert_eq!(assignment.risk, RiskTier::Warning);
    }

    #[test]
    fn unknown_diplotype_resolves_without_error() {
        let gene = ReferenceTable::builtin().gene("TPMT").unwrap();
        let assignment = gene.resolve("*99/*99");
        assert_eq!(assignment.phenotype, "Unknown");
        assert_eq!(assignment.risk, RiskTier::Unknown);
    }

    #[test]
    fn unknown_gene_lookup_fails() {
        let err = ReferenceTable::builtin().gene("CYP2D6").unwrap_err();
        assert_eq!(err, CompatibilityError::UnknownGene("CYP2D6".to_string()));
    }

    #[test]
    fn validate_rejects_undeclared_allele() {
        let gene = ReferenceTable::builtin().gene("SLCO1B1").unwrap();
        let err = gene
            .validate_diplotype(&Diplotype::new("*1", "*99"))
            .unwrap_err();
        assert!(matches!(err, CompatibilityError::InvalidAllele { .. }));
    }

    #[test]
    fn loads_reference_table_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[genes.CYP2C19]
alleles = ["*1", "*2"]

[genes.CYP2C19.diplotypes]
"*1/*1" = {{ phenotype = "Normal Metabolizer", risk = "normal" }}
"*2/*1" = {{ phenotype = "Intermediate Metabolizer", risk = "caution" }}
"#
        )
        .unwrap();

        let table = ReferenceTable::from_toml_path(file.path()).unwrap();
        let gene = table.gene("CYP2C19").unwrap();
        // Key canonicalized on load: "*2/*1" stored under "*1/*2"
        assert_eq!(gene.resolve("*1/*2").risk, RiskTier::Caution);
    }

    #[test]
    fn toml_load_rejects_malformed_diplotype_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[genes.TPMT]
alleles = ["*1"]

[genes.TPMT.diplotypes]
"*1/*1/*1" = {{ phenotype = "Normal Metabolizer", risk = "normal" }}
"#
        )
        .unwrap();

        assert!(ReferenceTable::from_toml_path(file.path()).is_err());
    }
}
