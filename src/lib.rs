//! # Offspring Pharmacogenomic Compatibility Engine
//!
//! Predicts a couple's offspring pharmacogenomic risk from two parental
//! genotypes: a Mendelian (Punnett) cross per gene, merged into
//! phenotype/risk classifications via an immutable CPIC-aligned reference
//! table, combined across genes into an overall compatibility report.
//!
//! ## Features
//!
//! - Order-independent diplotype normalization with preserved display order
//! - 4-cell Punnett cross per gene with canonical-key merging
//! - Multi-gene aggregation with per-gene, non-fatal error collection
//! - Optional joint offspring-profile probabilities under independent
//!   assortment (a documented simplification: linked loci are not modeled)
//! - Builtin CPIC-aligned reference table plus TOML-supplied tables
//! - JSON/CSV/TSV report output for the rendering layer

pub mod aggregate;
pub mod cross;
pub mod input;
pub mod reference;
pub mod report;
pub mod types;

// Re-export key types
pub use aggregate::CompatibilityAnalyzer;
pub use cross::{PunnettCross, PROBABILITY_TOLERANCE};
pub use input::{parse_diplotype_str, ParentInput};
pub use reference::{GeneProfile, PhenotypeAssignment, ReferenceTable};
pub use report::{ReportFormat, ReportGenerator};
pub use types::*;
