use std::cmp::Ordering;
use std::collections::HashMap;

use crate::reference::GeneProfile;
use crate::types::{CompatibilityError, CrossOutcome, Diplotype, OutcomeEntry};

/// Tolerance for the probability-sum invariant on a cross outcome
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Single-locus Mendelian cross engine.
///
/// Enumerates the 4-cell Punnett square between two parental diplotypes,
/// merges duplicate offspring diplotypes by canonical key, and resolves
/// each merged diplotype to phenotype/risk through the gene's reference
/// profile. No dominance model is applied: every diplotype combination is
/// tracked explicitly rather than collapsed into phenotype classes.
pub struct PunnettCross;

impl PunnettCross {
    pub fn new() -> Self {
        Self
    }

    /// Cross two parental diplotypes for one gene.
    ///
    /// Each of the 4 ordered allele pairs is an equally likely offspring
    /// genotype with raw probability 0.25; merged entries sum to 1.0
    /// within `PROBABILITY_TOLERANCE`. Output is sorted by descending
    /// probability, ties broken by ascending canonical key, so rendering
    /// and tests are reproducible.
    pub fn cross(
        &self,
        profile: &GeneProfile,
        parent_a: &Diplotype,
        parent_b: &Diplotype,
    ) -> Result<CrossOutcome, CompatibilityError> {
        profile.validate_diplotype(parent_a)?;
        profile.validate_diplotype(parent_b)?;

        let (a1, a2) = parent_a.alleles();
        let (b1, b2) = parent_b.alleles();

        let mut merged: HashMap<String, f64> = HashMap::with_capacity(4);
        for maternal in [a1, a2] {
            for paternal in [b1, b2] {
                let key = Diplotype::new(maternal, paternal).canonical_key();
                *merged.entry(key).or_insert(0.0) += 0.25;
            }
        }

        let mut entries: Vec<OutcomeEntry> = merged
            .into_iter()
            .map(|(key, probability)| {
                let assignment = profile.resolve(&key);
                OutcomeEntry {
                    diplotype: key,
                    phenotype: assignment.phenotype,
                    risk: assignment.risk,
                    probability,
                }
            })
            .collect();

        entries.sort_by(|left, right| {
            right
                .probability
                .partial_cmp(&left.probability)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.diplotype.cmp(&right.diplotype))
        });

        Ok(CrossOutcome {
            gene: profile.symbol().to_string(),
            parent_a: parent_a.to_string(),
            parent_b: parent_b.to_string(),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceTable;
    use crate::types::RiskTier;

    fn engine() -> PunnettCross {
        PunnettCross::new()
    }

    fn cyp2c19() -> &'static GeneProfile {
        ReferenceTable::builtin().gene("CYP2C19").unwrap()
    }

    fn probability_sum(outcome: &CrossOutcome) -> f64 {
        outcome.entries.iter().map(|e| e.probability).sum()
    }

    #[test]
    fn probabilities_sum_to_one() {
        let gene = cyp2c19();
        let pairs = [
            (Diplotype::new("*1", "*1"), Diplotype::new("*1", "*1")),
            (Diplotype::new("*1", "*2"), Diplotype::new("*1", "*2")),
            (Diplotype::new("*1", "*2"), Diplotype::new("*3", "*17")),
            (Diplotype::new("*2", "*2"), Diplotype::new("*17", "*1")),
        ];
        for (a, b) in pairs {
            let outcome = engine().cross(gene, &a, &b).unwrap();
            assert!((probability_sum(&outcome) - 1.0).abs() < PROBABILITY_TOLERANCE);
        }
    }

    #[test]
    fn cross_is_symmetric_in_parents() {
        let gene = cyp2c19();
        let a = Diplotype::new("*1", "*2");
        let b = Diplotype::new("*17", "*3");
        let forward = engine().cross(gene, &a, &b).unwrap();
        let reverse = engine().cross(gene, &b, &a).unwrap();

        assert_eq!(forward.entries.len(), reverse.entries.len());
        for (f, r) in forward.entries.iter().zip(&reverse.entries) {
            assert_eq!(f.diplotype, r.diplotype);
            assert_eq!(f.phenotype, r.phenotype);
            assert_eq!(f.risk, r.risk);
            assert!((f.probability - r.probability).abs() < PROBABILITY_TOLERANCE);
        }
    }

    #[test]
    fn homozygous_same_allele_cross_yields_single_entry() {
        let gene = cyp2c19();
        let a = Diplotype::new("*1", "*1");
        let outcome = engine().cross(gene, &a, &a).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].diplotype, "*1/*1");
        assert!((outcome.entries[0].probability - 1.0).abs() < PROBABILITY_TOLERANCE);
    }

    #[test]
    fn fully_disjoint_cross_yields_four_quarter_entries() {
        let gene = cyp2c19();
        let a = Diplotype::new("*1", "*2");
        let b = Diplotype::new("*3", "*17");
        let outcome = engine().cross(gene, &a, &b).unwrap();

        assert_eq!(outcome.entries.len(), 4);
        for entry in &outcome.entries {
            assert!((entry.probability - 0.25).abs() < PROBABILITY_TOLERANCE);
        }
        // Ties on probability fall back to ascending canonical key
        let keys: Vec<&str> = outcome.entries.iter().map(|e| e.diplotype.as_str()).collect();
        assert_eq!(keys, vec!["*1/*17", "*1/*3", "*17/*2", "*2/*3"]);
    }

    #[test]
    fn one_shared_allele_cross_merges_correctly() {
        let gene = cyp2c19();
        let a = Diplotype::new("*1", "*2");
        let b = Diplotype::new("*1", "*3");
        let outcome = engine().cross(gene, &a, &b).unwrap();

        // *1/*1, *1/*2, *1/*3, *2/*3 each at 0.25; the merge must not
        // collapse distinct keys
        assert_eq!(outcome.entries.len(), 4);
        let mut found: Vec<(&str, f64)> = outcome
            .entries
            .iter()
            .map(|e| (e.diplotype.as_str(), e.probability))
            .collect();
        found.sort_by(|x, y| x.0.cmp(y.0));
        assert_eq!(found[0].0, "*1/*1");
        assert_eq!(found[1].0, "*1/*2");
        assert_eq!(found[2].0, "*1/*3");
        assert_eq!(found[3].0, "*2/*3");
        for (_, p) in found {
            assert!((p - 0.25).abs() < PROBABILITY_TOLERANCE);
        }
    }

    #[test]
    fn shared_pair_cross_merges_heterozygotes() {
        let gene = cyp2c19();
        let a = Diplotype::new("*1", "*2");
        let outcome = engine().cross(gene, &a, &a).unwrap();

        // *1/*2 arises from two of the four cells
        assert_eq!(outcome.entries.len(), 3);
        assert_eq!(outcome.entries[0].diplotype, "*1/*2");
        assert!((outcome.entries[0].probability - 0.5).abs() < PROBABILITY_TOLERANCE);
        assert!((outcome.entries[1].probability - 0.25).abs() < PROBABILITY_TOLERANCE);
        assert!((outcome.entries[2].probability - 0.25).abs() < PROBABILITY_TOLERANCE);
    }

    #[test]
    fn unlisted_diplotype_resolves_to_unknown_without_error() {
        // Partial table: allele recognized but no diplotype entries
        let mut profile = GeneProfile::new(
            "CYP2C19",
            ["*1".to_string(), "*2".to_string()],
        );
        profile.assign(
            &Diplotype::new("*1", "*1"),
            "Normal Metabolizer",
            RiskTier::Normal,
        );

        let a = Diplotype::new("*1", "*2");
        let outcome = engine().cross(&profile, &a, &a).unwrap();
        let het = outcome
            .entries
            .iter()
            .find(|e| e.diplotype == "*1/*2")
            .unwrap();
        assert_eq!(het.phenotype, "Unknown");
        assert_eq!(het.risk, RiskTier::Unknown);
    }

    #[test]
    fn rejects_allele_outside_declared_set() {
        let gene = cyp2c19();
        let err = engine()
            .cross(gene, &Diplotype::new("*1", "*99"), &Diplotype::new("*1", "*1"))
            .unwrap_err();
        assert!(matches!(err, CompatibilityError::InvalidAllele { .. }));
    }

    #[test]
    fn parent_display_order_is_preserved() {
        let gene = cyp2c19();
        let a = Diplotype::new("*2", "*1");
        let b = Diplotype::new("*1", "*1");
        let outcome = engine().cross(gene, &a, &b).unwrap();
        assert_eq!(outcome.parent_a, "*2/*1");
        assert_eq!(outcome.parent_b, "*1/*1");
    }
}
