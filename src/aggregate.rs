use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

use crate::cross::PunnettCross;
use crate::input::ParentInput;
use crate::reference::ReferenceTable;
use crate::types::{
    CompatibilityError, CompatibilityReport, CoverageCaveat, CrossOutcome, Diplotype, FailedGene,
    JointOutcome, ParentId, RiskTier, SkippedGene,
};

/// Multi-gene compatibility aggregator.
///
/// Runs the Punnett cross per gene and combines the outcomes into a single
/// report. Genes combine under the assumption of independent assortment:
/// joint probabilities are plain products of per-gene probabilities. Linked
/// loci are not modeled; that simplification is part of this type's
/// contract, not an approximation hidden inside it.
///
/// Each `aggregate` call is stateless and touches only the immutable
/// reference table, so concurrent calls need no coordination.
#[derive(Debug, Clone)]
pub struct CompatibilityAnalyzer {
    probability_floor: f64,
    include_joint: bool,
}

impl CompatibilityAnalyzer {
    pub fn new() -> Self {
        Self {
            probability_floor: 0.0,
            include_joint: false,
        }
    }

    /// Exclude outcome branches at or below this probability from driving
    /// the overall risk tier. Default 0.0: any non-zero branch counts.
    pub fn with_probability_floor(mut self, floor: f64) -> Self {
        self.probability_floor = floor;
        self
    }

    /// Also compute the joint offspring-profile probability table. Off by
    /// default since it is combinatorial in gene count.
    pub fn with_joint_table(mut self, include: bool) -> Self {
        self.include_joint = include;
        self
    }

    /// Evaluate every requested gene present in both parents and build the
    /// couple's report.
    ///
    /// Failures are per-gene and non-fatal: a gene missing from one or both
    /// parents is reported as skipped, a gene with a malformed diplotype
    /// string, unrecognized alleles, or no reference table entry is
    /// reported as failed, and the remaining genes still produce results.
    /// Only a request where no gene could be evaluated at all is an error.
    pub fn aggregate(
        &self,
        table: &ReferenceTable,
        parent_a: &ParentInput,
        parent_b: &ParentInput,
        genes: &BTreeSet<String>,
    ) -> Result<CompatibilityReport, CompatibilityError> {
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        let mut candidates: Vec<(&str, &Diplotype, &Diplotype)> = Vec::new();

        for gene in genes {
            // A malformed diplotype string recorded at parse time fails
            // the gene, same as an unrecognized allele would
            if let Some(err) = parent_a
                .parse_error(gene)
                .or_else(|| parent_b.parse_error(gene))
            {
                debug!(gene = %gene, error = %err, "gene evaluation failed");
                failed.push(FailedGene {
                    gene: gene.clone(),
                    reason: err.to_string(),
                });
                continue;
            }

            match (parent_a.get(gene), parent_b.get(gene)) {
                (Some(a), Some(b)) => candidates.push((gene.as_str(), a, b)),
                (a, b) => {
                    let missing_from = match (a.is_none(), b.is_none()) {
                        (true, true) => ParentId::Both,
                        (true, false) => ParentId::A,
                        _ => ParentId::B,
                    };
                    let err = CompatibilityError::IncompleteParentData {
                        gene: gene.clone(),
                        parent: missing_from,
                    };
                    debug!(error = %err, "gene skipped");
                    skipped.push(SkippedGene {
                        gene: gene.clone(),
                        missing_from,
                    });
                }
            }
        }

        let engine = PunnettCross::new();
        let results: Vec<(String, Result<CrossOutcome, CompatibilityError>)> = candidates
            .par_iter()
            .map(|(gene, a, b)| {
                let result = table.gene(gene).and_then(|profile| engine.cross(profile, a, b));
                (gene.to_string(), result)
            })
            .collect();

        let mut outcomes = Vec::new();
        for (gene, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    debug!(gene = %gene, error = %err, "gene evaluation failed");
                    failed.push(FailedGene {
                        gene,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if outcomes.is_empty() {
            return Err(CompatibilityError::NoUsableGenes);
        }

        let (overall_risk, coverage_caveats) = self.classify_overall(&outcomes);
        let joint_probabilities = self.include_joint.then(|| joint_table(&outcomes));

        Ok(CompatibilityReport {
            outcomes,
            overall_risk,
            skipped_genes: skipped,
            failed_genes: failed,
            coverage_caveats,
            joint_probabilities,
        })
    }

    /// Overall tier is the maximum severity across all entries above the
    /// probability floor. `Unknown` entries never raise the tier; they are
    /// collected as coverage caveats instead.
    fn classify_overall(&self, outcomes: &[CrossOutcome]) -> (RiskTier, Vec<CoverageCaveat>) {
        let mut overall = RiskTier::Unknown;
        let mut caveats = Vec::new();

        for outcome in outcomes {
            for entry in &outcome.entries {
                if entry.risk == RiskTier::Unknown {
                    caveats.push(CoverageCaveat {
                        gene: outcome.gene.clone(),
                        diplotype: entry.diplotype.clone(),
                        probability: entry.probability,
                    });
                    continue;
                }
                if entry.probability <= self.probability_floor {
                    continue;
                }
                if entry.risk.severity() > overall.severity() {
                    overall = entry.risk;
                }
            }
        }

        (overall, caveats)
    }
}

/// Cartesian product over per-gene outcomes; each row's probability is the
/// product of its per-gene probabilities (independent assortment).
fn joint_table(outcomes: &[CrossOutcome]) -> Vec<JointOutcome> {
    let mut rows = vec![JointOutcome {
        diplotypes: Default::default(),
        probability: 1.0,
    }];

    for outcome in outcomes {
        let mut expanded = Vec::with_capacity(rows.len() * outcome.entries.len());
        for row in &rows {
            for entry in &outcome.entries {
                let mut diplotypes = row.diplotypes.clone();
                diplotypes.insert(outcome.gene.clone(), entry.diplotype.clone());
                expanded.push(JointOutcome {
                    diplotypes,
                    probability: row.probability * entry.probability,
                });
            }
        }
        rows = expanded;
    }

    rows.sort_by(|left, right| {
        right
            .probability
            .partial_cmp(&left.probability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.diplotypes.cmp(&right.diplotypes))
    });
    rows
}
