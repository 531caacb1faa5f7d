//! Solution scoring
//!
//! Every accepted neutrino solution satisfies the mass constraints exactly,
//! so the purely kinematic weight is 1.0. The likelihood refinement, on by
//! default, multiplies in likelihood terms; each term is a deterministic, non-negative function
//! of the candidate and the trial context.

use crate::config::ScoringConfig;
use crate::kinematics::{FourMomentum, MissingTransverseMomentum};
use crate::solver::NeutrinoSolution;
use std::fmt;
use std::sync::Arc;

/// A candidate reconstruction as seen by the scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub solution: NeutrinoSolution,
    pub top: FourMomentum,
    pub anti_top: FourMomentum,
}

/// What the scorer knows about the trial a candidate came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Missing transverse momentum as measured
    pub measured_met: MissingTransverseMomentum,
    /// Smeared missing transverse momentum the trial was solved with
    pub trial_met: MissingTransverseMomentum,
}

/// Pluggable multiplicative likelihood factor
pub trait LikelihoodTerm: Send + Sync {
    fn name(&self) -> &str;

    /// Factor for one candidate; must be deterministic and ≥ 0
    fn factor(&self, candidate: &Candidate, context: &ScoringContext) -> f64;
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILT-IN TERMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Falling top transverse-momentum spectrum p(p_T) ∝ p_T·exp(-p_T/τ)
///
/// Normalised to 1 at the peak p_T = τ; applied to top and anti-top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopPtSpectrum {
    pub scale: f64,
}

impl TopPtSpectrum {
    fn shape(&self, pt: f64) -> f64 {
        let x = pt / self.scale;
        x * (1.0 - x).exp()
    }
}

impl LikelihoodTerm for TopPtSpectrum {
    fn name(&self) -> &str {
        "top_pt_spectrum"
    }

    fn factor(&self, candidate: &Candidate, _context: &ScoringContext) -> f64 {
        self.shape(candidate.top.pt()) * self.shape(candidate.anti_top.pt())
    }
}

/// Gaussian resolution of the missing transverse momentum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetResolution {
    pub sigma: f64,
}

impl LikelihoodTerm for MetResolution {
    fn name(&self) -> &str {
        "met_resolution"
    }

    fn factor(&self, _candidate: &Candidate, context: &ScoringContext) -> f64 {
        let dx = context.trial_met.ex - context.measured_met.ex;
        let dy = context.trial_met.ey - context.measured_met.ey;
        (-(dx * dx + dy * dy) / (2.0 * self.sigma * self.sigma)).exp()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCORER
// ═══════════════════════════════════════════════════════════════════════════════

/// Baseline weight times the product of the enabled likelihood terms
#[derive(Clone)]
pub struct SolutionScorer {
    baseline: f64,
    terms: Vec<Arc<dyn LikelihoodTerm>>,
}

impl Default for SolutionScorer {
    fn default() -> Self {
        Self::kinematic()
    }
}

impl fmt::Debug for SolutionScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolutionScorer")
            .field("baseline", &self.baseline)
            .field("terms", &self.term_names())
            .finish()
    }
}

impl SolutionScorer {
    /// Purely kinematic scoring: every solution weighs 1.0
    pub fn kinematic() -> Self {
        Self {
            baseline: 1.0,
            terms: Vec::new(),
        }
    }

    /// Scorer described by a [`ScoringConfig`]
    pub fn from_config(config: &ScoringConfig) -> Self {
        let scorer = Self::kinematic();
        if !config.likelihood_enabled {
            return scorer;
        }
        scorer
            .with_term(TopPtSpectrum {
                scale: config.top_pt_scale,
            })
            .with_term(MetResolution {
                sigma: config.met_resolution,
            })
    }

    /// Add a likelihood term
    pub fn with_term(mut self, term: impl LikelihoodTerm + 'static) -> Self {
        self.terms.push(Arc::new(term));
        self
    }

    pub fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.name()).collect()
    }

    /// Weight of one candidate; misbehaving terms count as zero
    pub fn score(&self, candidate: &Candidate, context: &ScoringContext) -> f64 {
        let mut weight = self.baseline;
        for term in &self.terms {
            let factor = term.factor(candidate, context);
            if !factor.is_finite() || factor < 0.0 {
                log::debug!("likelihood term {} returned {}", term.name(), factor);
                return 0.0;
            }
            weight *= factor;
        }
        weight
    }
}
