//! Reconstruction configuration
//!
//! Everything tunable about a reconstruction lives in [`ReconstructionConfig`]:
//! the on-shell masses, the ensemble size, numerical tolerances, the scoring
//! refinement and the reduction policy. Configurations are plain serde values
//! and can be stored next to an analysis as JSON.

use crate::error::RecoError;
use crate::RecoResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the number of smearing trials per event
pub const MAX_TRIALS: usize = 1_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// PHYSICS CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// On-shell masses imposed by the constraint system, in GeV
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConstants {
    pub w_mass: f64,
    pub top_mass: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            w_mass: 80.4,
            top_mass: 172.5,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NUMERICAL TOLERANCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Tolerances used by the solver and the reduction
///
/// The solver works in units of the top mass, so `root_imaginary` and
/// `degeneracy` are dimensionless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericalTolerances {
    /// Largest imaginary part for a root to count as real
    pub root_imaginary: f64,
    /// Relative size below which a leading coefficient or determinant is zero
    pub degeneracy: f64,
    /// Largest relative violation of a mass² constraint for an accepted solution
    pub constraint: f64,
    /// Relative window within which two weights are considered tied
    pub weight_tie: f64,
}

impl Default for NumericalTolerances {
    fn default() -> Self {
        Self {
            root_imaginary: 1e-6,
            degeneracy: 1e-10,
            constraint: 1e-3,
            weight_tie: 1e-9,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCORING & REDUCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Likelihood refinement of the solution weights
///
/// Enabled by default: with it off every solution weighs 1.0 and a
/// `MaxWeight` reduction falls back to the tie-breaks alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Multiply the baseline weight by the likelihood terms below
    pub likelihood_enabled: bool,
    /// Slope τ of the top p_T spectrum p_T·exp(-p_T/τ), in GeV
    pub top_pt_scale: f64,
    /// Gaussian width of the missing-transverse-momentum resolution, in GeV
    pub met_resolution: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            likelihood_enabled: true,
            top_pt_scale: 50.0,
            met_resolution: 15.0,
        }
    }
}

/// How the accumulated solutions are turned into one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReductionPolicy {
    /// Solution with the globally maximal weight (deterministic tie-breaks)
    #[default]
    MaxWeight,
    /// Weighted mean of the top and anti-top four-momenta over all solutions
    WeightedAverage,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECONSTRUCTION CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Full configuration of a reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub physics: PhysicsConstants,
    pub tolerances: NumericalTolerances,
    pub scoring: ScoringConfig,
    pub reduction: ReductionPolicy,
    /// Number of resolution-smeared trials per event
    pub n_trials: usize,
    /// Whether to run trials of one event in parallel (rayon)
    pub parallel: bool,
    /// Shift the missing transverse momentum by the smearing of the visible objects
    pub propagate_to_met: bool,
    /// b-tag discriminant working point used when decoding raw records
    pub btag_threshold: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConstants::default(),
            tolerances: NumericalTolerances::default(),
            scoring: ScoringConfig::default(),
            reduction: ReductionPolicy::default(),
            n_trials: 100,
            parallel: true,
            propagate_to_met: true,
            btag_threshold: 0.691,
        }
    }
}

impl ReconstructionConfig {
    /// One trial, no parallelism: the plain analytic solve when paired with
    /// a zero-width sampler
    pub fn single_shot() -> Self {
        Self {
            n_trials: 1,
            parallel: false,
            ..Self::default()
        }
    }

    /// Five times the default ensemble
    pub fn precise() -> Self {
        Self {
            n_trials: 500,
            ..Self::default()
        }
    }

    /// Every solution weighs 1.0; the reduction decides by tie-breaks only
    pub fn kinematic_only(mut self) -> Self {
        self.scoring.likelihood_enabled = false;
        self
    }

    /// Set the number of smearing trials
    pub fn with_trials(mut self, n_trials: usize) -> Self {
        self.n_trials = n_trials;
        self
    }

    /// Set whether trials run on the rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the configuration for values the reconstruction cannot use
    pub fn validate(&self) -> RecoResult<()> {
        if self.n_trials == 0 || self.n_trials > MAX_TRIALS {
            return Err(RecoError::InvalidParameter(format!(
                "n_trials must be in [1, {}], got {}",
                MAX_TRIALS, self.n_trials
            )));
        }
        let PhysicsConstants { w_mass, top_mass } = self.physics;
        if !(w_mass.is_finite() && w_mass > 0.0) {
            return Err(RecoError::InvalidParameter(format!(
                "W mass must be positive, got {}",
                w_mass
            )));
        }
        if !(top_mass.is_finite() && top_mass > w_mass) {
            return Err(RecoError::InvalidParameter(format!(
                "top mass must exceed the W mass, got {} <= {}",
                top_mass, w_mass
            )));
        }
        let t = &self.tolerances;
        for (name, value) in [
            ("root_imaginary", t.root_imaginary),
            ("degeneracy", t.degeneracy),
            ("constraint", t.constraint),
            ("weight_tie", t.weight_tie),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(RecoError::InvalidParameter(format!(
                    "tolerance {} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.scoring.likelihood_enabled
            && !(self.scoring.top_pt_scale > 0.0 && self.scoring.met_resolution > 0.0)
        {
            return Err(RecoError::InvalidParameter(
                "likelihood scales must be positive".to_string(),
            ));
        }
        if !self.btag_threshold.is_finite() {
            return Err(RecoError::InvalidParameter(
                "btag_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> RecoResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RecoError::Io(format!("Failed to read config: {}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RecoError::SerializationError(e.to_string()))?;
        config.validate()?;
        log::info!("Loaded reconstruction config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> RecoResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RecoError::SerializationError(e.to_string()))?;
        std::fs::write(path.as_ref(), json)
            .map_err(|e| RecoError::Io(format!("Failed to write config: {}", e)))?;
        Ok(())
    }
}
