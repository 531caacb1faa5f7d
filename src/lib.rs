//! # topreco
//!
//! Analytic reconstruction of dileptonic top-quark pairs.
//!
//! Given two charged leptons, the two leading jets with their b-tags and the
//! missing transverse momentum, the two undetected neutrinos are solved for
//! in closed form (Sonnenschein's quartic), over an ensemble of
//! resolution-smeared pseudo-measurements and over the possible lepton/jet
//! pairings. The best-scoring solution gives the top and anti-top
//! four-momenta; events without any real solution yield a failure sentinel.
//!
//! ## Features
//! - Closed-form quartic with Newton polishing and degeneracy guards
//! - Histogram-driven resolution smearing with reproducible per-trial seeds
//! - Pluggable likelihood scoring
//! - Trial- and event-level parallelism via rayon
//!
//! ## Architecture
//!
//! ```text
//!   EventRecord ──► KinematicInput ──► ReconstructionEnsemble ──► ReconstructedEvent
//!                    (validation)         │
//!                                         ├─► ResolutionSampler   (smear, seeded)
//!                                         ├─► NeutrinoSolver      (quartic, ≤ 4 roots)
//!                                         └─► SolutionScorer      (weights)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use topreco::{reconstruct, FourMomentum, ZeroWidthSampler};
//!
//! let lep = FourMomentum::from_pt_eta_phi_m(50.0, 0.1, 0.3, 0.0);
//! let lepbar = FourMomentum::from_pt_eta_phi_m(40.0, -0.2, 2.9, 0.0);
//! let jet1 = FourMomentum::from_pt_eta_phi_e(80.0, 0.5, -1.0, 120.0);
//! let jet2 = FourMomentum::from_pt_eta_phi_e(60.0, -0.4, 1.5, 90.0);
//!
//! let event = reconstruct(
//!     lep, lepbar, -11, 11, jet1, jet2, true, true, 20.0, -15.0, &ZeroWidthSampler,
//! )
//! .unwrap();
//! let [top, anti_top] = event.four_momenta();
//! assert!(top.is_finite() && anti_top.is_finite());
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod kinematics;
pub mod resolution;
pub mod solver;

// Reconstruction pipeline
pub mod ensemble;
pub mod facade;
pub mod scoring;

#[cfg(test)]
mod tests;

pub use config::{
    NumericalTolerances, PhysicsConstants, ReconstructionConfig, ReductionPolicy, ScoringConfig,
};
pub use ensemble::{
    EnsembleOutcome, EnsemblePhase, EnsembleReport, PairingHypothesis, ReconstructedEvent,
    ReconstructionEnsemble, TopPair, WeightedSolution,
};
pub use error::{MalformedInputError, RecoError};
pub use facade::{reconstruct, ReconstructionSummary, TopReconstructor};
pub use kinematics::{
    EventRecord, FourMomentum, JetCandidate, KinematicInput, LeptonCandidate, LeptonRole,
    MissingTransverseMomentum, SENTINEL_MARKER,
};
pub use resolution::{
    HistogramResolutionModel, ObjectKind, ObjectResolution, ResolutionBin, ResolutionSampler,
    ResponseHistogram, ZeroWidthSampler,
};
pub use scoring::{LikelihoodTerm, MetResolution, SolutionScorer, TopPtSpectrum};
pub use solver::{DecaySide, NeutrinoSolution, NeutrinoSolver, NumericalDegeneracy};

/// Result type for reconstruction operations
pub type RecoResult<T> = Result<T, RecoError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        reconstruct, EventRecord, FourMomentum, HistogramResolutionModel, KinematicInput,
        MissingTransverseMomentum, ReconstructedEvent, ReconstructionConfig, RecoError,
        RecoResult, ResolutionSampler, TopReconstructor, ZeroWidthSampler,
    };
}
