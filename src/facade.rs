//! Public reconstruction entry points
//!
//! [`reconstruct`] is the one-call contract: explicit four-vectors in,
//! (top, anti-top) out. [`TopReconstructor`] keeps a validated
//! configuration and scorer around for event loops and batches.

use crate::config::ReconstructionConfig;
use crate::ensemble::{EnsembleOutcome, ReconstructedEvent, ReconstructionEnsemble};
use crate::kinematics::{EventRecord, FourMomentum, KinematicInput, MissingTransverseMomentum};
use crate::resolution::ResolutionSampler;
use crate::scoring::SolutionScorer;
use crate::RecoResult;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// Reconstruct one event with the default configuration
///
/// Fails only on malformed input; an event without any real solution
/// yields [`ReconstructedEvent::NoSolution`].
#[allow(clippy::too_many_arguments)]
pub fn reconstruct(
    lepton: FourMomentum,
    anti_lepton: FourMomentum,
    lepton_id: i32,
    anti_lepton_id: i32,
    jet1: FourMomentum,
    jet2: FourMomentum,
    jet1_btag: bool,
    jet2_btag: bool,
    missing_ex: f64,
    missing_ey: f64,
    resolution: &dyn ResolutionSampler,
) -> RecoResult<ReconstructedEvent> {
    let input = KinematicInput::new(
        lepton,
        anti_lepton,
        lepton_id,
        anti_lepton_id,
        jet1,
        jet2,
        jet1_btag,
        jet2_btag,
        MissingTransverseMomentum::new(missing_ex, missing_ey),
    )?;
    let reconstructor = TopReconstructor::new(ReconstructionConfig::default())?;
    Ok(reconstructor.reconstruct_input(0, &input, resolution))
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH SUMMARY
// ═══════════════════════════════════════════════════════════════════════════════

/// Reconstruction efficiency over a set of events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionSummary {
    pub events: usize,
    pub reconstructed: usize,
    /// Valid events without any real solution (sentinel output)
    pub failed: usize,
    /// Events rejected before reconstruction
    pub malformed: usize,
}

impl ReconstructionSummary {
    pub fn record(&mut self, result: &RecoResult<ReconstructedEvent>) {
        self.events += 1;
        match result {
            Ok(event) if event.is_reconstructed() => self.reconstructed += 1,
            Ok(_) => self.failed += 1,
            Err(_) => self.malformed += 1,
        }
    }

    /// Fraction of valid events with a reconstruction
    pub fn efficiency(&self) -> f64 {
        let valid = self.reconstructed + self.failed;
        if valid == 0 {
            0.0
        } else {
            self.reconstructed as f64 / valid as f64
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECONSTRUCTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated configuration plus scorer, reusable across events
#[derive(Debug, Clone)]
pub struct TopReconstructor {
    ensemble: ReconstructionEnsemble,
}

impl TopReconstructor {
    pub fn new(config: ReconstructionConfig) -> RecoResult<Self> {
        config.validate()?;
        Ok(Self {
            ensemble: ReconstructionEnsemble::new(config),
        })
    }

    /// Replace the scorer built from the configuration
    pub fn with_scorer(config: ReconstructionConfig, scorer: SolutionScorer) -> RecoResult<Self> {
        config.validate()?;
        Ok(Self {
            ensemble: ReconstructionEnsemble::with_scorer(config, scorer),
        })
    }

    pub fn config(&self) -> &ReconstructionConfig {
        self.ensemble.config()
    }

    /// Reconstruct a validated event
    pub fn reconstruct_input(
        &self,
        event_id: u64,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
    ) -> ReconstructedEvent {
        self.reconstruct_detailed(event_id, input, sampler).event
    }

    /// Reconstruct and keep the ensemble's bookkeeping
    pub fn reconstruct_detailed(
        &self,
        event_id: u64,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
    ) -> EnsembleOutcome {
        self.ensemble.run(event_id, input, sampler)
    }

    /// Reconstruct unless `cancel` is raised before the trials finish
    pub fn reconstruct_cancellable(
        &self,
        event_id: u64,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
        cancel: &AtomicBool,
    ) -> Option<ReconstructedEvent> {
        self.ensemble
            .run_cancellable(event_id, input, sampler, cancel)
            .map(|outcome| outcome.event)
    }

    /// Decode, validate and reconstruct a raw event record
    pub fn reconstruct_record(
        &self,
        record: &EventRecord,
        sampler: &dyn ResolutionSampler,
    ) -> RecoResult<ReconstructedEvent> {
        let input = record.to_input(self.config().btag_threshold)?;
        Ok(self.reconstruct_input(record.event_number, &input, sampler))
    }

    /// Reconstruct many events in parallel; results keep the input order
    pub fn reconstruct_batch(
        &self,
        records: &[EventRecord],
        sampler: &dyn ResolutionSampler,
    ) -> (Vec<RecoResult<ReconstructedEvent>>, ReconstructionSummary) {
        let results: Vec<_> = records
            .par_iter()
            .map(|record| self.reconstruct_record(record, sampler))
            .collect();

        let mut summary = ReconstructionSummary::default();
        for result in &results {
            summary.record(result);
        }
        log::info!(
            "Reconstructed {}/{} events ({} without solution, {} malformed)",
            summary.reconstructed,
            summary.events,
            summary.failed,
            summary.malformed
        );
        (results, summary)
    }
}
