//! # Resolution-Smearing Ensemble
//!
//! Drives the analytic solver over many pseudo-measurements of one event.
//!
//! ```text
//!   Idle ──► Sampling ──► Solving ──► Accumulating ──► Reducing ──► Done
//!              │             │              │               │
//!         N smeared      pairings ×     (solution,      max weight
//!         inputs         solutions       weight,        + tie-breaks
//!         (seeded)       scored          pairing,       or sentinel
//!                                        trial)
//! ```
//!
//! Trials are independent: sampling and solving run on rayon's pool when
//! the configuration asks for it, and results are joined in trial order, so
//! the parallel and sequential paths give bit-identical answers.

use crate::config::{ReconstructionConfig, ReductionPolicy};
use crate::kinematics::{FourMomentum, JetCandidate, KinematicInput, MissingTransverseMomentum};
use crate::resolution::{derive_seed, ObjectKind, ResolutionSampler, SeedSlot};
use crate::scoring::{Candidate, ScoringContext, SolutionScorer};
use crate::solver::{DecaySide, NeutrinoSolution, NeutrinoSolver};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

// ═══════════════════════════════════════════════════════════════════════════════
// PAIRING HYPOTHESES
// ═══════════════════════════════════════════════════════════════════════════════

/// Assignment of the two jets to the two decay sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PairingHypothesis {
    /// Anti-lepton with jet 1 (top), lepton with jet 2 (anti-top)
    Direct,
    /// Anti-lepton with jet 2 (top), lepton with jet 1 (anti-top)
    Swapped,
}

impl PairingHypothesis {
    /// Hypotheses worth solving given the b-tag decisions
    ///
    /// Both are tried when the tags cannot tell the jets apart. With exactly
    /// one tag, the tagged jet is the top-side b and only that pairing runs.
    pub fn enumerate(jet1_btag: bool, jet2_btag: bool) -> &'static [PairingHypothesis] {
        match (jet1_btag, jet2_btag) {
            (true, false) => &[PairingHypothesis::Direct],
            (false, true) => &[PairingHypothesis::Swapped],
            _ => &[PairingHypothesis::Direct, PairingHypothesis::Swapped],
        }
    }

    /// Indices of the (top-side, anti-top-side) jets
    pub fn jet_indices(&self) -> (usize, usize) {
        match self {
            PairingHypothesis::Direct => (0, 1),
            PairingHypothesis::Swapped => (1, 0),
        }
    }

    /// Build the two decay sides from the (possibly smeared) objects
    pub fn sides(
        &self,
        lepton: FourMomentum,
        anti_lepton: FourMomentum,
        jets: [FourMomentum; 2],
    ) -> (DecaySide, DecaySide) {
        let (t, tbar) = self.jet_indices();
        (
            DecaySide::new(anti_lepton, jets[t]),
            DecaySide::new(lepton, jets[tbar]),
        )
    }

    /// How well the b-tags support this pairing (higher is better)
    ///
    /// A tagged jet on the top side counts twice, on the anti-top side once.
    pub fn btag_compatibility(&self, jets: &[JetCandidate; 2]) -> u8 {
        let (t, tbar) = self.jet_indices();
        2 * jets[t].btagged as u8 + jets[tbar].btagged as u8
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE & ACCUMULATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Phases of one ensemble run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnsemblePhase {
    Idle,
    Sampling,
    Solving,
    Accumulating,
    Reducing,
    Done,
}

impl EnsemblePhase {
    /// The only phase reachable from this one
    pub fn next(&self) -> Option<EnsemblePhase> {
        match self {
            EnsemblePhase::Idle => Some(EnsemblePhase::Sampling),
            EnsemblePhase::Sampling => Some(EnsemblePhase::Solving),
            EnsemblePhase::Solving => Some(EnsemblePhase::Accumulating),
            EnsemblePhase::Accumulating => Some(EnsemblePhase::Reducing),
            EnsemblePhase::Reducing => Some(EnsemblePhase::Done),
            EnsemblePhase::Done => None,
        }
    }
}

/// A scored solution with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedSolution {
    pub solution: NeutrinoSolution,
    pub top: FourMomentum,
    pub anti_top: FourMomentum,
    pub weight: f64,
    pub pairing: PairingHypothesis,
    pub trial: usize,
    pub btag_compatibility: u8,
}

impl WeightedSolution {
    /// Invariant mass of the tt̄ system
    pub fn ttbar_mass(&self) -> f64 {
        (self.top + self.anti_top).mass()
    }
}

/// Bookkeeping of one ensemble run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub trials_run: usize,
    pub trials_with_solution: usize,
    pub solutions_accepted: usize,
    /// Solves abandoned as numerically degenerate (per trial and pairing)
    pub degenerate_solves: usize,
    pub phase: EnsemblePhase,
}

/// One smeared pseudo-measurement
#[derive(Debug, Clone, Copy)]
struct SmearedEvent {
    trial: usize,
    lepton: FourMomentum,
    anti_lepton: FourMomentum,
    jets: [FourMomentum; 2],
    met: MissingTransverseMomentum,
}

#[derive(Debug, Default)]
struct TrialOutcome {
    solutions: Vec<WeightedSolution>,
    degenerate: usize,
}

/// Owned exclusively by one run; the only mutable state of a reconstruction
struct Accumulator {
    phase: EnsemblePhase,
    solutions: Vec<WeightedSolution>,
    report: EnsembleReport,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            phase: EnsemblePhase::Idle,
            solutions: Vec::new(),
            report: EnsembleReport {
                trials_run: 0,
                trials_with_solution: 0,
                solutions_accepted: 0,
                degenerate_solves: 0,
                phase: EnsemblePhase::Idle,
            },
        }
    }

    fn advance(&mut self, to: EnsemblePhase) {
        debug_assert_eq!(self.phase.next(), Some(to), "illegal ensemble transition");
        log::trace!("ensemble {:?} -> {:?}", self.phase, to);
        self.phase = to;
        self.report.phase = to;
    }

    fn absorb(&mut self, outcome: TrialOutcome) {
        self.report.trials_run += 1;
        self.report.degenerate_solves += outcome.degenerate;
        if !outcome.solutions.is_empty() {
            self.report.trials_with_solution += 1;
        }
        self.report.solutions_accepted += outcome.solutions.len();
        self.solutions.extend(outcome.solutions);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// The selected (top, anti-top) pair and where it came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopPair {
    pub top: FourMomentum,
    pub anti_top: FourMomentum,
    pub neutrino: FourMomentum,
    pub anti_neutrino: FourMomentum,
    pub pairing: PairingHypothesis,
    pub trial: usize,
    pub weight: f64,
}

/// Final answer of a reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReconstructedEvent {
    Reconstructed(TopPair),
    /// No real solution anywhere in the ensemble
    NoSolution,
}

impl ReconstructedEvent {
    pub fn is_reconstructed(&self) -> bool {
        matches!(self, ReconstructedEvent::Reconstructed(_))
    }

    pub fn top_pair(&self) -> Option<&TopPair> {
        match self {
            ReconstructedEvent::Reconstructed(pair) => Some(pair),
            ReconstructedEvent::NoSolution => None,
        }
    }

    /// (top, anti-top), or the failure sentinel twice
    pub fn four_momenta(&self) -> [FourMomentum; 2] {
        match self {
            ReconstructedEvent::Reconstructed(pair) => [pair.top, pair.anti_top],
            ReconstructedEvent::NoSolution => {
                [FourMomentum::failure_sentinel(), FourMomentum::failure_sentinel()]
            }
        }
    }
}

/// Result and bookkeeping of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleOutcome {
    pub event: ReconstructedEvent,
    pub report: EnsembleReport,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENSEMBLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Smearing ensemble around the analytic solver
#[derive(Debug, Clone)]
pub struct ReconstructionEnsemble {
    config: ReconstructionConfig,
    solver: NeutrinoSolver,
    scorer: SolutionScorer,
}

impl ReconstructionEnsemble {
    /// Ensemble with the scorer described by the configuration
    pub fn new(config: ReconstructionConfig) -> Self {
        let scorer = SolutionScorer::from_config(&config.scoring);
        Self::with_scorer(config, scorer)
    }

    pub fn with_scorer(config: ReconstructionConfig, scorer: SolutionScorer) -> Self {
        let solver = NeutrinoSolver::from_config(&config);
        Self {
            config,
            solver,
            scorer,
        }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    pub fn scorer(&self) -> &SolutionScorer {
        &self.scorer
    }

    /// Run all trials and reduce
    pub fn run(
        &self,
        event_id: u64,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
    ) -> EnsembleOutcome {
        let mut acc = Accumulator::new();
        let outcomes = self.execute(event_id, input, sampler, None, &mut acc);
        self.finish(acc, outcomes)
    }

    /// Run all trials unless `cancel` is raised
    ///
    /// A cancelled run returns `None` and drops everything accumulated.
    pub fn run_cancellable(
        &self,
        event_id: u64,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
        cancel: &AtomicBool,
    ) -> Option<EnsembleOutcome> {
        let mut acc = Accumulator::new();
        let outcomes = self.execute(event_id, input, sampler, Some(cancel), &mut acc);
        if cancel.load(Ordering::Relaxed) {
            log::debug!("event {}: reconstruction cancelled", event_id);
            return None;
        }
        Some(self.finish(acc, outcomes))
    }

    /// Sampling and solving stages
    fn execute(
        &self,
        event_id: u64,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
        cancel: Option<&AtomicBool>,
        acc: &mut Accumulator,
    ) -> Vec<TrialOutcome> {
        let n = self.config.n_trials;
        let cancelled = || cancel.map_or(false, |c| c.load(Ordering::Relaxed));
        let pairings =
            PairingHypothesis::enumerate(input.jets[0].btagged, input.jets[1].btagged);

        acc.advance(EnsemblePhase::Sampling);
        let smeared: Vec<Option<SmearedEvent>> = if self.config.parallel {
            (0..n)
                .into_par_iter()
                .map(|trial| (!cancelled()).then(|| self.smear(event_id, trial, input, sampler)))
                .collect()
        } else {
            (0..n)
                .map(|trial| (!cancelled()).then(|| self.smear(event_id, trial, input, sampler)))
                .collect()
        };

        acc.advance(EnsemblePhase::Solving);
        let solve = |event: &Option<SmearedEvent>| match event {
            Some(event) if !cancelled() => self.solve_trial(input, event, pairings),
            _ => TrialOutcome::default(),
        };
        if self.config.parallel {
            smeared.par_iter().map(solve).collect()
        } else {
            smeared.iter().map(solve).collect()
        }
    }

    fn finish(&self, mut acc: Accumulator, outcomes: Vec<TrialOutcome>) -> EnsembleOutcome {
        acc.advance(EnsemblePhase::Accumulating);
        for outcome in outcomes {
            acc.absorb(outcome);
        }

        acc.advance(EnsemblePhase::Reducing);
        let event = self.reduce(&acc.solutions);

        acc.advance(EnsemblePhase::Done);
        log::debug!(
            "ensemble done: {} solutions from {}/{} trials ({} degenerate solves)",
            acc.report.solutions_accepted,
            acc.report.trials_with_solution,
            acc.report.trials_run,
            acc.report.degenerate_solves
        );
        EnsembleOutcome {
            event,
            report: acc.report,
        }
    }

    /// Draw the smeared objects of one trial
    fn smear(
        &self,
        event_id: u64,
        trial: usize,
        input: &KinematicInput,
        sampler: &dyn ResolutionSampler,
    ) -> SmearedEvent {
        let draw = |kind, p: &FourMomentum, slot| sampler.sample(kind, p, derive_seed(event_id, trial, slot));

        let lepton = draw(ObjectKind::Lepton, &input.lepton.momentum, SeedSlot::Lepton);
        let anti_lepton = draw(ObjectKind::Lepton, &input.anti_lepton.momentum, SeedSlot::AntiLepton);
        let jets = [
            draw(ObjectKind::Jet, &input.jets[0].momentum, SeedSlot::Jet1),
            draw(ObjectKind::Jet, &input.jets[1].momentum, SeedSlot::Jet2),
        ];

        let mut met = input.met;
        if self.config.propagate_to_met {
            // Visible momentum gained by smearing is missing momentum lost
            let shift = (lepton - input.lepton.momentum)
                + (anti_lepton - input.anti_lepton.momentum)
                + (jets[0] - input.jets[0].momentum)
                + (jets[1] - input.jets[1].momentum);
            met.ex -= shift.px;
            met.ey -= shift.py;
        }
        let met = MissingTransverseMomentum::from_four_momentum(&draw(
            ObjectKind::MissingEt,
            &met.as_four_momentum(),
            SeedSlot::MissingEt,
        ));

        SmearedEvent {
            trial,
            lepton,
            anti_lepton,
            jets,
            met,
        }
    }

    /// Solve and score every pairing of one smeared event
    fn solve_trial(
        &self,
        input: &KinematicInput,
        event: &SmearedEvent,
        pairings: &[PairingHypothesis],
    ) -> TrialOutcome {
        let context = ScoringContext {
            measured_met: input.met,
            trial_met: event.met,
        };
        let mut outcome = TrialOutcome::default();

        for &pairing in pairings {
            let (top_side, anti_top_side) = pairing.sides(event.lepton, event.anti_lepton, event.jets);
            let solutions = match self.solver.try_solve(&top_side, &anti_top_side, &event.met) {
                Ok(solutions) => solutions,
                Err(degeneracy) => {
                    log::trace!("trial {} {:?}: {}", event.trial, pairing, degeneracy);
                    outcome.degenerate += 1;
                    continue;
                }
            };
            for solution in solutions {
                let candidate = Candidate {
                    solution,
                    top: top_side.top(&solution.neutrino),
                    anti_top: anti_top_side.top(&solution.anti_neutrino),
                };
                let weight = self.scorer.score(&candidate, &context);
                if !(weight.is_finite() && weight > 0.0) {
                    continue;
                }
                outcome.solutions.push(WeightedSolution {
                    solution,
                    top: candidate.top,
                    anti_top: candidate.anti_top,
                    weight,
                    pairing,
                    trial: event.trial,
                    btag_compatibility: pairing.btag_compatibility(&input.jets),
                });
            }
        }
        outcome
    }

    /// Reduce the accumulated solutions to one answer
    pub fn reduce(&self, solutions: &[WeightedSolution]) -> ReconstructedEvent {
        let Some(best) = select_max_weight(solutions, self.config.tolerances.weight_tie) else {
            return ReconstructedEvent::NoSolution;
        };
        let pair = match self.config.reduction {
            ReductionPolicy::MaxWeight => TopPair {
                top: best.top,
                anti_top: best.anti_top,
                neutrino: best.solution.neutrino,
                anti_neutrino: best.solution.anti_neutrino,
                pairing: best.pairing,
                trial: best.trial,
                weight: best.weight,
            },
            ReductionPolicy::WeightedAverage => weighted_average(solutions, best),
        };
        ReconstructedEvent::Reconstructed(pair)
    }
}

/// Maximum weight; ties broken by b-tag compatibility, trial, m(tt̄),
/// pairing and root order
pub fn select_max_weight(solutions: &[WeightedSolution], tie_tolerance: f64) -> Option<&WeightedSolution> {
    let max = solutions.iter().map(|s| s.weight).fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let floor = max * (1.0 - tie_tolerance);
    solutions
        .iter()
        .filter(|s| s.weight >= floor)
        .min_by(|a, b| {
            b.btag_compatibility
                .cmp(&a.btag_compatibility)
                .then(a.trial.cmp(&b.trial))
                .then(a.ttbar_mass().total_cmp(&b.ttbar_mass()))
                .then(a.pairing.cmp(&b.pairing))
                .then(a.solution.root_index.cmp(&b.solution.root_index))
        })
}

fn weighted_average(solutions: &[WeightedSolution], best: &WeightedSolution) -> TopPair {
    let total: f64 = solutions.iter().map(|s| s.weight).sum();
    let mut pair = TopPair {
        top: FourMomentum::default(),
        anti_top: FourMomentum::default(),
        neutrino: FourMomentum::default(),
        anti_neutrino: FourMomentum::default(),
        pairing: best.pairing,
        trial: best.trial,
        weight: total,
    };
    for s in solutions {
        let w = s.weight / total;
        pair.top += s.top.scaled(w);
        pair.anti_top += s.anti_top.scaled(w);
        pair.neutrino += s.solution.neutrino.scaled(w);
        pair.anti_neutrino += s.solution.anti_neutrino.scaled(w);
    }
    pair
}
