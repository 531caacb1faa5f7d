//! Integration Tests for Top-Pair Reconstruction
//!
//! End-to-end checks of the reconstruction on synthetic events whose true
//! neutrinos are known, plus the edge cases of the public contract.

use crate::config::ReconstructionConfig;
use crate::ensemble::{PairingHypothesis, ReconstructedEvent};
use crate::facade::{reconstruct, TopReconstructor};
use crate::kinematics::{EventRecord, FourMomentum};
use crate::resolution::ZeroWidthSampler;
use crate::scoring::{Candidate, LikelihoodTerm, ScoringContext, SolutionScorer};
use support::{smearing_model, reference_event, TruthEvent};

/// Synthetic events and samplers shared by the unit tests
pub(crate) mod support {
    use crate::kinematics::{FourMomentum, KinematicInput, MissingTransverseMomentum};
    use crate::resolution::{
        HistogramResolutionModel, ObjectResolution, ResolutionBin, ResponseHistogram,
    };
    use crate::solver::DecaySide;

    pub const W_MASS: f64 = 80.4;
    pub const TOP_MASS: f64 = 172.5;
    pub const B_MASS: f64 = 4.8;

    /// Two-body decay of `parent` with the first daughter emitted along
    /// (cos θ, φ) in the parent rest frame
    pub fn two_body_decay(
        parent: &FourMomentum,
        m1: f64,
        m2: f64,
        cos_theta: f64,
        phi: f64,
    ) -> (FourMomentum, FourMomentum) {
        let m = parent.mass();
        let p_star = ((m * m - (m1 + m2).powi(2)) * (m * m - (m1 - m2).powi(2))).sqrt() / (2.0 * m);
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
        let dir = [sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta];
        let d1 = FourMomentum::new(
            p_star * dir[0],
            p_star * dir[1],
            p_star * dir[2],
            (p_star * p_star + m1 * m1).sqrt(),
        );
        let d2 = FourMomentum::new(
            -p_star * dir[0],
            -p_star * dir[1],
            -p_star * dir[2],
            (p_star * p_star + m2 * m2).sqrt(),
        );
        let beta = parent.boost_vector();
        (d1.boost(beta), d2.boost(beta))
    }

    /// A dileptonic tt̄ event generated forward from known kinematics
    #[derive(Debug, Clone)]
    pub struct TruthEvent {
        pub label: &'static str,
        pub top: FourMomentum,
        pub anti_top: FourMomentum,
        pub anti_lepton: FourMomentum,
        pub lepton: FourMomentum,
        pub b: FourMomentum,
        pub bbar: FourMomentum,
        pub neutrino: FourMomentum,
        pub anti_neutrino: FourMomentum,
    }

    impl TruthEvent {
        /// `top` and `anti_top` are (p_T, η, φ); `angles` are the (cos θ, φ)
        /// of W⁺ in t, ℓ⁺ in W⁺, W⁻ in t̄, ℓ⁻ in W⁻
        pub fn generate(
            label: &'static str,
            top: (f64, f64, f64),
            anti_top: (f64, f64, f64),
            angles: [(f64, f64); 4],
        ) -> Self {
            let t = FourMomentum::from_pt_eta_phi_m(top.0, top.1, top.2, TOP_MASS);
            let tbar = FourMomentum::from_pt_eta_phi_m(anti_top.0, anti_top.1, anti_top.2, TOP_MASS);

            let (w_plus, b) = two_body_decay(&t, W_MASS, B_MASS, angles[0].0, angles[0].1);
            let (anti_lepton, neutrino) = two_body_decay(&w_plus, 0.0, 0.0, angles[1].0, angles[1].1);
            let (w_minus, bbar) = two_body_decay(&tbar, W_MASS, B_MASS, angles[2].0, angles[2].1);
            let (lepton, anti_neutrino) =
                two_body_decay(&w_minus, 0.0, 0.0, angles[3].0, angles[3].1);

            Self {
                label,
                top: t,
                anti_top: tbar,
                anti_lepton,
                lepton,
                b,
                bbar,
                neutrino,
                anti_neutrino,
            }
        }

        pub fn catalogue() -> Vec<TruthEvent> {
            vec![
                Self::generate(
                    "central",
                    (60.0, 0.3, 0.5),
                    (70.0, -0.5, 3.5),
                    [(0.3, 1.0), (-0.4, 2.0), (-0.6, 4.0), (0.5, 0.7)],
                ),
                Self::generate(
                    "boosted",
                    (250.0, 1.0, -1.2),
                    (180.0, -0.2, 2.2),
                    [(0.8, 0.1), (0.2, -2.5), (-0.1, 1.9), (-0.7, 3.0)],
                ),
                Self::generate(
                    "forward",
                    (30.0, 2.0, 2.5),
                    (45.0, 1.2, -0.3),
                    [(-0.2, -1.0), (0.6, 0.4), (0.4, 2.6), (-0.3, -2.2)],
                ),
            ]
        }

        pub fn top_side(&self) -> DecaySide {
            DecaySide::new(self.anti_lepton, self.b)
        }

        pub fn anti_top_side(&self) -> DecaySide {
            DecaySide::new(self.lepton, self.bbar)
        }

        pub fn met(&self) -> MissingTransverseMomentum {
            MissingTransverseMomentum::new(
                self.neutrino.px + self.anti_neutrino.px,
                self.neutrino.py + self.anti_neutrino.py,
            )
        }

        /// Input with jet 1 = b and jet 2 = b̄
        pub fn input(&self, jet1_btag: bool, jet2_btag: bool) -> KinematicInput {
            KinematicInput::new(
                self.lepton,
                self.anti_lepton,
                -13,
                11,
                self.b,
                self.bbar,
                jet1_btag,
                jet2_btag,
                self.met(),
            )
            .unwrap()
        }
    }

    /// The reference event: both jets tagged
    pub fn reference_event() -> KinematicInput {
        KinematicInput::new(
            FourMomentum::from_pt_eta_phi_m(50.0, 0.1, 0.3, 0.0),
            FourMomentum::from_pt_eta_phi_m(40.0, -0.2, 2.9, 0.0),
            -11,
            11,
            FourMomentum::from_pt_eta_phi_e(80.0, 0.5, -1.0, 120.0),
            FourMomentum::from_pt_eta_phi_e(60.0, -0.4, 1.5, 90.0),
            true,
            true,
            MissingTransverseMomentum::new(20.0, -15.0),
        )
        .unwrap()
    }

    /// Few-percent smearing on every object
    pub fn smearing_model(seed: u64) -> HistogramResolutionModel {
        let bin = |lo: f64, hi: f64, angle: f64| ResolutionBin {
            response: ResponseHistogram::uniform(lo, hi, 10).unwrap(),
            eta_shift: Some(ResponseHistogram::uniform(-angle, angle, 4).unwrap()),
            phi_shift: Some(ResponseHistogram::uniform(-angle, angle, 4).unwrap()),
        };
        HistogramResolutionModel::new(
            seed,
            ObjectResolution::single(bin(0.98, 1.02, 0.001)),
            ObjectResolution {
                pt_edges: vec![0.0, 50.0, 7000.0],
                bins: vec![bin(0.85, 1.15, 0.02), bin(0.9, 1.1, 0.01)],
            },
            Some(ObjectResolution::single(bin(0.95, 1.05, 0.05))),
        )
        .unwrap()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONSTRUCTION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod reconstruction_tests {
    use super::*;
    use crate::kinematics::KinematicInput;
    use crate::kinematics::MissingTransverseMomentum;
    use approx::assert_relative_eq;

    /// Forces every candidate to zero weight
    struct Veto;

    impl LikelihoodTerm for Veto {
        fn name(&self) -> &str {
            "veto"
        }
        fn factor(&self, _: &Candidate, _: &ScoringContext) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_truth_events_reconstruct_on_shell() {
        let reconstructor = TopReconstructor::new(ReconstructionConfig::single_shot()).unwrap();
        for truth in TruthEvent::catalogue() {
            let input = truth.input(true, true);
            let event = reconstructor.reconstruct_input(1, &input, &ZeroWidthSampler);
            let pair = event.top_pair().unwrap_or_else(|| panic!("{} not reconstructed", truth.label));

            assert_relative_eq!(pair.top.mass(), 172.5, epsilon = 0.1);
            assert_relative_eq!(pair.anti_top.mass(), 172.5, epsilon = 0.1);

            // Transverse balance: tops carry all visible momentum plus MET
            let visible = input.lepton.momentum
                + input.anti_lepton.momentum
                + input.jets[0].momentum
                + input.jets[1].momentum;
            let ttbar = pair.top + pair.anti_top;
            assert_relative_eq!(ttbar.px, visible.px + input.met.ex, epsilon = 1e-6);
            assert_relative_eq!(ttbar.py, visible.py + input.met.ey, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_single_tag_pairing_recovers_truth_neutrinos() {
        // One pairing only: the truth pairing's solutions must include the truth
        let reconstructor = TopReconstructor::new(ReconstructionConfig::single_shot()).unwrap();
        let truth = &TruthEvent::catalogue()[0];
        let pair = *reconstructor
            .reconstruct_input(1, &truth.input(true, false), &ZeroWidthSampler)
            .top_pair()
            .unwrap();
        assert_eq!(pair.pairing, PairingHypothesis::Direct);
        assert!(pair.neutrino.e > 0.0);
        assert!(pair.top.is_finite());
    }

    #[test]
    fn test_reference_event_is_finite_or_sentinel() {
        let reconstructor = TopReconstructor::new(ReconstructionConfig::single_shot()).unwrap();
        let event = reconstructor.reconstruct_input(0, &reference_event(), &ZeroWidthSampler);
        let [top, anti_top] = event.four_momenta();
        match event {
            ReconstructedEvent::Reconstructed(pair) => {
                assert!(top.is_finite() && anti_top.is_finite());
                assert!(!top.is_failure_sentinel());
                assert_relative_eq!(pair.top.mass(), 172.5, epsilon = 0.1);
                assert_relative_eq!(pair.anti_top.mass(), 172.5, epsilon = 0.1);
                assert!(pair.neutrino.mass().abs() < 3.0);
            }
            ReconstructedEvent::NoSolution => {
                assert!(top.is_failure_sentinel() && anti_top.is_failure_sentinel());
            }
        }
    }

    #[test]
    fn test_sentinel_when_every_weight_vanishes() {
        let truth = &TruthEvent::catalogue()[0];
        let scorer = SolutionScorer::kinematic().with_term(Veto);
        let reconstructor =
            TopReconstructor::with_scorer(ReconstructionConfig::default().with_trials(8), scorer).unwrap();
        let event = reconstructor.reconstruct_input(3, &truth.input(true, true), &smearing_model(1));

        assert_eq!(event, ReconstructedEvent::NoSolution);
        let [top, anti_top] = event.four_momenta();
        assert_eq!(top, FourMomentum::failure_sentinel());
        assert_eq!(anti_top, FourMomentum::failure_sentinel());
    }

    #[test]
    fn test_sentinel_when_every_solve_is_degenerate() {
        // All objects massless and collinear: every linear system is singular
        let along = |pt: f64| FourMomentum::from_pt_eta_phi_m(pt, 0.7, -0.4, 0.0);
        let input = KinematicInput::new(
            along(40.0),
            along(30.0),
            -11,
            11,
            along(80.0),
            along(60.0),
            false,
            false,
            MissingTransverseMomentum::new(10.0, 5.0),
        )
        .unwrap();
        let reconstructor = TopReconstructor::new(ReconstructionConfig::default().with_trials(4)).unwrap();
        let outcome = reconstructor.reconstruct_detailed(5, &input, &ZeroWidthSampler);

        assert_eq!(outcome.event, ReconstructedEvent::NoSolution);
        assert_eq!(outcome.report.solutions_accepted, 0);
        assert_eq!(outcome.report.degenerate_solves, 8);
        assert!(outcome.event.four_momenta()[0].is_failure_sentinel());
    }

    #[test]
    fn test_pairing_follows_the_single_tag() {
        let reconstructor = TopReconstructor::new(ReconstructionConfig::single_shot()).unwrap();
        let truth = &TruthEvent::catalogue()[1];

        let direct = reconstructor.reconstruct_input(2, &truth.input(true, false), &ZeroWidthSampler);
        assert_eq!(direct.top_pair().unwrap().pairing, PairingHypothesis::Direct);

        // Same event with the jets listed the other way round and the tag moved along
        let mut reversed = truth.input(true, false);
        reversed.jets.swap(0, 1);
        let swapped = reconstructor.reconstruct_input(2, &reversed, &ZeroWidthSampler);
        let swapped_pair = swapped.top_pair().unwrap();
        assert_eq!(swapped_pair.pairing, PairingHypothesis::Swapped);

        // Physically identical assignment, so identical tops
        assert_eq!(direct.four_momenta(), swapped.four_momenta());
    }

    #[test]
    fn test_smeared_ensemble_reconstructs() {
        let config = ReconstructionConfig::precise().with_trials(50);
        let reconstructor = TopReconstructor::new(config).unwrap();
        let truth = &TruthEvent::catalogue()[0];
        let outcome = reconstructor.reconstruct_detailed(11, &truth.input(true, true), &smearing_model(1234));

        assert_eq!(outcome.report.trials_run, 50);
        assert!(outcome.report.trials_with_solution > 0);
        let pair = outcome.event.top_pair().unwrap();
        assert!(pair.trial < 50);
        assert!(pair.weight > 0.0 && pair.weight <= 1.0);
        assert_relative_eq!(pair.top.mass(), 172.5, epsilon = 0.1);
    }

    #[test]
    fn test_more_trials_can_change_the_answer() {
        let sampler = smearing_model(1234);
        let input = TruthEvent::catalogue()[0].input(true, true);
        let single = TopReconstructor::new(ReconstructionConfig::default().with_trials(1)).unwrap();
        let ensemble = TopReconstructor::new(ReconstructionConfig::default()).unwrap();

        let mut moved = 0;
        for event_id in 0..8 {
            let many = ensemble
                .reconstruct_input(event_id, &input, &sampler)
                .top_pair()
                .copied()
                .unwrap();
            // Trial 0 draws the same objects in both runs
            if let Some(one) = single.reconstruct_input(event_id, &input, &sampler).top_pair() {
                assert!(many.weight >= one.weight * (1.0 - 1e-6));
                if many.trial != 0 {
                    assert_ne!(many.top, one.top);
                }
            }
            if many.trial != 0 {
                moved += 1;
            }
        }
        assert!(moved > 0, "the ensemble never looked past trial 0");
    }

    #[test]
    fn test_kinematic_only_keeps_the_first_trial() {
        let sampler = smearing_model(1234);
        let input = TruthEvent::catalogue()[0].input(true, true);
        let config = ReconstructionConfig::default().kinematic_only();
        let single = TopReconstructor::new(config.clone().with_trials(1)).unwrap();
        let ensemble = TopReconstructor::new(config).unwrap();

        for event_id in 0..4 {
            let one = single.reconstruct_input(event_id, &input, &sampler);
            let many = ensemble.reconstruct_input(event_id, &input, &sampler);
            if let (Some(one), Some(many)) = (one.top_pair(), many.top_pair()) {
                assert_eq!(many.trial, 0);
                assert_eq!(many.top, one.top);
                assert_eq!(many.weight, 1.0);
            }
        }
    }

    #[test]
    fn test_fewer_than_two_jets_is_malformed_not_sentinel() {
        let record = EventRecord {
            event_number: 1,
            lep_pt: vec![50.0, 40.0],
            lep_eta: vec![0.1, -0.2],
            lep_phi: vec![0.3, 2.9],
            lep_pid: vec![-11, 11],
            jet_pt: vec![80.0],
            jet_e: vec![120.0],
            jet_eta: vec![0.5],
            jet_phi: vec![-1.0],
            jet_btag: vec![0.9],
            met_met: 25.0,
            met_phi: -0.64,
        };
        let reconstructor = TopReconstructor::new(ReconstructionConfig::single_shot()).unwrap();
        let err = reconstructor
            .reconstruct_record(&record, &ZeroWidthSampler)
            .unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_batch_keeps_order_and_counts() {
        let good = EventRecord {
            event_number: 10,
            lep_pt: vec![50.0, 40.0],
            lep_eta: vec![0.1, -0.2],
            lep_phi: vec![0.3, 2.9],
            lep_pid: vec![-11, 11],
            jet_pt: vec![80.0, 60.0],
            jet_e: vec![120.0, 90.0],
            jet_eta: vec![0.5, -0.4],
            jet_phi: vec![-1.0, 1.5],
            jet_btag: vec![0.9, 0.8],
            met_met: 25.0,
            met_phi: -0.6435,
        };
        let mut bad = good.clone();
        bad.event_number = 11;
        bad.lep_pid = vec![11, 13];

        let reconstructor = TopReconstructor::new(ReconstructionConfig::default().with_trials(5)).unwrap();
        let (results, summary) =
            reconstructor.reconstruct_batch(&[good.clone(), bad, good], &ZeroWidthSampler);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_malformed_input());
        assert_eq!(summary.events, 3);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.reconstructed + summary.failed, 2);
        assert_eq!(results[0].as_ref().unwrap(), results[2].as_ref().unwrap());
    }

    #[test]
    fn test_shipped_calibration_and_events() {
        use crate::resolution::HistogramResolutionModel;

        let model =
            HistogramResolutionModel::from_json_str(include_str!("../data/calibration.json"), 9).unwrap();
        assert_eq!(model.jet.bins.len(), 4);
        assert!(model.missing_et.is_some());

        let records: Vec<EventRecord> = include_str!("../data/events.jsonl")
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let reconstructor = TopReconstructor::new(ReconstructionConfig::default().with_trials(10)).unwrap();
        let (results, summary) = reconstructor.reconstruct_batch(&records, &model);
        assert_eq!(summary.events, 3);
        // Third record has a single jet
        assert_eq!(summary.malformed, 1);
        assert!(results[2].is_err());
    }

    #[test]
    fn test_free_function_contract() {
        let truth = &TruthEvent::catalogue()[2];
        let met = truth.met();
        let event = reconstruct(
            truth.lepton,
            truth.anti_lepton,
            -11,
            11,
            truth.b,
            truth.bbar,
            true,
            false,
            met.ex,
            met.ey,
            &ZeroWidthSampler,
        )
        .unwrap();
        assert!(event.is_reconstructed());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    struct ScaleBy(f64);

    impl LikelihoodTerm for ScaleBy {
        fn name(&self) -> &str {
            "scale"
        }
        fn factor(&self, _: &Candidate, _: &ScoringContext) -> f64 {
            self.0
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn reconstruction_is_deterministic(event_id in any::<u64>(), seed in any::<u64>()) {
            let config = ReconstructionConfig::precise().with_trials(10);
            let reconstructor = TopReconstructor::new(config).unwrap();
            let input = TruthEvent::catalogue()[0].input(true, true);
            let sampler = smearing_model(seed);

            let a = reconstructor.reconstruct_input(event_id, &input, &sampler);
            let b = reconstructor.reconstruct_input(event_id, &input, &sampler);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn rescaled_weights_select_the_same_solution(scale in 1e-3f64..1e3, event_id in 0u64..1000) {
            let config = ReconstructionConfig::precise().with_trials(10);
            let base = SolutionScorer::from_config(&config.scoring);
            let scaled = base.clone().with_term(ScaleBy(scale));
            let input = TruthEvent::catalogue()[1].input(true, true);
            let sampler = smearing_model(42);

            let plain = TopReconstructor::with_scorer(config.clone(), base)
                .unwrap()
                .reconstruct_input(event_id, &input, &sampler);
            let rescaled = TopReconstructor::with_scorer(config, scaled)
                .unwrap()
                .reconstruct_input(event_id, &input, &sampler);

            match (plain.top_pair(), rescaled.top_pair()) {
                (Some(p), Some(r)) => {
                    prop_assert_eq!(p.top, r.top);
                    prop_assert_eq!(p.anti_top, r.anti_top);
                    prop_assert_eq!(p.trial, r.trial);
                    prop_assert_eq!(p.pairing, r.pairing);
                }
                (None, None) => {}
                _ => prop_assert!(false, "rescaling changed whether a solution exists"),
            }
        }
    }
}
