//! Detector resolution sampling
//!
//! The ensemble never smears anything itself: it asks a [`ResolutionSampler`]
//! for a resolution-smeared variant of a measured four-vector, passing a
//! deterministic seed. Two samplers ship with the crate:
//!
//! - [`ZeroWidthSampler`] returns its input unchanged (perfect detector).
//! - [`HistogramResolutionModel`] draws an energy response factor and optional
//!   η/φ shifts from calibration histograms binned in p_T, per object kind.
//!
//! ```text
//!   measured p4 ──► bin by p_T ──► draw response r, δη, δφ ──► smeared p4
//!                                  (StdRng seeded by model seed ⊕ trial seed)
//! ```

use crate::error::RecoError;
use crate::kinematics::FourMomentum;
use crate::RecoResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════════
// OBJECT KINDS & SEEDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of measured object, selecting the resolution to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Lepton,
    Jet,
    MissingEt,
}

/// Position of an object inside one trial, used to decorrelate seeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedSlot {
    Lepton = 0,
    AntiLepton = 1,
    Jet1 = 2,
    Jet2 = 3,
    MissingEt = 4,
}

/// SplitMix64 finaliser
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic seed for one object of one trial of one event
pub fn derive_seed(event_id: u64, trial: usize, slot: SeedSlot) -> u64 {
    mix64(mix64(mix64(event_id) ^ trial as u64) ^ slot as u64)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAMPLER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability to draw a resolution-smeared variant of a measured four-vector
///
/// Implementations must be pure functions of `(kind, momentum, seed)` and
/// their own construction-time state, so that reconstructions are
/// reproducible and trials can run on any thread.
pub trait ResolutionSampler: Send + Sync {
    fn sample(&self, kind: ObjectKind, momentum: &FourMomentum, seed: u64) -> FourMomentum;
}

/// Perfect detector: every sample is the measurement itself
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroWidthSampler;

impl ResolutionSampler for ZeroWidthSampler {
    fn sample(&self, _kind: ObjectKind, momentum: &FourMomentum, _seed: u64) -> FourMomentum {
        *momentum
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSE HISTOGRAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Binned distribution sampled by inverse CDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHistogram {
    /// Bin edges (n_bins + 1, strictly increasing)
    pub edges: Vec<f64>,
    /// Non-negative bin contents (n_bins)
    pub contents: Vec<f64>,
}

impl ResponseHistogram {
    /// Create a histogram from edges and contents, checking its shape
    pub fn new(edges: Vec<f64>, contents: Vec<f64>) -> RecoResult<Self> {
        let hist = Self { edges, contents };
        hist.validate()?;
        Ok(hist)
    }

    /// Flat distribution on [min, max)
    pub fn uniform(min: f64, max: f64, n_bins: usize) -> RecoResult<Self> {
        if n_bins == 0 {
            return Err(RecoError::Calibration("histogram needs at least one bin".into()));
        }
        let step = (max - min) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| min + i as f64 * step).collect();
        Self::new(edges, vec![1.0; n_bins])
    }

    pub fn validate(&self) -> RecoResult<()> {
        if self.contents.is_empty() || self.edges.len() != self.contents.len() + 1 {
            return Err(RecoError::Calibration(format!(
                "histogram has {} edges for {} bins",
                self.edges.len(),
                self.contents.len()
            )));
        }
        if self.edges.iter().any(|e| !e.is_finite())
            || self.edges.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(RecoError::Calibration(
                "histogram edges must be finite and strictly increasing".into(),
            ));
        }
        if self.contents.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(RecoError::Calibration(
                "histogram contents must be finite and non-negative".into(),
            ));
        }
        if self.total() <= 0.0 {
            return Err(RecoError::Calibration("histogram is empty".into()));
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Draw one value: pick a bin by content, then uniformly inside it
    ///
    /// `None` when the histogram has no weight or its edges do not match
    /// its contents.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        let total = self.total();
        if self.contents.is_empty() || self.edges.len() != self.contents.len() + 1 || !(total > 0.0) {
            return None;
        }
        let target = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut bin = self.contents.len() - 1;
        for (i, &c) in self.contents.iter().enumerate() {
            cumulative += c;
            if target < cumulative {
                bin = i;
                break;
            }
        }
        let (lo, hi) = (self.edges[bin], self.edges[bin + 1]);
        Some(lo + rng.gen::<f64>() * (hi - lo))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-KIND RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolution in one p_T bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionBin {
    /// Multiplicative energy/momentum response
    pub response: ResponseHistogram,
    /// Additive pseudorapidity shift
    #[serde(default)]
    pub eta_shift: Option<ResponseHistogram>,
    /// Additive azimuth shift
    #[serde(default)]
    pub phi_shift: Option<ResponseHistogram>,
}

/// Resolution of one object kind, binned in p_T
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectResolution {
    /// p_T bin edges in GeV (bins + 1); out-of-range p_T uses the edge bins
    pub pt_edges: Vec<f64>,
    pub bins: Vec<ResolutionBin>,
}

impl ObjectResolution {
    /// One bin covering every p_T
    pub fn single(bin: ResolutionBin) -> Self {
        Self {
            pt_edges: vec![0.0, f64::MAX],
            bins: vec![bin],
        }
    }

    pub fn validate(&self) -> RecoResult<()> {
        if self.bins.is_empty() || self.pt_edges.len() != self.bins.len() + 1 {
            return Err(RecoError::Calibration(format!(
                "{} pT edges for {} resolution bins",
                self.pt_edges.len(),
                self.bins.len()
            )));
        }
        if self.pt_edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(RecoError::Calibration(
                "pT edges must be strictly increasing".into(),
            ));
        }
        for bin in &self.bins {
            bin.response.validate()?;
            if let Some(h) = &bin.eta_shift {
                h.validate()?;
            }
            if let Some(h) = &bin.phi_shift {
                h.validate()?;
            }
        }
        Ok(())
    }

    /// Bin index for a transverse momentum, clamped to the edge bins
    ///
    /// `None` for a resolution without bins.
    pub fn bin_index(&self, pt: f64) -> Option<usize> {
        let last = self.bins.len().checked_sub(1)?;
        match self.pt_edges.first() {
            Some(&low) if pt >= low => {
                let idx = self.pt_edges.partition_point(|&e| e <= pt);
                Some(idx.saturating_sub(1).min(last))
            }
            _ => Some(0),
        }
    }

    /// Smeared copy of `p`; unusable calibration leaves `p` unchanged
    fn smear<R: Rng + ?Sized>(&self, kind: ObjectKind, p: &FourMomentum, rng: &mut R) -> FourMomentum {
        let pt = p.pt();
        if pt <= 0.0 {
            return *p;
        }
        self.try_smear(kind, p, pt, rng).unwrap_or(*p)
    }

    fn try_smear<R: Rng + ?Sized>(
        &self,
        kind: ObjectKind,
        p: &FourMomentum,
        pt: f64,
        rng: &mut R,
    ) -> Option<FourMomentum> {
        let bin = self.bins.get(self.bin_index(pt)?)?;
        let response = bin.response.sample(rng)?;
        let d_eta = match &bin.eta_shift {
            Some(h) => h.sample(rng)?,
            None => 0.0,
        };
        let d_phi = match &bin.phi_shift {
            Some(h) => h.sample(rng)?,
            None => 0.0,
        };
        let phi = p.phi() + d_phi;

        let smeared = match kind {
            ObjectKind::MissingEt => {
                let (sin, cos) = phi.sin_cos();
                let new_pt = response * pt;
                FourMomentum::new(new_pt * cos, new_pt * sin, 0.0, new_pt.abs())
            }
            ObjectKind::Lepton | ObjectKind::Jet => {
                let mass = p.mass().max(0.0);
                FourMomentum::from_pt_eta_phi_m(response * pt, p.eta() + d_eta, phi, response * mass)
            }
        };
        smeared.is_finite().then_some(smeared)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HISTOGRAM RESOLUTION MODEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Calibration-driven sampler, constructed once per analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramResolutionModel {
    /// Model seed, combined with every per-trial seed
    #[serde(default)]
    pub seed: u64,
    pub lepton: ObjectResolution,
    pub jet: ObjectResolution,
    /// Resolution of the missing transverse momentum itself, if calibrated
    #[serde(default)]
    pub missing_et: Option<ObjectResolution>,
}

impl HistogramResolutionModel {
    pub fn new(
        seed: u64,
        lepton: ObjectResolution,
        jet: ObjectResolution,
        missing_et: Option<ObjectResolution>,
    ) -> RecoResult<Self> {
        let model = Self {
            seed,
            lepton,
            jet,
            missing_et,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> RecoResult<()> {
        self.lepton.validate()?;
        self.jet.validate()?;
        if let Some(met) = &self.missing_et {
            met.validate()?;
        }
        Ok(())
    }

    /// Parse a JSON calibration and attach the given seed
    pub fn from_json_str(json: &str, seed: u64) -> RecoResult<Self> {
        let mut model: Self = serde_json::from_str(json)
            .map_err(|e| RecoError::Calibration(format!("Failed to parse calibration: {}", e)))?;
        model.seed = seed;
        model.validate()?;
        Ok(model)
    }

    /// Load a JSON calibration file
    pub fn from_file(path: impl AsRef<Path>, seed: u64) -> RecoResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RecoError::Io(format!("Failed to read calibration: {}", e)))?;
        let model = Self::from_json_str(&content, seed)?;
        log::info!(
            "Loaded resolution calibration from {:?} ({} lepton bins, {} jet bins)",
            path.as_ref(),
            model.lepton.bins.len(),
            model.jet.bins.len()
        );
        Ok(model)
    }

    fn resolution(&self, kind: ObjectKind) -> Option<&ObjectResolution> {
        match kind {
            ObjectKind::Lepton => Some(&self.lepton),
            ObjectKind::Jet => Some(&self.jet),
            ObjectKind::MissingEt => self.missing_et.as_ref(),
        }
    }
}

impl ResolutionSampler for HistogramResolutionModel {
    fn sample(&self, kind: ObjectKind, momentum: &FourMomentum, seed: u64) -> FourMomentum {
        match self.resolution(kind) {
            Some(resolution) => {
                let mut rng = StdRng::seed_from_u64(mix64(self.seed) ^ seed);
                resolution.smear(kind, momentum, &mut rng)
            }
            None => *momentum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model(seed: u64) -> HistogramResolutionModel {
        let bin = ResolutionBin {
            response: ResponseHistogram::uniform(0.9, 1.1, 20).unwrap(),
            eta_shift: Some(ResponseHistogram::uniform(-0.01, 0.01, 4).unwrap()),
            phi_shift: Some(ResponseHistogram::uniform(-0.01, 0.01, 4).unwrap()),
        };
        HistogramResolutionModel::new(
            seed,
            ObjectResolution::single(bin.clone()),
            ObjectResolution {
                pt_edges: vec![0.0, 50.0, 1000.0],
                bins: vec![bin.clone(), bin.clone()],
            },
            Some(ObjectResolution::single(bin)),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_width_is_identity() {
        let p = FourMomentum::from_pt_eta_phi_e(80.0, 0.5, -1.0, 120.0);
        assert_eq!(ZeroWidthSampler.sample(ObjectKind::Jet, &p, 7), p);
    }

    #[test]
    fn test_seeds_are_distinct() {
        let a = derive_seed(1, 0, SeedSlot::Lepton);
        assert_ne!(a, derive_seed(1, 0, SeedSlot::AntiLepton));
        assert_ne!(a, derive_seed(1, 1, SeedSlot::Lepton));
        assert_ne!(a, derive_seed(2, 0, SeedSlot::Lepton));
        assert_eq!(a, derive_seed(1, 0, SeedSlot::Lepton));
    }

    #[test]
    fn test_histogram_samples_stay_in_range() {
        let hist = ResponseHistogram::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 5.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let v = hist.sample(&mut rng).unwrap();
            // First bin is empty
            assert!((1.0..3.0).contains(&v));
        }
    }

    #[test]
    fn test_bad_histograms_rejected() {
        assert!(ResponseHistogram::new(vec![0.0, 1.0], vec![1.0, 2.0]).is_err());
        assert!(ResponseHistogram::new(vec![1.0, 0.0], vec![1.0]).is_err());
        assert!(ResponseHistogram::new(vec![0.0, 1.0], vec![-1.0]).is_err());
        assert!(ResponseHistogram::new(vec![0.0, 1.0], vec![0.0]).is_err());
    }

    #[test]
    fn test_bin_index_clamps() {
        let res = model(1).jet;
        assert_eq!(res.bin_index(10.0), Some(0));
        assert_eq!(res.bin_index(50.0), Some(1));
        assert_eq!(res.bin_index(5000.0), Some(1));
        assert_eq!(res.bin_index(-1.0), Some(0));
    }

    #[test]
    fn test_sampling_is_deterministic_and_bounded() {
        let m = model(1234);
        let p = FourMomentum::from_pt_eta_phi_m(50.0, 0.1, 0.3, 0.0);
        let a = m.sample(ObjectKind::Lepton, &p, 99);
        let b = m.sample(ObjectKind::Lepton, &p, 99);
        assert_eq!(a, b);
        assert!(a.pt() >= 45.0 - 1e-9 && a.pt() <= 55.0 + 1e-9);
        assert!((a.eta() - 0.1).abs() <= 0.01 + 1e-9);

        let other_model = model(4321).sample(ObjectKind::Lepton, &p, 99);
        assert_ne!(a, other_model);
    }

    #[test]
    fn test_missing_et_stays_transverse() {
        let m = model(5);
        let met = FourMomentum::new(20.0, -15.0, 0.0, 25.0);
        let s = m.sample(ObjectKind::MissingEt, &met, 11);
        assert_eq!(s.pz, 0.0);
        assert_relative_eq!(s.e, s.pt(), epsilon = 1e-12);
    }

    #[test]
    fn test_json_calibration() {
        let json = r#"{
            "seed": 0,
            "lepton": {"pt_edges": [0.0, 1000.0], "bins": [{"response": {"edges": [0.99, 1.01], "contents": [1.0]}}]},
            "jet": {"pt_edges": [0.0, 1000.0], "bins": [{"response": {"edges": [0.8, 1.2], "contents": [1.0]}}]}
        }"#;
        let m = HistogramResolutionModel::from_json_str(json, 1234).unwrap();
        assert_eq!(m.seed, 1234);
        assert!(m.missing_et.is_none());
        assert_eq!(m.jet.bins[0].response.edges, vec![0.8, 1.2]);

        let bad = r#"{"seed": 0, "lepton": {"pt_edges": [0.0], "bins": []}, "jet": {"pt_edges": [], "bins": []}}"#;
        assert!(matches!(
            HistogramResolutionModel::from_json_str(bad, 1),
            Err(RecoError::Calibration(_))
        ));
    }

    #[test]
    fn test_unvalidated_calibration_passes_objects_through() {
        let p = FourMomentum::from_pt_eta_phi_e(80.0, 0.5, -1.0, 120.0);

        let mut m = model(3);
        m.jet = ObjectResolution {
            pt_edges: vec![],
            bins: vec![],
        };
        assert_eq!(m.jet.bin_index(80.0), None);
        assert_eq!(m.sample(ObjectKind::Jet, &p, 17), p);

        let mut m = model(3);
        m.jet.bins[1].response.contents.clear();
        assert_eq!(m.sample(ObjectKind::Jet, &p, 17), p);

        let mut m = model(3);
        m.jet.bins[1].phi_shift = Some(ResponseHistogram {
            edges: vec![0.0, 1.0],
            contents: vec![0.0],
        });
        assert_eq!(m.sample(ObjectKind::Jet, &p, 17), p);

        let empty = ResponseHistogram {
            edges: vec![],
            contents: vec![],
        };
        assert!(empty.sample(&mut StdRng::seed_from_u64(1)).is_none());
    }
}
