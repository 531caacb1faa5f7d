//! Measured event content consumed by the reconstruction
//!
//! A [`KinematicInput`] is the validated view of one event: an opposite-sign
//! lepton pair with roles fixed by charge, the two leading jets with their
//! b-tag decisions, and the missing transverse momentum. Role inference
//! happens here once; the solver never looks at particle IDs.

use super::momentum::FourMomentum;
use crate::error::MalformedInputError;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// LEPTONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Role of a charged lepton in the tt̄ → W⁺b W⁻b̄ decay chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeptonRole {
    /// Negatively charged lepton, from the anti-top
    Lepton,
    /// Positively charged anti-lepton, from the top
    AntiLepton,
}

impl LeptonRole {
    /// Infer the role from the sign of a particle ID
    ///
    /// The event store encodes a positive ID for the anti-lepton and a
    /// negative ID for the lepton.
    pub fn from_particle_id(id: i32) -> Result<Self, MalformedInputError> {
        match id.signum() {
            1 => Ok(LeptonRole::AntiLepton),
            -1 => Ok(LeptonRole::Lepton),
            _ => Err(MalformedInputError::ZeroParticleId { id }),
        }
    }

    /// Slot name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            LeptonRole::Lepton => "lepton",
            LeptonRole::AntiLepton => "anti-lepton",
        }
    }
}

/// A charged lepton with its charge-derived role
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeptonCandidate {
    pub momentum: FourMomentum,
    pub role: LeptonRole,
    pub particle_id: i32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// JETS & MISSING TRANSVERSE MOMENTUM
// ═══════════════════════════════════════════════════════════════════════════════

/// A jet with its b-tag decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JetCandidate {
    pub momentum: FourMomentum,
    pub btagged: bool,
}

/// Missing transverse momentum (E_x, E_y)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MissingTransverseMomentum {
    pub ex: f64,
    pub ey: f64,
}

impl MissingTransverseMomentum {
    pub fn new(ex: f64, ey: f64) -> Self {
        Self { ex, ey }
    }

    /// Build from magnitude and azimuth
    pub fn from_polar(magnitude: f64, phi: f64) -> Self {
        let (sin, cos) = phi.sin_cos();
        Self::new(magnitude * cos, magnitude * sin)
    }

    pub fn magnitude(&self) -> f64 {
        self.ex.hypot(self.ey)
    }

    pub fn phi(&self) -> f64 {
        self.ey.atan2(self.ex)
    }

    /// Embed as a massless transverse four-vector (p_z = 0)
    pub fn as_four_momentum(&self) -> FourMomentum {
        FourMomentum::new(self.ex, self.ey, 0.0, self.magnitude())
    }

    /// Transverse part of a four-vector
    pub fn from_four_momentum(p: &FourMomentum) -> Self {
        Self::new(p.px, p.py)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KINEMATIC INPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// One validated event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicInput {
    pub lepton: LeptonCandidate,
    pub anti_lepton: LeptonCandidate,
    /// Leading and sub-leading jet, in the order given by the caller
    pub jets: [JetCandidate; 2],
    pub met: MissingTransverseMomentum,
}

impl KinematicInput {
    /// Validate and bundle an event given explicit four-vectors
    ///
    /// `lepton_id` must carry the lepton sign and `anti_lepton_id` the
    /// anti-lepton sign; every component must be finite.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lepton: FourMomentum,
        anti_lepton: FourMomentum,
        lepton_id: i32,
        anti_lepton_id: i32,
        jet1: FourMomentum,
        jet2: FourMomentum,
        jet1_btag: bool,
        jet2_btag: bool,
        met: MissingTransverseMomentum,
    ) -> Result<Self, MalformedInputError> {
        require_finite("lepton", &lepton)?;
        require_finite("anti_lepton", &anti_lepton)?;
        require_finite("jet1", &jet1)?;
        require_finite("jet2", &jet2)?;
        if !met.ex.is_finite() {
            return Err(non_finite("missing_ex"));
        }
        if !met.ey.is_finite() {
            return Err(non_finite("missing_ey"));
        }

        if LeptonRole::from_particle_id(lepton_id)? != LeptonRole::Lepton {
            return Err(MalformedInputError::RoleMismatch {
                slot: LeptonRole::Lepton.name(),
                id: lepton_id,
            });
        }
        if LeptonRole::from_particle_id(anti_lepton_id)? != LeptonRole::AntiLepton {
            return Err(MalformedInputError::RoleMismatch {
                slot: LeptonRole::AntiLepton.name(),
                id: anti_lepton_id,
            });
        }

        Ok(Self {
            lepton: LeptonCandidate {
                momentum: lepton,
                role: LeptonRole::Lepton,
                particle_id: lepton_id,
            },
            anti_lepton: LeptonCandidate {
                momentum: anti_lepton,
                role: LeptonRole::AntiLepton,
                particle_id: anti_lepton_id,
            },
            jets: [
                JetCandidate {
                    momentum: jet1,
                    btagged: jet1_btag,
                },
                JetCandidate {
                    momentum: jet2,
                    btagged: jet2_btag,
                },
            ],
            met,
        })
    }
}

fn non_finite(field: &str) -> MalformedInputError {
    MalformedInputError::NonFinite {
        field: field.to_string(),
    }
}

fn require_finite(field: &str, p: &FourMomentum) -> Result<(), MalformedInputError> {
    if p.is_finite() {
        Ok(())
    } else {
        Err(non_finite(field))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RAW EVENT RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-event arrays as decoded from a columnar event store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_number: u64,
    pub lep_pt: Vec<f64>,
    pub lep_eta: Vec<f64>,
    pub lep_phi: Vec<f64>,
    pub lep_pid: Vec<i32>,
    pub jet_pt: Vec<f64>,
    pub jet_e: Vec<f64>,
    pub jet_eta: Vec<f64>,
    pub jet_phi: Vec<f64>,
    /// b-tagging discriminant per jet
    pub jet_btag: Vec<f64>,
    pub met_met: f64,
    pub met_phi: f64,
}

impl EventRecord {
    /// Validate the arrays and build the event's [`KinematicInput`]
    ///
    /// The leading lepton of each charge sign and the two leading jets are
    /// kept. A jet is b-tagged when its discriminant exceeds
    /// `btag_threshold`.
    pub fn to_input(&self, btag_threshold: f64) -> Result<KinematicInput, MalformedInputError> {
        let n_lep = self.lep_pt.len();
        check_len("leptons", n_lep, self.lep_eta.len())?;
        check_len("leptons", n_lep, self.lep_phi.len())?;
        check_len("leptons", n_lep, self.lep_pid.len())?;
        let n_jet = self.jet_pt.len();
        check_len("jets", n_jet, self.jet_e.len())?;
        check_len("jets", n_jet, self.jet_eta.len())?;
        check_len("jets", n_jet, self.jet_phi.len())?;
        check_len("jets", n_jet, self.jet_btag.len())?;

        for (field, values) in [
            ("lep_pt", &self.lep_pt),
            ("lep_eta", &self.lep_eta),
            ("lep_phi", &self.lep_phi),
            ("jet_pt", &self.jet_pt),
            ("jet_e", &self.jet_e),
            ("jet_eta", &self.jet_eta),
            ("jet_phi", &self.jet_phi),
            ("jet_btag", &self.jet_btag),
        ] {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(non_finite(field));
            }
        }
        if !self.met_met.is_finite() {
            return Err(non_finite("met_met"));
        }
        if !self.met_phi.is_finite() {
            return Err(non_finite("met_phi"));
        }

        // Leading lepton of each sign
        let mut lepton: Option<usize> = None;
        let mut anti_lepton: Option<usize> = None;
        let (mut n_neg, mut n_pos) = (0, 0);
        for (i, &pid) in self.lep_pid.iter().enumerate() {
            let slot = match LeptonRole::from_particle_id(pid)? {
                LeptonRole::Lepton => {
                    n_neg += 1;
                    &mut lepton
                }
                LeptonRole::AntiLepton => {
                    n_pos += 1;
                    &mut anti_lepton
                }
            };
            if slot.map_or(true, |j| self.lep_pt[i] > self.lep_pt[j]) {
                *slot = Some(i);
            }
        }
        let (l, lbar) = match (lepton, anti_lepton) {
            (Some(l), Some(lbar)) => (l, lbar),
            _ => {
                return Err(MalformedInputError::MissingLeptonPair {
                    negative: n_neg,
                    positive: n_pos,
                })
            }
        };

        if n_jet < 2 {
            return Err(MalformedInputError::InsufficientJets { found: n_jet });
        }
        let mut order: Vec<usize> = (0..n_jet).collect();
        order.sort_by(|&a, &b| self.jet_pt[b].total_cmp(&self.jet_pt[a]));
        let (j1, j2) = (order[0], order[1]);

        let lep_p4 = |i: usize| {
            FourMomentum::from_pt_eta_phi_m(self.lep_pt[i], self.lep_eta[i], self.lep_phi[i], 0.0)
        };
        let jet_p4 = |i: usize| {
            FourMomentum::from_pt_eta_phi_e(
                self.jet_pt[i],
                self.jet_eta[i],
                self.jet_phi[i],
                self.jet_e[i],
            )
        };

        KinematicInput::new(
            lep_p4(l),
            lep_p4(lbar),
            self.lep_pid[l],
            self.lep_pid[lbar],
            jet_p4(j1),
            jet_p4(j2),
            self.jet_btag[j1] > btag_threshold,
            self.jet_btag[j2] > btag_threshold,
            MissingTransverseMomentum::from_polar(self.met_met, self.met_phi),
        )
    }
}

fn check_len(object: &'static str, expected: usize, got: usize) -> Result<(), MalformedInputError> {
    if expected == got {
        Ok(())
    } else {
        Err(MalformedInputError::LengthMismatch {
            object,
            expected,
            got,
        })
    }
}
