//! # Kinematics
//!
//! Four-momentum value type and the validated per-event input.

pub mod input;
pub mod momentum;

pub use input::{
    EventRecord, JetCandidate, KinematicInput, LeptonCandidate, LeptonRole,
    MissingTransverseMomentum,
};
pub use momentum::{FourMomentum, SENTINEL_MARKER};
