//! Relativistic four-momentum in collider coordinates
//!
//! Energies and momenta are in GeV with c = 1. The beam axis is z; the
//! transverse plane is (x, y), with azimuth φ measured from x and
//! pseudorapidity η = asinh(p_z / p_T).

use serde::{Deserialize, Serialize};

/// Marker value carried by every component of the failure sentinel.
///
/// Far outside any momentum a detector at the LHC can produce.
pub const SENTINEL_MARKER: f64 = 10_000.0;

// ═══════════════════════════════════════════════════════════════════════════════
// FOUR-MOMENTUM
// ═══════════════════════════════════════════════════════════════════════════════

/// Four-momentum vector p^μ = (E, p_x, p_y, p_z)
///
/// Satisfies the mass-shell condition E² - |p|² = m² for physical objects.
/// Neutrino candidates may violate it transiently inside the solver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourMomentum {
    /// Momentum x-component
    pub px: f64,
    /// Momentum y-component
    pub py: f64,
    /// Momentum z-component (beam axis)
    pub pz: f64,
    /// Energy component (timelike)
    pub e: f64,
}

impl FourMomentum {
    /// Create a four-momentum from Cartesian components
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Build from transverse momentum, pseudorapidity, azimuth and mass
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let (sin, cos) = phi.sin_cos();
        let px = pt * cos;
        let py = pt * sin;
        let pz = pt * eta.sinh();
        let e = (px * px + py * py + pz * pz + mass * mass).sqrt();
        Self::new(px, py, pz, e)
    }

    /// Build from transverse momentum, pseudorapidity, azimuth and energy
    pub fn from_pt_eta_phi_e(pt: f64, eta: f64, phi: f64, e: f64) -> Self {
        let (sin, cos) = phi.sin_cos();
        Self::new(pt * cos, pt * sin, pt * eta.sinh(), e)
    }

    /// The failure sentinel: every component equals [`SENTINEL_MARKER`]
    pub fn failure_sentinel() -> Self {
        Self::new(SENTINEL_MARKER, SENTINEL_MARKER, SENTINEL_MARKER, SENTINEL_MARKER)
    }

    /// Check whether the three momentum components carry the sentinel marker
    pub fn is_failure_sentinel(&self) -> bool {
        self.px == SENTINEL_MARKER && self.py == SENTINEL_MARKER && self.pz == SENTINEL_MARKER
    }

    /// All components are finite numbers
    pub fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }

    /// Invariant mass squared: m² = E² - |p|²
    pub fn mass_squared(&self) -> f64 {
        self.e * self.e - self.p_squared()
    }

    /// Invariant mass, negative for spacelike vectors (ROOT convention)
    pub fn mass(&self) -> f64 {
        let m2 = self.mass_squared();
        if m2 >= 0.0 {
            m2.sqrt()
        } else {
            -(-m2).sqrt()
        }
    }

    /// |p|²
    pub fn p_squared(&self) -> f64 {
        self.px * self.px + self.py * self.py + self.pz * self.pz
    }

    /// 3-momentum magnitude
    pub fn p(&self) -> f64 {
        self.p_squared().sqrt()
    }

    /// Transverse momentum p_T = √(p_x² + p_y²)
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Pseudorapidity η = asinh(p_z / p_T)
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0.0 {
            (self.pz / pt).asinh()
        } else if self.pz == 0.0 {
            0.0
        } else {
            self.pz.signum() * f64::INFINITY
        }
    }

    /// Azimuthal angle φ = atan2(p_y, p_x), in (-π, π]
    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }

    /// Minkowski inner product: p · q = E₁E₂ - p⃗₁·p⃗₂
    pub fn dot(&self, other: &Self) -> f64 {
        self.e * other.e - self.px * other.px - self.py * other.py - self.pz * other.pz
    }

    /// Velocity vector β = p⃗ / E
    pub fn boost_vector(&self) -> [f64; 3] {
        [self.px / self.e, self.py / self.e, self.pz / self.e]
    }

    /// General Lorentz boost by velocity β
    ///
    /// Boosting a rest-frame momentum by the parent's [`boost_vector`]
    /// yields the laboratory-frame momentum.
    ///
    /// [`boost_vector`]: FourMomentum::boost_vector
    pub fn boost(&self, beta: [f64; 3]) -> Self {
        let b2 = beta[0] * beta[0] + beta[1] * beta[1] + beta[2] * beta[2];
        if b2 <= 0.0 {
            return *self;
        }
        let gamma = 1.0 / (1.0 - b2).sqrt();
        let bp = beta[0] * self.px + beta[1] * self.py + beta[2] * self.pz;
        let gamma2 = (gamma - 1.0) / b2;
        let k = gamma2 * bp + gamma * self.e;
        Self {
            px: self.px + k * beta[0],
            py: self.py + k * beta[1],
            pz: self.pz + k * beta[2],
            e: gamma * (self.e + bp),
        }
    }

    /// Uniformly rescale every component
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.px * factor,
            self.py * factor,
            self.pz * factor,
            self.e * factor,
        )
    }
}

impl std::ops::Add for FourMomentum {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(
            self.px + other.px,
            self.py + other.py,
            self.pz + other.pz,
            self.e + other.e,
        )
    }
}

impl std::ops::AddAssign for FourMomentum {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl std::ops::Sub for FourMomentum {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(
            self.px - other.px,
            self.py - other.py,
            self.pz - other.pz,
            self.e - other.e,
        )
    }
}

impl std::fmt::Display for FourMomentum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(px={:.3}, py={:.3}, pz={:.3}, E={:.3})",
            self.px, self.py, self.pz, self.e
        )
    }
}
