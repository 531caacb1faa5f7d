//! # Analytic Neutrino Solver
//!
//! Sonnenschein's reduction of the dileptonic tt̄ system to one quartic.
//!
//! ## Constraint System
//!
//! For each decay side (lepton ℓ, b-jet b, neutrino ν):
//!
//! ```text
//!   (ℓ + ν)²     = m_W²      ⇒   ℓ·ν = (m_W² - m_ℓ²) / 2
//!   (ℓ + ν + b)² = m_t²      ⇒   b·ν = (m_t² - m_W² - m_b² - 2 b·ℓ) / 2
//! ```
//!
//! Both are linear in ν, so (E_ν, p_z) follow linearly from (p_x, p_y). The
//! massless condition E² = |p|² then leaves a conic in the transverse plane:
//!
//! ```text
//!   A x² + B x y + C y² + D x + E y + F = 0
//! ```
//!
//! The anti-neutrino gives a second conic in (q_x, q_y); with q_T = MET - p_T
//! it becomes a conic in (x, y) too. Eliminating y by the Sylvester resultant
//! of the two quadratics in y gives a quartic in x:
//!
//! ```text
//!   Res(x) = (a₂b₀ - a₀b₂)² - (a₂b₁ - a₁b₂)(a₁b₀ - a₀b₁)
//! ```
//!
//! Every real root x is back-substituted for y, then for E and p_z on both
//! sides. Solutions are accepted only if they reproduce all four masses.
//!
//! Everything is computed in units of the top mass so that the quartic's
//! coefficients are of order one.

pub mod polynomial;

use crate::config::{NumericalTolerances, PhysicsConstants, ReconstructionConfig};
use crate::kinematics::{FourMomentum, MissingTransverseMomentum};
use polynomial::{quartic_real_roots, Polynomial, QuarticDegeneracy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single solve produced no candidates at all
///
/// Always recovered by the caller as "zero solutions"; never surfaced.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericalDegeneracy {
    #[error("lepton and jet are collinear in (E, p_z): linear system is singular")]
    SingularLinearSystem,
    #[error("quartic leading coefficient vanishes")]
    VanishingLeadingCoefficient,
    #[error("non-finite polynomial coefficients")]
    NonFiniteCoefficients,
}

impl From<QuarticDegeneracy> for NumericalDegeneracy {
    fn from(d: QuarticDegeneracy) -> Self {
        match d {
            QuarticDegeneracy::NonFinite => NumericalDegeneracy::NonFiniteCoefficients,
            QuarticDegeneracy::VanishingLeading => NumericalDegeneracy::VanishingLeadingCoefficient,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT & OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// One decay side: the charged lepton and the b-jet assigned to it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecaySide {
    pub lepton: FourMomentum,
    pub jet: FourMomentum,
}

impl DecaySide {
    pub fn new(lepton: FourMomentum, jet: FourMomentum) -> Self {
        Self { lepton, jet }
    }

    /// Reconstructed (anti-)top for a given (anti-)neutrino
    pub fn top(&self, neutrino: &FourMomentum) -> FourMomentum {
        self.lepton + self.jet + *neutrino
    }

    fn scaled(&self, factor: f64) -> Self {
        Self::new(self.lepton.scaled(factor), self.jet.scaled(factor))
    }
}

/// A (neutrino, anti-neutrino) pair satisfying the constraint system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeutrinoSolution {
    /// Neutrino from the top (pairs with the anti-lepton)
    pub neutrino: FourMomentum,
    /// Anti-neutrino from the anti-top (pairs with the lepton)
    pub anti_neutrino: FourMomentum,
    /// Position of the generating root among the accepted ones
    pub root_index: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINEAR PARAMETRISATION & CONICS
// ═══════════════════════════════════════════════════════════════════════════════

/// E and p_z of a neutrino as affine functions of (p_x, p_y)
#[derive(Debug, Clone, Copy)]
struct LinearNeutrino {
    /// E = α₀ + αₓ x + α_y y
    alpha: [f64; 3],
    /// p_z = β₀ + βₓ x + β_y y
    beta: [f64; 3],
}

impl LinearNeutrino {
    fn derive(side: &DecaySide, w_mass2: f64, top_mass2: f64, degeneracy: f64) -> Result<Self, NumericalDegeneracy> {
        let l = &side.lepton;
        let b = &side.jet;
        let a1 = (w_mass2 - l.mass_squared()) / 2.0;
        let a2 = (top_mass2 - w_mass2 - b.mass_squared() - 2.0 * b.dot(l)) / 2.0;

        // [E_ℓ  -p_zℓ] [E  ]   [a1 + p_xℓ x + p_yℓ y]
        // [E_b  -p_zb] [p_z] = [a2 + p_xb x + p_yb y]
        let det = l.pz * b.e - l.e * b.pz;
        if !det.is_finite() || det.abs() <= degeneracy * l.e * b.e {
            return Err(NumericalDegeneracy::SingularLinearSystem);
        }
        Ok(Self {
            alpha: [
                (l.pz * a2 - b.pz * a1) / det,
                (l.pz * b.px - b.pz * l.px) / det,
                (l.pz * b.py - b.pz * l.py) / det,
            ],
            beta: [
                (l.e * a2 - b.e * a1) / det,
                (l.e * b.px - b.e * l.px) / det,
                (l.e * b.py - b.e * l.py) / det,
            ],
        })
    }

    fn energy(&self, x: f64, y: f64) -> f64 {
        self.alpha[0] + self.alpha[1] * x + self.alpha[2] * y
    }

    fn pz(&self, x: f64, y: f64) -> f64 {
        self.beta[0] + self.beta[1] * x + self.beta[2] * y
    }

    fn momentum(&self, x: f64, y: f64) -> FourMomentum {
        FourMomentum::new(x, y, self.pz(x, y), self.energy(x, y))
    }

    /// E² - p_x² - p_y² - p_z² = 0 as a conic in (x, y)
    fn mass_shell_conic(&self) -> Conic {
        let [a0, ax, ay] = self.alpha;
        let [b0, bx, by] = self.beta;
        Conic {
            a: ax * ax - 1.0 - bx * bx,
            b: 2.0 * (ax * ay - bx * by),
            c: ay * ay - 1.0 - by * by,
            d: 2.0 * (a0 * ax - b0 * bx),
            e: 2.0 * (a0 * ay - b0 * by),
            f: a0 * a0 - b0 * b0,
        }
    }
}

/// A x² + B x y + C y² + D x + E y + F = 0
#[derive(Debug, Clone, Copy)]
struct Conic {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Conic {
    fn eval(&self, x: f64, y: f64) -> f64 {
        self.a * x * x + self.b * x * y + self.c * y * y + self.d * x + self.e * y + self.f
    }

    /// The same locus expressed in p when evaluated at q = (ex - pₓ, ey - p_y)
    fn reflected(&self, ex: f64, ey: f64) -> Self {
        Self {
            a: self.a,
            b: self.b,
            c: self.c,
            d: -2.0 * self.a * ex - self.b * ey - self.d,
            e: -self.b * ex - 2.0 * self.c * ey - self.e,
            f: self.a * ex * ex
                + self.b * ex * ey
                + self.c * ey * ey
                + self.d * ex
                + self.e * ey
                + self.f,
        }
    }

    /// Coefficients (of y², y¹, y⁰) as polynomials in x
    fn in_y(&self) -> [Polynomial; 3] {
        [
            Polynomial::constant(self.c),
            Polynomial::new(vec![self.e, self.b]),
            Polynomial::new(vec![self.f, self.d, self.a]),
        ]
    }

    /// Real y values on the conic at fixed x
    fn y_at(&self, x: f64) -> Vec<f64> {
        let qa = self.c;
        let qb = self.b * x + self.e;
        let qc = (self.a * x + self.d) * x + self.f;
        if qa.abs() <= 1e-14 * (qb.abs() + qc.abs()) {
            return if qb != 0.0 { vec![-qc / qb] } else { Vec::new() };
        }
        // A tangent intersection may leave a slightly negative discriminant
        let disc = (qb * qb - 4.0 * qa * qc).max(0.0).sqrt();
        let q = -0.5 * (qb + qb.signum() * disc);
        let mut ys = vec![q / qa];
        if q != 0.0 {
            ys.push(qc / q);
        }
        ys
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Closed-form solver for the two neutrino momenta
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeutrinoSolver {
    physics: PhysicsConstants,
    tolerances: NumericalTolerances,
}

impl Default for NeutrinoSolver {
    fn default() -> Self {
        Self::new(PhysicsConstants::default(), NumericalTolerances::default())
    }
}

impl NeutrinoSolver {
    pub fn new(physics: PhysicsConstants, tolerances: NumericalTolerances) -> Self {
        Self {
            physics,
            tolerances,
        }
    }

    pub fn from_config(config: &ReconstructionConfig) -> Self {
        Self::new(config.physics, config.tolerances)
    }

    pub fn physics(&self) -> &PhysicsConstants {
        &self.physics
    }

    /// Solve for all physical neutrino pairs
    ///
    /// `top_side` holds the anti-lepton and the jet assigned to the top,
    /// `anti_top_side` the lepton and the jet assigned to the anti-top.
    /// Returns zero to four solutions; degenerate configurations give none.
    pub fn solve(
        &self,
        top_side: &DecaySide,
        anti_top_side: &DecaySide,
        met: &MissingTransverseMomentum,
    ) -> Vec<NeutrinoSolution> {
        match self.try_solve(top_side, anti_top_side, met) {
            Ok(solutions) => solutions,
            Err(degeneracy) => {
                log::trace!("neutrino solve skipped: {}", degeneracy);
                Vec::new()
            }
        }
    }

    /// Like [`solve`](Self::solve) but reports why nothing could be attempted
    pub fn try_solve(
        &self,
        top_side: &DecaySide,
        anti_top_side: &DecaySide,
        met: &MissingTransverseMomentum,
    ) -> Result<Vec<NeutrinoSolution>, NumericalDegeneracy> {
        let unit = self.physics.top_mass;
        let inv = 1.0 / unit;
        let top_side = top_side.scaled(inv);
        let anti_top_side = anti_top_side.scaled(inv);
        let (ex, ey) = (met.ex * inv, met.ey * inv);

        let w_mass2 = (self.physics.w_mass * inv).powi(2);
        let top_mass2 = 1.0;
        let tol = &self.tolerances;

        let nu = LinearNeutrino::derive(&top_side, w_mass2, top_mass2, tol.degeneracy)?;
        let nubar = LinearNeutrino::derive(&anti_top_side, w_mass2, top_mass2, tol.degeneracy)?;

        let conic_nu = nu.mass_shell_conic();
        let conic_nubar = nubar.mass_shell_conic().reflected(ex, ey);

        let [a2, a1, a0] = conic_nu.in_y();
        let [b2, b1, b0] = conic_nubar.in_y();
        let u = &(&a2 * &b0) - &(&a0 * &b2);
        let v = &(&a2 * &b1) - &(&a1 * &b2);
        let w = &(&a1 * &b0) - &(&a0 * &b1);
        let resultant = &(&u * &u) - &(&v * &w);

        let roots = quartic_real_roots(&resultant, tol.root_imaginary, tol.degeneracy)?;

        let mut solutions = Vec::with_capacity(roots.len());
        for x in roots {
            let Some(y) = Self::common_y(&conic_nu, &conic_nubar, &u, &v, x) else {
                continue;
            };
            let neutrino = nu.momentum(x, y);
            let anti_neutrino = nubar.momentum(ex - x, ey - y);
            if !self.accept(&top_side, &anti_top_side, &neutrino, &anti_neutrino, w_mass2) {
                continue;
            }
            solutions.push(NeutrinoSolution {
                neutrino: neutrino.scaled(unit),
                anti_neutrino: anti_neutrino.scaled(unit),
                root_index: solutions.len(),
            });
        }
        Ok(solutions)
    }

    /// The y shared by both conics at x
    ///
    /// b₂·p - a₂·q is linear in y, which gives y = -u(x)/v(x). Near a zero
    /// of v the roots of the first conic are tried as well; the candidate
    /// that best satisfies both conics wins.
    fn common_y(first: &Conic, second: &Conic, u: &Polynomial, v: &Polynomial, x: f64) -> Option<f64> {
        let mut candidates = first.y_at(x);
        let vx = v.eval(x);
        if vx != 0.0 {
            candidates.push(-u.eval(x) / vx);
        }
        candidates
            .into_iter()
            .filter(|y| y.is_finite())
            .map(|y| (y, first.eval(x, y).abs() + second.eval(x, y).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(y, _)| y)
    }

    /// Physical acceptance in scaled units
    fn accept(
        &self,
        top_side: &DecaySide,
        anti_top_side: &DecaySide,
        neutrino: &FourMomentum,
        anti_neutrino: &FourMomentum,
        w_mass2: f64,
    ) -> bool {
        if !neutrino.is_finite() || !anti_neutrino.is_finite() {
            return false;
        }
        if neutrino.e <= 0.0 || anti_neutrino.e <= 0.0 {
            return false;
        }
        let tol = self.tolerances.constraint;
        let close = |value: f64, target: f64, scale: f64| (value - target).abs() <= tol * scale;

        close(neutrino.mass_squared(), 0.0, w_mass2)
            && close(anti_neutrino.mass_squared(), 0.0, w_mass2)
            && close((top_side.lepton + *neutrino).mass_squared(), w_mass2, w_mass2)
            && close((anti_top_side.lepton + *anti_neutrino).mass_squared(), w_mass2, w_mass2)
            && close(top_side.top(neutrino).mass_squared(), 1.0, 1.0)
            && close(anti_top_side.top(anti_neutrino).mass_squared(), 1.0, 1.0)
    }
}
