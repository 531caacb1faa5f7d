//! Real polynomials and quartic root finding
//!
//! Roots of the quartic come from Ferrari's closed form evaluated in complex
//! arithmetic, then polished with a few Newton steps on the original
//! polynomial. Only roots whose imaginary part is within tolerance are
//! reported as real.

use num_complex::Complex64;
use std::ops::{Add, Mul, Sub};

/// Polynomial with real coefficients, stored in ascending powers
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Create from ascending coefficients: `c[0] + c[1] x + c[2] x² + …`
    pub fn new(coeffs: Vec<f64>) -> Self {
        if coeffs.is_empty() {
            return Self { coeffs: vec![0.0] };
        }
        Self { coeffs }
    }

    pub fn constant(c: f64) -> Self {
        Self::new(vec![c])
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Nominal degree (length of the coefficient vector minus one)
    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Coefficient of x^k, zero beyond the nominal degree
    pub fn coeff(&self, k: usize) -> f64 {
        self.coeffs.get(k).copied().unwrap_or(0.0)
    }

    /// Largest coefficient magnitude
    pub fn max_abs_coeff(&self) -> f64 {
        self.coeffs.iter().fold(0.0_f64, |m, c| m.max(c.abs()))
    }

    /// Horner evaluation
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;
    fn add(self, other: Self) -> Polynomial {
        let n = self.coeffs.len().max(other.coeffs.len());
        Polynomial::new((0..n).map(|k| self.coeff(k) + other.coeff(k)).collect())
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;
    fn sub(self, other: Self) -> Polynomial {
        let n = self.coeffs.len().max(other.coeffs.len());
        Polynomial::new((0..n).map(|k| self.coeff(k) - other.coeff(k)).collect())
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;
    fn mul(self, other: Self) -> Polynomial {
        let mut out = vec![0.0; self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Polynomial::new(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLOSED-FORM ROOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// All three roots of the monic cubic z³ + b z² + c z + d
fn monic_cubic_roots(b: f64, c: f64, d: f64) -> [Complex64; 3] {
    // Depressed form t³ + p t + q with z = t - b/3
    let shift = -b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;

    let disc = Complex64::new(q * q / 4.0 + p * p * p / 27.0, 0.0).sqrt();
    let half_q = Complex64::new(-q / 2.0, 0.0);
    // Larger branch keeps the cube root away from cancellation
    let u3 = if (half_q + disc).norm() >= (half_q - disc).norm() {
        half_q + disc
    } else {
        half_q - disc
    };
    if u3.norm() == 0.0 {
        let z = Complex64::new(shift, 0.0);
        return [z, z, z];
    }
    let u = u3.powf(1.0 / 3.0);
    let omega = Complex64::new(-0.5, 3.0_f64.sqrt() / 2.0);
    let mut roots = [Complex64::new(0.0, 0.0); 3];
    let mut uk = u;
    for root in roots.iter_mut() {
        *root = uk - p / (3.0 * uk) + shift;
        uk *= omega;
    }
    roots
}

/// All four roots of a₄x⁴ + a₃x³ + a₂x² + a₁x + a₀ (Ferrari), a₄ ≠ 0
///
/// `coeffs` are ascending: `[a₀, a₁, a₂, a₃, a₄]`.
pub fn quartic_roots(coeffs: [f64; 5]) -> [Complex64; 4] {
    let lead = coeffs[4];
    let a = coeffs[3] / lead;
    let b = coeffs[2] / lead;
    let c = coeffs[1] / lead;
    let d = coeffs[0] / lead;

    // Depressed quartic y⁴ + p y² + q y + r with x = y - a/4
    let shift = -a / 4.0;
    let a2 = a * a;
    let p = b - 3.0 * a2 / 8.0;
    let q = c - a * b / 2.0 + a2 * a / 8.0;
    let r = d - a * c / 4.0 + a2 * b / 16.0 - 3.0 * a2 * a2 / 256.0;

    let scale = 1.0 + p.abs() + r.abs().sqrt();
    let mut ys = [Complex64::new(0.0, 0.0); 4];

    if q.abs() <= 1e-14 * scale * scale.sqrt() {
        // Biquadratic: z = y²
        let disc = Complex64::new(p * p - 4.0 * r, 0.0).sqrt();
        let z1 = (-p + disc) / 2.0;
        let z2 = (-p - disc) / 2.0;
        ys = [z1.sqrt(), -z1.sqrt(), z2.sqrt(), -z2.sqrt()];
    } else {
        // Resolvent m³ + p m² + (p²/4 - r) m - q²/8 = 0; any m ≠ 0 works
        let m = monic_cubic_roots(p, p * p / 4.0 - r, -q * q / 8.0)
            .into_iter()
            .max_by(|x, y| x.norm().total_cmp(&y.norm()))
            .unwrap_or_default();
        let s = (2.0 * m).sqrt();
        let base = -2.0 * p - 2.0 * m;
        let plus = (base - 2.0 * q / s).sqrt();
        let minus = (base + 2.0 * q / s).sqrt();
        ys[0] = (s + plus) / 2.0;
        ys[1] = (s - plus) / 2.0;
        ys[2] = (-s + minus) / 2.0;
        ys[3] = (-s - minus) / 2.0;
    }

    let mut roots = [Complex64::new(0.0, 0.0); 4];
    for (root, y) in roots.iter_mut().zip(ys) {
        *root = polish([d, c, b, a, 1.0], y + shift);
    }
    roots
}

/// Newton refinement of a root of the monic quartic
fn polish(monic: [f64; 5], mut z: Complex64) -> Complex64 {
    for _ in 0..4 {
        let f = (((z + monic[3]) * z + monic[2]) * z + monic[1]) * z + monic[0];
        let df = ((4.0 * z + 3.0 * monic[3]) * z + 2.0 * monic[2]) * z + monic[1];
        if df.norm() == 0.0 || !f.is_finite() {
            break;
        }
        let step = f / df;
        if !step.is_finite() {
            break;
        }
        let next = z - step;
        // Keep the refinement only while it reduces the residual
        let f_next = (((next + monic[3]) * next + monic[2]) * next + monic[1]) * next + monic[0];
        if f_next.norm() >= f.norm() {
            break;
        }
        z = next;
    }
    z
}

/// Why a quartic could not be solved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarticDegeneracy {
    /// Coefficients contain NaN or infinity
    NonFinite,
    /// Leading coefficient negligible: the system is (near) collinear
    VanishingLeading,
}

/// Real roots of a degree-4 polynomial, ascending and de-duplicated
///
/// A root counts as real when |Im z| ≤ `imag_tol`·max(1, |Re z|). The
/// polynomial is degenerate when its x⁴ coefficient is below
/// `degeneracy`·max|coeff|.
pub fn quartic_real_roots(
    poly: &Polynomial,
    imag_tol: f64,
    degeneracy: f64,
) -> Result<Vec<f64>, QuarticDegeneracy> {
    if !poly.is_finite() {
        return Err(QuarticDegeneracy::NonFinite);
    }
    let max = poly.max_abs_coeff();
    if max == 0.0 || poly.coeff(4).abs() <= degeneracy * max || poly.degree() > 4 {
        return Err(QuarticDegeneracy::VanishingLeading);
    }
    let coeffs = [
        poly.coeff(0),
        poly.coeff(1),
        poly.coeff(2),
        poly.coeff(3),
        poly.coeff(4),
    ];

    let mut real: Vec<f64> = quartic_roots(coeffs)
        .into_iter()
        .filter(|z| z.is_finite() && z.im.abs() <= imag_tol * z.re.abs().max(1.0))
        .map(|z| z.re)
        .collect();
    real.sort_by(f64::total_cmp);

    // Conjugate pairs of a double root collapse onto one real value
    let mut merged: Vec<f64> = Vec::with_capacity(real.len());
    for x in real {
        match merged.last() {
            Some(&prev) if (x - prev).abs() <= imag_tol * x.abs().max(1.0) => {}
            _ => merged.push(x),
        }
    }
    merged.truncate(4);
    Ok(merged)
}
