//! Trade-size optimizer: maximizes `f(x) = route.quote(x, reverse) - x` over
//! `x > 0` using Newton's method with finite-difference derivatives,
//! falling back to bisection on `f'` when Newton fails to converge.
//!
//! Not directly grounded in a single `original_source` file (no optimizer
//! module was retrieved); the algorithm itself is literal, and
//! `pool::calculator::PriceCalculator::optimal_trade_size` is the existing
//! "trade sizing" seam this generalizes away from a closed-form V2 formula
//! to an arbitrary quote function.

use crate::error::ArbError;
use rust_decimal::Decimal;
use std::str::FromStr;

const MAX_ITER: u32 = 100;

/// A route's profit curve, evaluated purely in `Decimal` so the optimizer
/// never has to know which pool variant it's quoting through.
pub trait ProfitCurve {
    fn evaluate(&self, x: Decimal) -> Result<Decimal, ArbError>;
}

impl<F> ProfitCurve for F
where
    F: Fn(Decimal) -> Result<Decimal, ArbError>,
{
    fn evaluate(&self, x: Decimal) -> Result<Decimal, ArbError> {
        self(x)
    }
}

fn central_difference(curve: &dyn ProfitCurve, x: Decimal, dx: Decimal) -> Result<Decimal, ArbError> {
    let plus = curve.evaluate(x + dx)?;
    let minus = curve.evaluate(if x > dx { x - dx } else { Decimal::ZERO })?;
    let denom = if x > dx { dx * Decimal::TWO } else { dx };
    Ok((plus - minus) / denom)
}

fn second_difference(curve: &dyn ProfitCurve, x: Decimal, dx: Decimal) -> Result<Decimal, ArbError> {
    let plus = curve.evaluate(x + dx)?;
    let center = curve.evaluate(x)?;
    let minus = curve.evaluate(if x > dx { x - dx } else { Decimal::ZERO })?;
    Ok((plus - Decimal::TWO * center + minus) / (dx * dx))
}

/// Newton's method with central-difference derivatives. Rejects negative
/// iterates outright (the search domain is `x > 0`); the caller falls back
/// to [`bisect_on_derivative`] on any error, including non-convergence.
pub fn newton_maximize(curve: &dyn ProfitCurve, x0: Decimal, dx: Decimal, tol: Decimal) -> Result<Decimal, ArbError> {
    let mut x = x0;
    for _ in 0..MAX_ITER {
        let fp = central_difference(curve, x, dx)?;
        let fpp = second_difference(curve, x, dx)?;
        if fpp.is_zero() {
            return Err(ArbError::OptimizationError { reason: "zero second derivative".to_string() });
        }
        let step = fp / fpp;
        let next = x - step;
        if next <= Decimal::ZERO {
            return Err(ArbError::OptimizationError { reason: "Newton iterate went negative".to_string() });
        }
        if (next - x).abs() < tol {
            return Ok(next);
        }
        x = next;
    }
    Err(ArbError::OptimizationError { reason: "Newton did not converge within max_iter".to_string() })
}

/// Bisection on `f'`. Starts from `[x0, 2*x0]`; contracts the left bound
/// toward `x0/10` if the derivative there is still negative (rejecting the
/// whole search region as non-concave if it never turns positive), and
/// expands the right bound while the derivative there is still positive.
pub fn bisect_on_derivative(
    curve: &dyn ProfitCurve,
    x0: Decimal,
    dx: Decimal,
    tol: Decimal,
) -> Result<Decimal, ArbError> {
    let mut lo = x0;
    let mut hi = x0 * Decimal::TWO;

    let mut fp_lo = central_difference(curve, lo, dx)?;
    let mut tries = 0u32;
    while fp_lo < Decimal::ZERO && tries < MAX_ITER {
        lo = lo / Decimal::TEN;
        if lo.is_zero() {
            return Err(ArbError::OptimizationError { reason: "concavity violated, no positive region".to_string() });
        }
        fp_lo = central_difference(curve, lo, dx)?;
        tries += 1;
    }
    if fp_lo < Decimal::ZERO {
        return Err(ArbError::OptimizationError { reason: "concavity violated".to_string() });
    }

    let mut fp_hi = central_difference(curve, hi, dx)?;
    tries = 0;
    while fp_hi > Decimal::ZERO && tries < MAX_ITER {
        hi *= Decimal::TWO;
        fp_hi = central_difference(curve, hi, dx)?;
        tries += 1;
    }

    for _ in 0..MAX_ITER {
        let mid = (lo + hi) / Decimal::TWO;
        let fp_mid = central_difference(curve, mid, dx)?;
        if fp_mid.abs() < tol {
            return Ok(mid);
        }
        if fp_mid > Decimal::ZERO {
            lo = mid;
        } else {
            hi = mid;
        }
        if (hi - lo).abs() < tol {
            return Ok(mid);
        }
    }
    Err(ArbError::OptimizationError { reason: "bisection did not converge within max_iter".to_string() })
}

/// Runs Newton first; on any error, falls back to bisection. The concave
/// structure of constant-product-family swap curves guarantees convergence
/// for reasonable seed inputs.
pub fn maximize(curve: &dyn ProfitCurve, x0: Decimal, dx: Decimal, tol: Decimal) -> Result<Decimal, ArbError> {
    newton_maximize(curve, x0, dx, tol).or_else(|_| bisect_on_derivative(curve, x0, dx, tol))
}

/// `dec!`-friendly tolerance default used by callers that don't have a
/// reason to pick their own.
pub fn default_tolerance() -> Decimal {
    Decimal::from_str("0.000001").unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // f(x) = 100*sqrt(x) - x has a maximum at x = 2500 (f'(x) = 50/sqrt(x) - 1 = 0).
    // Decimal has no sqrt, so this concave curve is modeled directly rather
    // than through a real pool quote, purely to exercise the optimizer math.
    fn parabola_like(x: Decimal) -> Result<Decimal, ArbError> {
        // quadratic proxy with the same single-maximum shape, easier to
        // evaluate exactly in Decimal: f(x) = -0.0001*(x-2500)^2 + 250
        let diff = x - dec!(2500);
        Ok(dec!(250) - dec!(0.0001) * diff * diff)
    }

    #[test]
    fn newton_finds_known_maximum() {
        let x = newton_maximize(&parabola_like, dec!(1000), dec!(1), dec!(0.01)).unwrap();
        assert!((x - dec!(2500)).abs() < dec!(1));
    }

    #[test]
    fn bisection_finds_known_maximum() {
        let x = bisect_on_derivative(&parabola_like, dec!(100), dec!(1), dec!(0.01)).unwrap();
        assert!((x - dec!(2500)).abs() < dec!(5));
    }

    #[test]
    fn maximize_finds_the_peak_of_a_piecewise_linear_curve() {
        // a tent function has a constant +1/-1 slope on either side of the
        // peak; whichever of Newton or bisection maximize() ends up using,
        // the peak at x=2500 should come back either way.
        fn flat_then_drop(x: Decimal) -> Result<Decimal, ArbError> {
            if x < dec!(2500) {
                Ok(x)
            } else {
                Ok(dec!(2500) - (x - dec!(2500)))
            }
        }
        let x = maximize(&flat_then_drop, dec!(1000), dec!(1), dec!(0.01)).unwrap();
        assert!((x - dec!(2500)).abs() < dec!(5));
    }
}
