//! Closed-form option valuation and greeks.
//!
//! Stateless Black–Scholes pricing: the caller supplies spot, strike, time to
//! expiry, rate, and volatility; the engine performs no calibration. Puts are
//! priced through put-call parity, so parity holds exactly by construction.

use crate::symbol::OptionType;
use serde::Serialize;
use thiserror::Error;

/// Pricing input outside the model's domain.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PricingError {
    /// Zero or negative time to expiry.
    #[error("time to expiry must be positive, got {0}")]
    NonPositiveExpiry(f64),
    /// Zero or negative volatility.
    #[error("volatility must be positive, got {0}")]
    NonPositiveVolatility(f64),
    /// Zero or negative spot or strike.
    #[error("spot and strike must be positive")]
    NonPositivePrice,
}

/// Option value and sensitivities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionValue {
    /// Theoretical price.
    pub price: f64,
    /// Sensitivity to spot.
    pub delta: f64,
    /// Sensitivity to volatility, per unit of vol.
    pub vega: f64,
    /// Time decay per calendar day.
    pub theta: f64,
}

/// Values an option under the closed-form model.
///
/// # Arguments
/// * `spot` - Current underlying price
/// * `strike` - Option strike price
/// * `t_years` - Time to expiry in years
/// * `rate` - Annualized risk-free rate
/// * `vol` - Implied volatility (e.g. 0.30 for 30%)
/// * `option_type` - Put or call
///
/// # Errors
/// Rejects zero or negative expiry, volatility, spot, or strike, where the
/// `d1`/`d2` terms are undefined.
pub fn value(
    spot: f64,
    strike: f64,
    t_years: f64,
    rate: f64,
    vol: f64,
    option_type: OptionType,
) -> Result<OptionValue, PricingError> {
    if t_years <= 0.0 {
        return Err(PricingError::NonPositiveExpiry(t_years));
    }
    if vol <= 0.0 {
        return Err(PricingError::NonPositiveVolatility(vol));
    }
    if spot <= 0.0 || strike <= 0.0 {
        return Err(PricingError::NonPositivePrice);
    }

    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + (rate + vol * vol / 2.0) * t_years) / (vol * sqrt_t);
    let d2 = d1 - vol * sqrt_t;
    let discounted_strike = strike * (-rate * t_years).exp();

    let call = spot * norm_cdf(d1) - discounted_strike * norm_cdf(d2);
    let (price, delta) = match option_type {
        OptionType::Call => (call, norm_cdf(d1)),
        // Put-call parity: P = C - S + K·e^{-rT}.
        OptionType::Put => (call - spot + discounted_strike, norm_cdf(d1) - 1.0),
    };

    let vega = spot * norm_pdf(d1) * sqrt_t;

    let decay = -spot * norm_pdf(d1) * vol / (2.0 * sqrt_t);
    let annual_theta = match option_type {
        OptionType::Call => decay - rate * discounted_strike * norm_cdf(d2),
        OptionType::Put => decay + rate * discounted_strike * norm_cdf(-d2),
    };

    Ok(OptionValue {
        price,
        delta,
        vega,
        theta: annual_theta / 365.0,
    })
}

/// Pricer carrying configured defaults for rate and implied volatility.
pub struct Pricer {
    /// Risk-free rate (annualized).
    risk_free_rate: f64,
    /// Default implied volatility if not provided.
    default_iv: f64,
}

impl Pricer {
    /// Creates a new pricer.
    ///
    /// # Arguments
    /// * `risk_free_rate` - Annualized risk-free rate (e.g., 0.05 for 5%)
    /// * `default_iv` - Default implied volatility (e.g., 0.30 for 30%)
    #[must_use]
    pub fn new(risk_free_rate: f64, default_iv: f64) -> Self {
        Self {
            risk_free_rate,
            default_iv,
        }
    }

    /// Values an option using the configured rate, and the configured
    /// implied volatility when `iv` is `None`.
    ///
    /// # Errors
    /// Same domain constraints as [`value`].
    pub fn value(
        &self,
        spot: f64,
        strike: f64,
        t_years: f64,
        iv: Option<f64>,
        option_type: OptionType,
    ) -> Result<OptionValue, PricingError> {
        value(
            spot,
            strike,
            t_years,
            self.risk_free_rate,
            iv.unwrap_or(self.default_iv),
            option_type,
        )
    }
}

impl Default for Pricer {
    fn default() -> Self {
        Self::new(0.04, 0.30)
    }
}

/// Standard normal CDF approximation.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
fn norm_pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Error function approximation (Abramowitz–Stegun 7.1.26).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_call_parity() {
        let (spot, strike, t, r, vol) = (100.0, 100.0, 0.25, 0.01, 0.3);
        let call = value(spot, strike, t, r, vol, OptionType::Call).expect("call");
        let put = value(spot, strike, t, r, vol, OptionType::Put).expect("put");
        let parity = spot - strike * (-r * t).exp();
        assert!((call.price - put.price - parity).abs() < 1e-9);
    }

    #[test]
    fn test_atm_call_delta_near_half() {
        let v = value(100.0, 100.0, 30.0 / 365.0, 0.04, 0.2, OptionType::Call).expect("call");
        assert!(v.delta > 0.4 && v.delta < 0.6);
        assert!(v.price > 0.0 && v.price < 10.0);
    }

    #[test]
    fn test_put_delta_is_call_delta_minus_one() {
        let call = value(120.0, 100.0, 0.5, 0.03, 0.25, OptionType::Call).expect("call");
        let put = value(120.0, 100.0, 0.5, 0.03, 0.25, OptionType::Put).expect("put");
        assert!((put.delta - (call.delta - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_vega_shared_and_positive() {
        let call = value(100.0, 110.0, 0.25, 0.02, 0.3, OptionType::Call).expect("call");
        let put = value(100.0, 110.0, 0.25, 0.02, 0.3, OptionType::Put).expect("put");
        assert!(call.vega > 0.0);
        assert!((call.vega - put.vega).abs() < 1e-12);
    }

    #[test]
    fn test_theta_is_daily_decay() {
        let v = value(100.0, 100.0, 0.25, 0.01, 0.3, OptionType::Call).expect("call");
        assert!(v.theta < 0.0);
        // An ATM option cannot lose more than a fraction of its value per day.
        assert!(v.theta.abs() < v.price);
    }

    #[test]
    fn test_domain_guards() {
        assert_eq!(
            value(100.0, 100.0, 0.0, 0.01, 0.3, OptionType::Call),
            Err(PricingError::NonPositiveExpiry(0.0))
        );
        assert_eq!(
            value(100.0, 100.0, 0.25, 0.01, -0.1, OptionType::Call),
            Err(PricingError::NonPositiveVolatility(-0.1))
        );
        assert_eq!(
            value(0.0, 100.0, 0.25, 0.01, 0.3, OptionType::Put),
            Err(PricingError::NonPositivePrice)
        );
    }

    #[test]
    fn test_pricer_defaults() {
        let pricer = Pricer::new(0.01, 0.3);
        let explicit = pricer
            .value(100.0, 100.0, 0.25, Some(0.3), OptionType::Call)
            .expect("call");
        let defaulted = pricer
            .value(100.0, 100.0, 0.25, None, OptionType::Call)
            .expect("call");
        assert!((explicit.price - defaulted.price).abs() < 1e-12);
    }
}
