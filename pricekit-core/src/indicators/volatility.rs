//! Realized volatility estimators.
//!
//! Every estimator takes a segment whose first bar only supplies the prior
//! close; the remaining bars are the measurement window. Results are
//! annualized with `sqrt(252)`. A segment too short for the estimator
//! yields NaN.

use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;
use std::fmt;
use std::str::FromStr;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Ohlc {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }

    /// All prices finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RvMethod {
    #[default]
    Std,
    Parkinson,
    GarmanKlass,
    HodgesTompkins,
    RogersSatchell,
    YangZhang,
    SquaredReturns,
}

impl RvMethod {
    pub const ALL: [RvMethod; 7] = [
        RvMethod::Std,
        RvMethod::Parkinson,
        RvMethod::GarmanKlass,
        RvMethod::HodgesTompkins,
        RvMethod::RogersSatchell,
        RvMethod::YangZhang,
        RvMethod::SquaredReturns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RvMethod::Std => "std",
            RvMethod::Parkinson => "parkinson",
            RvMethod::GarmanKlass => "garman_klass",
            RvMethod::HodgesTompkins => "hodges_tompkins",
            RvMethod::RogersSatchell => "rogers_satchell",
            RvMethod::YangZhang => "yang_zhang",
            RvMethod::SquaredReturns => "squared_returns",
        }
    }

    /// Annualized volatility of `segment[1..]`.
    pub fn estimate(self, segment: &[Ohlc]) -> f64 {
        if segment.len() < 2 {
            return f64::NAN;
        }
        let bars = &segment[1..];
        let raw = match self {
            RvMethod::Std => sample_std(&log_returns(segment)),
            RvMethod::Parkinson => {
                let sum: f64 = bars.iter().map(|b| (b.high / b.low).ln().powi(2)).sum();
                (sum / (4.0 * bars.len() as f64 * LN_2)).sqrt()
            }
            RvMethod::GarmanKlass => {
                let terms: Vec<f64> = bars
                    .iter()
                    .map(|b| {
                        0.5 * (b.high / b.low).ln().powi(2)
                            - (2.0 * LN_2 - 1.0) * (b.close / b.open).ln().powi(2)
                    })
                    .collect();
                mean(&terms).max(0.0).sqrt()
            }
            RvMethod::HodgesTompkins => {
                let returns = log_returns(segment);
                let n = returns.len() as f64;
                if returns.len() < 2 {
                    f64::NAN
                } else {
                    sample_std(&returns) / (1.0 - 1.0 / n).sqrt()
                }
            }
            RvMethod::RogersSatchell => rogers_satchell_variance(bars).max(0.0).sqrt(),
            RvMethod::YangZhang => yang_zhang(segment),
            RvMethod::SquaredReturns => {
                let squared: Vec<f64> = log_returns(segment).iter().map(|r| r * r).collect();
                mean(&squared).sqrt()
            }
        };
        raw * TRADING_DAYS_PER_YEAR.sqrt()
    }
}

impl fmt::Display for RvMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RvMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "std" => Ok(RvMethod::Std),
            "parkinson" => Ok(RvMethod::Parkinson),
            "garman_klass" | "gk" => Ok(RvMethod::GarmanKlass),
            "hodges_tompkins" | "ht" => Ok(RvMethod::HodgesTompkins),
            "rogers_satchell" | "rs" => Ok(RvMethod::RogersSatchell),
            "yang_zhang" | "yz" => Ok(RvMethod::YangZhang),
            "squared_returns" | "sq" => Ok(RvMethod::SquaredReturns),
            other => Err(format!(
                "unknown volatility method '{other}' (expected one of: {})",
                RvMethod::ALL.map(|m| m.as_str()).join(", ")
            )),
        }
    }
}

pub fn log_returns(segment: &[Ohlc]) -> Vec<f64> {
    segment
        .windows(2)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Standard deviation with one degree of freedom removed.
pub fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

fn rogers_satchell_variance(bars: &[Ohlc]) -> f64 {
    let terms: Vec<f64> = bars
        .iter()
        .map(|b| {
            (b.high / b.close).ln() * (b.high / b.open).ln()
                + (b.low / b.close).ln() * (b.low / b.open).ln()
        })
        .collect();
    mean(&terms)
}

fn yang_zhang(segment: &[Ohlc]) -> f64 {
    let bars = &segment[1..];
    let n = bars.len();
    if n < 2 {
        return f64::NAN;
    }
    let overnight: Vec<f64> = segment
        .windows(2)
        .map(|w| (w[1].open / w[0].close).ln())
        .collect();
    let open_close: Vec<f64> = bars.iter().map(|b| (b.close / b.open).ln()).collect();
    let nf = n as f64;
    let k = 0.34 / (1.34 + (nf + 1.0) / (nf - 1.0));
    let variance = sample_std(&overnight).powi(2)
        + k * sample_std(&open_close).powi(2)
        + (1.0 - k) * rogers_satchell_variance(bars);
    variance.max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn flat_range(n: usize, spread: f64) -> Vec<Ohlc> {
        (0..n)
            .map(|_| Ohlc::new(100.0, 100.0 * spread.exp(), 100.0, 100.0))
            .collect()
    }

    fn growing(n: usize, rate: f64) -> Vec<Ohlc> {
        (0..n)
            .map(|i| {
                let c = 100.0 * rate.powi(i as i32);
                Ohlc::new(c, c * 1.01, c * 0.99, c)
            })
            .collect()
    }

    #[test]
    fn std_of_constant_growth_is_zero() {
        let rv = RvMethod::Std.estimate(&growing(10, 1.01));
        assert_approx(rv, 0.0, 1e-12);
    }

    #[test]
    fn squared_returns_of_constant_growth() {
        let rv = RvMethod::SquaredReturns.estimate(&growing(10, 1.01));
        assert_approx(rv, 1.01f64.ln() * 252f64.sqrt(), DEFAULT_EPSILON);
    }

    #[test]
    fn parkinson_matches_closed_form() {
        let rv = RvMethod::Parkinson.estimate(&flat_range(6, 0.1));
        let expected = (0.01 / (4.0 * LN_2)).sqrt() * 252f64.sqrt();
        assert_approx(rv, expected, DEFAULT_EPSILON);
    }

    #[test]
    fn hodges_tompkins_scales_std() {
        let seg: Vec<Ohlc> = [100.0, 102.0, 99.0, 101.0, 103.0]
            .iter()
            .map(|&c| Ohlc::new(c, c + 1.0, c - 1.0, c))
            .collect();
        let std = RvMethod::Std.estimate(&seg);
        let ht = RvMethod::HodgesTompkins.estimate(&seg);
        assert_approx(ht, std / (1.0 - 1.0 / 4.0f64).sqrt(), DEFAULT_EPSILON);
    }

    #[test]
    fn every_method_is_finite_on_ordinary_data() {
        let seg: Vec<Ohlc> = [100.0, 102.0, 99.0, 101.0, 103.0, 100.5]
            .iter()
            .enumerate()
            .map(|(i, &c)| Ohlc::new(c - 0.5 + i as f64 * 0.1, c + 1.5, c - 1.5, c))
            .collect();
        for method in RvMethod::ALL {
            let rv = method.estimate(&seg);
            assert!(rv.is_finite() && rv >= 0.0, "{method}: {rv}");
        }
    }

    #[test]
    fn single_bar_is_nan() {
        assert!(RvMethod::Std.estimate(&growing(1, 1.0)).is_nan());
    }

    #[test]
    fn aliases_parse() {
        assert_eq!("gk".parse::<RvMethod>().unwrap(), RvMethod::GarmanKlass);
        assert_eq!("HT".parse::<RvMethod>().unwrap(), RvMethod::HodgesTompkins);
        assert_eq!("rs".parse::<RvMethod>().unwrap(), RvMethod::RogersSatchell);
        assert_eq!("yz".parse::<RvMethod>().unwrap(), RvMethod::YangZhang);
        assert_eq!("sq".parse::<RvMethod>().unwrap(), RvMethod::SquaredReturns);
        assert!("ewma".parse::<RvMethod>().is_err());
    }

    #[test]
    fn serializes_canonical_name() {
        assert_eq!(
            serde_json::to_string(&RvMethod::GarmanKlass).unwrap(),
            "\"garman_klass\""
        );
    }
}
