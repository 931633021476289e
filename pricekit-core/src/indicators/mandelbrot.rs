//! Mandelbrot (rescaled-range) price channel.
//!
//! Log returns of each symbol are cut into non-overlapping windows of
//! `trading_days`, anchored at the latest bar; a partial window at the old
//! end is dropped. For every window:
//!
//!   Z_t = cumulative sum of (r_t - mean r)
//!   R   = max Z - min Z
//!   S   = sample std of r
//!   R/S = R / S            (undefined when S = 0)
//!
//! Channel width is `RS * S_latest`, where `RS` comes from the latest window
//! or an aggregate over windows whose realized volatility falls in the same
//! quartile as the latest window's. The recent price sits inside the channel
//! at the position the latest window's `Z` path implies:
//!
//!   p      = -min Z / R   (0.5 when R = 0)
//!   top    = recent * exp(width * (1 - p))
//!   bottom = recent * exp(-width * p)

use super::volatility::{log_returns, mean, sample_std, Ohlc, RvMethod};
use super::{split_by_symbol, KernelError, SymbolBars};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Smallest usable window, in returns.
pub const MIN_WINDOW: usize = 3;

/// Trailing spans averaged when grouped-mean volatility is requested.
const GROUPED_SPANS: [usize; 6] = [5, 10, 21, 63, 126, 252];

/// How the rescaled range is chosen across windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsMethod {
    #[default]
    #[serde(rename = "RS")]
    Rs,
    #[serde(rename = "RS_min")]
    RsMin,
    #[serde(rename = "RS_max")]
    RsMax,
    #[serde(rename = "RS_mean")]
    RsMean,
}

impl RsMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsMethod::Rs => "RS",
            RsMethod::RsMin => "RS_min",
            RsMethod::RsMax => "RS_max",
            RsMethod::RsMean => "RS_mean",
        }
    }
}

impl fmt::Display for RsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RsMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rs" => Ok(RsMethod::Rs),
            "rs_min" => Ok(RsMethod::RsMin),
            "rs_max" => Ok(RsMethod::RsMax),
            "rs_mean" => Ok(RsMethod::RsMean),
            other => Err(format!(
                "unknown rescaled-range method '{other}' (expected RS, RS_min, RS_max or RS_mean)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelOptions {
    pub trading_days: usize,
    pub rv_adjustment: bool,
    pub rv_method: RvMethod,
    pub rs_method: RsMethod,
    pub rv_grouped_mean: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            trading_days: 21,
            rv_adjustment: true,
            rv_method: RvMethod::Std,
            rs_method: RsMethod::Rs,
            rv_grouped_mean: false,
        }
    }
}

/// One symbol's channel at its latest bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub symbol: String,
    /// Days since the Unix epoch.
    pub date: i32,
    pub bottom: f64,
    pub recent: f64,
    pub top: f64,
    pub windows_used: usize,
}

pub struct ChannelOutput {
    /// `date, symbol, bottom_price, recent_price, top_price`, one row per symbol.
    pub frame: LazyFrame,
    pub windows_used: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy)]
struct WindowStats {
    rs: Option<f64>,
    std: f64,
    min_dev: f64,
    range: f64,
    rv: f64,
}

/// Compute the channel for every symbol in `data`.
///
/// `live_prices` overrides the recent price per symbol; symbols without a
/// positive finite entry use their last close.
pub fn mandelbrot_channel(
    data: LazyFrame,
    options: &ChannelOptions,
    live_prices: &BTreeMap<String, f64>,
) -> Result<ChannelOutput, KernelError> {
    if options.trading_days < MIN_WINDOW {
        return Err(KernelError::Invalid(format!(
            "window of {} trading day(s) is too short; at least {MIN_WINDOW} are needed",
            options.trading_days
        )));
    }

    let series = split_by_symbol(data)?;
    if series.is_empty() {
        return Err(KernelError::Invalid("no usable price rows".into()));
    }

    let channels = series
        .iter()
        .map(|s| symbol_channel(s, options, live_prices.get(&s.symbol).copied()))
        .collect::<Result<Vec<_>, _>>()?;

    let frame = DataFrame::new(vec![
        Column::new("date".into(), channels.iter().map(|c| c.date).collect::<Vec<_>>())
            .cast(&DataType::Date)?,
        Column::new(
            "symbol".into(),
            channels.iter().map(|c| c.symbol.as_str()).collect::<Vec<_>>(),
        ),
        Column::new("bottom_price".into(), channels.iter().map(|c| c.bottom).collect::<Vec<_>>()),
        Column::new("recent_price".into(), channels.iter().map(|c| c.recent).collect::<Vec<_>>()),
        Column::new("top_price".into(), channels.iter().map(|c| c.top).collect::<Vec<_>>()),
    ])?;

    let windows_used = channels
        .iter()
        .map(|c| (c.symbol.clone(), c.windows_used))
        .collect();
    Ok(ChannelOutput {
        frame: frame.lazy(),
        windows_used,
    })
}

pub fn symbol_channel(
    series: &SymbolBars,
    options: &ChannelOptions,
    live_price: Option<f64>,
) -> Result<Channel, KernelError> {
    let n = series.bars.len();
    let len = options.trading_days;
    let count = n.saturating_sub(1) / len;
    if count == 0 {
        return Err(KernelError::InsufficientData {
            symbol: series.symbol.clone(),
            needed: len + 1,
            got: n,
        });
    }

    // stats[0] is the latest window.
    let stats: Vec<WindowStats> = (0..count)
        .map(|j| {
            let end = n - 1 - j * len;
            window_stats(&series.bars[end - len..=end], options)
        })
        .collect();
    let latest = stats[0];

    let kept = if options.rv_adjustment {
        same_quartile(&stats)
    } else {
        stats.clone()
    };
    let rs = select_rs(options.rs_method, &latest, &kept);
    let width = if latest.std.is_finite() { rs * latest.std } else { 0.0 };
    let p = if latest.range > 0.0 {
        -latest.min_dev / latest.range
    } else {
        0.5
    };

    let last = n - 1;
    let recent = live_price
        .filter(|price| price.is_finite() && *price > 0.0)
        .unwrap_or(series.bars[last].close);

    Ok(Channel {
        symbol: series.symbol.clone(),
        date: series.dates[last],
        bottom: recent * (-width * p).exp(),
        recent,
        top: recent * (width * (1.0 - p)).exp(),
        windows_used: kept.len(),
    })
}

fn window_stats(segment: &[Ohlc], options: &ChannelOptions) -> WindowStats {
    let returns = log_returns(segment);
    let m = mean(&returns);

    let mut z = 0.0;
    let (mut min_dev, mut max_dev) = (f64::INFINITY, f64::NEG_INFINITY);
    for r in &returns {
        z += r - m;
        min_dev = min_dev.min(z);
        max_dev = max_dev.max(z);
    }
    let range = max_dev - min_dev;
    let std = sample_std(&returns);

    WindowStats {
        rs: (std > 0.0).then(|| range / std),
        std,
        min_dev,
        range,
        rv: window_rv(segment, options),
    }
}

fn window_rv(segment: &[Ohlc], options: &ChannelOptions) -> f64 {
    let full = options.rv_method.estimate(segment);
    if !options.rv_grouped_mean {
        return full;
    }
    let returns = segment.len() - 1;
    let estimates: Vec<f64> = GROUPED_SPANS
        .iter()
        .filter(|&&span| span <= returns)
        .map(|&span| options.rv_method.estimate(&segment[returns - span..]))
        .filter(|rv| rv.is_finite())
        .collect();
    if estimates.is_empty() {
        full
    } else {
        mean(&estimates)
    }
}

/// Windows whose realized volatility shares the latest window's quartile.
///
/// Quartile of a window = min(3, rank * 4 / k), where rank counts windows
/// with strictly lower volatility and k is the number of ranked windows.
fn same_quartile(stats: &[WindowStats]) -> Vec<WindowStats> {
    if !stats[0].rv.is_finite() {
        return stats.to_vec();
    }
    let ranked: Vec<f64> = stats.iter().map(|w| w.rv).filter(|v| v.is_finite()).collect();
    let k = ranked.len();
    let quartile = |rv: f64| {
        let rank = ranked.iter().filter(|&&other| other < rv).count();
        (rank * 4 / k).min(3)
    };
    let target = quartile(stats[0].rv);
    stats
        .iter()
        .filter(|w| w.rv.is_finite() && quartile(w.rv) == target)
        .copied()
        .collect()
}

fn select_rs(method: RsMethod, latest: &WindowStats, kept: &[WindowStats]) -> f64 {
    let values: Vec<f64> = kept.iter().filter_map(|w| w.rs).collect();
    let picked = match method {
        RsMethod::Rs => latest.rs,
        RsMethod::RsMin => values.iter().copied().reduce(f64::min),
        RsMethod::RsMax => values.iter().copied().reduce(f64::max),
        RsMethod::RsMean => (!values.is_empty()).then(|| mean(&values)),
    };
    picked.unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_frame};

    fn options(trading_days: usize) -> ChannelOptions {
        ChannelOptions {
            trading_days,
            rv_adjustment: false,
            ..ChannelOptions::default()
        }
    }

    fn run(df: DataFrame, options: &ChannelOptions) -> DataFrame {
        mandelbrot_channel(df.lazy(), options, &BTreeMap::new())
            .unwrap()
            .frame
            .collect()
            .unwrap()
    }

    fn value(df: &DataFrame, name: &str, row: usize) -> f64 {
        df.column(name).unwrap().f64().unwrap().get(row).unwrap()
    }

    /// Cumulative-deviation extremes of a close path.
    fn z_extremes(closes: &[f64]) -> (f64, f64) {
        let r: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let m = r.iter().sum::<f64>() / r.len() as f64;
        let mut z = 0.0;
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for x in r {
            z += x - m;
            lo = lo.min(z);
            hi = hi.max(z);
        }
        (lo, hi)
    }

    #[test]
    fn latest_rs_channel_spans_z_extremes() {
        let closes = [100.0, 110.0, 99.0, 108.9];
        let out = run(make_frame("SPY", &closes), &options(3));
        let (lo, hi) = z_extremes(&closes);

        assert_eq!(out.height(), 1);
        assert_approx(value(&out, "recent_price", 0), 108.9, 1e-9);
        assert_approx(value(&out, "top_price", 0), 108.9 * hi.exp(), 1e-9);
        assert_approx(value(&out, "bottom_price", 0), 108.9 * lo.exp(), 1e-9);
    }

    #[test]
    fn constant_growth_collapses_channel() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let out = run(make_frame("SPY", &closes), &options(3));
        let recent = value(&out, "recent_price", 0);
        assert_approx(value(&out, "top_price", 0), recent, 1e-9);
        assert_approx(value(&out, "bottom_price", 0), recent, 1e-9);
    }

    #[test]
    fn incomplete_oldest_window_is_dropped() {
        // 11 bars = 10 returns = three windows of 3 plus one leftover return.
        let closes: Vec<f64> = (0..11).map(|i| 100.0 + (i % 3) as f64).collect();
        let output = mandelbrot_channel(
            make_frame("SPY", &closes).lazy(),
            &options(3),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(output.windows_used["SPY"], 3);
    }

    #[test]
    fn too_few_bars_is_insufficient_data() {
        let err = mandelbrot_channel(
            make_frame("SPY", &[100.0, 101.0, 102.0]).lazy(),
            &options(3),
            &BTreeMap::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            KernelError::InsufficientData { needed: 4, got: 3, .. }
        ));
    }

    #[test]
    fn window_below_three_days_is_rejected() {
        let err = mandelbrot_channel(
            make_frame("SPY", &[100.0, 101.0, 102.0, 103.0]).lazy(),
            &options(2),
            &BTreeMap::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, KernelError::Invalid(_)));
    }

    #[test]
    fn live_price_replaces_last_close() {
        let closes = [100.0, 110.0, 99.0, 108.9];
        let live = BTreeMap::from([("SPY".to_string(), 120.0)]);
        let out = mandelbrot_channel(make_frame("SPY", &closes).lazy(), &options(3), &live)
            .unwrap()
            .frame
            .collect()
            .unwrap();
        let (lo, hi) = z_extremes(&closes);
        assert_approx(value(&out, "recent_price", 0), 120.0, 1e-12);
        assert_approx(value(&out, "top_price", 0), 120.0 * hi.exp(), 1e-9);
        assert_approx(value(&out, "bottom_price", 0), 120.0 * lo.exp(), 1e-9);
    }

    #[test]
    fn one_row_per_symbol() {
        let mut df = make_frame("SPY", &[100.0, 102.0, 99.0, 101.0, 103.0]);
        df.vstack_mut(&make_frame("QQQ", &[50.0, 52.0, 49.0, 51.0])).unwrap();
        let out = run(df, &options(3));
        let symbols: Vec<_> = out.column("symbol").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(symbols, [Some("QQQ"), Some("SPY")]);
    }

    #[test]
    fn rv_adjustment_keeps_latest_quartile() {
        // Eight windows of five returns, each window more volatile than the last.
        let mut closes = vec![100.0];
        for t in 0..40 {
            let amplitude = 0.01 * (1 + t / 5) as f64;
            let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
            let last = *closes.last().unwrap();
            closes.push(last * (sign * amplitude).exp());
        }
        let frame = make_frame("SPY", &closes);

        let plain = mandelbrot_channel(frame.clone().lazy(), &options(5), &BTreeMap::new()).unwrap();
        assert_eq!(plain.windows_used["SPY"], 8);

        let adjusted = ChannelOptions {
            rv_adjustment: true,
            ..options(5)
        };
        let out = mandelbrot_channel(frame.lazy(), &adjusted, &BTreeMap::new()).unwrap();
        assert_eq!(out.windows_used["SPY"], 2);
    }

    #[test]
    fn aggregate_rs_methods_are_ordered() {
        let closes: Vec<f64> = (0..31)
            .map(|i| 100.0 + ((i * 7) % 5) as f64 - ((i * 3) % 4) as f64)
            .collect();
        let frame = make_frame("SPY", &closes);
        let width = |rs_method| {
            let out = run(frame.clone(), &ChannelOptions { rs_method, ..options(5) });
            value(&out, "top_price", 0).ln() - value(&out, "bottom_price", 0).ln()
        };
        let (min, mean, max) = (width(RsMethod::RsMin), width(RsMethod::RsMean), width(RsMethod::RsMax));
        assert!(min <= mean + 1e-12);
        assert!(mean <= max + 1e-12);
    }

    #[test]
    fn grouped_mean_changes_only_volatility_ranking() {
        let closes: Vec<f64> = (0..64).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let grouped = ChannelOptions {
            rv_grouped_mean: true,
            rv_adjustment: true,
            ..options(21)
        };
        let output = mandelbrot_channel(
            make_frame("SPY", &closes).lazy(),
            &grouped,
            &BTreeMap::new(),
        )
        .unwrap();
        let used = output.windows_used["SPY"];
        assert!((1..=3).contains(&used));
    }

    #[test]
    fn rs_method_names() {
        assert_eq!("rs_mean".parse::<RsMethod>().unwrap(), RsMethod::RsMean);
        assert_eq!(serde_json::to_string(&RsMethod::RsMin).unwrap(), "\"RS_min\"");
        assert!("hurst".parse::<RsMethod>().is_err());
    }
}
