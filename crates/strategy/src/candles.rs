use std::collections::VecDeque;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Candle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
    ];

    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinutes => 300,
            Timeframe::FifteenMinutes => 900,
        }
    }

    fn index(self) -> usize {
        match self {
            Timeframe::OneMinute => 0,
            Timeframe::FiveMinutes => 1,
            Timeframe::FifteenMinutes => 2,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::OneMinute => write!(f, "1m"),
            Timeframe::FiveMinutes => write!(f, "5m"),
            Timeframe::FifteenMinutes => write!(f, "15m"),
        }
    }
}

/// A sealed OHLCV bar. Never mutated after sealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timeframe: Timeframe,
    /// Start of the bucket.
    pub opened_at: DateTime<Utc>,
    /// End of the bucket (exclusive).
    pub sealed_at: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// How many sealed candles to keep per timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleConfig {
    pub retention_1m: usize,
    pub retention_5m: usize,
    pub retention_15m: usize,
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            retention_1m: 500,
            retention_5m: 100,
            retention_15m: 50,
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    start: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bucket {
    fn new(start: i64, price: f64, volume: f64) -> Self {
        Self {
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    fn update(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}

#[derive(Debug)]
struct Series {
    timeframe: Timeframe,
    current: Option<Bucket>,
    history: VecDeque<Candle>,
    retention: usize,
}

impl Series {
    fn new(timeframe: Timeframe, retention: usize) -> Self {
        Self {
            timeframe,
            current: None,
            history: VecDeque::with_capacity(retention.min(1024)),
            retention: retention.max(1),
        }
    }

    fn push(&mut self, price: f64, volume: f64, ts: DateTime<Utc>) -> Option<Candle> {
        let len = self.timeframe.seconds();
        let start = ts.timestamp().div_euclid(len) * len;

        match self.current.as_mut() {
            None => {
                self.current = Some(Bucket::new(start, price, volume));
                None
            }
            Some(bucket) if bucket.start == start => {
                bucket.update(price, volume);
                None
            }
            Some(bucket) if bucket.start < start => {
                let finished = std::mem::replace(bucket, Bucket::new(start, price, volume));
                self.seal(finished)
            }
            Some(_) => {
                trace!(timeframe = %self.timeframe, %ts, "Ignoring late sample for a sealed bucket");
                None
            }
        }
    }

    fn seal(&mut self, bucket: Bucket) -> Option<Candle> {
        let opened_at = Utc.timestamp_opt(bucket.start, 0).single()?;
        let candle = Candle {
            timeframe: self.timeframe,
            opened_at,
            sealed_at: opened_at + Duration::seconds(self.timeframe.seconds()),
            open: bucket.open,
            high: bucket.high,
            low: bucket.low,
            close: bucket.close,
            volume: bucket.volume,
        };
        self.history.push_back(candle.clone());
        while self.history.len() > self.retention {
            self.history.pop_front();
        }
        Some(candle)
    }
}

/// Folds price samples into sealed 1m/5m/15m candles with bounded history.
#[derive(Debug)]
pub struct CandleAggregator {
    series: [Series; 3],
}

impl CandleAggregator {
    pub fn new(cfg: &CandleConfig) -> Self {
        Self {
            series: [
                Series::new(Timeframe::OneMinute, cfg.retention_1m),
                Series::new(Timeframe::FiveMinutes, cfg.retention_5m),
                Series::new(Timeframe::FifteenMinutes, cfg.retention_15m),
            ],
        }
    }

    /// Add one sample. Returns the candles sealed by it, shortest timeframe
    /// first. Non-positive or non-finite prices are dropped.
    pub fn push(&mut self, price: f64, volume: f64, ts: DateTime<Utc>) -> Vec<Candle> {
        if !(price.is_finite() && price > 0.0) {
            trace!(price, "Rejected malformed price sample");
            return Vec::new();
        }
        let volume = if volume.is_finite() && volume >= 0.0 { volume } else { 0.0 };
        self.series
            .iter_mut()
            .filter_map(|s| s.push(price, volume, ts))
            .collect()
    }

    /// Most recently sealed candle.
    pub fn latest(&self, tf: Timeframe) -> Option<&Candle> {
        self.series[tf.index()].history.back()
    }

    /// The sealed candle before `latest`.
    pub fn previous(&self, tf: Timeframe) -> Option<&Candle> {
        let history = &self.series[tf.index()].history;
        history.len().checked_sub(2).and_then(|i| history.get(i))
    }

    pub fn len(&self, tf: Timeframe) -> usize {
        self.series[tf.index()].history.len()
    }

    pub fn is_empty(&self, tf: Timeframe) -> bool {
        self.len(tf) == 0
    }

    /// Sealed candles, oldest first.
    pub fn history(&self, tf: Timeframe) -> impl Iterator<Item = &Candle> {
        self.series[tf.index()].history.iter()
    }
}
