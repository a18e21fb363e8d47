use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Side;

/// Confidence strictly above this is a long call.
pub const LONG_THRESHOLD: f64 = 0.7;
/// Confidence strictly below this is a short call.
pub const SHORT_THRESHOLD: f64 = 0.3;

/// Map a normalized confidence onto a direction. Boundary values are not
/// directional.
pub fn classify(confidence: f64) -> Option<Side> {
    classify_with(confidence, LONG_THRESHOLD, SHORT_THRESHOLD)
}

pub fn classify_with(confidence: f64, long_above: f64, short_below: f64) -> Option<Side> {
    if confidence > long_above {
        Some(Side::Long)
    } else if confidence < short_below {
        Some(Side::Short)
    } else {
        None
    }
}

/// Terminal result of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    TargetHit,
    StopHit,
    TimeExpired,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::TargetHit => write!(f, "TARGET_HIT"),
            Outcome::StopHit => write!(f, "STOP_HIT"),
            Outcome::TimeExpired => write!(f, "TIME_EXPIRED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    #[default]
    Confirmed,
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalStatus::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}

/// How far target and stop sit from the entry price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Offsets {
    /// Fractions of the entry price, e.g. 0.02 / 0.01.
    Percent { target: f64, stop: f64 },
    /// Absolute price distances, e.g. 2×ATR / 1×ATR.
    Absolute { target: f64, stop: f64 },
}

impl Offsets {
    pub fn from_volatility(atr: f64) -> Self {
        Offsets::Absolute {
            target: 2.0 * atr,
            stop: atr,
        }
    }

    /// (target_price, stop_price) for an entry on `side`.
    pub fn levels(self, side: Side, entry_price: f64) -> (f64, f64) {
        let sign = side.sign();
        match self {
            Offsets::Percent { target, stop } => (
                entry_price * (1.0 + sign * target),
                entry_price * (1.0 - sign * stop),
            ),
            Offsets::Absolute { target, stop } => {
                (entry_price + sign * target, entry_price - sign * stop)
            }
        }
    }
}

impl Default for Offsets {
    fn default() -> Self {
        Offsets::Percent {
            target: 0.02,
            stop: 0.01,
        }
    }
}

/// One confirmed trading call.
///
/// Target and stop are fixed at construction. `resolve` is the only
/// mutator: it sets outcome, exit price and exit time together, and does
/// nothing once an outcome exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEntry {
    id: Uuid,
    symbol: String,
    side: Side,
    confidence: f64,
    rationale: String,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    target_price: f64,
    stop_price: f64,
    hold_minutes: i64,
    status: SignalStatus,
    exit_price: Option<f64>,
    exit_time: Option<DateTime<Utc>>,
    outcome: Option<Outcome>,
}

impl SignalEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        confidence: f64,
        rationale: impl Into<String>,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        offsets: Offsets,
        hold: Duration,
    ) -> Self {
        let (target_price, stop_price) = offsets.levels(side, entry_price);
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            confidence,
            rationale: rationale.into(),
            entry_price,
            entry_time,
            target_price,
            stop_price,
            hold_minutes: hold.num_minutes(),
            status: SignalStatus::Confirmed,
            exit_price: None,
            exit_time: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn target_price(&self) -> f64 {
        self.target_price
    }

    pub fn stop_price(&self) -> f64 {
        self.stop_price
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::minutes(self.hold_minutes)
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    pub fn exit_time(&self) -> Option<DateTime<Utc>> {
        self.exit_time
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// The outcome `price` at `now` would produce, without mutating.
    /// `None` means the signal is still pending.
    pub fn evaluate(&self, price: f64, now: DateTime<Utc>) -> Option<Outcome> {
        let (hit_target, hit_stop) = match self.side {
            Side::Long => (price >= self.target_price, price <= self.stop_price),
            Side::Short => (price <= self.target_price, price >= self.stop_price),
        };
        if hit_target {
            Some(Outcome::TargetHit)
        } else if hit_stop {
            Some(Outcome::StopHit)
        } else if now - self.entry_time > self.hold_duration() {
            Some(Outcome::TimeExpired)
        } else {
            None
        }
    }

    /// Assign a terminal outcome if `price` at `now` warrants one.
    ///
    /// Returns the outcome assigned by this call. An already resolved entry
    /// is left untouched and `None` is returned.
    pub fn resolve(&mut self, price: f64, now: DateTime<Utc>) -> Option<Outcome> {
        if self.outcome.is_some() {
            return None;
        }
        let outcome = self.evaluate(price, now)?;
        self.outcome = Some(outcome);
        self.exit_price = Some(price);
        self.exit_time = Some(now);
        Some(outcome)
    }
}
