//! Normal-mode firing gate: debounce window, same-side suppression,
//! minimum hold between fires, and the per-(symbol, side) cooldown.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use common::Side;

use crate::state::SymbolState;

/// Bounded FIFO of the most recent observed directions, NONE included.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    capacity: usize,
    items: VecDeque<Option<Side>>,
}

impl TrailingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append, discarding the oldest entry on overflow.
    pub fn push(&mut self, direction: Option<Side>) {
        self.items.push_back(direction);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    /// True when the window is full and every entry equals `side`.
    pub fn is_unanimous(&self, side: Side) -> bool {
        self.items.len() == self.capacity && self.items.iter().all(|d| *d == Some(side))
    }

    pub fn to_vec(&self) -> Vec<Option<Side>> {
        self.items.iter().copied().collect()
    }
}

/// Would `new` complete a run of `k` identical directions on top of `prior`?
pub fn is_sticky(prior: &[Option<Side>], new: Option<Side>, k: usize) -> bool {
    let Some(side) = new else {
        return false;
    };
    let need = k.saturating_sub(1);
    if prior.len() < need {
        return false;
    }
    prior[prior.len() - need..].iter().all(|d| *d == Some(side))
}

/// True when no fire happened yet or at least `min_hold` has passed since.
pub fn hold_elapsed(
    last_fired: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    min_hold: Duration,
) -> bool {
    last_fired.map_or(true, |at| now - at >= min_hold)
}

/// Last cooldown hit per (symbol, side), one exclusive section per symbol.
#[derive(Debug)]
pub struct CooldownTable {
    window: Duration,
    slots: HashMap<String, Mutex<HashMap<Side, DateTime<Utc>>>>,
}

impl CooldownTable {
    pub fn new<I, S>(symbols: I, window: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            window,
            slots: symbols
                .into_iter()
                .map(|s| (s.into(), Mutex::new(HashMap::new())))
                .collect(),
        }
    }

    /// Atomic check-and-set: allowed when `side` was not hit on `symbol`
    /// within the window, in which case `now` is recorded.
    /// Unknown symbols are never allowed.
    pub async fn try_acquire(&self, symbol: &str, side: Side, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.slots.get(symbol) else {
            warn!(symbol, "Cooldown requested for unwatched symbol");
            return false;
        };
        let mut hits = slot.lock().await;
        match hits.get(&side) {
            Some(last) if now - *last <= self.window => false,
            _ => {
                hits.insert(side, now);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    NoDirection,
    NotSticky,
    SameAsLastFired,
    HoldActive,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Fire(Side),
    Blocked(BlockReason),
}

/// Decides whether the current observation may fire.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub min_hold: Duration,
}

impl Gate {
    /// Record `direction` in the trailing window, then evaluate all gates.
    ///
    /// Once direction, debounce and same-side checks pass, both the hold and
    /// the cooldown gate are evaluated; the cooldown is recorded even when
    /// the hold gate blocks the fire.
    pub async fn decide(
        &self,
        state: &mut SymbolState,
        direction: Option<Side>,
        cooldowns: &CooldownTable,
        now: DateTime<Utc>,
    ) -> GateDecision {
        state.trailing.push(direction);

        let Some(side) = direction else {
            return GateDecision::Blocked(BlockReason::NoDirection);
        };
        if !state.trailing.is_unanimous(side) {
            return GateDecision::Blocked(BlockReason::NotSticky);
        }
        if state.last_fired_side() == Some(side) {
            return GateDecision::Blocked(BlockReason::SameAsLastFired);
        }

        let hold_ok = hold_elapsed(state.last_fired_time(), now, self.min_hold);
        let cooldown_ok = cooldowns.try_acquire(&state.symbol, side, now).await;

        match (hold_ok, cooldown_ok) {
            (true, true) => GateDecision::Fire(side),
            (false, _) => GateDecision::Blocked(BlockReason::HoldActive),
            (true, false) => GateDecision::Blocked(BlockReason::Cooldown),
        }
    }
}
