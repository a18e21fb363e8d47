use chrono::{DateTime, Utc};

use common::Side;

use crate::gate::TrailingWindow;
use crate::warmup::WarmupBuffer;

/// Everything one symbol's monitor remembers between cycles.
/// Owned by that monitor task; nothing else writes it.
#[derive(Debug)]
pub struct SymbolState {
    pub symbol: String,
    pub trailing: TrailingWindow,
    pub warmup: WarmupBuffer,
    last_fired: Option<(Side, DateTime<Utc>)>,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, sticky_confirms: usize) -> Self {
        Self {
            symbol: symbol.into(),
            trailing: TrailingWindow::new(sticky_confirms),
            warmup: WarmupBuffer::default(),
            last_fired: None,
        }
    }

    pub fn record_fire(&mut self, side: Side, at: DateTime<Utc>) {
        self.last_fired = Some((side, at));
    }

    pub fn last_fired_side(&self) -> Option<Side> {
        self.last_fired.map(|(side, _)| side)
    }

    pub fn last_fired_time(&self) -> Option<DateTime<Utc>> {
        self.last_fired.map(|(_, at)| at)
    }
}
