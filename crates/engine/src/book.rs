use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use common::{Error, Outcome, Result, SignalEntry, SignalStatus};

/// Shared handle to the book. Monitors insert, the evaluator resolves.
/// Never hold the lock across market-data I/O.
pub type SharedBook = Arc<RwLock<SignalBook>>;

/// Append-only signal log plus the registry of still-pending entries.
///
/// Every entry lives exactly once, in `log`. The active registry is the
/// set of ids whose outcome is still `None`; resolving an entry removes it
/// from the registry while it stays in the log with its exit fields set.
#[derive(Debug, Default)]
pub struct SignalBook {
    log: Vec<SignalEntry>,
    index: HashMap<Uuid, usize>,
    active: HashSet<Uuid>,
}

impl SignalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedBook {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Append a freshly created entry and register it as pending.
    pub fn insert(&mut self, entry: SignalEntry) -> Result<()> {
        let id = entry.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateSignal(id));
        }
        if !entry.is_resolved() {
            self.active.insert(id);
        }
        self.index.insert(id, self.log.len());
        self.log.push(entry);
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Option<&SignalEntry> {
        self.index.get(id).map(|&i| &self.log[i])
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.active.contains(id)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Pending entries, in creation order.
    pub fn active(&self) -> impl Iterator<Item = &SignalEntry> {
        self.log.iter().filter(|e| self.active.contains(&e.id()))
    }

    /// (id, symbol) of every pending entry.
    pub fn pending(&self) -> Vec<(Uuid, String)> {
        self.active()
            .map(|e| (e.id(), e.symbol().to_string()))
            .collect()
    }

    /// Every entry ever created, in creation order.
    pub fn log(&self) -> &[SignalEntry] {
        &self.log
    }

    /// Snapshot of confirmed entries for export.
    pub fn confirmed(&self) -> Vec<SignalEntry> {
        self.log
            .iter()
            .filter(|e| e.status() == SignalStatus::Confirmed)
            .cloned()
            .collect()
    }

    /// Apply the resolution rule to a pending entry.
    ///
    /// Returns the outcome assigned by this call, in which case the entry
    /// has left the registry. Unknown, already resolved or still pending
    /// entries yield `None`.
    pub fn resolve(&mut self, id: &Uuid, price: f64, now: DateTime<Utc>) -> Option<Outcome> {
        if !self.active.contains(id) {
            return None;
        }
        let &i = self.index.get(id)?;
        let outcome = self.log[i].resolve(price, now)?;
        self.active.remove(id);
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{Offsets, Side};

    fn entry(symbol: &str, now: DateTime<Utc>) -> SignalEntry {
        SignalEntry::new(
            symbol,
            Side::Long,
            0.8,
            "",
            100.0,
            now,
            Offsets::default(),
            Duration::minutes(120),
        )
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut book = SignalBook::new();
        let e = entry("SOL/USDT", Utc::now());
        book.insert(e.clone()).unwrap();
        assert!(matches!(book.insert(e), Err(Error::DuplicateSignal(_))));
        assert_eq!(book.active_len(), 1);
        assert_eq!(book.log().len(), 1);
    }

    #[test]
    fn resolved_entry_leaves_registry_but_stays_in_log() {
        let now = Utc::now();
        let mut book = SignalBook::new();
        let e = entry("SOL/USDT", now);
        let id = e.id();
        book.insert(e).unwrap();
        book.insert(entry("ETH/USDT", now)).unwrap();

        assert_eq!(book.resolve(&id, 102.0, now), Some(Outcome::TargetHit));
        assert!(!book.is_active(&id));
        assert_eq!(book.active_len(), 1);

        let logged = book.get(&id).unwrap();
        assert_eq!(logged.outcome(), Some(Outcome::TargetHit));
        assert_eq!(logged.exit_price(), Some(102.0));
        assert_eq!(book.confirmed().len(), 2);
    }

    #[test]
    fn second_resolution_changes_nothing() {
        let now = Utc::now();
        let mut book = SignalBook::new();
        let e = entry("SOL/USDT", now);
        let id = e.id();
        book.insert(e).unwrap();

        book.resolve(&id, 99.0, now).unwrap();
        assert_eq!(book.resolve(&id, 150.0, now + Duration::minutes(5)), None);
        let logged = book.get(&id).unwrap();
        assert_eq!(logged.outcome(), Some(Outcome::StopHit));
        assert_eq!(logged.exit_price(), Some(99.0));
        assert_eq!(logged.exit_time(), Some(now));
    }

    #[test]
    fn pending_entry_stays_active() {
        let now = Utc::now();
        let mut book = SignalBook::new();
        let e = entry("SOL/USDT", now);
        let id = e.id();
        book.insert(e).unwrap();

        assert_eq!(book.resolve(&id, 100.5, now + Duration::minutes(10)), None);
        assert!(book.is_active(&id));
        assert_eq!(book.pending(), vec![(id, "SOL/USDT".to_string())]);
    }
}
