//! One-time consensus review of the observations gathered while warming up.

use common::{Observation, Side};

/// Modal direction of the warmup window, qualified to fire.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub side: Side,
    /// Modal count over the non-NONE total.
    pub ratio: f64,
    pub avg_confidence: f64,
    /// Union of the modal observations' reasons, first occurrence order.
    pub reasons: Vec<String>,
    pub observations: usize,
}

impl Consensus {
    pub fn rationale(&self) -> String {
        format!(
            "Final warmup review: {:.2} confidence, {}% persistence. Reasons: {}",
            self.avg_confidence,
            (self.ratio * 100.0) as i64,
            self.reasons.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WarmupVerdict {
    Consensus(Consensus),
    /// Modal side did not reach the required share.
    NoConsensus { side: Side, ratio: f64 },
    /// Every buffered observation was NONE (or none were buffered).
    NoSignalSeen,
    AlreadyReviewed,
}

#[derive(Debug, Default)]
pub struct WarmupBuffer {
    observations: Vec<Observation>,
    reviewed: bool,
}

impl WarmupBuffer {
    pub fn push(&mut self, observation: Observation) {
        if !self.reviewed {
            self.observations.push(observation);
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn is_reviewed(&self) -> bool {
        self.reviewed
    }

    /// Review the buffer. Marks it reviewed and releases the observations
    /// whatever the verdict; later calls return `AlreadyReviewed`.
    pub fn review(&mut self, min_ratio: f64) -> WarmupVerdict {
        if self.reviewed {
            return WarmupVerdict::AlreadyReviewed;
        }
        self.reviewed = true;
        let observations = std::mem::take(&mut self.observations);
        tally(&observations, min_ratio)
    }
}

fn tally(observations: &[Observation], min_ratio: f64) -> WarmupVerdict {
    let directed: Vec<(&Observation, Side)> = observations
        .iter()
        .filter_map(|o| o.direction.map(|side| (o, side)))
        .collect();
    let Some(&(_, first)) = directed.first() else {
        return WarmupVerdict::NoSignalSeen;
    };

    let longs = directed.iter().filter(|(_, s)| *s == Side::Long).count();
    let shorts = directed.len() - longs;
    // Ties go to whichever side appeared first.
    let side = match longs.cmp(&shorts) {
        std::cmp::Ordering::Greater => Side::Long,
        std::cmp::Ordering::Less => Side::Short,
        std::cmp::Ordering::Equal => first,
    };
    let count = longs.max(shorts);
    let ratio = count as f64 / directed.len() as f64;
    if ratio < min_ratio {
        return WarmupVerdict::NoConsensus { side, ratio };
    }

    let modal: Vec<&Observation> = directed
        .iter()
        .filter(|(_, s)| *s == side)
        .map(|(o, _)| *o)
        .collect();
    let avg_confidence = modal.iter().map(|o| o.confidence).sum::<f64>() / modal.len() as f64;
    let mut reasons: Vec<String> = Vec::new();
    for reason in modal.iter().flat_map(|o| o.reasons.iter()) {
        if !reasons.contains(reason) {
            reasons.push(reason.clone());
        }
    }

    WarmupVerdict::Consensus(Consensus {
        side,
        ratio,
        avg_confidence,
        reasons,
        observations: modal.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(direction: Option<Side>, confidence: f64, reasons: &[&str]) -> Observation {
        Observation {
            timestamp: Utc::now(),
            direction,
            confidence,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            price: 100.0,
        }
    }

    #[test]
    fn majority_long_fires_with_average_and_deduped_reasons() {
        let mut buffer = WarmupBuffer::default();
        buffer.push(obs(Some(Side::Long), 0.8, &["a"]));
        buffer.push(obs(Some(Side::Long), 0.9, &["a", "b"]));
        buffer.push(obs(Some(Side::Short), 0.1, &["c"]));
        buffer.push(obs(Some(Side::Long), 0.75, &["b"]));

        let WarmupVerdict::Consensus(c) = buffer.review(0.6) else {
            panic!("expected consensus");
        };
        assert_eq!(c.side, Side::Long);
        assert!((c.ratio - 0.75).abs() < 1e-9);
        assert!((c.avg_confidence - 0.8166666).abs() < 1e-6);
        assert_eq!(c.reasons, vec!["a", "b"]);
        assert_eq!(c.observations, 3);
        let rationale = c.rationale();
        assert!(rationale.starts_with("Final warmup review: 0.82 confidence, 75% persistence."));
    }

    #[test]
    fn review_runs_exactly_once() {
        let mut buffer = WarmupBuffer::default();
        for _ in 0..3 {
            buffer.push(obs(Some(Side::Short), 0.1, &[]));
        }
        assert!(matches!(buffer.review(0.6), WarmupVerdict::Consensus(_)));
        assert!(buffer.is_empty());
        assert_eq!(buffer.review(0.6), WarmupVerdict::AlreadyReviewed);

        buffer.push(obs(Some(Side::Short), 0.1, &[]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn only_none_observations_see_no_signal() {
        let mut buffer = WarmupBuffer::default();
        buffer.push(obs(None, 0.5, &[]));
        buffer.push(obs(None, 0.6, &[]));
        assert_eq!(buffer.review(0.6), WarmupVerdict::NoSignalSeen);
        assert!(buffer.is_reviewed());
    }

    #[test]
    fn split_window_has_no_consensus() {
        let mut buffer = WarmupBuffer::default();
        buffer.push(obs(Some(Side::Short), 0.2, &[]));
        buffer.push(obs(Some(Side::Long), 0.8, &[]));
        buffer.push(obs(None, 0.5, &[]));
        assert_eq!(
            buffer.review(0.6),
            WarmupVerdict::NoConsensus {
                side: Side::Short,
                ratio: 0.5
            }
        );
    }

    #[test]
    fn none_observations_do_not_dilute_the_ratio() {
        let mut buffer = WarmupBuffer::default();
        buffer.push(obs(None, 0.5, &[]));
        buffer.push(obs(Some(Side::Long), 0.9, &[]));
        buffer.push(obs(None, 0.5, &[]));
        let WarmupVerdict::Consensus(c) = buffer.review(0.6) else {
            panic!("expected consensus");
        };
        assert_eq!(c.ratio, 1.0);
    }
}
