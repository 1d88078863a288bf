//! Sync-point schedule of one dispatcher

use contracts::{next_aligned_ts, ts_add_duration, SyncPointConfig, Ts};
use std::time::Duration;

/// Next boundary and spacing of the sync points a dispatcher emits
#[derive(Debug, Clone)]
pub(crate) struct SyncPointState {
    interval: Duration,
    next_ts: Ts,
}

impl SyncPointState {
    /// First boundary is the first aligned timestamp strictly after `start_ts`
    pub(crate) fn new(config: SyncPointConfig, start_ts: Ts) -> Self {
        let next_ts = if config.interval.is_zero() {
            Ts::MAX
        } else {
            next_aligned_ts(start_ts, config.interval)
        };
        Self {
            interval: config.interval,
            next_ts,
        }
    }

    pub(crate) fn next_ts(&self) -> Ts {
        self.next_ts
    }

    /// Boundaries that must precede a transaction committed at `commit_ts`
    pub(crate) fn due_before_commit(&mut self, commit_ts: Ts) -> Vec<Ts> {
        self.take_while(|next| commit_ts > next)
    }

    /// Boundaries covered once the watermark reaches `resolved_ts`
    pub(crate) fn due_at_resolved(&mut self, resolved_ts: Ts) -> Vec<Ts> {
        self.take_while(|next| resolved_ts >= next)
    }

    fn take_while(&mut self, crossed: impl Fn(Ts) -> bool) -> Vec<Ts> {
        let mut due = Vec::new();
        while self.next_ts != Ts::MAX && crossed(self.next_ts) {
            due.push(self.next_ts);
            let advanced = ts_add_duration(self.next_ts, self.interval);
            self.next_ts = if advanced > self.next_ts {
                advanced
            } else {
                Ts::MAX
            };
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::compose_ts;

    fn state(start_ms: u64, interval_ms: u64) -> SyncPointState {
        SyncPointState::new(
            SyncPointConfig::new(Duration::from_millis(interval_ms)),
            compose_ts(start_ms, 0),
        )
    }

    #[test]
    fn test_first_boundary_is_aligned() {
        assert_eq!(state(1_234, 1_000).next_ts(), compose_ts(2_000, 0));
        assert_eq!(state(2_000, 1_000).next_ts(), compose_ts(3_000, 0));
    }

    #[test]
    fn test_commit_must_pass_boundary() {
        let mut sp = state(0, 1_000);
        assert!(sp.due_before_commit(compose_ts(1_000, 0)).is_empty());
        assert_eq!(
            sp.due_before_commit(compose_ts(1_000, 1)),
            vec![compose_ts(1_000, 0)]
        );
        assert_eq!(sp.next_ts(), compose_ts(2_000, 0));
    }

    #[test]
    fn test_resolved_reaching_boundary_emits() {
        let mut sp = state(0, 1_000);
        assert_eq!(
            sp.due_at_resolved(compose_ts(1_000, 0)),
            vec![compose_ts(1_000, 0)]
        );
    }

    #[test]
    fn test_jump_emits_every_crossed_boundary() {
        let mut sp = state(0, 1_000);
        let due = sp.due_at_resolved(compose_ts(3_500, 0));
        assert_eq!(
            due,
            vec![
                compose_ts(1_000, 0),
                compose_ts(2_000, 0),
                compose_ts(3_000, 0)
            ]
        );
        assert_eq!(sp.next_ts(), compose_ts(4_000, 0));
    }

    #[test]
    fn test_zero_interval_never_fires() {
        let mut sp = state(0, 0);
        assert!(sp.due_at_resolved(Ts::MAX - 1).is_empty());
    }
}
