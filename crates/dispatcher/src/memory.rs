//! Memory accounting for buffered-but-undrained events
//!
//! Every dispatcher tracks its own bytes keyed by commit ts. Once attached to
//! a node-wide [`GlobalMemoryUsage`], every change is mirrored there so the
//! collector can throttle inbound delivery.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use contracts::Ts;

/// Lowest speed ratio reported, in tenths
const MIN_RATIO_TENTHS: u8 = 1;
const FULL_SPEED_TENTHS: u8 = 10;

/// Node-wide aggregate of dispatcher memory
#[derive(Debug, Default)]
pub struct GlobalMemoryUsage {
    used: AtomicU64,
    released: Notify,
}

impl GlobalMemoryUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently accounted across all attached dispatchers
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Whether usage is above `quota`
    pub fn exceeds(&self, quota: u64) -> bool {
        self.used_bytes() > quota
    }

    /// Wait until usage is at or below `quota`.
    ///
    /// Returns immediately when already within quota.
    pub async fn wait_within(&self, quota: u64) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();
            if !self.exceeds(quota) {
                return;
            }
            notified.await;
        }
    }

    fn add(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    fn sub(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(bytes))
            });
        self.released.notify_waiters();
    }
}

/// Memory of one dispatcher, keyed by commit ts
#[derive(Debug)]
pub struct MemoryUsage {
    by_commit_ts: Mutex<BTreeMap<Ts, u64>>,
    used: AtomicU64,
    global: Mutex<Option<Arc<GlobalMemoryUsage>>>,
    /// Last reported speed ratio, in tenths
    last_ratio: AtomicU8,
}

impl Default for MemoryUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUsage {
    pub fn new() -> Self {
        Self {
            by_commit_ts: Mutex::new(BTreeMap::new()),
            used: AtomicU64::new(0),
            global: Mutex::new(None),
            last_ratio: AtomicU8::new(FULL_SPEED_TENTHS),
        }
    }

    /// Mirror this dispatcher's usage into `global`.
    ///
    /// Returns false if already attached to a different aggregate.
    pub fn attach(&self, global: Arc<GlobalMemoryUsage>) -> bool {
        let _entries = self.by_commit_ts.lock();
        let mut slot = self.global.lock();
        match slot.as_ref() {
            Some(current) => Arc::ptr_eq(current, &global),
            None => {
                global.add(self.used.load(Ordering::Acquire));
                *slot = Some(global);
                true
            }
        }
    }

    /// Stop mirroring into the global aggregate and take this dispatcher's
    /// bytes out of it; returns the bytes taken out.
    pub fn detach(&self) -> u64 {
        let _entries = self.by_commit_ts.lock();
        match self.global.lock().take() {
            Some(global) => {
                let used = self.used.load(Ordering::Acquire);
                global.sub(used);
                used
            }
            None => 0,
        }
    }

    /// Bytes currently accounted
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Oldest commit ts still holding memory
    pub fn oldest_commit_ts(&self) -> Option<Ts> {
        self.by_commit_ts.lock().keys().next().copied()
    }

    pub fn add(&self, commit_ts: Ts, bytes: u64) {
        let mut entries = self.by_commit_ts.lock();
        *entries.entry(commit_ts).or_insert(0) += bytes;
        self.used.fetch_add(bytes, Ordering::AcqRel);
        if let Some(global) = self.global.lock().as_ref() {
            global.add(bytes);
        }
    }

    /// Release up to `bytes` accounted under `commit_ts`; returns bytes freed
    pub fn release(&self, commit_ts: Ts, bytes: u64) -> u64 {
        let mut entries = self.by_commit_ts.lock();
        let Some(held) = entries.get_mut(&commit_ts) else {
            return 0;
        };
        let freed = bytes.min(*held);
        *held -= freed;
        if *held == 0 {
            entries.remove(&commit_ts);
        }
        self.sub(freed);
        freed
    }

    /// Release everything accounted at or below `ts`; returns bytes freed
    pub fn release_up_to(&self, ts: Ts) -> u64 {
        let mut entries = self.by_commit_ts.lock();
        let keep = match ts.checked_add(1) {
            Some(bound) => entries.split_off(&bound),
            None => BTreeMap::new(),
        };
        let freed: u64 = entries.values().sum();
        *entries = keep;
        self.sub(freed);
        freed
    }

    /// Recompute the speed ratio against `limit` bytes.
    ///
    /// The ratio is `1 - used / limit` quantised to tenths within `[0.1, 1.0]`.
    /// Returns it only when it differs from the last value returned.
    pub fn update_speed_ratio(&self, limit: u64) -> Option<f32> {
        let tenths = if limit == 0 {
            MIN_RATIO_TENTHS
        } else {
            let free = 1.0 - self.used_bytes() as f64 / limit as f64;
            ((free * 10.0).round() as i64).clamp(MIN_RATIO_TENTHS as i64, FULL_SPEED_TENTHS as i64)
                as u8
        };
        let previous = self.last_ratio.swap(tenths, Ordering::AcqRel);
        (previous != tenths).then(|| tenths as f32 / 10.0)
    }

    fn sub(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.used.fetch_sub(bytes, Ordering::AcqRel);
        if let Some(global) = self.global.lock().as_ref() {
            global.sub(bytes);
        }
    }
}

impl Drop for MemoryUsage {
    fn drop(&mut self) {
        // Undrained events die with the dispatcher
        if let Some(global) = self.global.get_mut().take() {
            global.sub(*self.used.get_mut());
        }
    }
}
