//! Hybrid timestamps
//!
//! Commit timestamps and resolved timestamps share one domain: physical
//! milliseconds shifted left by `LOGICAL_BITS`, plus a logical counter.

use std::time::Duration;

/// Commit / resolved timestamp
pub type Ts = u64;

/// Width of the logical counter
pub const LOGICAL_BITS: u32 = 18;

const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Build a timestamp from physical milliseconds and a logical counter
#[inline]
pub fn compose_ts(physical_ms: u64, logical: u64) -> Ts {
    (physical_ms << LOGICAL_BITS) | (logical & LOGICAL_MASK)
}

/// Physical milliseconds of `ts`
#[inline]
pub fn physical_ms(ts: Ts) -> u64 {
    ts >> LOGICAL_BITS
}

/// Logical counter of `ts`
#[inline]
pub fn logical(ts: Ts) -> u64 {
    ts & LOGICAL_MASK
}

/// Advance the physical part of `ts` by `d`; the logical part is cleared.
pub fn ts_add_duration(ts: Ts, d: Duration) -> Ts {
    let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX >> LOGICAL_BITS);
    compose_ts(physical_ms(ts).saturating_add(ms), 0)
}

/// First `interval`-aligned timestamp strictly after `ts`.
///
/// A zero interval yields `ts` unchanged.
pub fn next_aligned_ts(ts: Ts, interval: Duration) -> Ts {
    let step = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if step == 0 {
        return ts;
    }
    let physical = physical_ms(ts);
    compose_ts((physical / step).saturating_add(1).saturating_mul(step), 0)
}
