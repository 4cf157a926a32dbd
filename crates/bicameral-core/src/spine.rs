//! Temporal spine: the process-wide logical clock
//!
//! One instance is created at process start, shared behind an `Arc`, and
//! never reset. `pulse()` is lock-free: a single CAS loop on the last issued
//! tick guarantees strictly increasing, unique cycle ids across threads.
//!
//! Drift is the disagreement between the wall clock and the wall clock
//! predicted from the monotonic clock since the spine was anchored. Drift is
//! flagged, never corrected: when the wall clock runs backwards the spine
//! keeps issuing synthetic ticks one microsecond past the last one.

use crate::types::PulseCycle;
use chrono::{DateTime, Datelike, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

const MICROS_PER_SEC: u64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Default drift tolerance.
pub const DEFAULT_DRIFT_TOLERANCE: Duration = Duration::from_millis(250);

/// Source of wall-clock and monotonic readings.
pub trait WallClock: Send + Sync {
    /// Microseconds since the unix epoch.
    fn wall_micros(&self) -> u64;
    /// Microseconds since an arbitrary fixed origin; never goes backwards.
    fn monotonic_micros(&self) -> u64;
}

/// The real clocks.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn wall_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }

    fn monotonic_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

pub struct TemporalSpine {
    clock: Arc<dyn WallClock>,
    anchor_wall: u64,
    anchor_mono: u64,
    tolerance_micros: u64,
    last_tick: AtomicU64,
    issued: AtomicU64,
    drift_flag: AtomicBool,
    drift_events: AtomicU64,
}

impl TemporalSpine {
    pub fn new(drift_tolerance: Duration) -> Self {
        Self::with_clock(Arc::new(SystemClock::new()), drift_tolerance)
    }

    pub fn with_clock(clock: Arc<dyn WallClock>, drift_tolerance: Duration) -> Self {
        let anchor_wall = clock.wall_micros();
        let anchor_mono = clock.monotonic_micros();
        Self {
            clock,
            anchor_wall,
            anchor_mono,
            tolerance_micros: drift_tolerance.as_micros() as u64,
            last_tick: AtomicU64::new(0),
            issued: AtomicU64::new(0),
            drift_flag: AtomicBool::new(false),
            drift_events: AtomicU64::new(0),
        }
    }

    /// Issue a new pulse. Never blocks; the returned cycle id is strictly
    /// greater than every id issued before it.
    pub fn pulse(&self) -> PulseCycle {
        let wall = self.clock.wall_micros();
        self.check_drift(wall);

        let tick = self.advance(wall);
        self.issued.fetch_add(1, Ordering::Relaxed);

        let logical_time = tick as f64 / MICROS_PER_SEC as f64;
        PulseCycle {
            cycle_id: cycle_id_for(tick),
            logical_time,
            epoch_label: epoch_label(logical_time),
        }
    }

    fn advance(&self, wall: u64) -> u64 {
        let next = |prev: u64| wall.max(prev.saturating_add(1));
        match self
            .last_tick
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| Some(next(prev)))
        {
            Ok(prev) | Err(prev) => next(prev),
        }
    }

    fn check_drift(&self, wall: u64) {
        let elapsed = self
            .clock
            .monotonic_micros()
            .saturating_sub(self.anchor_mono);
        let expected = self.anchor_wall.saturating_add(elapsed);
        let skew = wall.abs_diff(expected);
        let drifted = skew > self.tolerance_micros;

        let was_drifted = self.drift_flag.swap(drifted, Ordering::AcqRel);
        if drifted {
            self.drift_events.fetch_add(1, Ordering::Relaxed);
            if !was_drifted {
                warn!(
                    "Clock drift detected: wall clock off by {}us (tolerance {}us)",
                    skew, self.tolerance_micros
                );
            }
        }
    }

    /// Last issued logical time in seconds, without issuing a pulse.
    pub fn latest(&self) -> f64 {
        self.last_tick.load(Ordering::Acquire) as f64 / MICROS_PER_SEC as f64
    }

    /// Number of pulses issued so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Whether the most recent pulse observed drift.
    pub fn drift_detected(&self) -> bool {
        self.drift_flag.load(Ordering::Acquire)
    }

    /// Total pulses that observed drift.
    pub fn drift_events(&self) -> u64 {
        self.drift_events.load(Ordering::Relaxed)
    }

    pub fn drift_tolerance(&self) -> Duration {
        Duration::from_micros(self.tolerance_micros)
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_micros(
            self.clock
                .monotonic_micros()
                .saturating_sub(self.anchor_mono),
        )
    }

    /// SHA-256 anchor over `|`-joined fields, hex encoded.
    pub fn anchor(fields: &[&str]) -> String {
        let joined = fields.join("|");
        let digest = ring::digest::digest(&ring::digest::SHA256, joined.as_bytes());
        digest
            .as_ref()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl Default for TemporalSpine {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_TOLERANCE)
    }
}

/// Zero-padded so lexicographic order equals numeric order.
fn cycle_id_for(tick: u64) -> String {
    format!("PULSE-{:020}", tick)
}

/// Human-readable label for a logical time: `SD-<year>.<day>.<hundredths>`
/// where `hundredths` counts hundredths of a second into the UTC day.
/// Display only; never used for ordering.
pub fn epoch_label(logical_time: f64) -> String {
    let micros = (logical_time * MICROS_PER_SEC as f64).round() as i64;
    let secs = micros.div_euclid(MICROS_PER_SEC as i64);
    let hundredths = micros.rem_euclid(MICROS_PER_DAY) / 10_000;
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(dt) => format!("SD-{}.{:03}.{:07}", dt.year(), dt.ordinal(), hundredths),
        None => format!("SD-0000.000.{:07}", hundredths),
    }
}
