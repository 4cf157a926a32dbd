//! Live system status
//!
//! All reads and writes go through one mutex. Every mutation bumps the
//! revision, stamps a fresh pulse and publishes the complete snapshot on a
//! `watch` channel while the lock is still held, so listeners only ever see
//! whole snapshots, in mutation order. Slow listeners see the latest value
//! (changes coalesce), never an older one.

use bicameral_core::{
    HemisphereState, HemisphereStatus, Side, SystemStatusSnapshot, TemporalSpine,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Default)]
struct BoardState {
    in_flight: usize,
    left_active: usize,
    right_active: usize,
    registered_adapters: usize,
    revision: u64,
}

impl BoardState {
    fn active(&mut self, side: Side) -> &mut usize {
        match side {
            Side::Left => &mut self.left_active,
            Side::Right => &mut self.right_active,
        }
    }
}

pub struct StatusBoard {
    state: Mutex<BoardState>,
    tx: watch::Sender<SystemStatusSnapshot>,
    spine: Arc<TemporalSpine>,
    max_in_flight: usize,
}

impl StatusBoard {
    pub fn new(spine: Arc<TemporalSpine>, max_in_flight: usize) -> Self {
        let state = BoardState::default();
        let initial = render(&state, &spine, max_in_flight);
        let (tx, _rx) = watch::channel(initial);
        Self {
            state: Mutex::new(state),
            tx,
            spine,
            max_in_flight,
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SystemStatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SystemStatusSnapshot> {
        self.tx.subscribe()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Count a request as in flight until the guard drops.
    pub fn begin_request(self: &Arc<Self>) -> RequestGuard {
        self.update(|s| s.in_flight += 1);
        RequestGuard { board: self.clone() }
    }

    /// Mark `side` active until the guard drops.
    pub fn hemisphere_active(self: &Arc<Self>, side: Side) -> HemisphereGuard {
        self.update(|s| *s.active(side) += 1);
        HemisphereGuard { board: self.clone(), side }
    }

    pub fn set_registered_adapters(&self, count: usize) {
        self.update(|s| s.registered_adapters = count);
    }

    /// Republish with a fresh pulse (and drift flag) without other changes.
    pub fn refresh(&self) {
        self.update(|_| {});
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, change: impl FnOnce(&mut BoardState)) {
        let mut state = self.lock();
        change(&mut state);
        state.revision += 1;
        let snapshot = render(&state, &self.spine, self.max_in_flight);
        self.tx.send_replace(snapshot);
    }
}

fn render(state: &BoardState, spine: &TemporalSpine, max_in_flight: usize) -> SystemStatusSnapshot {
    let state_of = |count: usize| {
        if count > 0 {
            HemisphereState::Active
        } else {
            HemisphereState::Inactive
        }
    };
    let last_pulse = spine.pulse();
    SystemStatusSnapshot {
        active_connections: state.in_flight,
        cognitive_load: cognitive_load(state.in_flight, max_in_flight),
        hemisphere_status: HemisphereStatus {
            left: state_of(state.left_active),
            right: state_of(state.right_active),
        },
        last_pulse,
        revision: state.revision,
        drift_detected: spine.drift_detected(),
        max_in_flight,
        registered_adapters: state.registered_adapters,
    }
}

/// In-flight requests over capacity, clamped to [0, 1].
pub fn cognitive_load(in_flight: usize, max_in_flight: usize) -> f64 {
    if max_in_flight == 0 {
        return if in_flight > 0 { 1.0 } else { 0.0 };
    }
    (in_flight as f64 / max_in_flight as f64).min(1.0)
}

pub struct RequestGuard {
    board: Arc<StatusBoard>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.board.update(|s| s.in_flight = s.in_flight.saturating_sub(1));
    }
}

pub struct HemisphereGuard {
    board: Arc<StatusBoard>,
    side: Side,
}

impl Drop for HemisphereGuard {
    fn drop(&mut self) {
        let side = self.side;
        self.board.update(|s| {
            let count = s.active(side);
            *count = count.saturating_sub(1);
        });
    }
}
