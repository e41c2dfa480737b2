// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Scheduler counters. Shared read-only with observers while the loop updates them.
#[derive(Default)]
pub struct SchedulerStats {
    started: AtomicU64,
    stopped: AtomicU64,
    evictions: AtomicU64,
    start_failures: AtomicU64,
    destroy_failures: AtomicU64,
    engine_errors: AtomicU64,
    loop_restarts: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub started: u64,
    pub stopped: u64,
    pub evictions: u64,
    pub start_failures: u64,
    /// Handles the engine failed to release. Each one is a possible leak.
    pub destroy_failures: u64,
    pub engine_errors: u64,
    pub loop_restarts: u64,
}

impl SchedulerStats {
    pub(super) fn session_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn session_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn session_evicted(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn start_failed(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn destroy_failed(&self) {
        self.destroy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn engine_error(&self) {
        self.engine_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn loop_restarted(&self) {
        self.loop_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            loop_restarts: self.loop_restarts.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "started={} stopped={} evictions={} start_failures={} destroy_failures={} engine_errors={} loop_restarts={}",
            self.started,
            self.stopped,
            self.evictions,
            self.start_failures,
            self.destroy_failures,
            self.engine_errors,
            self.loop_restarts
        )
    }
}
