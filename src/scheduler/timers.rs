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
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::trigger::TriggerKey;

/// Identifies an armed timer.
pub type TimerId = u64;

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once and hard-restarts the session.
    LoopRestart,
    /// Fires every interval and checks whether the session reached its segment end.
    PositionPoll { interval: Duration },
}

#[derive(Debug)]
struct Timer {
    deadline: Instant,
    kind: TimerKind,
    key: TriggerKey,
}

/// A fired timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub kind: TimerKind,
    pub key: TriggerKey,
}

/// Session-owned timers, serviced by the scheduler loop.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: TimerId,
    timers: BTreeMap<TimerId, Timer>,
}

impl TimerQueue {
    pub fn arm(&mut self, kind: TimerKind, key: TriggerKey, deadline: Instant) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.timers.insert(
            id,
            Timer {
                deadline,
                kind,
                key,
            },
        );
        id
    }

    /// Cancels the timer. Returns false if it already fired or was never armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|timer| timer.deadline).min()
    }

    /// Removes and returns every timer due at `now`, earliest first. Periodic
    /// timers are re-armed for their next interval under the same id.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Fired> {
        let mut due: Vec<(Instant, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(id, timer)| (timer.deadline, *id))
            .collect();
        due.sort();

        let mut fired = Vec::with_capacity(due.len());
        for (_, id) in due {
            let Some(timer) = self.timers.get_mut(&id) else {
                continue;
            };
            fired.push(Fired {
                id,
                kind: timer.kind,
                key: timer.key.clone(),
            });
            match timer.kind {
                TimerKind::LoopRestart => {
                    self.timers.remove(&id);
                }
                TimerKind::PositionPoll { interval } => {
                    // Skip missed intervals rather than firing a burst.
                    timer.deadline = (timer.deadline + interval).max(now + interval);
                }
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
