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
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::catalog::{Clip, ClipId};

#[derive(Debug, Default)]
struct Position {
    elapsed: Duration,
    running_since: Option<Instant>,
    /// Live sessions of the clip. A wildcard clip can run on several channels
    /// at once and they share one position.
    instances: usize,
}

/// Per-clip playback position, so stopped clips resume where they left off.
#[derive(Debug, Default)]
pub struct PositionTracker {
    positions: HashMap<ClipId, Position>,
}

impl PositionTracker {
    pub fn record_start(&mut self, id: &ClipId, now: Instant) {
        let position = self.positions.entry(id.clone()).or_default();
        position.instances += 1;
        if position.running_since.is_none() {
            position.running_since = Some(now);
        }
    }

    pub fn record_stop(&mut self, id: &ClipId, now: Instant) {
        let Some(position) = self.positions.get_mut(id) else {
            return;
        };
        position.instances = position.instances.saturating_sub(1);
        if position.instances > 0 {
            return;
        }
        if let Some(since) = position.running_since.take() {
            position.elapsed += now.saturating_duration_since(since);
        }
    }

    /// Zeroes the recorded position. Instances that are still running count
    /// from `now`.
    pub fn reset(&mut self, id: &ClipId, now: Instant) {
        if let Some(position) = self.positions.get_mut(id) {
            position.elapsed = Duration::ZERO;
            if position.running_since.is_some() {
                position.running_since = Some(now);
            }
        }
    }

    /// The total time the clip has played since it was last reset.
    pub fn elapsed(&self, id: &ClipId, now: Instant) -> Duration {
        self.positions
            .get(id)
            .map(|position| {
                position.elapsed
                    + position
                        .running_since
                        .map(|since| now.saturating_duration_since(since))
                        .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// The media offset a new session of the clip starts at. Elapsed time that
    /// reaches the end of a finite segment wraps back to the segment start.
    pub fn resume_offset(&self, clip: &Clip, now: Instant) -> Duration {
        if clip.restart_on_play() {
            return clip.start_offset();
        }

        let mut elapsed = self.elapsed(clip.id(), now);
        if let Some(duration) = clip.segment_duration() {
            if elapsed >= duration {
                elapsed = Duration::ZERO;
            }
        }
        clip.start_offset() + elapsed
    }

    pub fn is_running(&self, id: &ClipId) -> bool {
        self.positions
            .get(id)
            .is_some_and(|position| position.running_since.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MediaReference;

    fn clip() -> Clip {
        Clip::new("clip", MediaReference::new("file:///clip.mp4"))
            .with_segment(Duration::from_secs(10), Some(Duration::from_secs(20)))
    }

    #[test]
    fn test_round_trip() {
        let clip = clip();
        let mut tracker = PositionTracker::default();
        let t0 = Instant::now();

        assert_eq!(tracker.resume_offset(&clip, t0), Duration::from_secs(10));
        tracker.record_start(clip.id(), t0);
        assert!(tracker.is_running(clip.id()));
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(5));
        assert!(!tracker.is_running(clip.id()));
        assert_eq!(
            tracker.resume_offset(&clip, t0 + Duration::from_secs(60)),
            Duration::from_secs(15)
        );

        tracker.record_start(clip.id(), t0 + Duration::from_secs(60));
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(62));
        assert_eq!(
            tracker.elapsed(clip.id(), t0 + Duration::from_secs(100)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_wraps_at_segment_end() {
        let clip = clip();
        let mut tracker = PositionTracker::default();
        let t0 = Instant::now();
        tracker.record_start(clip.id(), t0);
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(10));
        assert_eq!(tracker.resume_offset(&clip, t0), Duration::from_secs(10));
    }

    #[test]
    fn test_restart_on_play_ignores_position() {
        let clip = clip().with_restart_on_play(true);
        let mut tracker = PositionTracker::default();
        let t0 = Instant::now();
        tracker.record_start(clip.id(), t0);
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(3));
        assert_eq!(tracker.resume_offset(&clip, t0), Duration::from_secs(10));
    }

    #[test]
    fn test_concurrent_instances_share_a_position() {
        let clip = clip();
        let mut tracker = PositionTracker::default();
        let t0 = Instant::now();
        tracker.record_start(clip.id(), t0);
        tracker.record_start(clip.id(), t0 + Duration::from_secs(1));
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(2));
        assert!(tracker.is_running(clip.id()));
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(4));
        assert_eq!(tracker.elapsed(clip.id(), t0), Duration::from_secs(4));
    }

    #[test]
    fn test_reset() {
        let clip = clip();
        let mut tracker = PositionTracker::default();
        let t0 = Instant::now();
        tracker.record_start(clip.id(), t0);
        tracker.reset(clip.id(), t0 + Duration::from_secs(8));
        assert_eq!(
            tracker.elapsed(clip.id(), t0 + Duration::from_secs(9)),
            Duration::from_secs(1)
        );
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(9));
        tracker.reset(clip.id(), t0 + Duration::from_secs(9));
        assert_eq!(tracker.elapsed(clip.id(), t0), Duration::ZERO);
        assert!(!tracker.is_running(clip.id()));

        // Stopping a clip that never started is ignored.
        let other = Clip::new("other", MediaReference::new("file:///other.mp4"));
        tracker.record_stop(other.id(), t0);
        assert!(!tracker.is_running(other.id()));
    }

    #[test]
    fn test_reset_rebases_shared_instances() {
        let clip = clip();
        let mut tracker = PositionTracker::default();
        let t0 = Instant::now();
        tracker.record_start(clip.id(), t0);
        tracker.record_start(clip.id(), t0 + Duration::from_secs(1));

        // One instance loops while the other keeps playing.
        tracker.record_stop(clip.id(), t0 + Duration::from_secs(4));
        tracker.reset(clip.id(), t0 + Duration::from_secs(4));
        assert_eq!(
            tracker.elapsed(clip.id(), t0 + Duration::from_secs(4)),
            Duration::ZERO
        );
        assert_eq!(
            tracker.elapsed(clip.id(), t0 + Duration::from_secs(6)),
            Duration::from_secs(2)
        );
    }
}
