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

//! The session scheduler. Turns trigger events into a bounded set of playback
//! sessions. All state here is owned by a single task; see [runner::SchedulerLoop].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, Clip};
use crate::config::error::ConfigError;
use crate::engine::{EngineEvent, PlaybackEngine};
use crate::trigger::{ManualCommand, TriggerEvent, TriggerKey};

pub mod clock;
pub mod layout;
pub mod matching;
pub mod position;
pub mod registry;
pub mod runner;
pub mod stats;
pub mod timers;

use clock::Clock;
use layout::{layout, Canvas, MAX_LAYOUT_SLOTS};
use matching::{should_be_active, ActiveNotes};
use position::PositionTracker;
use registry::{Session, SessionRegistry};
use stats::SchedulerStats;
use timers::{TimerKind, TimerQueue};

/// The result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session was admitted.
    Started,
    /// The key was already playing an exclusive clip. Nothing changed.
    AlreadyActive,
    /// The engine couldn't create a handle. Nothing changed.
    Failed,
}

/// Why a session is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Stop,
    Evict,
    Restart,
    EngineError,
    Shutdown,
}

pub struct Scheduler {
    catalog: Arc<Catalog>,
    engine: Arc<dyn PlaybackEngine>,
    clock: Arc<dyn Clock>,
    canvas: Canvas,
    max_sessions: usize,
    poll_interval: Duration,
    notes: ActiveNotes,
    registry: SessionRegistry,
    positions: PositionTracker,
    timers: TimerQueue,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    /// Creates a new scheduler. The session limit can't exceed the number of
    /// enumerated layouts.
    pub fn new(
        catalog: Arc<Catalog>,
        engine: Arc<dyn PlaybackEngine>,
        clock: Arc<dyn Clock>,
        max_sessions: usize,
        canvas: Canvas,
        poll_interval: Duration,
    ) -> Result<Scheduler, ConfigError> {
        if max_sessions == 0 || max_sessions > MAX_LAYOUT_SLOTS {
            return Err(ConfigError::InvalidCapacity {
                got: max_sessions,
                max: MAX_LAYOUT_SLOTS,
            });
        }
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidDuration {
                value: String::from("0s"),
                reason: String::from("the position poll interval must be positive"),
            });
        }

        Ok(Scheduler {
            catalog,
            engine,
            clock,
            canvas,
            max_sessions,
            poll_interval,
            notes: ActiveNotes::default(),
            registry: SessionRegistry::default(),
            positions: PositionTracker::default(),
            timers: TimerQueue::default(),
            stats: Arc::new(SchedulerStats::default()),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn positions(&self) -> &PositionTracker {
        &self.positions
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Applies a note event and reconciles the sessions on its channel against
    /// the clips the held notes now ask for.
    pub fn handle_trigger(&mut self, event: &TriggerEvent) {
        debug!(event = %event, "Trigger event.");
        let channel = self.notes.apply(event);
        let should = should_be_active(&self.catalog, channel, self.notes.held(channel));

        for key in self.registry.chord_keys_on(channel) {
            if !should.iter().any(|(_, should_key)| should_key == &key) {
                self.stop(&key);
            }
        }
        for (clip, key) in should {
            if !self.registry.contains(&key) {
                self.start(clip, key);
            }
        }
    }

    /// Handles a manual start or stop. Shutdown requests are handled by the loop.
    pub fn handle_manual(&mut self, command: &ManualCommand) {
        match command {
            ManualCommand::Start { source, trigger } => {
                let Some(clip) = self.catalog.by_debug_trigger(trigger).cloned() else {
                    warn!(source, trigger, "No clip is bound to the debug trigger.");
                    return;
                };
                self.start(clip, TriggerKey::manual(source, trigger));
            }
            ManualCommand::Stop { source, trigger } => {
                self.stop(&TriggerKey::manual(source, trigger));
            }
            ManualCommand::Shutdown => {}
        }
    }

    /// Admits a session for the clip under the key, evicting the oldest sessions
    /// if the scheduler is full.
    pub fn start(&mut self, clip: Arc<Clip>, key: TriggerKey) -> StartOutcome {
        let live = self.registry.contains(&key);
        if live && clip.exclusive() {
            debug!(clip = clip.name(), key = %key, "Exclusive clip already playing.");
            return StartOutcome::AlreadyActive;
        }

        let now = self.clock.now();
        let offset = self.positions.resume_offset(&clip, now);
        let handle = match self.engine.create(clip.media_reference(), offset) {
            Ok(handle) => handle,
            Err(e) => {
                error!(clip = clip.name(), key = %key, err = %e, "Unable to start clip.");
                self.stats.start_failed();
                return StartOutcome::Failed;
            }
        };

        if live {
            self.remove(&key, Removal::Restart);
        }
        while self.registry.len() >= self.max_sessions {
            let Some(oldest) = self.registry.oldest().cloned() else {
                break;
            };
            self.remove(&oldest, Removal::Evict);
        }

        // Playing from the top, either by policy or because the recorded position
        // wrapped at the segment end, starts the position over.
        if clip.restart_on_play() || offset == clip.start_offset() {
            self.positions.reset(clip.id(), now);
        }
        self.positions.record_start(clip.id(), now);

        let loop_timer = match (clip.loop_period(), clip.end_offset()) {
            (Some(period), _) => Some(self.timers.arm(
                TimerKind::LoopRestart,
                key.clone(),
                now + period,
            )),
            (None, Some(_)) => Some(self.timers.arm(
                TimerKind::PositionPoll {
                    interval: self.poll_interval,
                },
                key.clone(),
                now + self.poll_interval,
            )),
            (None, None) => None,
        };

        info!(
            clip = clip.name(),
            key = %key,
            handle = %handle,
            offset = ?offset,
            sessions = self.registry.len() + 1,
            "Started clip."
        );
        self.registry.push(Session {
            clip,
            handle,
            trigger_key: key,
            layout_slot: None,
            loop_timer,
            created_at: now,
            start_offset: offset,
        });
        self.stats.session_started();
        self.relayout();

        StartOutcome::Started
    }

    /// Stops the session under the key. Returns false if nothing was playing.
    pub fn stop(&mut self, key: &TriggerKey) -> bool {
        self.remove(key, Removal::Stop)
    }

    /// Handles an asynchronous engine notification.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::EndOfStream(handle) => {
                let Some(key) = self.registry.key_for_handle(handle).cloned() else {
                    debug!(handle, "End of stream for a released handle.");
                    return;
                };
                self.complete_loop(&key);
            }
            EngineEvent::Error { handle, message } => {
                self.stats.engine_error();
                let Some(key) = self.registry.key_for_handle(handle).cloned() else {
                    warn!(handle, err = message, "Engine error for a released handle.");
                    return;
                };
                error!(handle, key = %key, err = message, "Engine error, stopping session.");
                self.remove(&key, Removal::EngineError);
            }
        }
    }

    /// The next instant a timer needs servicing.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Services every timer that is due.
    pub fn fire_due_timers(&mut self) {
        let now = self.clock.now();
        for fired in self.timers.pop_due(now) {
            // An earlier timer in this batch may have restarted or removed the session.
            let Some(session) = self.registry.get(&fired.key) else {
                continue;
            };
            if session.loop_timer != Some(fired.id) {
                continue;
            }

            match fired.kind {
                TimerKind::LoopRestart => {
                    debug!(key = %fired.key, "Loop period elapsed.");
                    self.hard_restart(&fired.key);
                }
                TimerKind::PositionPoll { .. } => {
                    let Some(end) = session.clip.end_offset() else {
                        continue;
                    };
                    let reached_end = self
                        .engine
                        .query_position(&session.handle)
                        .is_some_and(|position| position >= end);
                    if reached_end {
                        debug!(key = %fired.key, "Segment end reached.");
                        self.complete_loop(&fired.key);
                    }
                }
            }
        }
    }

    /// Stops every session, oldest first.
    pub fn shutdown(&mut self) {
        info!(sessions = self.registry.len(), "Stopping all sessions.");
        for key in self.registry.keys() {
            self.remove(&key, Removal::Shutdown);
        }
        self.notes.clear();
    }

    /// The session finished its segment or its media: rewind in place, falling
    /// back to a full restart if the engine can't seek.
    fn complete_loop(&mut self, key: &TriggerKey) {
        let Some(session) = self.registry.get(key) else {
            return;
        };
        let clip = session.clip.clone();
        match self.engine.seek(&session.handle, clip.start_offset()) {
            Ok(()) => {
                self.positions.reset(clip.id(), self.clock.now());
                self.stats.loop_restarted();
                info!(clip = clip.name(), key = %key, "Looped clip.");
            }
            Err(e) => {
                warn!(clip = clip.name(), key = %key, err = %e, "Seek failed, restarting clip.");
                self.hard_restart(key);
            }
        }
    }

    /// Replaces the session with a fresh one playing from the start of the clip.
    fn hard_restart(&mut self, key: &TriggerKey) {
        let Some(session) = self.registry.get(key) else {
            return;
        };
        let clip = session.clip.clone();
        self.remove(key, Removal::Restart);
        self.positions.reset(clip.id(), self.clock.now());
        self.stats.loop_restarted();
        info!(clip = clip.name(), key = %key, "Restarting clip.");
        self.start(clip, key.clone());
    }

    /// Tears down the session under the key: timer, position, engine handle,
    /// then layout.
    fn remove(&mut self, key: &TriggerKey, removal: Removal) -> bool {
        let Some(session) = self.registry.get_mut(key) else {
            return false;
        };
        if let Some(timer) = session.loop_timer.take() {
            self.timers.cancel(timer);
        }
        self.positions
            .record_stop(session.clip.id(), self.clock.now());

        let Some(session) = self.registry.remove(key) else {
            return false;
        };
        let name = session.clip.name().to_string();
        let handle = session.handle;
        let handle_id = handle.id();
        if let Err(e) = self.engine.destroy(handle) {
            // The session goes regardless. The engine may have leaked the handle.
            error!(clip = name, handle = handle_id, err = %e, "Unable to release engine handle.");
            self.stats.destroy_failed();
        }

        match removal {
            Removal::Evict => {
                self.stats.session_evicted();
                info!(clip = name, key = %key, "Evicted oldest clip.");
            }
            Removal::Restart => debug!(clip = name, key = %key, "Removed clip for restart."),
            Removal::Stop | Removal::EngineError | Removal::Shutdown => {
                self.stats.session_stopped();
                info!(clip = name, key = %key, reason = ?removal, "Stopped clip.");
            }
        }

        self.relayout();
        true
    }

    /// Assigns slots in registry order and moves every session to its rectangle.
    fn relayout(&mut self) {
        let rects = layout(self.canvas, self.registry.len());
        for (slot, session) in self.registry.iter_mut().enumerate() {
            let Some(rect) = rects.get(slot).copied() else {
                session.layout_slot = None;
                continue;
            };
            session.layout_slot = Some(slot);
            if let Err(e) = self.engine.attach_to_compositor(&session.handle, rect) {
                warn!(key = %session.trigger_key, err = %e, "Unable to place clip.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, error::Error};

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::clock::ManualClock;
    use super::layout::Rect;
    use super::*;
    use crate::catalog::{MediaReference, MidiChannel};
    use crate::engine;

    const POLL: Duration = Duration::from_millis(100);

    struct Fixture {
        scheduler: Scheduler,
        engine: Arc<engine::test::Engine>,
        clock: Arc<ManualClock>,
    }

    fn fixture(clips: Vec<Clip>, max_sessions: usize) -> Result<Fixture, Box<dyn Error>> {
        let engine = Arc::new(engine::test::Engine::get("mock-engine"));
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(
            Arc::new(Catalog::new(clips)?),
            engine.clone(),
            clock.clone(),
            max_sessions,
            Canvas::default(),
            POLL,
        )?;
        Ok(Fixture {
            scheduler,
            engine,
            clock,
        })
    }

    fn media(name: &str) -> MediaReference {
        MediaReference::new(format!("file:///clips/{}.mp4", name))
    }

    fn clip(name: &str) -> Clip {
        Clip::new(name, media(name)).with_debug_trigger(Some(name.to_string()))
    }

    fn start(fixture: &mut Fixture, name: &str) -> StartOutcome {
        let clip = fixture
            .scheduler
            .catalog()
            .by_debug_trigger(name)
            .cloned()
            .expect("clip should exist");
        fixture.scheduler.start(clip, key(name))
    }

    fn key(name: &str) -> TriggerKey {
        TriggerKey::manual("test", name)
    }

    fn names(scheduler: &Scheduler) -> Vec<String> {
        scheduler
            .registry()
            .iter()
            .map(|session| session.clip().name().to_string())
            .collect()
    }

    fn offsets(engine: &engine::test::Engine) -> Vec<Duration> {
        engine.created().into_iter().map(|(_, offset)| offset).collect()
    }

    #[test]
    fn test_fifo_eviction() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a"), clip("b"), clip("c"), clip("d")], 3)?;
        for name in ["a", "b", "c"] {
            assert_eq!(start(&mut f, name), StartOutcome::Started);
        }
        f.clock.advance(Duration::from_secs(1));
        assert_eq!(start(&mut f, "d"), StartOutcome::Started);

        assert_eq!(names(&f.scheduler), vec!["b", "c", "d"]);
        assert_eq!(f.engine.destroyed(), vec![1]);
        assert_eq!(f.engine.live_count(), 3);
        assert_eq!(f.scheduler.stats().snapshot().evictions, 1);
        Ok(())
    }

    #[test]
    fn test_eviction_ignores_access() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a").with_exclusive(true), clip("b"), clip("c")],
            2,
        )?;
        start(&mut f, "a");
        start(&mut f, "b");
        // Re-triggering an exclusive clip doesn't make it any younger.
        assert_eq!(start(&mut f, "a"), StartOutcome::AlreadyActive);
        start(&mut f, "c");
        assert_eq!(names(&f.scheduler), vec!["b", "c"]);
        Ok(())
    }

    #[test]
    fn test_stop_is_idempotent() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a")], 4)?;
        start(&mut f, "a");
        assert!(f.scheduler.stop(&key("a")));
        assert!(!f.scheduler.stop(&key("a")));
        assert!(!f.scheduler.stop(&key("never")));
        assert_eq!(f.engine.destroyed().len(), 1);
        assert_eq!(f.scheduler.stats().snapshot().stopped, 1);
        Ok(())
    }

    #[test]
    fn test_exclusive_retrigger() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a").with_exclusive(true), clip("b")], 4)?;
        assert_eq!(start(&mut f, "a"), StartOutcome::Started);
        assert_eq!(start(&mut f, "a"), StartOutcome::AlreadyActive);
        assert_eq!(f.scheduler.registry().len(), 1);
        assert_eq!(f.engine.created().len(), 1);

        // Non-exclusive clips restart, still under a single session.
        start(&mut f, "b");
        assert_eq!(start(&mut f, "b"), StartOutcome::Started);
        assert_eq!(names(&f.scheduler), vec!["a", "b"]);
        assert_eq!(f.engine.created().len(), 3);
        assert_eq!(f.engine.live_count(), 2);
        Ok(())
    }

    #[test]
    fn test_position_round_trip() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a")], 4)?;
        start(&mut f, "a");
        f.clock.advance(Duration::from_secs(5));
        f.scheduler.stop(&key("a"));
        f.clock.advance(Duration::from_secs(30));
        start(&mut f, "a");

        assert_eq!(
            offsets(&f.engine),
            vec![Duration::ZERO, Duration::from_secs(5)]
        );
        assert_eq!(
            f.scheduler
                .registry()
                .get(&key("a"))
                .map(|session| session.start_offset()),
            Some(Duration::from_secs(5))
        );
        Ok(())
    }

    #[test]
    fn test_resume_after_segment_wrap() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a").with_segment(Duration::ZERO, Some(Duration::from_secs(10)))],
            4,
        )?;
        // Stopped past the segment end, before a poll noticed it.
        start(&mut f, "a");
        f.clock.advance(Duration::from_millis(10050));
        f.scheduler.stop(&key("a"));

        start(&mut f, "a");
        f.clock.advance(Duration::from_secs(3));
        f.scheduler.stop(&key("a"));
        start(&mut f, "a");

        assert_eq!(
            offsets(&f.engine),
            vec![Duration::ZERO, Duration::ZERO, Duration::from_secs(3)]
        );
        Ok(())
    }

    #[test]
    fn test_restart_on_play() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a")
                .with_segment(Duration::from_secs(2), None)
                .with_restart_on_play(true)],
            4,
        )?;
        start(&mut f, "a");
        f.clock.advance(Duration::from_secs(5));
        f.scheduler.stop(&key("a"));
        start(&mut f, "a");

        assert_eq!(
            offsets(&f.engine),
            vec![Duration::from_secs(2), Duration::from_secs(2)]
        );
        Ok(())
    }

    #[test]
    fn test_chord_matching() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![Clip::new("triad", media("triad"))
                .with_channel(MidiChannel::Channel(0))
                .with_required_notes([60, 64, 67])],
            4,
        )?;

        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 60, 100));
        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 64, 100));
        assert!(f.scheduler.registry().is_empty());

        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 67, 100));
        assert_eq!(names(&f.scheduler), vec!["triad"]);

        // Extra notes and repeated note ons leave the session alone.
        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 72, 100));
        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 67, 100));
        assert_eq!(f.engine.created().len(), 1);

        // The same chord on another channel doesn't match.
        for note in [60, 64, 67] {
            f.scheduler.handle_trigger(&TriggerEvent::note_on(1, note, 100));
        }
        assert_eq!(f.scheduler.registry().len(), 1);

        f.scheduler.handle_trigger(&TriggerEvent::note_off(0, 64));
        assert!(f.scheduler.registry().is_empty());
        assert_eq!(f.engine.live_count(), 0);
        Ok(())
    }

    #[test]
    fn test_wildcard_clip_per_channel() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![Clip::new("any", media("any")).with_required_notes([48])],
            4,
        )?;
        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 48, 100));
        f.scheduler.handle_trigger(&TriggerEvent::note_on(9, 48, 100));
        assert_eq!(f.scheduler.registry().len(), 2);

        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 48, 0));
        let channels: Vec<Option<u8>> = f
            .scheduler
            .registry()
            .iter()
            .map(|session| session.trigger_key().channel())
            .collect();
        assert_eq!(channels, vec![Some(9)]);
        Ok(())
    }

    #[test]
    fn test_end_to_end() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![Clip::new("x", media("x"))
                .with_channel(MidiChannel::Channel(0))
                .with_required_notes([60])],
            4,
        )?;
        let x = f.scheduler.catalog().clips()[0].clone();

        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 60, 100));
        assert_eq!(names(&f.scheduler), vec!["x"]);
        assert!(f.scheduler.registry().contains(&TriggerKey::chord(&x, 0)));
        // Natural end and no loop period: nothing to poll.
        assert_eq!(f.scheduler.next_deadline(), None);

        f.clock.advance(Duration::from_millis(2500));
        f.scheduler.handle_trigger(&TriggerEvent::note_off(0, 60));
        assert!(f.scheduler.registry().is_empty());
        assert_eq!(
            f.scheduler.positions().elapsed(x.id(), f.clock.now()),
            Duration::from_millis(2500)
        );

        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 60, 100));
        assert_eq!(
            offsets(&f.engine),
            vec![Duration::ZERO, Duration::from_millis(2500)]
        );
        Ok(())
    }

    #[test]
    fn test_create_failure_leaves_registry() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a"), clip("broken")], 1)?;
        start(&mut f, "a");
        f.engine.fail_create(&media("broken"));

        assert_eq!(start(&mut f, "broken"), StartOutcome::Failed);
        assert_eq!(names(&f.scheduler), vec!["a"]);
        assert!(f.engine.destroyed().is_empty());
        let stats = f.scheduler.stats().snapshot();
        assert_eq!(stats.start_failures, 1);
        assert_eq!(stats.evictions, 0);
        Ok(())
    }

    #[test]
    fn test_destroy_failure_still_removes() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a")], 4)?;
        start(&mut f, "a");
        f.engine.fail_destroy(true);

        assert!(f.scheduler.stop(&key("a")));
        assert!(f.scheduler.registry().is_empty());
        assert_eq!(f.scheduler.stats().snapshot().destroy_failures, 1);
        // The engine kept the handle, which is the leak the counter reports.
        assert_eq!(f.engine.live_count(), 1);
        Ok(())
    }

    #[test]
    fn test_loop_period_restarts() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a")
                .with_segment(Duration::from_secs(1), None)
                .with_loop_period(Some(Duration::from_secs(2)))],
            4,
        )?;
        start(&mut f, "a");
        let t0 = f.clock.now();
        assert_eq!(f.scheduler.next_deadline(), Some(t0 + Duration::from_secs(2)));

        f.clock.advance(Duration::from_secs(1));
        f.scheduler.fire_due_timers();
        assert_eq!(f.engine.created().len(), 1);

        f.clock.advance(Duration::from_secs(1));
        f.scheduler.fire_due_timers();
        assert_eq!(
            offsets(&f.engine),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
        assert_eq!(f.engine.destroyed(), vec![1]);
        assert_eq!(f.scheduler.registry().len(), 1);
        assert_eq!(
            f.scheduler.next_deadline(),
            Some(t0 + Duration::from_secs(4))
        );
        assert_eq!(f.scheduler.stats().snapshot().loop_restarts, 1);
        Ok(())
    }

    #[test]
    fn test_wildcard_loop_restart_zeroes_position() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![Clip::new("any", media("any"))
                .with_required_notes([48])
                .with_loop_period(Some(Duration::from_secs(4)))],
            4,
        )?;
        let any = f.scheduler.catalog().clips()[0].clone();
        f.scheduler.handle_trigger(&TriggerEvent::note_on(0, 48, 100));
        f.clock.advance(Duration::from_secs(1));
        f.scheduler.handle_trigger(&TriggerEvent::note_on(1, 48, 100));

        // The first channel's loop period elapses while the second keeps playing.
        f.clock.advance(Duration::from_secs(3));
        f.scheduler.fire_due_timers();
        assert_eq!(f.scheduler.registry().len(), 2);
        assert_eq!(f.scheduler.stats().snapshot().loop_restarts, 1);
        assert_eq!(
            f.scheduler.positions().elapsed(any.id(), f.clock.now()),
            Duration::ZERO
        );

        f.clock.advance(Duration::from_millis(500));
        assert_eq!(
            f.scheduler.positions().elapsed(any.id(), f.clock.now()),
            Duration::from_millis(500)
        );
        Ok(())
    }

    #[test]
    fn test_stopping_cancels_timer() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a").with_loop_period(Some(Duration::from_secs(2)))],
            4,
        )?;
        start(&mut f, "a");
        f.scheduler.stop(&key("a"));
        assert_eq!(f.scheduler.next_deadline(), None);

        f.clock.advance(Duration::from_secs(5));
        f.scheduler.fire_due_timers();
        assert_eq!(f.engine.created().len(), 1);
        Ok(())
    }

    #[test]
    fn test_segment_end_seeks() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a").with_segment(Duration::from_secs(10), Some(Duration::from_secs(20)))],
            4,
        )?;
        start(&mut f, "a");
        let a = f.scheduler.catalog().clips()[0].clone();
        let handle = f.engine.live_handles()[0];

        f.engine.set_position(handle, Duration::from_secs(15));
        f.clock.advance(POLL);
        f.scheduler.fire_due_timers();
        assert!(f.engine.seeks().is_empty());

        f.engine.set_position(handle, Duration::from_secs(20));
        f.clock.advance(POLL);
        f.scheduler.fire_due_timers();
        assert_eq!(f.engine.seeks(), vec![(handle, Duration::from_secs(10))]);
        assert_eq!(f.scheduler.positions().elapsed(a.id(), f.clock.now()), Duration::ZERO);

        // The poller keeps running after a loop.
        assert_eq!(
            f.scheduler.next_deadline(),
            Some(f.clock.now() + POLL)
        );
        Ok(())
    }

    #[test]
    fn test_failed_seek_restarts() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a").with_segment(Duration::from_secs(10), Some(Duration::from_secs(20)))],
            4,
        )?;
        start(&mut f, "a");
        let handle = f.engine.live_handles()[0];
        f.engine.fail_seek(true);
        f.engine.set_position(handle, Duration::from_secs(21));
        f.clock.advance(POLL);
        f.scheduler.fire_due_timers();

        assert_eq!(f.engine.destroyed(), vec![handle]);
        assert_eq!(
            offsets(&f.engine),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
        assert_eq!(f.scheduler.registry().len(), 1);
        Ok(())
    }

    #[test]
    fn test_end_of_stream_loops() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a").with_segment(Duration::from_secs(3), None)], 4)?;
        start(&mut f, "a");
        let handle = f.engine.live_handles()[0];

        f.scheduler
            .handle_engine_event(EngineEvent::EndOfStream(handle));
        assert_eq!(f.engine.seeks(), vec![(handle, Duration::from_secs(3))]);

        // Events for handles that are gone are ignored.
        f.scheduler.stop(&key("a"));
        f.scheduler
            .handle_engine_event(EngineEvent::EndOfStream(handle));
        assert_eq!(f.engine.seeks().len(), 1);
        assert_eq!(f.engine.created().len(), 1);
        Ok(())
    }

    #[test]
    fn test_engine_error_stops_session() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a"), clip("b")], 4)?;
        start(&mut f, "a");
        start(&mut f, "b");
        let handle = f.engine.live_handles()[0];

        f.scheduler.handle_engine_event(EngineEvent::Error {
            handle,
            message: String::from("decoder exploded"),
        });
        assert_eq!(names(&f.scheduler), vec!["b"]);
        assert_eq!(f.scheduler.stats().snapshot().engine_errors, 1);
        Ok(())
    }

    #[test]
    fn test_layout_follows_registry() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a"), clip("b"), clip("c")], 4)?;
        start(&mut f, "a");
        let first = f.engine.live_handles()[0];
        assert_eq!(f.engine.rect(first), Some(Rect::new(0, 0, 1920, 1080)));

        start(&mut f, "b");
        start(&mut f, "c");
        let handles = f.engine.live_handles();
        let rects: Vec<Option<Rect>> = handles.iter().map(|h| f.engine.rect(*h)).collect();
        let expected: Vec<Option<Rect>> = layout(Canvas::default(), 3).into_iter().map(Some).collect();
        assert_eq!(rects, expected);

        f.scheduler.stop(&key("a"));
        let slots: Vec<Option<usize>> = f
            .scheduler
            .registry()
            .iter()
            .map(|session| session.layout_slot())
            .collect();
        assert_eq!(slots, vec![Some(0), Some(1)]);
        assert_eq!(f.engine.rect(handles[1]), Some(Rect::new(0, 0, 960, 1080)));
        assert_eq!(f.engine.rect(handles[2]), Some(Rect::new(960, 0, 960, 1080)));
        Ok(())
    }

    #[test]
    fn test_manual_commands() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(vec![clip("a")], 4)?;
        f.scheduler.handle_manual(&ManualCommand::Start {
            source: String::from("keyboard"),
            trigger: String::from("a"),
        });
        f.scheduler.handle_manual(&ManualCommand::Start {
            source: String::from("keyboard"),
            trigger: String::from("nothing"),
        });
        assert!(f
            .scheduler
            .registry()
            .contains(&TriggerKey::manual("keyboard", "a")));
        assert_eq!(f.scheduler.registry().len(), 1);

        f.scheduler.handle_manual(&ManualCommand::Stop {
            source: String::from("keyboard"),
            trigger: String::from("a"),
        });
        assert!(f.scheduler.registry().is_empty());
        Ok(())
    }

    #[test]
    fn test_shutdown_stops_everything() -> Result<(), Box<dyn Error>> {
        let mut f = fixture(
            vec![clip("a").with_loop_period(Some(Duration::from_secs(1))), clip("b")],
            4,
        )?;
        start(&mut f, "a");
        start(&mut f, "b");
        f.scheduler.shutdown();

        assert!(f.scheduler.registry().is_empty());
        assert_eq!(f.engine.live_count(), 0);
        assert_eq!(f.engine.destroyed(), vec![1, 2]);
        assert_eq!(f.scheduler.next_deadline(), None);
        Ok(())
    }

    #[test]
    fn test_capacity_holds_for_random_input() -> Result<(), Box<dyn Error>> {
        let clips = vec![
            clip("a").with_required_notes([60]),
            clip("b").with_required_notes([60, 62]).with_exclusive(true),
            clip("c")
                .with_required_notes([64])
                .with_channel(MidiChannel::Channel(1))
                .with_loop_period(Some(Duration::from_millis(300))),
            clip("d")
                .with_required_notes([62, 65])
                .with_segment(Duration::from_secs(1), Some(Duration::from_secs(2))),
            clip("e").with_restart_on_play(true),
        ];
        let triggers = ["a", "b", "c", "d", "e"];
        let notes = [60, 62, 64, 65];

        for max_sessions in 1..=MAX_LAYOUT_SLOTS {
            let mut f = fixture(clips.clone(), max_sessions)?;
            let mut rng = StdRng::seed_from_u64(0x5eed + max_sessions as u64);

            for _ in 0..2000 {
                match rng.gen_range(0..6) {
                    0 | 1 => {
                        let channel = rng.gen_range(0..3);
                        let note = notes[rng.gen_range(0..notes.len())];
                        let velocity = if rng.gen_bool(0.5) { 100 } else { 0 };
                        f.scheduler
                            .handle_trigger(&TriggerEvent::note_on(channel, note, velocity));
                    }
                    2 => {
                        start(&mut f, triggers[rng.gen_range(0..triggers.len())]);
                    }
                    3 => {
                        f.scheduler
                            .stop(&key(triggers[rng.gen_range(0..triggers.len())]));
                    }
                    4 => {
                        f.clock.advance(Duration::from_millis(rng.gen_range(0..400)));
                        f.scheduler.fire_due_timers();
                    }
                    _ => {
                        let live = f.engine.live_handles();
                        if !live.is_empty() {
                            let handle = live[rng.gen_range(0..live.len())];
                            f.scheduler
                                .handle_engine_event(EngineEvent::EndOfStream(handle));
                        }
                    }
                }

                let registry = f.scheduler.registry();
                assert!(registry.len() <= max_sessions);
                assert_eq!(registry.len(), f.engine.live_count());
                let keys: BTreeSet<String> =
                    registry.iter().map(|s| s.trigger_key().to_string()).collect();
                assert_eq!(keys.len(), registry.len());
            }

            f.scheduler.shutdown();
            assert_eq!(f.engine.live_count(), 0);
        }
        Ok(())
    }
}
