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
    sync::Arc,
    time::{Duration, Instant},
};

use super::timers::TimerId;
use crate::catalog::Clip;
use crate::engine::{EngineHandle, HandleId};
use crate::trigger::TriggerKey;

/// A live playback instance. Owns its engine handle and its timer.
#[derive(Debug)]
pub struct Session {
    pub(super) clip: Arc<Clip>,
    pub(super) handle: EngineHandle,
    pub(super) trigger_key: TriggerKey,
    pub(super) layout_slot: Option<usize>,
    pub(super) loop_timer: Option<TimerId>,
    pub(super) created_at: Instant,
    pub(super) start_offset: Duration,
}

impl Session {
    pub fn clip(&self) -> &Arc<Clip> {
        &self.clip
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle.id()
    }

    pub fn trigger_key(&self) -> &TriggerKey {
        &self.trigger_key
    }

    pub fn layout_slot(&self) -> Option<usize> {
        self.layout_slot
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The media offset playback started from.
    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.clip.name(),
            self.trigger_key,
            self.handle
        )
    }
}

/// Live sessions in insertion order, oldest first. Keys are unique.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, key: &TriggerKey) -> bool {
        self.sessions
            .iter()
            .any(|session| &session.trigger_key == key)
    }

    pub fn get(&self, key: &TriggerKey) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|session| &session.trigger_key == key)
    }

    pub(super) fn get_mut(&mut self, key: &TriggerKey) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|session| &session.trigger_key == key)
    }

    /// The key of the session playing on the given engine handle.
    pub fn key_for_handle(&self, handle: HandleId) -> Option<&TriggerKey> {
        self.sessions
            .iter()
            .find(|session| session.handle.id() == handle)
            .map(|session| &session.trigger_key)
    }

    /// The key of the oldest session.
    pub fn oldest(&self) -> Option<&TriggerKey> {
        self.sessions.first().map(|session| &session.trigger_key)
    }

    /// The keys of chord sessions on the channel, oldest first.
    pub fn chord_keys_on(&self, channel: u8) -> Vec<TriggerKey> {
        self.sessions
            .iter()
            .filter(|session| session.trigger_key.channel() == Some(channel))
            .map(|session| session.trigger_key.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<TriggerKey> {
        self.sessions
            .iter()
            .map(|session| session.trigger_key.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    /// Appends the session as the newest. The caller guarantees the key is absent.
    pub(super) fn push(&mut self, session: Session) {
        debug_assert!(!self.contains(&session.trigger_key));
        self.sessions.push(session);
    }

    pub(super) fn remove(&mut self, key: &TriggerKey) -> Option<Session> {
        let index = self
            .sessions
            .iter()
            .position(|session| &session.trigger_key == key)?;
        Some(self.sessions.remove(index))
    }
}
