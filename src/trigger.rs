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

//! Normalized trigger events and the keys that identify playback instances.

use std::fmt;
use std::time::Instant;

use midly::live::LiveEvent;
use midly::MidiMessage;

use crate::catalog::{Clip, ClipId};

/// A normalized note on/off event. Channels are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub timestamp: Instant,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub is_on: bool,
}

impl TriggerEvent {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> TriggerEvent {
        TriggerEvent {
            timestamp: Instant::now(),
            channel,
            note,
            velocity,
            is_on: true,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> TriggerEvent {
        TriggerEvent {
            timestamp: Instant::now(),
            channel,
            note,
            velocity: 0,
            is_on: false,
        }
    }

    /// Parses raw MIDI bytes. Only note on and note off produce events.
    pub fn from_raw(raw: &[u8], timestamp: Instant) -> Option<TriggerEvent> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(raw).ok()? else {
            return None;
        };

        let (note, velocity, is_on) = match message {
            MidiMessage::NoteOn { key, vel } => (u8::from(key), u8::from(vel), true),
            MidiMessage::NoteOff { key, vel } => (u8::from(key), u8::from(vel), false),
            _ => return None,
        };

        Some(TriggerEvent {
            timestamp,
            channel: u8::from(channel),
            note,
            velocity,
            is_on,
        })
    }

    /// Note on with velocity 0 is a note off.
    pub fn is_note_on(&self) -> bool {
        self.is_on && self.velocity > 0
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_note_on() { "on" } else { "off" };
        write!(
            f,
            "note {} ch={} note={} vel={}",
            kind,
            self.channel + 1,
            self.note,
            self.velocity
        )
    }
}

/// Identifies one potential playback instance. At most one session exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerKey {
    /// A clip started by a chord on a channel.
    Chord { clip: ClipId, channel: u8 },
    /// A clip started manually from a named source.
    Manual { source: String, code: String },
}

impl TriggerKey {
    pub fn chord(clip: &Clip, channel: u8) -> TriggerKey {
        TriggerKey::Chord {
            clip: clip.id().clone(),
            channel,
        }
    }

    pub fn manual(source: &str, code: &str) -> TriggerKey {
        TriggerKey::Manual {
            source: source.to_string(),
            code: code.to_string(),
        }
    }

    /// The MIDI channel of chord-triggered keys.
    pub fn channel(&self) -> Option<u8> {
        match self {
            TriggerKey::Chord { channel, .. } => Some(*channel),
            TriggerKey::Manual { .. } => None,
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKey::Chord { clip, channel } => write!(f, "{}@ch{}", clip, channel + 1),
            TriggerKey::Manual { source, code } => write!(f, "{}:{}", source, code),
        }
    }
}

/// Requests from the manual/debug trigger surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualCommand {
    /// Starts the clip bound to the debug trigger.
    Start { source: String, trigger: String },
    /// Stops the clip bound to the debug trigger.
    Stop { source: String, trigger: String },
    /// Shuts the installation down.
    Shutdown,
}
