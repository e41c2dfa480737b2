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

//! The clip catalog: the immutable set of clips an installation can play.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::error::ConfigError;

/// Stable identity of a clip, derived from its name, media and timing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(String);

impl ClipId {
    /// Hashes the identifying parts of a clip into a 128 bit hex id.
    fn derive(
        name: &str,
        media_reference: &MediaReference,
        start_offset: Duration,
        end_offset: Option<Duration>,
    ) -> ClipId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(media_reference.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&start_offset.as_nanos().to_le_bytes());
        match end_offset {
            Some(end_offset) => hasher.update(&end_offset.as_nanos().to_le_bytes()),
            None => hasher.update(b"end"),
        };
        ClipId(hex::encode(&hasher.finalize().as_bytes()[..16]))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight characters is plenty to tell clips apart in logs.
        write!(f, "{}", &self.0[..8])
    }
}

/// An opaque locator handed to the playback engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaReference(String);

impl MediaReference {
    pub fn new(locator: impl Into<String>) -> MediaReference {
        MediaReference(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The MIDI channel a clip listens on. Channels are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MidiChannel {
    #[default]
    Any,
    Channel(u8),
}

impl MidiChannel {
    /// Returns true if events on the given channel are relevant to this clip.
    pub fn matches(&self, channel: u8) -> bool {
        match self {
            MidiChannel::Any => true,
            MidiChannel::Channel(c) => *c == channel,
        }
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiChannel::Any => write!(f, "any"),
            // Displayed 1-based, the way channels are written in the catalog.
            MidiChannel::Channel(c) => write!(f, "{}", c + 1),
        }
    }
}

/// A single playable clip. Immutable once the catalog is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    id: ClipId,
    name: String,
    media_reference: MediaReference,
    start_offset: Duration,
    end_offset: Option<Duration>,
    midi_channel: MidiChannel,
    required_notes: BTreeSet<u8>,
    exclusive: bool,
    restart_on_play: bool,
    loop_period: Option<Duration>,
    debug_trigger: Option<String>,
}

impl Clip {
    /// Creates a clip that plays the whole media from the start and has no triggers.
    pub fn new(name: &str, media_reference: MediaReference) -> Clip {
        let id = ClipId::derive(name, &media_reference, Duration::ZERO, None);
        Clip {
            id,
            name: name.to_string(),
            media_reference,
            start_offset: Duration::ZERO,
            end_offset: None,
            midi_channel: MidiChannel::Any,
            required_notes: BTreeSet::new(),
            exclusive: false,
            restart_on_play: false,
            loop_period: None,
            debug_trigger: None,
        }
    }

    /// Sets the segment of the media this clip plays.
    pub fn with_segment(mut self, start_offset: Duration, end_offset: Option<Duration>) -> Clip {
        self.start_offset = start_offset;
        self.end_offset = end_offset;
        self.id = ClipId::derive(&self.name, &self.media_reference, start_offset, end_offset);
        self
    }

    pub fn with_channel(mut self, midi_channel: MidiChannel) -> Clip {
        self.midi_channel = midi_channel;
        self
    }

    pub fn with_required_notes(mut self, notes: impl IntoIterator<Item = u8>) -> Clip {
        self.required_notes = notes.into_iter().collect();
        self
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Clip {
        self.exclusive = exclusive;
        self
    }

    pub fn with_restart_on_play(mut self, restart_on_play: bool) -> Clip {
        self.restart_on_play = restart_on_play;
        self
    }

    pub fn with_loop_period(mut self, loop_period: Option<Duration>) -> Clip {
        self.loop_period = loop_period;
        self
    }

    pub fn with_debug_trigger(mut self, debug_trigger: Option<String>) -> Clip {
        self.debug_trigger = debug_trigger;
        self
    }

    pub fn id(&self) -> &ClipId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_reference(&self) -> &MediaReference {
        &self.media_reference
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    /// The end of the segment, or None to play to the natural end of the media.
    pub fn end_offset(&self) -> Option<Duration> {
        self.end_offset
    }

    pub fn midi_channel(&self) -> MidiChannel {
        self.midi_channel
    }

    pub fn required_notes(&self) -> &BTreeSet<u8> {
        &self.required_notes
    }

    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn restart_on_play(&self) -> bool {
        self.restart_on_play
    }

    pub fn loop_period(&self) -> Option<Duration> {
        self.loop_period
    }

    pub fn debug_trigger(&self) -> Option<&str> {
        self.debug_trigger.as_deref()
    }

    /// The length of the segment, if the segment has a finite end.
    pub fn segment_duration(&self) -> Option<Duration> {
        self.end_offset
            .map(|end| end.saturating_sub(self.start_offset))
    }

    /// Returns true if the chord engine can ever start this clip.
    pub fn is_chord_triggered(&self) -> bool {
        !self.required_notes.is_empty()
    }

    /// The activation predicate: the clip listens on the channel and every
    /// required note is currently held. Clips without required notes are
    /// never activated by chords.
    pub fn activated_by(&self, channel: u8, held: &BTreeSet<u8>) -> bool {
        self.is_chord_triggered()
            && self.midi_channel.matches(channel)
            && self.required_notes.is_subset(held)
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = match self.end_offset {
            Some(end) => format!("{:.2}s", end.as_secs_f64()),
            None => String::from("end"),
        };
        write!(
            f,
            "{} ({}) [{:.2}s-{}] channel: {}, notes: {:?}",
            self.name,
            self.id,
            self.start_offset.as_secs_f64(),
            end,
            self.midi_channel,
            self.required_notes,
        )?;
        if let Some(debug_trigger) = &self.debug_trigger {
            write!(f, ", debug trigger: {}", debug_trigger)?;
        }
        Ok(())
    }
}

/// The full set of clips, in catalog order.
#[derive(Debug, Default)]
pub struct Catalog {
    clips: Vec<Arc<Clip>>,
    by_id: HashMap<ClipId, usize>,
    by_debug_trigger: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate ids and duplicate debug triggers.
    pub fn new(clips: Vec<Clip>) -> Result<Catalog, ConfigError> {
        let mut by_id = HashMap::new();
        let mut by_debug_trigger = HashMap::new();

        for (i, clip) in clips.iter().enumerate() {
            if by_id.insert(clip.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateClip(clip.name.clone()));
            }
            if let Some(debug_trigger) = &clip.debug_trigger {
                if by_debug_trigger.insert(debug_trigger.clone(), i).is_some() {
                    return Err(ConfigError::DuplicateDebugTrigger(debug_trigger.clone()));
                }
            }
        }

        Ok(Catalog {
            clips: clips.into_iter().map(Arc::new).collect(),
            by_id,
            by_debug_trigger,
        })
    }

    pub fn clips(&self) -> &[Arc<Clip>] {
        &self.clips
    }

    pub fn get(&self, id: &ClipId) -> Option<&Arc<Clip>> {
        self.by_id.get(id).map(|i| &self.clips[*i])
    }

    /// Looks up the clip bound to a manual/debug trigger.
    pub fn by_debug_trigger(&self, debug_trigger: &str) -> Option<&Arc<Clip>> {
        self.by_debug_trigger
            .get(debug_trigger)
            .map(|i| &self.clips[*i])
    }

    /// All configured debug triggers, sorted.
    pub fn debug_triggers(&self) -> Vec<&str> {
        let mut triggers: Vec<&str> = self.by_debug_trigger.keys().map(|t| t.as_str()).collect();
        triggers.sort();
        triggers
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
