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

//! Chord matching: which clips the currently held notes ask for.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::catalog::{Catalog, Clip};
use crate::trigger::{TriggerEvent, TriggerKey};

static NO_NOTES: BTreeSet<u8> = BTreeSet::new();

/// The notes currently held on each channel.
#[derive(Default, Debug)]
pub struct ActiveNotes {
    held: HashMap<u8, BTreeSet<u8>>,
}

impl ActiveNotes {
    /// Applies a note event and returns the channel it affected.
    pub fn apply(&mut self, event: &TriggerEvent) -> u8 {
        if event.is_note_on() {
            self.held.entry(event.channel).or_default().insert(event.note);
        } else if let Some(notes) = self.held.get_mut(&event.channel) {
            notes.remove(&event.note);
            if notes.is_empty() {
                self.held.remove(&event.channel);
            }
        }
        event.channel
    }

    /// The notes held on the channel.
    pub fn held(&self, channel: u8) -> &BTreeSet<u8> {
        self.held.get(&channel).unwrap_or(&NO_NOTES)
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

/// Every clip whose chord is satisfied on the channel, in catalog order, paired
/// with the key its session would run under.
pub fn should_be_active(
    catalog: &Catalog,
    channel: u8,
    held: &BTreeSet<u8>,
) -> Vec<(Arc<Clip>, TriggerKey)> {
    catalog
        .clips()
        .iter()
        .filter(|clip| clip.activated_by(channel, held))
        .map(|clip| (clip.clone(), TriggerKey::chord(clip, channel)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MediaReference, MidiChannel};

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Clip::new("triad", MediaReference::new("file:///triad.mp4"))
                .with_channel(MidiChannel::Channel(0))
                .with_required_notes([60, 64, 67]),
            Clip::new("anywhere", MediaReference::new("file:///anywhere.mp4"))
                .with_required_notes([60]),
            Clip::new("manual", MediaReference::new("file:///manual.mp4"))
                .with_debug_trigger(Some(String::from("m"))),
        ])
        .expect("valid catalog")
    }

    fn names(active: &[(Arc<Clip>, TriggerKey)]) -> Vec<&str> {
        active.iter().map(|(clip, _)| clip.name()).collect()
    }

    #[test]
    fn test_chord_subset() {
        let catalog = catalog();
        let held = BTreeSet::from([60, 64]);
        assert_eq!(names(&should_be_active(&catalog, 0, &held)), vec!["anywhere"]);

        let held = BTreeSet::from([60, 64, 67, 72]);
        assert_eq!(
            names(&should_be_active(&catalog, 0, &held)),
            vec!["triad", "anywhere"]
        );

        let held = BTreeSet::from([60, 67]);
        assert_eq!(names(&should_be_active(&catalog, 0, &held)), vec!["anywhere"]);
    }

    #[test]
    fn test_wildcard_keys_per_channel() {
        let catalog = catalog();
        let held = BTreeSet::from([60, 64, 67]);
        let on_zero = should_be_active(&catalog, 0, &held);
        let on_five = should_be_active(&catalog, 5, &held);
        assert_eq!(names(&on_five), vec!["anywhere"]);
        assert_ne!(on_zero[1].1, on_five[0].1);
        assert_eq!(on_five[0].1.channel(), Some(5));
    }

    #[test]
    fn test_no_notes_never_matches() {
        let catalog = catalog();
        assert!(should_be_active(&catalog, 0, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_active_notes() {
        let mut notes = ActiveNotes::default();
        assert_eq!(notes.apply(&TriggerEvent::note_on(2, 60, 90)), 2);
        notes.apply(&TriggerEvent::note_on(2, 64, 90));
        notes.apply(&TriggerEvent::note_on(3, 60, 90));
        assert_eq!(notes.held(2), &BTreeSet::from([60, 64]));

        // Velocity zero releases the note.
        notes.apply(&TriggerEvent::note_on(2, 60, 0));
        assert_eq!(notes.held(2), &BTreeSet::from([64]));
        notes.apply(&TriggerEvent::note_off(2, 64));
        assert!(notes.held(2).is_empty());

        // Releasing a note that isn't held is harmless.
        notes.apply(&TriggerEvent::note_off(7, 10));
        assert!(notes.held(7).is_empty());
        assert_eq!(notes.held(3), &BTreeSet::from([60]));
    }
}
