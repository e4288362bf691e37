//! Note splitting
//!
//! The game format stores a duration on each note-on. Standard MIDI needs a
//! matching note-off, so every note-on with a duration gets a note-off (same
//! status byte, velocity 0) at `on + duration`, placed before the first later
//! event at or after that tick.
//!
//! Note-offs are sorted once and merged into the event list, which yields the
//! same order as inserting them one by one.

use crate::smf::{recompute_deltas, ChannelMessage, TrackEvent};

/// Insert note-offs and recompute deltas.
///
/// `events` must be sorted by absolute time with the end-of-track event last.
/// Note-offs beyond the end push the end-of-track later unless
/// `clamp_to_end` is set, in which case they are pulled back to the end.
pub fn split_notes(events: Vec<TrackEvent>, clamp_to_end: bool) -> Vec<TrackEvent> {
    let end_time = events
        .last()
        .filter(|event| event.is_end_of_track())
        .map(|event| event.absolute_time);

    let mut note_offs: Vec<TrackEvent> = events
        .iter()
        .filter(|event| {
            event.message() == Some(ChannelMessage::NoteOn) && event.duration_time > 0
        })
        .filter_map(|event| {
            let &key = event.contents.first()?;
            let mut shutoff = event.absolute_time.saturating_add(event.duration_time);
            if let (true, Some(end)) = (clamp_to_end, end_time) {
                shutoff = shutoff.min(end);
            }
            Some(TrackEvent::channel(shutoff, event.event_type, &[key, 0]))
        })
        .collect();
    // Stable, so notes ending together keep their note-on order
    note_offs.sort_by_key(|event| event.absolute_time);

    let mut out = Vec::with_capacity(events.len() + note_offs.len());
    let mut pending = note_offs.into_iter().peekable();

    for mut event in events {
        if event.is_end_of_track() {
            for off in pending.by_ref() {
                event.absolute_time = event.absolute_time.max(off.absolute_time);
                out.push(off);
            }
        } else {
            while let Some(off) = pending.next_if(|off| off.absolute_time <= event.absolute_time) {
                out.push(off);
            }
        }
        out.push(event);
    }
    out.extend(pending);

    recompute_deltas(&mut out);
    out
}
