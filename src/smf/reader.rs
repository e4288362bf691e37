//! Standard MIDI File reader
//!
//! nom-based parser for SMF formats 0, 1 and 2 with tick-based division.
//! Events come back as [`TrackEvent`] lists with running status resolved,
//! absolute times filled in and meta/sysex payloads kept verbatim, so a file
//! written by [`super::write_smf`] reads back into the same events.
//!
//! Unknown chunks are skipped. Running status survives meta and sysex events,
//! which strict readers reject but plenty of real-world files rely on.

use super::event::{ChannelMessage, TrackEvent, META};
use super::writer::{HEADER_MAGIC, TRACK_MAGIC};
use super::Smf;
use crate::error::SmfError;
use nom::{
    bytes::complete::{tag, take},
    error::{Error, ErrorKind},
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};

const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

struct Header {
    length: u32,
    format: u16,
    track_count: u16,
    division: u16,
}

fn vlq(input: &[u8]) -> IResult<&[u8], u32> {
    let mut value = 0u32;
    let mut rest = input;
    for _ in 0..4 {
        let (remaining, byte) = be_u8(rest)?;
        rest = remaining;
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((rest, value));
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::TooLarge)))
}

fn header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, _) = tag(&HEADER_MAGIC[..])(input)?;
    let (input, length) = be_u32(input)?;
    let (input, format) = be_u16(input)?;
    let (input, track_count) = be_u16(input)?;
    let (input, division) = be_u16(input)?;
    // Longer headers carry fields this reader ignores
    let (input, _) = take(length.saturating_sub(6) as usize)(input)?;
    Ok((
        input,
        Header {
            length,
            format,
            track_count,
            division,
        },
    ))
}

fn chunk(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (input, id) = take(4usize)(input)?;
    let (input, length) = be_u32(input)?;
    let (input, body) = take(length as usize)(input)?;
    Ok((input, (id, body)))
}

/// Length-prefixed payload, returned together with its length bytes
fn sized_payload(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (after_length, length) = vlq(input)?;
    let length_bytes = &input[..input.len() - after_length.len()];
    let (rest, data) = take(length as usize)(after_length)?;
    let mut payload = Vec::with_capacity(length_bytes.len() + data.len());
    payload.extend_from_slice(length_bytes);
    payload.extend_from_slice(data);
    Ok((rest, payload))
}

fn event<'a>(input: &'a [u8], running_status: &mut Option<u8>) -> IResult<&'a [u8], (u8, Vec<u8>)> {
    let (after_status, first) = be_u8(input)?;
    let (input, status) = if first & 0x80 != 0 {
        (after_status, first)
    } else {
        match *running_status {
            Some(status) => (input, status),
            None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
        }
    };

    match status {
        META => {
            let (input, subtype) = be_u8(input)?;
            let (input, payload) = sized_payload(input)?;
            let mut contents = Vec::with_capacity(payload.len() + 1);
            contents.push(subtype);
            contents.extend_from_slice(&payload);
            Ok((input, (status, contents)))
        }
        SYSEX | SYSEX_ESCAPE => {
            let (input, payload) = sized_payload(input)?;
            Ok((input, (status, payload)))
        }
        _ => match ChannelMessage::from_status(status) {
            Some(message) => {
                let (input, data) = take(message.data_len())(input)?;
                *running_status = Some(status);
                Ok((input, (status, data.to_vec())))
            }
            None => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
        },
    }
}

fn parse_track(body: &[u8], track: usize) -> Result<Vec<TrackEvent>, SmfError> {
    let mut events = Vec::new();
    let mut rest = body;
    let mut absolute_time = 0u32;
    let mut running_status = None;

    while !rest.is_empty() {
        let offset = body.len() - rest.len();
        let malformed = || SmfError::MalformedEvent { track, offset };

        let (remaining, delta_time) = vlq(rest).map_err(|_| malformed())?;
        let (remaining, (event_type, contents)) =
            event(remaining, &mut running_status).map_err(|_| malformed())?;
        rest = remaining;

        absolute_time = absolute_time.saturating_add(delta_time);
        let event = TrackEvent {
            delta_time,
            absolute_time,
            event_type,
            contents,
            ..TrackEvent::default()
        };
        let finished = event.is_end_of_track();
        events.push(event);
        if finished {
            break;
        }
    }

    Ok(events)
}

/// Parse a Standard MIDI File
pub fn read_smf(data: &[u8]) -> Result<Smf, SmfError> {
    let (mut rest, header) = header(data).map_err(|_| SmfError::MissingHeader)?;
    if header.length < 6 {
        return Err(SmfError::HeaderLength(header.length));
    }
    if header.division & 0x8000 != 0 {
        return Err(SmfError::SmpteDivision(header.division));
    }
    if header.format > 2 {
        return Err(SmfError::UnsupportedFormat(header.format));
    }

    let mut tracks = Vec::with_capacity(usize::from(header.track_count));
    while tracks.len() < usize::from(header.track_count) && !rest.is_empty() {
        let track = tracks.len();
        let (remaining, (id, body)) = chunk(rest).map_err(|_| SmfError::TruncatedTrack { track })?;
        rest = remaining;
        if id != &TRACK_MAGIC[..] {
            tracing::debug!("skipping unknown chunk {:?}", String::from_utf8_lossy(id));
            continue;
        }
        tracks.push(parse_track(body, track)?);
    }

    if tracks.len() < usize::from(header.track_count) {
        tracing::warn!(
            "header announces {} tracks, file holds {}",
            header.track_count,
            tracks.len()
        );
    }

    Ok(Smf {
        format: header.format,
        division: header.division,
        tracks,
    })
}
