//! Temporal decoder: turns a MIDI stem's delta-tick event stream into
//! note messages stamped with absolute wall-clock seconds.
//!
//! Timing always assumes 120 BPM (500,000 µs per beat). Tempo meta events
//! inside the stem are ignored so every stem of a song shares one clock.

use std::fs;
use std::path::Path;

use midly::{MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::DecodeError;

/// Fixed tempo applied to every stem, in microseconds per beat.
pub const TEMPO_US_PER_BEAT: u32 = 500_000;

/// A channel-voice note message with its absolute time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Raw message bytes: status (with channel), key, velocity.
    pub bytes: [u8; 3],
    /// Seconds from the start of the stem.
    pub time: f64,
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    pub fn key(&self) -> u8 {
        self.bytes[1]
    }

    pub fn velocity(&self) -> u8 {
        self.bytes[2]
    }

    /// Note-on with a non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.bytes[0] & 0xF0 == 0x90 && self.velocity() > 0
    }

    /// Note-off, or the running-status idiom of a note-on with velocity 0.
    pub fn is_note_off(&self) -> bool {
        let status = self.bytes[0] & 0xF0;
        status == 0x80 || (status == 0x90 && self.velocity() == 0)
    }
}

/// The decoded contents of one stem.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedStem {
    pub events: Vec<MidiEvent>,
    pub ticks_per_beat: u16,
    /// Time of the last event of any kind (end-of-track included), in seconds.
    pub length: f64,
}

/// Convert an absolute tick count to seconds.
pub fn ticks_to_seconds(ticks: u64, tempo_us_per_beat: u32, ticks_per_beat: u16) -> f64 {
    ticks as f64 * tempo_us_per_beat as f64 / 1_000_000.0 / ticks_per_beat as f64
}

/// Decode a stem file from disk.
pub fn decode(path: &Path) -> Result<DecodedStem, DecodeError> {
    let data = fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(&data)
}

/// Decode an in-memory Standard MIDI File.
///
/// Every track runs its own tick counter from zero. Only note-on and
/// note-off messages are kept; the merged result is sorted by time with
/// file order preserved on ties.
pub fn decode_bytes(data: &[u8]) -> Result<DecodedStem, DecodeError> {
    let smf = Smf::parse(data)?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(..) => return Err(DecodeError::TimecodeTiming),
    };
    if ticks_per_beat == 0 {
        return Err(DecodeError::ZeroTicksPerBeat);
    }

    let mut events = Vec::new();
    let mut length = 0.0_f64;
    for track in &smf.tracks {
        let mut ticks: u64 = 0;
        for event in track {
            ticks += u64::from(event.delta.as_int());
            let time = ticks_to_seconds(ticks, TEMPO_US_PER_BEAT, ticks_per_beat);
            length = length.max(time);

            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let ch = channel.as_int();
            let bytes = match message {
                MidiMessage::NoteOn { key, vel } => [0x90 | ch, key.as_int(), vel.as_int()],
                MidiMessage::NoteOff { key, vel } => [0x80 | ch, key.as_int(), vel.as_int()],
                _ => continue,
            };
            events.push(MidiEvent { bytes, time });
        }
    }

    events.sort_by(|a, b| a.time.total_cmp(&b.time));

    Ok(DecodedStem {
        events,
        ticks_per_beat,
        length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{note_off, note_on, smf_bytes};
    use midly::num::{u24, u28, u4, u7};
    use midly::{Format, Fps, Header, MetaMessage, Smf, TrackEvent};

    #[test]
    fn note_off_at_960_ticks_is_one_second() {
        let bytes = smf_bytes(480, vec![vec![note_on(0, 60, 100), note_off(960, 60)]]);
        let stem = decode_bytes(&bytes).expect("decode failed");

        assert_eq!(stem.events.len(), 2);
        assert_eq!(stem.events[0].time, 0.0);
        assert_eq!(stem.events[1].time, 1.0);
        assert!(stem.events[1].is_note_off());
        assert_eq!(stem.ticks_per_beat, 480);
    }

    #[test]
    fn raw_bytes_carry_channel_and_key() {
        let bytes = smf_bytes(96, vec![vec![note_on(0, 64, 90), note_off(96, 64)]]);
        let stem = decode_bytes(&bytes).unwrap();

        assert_eq!(stem.events[0].bytes, [0x90, 64, 90]);
        assert_eq!(stem.events[1].bytes, [0x80, 64, 0]);
        assert_eq!(stem.events[0].channel(), 0);
        assert_eq!(stem.events[0].key(), 64);
    }

    #[test]
    fn tempo_meta_events_are_ignored() {
        let track = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(250_000))),
            },
            note_on(0, 60, 100),
            note_off(480, 60),
        ];
        let stem = decode_bytes(&smf_bytes(480, vec![track])).unwrap();

        // 480 ticks at the fixed 120 BPM, not the stem's 240 BPM
        assert_eq!(stem.events[1].time, 0.5);
    }

    #[test]
    fn non_note_messages_are_dropped() {
        let track = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::ProgramChange { program: u7::new(5) },
                },
            },
            TrackEvent {
                delta: u28::new(10),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::Controller {
                        controller: u7::new(7),
                        value: u7::new(100),
                    },
                },
            },
            note_on(10, 60, 100),
            note_off(100, 60),
        ];
        let stem = decode_bytes(&smf_bytes(480, vec![track])).unwrap();

        assert_eq!(stem.events.len(), 2);
        // delta ticks of dropped events still advance the clock
        let expected = ticks_to_seconds(20, TEMPO_US_PER_BEAT, 480);
        assert_eq!(stem.events[0].time, expected);
    }

    #[test]
    fn velocity_zero_note_on_counts_as_note_off() {
        let bytes = smf_bytes(480, vec![vec![note_on(0, 60, 100), note_on(480, 60, 0)]]);
        let stem = decode_bytes(&bytes).unwrap();

        assert!(stem.events[0].is_note_on());
        assert!(!stem.events[1].is_note_on());
        assert!(stem.events[1].is_note_off());
    }

    #[test]
    fn multi_track_stem_is_non_decreasing() {
        let a = vec![note_on(0, 60, 100), note_off(960, 60), note_on(0, 62, 100), note_off(960, 62)];
        let b = vec![note_on(480, 67, 100), note_off(480, 67)];
        let stem = decode_bytes(&smf_bytes(480, vec![a, b])).unwrap();

        assert_eq!(stem.events.len(), 6);
        for pair in stem.events.windows(2) {
            assert!(
                pair[0].time <= pair[1].time,
                "timestamps must not decrease: {} then {}",
                pair[0].time,
                pair[1].time
            );
        }
        // ties keep file order: track 0's note-off precedes its next note-on
        assert_eq!(stem.events[2].bytes, [0x80, 60, 0]);
        assert_eq!(stem.events[3].bytes, [0x90, 62, 100]);
    }

    #[test]
    fn length_includes_trailing_meta_events() {
        let track = vec![
            note_on(0, 60, 100),
            note_off(480, 60),
            TrackEvent {
                delta: u28::new(960),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        let stem = decode_bytes(&smf_bytes(480, vec![track])).unwrap();

        assert_eq!(stem.length, 1.5);
    }

    #[test]
    fn decoding_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0_piano.mid");
        let bytes = smf_bytes(480, vec![vec![note_on(0, 60, 100), note_off(700, 60)]]);
        std::fs::write(&path, bytes).unwrap();

        let first = decode(&path).unwrap();
        let second = decode(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = decode_bytes(b"definitely not a midi file").unwrap_err();
        assert!(matches!(err, DecodeError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = decode(Path::new("/nonexistent/0_piano.mid")).unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn timecode_timing_is_rejected() {
        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Timecode(Fps::Fps25, 40)),
            tracks: vec![vec![note_on(0, 60, 100), note_off(40, 60)]],
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();

        let err = decode_bytes(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::TimecodeTiming), "got {err:?}");
    }
}
