// MIDI Module - Real-time MIDI input to note state
use anyhow::{anyhow, Result};
use midir::{MidiInput, MidiInputConnection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::N_MIDI_NOTES;

// https://midi.org/expanded-midi-1-0-messages-list
const STATUS_NOTE_OFF: u8 = 0x80;
const STATUS_NOTE_ON: u8 = 0x90;
const STATUS_CONTROL_CHANGE: u8 = 0xB0;

/// Damper pedal controller number
pub const SUSTAIN_CONTROLLER_DEFAULT: u8 = 64;

/// Controller values at or above this count as "pedal down"
const SUSTAIN_ON_THRESHOLD: u8 = 64;

/// Lowest key of an 88-key piano (A0), mapped to LED 0
pub const PIANO_LOW_A_NOTE_NUMBER: u8 = 21;

/// MIDI Event types we care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    SustainChange { on: bool },
}

/// Which incoming messages are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiFilter {
    /// 0-15, or None to accept every channel
    pub channel: Option<u8>,
    pub sustain_controller: u8,
}

impl Default for MidiFilter {
    fn default() -> Self {
        MidiFilter {
            channel: Some(0),
            sustain_controller: SUSTAIN_CONTROLLER_DEFAULT,
        }
    }
}

/// Parse MIDI message bytes into a NoteEvent.
/// Anything that is not a note or the sustain controller yields None.
pub fn parse_midi_message(message: &[u8], filter: &MidiFilter) -> Option<NoteEvent> {
    if message.len() < 3 {
        return None;
    }

    let status = message[0];
    let data1 = message[1] & 0x7F;
    let data2 = message[2] & 0x7F;

    // Extract channel from status byte (0-15, which represents MIDI channels 1-16)
    let channel = status & 0x0F;
    if let Some(wanted) = filter.channel {
        if channel != wanted {
            return None;
        }
    }

    match status & 0xF0 {
        // Note On with velocity 0 is treated as Note Off
        STATUS_NOTE_ON if data2 == 0 => Some(NoteEvent::NoteOff { note: data1 }),
        STATUS_NOTE_ON => Some(NoteEvent::NoteOn { note: data1, velocity: data2 }),
        STATUS_NOTE_OFF => Some(NoteEvent::NoteOff { note: data1 }),
        STATUS_CONTROL_CHANGE if data1 == filter.sustain_controller => Some(NoteEvent::SustainChange {
            on: data2 >= SUSTAIN_ON_THRESHOLD,
        }),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct NoteMaps {
    active: HashMap<u8, u8>,    // note -> velocity, only while the key is held
    sustained: HashMap<u8, u8>, // note -> velocity latched by the pedal
    sustain_on: bool,
}

/// Velocities resolved for all 128 notes at one instant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteSnapshot {
    velocities: [u8; N_MIDI_NOTES],
}

impl NoteSnapshot {
    pub fn silent() -> Self {
        NoteSnapshot { velocities: [0; N_MIDI_NOTES] }
    }

    /// Sounding velocity of a note, 0 when silent
    pub fn velocity(&self, note: u8) -> u8 {
        self.velocities.get(note as usize).copied().unwrap_or(0)
    }
}

/// MIDI note state manager - tracks held notes, pedal-latched notes and the pedal itself.
///
/// Cheap to clone; all clones share the same state. The MIDI callback thread
/// mutates it while the render loop reads snapshots.
#[derive(Clone)]
pub struct NoteState {
    maps: Arc<Mutex<NoteMaps>>,
    filter: MidiFilter,
}

impl NoteState {
    pub fn new(filter: MidiFilter) -> Self {
        NoteState {
            maps: Arc::new(Mutex::new(NoteMaps::default())),
            filter,
        }
    }

    // The maps stay consistent after every statement, so a poisoned lock is still usable
    fn maps(&self) -> MutexGuard<'_, NoteMaps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callback-shaped entry point for raw 3-byte messages
    pub fn handle_raw(&self, status: u8, data1: u8, data2: u8) {
        if let Some(event) = parse_midi_message(&[status, data1, data2], &self.filter) {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&self, event: NoteEvent) {
        let mut maps = self.maps();
        match event {
            NoteEvent::NoteOn { note, velocity } if velocity > 0 => {
                log::debug!("note on  {:>4} ({:3}) vel {}", note_number_to_name(note), note, velocity);
                maps.active.insert(note, velocity);
                if maps.sustain_on {
                    maps.sustained.insert(note, velocity);
                }
            }
            NoteEvent::NoteOn { note, .. } | NoteEvent::NoteOff { note } => {
                log::debug!("note off {:>4} ({:3})", note_number_to_name(note), note);
                // Sustained entries are only ever dropped wholesale on pedal up
                maps.active.remove(&note);
            }
            NoteEvent::SustainChange { on } => {
                log::debug!("sustain {}", if on { "down" } else { "up" });
                maps.sustain_on = on;
                if on {
                    let held: Vec<(u8, u8)> = maps.active.iter().map(|(n, v)| (*n, *v)).collect();
                    maps.sustained.extend(held);
                } else {
                    maps.sustained.clear();
                }
            }
        }
    }

    pub fn active_velocity(&self, note: u8) -> Option<u8> {
        self.maps().active.get(&note).copied()
    }

    pub fn sustained_velocity(&self, note: u8) -> Option<u8> {
        self.maps().sustained.get(&note).copied()
    }

    pub fn sustain_on(&self) -> bool {
        self.maps().sustain_on
    }

    /// Immutable view for one frame. Held velocity wins over a latched one.
    pub fn snapshot(&self) -> NoteSnapshot {
        let maps = self.maps();
        let mut snapshot = NoteSnapshot::silent();
        for (note, slot) in snapshot.velocities.iter_mut().enumerate() {
            let note = note as u8;
            *slot = maps
                .active
                .get(&note)
                .or_else(|| maps.sustained.get(&note))
                .copied()
                .unwrap_or(0);
        }
        snapshot
    }
}

/// Convert MIDI note number to musical note name (e.g., 60 -> "C4")
pub fn note_number_to_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

/// List all available MIDI input ports
/// Returns a vector of port names
pub fn list_midi_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("midiwled")?;
    let ports = midi_in.ports();

    let mut port_names = Vec::new();
    for port in ports.iter() {
        if let Ok(name) = midi_in.port_name(port) {
            port_names.push(name);
        }
    }

    Ok(port_names)
}

/// Find a MIDI input port by name (case-insensitive substring match)
pub fn find_midi_port(midi_in: &MidiInput, port_name: &str) -> Result<usize> {
    let ports = midi_in.ports();

    for (i, port) in ports.iter().enumerate() {
        if let Ok(name) = midi_in.port_name(port) {
            if name.to_lowercase().contains(&port_name.to_lowercase()) {
                return Ok(i);
            }
        }
    }

    Err(anyhow!("MIDI port '{}' not found", port_name))
}

/// Connect to a MIDI input device and feed every message into `note_state`.
/// An empty or unknown device name falls back to the first port.
pub fn connect_midi(device_name: &str, note_state: NoteState) -> Result<MidiInputConnection<()>> {
    let midi_in = MidiInput::new("midiwled")?;

    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(anyhow!("No MIDI input ports available"));
    }

    let port_index = if device_name.is_empty() {
        0
    } else {
        match find_midi_port(&midi_in, device_name) {
            Ok(idx) => idx,
            Err(e) => {
                log::warn!("{}, using first available port", e);
                0
            }
        }
    };

    let port = &ports[port_index];
    let port_name = midi_in.port_name(port).unwrap_or_else(|_| format!("port {}", port_index));

    let connection = midi_in
        .connect(
            port,
            "midiwled_input",
            move |_timestamp, message, _| {
                if let [status, data1, data2, ..] = message {
                    note_state.handle_raw(*status, *data1, *data2);
                }
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect to MIDI port '{}': {}", port_name, e))?;

    log::info!("Listening for MIDI on '{}'", port_name);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> NoteState {
        NoteState::new(MidiFilter::default())
    }

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_number_to_name(0), "C-1");
        assert_eq!(note_number_to_name(21), "A0");
        assert_eq!(note_number_to_name(60), "C4");
        assert_eq!(note_number_to_name(127), "G9");
    }

    #[test]
    fn test_parse_note_messages() {
        let filter = MidiFilter::default();
        assert_eq!(
            parse_midi_message(&[0x90, 60, 100], &filter),
            Some(NoteEvent::NoteOn { note: 60, velocity: 100 })
        );
        assert_eq!(parse_midi_message(&[0x90, 60, 0], &filter), Some(NoteEvent::NoteOff { note: 60 }));
        assert_eq!(parse_midi_message(&[0x80, 60, 64], &filter), Some(NoteEvent::NoteOff { note: 60 }));
    }

    #[test]
    fn test_parse_sustain() {
        let filter = MidiFilter::default();
        assert_eq!(
            parse_midi_message(&[0xB0, 64, 127], &filter),
            Some(NoteEvent::SustainChange { on: true })
        );
        assert_eq!(
            parse_midi_message(&[0xB0, 64, 64], &filter),
            Some(NoteEvent::SustainChange { on: true })
        );
        assert_eq!(
            parse_midi_message(&[0xB0, 64, 63], &filter),
            Some(NoteEvent::SustainChange { on: false })
        );
        // Modulation wheel is not the pedal
        assert_eq!(parse_midi_message(&[0xB0, 1, 127], &filter), None);
    }

    #[test]
    fn test_parse_ignores_unsupported() {
        let filter = MidiFilter::default();
        assert_eq!(parse_midi_message(&[0xE0, 0, 64], &filter), None); // pitch bend
        assert_eq!(parse_midi_message(&[0xC0, 5], &filter), None); // short program change
        assert_eq!(parse_midi_message(&[], &filter), None);
        // Channel 2 is filtered out unless omni
        assert_eq!(parse_midi_message(&[0x91, 60, 100], &filter), None);
        let omni = MidiFilter { channel: None, ..filter };
        assert_eq!(
            parse_midi_message(&[0x91, 60, 100], &omni),
            Some(NoteEvent::NoteOn { note: 60, velocity: 100 })
        );
    }

    #[test]
    fn test_note_on_off() {
        let state = tracker();
        state.handle_raw(0x90, 60, 100);
        assert_eq!(state.active_velocity(60), Some(100));
        assert_eq!(state.sustained_velocity(60), None);

        state.handle_raw(0x90, 60, 0);
        assert_eq!(state.active_velocity(60), None);

        state.handle_raw(0x90, 62, 90);
        state.handle_raw(0x80, 62, 0);
        assert_eq!(state.active_velocity(62), None);

        // Releasing a note that was never pressed is harmless
        state.handle_raw(0x80, 70, 0);
        assert_eq!(state.active_velocity(70), None);
    }

    #[test]
    fn test_sustain_latches_released_note() {
        let state = tracker();
        state.handle_raw(0x90, 60, 100);
        state.handle_raw(0xB0, 64, 127);
        state.handle_raw(0x80, 60, 0);
        assert!(state.sustain_on());
        assert_eq!(state.active_velocity(60), None);
        assert_eq!(state.sustained_velocity(60), Some(100));
        assert_eq!(state.snapshot().velocity(60), 100);

        state.handle_raw(0xB0, 64, 0);
        assert!(!state.sustain_on());
        assert_eq!(state.sustained_velocity(60), None);
        assert_eq!(state.active_velocity(60), None);
        assert_eq!(state.snapshot().velocity(60), 0);
    }

    #[test]
    fn test_note_pressed_while_sustained_is_latched() {
        let state = tracker();
        state.handle_event(NoteEvent::SustainChange { on: true });
        state.handle_event(NoteEvent::NoteOn { note: 64, velocity: 70 });
        state.handle_event(NoteEvent::NoteOff { note: 64 });
        assert_eq!(state.sustained_velocity(64), Some(70));
    }

    #[test]
    fn test_active_overrides_sustained() {
        let state = tracker();
        state.handle_event(NoteEvent::NoteOn { note: 60, velocity: 100 });
        state.handle_event(NoteEvent::SustainChange { on: true });
        state.handle_event(NoteEvent::NoteOff { note: 60 });
        state.handle_event(NoteEvent::SustainChange { on: false });
        state.handle_event(NoteEvent::SustainChange { on: true });
        // Pedal re-engaged with nothing held: nothing latched
        assert_eq!(state.sustained_velocity(60), None);

        state.handle_event(NoteEvent::NoteOn { note: 60, velocity: 100 });
        state.handle_event(NoteEvent::NoteOff { note: 60 });
        assert_eq!(state.sustained_velocity(60), Some(100));

        state.handle_event(NoteEvent::NoteOn { note: 60, velocity: 40 });
        assert_eq!(state.active_velocity(60), Some(40));
        assert_eq!(state.snapshot().velocity(60), 40);
    }

    #[test]
    fn test_stale_sustained_velocity_survives_release() {
        // Release never touches the sustained map, only pedal up does
        let state = tracker();
        state.handle_event(NoteEvent::NoteOn { note: 60, velocity: 100 });
        state.handle_event(NoteEvent::SustainChange { on: true });
        state.handle_event(NoteEvent::SustainChange { on: false });
        assert_eq!(state.sustained_velocity(60), None);
        assert_eq!(state.snapshot().velocity(60), 100);
        state.handle_event(NoteEvent::NoteOff { note: 60 });
        assert_eq!(state.snapshot().velocity(60), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let state = tracker();
        let callback_side = state.clone();
        std::thread::spawn(move || callback_side.handle_raw(0x90, 48, 55))
            .join()
            .unwrap();
        assert_eq!(state.active_velocity(48), Some(55));
    }
}
