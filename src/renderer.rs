// Renderer Module - Turns note state into per-LED colors
use crate::midi::NoteSnapshot;
use crate::types::{Rgb, N_MIDI_NOTES};
use crate::wheel;

/// Owns the LED buffer. The buffer is sized once and rewritten in place every frame.
pub struct LedRenderer {
    leds: Vec<Rgb>,
    low_note: u8,
    fps: u32,
}

impl LedRenderer {
    pub fn new(total_leds: usize, low_note: u8, fps: u32) -> Self {
        LedRenderer {
            leds: vec![Rgb::BLACK; total_leds],
            low_note,
            fps,
        }
    }

    pub fn leds(&self) -> &[Rgb] {
        &self.leds
    }

    pub fn led_count(&self) -> usize {
        self.leds.len()
    }

    /// Frames per wheel rotation
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// LED that displays a note, if the note falls on the strip
    pub fn note_to_led(&self, note: u8) -> Option<usize> {
        let led = (note as usize).checked_sub(self.low_note as usize)?;
        (led < self.leds.len()).then_some(led)
    }

    /// Render one frame: every note on the strip gets the frame's wheel color
    /// scaled by its velocity. Silent notes go black.
    pub fn render(&mut self, frame_number: u32, notes: &NoteSnapshot) {
        let base_color = wheel::color_for_frame(frame_number, self.fps);

        for note in 0..N_MIDI_NOTES as u8 {
            let Some(led) = self.note_to_led(note) else {
                continue;
            };
            self.leds[led] = base_color.scaled_by_velocity(notes.velocity(note));
        }
    }
}
