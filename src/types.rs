// Shared types module - Common types used across multiple modules

/// Number of addressable MIDI note numbers (0-127)
pub const N_MIDI_NOTES: usize = 128;

/// Highest MIDI velocity, used to scale colors by key strike strength
pub const MAX_VELOCITY: u8 = 127;

/// Full-scale value of a single color channel
pub const MAX_BRIGHTNESS: u8 = 255;

// RGB color representation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Scale every channel by `velocity / 127`, truncating toward zero
    pub fn scaled_by_velocity(self, velocity: u8) -> Self {
        let velocity_percent = velocity as f64 / MAX_VELOCITY as f64;
        Rgb {
            r: (velocity_percent * self.r as f64) as u8,
            g: (velocity_percent * self.g as f64) as u8,
            b: (velocity_percent * self.b as f64) as u8,
        }
    }
}
