// Wheel Module - Hue-cycling color wheel used as the per-frame base color
use crate::types::{Rgb, MAX_BRIGHTNESS};

/// Steps per wheel segment (one full 0-255 channel ramp)
pub const SEGMENT_LENGTH: u32 = MAX_BRIGHTNESS as u32 + 1;

/// Six segments: red, yellow, green, cyan, blue, magenta and back to red
pub const WHEEL_LENGTH: u32 = SEGMENT_LENGTH * 6;

pub const MAX_WHEEL_INDEX: u32 = WHEEL_LENGTH - 1;

/// Color at a position on the wheel. Indices past the end wrap around.
pub fn color_at(wheel_index: u32) -> Rgb {
    let wheel_index = wheel_index % WHEEL_LENGTH;
    let segment = wheel_index / SEGMENT_LENGTH;
    let ramp = (wheel_index % SEGMENT_LENGTH) as u8;
    let full = MAX_BRIGHTNESS;

    match segment {
        0 => Rgb::new(full, ramp, 0),        // red -> yellow
        1 => Rgb::new(full - ramp, full, 0), // yellow -> green
        2 => Rgb::new(0, full, ramp),        // green -> cyan
        3 => Rgb::new(0, full - ramp, full), // cyan -> blue
        4 => Rgb::new(ramp, 0, full),        // blue -> magenta
        _ => Rgb::new(full, 0, full - ramp), // magenta -> red
    }
}

/// Map a frame counter onto the wheel so that frames `0..fps` sweep the
/// whole wheel once, i.e. one rotation per second at the configured rate.
///
/// Uses integer (truncating) division so segment boundaries land exactly.
pub fn wheel_index_for_frame(frame_number: u32, fps: u32) -> u32 {
    if fps <= 1 {
        return 0;
    }
    let last_frame = (fps - 1) as u64;
    let index = MAX_WHEEL_INDEX as u64 * frame_number as u64 / last_frame;
    index.min(MAX_WHEEL_INDEX as u64) as u32
}

/// Base color for a frame
pub fn color_for_frame(frame_number: u32, fps: u32) -> Rgb {
    color_at(wheel_index_for_frame(frame_number, fps))
}
