// midiwled - MIDI keyboard to WLED LED strip
// Each key lights one LED in a hue-cycling color scaled by velocity, sent over the WLED UDP realtime protocol
pub mod config;
pub mod controller;
pub mod midi;
pub mod renderer;
pub mod types;
pub mod wheel;
pub mod wled;
