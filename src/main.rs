// midiwled entry point - loads config, wires MIDI input to the render loop
use anyhow::Result;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use midiwled::config::{Args, MidiWledConfig};
use midiwled::controller::LedMidiController;
use midiwled::midi;
use midiwled::renderer::LedRenderer;
use midiwled::wled::{UdpSink, WledEncoder};

fn list_ports() -> Result<()> {
    let ports = midi::list_midi_ports()?;
    if ports.is_empty() {
        println!("No MIDI input ports found.");
    } else {
        println!("Available MIDI input ports:");
        for (i, port) in ports.iter().enumerate() {
            println!("  {}. {}", i + 1, port);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_midi_ports {
        return list_ports();
    }

    // Load existing config or create default, then merge with command line args
    let cfg_arg = args.cfg.as_deref();
    let config_path = MidiWledConfig::config_path(cfg_arg)?;
    let config_file_exists = config_path.exists();

    let mut config = if config_file_exists {
        match MidiWledConfig::load_with_path(cfg_arg) {
            Ok(c) => c,
            Err(e) => {
                log::error!("Failed to load config file {}: {}", config_path.display(), e);
                return Err(e);
            }
        }
    } else {
        MidiWledConfig {
            config_path: Some(config_path.clone()),
            ..Default::default()
        }
    };

    let args_provided = config.merge_with_args(&args);
    config.sanitize();

    if !config_file_exists || args_provided {
        if let Err(e) = config.save() {
            log::warn!("Could not write config file {}: {}", config_path.display(), e);
        }
    }
    log::info!("Using config file: {}", config_path.display());

    let protocol = config.protocol_mode()?;
    let encoder = WledEncoder::new(protocol, config.total_leds)?;
    let renderer = LedRenderer::new(config.total_leds, config.low_note, config.fps);
    let note_state = midi::NoteState::new(config.midi_filter());

    let sink = UdpSink::connect(&config.wled_ip, config.wled_port)?;
    log::info!("Sending to WLED at {}", sink.destination());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))?;
    }

    let controller = LedMidiController::new(note_state.clone(), renderer, encoder, sink, shutdown);
    controller.setup()?;

    // Connection must stay alive for the whole render loop
    let _midi_connection = midi::connect_midi(&config.midi_device, note_state)?;

    println!("\n✓ Connected to WLED at {}:{}", config.wled_ip, config.wled_port);
    println!("✓ LED Count: {} (LED 0 = {})", config.total_leds, midi::note_number_to_name(config.low_note));
    println!("✓ Protocol: {}", protocol);
    println!("✓ Running at {} FPS", config.fps);
    println!("\n🎹 Play some notes! Press Ctrl+C to quit.\n");

    controller.run();
    Ok(())
}
