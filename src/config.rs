// Config Module - Configuration management and command-line argument parsing
use anyhow::{anyhow, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::midi::{MidiFilter, PIANO_LOW_A_NOTE_NUMBER, SUSTAIN_CONTROLLER_DEFAULT};
use crate::wled::{ProtocolMode, WLED_IP_ADDRESS_DEFAULT, WLED_UDP_PORT_DEFAULT};

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Light up a WLED strip from a MIDI keyboard",
    long_about = "Listens to a MIDI keyboard and lights one LED per key on a WLED strip over the UDP realtime protocol.\n\
                  Held and sustained notes glow in a color that cycles through the hue wheel once per second,\n\
                  with brightness following key velocity."
)]
pub struct Args {
    /// WLED device address
    #[arg(short, long)]
    pub wled_ip: Option<String>,

    /// WLED UDP realtime port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Total number of LEDs
    #[arg(short = 'L', long)]
    pub leds: Option<usize>,

    /// Target framerate (frames per second)
    #[arg(long)]
    pub fps: Option<u32>,

    /// UDP realtime protocol (warls, dnrgb)
    #[arg(long)]
    pub protocol: Option<String>,

    /// MIDI device name (substring match, default: first port)
    #[arg(long)]
    pub midi_device: Option<String>,

    /// List MIDI input ports and exit
    #[arg(long)]
    pub list_midi_ports: bool,

    /// Config file path or name (e.g., --cfg /full/path or --cfg studio for ~/.config/midiwled/studio.toml)
    #[arg(long)]
    pub cfg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiWledConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,  // Stores the config file path (not serialized)

    pub wled_ip: String,
    pub wled_port: u16,
    pub total_leds: usize,
    pub fps: u32,
    pub protocol: String,  // "warls" or "dnrgb"
    pub midi_device: String,  // Empty = first available port
    pub midi_channel: u8,  // 0-15 (MIDI channels 1-16)
    pub midi_omni: bool,  // Listen on every channel, ignoring midi_channel
    pub sustain_controller: u8,  // CC number of the sustain pedal
    pub low_note: u8,  // MIDI note shown on LED 0
}

impl Default for MidiWledConfig {
    fn default() -> Self {
        MidiWledConfig {
            config_path: None,
            wled_ip: WLED_IP_ADDRESS_DEFAULT.to_string(),
            wled_port: WLED_UDP_PORT_DEFAULT,
            total_leds: 80,
            fps: 120,
            protocol: "warls".to_string(),
            midi_device: "".to_string(),
            midi_channel: 0,
            midi_omni: false,
            sustain_controller: SUSTAIN_CONTROLLER_DEFAULT,
            low_note: PIANO_LOW_A_NOTE_NUMBER,
        }
    }
}

impl MidiWledConfig {
    /// Apply command-line overrides. Returns true if any were given.
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        let mut args_provided = false;

        if let Some(ref wled_ip) = args.wled_ip {
            self.wled_ip = wled_ip.clone();
            args_provided = true;
        }

        if let Some(port) = args.port {
            self.wled_port = port;
            args_provided = true;
        }

        if let Some(leds) = args.leds {
            self.total_leds = leds;
            args_provided = true;
        }

        if let Some(fps) = args.fps {
            self.fps = fps;
            args_provided = true;
        }

        if let Some(ref protocol) = args.protocol {
            self.protocol = protocol.clone();
            args_provided = true;
        }

        if let Some(ref midi_device) = args.midi_device {
            self.midi_device = midi_device.clone();
            args_provided = true;
        }

        args_provided
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            // Check if it's an absolute path
            let path = PathBuf::from(cfg);
            if path.is_absolute() {
                return Ok(path);
            }

            // Check if it contains path separators (relative path)
            if cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            // Otherwise treat as config name in config directory
            let filename = if cfg.ends_with(".toml") {
                cfg.to_string()
            } else {
                format!("{}.toml", cfg)
            };

            Ok(Self::config_dir()?.join(filename))
        } else {
            Ok(Self::config_dir()?.join("config.toml"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| anyhow!("HOME is not set, pass --cfg with a full path"))?;
        Ok(PathBuf::from(home).join(".config").join("midiwled"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut parsed: Self = toml::from_str(contents)?;
        parsed.sanitize();
        Ok(parsed)
    }

    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        let contents = std::fs::read_to_string(&path)?;
        let mut parsed = Self::from_toml(&contents)?;
        parsed.config_path = Some(path);
        Ok(parsed)
    }

    /// Sanitize config values to handle common formatting issues
    pub fn sanitize(&mut self) {
        // Sanitize string values (trim whitespace)
        self.wled_ip = self.wled_ip.trim().to_string();
        self.protocol = self.protocol.trim().to_lowercase();
        self.midi_device = self.midi_device.trim().to_string();

        // Clamp numeric values to reasonable ranges
        self.wled_port = self.wled_port.max(1);
        self.total_leds = self.total_leds.clamp(1, 10000);
        self.fps = self.fps.clamp(2, 500);
        self.midi_channel = self.midi_channel.min(15);
        self.sustain_controller = self.sustain_controller.min(127);
        self.low_note = self.low_note.min(127);
    }

    pub fn protocol_mode(&self) -> Result<ProtocolMode> {
        self.protocol.parse()
    }

    pub fn midi_filter(&self) -> MidiFilter {
        MidiFilter {
            channel: if self.midi_omni { None } else { Some(self.midi_channel) },
            sustain_controller: self.sustain_controller,
        }
    }

    /// Render the config as TOML with explanatory comments
    pub fn to_commented_toml(&self) -> String {
        format!(
            r#"# midiwled Configuration File
# Command-line flags override these values and are written back here

# WLED device address and UDP realtime port
wled_ip = {}
wled_port = {}

# Number of LEDs on the strip (LED 0 shows low_note)
total_leds = {}

# Frames per second; the color wheel completes one rotation every fps frames
fps = {}

# UDP realtime protocol
# Options: "warls" (indexed, up to 255 LEDs), "dnrgb" (sequential, up to 489 LEDs)
protocol = {}

# MIDI input device name (substring match, empty = first port)
midi_device = {}

# MIDI channel to listen on (0-15 = channels 1-16), or all channels when midi_omni = true
midi_channel = {}
midi_omni = {}

# Controller number of the sustain pedal (64 = standard damper pedal)
sustain_controller = {}

# MIDI note shown on LED 0 (21 = lowest A on an 88-key piano)
low_note = {}
"#,
            toml_string(&self.wled_ip),
            self.wled_port,
            self.total_leds,
            self.fps,
            toml_string(&self.protocol),
            toml_string(&self.midi_device),
            self.midi_channel,
            self.midi_omni,
            self.sustain_controller,
            self.low_note,
        )
    }

    pub fn save(&self) -> Result<()> {
        let path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::config_path(None)?,
        };

        // Sanitize values before saving
        let mut sanitized = self.clone();
        sanitized.sanitize();

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, sanitized.to_commented_toml())?;
        log::debug!("Saved config to {}", path.display());
        Ok(())
    }
}

// Quoted and escaped TOML string literal
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MidiWledConfig::default();
        assert_eq!(config.wled_port, 21324);
        assert_eq!(config.total_leds, 80);
        assert_eq!(config.fps, 120);
        assert_eq!(config.low_note, 21);
        assert_eq!(config.protocol_mode().unwrap(), ProtocolMode::Warls);
        assert_eq!(config.midi_filter(), MidiFilter::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MidiWledConfig::from_toml("wled_ip = \" 10.0.0.5 \"\nprotocol = \"DNRGB\"\n").unwrap();
        assert_eq!(config.wled_ip, "10.0.0.5");
        assert_eq!(config.protocol_mode().unwrap(), ProtocolMode::Dnrgb);
        assert_eq!(config.total_leds, 80);
    }

    #[test]
    fn test_sanitize_clamps() {
        let mut config = MidiWledConfig {
            fps: 0,
            total_leds: 0,
            midi_channel: 40,
            sustain_controller: 200,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.fps, 2);
        assert_eq!(config.total_leds, 1);
        assert_eq!(config.midi_channel, 15);
        assert_eq!(config.sustain_controller, 127);
    }

    #[test]
    fn test_omni_filter() {
        let config = MidiWledConfig { midi_omni: true, ..Default::default() };
        assert_eq!(config.midi_filter().channel, None);
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = MidiWledConfig::default();
        assert!(!config.merge_with_args(&Args::default()));

        let args = Args {
            leds: Some(88),
            protocol: Some("dnrgb".to_string()),
            ..Default::default()
        };
        assert!(config.merge_with_args(&args));
        assert_eq!(config.total_leds, 88);
        assert_eq!(config.protocol, "dnrgb");
        assert_eq!(config.fps, 120);
    }

    #[test]
    fn test_commented_toml_round_trips() {
        let config = MidiWledConfig {
            wled_ip: "led.local".to_string(),
            midi_device: "Digital Piano".to_string(),
            midi_omni: true,
            ..Default::default()
        };
        let reparsed = MidiWledConfig::from_toml(&config.to_commented_toml()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_commented_toml_escapes_strings() {
        let config = MidiWledConfig {
            midi_device: r#"Roland "A-88" \ USB"#.to_string(),
            ..Default::default()
        };
        let reparsed = MidiWledConfig::from_toml(&config.to_commented_toml()).unwrap();
        assert_eq!(reparsed.midi_device, r#"Roland "A-88" \ USB"#);
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_config_path_forms() {
        assert_eq!(
            MidiWledConfig::config_path(Some("/tmp/midiwled.toml")).unwrap(),
            PathBuf::from("/tmp/midiwled.toml")
        );
        assert_eq!(
            MidiWledConfig::config_path(Some("conf/local.toml")).unwrap(),
            PathBuf::from("conf/local.toml")
        );
    }

    #[test]
    fn test_unknown_protocol_is_an_error() {
        let config = MidiWledConfig { protocol: "ddp".to_string(), ..Default::default() };
        assert!(config.protocol_mode().is_err());
    }
}
