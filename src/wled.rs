// WLED Module - UDP realtime protocol encoding and datagram transport
// https://kno.wled.ge/interfaces/udp-realtime/
use anyhow::{anyhow, bail, Result};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;

use crate::types::Rgb;

pub const WLED_IP_ADDRESS_DEFAULT: &str = "192.168.1.172";
pub const WLED_UDP_PORT_DEFAULT: u16 = 21324;

/// Seconds WLED stays in realtime mode after the last packet (255 = max)
pub const REALTIME_TIMEOUT_SECONDS: u8 = 255;

/// WARLS carries the LED index in one byte
pub const WARLS_MAX_LEDS: usize = 255;

/// WLED drops DNRGB payload past this many LEDs in one packet
pub const DNRGB_MAX_LEDS: usize = 489;

/// Addressing mode of the realtime datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// `[1, timeout, (index, r, g, b)*]`
    Warls,
    /// `[4, timeout, start_hi, start_lo, (r, g, b)*]`
    Dnrgb,
}

impl ProtocolMode {
    pub fn protocol_id(self) -> u8 {
        match self {
            ProtocolMode::Warls => 1,
            ProtocolMode::Dnrgb => 4,
        }
    }

    fn header_len(self) -> usize {
        match self {
            ProtocolMode::Warls => 2,
            ProtocolMode::Dnrgb => 4,
        }
    }

    fn bytes_per_led(self) -> usize {
        match self {
            ProtocolMode::Warls => 4,
            ProtocolMode::Dnrgb => 3,
        }
    }
}

impl FromStr for ProtocolMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "warls" | "1" => Ok(ProtocolMode::Warls),
            "dnrgb" | "4" => Ok(ProtocolMode::Dnrgb),
            other => Err(anyhow!("Unknown WLED protocol '{}' (expected warls or dnrgb)", other)),
        }
    }
}

impl std::fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolMode::Warls => write!(f, "WARLS"),
            ProtocolMode::Dnrgb => write!(f, "DNRGB"),
        }
    }
}

/// Serializes an LED buffer into a realtime datagram for a fixed strip length
#[derive(Debug, Clone, Copy)]
pub struct WledEncoder {
    mode: ProtocolMode,
    led_count: usize,
}

impl WledEncoder {
    pub fn new(mode: ProtocolMode, led_count: usize) -> Result<Self> {
        if led_count == 0 {
            bail!("LED count must be at least 1");
        }
        match mode {
            ProtocolMode::Warls if led_count > WARLS_MAX_LEDS => bail!(
                "WARLS addresses at most {} LEDs (got {}), use DNRGB for longer strips",
                WARLS_MAX_LEDS,
                led_count
            ),
            ProtocolMode::Dnrgb if led_count > DNRGB_MAX_LEDS => bail!(
                "DNRGB carries at most {} LEDs per packet (got {})",
                DNRGB_MAX_LEDS,
                led_count
            ),
            _ => {}
        }
        Ok(WledEncoder { mode, led_count })
    }

    pub fn datagram_len(&self) -> usize {
        self.mode.header_len() + self.led_count * self.mode.bytes_per_led()
    }

    fn write_header(&self, out: &mut Vec<u8>) {
        out.push(self.mode.protocol_id());
        out.push(REALTIME_TIMEOUT_SECONDS);
        if self.mode == ProtocolMode::Dnrgb {
            // Start index high and low bytes
            out.extend_from_slice(&[0, 0]);
        }
    }

    /// Encode into a reusable buffer. LEDs beyond the configured count are not sent.
    pub fn encode_into(&self, leds: &[Rgb], out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.datagram_len());
        self.write_header(out);

        for (index, led) in leds.iter().take(self.led_count).enumerate() {
            if self.mode == ProtocolMode::Warls {
                out.push(index as u8);
            }
            out.extend_from_slice(&[led.r, led.g, led.b]);
        }
    }

    pub fn encode(&self, leds: &[Rgb]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.datagram_len());
        self.encode_into(leds, &mut out);
        out
    }

    /// All-off datagram that clears whatever the controller is showing
    pub fn encode_reset(&self) -> Vec<u8> {
        self.encode(&vec![Rgb::BLACK; self.led_count])
    }
}

/// Send-only datagram channel to the LED controller
pub trait DatagramSink: Send {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// Fire-and-forget UDP transport
pub struct UdpSink {
    socket: UdpSocket,
    dest: SocketAddr,
}

impl UdpSink {
    pub fn connect(ip: &str, port: u16) -> Result<Self> {
        let dest = format!("{}:{}", ip, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow!("Could not resolve WLED address {}:{}", ip, port))?;

        let bind_addr = if dest.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(dest)?;

        Ok(UdpSink { socket, dest })
    }

    pub fn destination(&self) -> SocketAddr {
        self.dest
    }
}

impl DatagramSink for UdpSink {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send(datagram).map(|_| ())
    }
}
