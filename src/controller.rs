// Controller Module - Fixed-rate render loop tying note state, renderer and WLED output together
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::midi::NoteState;
use crate::renderer::LedRenderer;
use crate::wled::{DatagramSink, WledEncoder};

// Log the first send failure, then one in this many
const SEND_FAILURE_LOG_EVERY: u64 = 600;

// Everything touched between reading the LED buffer and the datagram leaving
struct FrameStage<S> {
    renderer: LedRenderer,
    encoder: WledEncoder,
    sink: S,
    datagram: Vec<u8>,
    send_failures: u64,
}

pub struct LedMidiController<S: DatagramSink> {
    note_state: NoteState,
    stage: Mutex<FrameStage<S>>,
    fps: u32,
    frame_duration: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<S: DatagramSink> LedMidiController<S> {
    pub fn new(
        note_state: NoteState,
        renderer: LedRenderer,
        encoder: WledEncoder,
        sink: S,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let fps = renderer.fps().max(1);
        LedMidiController {
            note_state,
            stage: Mutex::new(FrameStage {
                renderer,
                encoder,
                sink,
                datagram: Vec::with_capacity(encoder.datagram_len()),
                send_failures: 0,
            }),
            fps,
            frame_duration: Duration::from_secs_f64(1.0 / fps as f64),
            shutdown,
        }
    }

    fn stage(&self) -> MutexGuard<'_, FrameStage<S>> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear any stale picture on the controller. A failure here is fatal.
    pub fn setup(&self) -> Result<()> {
        let mut stage = self.stage();
        let reset = stage.encoder.encode_reset();
        stage
            .sink
            .send_datagram(&reset)
            .context("Failed to send reset datagram to WLED")?;
        log::info!("Reset {} LEDs", stage.renderer.led_count());
        Ok(())
    }

    /// Render, encode and send one frame as a single critical section
    pub fn render_frame(&self, frame_number: u32) {
        let snapshot = self.note_state.snapshot();

        let mut guard = self.stage();
        let stage = &mut *guard;
        stage.renderer.render(frame_number, &snapshot);
        stage.encoder.encode_into(stage.renderer.leds(), &mut stage.datagram);

        if let Err(e) = stage.sink.send_datagram(&stage.datagram) {
            if stage.send_failures % SEND_FAILURE_LOG_EVERY == 0 {
                log::warn!("Failed to send frame to WLED: {} ({} failures)", e, stage.send_failures + 1);
            }
            stage.send_failures += 1;
        }
    }

    /// Frame counter following `frame_number`; wraps once per wheel rotation
    pub fn next_frame_number(&self, frame_number: u32) -> u32 {
        (frame_number + 1) % self.fps
    }

    /// Main render loop. Runs until the shutdown flag is raised, then blanks the strip.
    ///
    /// Each tick sleeps whatever is left of the frame budget; overruns are not caught up.
    pub fn run(&self) {
        log::info!("Render loop started at {} FPS", self.fps);
        let mut frame_number = 0;

        while !self.shutdown.load(Ordering::Relaxed) {
            let loop_start = Instant::now();

            self.render_frame(frame_number);
            frame_number = self.next_frame_number(frame_number);

            if let Some(remaining) = self.frame_duration.checked_sub(loop_start.elapsed()) {
                thread::sleep(remaining);
            }
        }

        log::info!("Render loop stopped");
        if let Err(e) = self.setup() {
            log::warn!("Could not blank LEDs on exit: {:#}", e);
        }
    }

    #[cfg(test)]
    fn into_sink(self) -> S {
        self.stage.into_inner().unwrap_or_else(PoisonError::into_inner).sink
    }
}
