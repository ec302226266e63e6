//! Sine-tone notifier.
//!
//! Tones are synthesized once as mono 16-bit PCM and handed to an
//! [`AudioSink`] on a blocking thread for every notification.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::watcher::NotificationRequest;

use super::{Notifier, NotifyError};

/// Lowest frequency a tone is synthesized at.
pub const MIN_FREQUENCY_HZ: f32 = 100.0;
/// Highest frequency a tone is synthesized at.
pub const MAX_FREQUENCY_HZ: f32 = 2000.0;
/// Longest tone synthesized, in seconds.
pub const MAX_DURATION_SECS: f32 = 5.0;

/// Parameters of a notification tone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneSpec {
    pub duration_secs: f32,
    pub sample_rate: u32,
    pub frequency_hz: f32,
    /// Linear amplitude, clamped to [0.0, 1.0].
    pub volume: f32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            duration_secs: 0.2,
            sample_rate: 44_100,
            frequency_hz: 660.0,
            volume: 0.8,
        }
    }
}

impl ToneSpec {
    /// Same tone with volume, frequency and duration pulled into range.
    pub fn clamped(self) -> Self {
        Self {
            duration_secs: self.duration_secs.clamp(0.0, MAX_DURATION_SECS),
            volume: self.volume.clamp(0.0, 1.0),
            frequency_hz: self.frequency_hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
            ..self
        }
    }

    pub fn sample_count(&self) -> usize {
        (f64::from(self.duration_secs.max(0.0)) * f64::from(self.sample_rate)) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f32(self.duration_secs.max(0.0))
    }
}

/// Render `spec` as mono signed 16-bit samples.
pub fn synthesize(spec: &ToneSpec) -> Vec<i16> {
    let spec = spec.clamped();
    let amplitude = f64::from(spec.volume) * f64::from(i16::MAX);
    let step = 2.0 * std::f64::consts::PI * f64::from(spec.frequency_hz) / f64::from(spec.sample_rate);

    (0..spec.sample_count())
        .map(|i| (amplitude * (step * i as f64).sin()) as i16)
        .collect()
}

/// Blocking audio output.
pub trait AudioSink: Send + Sync {
    fn name(&self) -> &str;

    /// Play mono samples to completion.
    fn play(&self, samples: &[i16], sample_rate: u32) -> Result<(), NotifyError>;
}

/// Rings the terminal bell instead of playing the samples.
#[derive(Debug, Default)]
pub struct BellSink;

impl AudioSink for BellSink {
    fn name(&self) -> &str {
        "bell"
    }

    fn play(&self, _samples: &[i16], _sample_rate: u32) -> Result<(), NotifyError> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Plays samples on the default output device.
#[cfg(feature = "audio")]
#[derive(Debug, Default)]
pub struct RodioSink;

#[cfg(feature = "audio")]
impl AudioSink for RodioSink {
    fn name(&self) -> &str {
        "rodio"
    }

    fn play(&self, samples: &[i16], sample_rate: u32) -> Result<(), NotifyError> {
        let playback = |e: &dyn std::fmt::Display| NotifyError::Playback {
            reason: e.to_string(),
        };

        // The stream must outlive playback; it is not Send, so it lives here.
        let (_stream, handle) = rodio::OutputStream::try_default().map_err(|e| playback(&e))?;
        let sink = rodio::Sink::try_new(&handle).map_err(|e| playback(&e))?;
        sink.append(rodio::buffer::SamplesBuffer::new(
            1,
            sample_rate,
            samples.to_vec(),
        ));
        sink.sleep_until_end();
        Ok(())
    }
}

/// Best available sink for this build.
pub fn default_sink() -> Arc<dyn AudioSink> {
    #[cfg(feature = "audio")]
    {
        Arc::new(RodioSink)
    }
    #[cfg(not(feature = "audio"))]
    {
        Arc::new(BellSink)
    }
}

/// Plays a short tone for each notification.
pub struct ToneNotifier {
    spec: ToneSpec,
    samples: Arc<[i16]>,
    sink: Arc<dyn AudioSink>,
    /// Minimum gap between two tones, across all paths.
    cooldown: Duration,
    last_started: Mutex<Option<Instant>>,
}

impl ToneNotifier {
    pub fn new(spec: ToneSpec, sink: Arc<dyn AudioSink>) -> Self {
        let spec = spec.clamped();
        Self {
            samples: synthesize(&spec).into(),
            spec,
            sink,
            cooldown: Duration::ZERO,
            last_started: Mutex::new(None),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn spec(&self) -> &ToneSpec {
        &self.spec
    }

    /// Play the tone once, ignoring the cooldown.
    pub async fn play(&self) -> Result<(), NotifyError> {
        let samples = self.samples.clone();
        let sink = self.sink.clone();
        let sample_rate = self.spec.sample_rate;

        tokio::task::spawn_blocking(move || sink.play(&samples, sample_rate))
            .await
            .map_err(|e| NotifyError::Playback {
                reason: format!("playback task failed: {e}"),
            })?
    }

    /// Claim the next tone slot. False while the cooldown is running.
    fn try_claim(&self, now: Instant) -> bool {
        let mut last = self.last_started.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[async_trait]
impl Notifier for ToneNotifier {
    fn name(&self) -> &str {
        "tone"
    }

    async fn notify(&self, req: &NotificationRequest) -> Result<(), NotifyError> {
        if !self.try_claim(Instant::now()) {
            crate::debug_event!("tone", "cooldown", "skipped for {}", req.path.display());
            return Ok(());
        }
        self.play().await
    }
}
