//! Tone command: play the configured tone once.

use crate::config::Settings;
use crate::notifier::ToneNotifier;
use crate::notifier::tone::default_sink;

pub async fn run_tone(
    settings: &Settings,
    frequency: Option<f32>,
    volume: Option<f32>,
) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(frequency) = frequency {
        settings.tone.frequency_hz = frequency;
    }
    if let Some(volume) = volume {
        settings.tone.volume = volume;
    }
    settings.validate()?;

    let notifier = ToneNotifier::new(settings.tone.spec(), default_sink());
    let spec = notifier.spec();
    println!(
        "Playing {:.0} Hz for {:.2}s at volume {:.2}",
        spec.frequency_hz, spec.duration_secs, spec.volume
    );
    notifier.play().await?;
    Ok(())
}
