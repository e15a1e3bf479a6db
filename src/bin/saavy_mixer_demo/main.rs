//! saavy-mixer-demo - plays a short scene on the default output device
//!
//! Run with: cargo run --features cpal --bin saavy-mixer-demo

use std::{sync::Arc, thread, time::Duration};

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use glam::Vec3;
use saavy_mixer::{
    backend::cpal::CpalDriver,
    filter::{Echo, Resonant},
    source::{Noise, Tone},
    Bus, EngineConfig, InitFlags,
};

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let config = EngineConfig::new()
        .max_voices(32)
        .flags(InitFlags::CLIP_ROUNDOFF | InitFlags::ENABLE_VISUALIZATION);
    let (engine, _driver) = CpalDriver::open(config).wrap_err("failed to open audio output")?;

    println!("=== saavy mixer ===");
    println!("Sample rate: {} Hz", engine.sample_rate());
    println!("Channels: {}", engine.channels());
    println!();

    // Music bus with an echo; everything played into it shares the tail.
    let mut music = Bus::new();
    music.set_filter(0, Some(Arc::new(Echo::new(0.25, 0.4, 0.2))));
    let music_handle = engine.play(&music);
    if music_handle.is_none() {
        return Err(eyre!("no voice available for the music bus"));
    }

    let chord = engine.create_voice_group();
    for frequency in [220.0, 277.18, 329.63] {
        let voice = music.play(&engine, &Tone::triangle(frequency).with_amplitude(0.2));
        engine.add_voice_to_group(chord, voice);
    }
    engine.set_volume(chord, 0.0);
    engine.fade_volume(chord, 1.0, 1.0);
    engine.oscillate_pan(chord, -0.5, 0.5, 4.0);

    // Filtered noise flying past the listener.
    let mut wind = Noise::pink().with_amplitude(0.3);
    wind.set_filter(0, Some(Arc::new(Resonant::lowpass(800.0))));
    let start = Vec3::new(-20.0, 0.0, -2.0);
    let velocity = Vec3::new(8.0, 0.0, 0.0);
    let flyby = engine.play_3d(&wind, start, velocity);
    engine.set_3d_source_min_max_distance(flyby, 1.0, 50.0);

    println!("Playing for 5 seconds...");
    let tick = Duration::from_millis(50);
    for step in 0..100 {
        let t = step as f32 * tick.as_secs_f32();
        engine.set_3d_source_position(flyby, start + velocity * t);
        engine.update_3d_audio();

        if step % 10 == 0 {
            println!(
                "t={:.1}s voices={} level L={:.3} R={:.3}",
                t,
                engine.active_voice_count(),
                engine.get_approximate_volume(0),
                engine.get_approximate_volume(1),
            );
        }
        if step == 80 {
            engine.fade_global_volume(0.0, 1.0);
        }
        thread::sleep(tick);
    }

    for (handle, error) in engine.take_source_errors() {
        tracing::warn!(?handle, %error, "source failed during playback");
    }
    engine.deinit();
    Ok(())
}
