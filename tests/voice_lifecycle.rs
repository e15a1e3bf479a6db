mod common;

use common::{render, transparent_mono, Dc};
use saavy_mixer::{
    source::{Clip, Tone},
    Engine, EngineConfig, Handle, PlayParams, SourceError,
};

#[test]
fn one_second_tone_ends_on_the_block_that_drains_it() {
    let engine = Engine::new(EngineConfig::new()).unwrap();
    let handle = engine.play(&Tone::sine(440.0).with_duration(1.0));
    assert!(engine.is_valid_voice_handle(handle));

    // 172 blocks of 256 frames = 44032 frames, 68 short of one second.
    let mut out = vec![0.0; 256 * 2];
    for _ in 0..172 {
        engine.mix(&mut out, 256);
    }
    assert!(engine.is_valid_voice_handle(handle));

    engine.mix(&mut out, 256);
    assert!(!engine.is_valid_voice_handle(handle));
    assert_eq!(engine.voice_count(), 0);
}

#[test]
fn stale_handles_are_ignored() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(0.5));
    engine.stop(handle);

    assert!(!engine.is_valid_voice_handle(handle));
    engine.set_volume(handle, 0.1);
    assert_eq!(engine.get_volume(handle), 0.0);
    assert_eq!(engine.get_relative_play_speed(handle), 1.0);
    assert!(engine.seek(handle, 0.0).is_err());

    // The slot is reused with a new generation.
    let next = engine.play(&Dc::mono(0.5));
    assert_ne!(next, handle);
    assert!(engine.is_valid_voice_handle(next));
    assert!(!engine.is_valid_voice_handle(handle));
    assert!(!engine.is_valid_voice_handle(Handle::NONE));
}

#[test]
fn set_and_get_voice_attributes() {
    let engine = transparent_mono();
    let handle = engine.play_with(
        &Dc::mono(0.5),
        PlayParams {
            volume: 0.25,
            pan: -0.5,
            ..PlayParams::default()
        },
    );

    assert_eq!(engine.get_volume(handle), 0.25);
    assert_eq!(engine.get_pan(handle), -0.5);

    engine.set_volume(handle, 0.75);
    engine.set_pan(handle, 3.0);
    engine.set_relative_play_speed(handle, 0.0);
    assert_eq!(engine.get_volume(handle), 0.75);
    assert_eq!(engine.get_pan(handle), 1.0);
    assert!(engine.get_relative_play_speed(handle) > 0.0);

    engine.set_protect_voice(handle, true);
    engine.set_looping(handle, true);
    engine.set_loop_point(handle, 0.5);
    assert!(engine.get_protect_voice(handle));
    assert!(engine.get_looping(handle));
    assert_eq!(engine.get_loop_point(handle), 0.5);
    assert_eq!(engine.get_sample_rate(handle), 44_100.0);
}

#[test]
fn volume_reaches_output() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(0.5));
    engine.set_volume(handle, 0.5);

    let out = render(&engine, 256, 256);
    assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6), "{:?}", &out[..4]);
}

#[test]
fn volume_fade_is_halfway_at_half_time() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(1.0));
    engine.fade_volume(handle, 0.0, 1.0);

    // 441 frames = 10 ms at 44.1 kHz.
    render(&engine, 441 * 50, 441);
    assert!((engine.get_volume(handle) - 0.5).abs() < 1e-3);

    render(&engine, 441 * 50, 441);
    assert!(engine.get_volume(handle).abs() < 1e-3);

    // Finished fades leave the value alone.
    engine.set_volume(handle, 0.8);
    render(&engine, 441, 441);
    assert_eq!(engine.get_volume(handle), 0.8);
}

#[test]
fn direct_set_cancels_fade() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(1.0));
    engine.fade_volume(handle, 0.0, 1.0);
    render(&engine, 441 * 10, 441);

    engine.set_volume(handle, 1.0);
    render(&engine, 441 * 10, 441);
    assert_eq!(engine.get_volume(handle), 1.0);
}

#[test]
fn zero_length_fades_apply_without_mixing() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(1.0));

    engine.fade_volume(handle, 0.25, 0.0);
    engine.fade_pan(handle, -0.5, -1.0);
    engine.fade_relative_play_speed(handle, 2.0, 0.0);
    engine.fade_global_volume(0.5, 0.0);

    assert_eq!(engine.get_volume(handle), 0.25);
    assert_eq!(engine.get_pan(handle), -0.5);
    assert_eq!(engine.get_relative_play_speed(handle), 2.0);
    assert_eq!(engine.get_global_volume(), 0.5);

    // A running fade is replaced, not resumed on the next block.
    engine.fade_volume(handle, 1.0, 1.0);
    engine.fade_volume(handle, 0.5, 0.0);
    let out = render(&engine, 441, 441);
    assert_eq!(engine.get_volume(handle), 0.5);
    assert!((out[440] - 0.25).abs() < 1e-6, "got {}", out[440]);
}

#[test]
fn oscillation_stays_within_bounds() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(1.0));
    engine.oscillate_volume(handle, 0.2, 0.6, 0.1);

    for _ in 0..40 {
        render(&engine, 441, 441);
        let volume = engine.get_volume(handle);
        assert!((0.2 - 1e-4..=0.6 + 1e-4).contains(&volume), "{volume}");
    }
}

#[test]
fn scheduled_stop_fires_on_engine_time() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(1.0));
    engine.schedule_stop(handle, 0.1);

    render(&engine, 441 * 9, 441);
    assert!(engine.is_valid_voice_handle(handle));
    render(&engine, 441 * 2, 441);
    assert!(!engine.is_valid_voice_handle(handle));
}

#[test]
fn scheduled_pause_holds_stream_time() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(1.0));
    engine.schedule_pause(handle, 0.05);

    render(&engine, 441 * 10, 441);
    assert!(engine.get_pause(handle));
    let held = engine.get_stream_time(handle);
    assert!(held < 0.06, "{held}");

    render(&engine, 441 * 10, 441);
    assert_eq!(engine.get_stream_time(handle), held);
    assert_eq!(engine.active_voice_count(), 0);
    assert_eq!(engine.voice_count(), 1);

    engine.set_pause(handle, false);
    render(&engine, 441, 441);
    assert!(engine.get_stream_time(handle) > held);
}

#[test]
fn paused_voice_is_silent() {
    let engine = transparent_mono();
    let handle = engine.play_with(
        &Dc::mono(0.5),
        PlayParams {
            paused: true,
            ..PlayParams::default()
        },
    );
    assert!(render(&engine, 128, 128).iter().all(|&s| s == 0.0));

    engine.set_pause(handle, false);
    assert!(render(&engine, 128, 128).iter().all(|&s| s > 0.0));
}

#[test]
fn looping_clip_keeps_playing() {
    let engine = transparent_mono();
    let clip = Clip::from_mono(vec![0.5; 100], 44_100.0).unwrap().with_looping(true);
    let handle = engine.play(&clip);

    let out = render(&engine, 4_096, 512);
    assert!(engine.is_valid_voice_handle(handle));
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    assert!(engine.get_stream_position(handle) < clip.length());
}

#[test]
fn one_shot_clip_ends() {
    let engine = transparent_mono();
    let clip = Clip::from_mono(vec![0.5; 100], 44_100.0).unwrap();
    let handle = engine.play(&clip);

    let out = render(&engine, 256, 256);
    assert!(!engine.is_valid_voice_handle(handle));
    assert!(out[..100].iter().all(|&s| (s - 0.5).abs() < 1e-6));
    assert!(out[100..].iter().all(|&s| s == 0.0));
}

#[test]
fn seek_moves_stream_position() {
    let engine = transparent_mono();
    let handle = engine.play(&Tone::sine(220.0).with_duration(2.0));

    engine.seek(handle, 1.5).unwrap();
    assert_eq!(engine.get_stream_position(handle), 1.5);

    let error = engine.seek(handle, 5.0).unwrap_err();
    assert!(matches!(
        error,
        saavy_mixer::EngineError::Source(SourceError::SeekOutOfRange)
    ));

    // Unseekable sources report it.
    let dc = engine.play(&Dc::mono(0.1));
    assert!(matches!(
        engine.seek(dc, 0.0),
        Err(saavy_mixer::EngineError::Source(SourceError::SeekUnsupported))
    ));
}

#[test]
fn stream_time_follows_mixed_audio() {
    let engine = transparent_mono();
    let handle = engine.play(&Dc::mono(0.1));
    render(&engine, 44_100, 1_024);

    assert!((engine.get_stream_time(handle) - 1.0).abs() < 1e-6);
    assert!((engine.clock() - 1.0).abs() < 1e-6);
}

#[test]
fn half_speed_halves_stream_position() {
    let engine = transparent_mono();
    let handle = engine.play(&Tone::sine(220.0));
    engine.set_relative_play_speed(handle, 0.5);
    render(&engine, 44_100, 1_024);

    assert!((engine.get_stream_position(handle) - 0.5).abs() < 1e-3);
}

#[test]
fn stop_all_clears_every_voice() {
    let engine = transparent_mono();
    for _ in 0..5 {
        engine.play(&Dc::mono(0.1));
    }
    assert_eq!(engine.voice_count(), 5);

    engine.stop_all();
    assert_eq!(engine.voice_count(), 0);
    assert!(render(&engine, 64, 64).iter().all(|&s| s == 0.0));
}
