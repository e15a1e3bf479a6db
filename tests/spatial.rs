mod common;

use common::{render, transparent_stereo, Dc};
use glam::Vec3;
use saavy_mixer::{source::Tone, Attenuation, Engine, EngineConfig, InitFlags};

#[test]
fn source_on_the_right_is_attenuated_and_panned() {
    let engine = transparent_stereo();
    let handle = engine.play_3d(&Dc::mono(1.0), Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO);

    // Inverse distance, min 1, rolloff 1: 1 / (1 + 4).
    assert!((engine.get_overall_volume(handle) - 0.2).abs() < 1e-6);
    assert_eq!(engine.get_volume(handle), 1.0);

    let out = render(&engine, 64, 64);
    let (left, right) = (out[126], out[127]);
    assert!(left.abs() < 1e-6, "{left}");
    assert!((right - 0.2).abs() < 1e-6, "{right}");
}

#[test]
fn left_handed_flag_mirrors_pan() {
    let engine = Engine::new(
        EngineConfig::new()
            .flags(InitFlags::LEFT_HANDED_3D)
            .post_clip_scaler(1.0),
    )
    .unwrap();
    engine.play_3d(&Dc::mono(0.5), Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO);

    let out = render(&engine, 64, 64);
    assert!(out[126] > 0.0);
    assert!(out[127].abs() < 1e-6);
}

#[test]
fn listener_movement_needs_update() {
    let engine = transparent_stereo();
    let handle = engine.play_3d(&Dc::mono(1.0), Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO);

    engine.set_3d_listener_position(Vec3::new(5.0, 0.0, 0.0));
    assert!((engine.get_overall_volume(handle) - 0.2).abs() < 1e-6);

    engine.update_3d_audio();
    assert!((engine.get_overall_volume(handle) - 1.0).abs() < 1e-6);
    assert_eq!(engine.get_3d_listener().position, Vec3::new(5.0, 0.0, 0.0));
}

#[test]
fn listener_relative_source_follows_listener() {
    let engine = transparent_stereo();
    let handle = engine.play_3d(&Dc::mono(1.0), Vec3::new(0.0, 0.0, -2.0), Vec3::ZERO);
    engine.set_3d_source_listener_relative(handle, true);

    engine.set_3d_listener_position(Vec3::new(100.0, 0.0, 0.0));
    engine.update_3d_audio();
    assert!((engine.get_overall_volume(handle) - 0.5).abs() < 1e-6);
}

#[test]
fn source_settings_change_attenuation() {
    let engine = transparent_stereo();
    let handle = engine.play_3d(&Dc::mono(1.0), Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);

    engine.set_3d_source_min_max_distance(handle, 10.0, 100.0);
    engine.update_3d_audio();
    assert!((engine.get_overall_volume(handle) - 1.0).abs() < 1e-6);

    engine.set_3d_source_min_max_distance(handle, 1.0, 100.0);
    engine.set_3d_distance_scale(2.0);
    engine.update_3d_audio();
    assert!((engine.get_overall_volume(handle) - 0.1).abs() < 1e-6);

    engine.set_3d_source_attenuation(handle, Attenuation::None, 1.0);
    engine.update_3d_audio();
    assert_eq!(engine.get_overall_volume(handle), 1.0);

    engine.set_3d_source_attenuation(handle, Attenuation::LinearDistance, 1.0);
    engine.set_3d_source_position(handle, Vec3::new(0.0, 0.0, -50.0));
    engine.update_3d_audio();
    // Scaled distance 100 reaches the max distance.
    assert!(engine.get_overall_volume(handle).abs() < 1e-6);
}

#[test]
fn approaching_source_plays_faster() {
    let engine = transparent_stereo();
    // Half the speed of sound straight at the listener doubles the pitch.
    let handle = engine.play_3d(
        &Tone::sine(220.0),
        Vec3::new(0.0, 0.0, -100.0),
        Vec3::new(0.0, 0.0, 171.65),
    );
    render(&engine, 4_410, 441);
    assert!((engine.get_stream_position(handle) - 0.2).abs() < 1e-3);

    engine.set_3d_source_doppler_factor(handle, 0.0);
    engine.update_3d_audio();
    let before = engine.get_stream_position(handle);
    render(&engine, 4_410, 441);
    assert!((engine.get_stream_position(handle) - before - 0.1).abs() < 1e-3);
}

#[test]
fn receding_source_plays_slower() {
    let engine = transparent_stereo();
    let handle = engine.play_3d(&Tone::sine(220.0), Vec3::new(0.0, 0.0, -100.0), Vec3::ZERO);
    engine.set_3d_source_velocity(handle, Vec3::new(0.0, 0.0, -343.3));
    engine.update_3d_audio();

    render(&engine, 4_410, 441);
    // 343.3 / (343.3 + 343.3)
    assert!((engine.get_stream_position(handle) - 0.05).abs() < 1e-3);
}

#[test]
fn sound_speed_must_be_positive() {
    let engine = transparent_stereo();
    assert!(engine.set_3d_sound_speed(0.0).is_err());
    assert!(engine.set_3d_sound_speed(f32::NAN).is_err());
    engine.set_3d_sound_speed(300.0).unwrap();
    assert_eq!(engine.get_3d_sound_speed(), 300.0);
}

#[test]
fn plain_voices_ignore_3d_calls() {
    let engine = transparent_stereo();
    let handle = engine.play(&Dc::mono(1.0));
    engine.set_3d_source_position(handle, Vec3::new(100.0, 0.0, 0.0));
    engine.update_3d_audio();
    assert_eq!(engine.get_overall_volume(handle), 1.0);
}
