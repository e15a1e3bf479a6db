use glam::Vec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
3D Spatialization
=================

Positioned voices are reduced to the same three scalars every other voice
has: a gain, a pan and a playback-rate multiplier. `update_3d_audio`
recomputes them from the listener and each voice's 3D state; the mixer then
treats the voice like any stereo voice.

  gain     distance attenuation, see `Attenuation`
  pan      projection of the listener-to-source direction on the
           listener's right axis (-1 left .. 1 right)
  doppler  (c - f·vl) / (c - f·vs)

                  up
                  │   source
                  │  ╱
                  │ ╱ rel
                  │╱
      listener ───●────────→ right
                 ╱
                ╱ at

Right-handed coordinates: right = at × up. With LEFT_HANDED_3D:
right = up × at. Both give +x for the conventional "looking down the
forward axis" setups of each system.

For Doppler, vl and vs are the listener and source velocities projected on
the axis pointing from the source to the listener. Both are capped at c/f
so the ratio stays finite.
*/

/// Distance attenuation model.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attenuation {
    /// Constant gain at every distance.
    None,
    /// `min / (min + rolloff · (d - min))`
    #[default]
    InverseDistance,
    /// `1 - rolloff · (d - min) / (max - min)`
    LinearDistance,
    /// `(d / min)^-rolloff`
    ExponentialDistance,
}

impl Attenuation {
    /// Gain for a source `distance` units away. `distance` is clamped to
    /// `min..=max` first.
    pub fn gain(self, distance: f32, min: f32, max: f32, rolloff: f32) -> f32 {
        let min = min.max(f32::EPSILON);
        let max = max.max(min);
        let distance = distance.clamp(min, max);

        let gain = match self {
            Attenuation::None => 1.0,
            Attenuation::InverseDistance => min / (min + rolloff * (distance - min)),
            Attenuation::LinearDistance => {
                if max > min {
                    1.0 - rolloff * (distance - min) / (max - min)
                } else {
                    1.0
                }
            }
            Attenuation::ExponentialDistance => (distance / min).powf(-rolloff),
        };
        gain.clamp(0.0, 1.0)
    }
}

/// Listener state shared by every positioned voice.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub at: Vec3,
    pub up: Vec3,
    pub velocity: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            at: Vec3::NEG_Z,
            up: Vec3::Y,
            velocity: Vec3::ZERO,
        }
    }
}

/// Per-voice 3D state: inputs set through the control API, outputs written
/// by the spatial pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Spatial {
    pub position: Vec3,
    pub velocity: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub attenuation: Attenuation,
    pub rolloff: f32,
    pub doppler_factor: f32,
    /// Position is an offset from the listener that moves with it.
    pub listener_relative: bool,

    pub gain: f32,
    pub pan: f32,
    pub doppler: f32,
}

impl Spatial {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            min_distance: 1.0,
            max_distance: 1_000_000.0,
            attenuation: Attenuation::default(),
            rolloff: 1.0,
            doppler_factor: 1.0,
            listener_relative: false,
            gain: 1.0,
            pan: 0.0,
            doppler: 1.0,
        }
    }
}

/// Global 3D settings plus the listener.
#[derive(Debug, Clone, Copy)]
pub(crate) struct World {
    pub listener: Listener,
    pub sound_speed: f32,
    pub distance_scale: f32,
    pub left_handed: bool,
}

impl World {
    pub fn new(left_handed: bool) -> Self {
        Self {
            listener: Listener::default(),
            sound_speed: 343.3,
            distance_scale: 1.0,
            left_handed,
        }
    }

    pub fn spatialize(&self, voice: &mut Spatial) {
        let listener = &self.listener;
        let (offset, listener_velocity) = if voice.listener_relative {
            (voice.position, Vec3::ZERO)
        } else {
            (voice.position - listener.position, listener.velocity)
        };
        let offset = offset * self.distance_scale;
        let distance = offset.length();

        voice.gain = voice.attenuation.gain(
            distance,
            voice.min_distance,
            voice.max_distance,
            voice.rolloff,
        );

        let at = listener.at.normalize_or_zero();
        let up = listener.up.normalize_or_zero();
        let right = if self.left_handed {
            up.cross(at)
        } else {
            at.cross(up)
        };
        voice.pan = if distance > f32::EPSILON {
            (offset / distance).dot(right).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        voice.doppler = doppler(
            -offset,
            voice.velocity,
            listener_velocity,
            voice.doppler_factor,
            self.sound_speed,
        );
    }
}

/// `source_to_listener` points from the source towards the listener.
fn doppler(source_to_listener: Vec3, source_velocity: Vec3, listener_velocity: Vec3, factor: f32, speed: f32) -> f32 {
    let distance = source_to_listener.length();
    if factor <= 0.0 || speed <= 0.0 || distance <= f32::EPSILON {
        return 1.0;
    }

    let axis = source_to_listener / distance;
    // Listener moving along the axis moves away from the source.
    let max_speed = speed / factor;
    let listener_speed = axis.dot(listener_velocity).min(max_speed);
    let source_speed = axis.dot(source_velocity).min(max_speed);

    let denominator = speed - factor * source_speed;
    if denominator <= f32::EPSILON {
        return MAX_DOPPLER;
    }
    ((speed - factor * listener_speed) / denominator).clamp(0.0, MAX_DOPPLER)
}

const MAX_DOPPLER: f32 = 16.0;
