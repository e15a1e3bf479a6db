use std::ops::{BitOr, BitOrAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{engine::EngineError, handle::MAX_HANDLE_SLOTS, MAX_CHANNELS};

/// Engine-wide behaviour switches.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InitFlags(u32);

impl InitFlags {
    pub const NONE: InitFlags = InitFlags(0);
    /// Soft-knee clipper instead of a hard clamp on the master output.
    pub const CLIP_ROUNDOFF: InitFlags = InitFlags(1);
    /// Use a left-handed coordinate system for 3D positions.
    pub const LEFT_HANDED_3D: InitFlags = InitFlags(1 << 1);
    /// Capture the master output for `get_wave`, `calc_fft` and
    /// `get_approximate_volume`.
    pub const ENABLE_VISUALIZATION: InitFlags = InitFlags(1 << 2);

    pub fn contains(self, other: InitFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for InitFlags {
    fn default() -> Self {
        InitFlags::CLIP_ROUNDOFF
    }
}

impl BitOr for InitFlags {
    type Output = InitFlags;

    fn bitor(self, rhs: InitFlags) -> InitFlags {
        InitFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for InitFlags {
    fn bitor_assign(&mut self, rhs: InitFlags) {
        self.0 |= rhs.0;
    }
}

/// Built-in eviction policies selectable from configuration.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionKind {
    /// Replace the voice that started first.
    #[default]
    Oldest,
    /// Replace the voice with the lowest overall volume.
    Quietest,
}

/// Engine construction settings.
///
/// ```ignore
/// let config = EngineConfig::new()
///     .sample_rate(48_000.0)
///     .max_voices(32)
///     .flags(InitFlags::CLIP_ROUNDOFF | InitFlags::LEFT_HANDED_3D);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub channels: usize,
    pub max_voices: usize,
    pub flags: InitFlags,
    pub eviction: EvictionKind,
    pub post_clip_scaler: f32,
    pub global_volume: f32,
    /// Seed for the engine RNG that feeds per-voice seeds.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            channels: 2,
            max_voices: 64,
            flags: InitFlags::default(),
            eviction: EvictionKind::default(),
            post_clip_scaler: 0.95,
            global_volume: 1.0,
            seed: 0x5eed_a0d1,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    pub fn flags(mut self, flags: InitFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn eviction(mut self, eviction: EvictionKind) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn post_clip_scaler(mut self, scaler: f32) -> Self {
        self.post_clip_scaler = scaler;
        self
    }

    pub fn global_volume(mut self, volume: f32) -> Self {
        self.global_volume = volume;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.sample_rate.is_finite() && self.sample_rate >= 1_000.0) {
            return Err(EngineError::InvalidConfig("sample rate must be at least 1 kHz"));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(EngineError::InvalidConfig("output must be mono or stereo"));
        }
        if self.max_voices == 0 || self.max_voices > MAX_HANDLE_SLOTS {
            return Err(EngineError::InvalidConfig("voice count out of range"));
        }
        Ok(())
    }
}
