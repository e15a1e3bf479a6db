//! Realtime voice mixing engine with handle-based control.
//!
//! An [`Engine`] owns a fixed table of voices. Playing an [`AudioSource`]
//! clones it into a voice and returns a [`Handle`]; every later operation
//! (volume, pan, fades, filters, 3D position, grouping, stopping) goes
//! through that handle and quietly does nothing once the voice is gone.
//!
//! ```ignore
//! use saavy_mixer::{Engine, EngineConfig, source::Tone};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let handle = engine.play(&Tone::sine(440.0).with_duration(1.0));
//! engine.fade_volume(handle, 0.0, 0.5);
//!
//! let mut out = vec![0.0; 256 * 2];
//! engine.mix(&mut out, 256);
//! ```

pub mod backend;
pub mod bus; // Submix voices
pub mod engine;
pub mod filter;
pub mod handle;
pub mod source;
pub(crate) mod voice;

pub use backend::BackendId;
pub use bus::Bus;
pub use engine::{
    allocator::{EvictionPolicy, Oldest, Quietest, VoiceInfo},
    config::{EngineConfig, EvictionKind, InitFlags},
    spatial::{Attenuation, Listener},
    Engine, EngineError, PlayParams,
};
pub use filter::{Filter, FilterInstance};
pub use handle::Handle;
pub use source::{AudioSource, SourceError, SourceInstance};

/// Largest number of frames rendered in one internal pass. Larger `mix`
/// requests are split into chunks of this size.
pub const MAX_BLOCK_SIZE: usize = 2048;
/// Output, bus and per-voice channel limit (mono or stereo).
pub const MAX_CHANNELS: usize = 2;
pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
