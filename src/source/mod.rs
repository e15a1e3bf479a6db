//! Audio source contract and reference sources.
//!
//! An [`AudioSource`] is a template: it holds settings, never playback
//! state. Every `play` asks it for a fresh [`SourceInstance`], which owns all
//! mutable state for that one voice. Two voices playing the same template
//! never share anything mutable.
//!
//! Audio is exchanged in planar blocks: channel `c` of a block lives at
//! `buffer[c * stride..c * stride + frames]`.

use thiserror::Error;

use crate::{
    bus::Submix,
    filter::Filter,
    handle::Handle,
};

/// In-memory sample data.
pub mod clip;
/// White and pink noise.
pub mod noise;
/// Sequential playback of clips handed over from the control thread.
#[cfg(feature = "rtrb")]
pub mod queue;
/// Periodic waveforms.
pub mod tone;

pub use clip::Clip;
pub use noise::{Noise, NoiseColor};
#[cfg(feature = "rtrb")]
pub use queue::Queue;
pub use tone::{Tone, Waveform};

/// Failures a source can report. Kept `Copy` so the mixer can record them
/// without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source does not support seeking")]
    SeekUnsupported,
    #[error("seek position is outside the source")]
    SeekOutOfRange,
    #[error("sample data is malformed")]
    InvalidData,
    #[error("source failed to decode audio")]
    Decode,
    #[error("queued source does not match the queue format")]
    FormatMismatch,
    #[error("queue is full")]
    QueueFull,
}

/// Settings handed to a source when the engine instantiates it.
#[derive(Debug, Clone, Copy)]
pub struct PlayContext {
    /// Engine output rate. Sources may run at any rate; the mixer resamples.
    pub sample_rate: f32,
    /// Engine output channel count.
    pub channels: usize,
    /// Per-play random seed drawn from the engine RNG.
    pub seed: u64,
}

/// Stateless sound producer template.
pub trait AudioSource: Send + Sync {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> f32;

    /// Create the per-play state. Called on the control thread; may allocate.
    fn create_instance(&self, ctx: &PlayContext) -> Box<dyn SourceInstance>;

    /// Filter template attached to `slot`, instantiated for every play.
    fn filter(&self, _slot: usize) -> Option<&dyn Filter> {
        None
    }

    /// Whether new voices of this source start looping.
    fn looping(&self) -> bool {
        false
    }

    /// Position in seconds a looping voice rewinds to.
    fn loop_point(&self) -> f64 {
        0.0
    }

    /// Called with the new voice's handle right after it is created.
    fn on_play(&self, _handle: Handle) {}
}

/// Per-voice playback state produced by [`AudioSource::create_instance`].
pub trait SourceInstance: Send {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> f32;

    /// Write up to `frames` frames and return how many were produced. Fewer
    /// than requested means the stream is at (or near) its end. Must not
    /// allocate or block.
    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, stride: usize) -> usize;

    /// True once no more audio will be produced.
    fn has_ended(&self) -> bool;

    fn seek(&mut self, _seconds: f64) -> Result<(), SourceError> {
        Err(SourceError::SeekUnsupported)
    }

    /// Internal failure, if any. The mixer treats an error as end of stream.
    fn status(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Bus instances expose their accumulation buffer here.
    fn submix(&mut self) -> Option<&mut Submix> {
        None
    }
}

/// Zero the tail of each channel from `from` up to `frames`.
pub(crate) fn silence_tail(buffer: &mut [f32], from: usize, frames: usize, stride: usize, channels: usize) {
    if from >= frames {
        return;
    }
    for channel in 0..channels {
        buffer[channel * stride + from..channel * stride + frames].fill(0.0);
    }
}
