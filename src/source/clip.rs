use std::sync::Arc;

use crate::{
    filter::{Filter, FilterSlots},
    source::{silence_tail, AudioSource, PlayContext, SourceError, SourceInstance},
    MAX_CHANNELS,
};

/// Fully decoded audio held in memory.
///
/// Samples are shared between the template and every voice playing it, so
/// playing a clip never copies the data.
#[derive(Debug, Clone)]
pub struct Clip {
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: f32,
    looping: bool,
    loop_point: f64,
    filters: FilterSlots,
}

impl Clip {
    /// Build a clip from interleaved samples.
    pub fn from_interleaved(
        samples: impl Into<Arc<[f32]>>,
        channels: usize,
        sample_rate: f32,
    ) -> Result<Self, SourceError> {
        let samples = samples.into();
        if channels == 0 || sample_rate <= 0.0 || samples.len() % channels != 0 {
            return Err(SourceError::InvalidData);
        }

        Ok(Self {
            samples,
            channels,
            sample_rate,
            looping: false,
            loop_point: 0.0,
            filters: FilterSlots::new(),
        })
    }

    pub fn from_mono(samples: impl Into<Arc<[f32]>>, sample_rate: f32) -> Result<Self, SourceError> {
        Self::from_interleaved(samples, 1, sample_rate)
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_loop_point(mut self, seconds: f64) -> Self {
        self.loop_point = seconds.max(0.0);
        self
    }

    pub fn set_filter(&mut self, slot: usize, filter: Option<Arc<dyn Filter>>) {
        self.filters.set(slot, filter);
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Length in seconds.
    pub fn length(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

impl AudioSource for Clip {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn create_instance(&self, _ctx: &PlayContext) -> Box<dyn SourceInstance> {
        Box::new(ClipInstance {
            samples: Arc::clone(&self.samples),
            channels: self.channels,
            sample_rate: self.sample_rate,
            position: 0,
        })
    }

    fn filter(&self, slot: usize) -> Option<&dyn Filter> {
        self.filters.get(slot)
    }

    fn looping(&self) -> bool {
        self.looping
    }

    fn loop_point(&self) -> f64 {
        self.loop_point
    }
}

struct ClipInstance {
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: f32,
    /// Next frame to read.
    position: usize,
}

impl ClipInstance {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl SourceInstance for ClipInstance {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, stride: usize) -> usize {
        let available = self.frames().saturating_sub(self.position).min(frames);
        // Channels past the output limit are dropped by the mixer anyway.
        let written = self.channels.min(MAX_CHANNELS);

        for channel in 0..written {
            let out = &mut buffer[channel * stride..channel * stride + available];
            for (i, sample) in out.iter_mut().enumerate() {
                *sample = self.samples[(self.position + i) * self.channels + channel];
            }
        }
        silence_tail(buffer, available, frames, stride, written);

        self.position += available;
        available
    }

    fn has_ended(&self) -> bool {
        self.position >= self.frames()
    }

    fn seek(&mut self, seconds: f64) -> Result<(), SourceError> {
        let frame = (seconds * self.sample_rate as f64).round();
        if frame < 0.0 || frame as usize > self.frames() {
            return Err(SourceError::SeekOutOfRange);
        }
        self.position = frame as usize;
        Ok(())
    }
}
