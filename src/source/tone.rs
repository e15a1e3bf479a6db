use std::{f32::consts::TAU, sync::Arc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    filter::{Filter, FilterSlots},
    source::{AudioSource, PlayContext, SourceError, SourceInstance},
};

/*
Tone
====

A single-channel periodic waveform, optionally limited to a duration.

  Sine      pure fundamental
  Square    odd harmonics, 1/n
  Saw       all harmonics, 1/n
  Triangle  odd harmonics, 1/n²

The phase accumulator runs in cycles (0.0..1.0), so the waveform shapes are
all simple functions of phase. No band limiting: this is a test and demo
source, not a synthesizer.
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Waveform {
    #[inline]
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tone {
    waveform: Waveform,
    frequency: f32,
    amplitude: f32,
    duration: Option<f64>,
    sample_rate: f32,
    looping: bool,
    filters: FilterSlots,
}

impl Tone {
    pub fn new(waveform: Waveform, frequency: f32) -> Self {
        Self {
            waveform,
            frequency,
            amplitude: 1.0,
            duration: None,
            sample_rate: 44_100.0,
            looping: false,
            filters: FilterSlots::new(),
        }
    }

    pub fn sine(frequency: f32) -> Self {
        Self::new(Waveform::Sine, frequency)
    }

    pub fn square(frequency: f32) -> Self {
        Self::new(Waveform::Square, frequency)
    }

    pub fn saw(frequency: f32) -> Self {
        Self::new(Waveform::Saw, frequency)
    }

    pub fn triangle(frequency: f32) -> Self {
        Self::new(Waveform::Triangle, frequency)
    }

    /// Stop producing audio after `seconds`. Without a duration the tone
    /// never ends.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds.max(0.0));
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Rate the waveform is generated at; the mixer converts to the engine
    /// rate.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate.max(1.0);
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn set_filter(&mut self, slot: usize, filter: Option<Arc<dyn Filter>>) {
        self.filters.set(slot, filter);
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }
}

impl AudioSource for Tone {
    fn channels(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn create_instance(&self, _ctx: &PlayContext) -> Box<dyn SourceInstance> {
        let total = self
            .duration
            .map(|seconds| (seconds * self.sample_rate as f64).round() as u64);

        Box::new(ToneInstance {
            waveform: self.waveform,
            increment: self.frequency / self.sample_rate,
            amplitude: self.amplitude,
            sample_rate: self.sample_rate,
            phase: 0.0,
            position: 0,
            total,
        })
    }

    fn filter(&self, slot: usize) -> Option<&dyn Filter> {
        self.filters.get(slot)
    }

    fn looping(&self) -> bool {
        self.looping
    }
}

struct ToneInstance {
    waveform: Waveform,
    increment: f32,
    amplitude: f32,
    sample_rate: f32,
    phase: f32,
    position: u64,
    total: Option<u64>,
}

impl SourceInstance for ToneInstance {
    fn channels(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, _stride: usize) -> usize {
        let available = match self.total {
            Some(total) => (total.saturating_sub(self.position) as usize).min(frames),
            None => frames,
        };

        for sample in &mut buffer[..available] {
            *sample = self.waveform.sample(self.phase) * self.amplitude;
            self.phase += self.increment;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }

        self.position += available as u64;
        available
    }

    fn has_ended(&self) -> bool {
        self.total.is_some_and(|total| self.position >= total)
    }

    fn seek(&mut self, seconds: f64) -> Result<(), SourceError> {
        if seconds < 0.0 {
            return Err(SourceError::SeekOutOfRange);
        }
        let position = (seconds * self.sample_rate as f64).round() as u64;
        if self.total.is_some_and(|total| position > total) {
            return Err(SourceError::SeekOutOfRange);
        }

        self.position = position;
        self.phase = (position as f64 * self.increment as f64).fract() as f32;
        Ok(())
    }
}
