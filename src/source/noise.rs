use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    filter::{Filter, FilterSlots},
    source::{AudioSource, PlayContext, SourceInstance},
};

/*
Noise
=====

  White  every sample independent and uniform in -1..1, flat spectrum
  Pink   Voss-McCartney: 16 rows of held random values, row n refreshed
         every 2^n samples, summed with one white sample. Energy falls
         3 dB per octave.

Each voice gets its own generator seeded from the engine RNG, so two noise
voices started together are not sample-identical and a run with a fixed
engine seed is reproducible. Noise never ends on its own.
*/

const PINK_ROWS: usize = 16;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseColor {
    #[default]
    White,
    Pink,
}

#[derive(Debug, Clone)]
pub struct Noise {
    color: NoiseColor,
    amplitude: f32,
    filters: FilterSlots,
}

impl Noise {
    pub fn new(color: NoiseColor) -> Self {
        Self {
            color,
            amplitude: 1.0,
            filters: FilterSlots::new(),
        }
    }

    pub fn white() -> Self {
        Self::new(NoiseColor::White)
    }

    pub fn pink() -> Self {
        Self::new(NoiseColor::Pink)
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn set_filter(&mut self, slot: usize, filter: Option<Arc<dyn Filter>>) {
        self.filters.set(slot, filter);
    }
}

impl AudioSource for Noise {
    fn channels(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> f32 {
        44_100.0
    }

    fn create_instance(&self, ctx: &PlayContext) -> Box<dyn SourceInstance> {
        Box::new(NoiseInstance {
            color: self.color,
            amplitude: self.amplitude,
            rng: SmallRng::seed_from_u64(ctx.seed),
            rows: [0.0; PINK_ROWS],
            running_sum: 0.0,
            counter: 0,
        })
    }

    fn filter(&self, slot: usize) -> Option<&dyn Filter> {
        self.filters.get(slot)
    }
}

struct NoiseInstance {
    color: NoiseColor,
    amplitude: f32,
    rng: SmallRng,
    rows: [f32; PINK_ROWS],
    running_sum: f32,
    counter: usize,
}

impl NoiseInstance {
    #[inline]
    fn white(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }

    #[inline]
    fn pink(&mut self) -> f32 {
        let row = (self.counter.trailing_zeros() as usize).min(PINK_ROWS - 1);
        let fresh = self.white();
        self.running_sum += fresh - self.rows[row];
        self.rows[row] = fresh;
        self.counter = self.counter.wrapping_add(1);

        let white = self.white();
        ((self.running_sum + white) / 5.0).clamp(-1.0, 1.0)
    }
}

impl SourceInstance for NoiseInstance {
    fn channels(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> f32 {
        44_100.0
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, _stride: usize) -> usize {
        for sample in &mut buffer[..frames] {
            let value = match self.color {
                NoiseColor::White => self.white(),
                NoiseColor::Pink => self.pink(),
            };
            *sample = value * self.amplitude;
        }
        frames
    }

    fn has_ended(&self) -> bool {
        false
    }
}
