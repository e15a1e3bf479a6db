use crate::{
    filter::{blend, Filter, FilterContext, FilterInstance, FilterParams, ParamInfo, WET},
    MAX_CHANNELS,
};

/*
Lo-fi
=====

Two classic degradations:

  sample rate  hold each sample for `sample_rate / target_rate` input
               samples (zero-order hold), which folds high frequencies back
               down as aliasing.

  bit depth    quantize to 2^bits levels. Fractional depths are allowed and
               sound progressively crunchier below ~6 bits.
*/

pub const SAMPLE_RATE: usize = 1;
pub const BIT_DEPTH: usize = 2;

static PARAMS: [ParamInfo; 3] = [
    ParamInfo::new("Wet", 0.0, 1.0, 1.0),
    ParamInfo::new("Samplerate", 100.0, 22_000.0, 4_000.0),
    ParamInfo::new("Bitdepth", 0.5, 16.0, 3.0),
];

#[derive(Debug, Clone, Copy)]
pub struct Lofi {
    sample_rate: f32,
    bit_depth: f32,
}

impl Lofi {
    pub fn new(sample_rate: f32, bit_depth: f32) -> Self {
        Self {
            sample_rate,
            bit_depth,
        }
    }
}

impl Default for Lofi {
    fn default() -> Self {
        Self::new(PARAMS[SAMPLE_RATE].default, PARAMS[BIT_DEPTH].default)
    }
}

impl Filter for Lofi {
    fn params(&self) -> &'static [ParamInfo] {
        &PARAMS
    }

    fn create_instance(&self, _ctx: &FilterContext) -> Box<dyn FilterInstance> {
        Box::new(LofiInstance {
            params: FilterParams::with_values(
                &PARAMS,
                &[PARAMS[WET].default, self.sample_rate, self.bit_depth],
            ),
            held: [0.0; MAX_CHANNELS],
            countdown: [0.0; MAX_CHANNELS],
        })
    }
}

struct LofiInstance {
    params: FilterParams,
    held: [f32; MAX_CHANNELS],
    countdown: [f32; MAX_CHANNELS],
}

impl FilterInstance for LofiInstance {
    fn params(&self) -> &FilterParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut FilterParams {
        &mut self.params
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        frames: usize,
        stride: usize,
        channels: usize,
        sample_rate: f32,
    ) {
        let wet = self.params.value(WET);
        let hold = sample_rate / self.params.value(SAMPLE_RATE);
        let levels = 2.0_f32.powf(self.params.value(BIT_DEPTH));

        for channel in 0..channels.min(MAX_CHANNELS) {
            let samples = &mut buffer[channel * stride..channel * stride + frames];
            for sample in samples.iter_mut() {
                if self.countdown[channel] <= 0.0 {
                    self.countdown[channel] += hold;
                    self.held[channel] = (*sample * levels).floor() / levels;
                }
                self.countdown[channel] -= 1.0;
                *sample = blend(*sample, self.held[channel], wet);
            }
        }
    }
}
