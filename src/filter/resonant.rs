use std::f32::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    filter::{blend, Filter, FilterContext, FilterInstance, FilterParams, ParamInfo, WET},
    MAX_CHANNELS,
};

/*
State-Variable Filter
=====================

| type      | passes          | rejects      |
| --------- | --------------- | ------------ |
| low-pass  | below cutoff    | above cutoff |
| high-pass | above cutoff    | below cutoff |
| band-pass | around cutoff   | both sides   |
| notch     | outside cutoff  | at cutoff    |

Topology-preserving transform (TPT) form: one pair of integrator states per
channel, all four responses computed from the same update, so switching TYPE
at runtime does not click.

RESONANCE runs from 0 (gentle rolloff) towards 1 (sharp peak). It is capped
below 1 so the filter never self-oscillates into instability.
*/

pub const TYPE: usize = 1;
pub const FREQUENCY: usize = 2;
pub const RESONANCE: usize = 3;

static PARAMS: [ParamInfo; 4] = [
    ParamInfo::new("Wet", 0.0, 1.0, 1.0),
    ParamInfo::new("Type", 0.0, 3.0, 0.0),
    ParamInfo::new("Frequency", 10.0, 22_000.0, 1_000.0),
    ParamInfo::new("Resonance", 0.0, 0.98, 0.0),
];

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResonantType {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

impl ResonantType {
    fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            0 => ResonantType::LowPass,
            1 => ResonantType::HighPass,
            2 => ResonantType::BandPass,
            _ => ResonantType::Notch,
        }
    }

    fn as_param(self) -> f32 {
        match self {
            ResonantType::LowPass => 0.0,
            ResonantType::HighPass => 1.0,
            ResonantType::BandPass => 2.0,
            ResonantType::Notch => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Resonant {
    kind: ResonantType,
    frequency: f32,
    resonance: f32,
}

impl Resonant {
    pub fn new(kind: ResonantType, frequency: f32, resonance: f32) -> Self {
        Self {
            kind,
            frequency,
            resonance,
        }
    }

    pub fn lowpass(frequency: f32) -> Self {
        Self::new(ResonantType::LowPass, frequency, 0.0)
    }

    pub fn highpass(frequency: f32) -> Self {
        Self::new(ResonantType::HighPass, frequency, 0.0)
    }

    pub fn bandpass(frequency: f32) -> Self {
        Self::new(ResonantType::BandPass, frequency, 0.0)
    }

    pub fn notch(frequency: f32) -> Self {
        Self::new(ResonantType::Notch, frequency, 0.0)
    }

    pub fn with_resonance(mut self, resonance: f32) -> Self {
        self.resonance = resonance;
        self
    }
}

impl Filter for Resonant {
    fn params(&self) -> &'static [ParamInfo] {
        &PARAMS
    }

    fn create_instance(&self, _ctx: &FilterContext) -> Box<dyn FilterInstance> {
        Box::new(ResonantInstance {
            params: FilterParams::with_values(
                &PARAMS,
                &[
                    PARAMS[WET].default,
                    self.kind.as_param(),
                    self.frequency,
                    self.resonance,
                ],
            ),
            state: [Integrators::default(); MAX_CHANNELS],
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Integrators {
    ic1eq: f32,
    ic2eq: f32,
}

struct ResonantInstance {
    params: FilterParams,
    state: [Integrators; MAX_CHANNELS],
}

impl FilterInstance for ResonantInstance {
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
        let kind = ResonantType::from_param(self.params.value(TYPE));
        // Keep the cutoff under Nyquist so tan() stays finite.
        let cutoff = self.params.value(FREQUENCY).min(sample_rate * 0.49);
        let g = (PI * cutoff / sample_rate).tan();
        let k = 2.0 - 2.0 * self.params.value(RESONANCE);
        let h = 1.0 / (1.0 + g * (g + k));

        for (channel, state) in self.state.iter_mut().enumerate().take(channels) {
            let samples = &mut buffer[channel * stride..channel * stride + frames];
            for sample in samples.iter_mut() {
                let input = *sample;
                let v3 = input - state.ic2eq;
                let v1 = h * (state.ic1eq + g * v3);
                let v2 = state.ic2eq + g * v1;
                state.ic1eq = 2.0 * v1 - state.ic1eq;
                state.ic2eq = 2.0 * v2 - state.ic2eq;

                let filtered = match kind {
                    ResonantType::LowPass => v2,
                    ResonantType::HighPass => input - k * v1 - v2,
                    ResonantType::BandPass => v1,
                    ResonantType::Notch => input - k * v1,
                };
                *sample = blend(input, filtered, wet);
            }
        }
    }
}
