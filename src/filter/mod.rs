//! Filter contract and the built-in filters.
//!
//! A [`Filter`] is a stateless template. Attaching it to a voice, a bus or
//! the master output calls [`Filter::create_instance`], which allocates
//! every buffer the stage will need; the resulting [`FilterInstance`] then
//! processes planar blocks in place without allocating.
//!
//! Parameters are addressed by index. Index 0 is the wet/dry amount for all
//! built-in filters. A parameter write lands on the next processed block;
//! already emitted samples are never touched.

use std::sync::Arc;

use crate::engine::scheduler::Fader;

/// Echo/feedback delay.
pub mod echo;
/// Sample-rate and bit-depth reduction.
pub mod lofi;
/// State-variable filter (lowpass, highpass, bandpass, notch).
pub mod resonant;

pub use echo::Echo;
pub use lofi::Lofi;
pub use resonant::{Resonant, ResonantType};

/// Filter slots per voice, bus and master chain.
pub const MAX_FILTERS: usize = 8;
/// Parameter slots per filter instance.
pub const MAX_PARAMS: usize = 8;

/// Parameter id of the wet/dry amount on every built-in filter.
pub const WET: usize = 0;

/// Static description of one filter parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamInfo {
    pub const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }
}

/// What a filter instance is going to be fed.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
    pub sample_rate: f32,
    pub channels: usize,
}

/// Filter template.
pub trait Filter: Send + Sync {
    /// Parameter table, indexed by parameter id.
    fn params(&self) -> &'static [ParamInfo];

    fn create_instance(&self, ctx: &FilterContext) -> Box<dyn FilterInstance>;
}

/// Live filter stage attached to one voice, bus or the master chain.
pub trait FilterInstance: Send {
    fn params(&self) -> &FilterParams;

    fn params_mut(&mut self) -> &mut FilterParams;

    /// Process `frames` samples of each channel in place. Channel `c` lives at
    /// `buffer[c * stride..c * stride + frames]`.
    fn process(
        &mut self,
        buffer: &mut [f32],
        frames: usize,
        stride: usize,
        channels: usize,
        sample_rate: f32,
    );

    fn get_param(&self, id: usize) -> Option<f32> {
        self.params().get(id)
    }

    fn set_param(&mut self, id: usize, value: f32) {
        self.params_mut().set(id, value);
    }
}

/// Parameter storage shared by filter instances: current values plus one
/// fader per parameter so the engine can ramp them between blocks.
#[derive(Debug, Clone)]
pub struct FilterParams {
    info: &'static [ParamInfo],
    values: [f32; MAX_PARAMS],
    faders: [Fader; MAX_PARAMS],
}

impl FilterParams {
    /// Start from the table defaults.
    pub fn new(info: &'static [ParamInfo]) -> Self {
        debug_assert!(info.len() <= MAX_PARAMS);
        let mut values = [0.0; MAX_PARAMS];
        for (value, param) in values.iter_mut().zip(info) {
            *value = param.default;
        }
        Self {
            info,
            values,
            faders: [Fader::idle(); MAX_PARAMS],
        }
    }

    /// Start from explicit values, clamped to the table ranges.
    pub fn with_values(info: &'static [ParamInfo], initial: &[f32]) -> Self {
        let mut params = Self::new(info);
        for (id, &value) in initial.iter().enumerate() {
            params.set(id, value);
        }
        params
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn info(&self, id: usize) -> Option<&ParamInfo> {
        self.info.get(id)
    }

    pub fn get(&self, id: usize) -> Option<f32> {
        (id < self.info.len()).then(|| self.values[id])
    }

    /// Read a parameter known to exist; built-in filters use this on their
    /// own ids.
    pub fn value(&self, id: usize) -> f32 {
        self.values[id]
    }

    /// Direct write. Cancels any fade running on the same parameter.
    pub fn set(&mut self, id: usize, value: f32) {
        let Some(info) = self.info.get(id) else {
            return;
        };
        self.faders[id].cancel();
        self.values[id] = value.clamp(info.min, info.max);
    }

    /// Ramp towards `to`. A duration at or below zero is a direct write.
    pub fn fade(&mut self, id: usize, to: f32, duration: f64) {
        if id >= self.info.len() {
            return;
        }
        if duration <= 0.0 {
            self.set(id, to);
            return;
        }
        let from = self.values[id];
        self.faders[id].ramp(from, to, duration);
    }

    pub fn oscillate(&mut self, id: usize, from: f32, to: f32, period: f64) {
        if id >= self.info.len() {
            return;
        }
        self.faders[id].oscillate(from, to, period);
    }

    /// Step every running fade by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        for (id, info) in self.info.iter().enumerate() {
            if let Some(value) = self.faders[id].advance(dt) {
                self.values[id] = value.clamp(info.min, info.max);
            }
        }
    }
}

/// Filter templates attached to a source or bus template, instantiated when
/// it is played.
#[derive(Clone, Default)]
pub struct FilterSlots {
    slots: [Option<Arc<dyn Filter>>; MAX_FILTERS],
}

impl FilterSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-range slots are ignored.
    pub fn set(&mut self, slot: usize, filter: Option<Arc<dyn Filter>>) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = filter;
        }
    }

    pub fn get(&self, slot: usize) -> Option<&dyn Filter> {
        self.slots.get(slot)?.as_deref()
    }
}

impl std::fmt::Debug for FilterSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attached: Vec<usize> = (0..MAX_FILTERS)
            .filter(|&slot| self.slots[slot].is_some())
            .collect();
        f.debug_struct("FilterSlots")
            .field("attached", &attached)
            .finish()
    }
}

/// Blend processed and dry signal: `wet` of 1.0 keeps only the processed one.
#[inline]
pub(crate) fn blend(dry: f32, processed: f32, wet: f32) -> f32 {
    processed * wet + dry * (1.0 - wet)
}
