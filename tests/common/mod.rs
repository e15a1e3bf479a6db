#![allow(dead_code)]

use saavy_mixer::{
    filter::{FilterContext, FilterParams, ParamInfo},
    source::PlayContext,
    AudioSource, Engine, EngineConfig, Filter, FilterInstance, InitFlags, SourceError,
    SourceInstance,
};

/// Mono engine with a transparent master stage: no soft clip, no post-clip
/// scaling, so test signals come out unchanged.
pub fn transparent_mono() -> Engine {
    Engine::new(
        EngineConfig::new()
            .channels(1)
            .flags(InitFlags::NONE)
            .post_clip_scaler(1.0),
    )
    .unwrap()
}

/// Transparent stereo engine.
pub fn transparent_stereo() -> Engine {
    Engine::new(
        EngineConfig::new()
            .channels(2)
            .flags(InitFlags::NONE)
            .post_clip_scaler(1.0),
    )
    .unwrap()
}

/// Mix `frames` frames in blocks of `block` and return the interleaved
/// result.
pub fn render(engine: &Engine, frames: usize, block: usize) -> Vec<f32> {
    let channels = engine.channels();
    let mut out = vec![0.0; frames * channels];
    for chunk in out.chunks_mut(block * channels) {
        let len = chunk.len() / channels;
        engine.mix(chunk, len);
    }
    out
}

/// Constant signal, optionally limited to a number of frames.
#[derive(Debug, Clone, Copy)]
pub struct Dc {
    pub level: f32,
    pub channels: usize,
    pub sample_rate: f32,
    pub frames: Option<u64>,
}

impl Dc {
    pub fn mono(level: f32) -> Self {
        Self {
            level,
            channels: 1,
            sample_rate: 44_100.0,
            frames: None,
        }
    }

    pub fn stereo(level: f32) -> Self {
        Self {
            channels: 2,
            ..Self::mono(level)
        }
    }
}

impl AudioSource for Dc {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn create_instance(&self, _ctx: &PlayContext) -> Box<dyn SourceInstance> {
        Box::new(DcInstance {
            dc: *self,
            position: 0,
        })
    }
}

struct DcInstance {
    dc: Dc,
    position: u64,
}

impl SourceInstance for DcInstance {
    fn channels(&self) -> usize {
        self.dc.channels
    }

    fn sample_rate(&self) -> f32 {
        self.dc.sample_rate
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, stride: usize) -> usize {
        let available = match self.dc.frames {
            Some(total) => (total.saturating_sub(self.position) as usize).min(frames),
            None => frames,
        };
        for channel in 0..self.dc.channels {
            buffer[channel * stride..channel * stride + available].fill(self.dc.level);
        }
        self.position += available as u64;
        available
    }

    fn has_ended(&self) -> bool {
        self.dc.frames.is_some_and(|total| self.position >= total)
    }
}

/// Source that plays a little and then reports a decode failure.
#[derive(Debug, Clone, Copy)]
pub struct Failing {
    pub good_frames: u64,
}

impl AudioSource for Failing {
    fn channels(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> f32 {
        44_100.0
    }

    fn create_instance(&self, _ctx: &PlayContext) -> Box<dyn SourceInstance> {
        Box::new(FailingInstance {
            left: self.good_frames,
        })
    }
}

struct FailingInstance {
    left: u64,
}

impl SourceInstance for FailingInstance {
    fn channels(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> f32 {
        44_100.0
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, _stride: usize) -> usize {
        let available = (self.left as usize).min(frames);
        buffer[..available].fill(0.25);
        self.left -= available as u64;
        available
    }

    fn has_ended(&self) -> bool {
        false
    }

    fn status(&self) -> Result<(), SourceError> {
        if self.left == 0 {
            Err(SourceError::Decode)
        } else {
            Ok(())
        }
    }
}

pub const GAIN: usize = 1;
pub const BIAS: usize = 2;

static GAIN_PARAMS: [ParamInfo; 3] = [
    ParamInfo::new("Wet", 0.0, 1.0, 1.0),
    ParamInfo::new("Gain", 0.0, 16.0, 2.0),
    ParamInfo::new("Bias", -1.0, 8.0, 0.0),
];

/// `x * gain + bias`. Makes it easy to count how many times a chain ran.
#[derive(Debug, Clone, Copy)]
pub struct Gain(pub f32);

impl Filter for Gain {
    fn params(&self) -> &'static [ParamInfo] {
        &GAIN_PARAMS
    }

    fn create_instance(&self, _ctx: &FilterContext) -> Box<dyn FilterInstance> {
        Box::new(GainInstance {
            params: FilterParams::with_values(&GAIN_PARAMS, &[1.0, self.0]),
        })
    }
}

struct GainInstance {
    params: FilterParams,
}

impl FilterInstance for GainInstance {
    fn params(&self) -> &FilterParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut FilterParams {
        &mut self.params
    }

    fn process(&mut self, buffer: &mut [f32], frames: usize, stride: usize, channels: usize, _sample_rate: f32) {
        let gain = self.params.value(GAIN);
        let bias = self.params.value(BIAS);
        for channel in 0..channels {
            for sample in &mut buffer[channel * stride..channel * stride + frames] {
                *sample = *sample * gain + bias;
            }
        }
    }
}
