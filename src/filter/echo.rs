use crate::{
    filter::{blend, Filter, FilterContext, FilterInstance, FilterParams, ParamInfo, WET},
    MAX_CHANNELS,
};

/*
Echo
====

A feedback delay line per channel:

    in ──┬──────────────────────(+)──→ out
         │                       ↑
         └──→ [ delay line ] ──(×decay)
                   ↑      │
                   └─(lp)─┘

The line is sized once, when the instance is created, for the template's
`max_delay`. Changing DELAY at runtime moves the read point inside that
allocation; it never reallocates. FILTER is a one-pole lowpass on the
feedback path (0 = bright repeats, close to 1 = dull repeats).
*/

pub const DELAY: usize = 1;
pub const DECAY: usize = 2;
pub const FILTER: usize = 3;

static PARAMS: [ParamInfo; 4] = [
    ParamInfo::new("Wet", 0.0, 1.0, 1.0),
    ParamInfo::new("Delay", 0.0, 10.0, 0.3),
    ParamInfo::new("Decay", 0.0, 1.0, 0.7),
    ParamInfo::new("Filter", 0.0, 0.99, 0.0),
];

#[derive(Debug, Clone, Copy)]
pub struct Echo {
    delay: f32,
    decay: f32,
    filter: f32,
    max_delay: f32,
}

impl Echo {
    pub fn new(delay: f32, decay: f32, filter: f32) -> Self {
        Self {
            delay,
            decay,
            filter,
            max_delay: delay.max(PARAMS[DELAY].default),
        }
    }

    /// Reserve room for longer runtime delays than the initial one.
    pub fn with_max_delay(mut self, seconds: f32) -> Self {
        self.max_delay = seconds.max(self.delay);
        self
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new(
            PARAMS[DELAY].default,
            PARAMS[DECAY].default,
            PARAMS[FILTER].default,
        )
    }
}

impl Filter for Echo {
    fn params(&self) -> &'static [ParamInfo] {
        &PARAMS
    }

    fn create_instance(&self, ctx: &FilterContext) -> Box<dyn FilterInstance> {
        let capacity = ((self.max_delay.min(PARAMS[DELAY].max) * ctx.sample_rate).ceil() as usize)
            .max(1);
        let lines = (0..ctx.channels.clamp(1, MAX_CHANNELS))
            .map(|_| DelayLine::new(capacity))
            .collect();

        Box::new(EchoInstance {
            params: FilterParams::with_values(
                &PARAMS,
                &[PARAMS[WET].default, self.delay, self.decay, self.filter],
            ),
            lines,
        })
    }
}

struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    /// Sample written `delay` samples ago.
    #[inline]
    fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1, len);
        self.buffer[(self.write_pos + len - delay) % len]
    }

    #[inline]
    fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }
}

struct EchoInstance {
    params: FilterParams,
    lines: Vec<DelayLine>,
}

impl FilterInstance for EchoInstance {
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
        let delay = (self.params.value(DELAY) * sample_rate).round() as usize;
        let decay = self.params.value(DECAY);
        let filter = self.params.value(FILTER);

        for (channel, line) in self.lines.iter_mut().enumerate().take(channels) {
            let samples = &mut buffer[channel * stride..channel * stride + frames];
            for sample in samples.iter_mut() {
                let echoed = *sample + line.read(delay) * decay;
                let previous = line.read(1);
                line.write(echoed * (1.0 - filter) + previous * filter);
                *sample = blend(*sample, echoed, wet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 1_000.0;

    fn ctx() -> FilterContext {
        FilterContext {
            sample_rate: RATE,
            channels: 1,
        }
    }

    #[test]
    fn impulse_repeats_after_delay() {
        // 10ms at 1kHz = 10 samples
        let mut echo = Echo::new(0.01, 0.5, 0.0).create_instance(&ctx());
        let mut buffer = vec![0.0f32; 32];
        buffer[0] = 1.0;

        echo.process(&mut buffer, 32, 32, 1, RATE);

        assert_eq!(buffer[0], 1.0);
        assert!((buffer[10] - 0.5).abs() < 1e-6, "first repeat, got {}", buffer[10]);
        assert!((buffer[20] - 0.25).abs() < 1e-6, "second repeat, got {}", buffer[20]);
        assert!(buffer[5].abs() < 1e-6);
    }

    #[test]
    fn delay_change_stays_inside_allocation() {
        let mut echo = Echo::new(0.01, 0.5, 0.0).create_instance(&ctx());
        echo.set_param(DELAY, 5.0);

        let mut buffer = vec![0.5f32; 64];
        echo.process(&mut buffer, 64, 64, 1, RATE);

        assert!(buffer.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn stereo_channels_are_independent() {
        let mut echo = Echo::new(0.005, 0.5, 0.0).create_instance(&FilterContext {
            sample_rate: RATE,
            channels: 2,
        });
        let stride = 16;
        let mut buffer = vec![0.0f32; stride * 2];
        buffer[0] = 1.0;

        echo.process(&mut buffer, stride, stride, 2, RATE);

        assert!((buffer[5] - 0.5).abs() < 1e-6);
        assert!(buffer[stride..].iter().all(|&s| s == 0.0), "right channel stays silent");
    }
}
