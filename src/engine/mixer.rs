use crate::{
    engine::{config::InitFlags, Engine, EngineState},
    source::silence_tail,
    voice::{accumulate, Voice},
    MAX_BLOCK_SIZE,
};

/*
Mixing Pipeline
===============

`mix` holds the engine lock for the whole call and works in chunks of at
most MAX_BLOCK_SIZE frames:

  1. advance     clock, global volume, master filter params, every voice's
                 faders and filter params; fire scheduled stop/pause
  2. topology    rebuild render order if voices came or went
  3. clear       every bus submix and the master buffer
  4. render      for each voice, deepest first, unless it or a bus above it
                 is paused:

                   source ─→ resampler ─→ scratch ─→ filter chain
                                                          │
                          parent submix or master  ←─(gain ramp)

  5. master      master filters, global volume, clipper, post-clip scaler
  6. output      interleave into the caller's buffer
  7. reap        destroy voices that ended during the chunk

Nothing here allocates, frees, blocks or fails. Removed voices are parked
for the control thread to drop.
*/

/// Soft clipper used with `InitFlags::CLIP_ROUNDOFF`: a cubic knee that
/// meets ±0.9862875 at ±1.65 and stays flat beyond.
#[inline]
fn roundoff(x: f32) -> f32 {
    if x <= -1.65 {
        -0.986_287_5
    } else if x >= 1.65 {
        0.986_287_5
    } else {
        0.87 * x - 0.1 * x * x * x
    }
}

impl Engine {
    /// Render `frames` frames of interleaved output into `out`.
    ///
    /// `out` must hold at least `frames * channels()` samples; a shorter
    /// buffer is filled as far as whole frames fit.
    pub fn mix(&self, out: &mut [f32], frames: usize) {
        let mut state = self.state.lock();
        let channels = state.config.channels;
        let frames = frames.min(out.len() / channels);

        if !state.initialized {
            out[..frames * channels].fill(0.0);
            return;
        }

        let mut offset = 0;
        while offset < frames {
            let chunk = (frames - offset).min(MAX_BLOCK_SIZE);
            state.mix_chunk(chunk);

            let dest = &mut out[offset * channels..(offset + chunk) * channels];
            for (i, frame) in dest.chunks_exact_mut(channels).enumerate() {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = state.master[channel * MAX_BLOCK_SIZE + i];
                }
            }
            offset += chunk;
        }
    }

    /// [`Engine::mix`] with 16-bit signed output.
    pub fn mix_i16(&self, out: &mut [i16], frames: usize) {
        let mut state = self.state.lock();
        let channels = state.config.channels;
        let frames = frames.min(out.len() / channels);

        if !state.initialized {
            out[..frames * channels].fill(0);
            return;
        }

        let mut offset = 0;
        while offset < frames {
            let chunk = (frames - offset).min(MAX_BLOCK_SIZE);
            state.mix_chunk(chunk);

            let dest = &mut out[offset * channels..(offset + chunk) * channels];
            for (i, frame) in dest.chunks_exact_mut(channels).enumerate() {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    let value = state.master[channel * MAX_BLOCK_SIZE + i].clamp(-1.0, 1.0);
                    *sample = (value * i16::MAX as f32) as i16;
                }
            }
            offset += chunk;
        }
    }
}

impl EngineState {
    /// Render one chunk into `self.master` (planar, stride MAX_BLOCK_SIZE).
    pub(super) fn mix_chunk(&mut self, frames: usize) {
        let dt = frames as f64 / self.config.sample_rate as f64;
        self.advance(dt);

        if self.topology_dirty {
            self.rebuild_order();
        }

        for (_, voice) in self.voices.iter_mut() {
            if let Some(submix) = voice.instance.submix() {
                submix.clear(frames);
            }
        }
        let channels = self.config.channels;
        silence_tail(&mut self.master, 0, frames, MAX_BLOCK_SIZE, channels);

        for position in 0..self.order.len() {
            let index = self.order[position];
            self.render_voice(index, frames, dt);
        }

        self.finish_master(frames);

        for index in 0..self.voices.capacity() {
            if self.voices.get(index).is_some_and(|voice| voice.ended) {
                self.destroy(index);
            }
        }
    }

    fn advance(&mut self, dt: f64) {
        self.clock += dt;

        if let Some(volume) = self.global_fader.advance(dt) {
            self.global_volume = volume;
        }
        for filter in self.master_filters.iter_mut().flatten() {
            filter.params_mut().advance(dt);
        }

        for (_, voice) in self.voices.iter_mut() {
            if voice.ended {
                continue;
            }
            let faders = &mut voice.faders;
            if let Some(volume) = faders.volume.advance(dt) {
                voice.volume = volume;
            }
            if let Some(pan) = faders.pan.advance(dt) {
                voice.pan = pan.clamp(-1.0, 1.0);
            }
            if let Some(speed) = faders.speed.advance(dt) {
                voice.speed = speed.max(MIN_SPEED);
            }
            if faders.stop.advance(dt) {
                voice.ended = true;
            }
            if faders.pause.advance(dt) {
                voice.paused = true;
            }
            voice.advance_filters(dt);
        }
    }

    fn render_voice(&mut self, index: usize, frames: usize, dt: f64) {
        if self.is_held(index) {
            return;
        }
        let engine_rate = self.config.sample_rate;
        let handle = self.voices.handle_of(index);
        let parent = self.parents[index];
        let dest_channels = match parent {
            Some(bus) => self.voices.get(bus).map_or(0, |bus| bus.channels),
            None => self.config.channels,
        };

        let Some(voice) = self.voices.get_mut(index) else {
            return;
        };
        if voice.ended {
            return;
        }
        let channels = voice.channels;

        let produced = if voice.is_bus {
            voice.instance.get_audio(&mut self.scratch, frames, MAX_BLOCK_SIZE)
        } else {
            render_source(voice, &mut self.scratch, frames, engine_rate)
        };
        silence_tail(&mut self.scratch, produced.min(frames), frames, MAX_BLOCK_SIZE, channels);

        if let Err(error) = voice.instance.status() {
            voice.ended = true;
            if !voice.error_reported {
                voice.error_reported = true;
                if self.source_errors.len() < self.source_errors.capacity() {
                    self.source_errors.push((handle, error));
                }
            }
        }

        for filter in voice.filters.iter_mut().flatten() {
            filter.process(&mut self.scratch, frames, MAX_BLOCK_SIZE, channels, engine_rate);
        }
        voice.stream_time += dt;

        let to = voice.gains(dest_channels);
        let from = voice.prev_gains.unwrap_or(to);
        voice.prev_gains = Some(to);

        let dest = match parent {
            Some(bus) => match self.voices.get_mut(bus).and_then(|bus| bus.instance.submix()) {
                Some(submix) => submix.buffer_mut(),
                None => return,
            },
            None => &mut self.master[..],
        };
        accumulate(
            &self.scratch,
            MAX_BLOCK_SIZE,
            channels,
            dest,
            MAX_BLOCK_SIZE,
            dest_channels,
            frames,
            from,
            to,
        );
    }

    fn finish_master(&mut self, frames: usize) {
        let channels = self.config.channels;
        let engine_rate = self.config.sample_rate;
        for filter in self.master_filters.iter_mut().flatten() {
            filter.process(&mut self.master, frames, MAX_BLOCK_SIZE, channels, engine_rate);
        }

        let to = self.global_volume;
        let from = self.prev_global.unwrap_or(to);
        self.prev_global = Some(to);
        let delta = (to - from) / frames as f32;
        let roundoff_clip = self.config.flags.contains(InitFlags::CLIP_ROUNDOFF);
        let scaler = self.post_clip_scaler;

        for channel in 0..channels {
            let samples = &mut self.master[channel * MAX_BLOCK_SIZE..channel * MAX_BLOCK_SIZE + frames];
            for (i, sample) in samples.iter_mut().enumerate() {
                let value = *sample * (from + delta * (i + 1) as f32);
                let clipped = if roundoff_clip {
                    roundoff(value)
                } else {
                    value.clamp(-1.0, 1.0)
                };
                *sample = clipped * scaler;
            }
        }

        self.capture.record(&self.master, frames, channels);
    }
}

/// Lowest relative play speed a fader or setter can reach.
pub(super) const MIN_SPEED: f32 = 0.01;

/// Pull `frames` frames through the voice's resampler, rewinding looping
/// sources at their loop point. Returns frames produced.
fn render_source(voice: &mut Voice, scratch: &mut [f32], frames: usize, engine_rate: f32) -> usize {
    let step = voice.step(engine_rate);
    let channels = voice.channels;
    let seconds_per_frame = step / voice.sample_rate as f64;

    let mut produced = voice.resampler.render(
        voice.instance.as_mut(),
        scratch,
        frames,
        MAX_BLOCK_SIZE,
        channels,
        step,
    );
    voice.stream_position += produced as f64 * seconds_per_frame;

    while voice.resampler.is_drained() {
        if !voice.looping || voice.instance.seek(voice.loop_point).is_err() {
            voice.ended = true;
            break;
        }
        voice.resampler.restart();
        voice.stream_position = voice.loop_point;
        if produced >= frames {
            break;
        }

        let more = voice.resampler.render(
            voice.instance.as_mut(),
            &mut scratch[produced..],
            frames - produced,
            MAX_BLOCK_SIZE,
            channels,
            step,
        );
        voice.stream_position += more as f64 * seconds_per_frame;
        produced += more;
        if more == 0 {
            // Nothing left after the loop point either.
            voice.ended = voice.resampler.is_drained();
            break;
        }
    }

    produced
}
