use crate::source::SourceInstance;

/*
Resampler
=========

Converts a source running at its own rate (times the voice's relative play
speed, times Doppler) to the engine rate with linear interpolation.

The source is pulled in chunks of RESAMPLE_CHUNK frames into a planar carry
buffer. `pos` is the fractional read position inside that buffer; `step` is
how far it moves per output frame.

    carry:  [ f0 f1 f2 f3 ... f(len-1) | unused ]
                 ↑
                pos = 1.4  →  out = f1 + 0.4 · (f2 - f1)

When `pos` runs out of neighbours the remaining frames are moved to the
front and the buffer is topped up. A step of exactly 1.0 reproduces the
source samples unchanged.

Once the source reports end of stream, the last frames are emitted without a
right neighbour and the resampler becomes drained.
*/

pub(crate) const RESAMPLE_CHUNK: usize = 512;

const MIN_STEP: f64 = 1.0 / 64.0;
const MAX_STEP: f64 = 16.0;

pub(crate) struct Resampler {
    buffer: Vec<f32>,
    channels: usize,
    len: usize,
    pos: f64,
    exhausted: bool,
}

impl Resampler {
    /// Allocates the carry buffer for `channels` source channels.
    pub fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            buffer: vec![0.0; channels * RESAMPLE_CHUNK],
            channels,
            len: 0,
            pos: 0.0,
            exhausted: false,
        }
    }

    /// Forget buffered audio, e.g. after a seek.
    pub fn restart(&mut self) {
        self.len = 0;
        self.pos = 0.0;
        self.exhausted = false;
    }

    /// The source has ended and every buffered frame was emitted.
    pub fn is_drained(&self) -> bool {
        self.exhausted && self.pos >= self.len as f64
    }

    /// Render up to `frames` frames of the first `out_channels` channels into
    /// `out`. Returns the number of frames written; fewer than `frames` means
    /// the source ended or could not deliver in time.
    pub fn render(
        &mut self,
        source: &mut dyn SourceInstance,
        out: &mut [f32],
        frames: usize,
        stride: usize,
        out_channels: usize,
        step: f64,
    ) -> usize {
        let step = step.clamp(MIN_STEP, MAX_STEP);
        let channels = out_channels.min(self.channels);
        let mut produced = 0;

        while produced < frames {
            let index = self.pos as usize;

            if index + 1 >= self.len {
                if self.exhausted {
                    if index >= self.len {
                        break;
                    }
                    // Last frame, no right neighbour to blend with.
                    for channel in 0..channels {
                        out[channel * stride + produced] =
                            self.buffer[channel * RESAMPLE_CHUNK + index];
                    }
                    produced += 1;
                    self.pos += step;
                    continue;
                }

                if !self.refill(source) {
                    break;
                }
                continue;
            }

            let frac = (self.pos - index as f64) as f32;
            for channel in 0..channels {
                let base = channel * RESAMPLE_CHUNK + index;
                let a = self.buffer[base];
                let b = self.buffer[base + 1];
                out[channel * stride + produced] = a + (b - a) * frac;
            }
            produced += 1;
            self.pos += step;
        }

        produced
    }

    /// Move unread frames to the front and pull more from the source.
    /// Returns false on underrun.
    fn refill(&mut self, source: &mut dyn SourceInstance) -> bool {
        let index = self.pos as usize;

        if index >= self.len {
            // The step jumped past everything buffered; throw away the
            // frames it skipped in the source as well.
            let mut skip = index - self.len;
            while skip > 0 && !self.exhausted {
                let want = skip.min(RESAMPLE_CHUNK);
                let got = source.get_audio(&mut self.buffer, want, RESAMPLE_CHUNK);
                skip -= got.min(skip);
                self.check_end(source);
                if got == 0 && !self.exhausted {
                    break;
                }
            }
            self.pos -= index as f64;
            self.len = 0;
        } else {
            let keep = self.len - index;
            for channel in 0..self.channels {
                let start = channel * RESAMPLE_CHUNK;
                self.buffer
                    .copy_within(start + index..start + self.len, start);
            }
            self.pos -= index as f64;
            self.len = keep;
        }

        if self.exhausted {
            return true;
        }

        let want = RESAMPLE_CHUNK - self.len;
        let got = source.get_audio(&mut self.buffer[self.len..], want, RESAMPLE_CHUNK);
        self.len += got.min(want);
        self.check_end(source);

        got > 0 || self.exhausted
    }

    fn check_end(&mut self, source: &dyn SourceInstance) {
        if source.has_ended() || source.status().is_err() {
            self.exhausted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AudioSource, Clip, PlayContext};

    fn instance(samples: Vec<f32>) -> Box<dyn SourceInstance> {
        Clip::from_mono(samples, 100.0)
            .unwrap()
            .create_instance(&PlayContext {
                sample_rate: 100.0,
                channels: 1,
                seed: 0,
            })
    }

    #[test]
    fn unit_step_is_transparent() {
        let samples: Vec<f32> = (0..1500).map(|i| i as f32).collect();
        let mut source = instance(samples.clone());
        let mut resampler = Resampler::new(1);

        let mut out = vec![0.0; 1500];
        let mut done = 0;
        while done < 1500 {
            let n = resampler.render(source.as_mut(), &mut out[done..], 256.min(1500 - done), 1500, 1, 1.0);
            assert!(n > 0);
            done += n;
        }

        assert_eq!(out, samples);
        assert!(resampler.is_drained());
    }

    #[test]
    fn half_step_interpolates() {
        let mut source = instance(vec![0.0, 1.0, 2.0, 3.0]);
        let mut resampler = Resampler::new(1);

        let mut out = vec![0.0; 16];
        let n = resampler.render(source.as_mut(), &mut out, 16, 16, 1, 0.5);

        assert_eq!(n, 8);
        assert_eq!(&out[..8], &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.0]);
        assert!(resampler.is_drained());
    }

    #[test]
    fn double_step_skips_frames() {
        let samples: Vec<f32> = (0..2000).map(|i| i as f32).collect();
        let mut source = instance(samples);
        let mut resampler = Resampler::new(1);

        let mut out = vec![0.0; 1000];
        let n = resampler.render(source.as_mut(), &mut out, 1000, 1000, 1, 2.0);

        assert_eq!(n, 1000);
        for (i, &v) in out.iter().enumerate() {
            assert_eq!(v, (i * 2) as f32);
        }
    }

    #[test]
    fn restart_after_seek_replays() {
        let mut source = instance(vec![1.0, 2.0, 3.0]);
        let mut resampler = Resampler::new(1);
        let mut out = vec![0.0; 8];

        resampler.render(source.as_mut(), &mut out, 8, 8, 1, 1.0);
        assert!(resampler.is_drained());

        source.seek(0.0).unwrap();
        resampler.restart();
        let n = resampler.render(source.as_mut(), &mut out, 8, 8, 1, 1.0);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
    }
}
