use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::{MAX_BLOCK_SIZE, MAX_CHANNELS};

/// Samples kept from the master output for `Engine::get_wave`.
pub const WAVE_SIZE: usize = 256;
/// Magnitude bins returned by `Engine::calc_fft`.
pub const FFT_BINS: usize = WAVE_SIZE / 2;

/// Captured master output, updated by the mixer when visualization is on.
#[derive(Debug, Clone)]
pub(crate) struct Capture {
    pub enabled: bool,
    pub wave: [f32; WAVE_SIZE],
    pub volume: [f32; MAX_CHANNELS],
}

impl Capture {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            wave: [0.0; WAVE_SIZE],
            volume: [0.0; MAX_CHANNELS],
        }
    }

    /// Take the first `WAVE_SIZE` frames of the chunk (channel average) and
    /// the per-channel peak.
    pub fn record(&mut self, master: &[f32], frames: usize, channels: usize) {
        if !self.enabled {
            return;
        }

        for (channel, volume) in self.volume.iter_mut().enumerate() {
            *volume = if channel < channels {
                master[channel * MAX_BLOCK_SIZE..channel * MAX_BLOCK_SIZE + frames]
                    .iter()
                    .fold(0.0f32, |peak, &x| peak.max(x.abs()))
            } else {
                0.0
            };
        }

        let take = frames.min(WAVE_SIZE);
        let scale = 1.0 / channels as f32;
        for (i, sample) in self.wave.iter_mut().enumerate() {
            *sample = if i < take {
                (0..channels).map(|c| master[c * MAX_BLOCK_SIZE + i]).sum::<f32>() * scale
            } else {
                0.0
            };
        }
    }
}

/// Spectrum of the captured wave. Runs on the caller's thread, outside the
/// engine lock.
pub(crate) struct Spectrum {
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Spectrum {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(WAVE_SIZE);

        // Hann window
        let denom = (WAVE_SIZE - 1) as f32;
        let window = (0..WAVE_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
            .collect();

        Self {
            window,
            fft,
            scratch: vec![Complex::new(0.0, 0.0); WAVE_SIZE],
        }
    }

    /// Linear magnitudes of the positive-frequency bins.
    pub fn analyze(&mut self, wave: &[f32; WAVE_SIZE]) -> [f32; FFT_BINS] {
        for ((bin, &sample), &w) in self.scratch.iter_mut().zip(wave).zip(&self.window) {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let mut magnitudes = [0.0; FFT_BINS];
        for (magnitude, bin) in magnitudes.iter_mut().zip(&self.scratch) {
            *magnitude = bin.norm() * 2.0 / WAVE_SIZE as f32;
        }
        magnitudes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_in_its_bin() {
        let mut wave = [0.0; WAVE_SIZE];
        for (i, sample) in wave.iter_mut().enumerate() {
            // Exactly 16 cycles over the window.
            *sample = (std::f32::consts::TAU * 16.0 * i as f32 / WAVE_SIZE as f32).sin();
        }

        let bins = Spectrum::new().analyze(&wave);
        let peak = bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(16));
    }

    #[test]
    fn capture_tracks_peak_per_channel() {
        let mut master = vec![0.0; MAX_BLOCK_SIZE * 2];
        master[3] = -0.5;
        master[MAX_BLOCK_SIZE + 7] = 0.25;

        let mut capture = Capture::new(true);
        capture.record(&master, 64, 2);
        assert_eq!(capture.volume, [0.5, 0.25]);
        assert_eq!(capture.wave[3], -0.25);
    }
}
