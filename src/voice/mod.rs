//! Per-voice playback state owned by the voice table.

pub(crate) mod resampler;

use std::f32::consts::FRAC_PI_4;

use crate::{
    engine::{scheduler::VoiceFaders, spatial::Spatial},
    filter::{FilterContext, FilterInstance, MAX_FILTERS},
    handle::Handle,
    source::{AudioSource, SourceInstance},
    MAX_CHANNELS,
};

use self::resampler::Resampler;

pub(crate) type FilterChain = [Option<Box<dyn FilterInstance>>; MAX_FILTERS];

/// Everything the mixer needs to render one playing sound.
pub(crate) struct Voice {
    pub instance: Box<dyn SourceInstance>,
    pub filters: FilterChain,
    /// Channels actually mixed (source channels capped at `MAX_CHANNELS`).
    pub channels: usize,
    pub sample_rate: f32,

    pub paused: bool,
    /// Set once the voice should disappear at the next chunk boundary.
    pub ended: bool,
    pub volume: f32,
    pub pan: f32,
    pub speed: f32,
    /// Bus this voice mixes into; `Handle::NONE` is the master output.
    pub bus: Handle,
    pub is_bus: bool,
    pub looping: bool,
    pub loop_point: f64,
    pub protected: bool,
    pub play_index: u64,

    pub faders: VoiceFaders,
    pub spatial: Option<Spatial>,
    pub stream_time: f64,
    pub stream_position: f64,

    pub resampler: Resampler,
    /// Gains applied at the end of the previous chunk, ramp start for the
    /// next one.
    pub prev_gains: Option<[f32; MAX_CHANNELS]>,
    pub error_reported: bool,
}

impl Voice {
    /// Instantiate `source` and its template filters. Allocates; control
    /// thread only.
    pub fn new(
        source: &dyn AudioSource,
        mut instance: Box<dyn SourceInstance>,
        engine_rate: f32,
        play_index: u64,
    ) -> Self {
        let source_channels = instance.channels().max(1);
        let channels = source_channels.min(MAX_CHANNELS);
        let sample_rate = instance.sample_rate();
        let is_bus = instance.submix().is_some();

        let ctx = FilterContext {
            // Voice filters run after resampling, at the engine rate.
            sample_rate: engine_rate,
            channels,
        };
        let filters = std::array::from_fn(|slot| {
            source.filter(slot).map(|filter| filter.create_instance(&ctx))
        });

        Self {
            instance,
            filters,
            channels,
            sample_rate,
            paused: false,
            ended: false,
            volume: 1.0,
            pan: 0.0,
            speed: 1.0,
            bus: Handle::NONE,
            is_bus,
            looping: source.looping(),
            loop_point: source.loop_point(),
            protected: false,
            play_index,
            faders: VoiceFaders::default(),
            spatial: None,
            stream_time: 0.0,
            stream_position: 0.0,
            resampler: Resampler::new(source_channels),
            prev_gains: None,
            error_reported: false,
        }
    }

    /// Volume including 3D attenuation.
    pub fn overall_volume(&self) -> f32 {
        self.volume * self.spatial.map_or(1.0, |s| s.gain)
    }

    /// Pan actually applied: the 3D pass overrides the manual one.
    pub fn effective_pan(&self) -> f32 {
        self.spatial.map_or(self.pan, |s| s.pan)
    }

    /// Source frames consumed per output frame.
    pub fn step(&self, engine_rate: f32) -> f64 {
        let doppler = self.spatial.map_or(1.0, |s| s.doppler);
        (self.sample_rate as f64 / engine_rate as f64) * (self.speed * doppler) as f64
    }

    /// Per-destination-channel gains for a destination with `dest_channels`
    /// channels.
    pub fn gains(&self, dest_channels: usize) -> [f32; MAX_CHANNELS] {
        channel_gains(
            self.overall_volume(),
            self.effective_pan(),
            self.channels,
            dest_channels,
        )
    }

    pub fn advance_filters(&mut self, dt: f64) {
        for filter in self.filters.iter_mut().flatten() {
            filter.params_mut().advance(dt);
        }
    }
}

/*
Gain routing
============

  source  dest   rule
  ──────  ────   ──────────────────────────────────────────────
  mono    mono   g0 = volume
  stereo  mono   g0 = volume / 2, both source channels summed
  mono    stereo constant power: g = volume · (cos θ, sin θ),
                 θ = (pan + 1) · π/4
  stereo  stereo balance: left keeps full level until pan > 0, then
                 falls linearly to 0 at pan = 1 (mirrored for right)

With stereo into stereo, channel c of the source feeds channel c of the
destination. In every other case all source channels feed every
destination channel with that channel's gain.
*/

pub(crate) fn channel_gains(
    volume: f32,
    pan: f32,
    source_channels: usize,
    dest_channels: usize,
) -> [f32; MAX_CHANNELS] {
    let pan = pan.clamp(-1.0, 1.0);
    match (source_channels, dest_channels) {
        (1, 1) => [volume, 0.0],
        (_, 1) => [volume * 0.5, 0.0],
        (1, _) => {
            let theta = (pan + 1.0) * FRAC_PI_4;
            [volume * theta.cos(), volume * theta.sin()]
        }
        _ => [volume * (1.0 - pan).min(1.0), volume * (1.0 + pan).min(1.0)],
    }
}

/// Add `frames` frames of a planar source block into a planar destination,
/// ramping each destination gain linearly from `from` to `to`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn accumulate(
    source: &[f32],
    source_stride: usize,
    source_channels: usize,
    dest: &mut [f32],
    dest_stride: usize,
    dest_channels: usize,
    frames: usize,
    from: [f32; MAX_CHANNELS],
    to: [f32; MAX_CHANNELS],
) {
    if frames == 0 {
        return;
    }
    let inv = 1.0 / frames as f32;
    let paired = source_channels == dest_channels && source_channels > 1;

    for (dest_channel, (&start, &end)) in from.iter().zip(&to).enumerate().take(dest_channels) {
        let delta = (end - start) * inv;
        let out = &mut dest[dest_channel * dest_stride..dest_channel * dest_stride + frames];

        for source_channel in 0..source_channels {
            if paired && source_channel != dest_channel {
                continue;
            }
            let input = &source[source_channel * source_stride..source_channel * source_stride + frames];
            for (i, (o, &x)) in out.iter_mut().zip(input).enumerate() {
                *o += x * (start + delta * (i + 1) as f32);
            }
        }
    }
}
