//! Buses: voices whose audio is the submix of other voices.
//!
//! A [`Bus`] is played like any other source. Voices routed into the
//! resulting bus voice are mixed into its [`Submix`] instead of the master
//! output; the bus voice then runs its own filter chain, volume, pan and
//! fades over that submix and hands the result to its own parent (another
//! bus, or the master output).
//!
//! ```ignore
//! let mut music = Bus::new();
//! music.set_filter(0, Some(Arc::new(Echo::new(0.2, 0.5, 0.1))));
//! let bus = engine.play(&music);
//! let voice = music.play(&engine, &clip);
//! engine.set_volume(bus, 0.5); // affects `voice` too
//! ```

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use glam::Vec3;

use crate::{
    engine::{Engine, PlayParams},
    filter::{Filter, FilterSlots},
    handle::Handle,
    source::{AudioSource, PlayContext, SourceInstance},
    MAX_BLOCK_SIZE, MAX_CHANNELS,
};

/// Planar accumulation buffer owned by a bus voice.
///
/// Channel `c` lives at `c * MAX_BLOCK_SIZE`. Sized once, when the bus voice
/// is created.
#[derive(Debug, Clone)]
pub struct Submix {
    buffer: Vec<f32>,
    channels: usize,
}

impl Submix {
    pub fn new(channels: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        Self {
            buffer: vec![0.0; channels * MAX_BLOCK_SIZE],
            channels,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stride(&self) -> usize {
        MAX_BLOCK_SIZE
    }

    /// Zero the first `frames` frames of every channel.
    pub fn clear(&mut self, frames: usize) {
        for channel in 0..self.channels {
            let start = channel * MAX_BLOCK_SIZE;
            self.buffer[start..start + frames].fill(0.0);
        }
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * MAX_BLOCK_SIZE;
        &self.buffer[start..start + MAX_BLOCK_SIZE]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * MAX_BLOCK_SIZE;
        &mut self.buffer[start..start + MAX_BLOCK_SIZE]
    }

    /// Whole planar buffer, stride `MAX_BLOCK_SIZE`.
    pub(crate) fn buffer_mut(&mut self) -> &mut [f32] {
        &mut self.buffer
    }
}

/// Bus template.
///
/// Cloning a `Bus` shares the live handle: both copies route into the same
/// bus voice.
#[derive(Debug, Clone)]
pub struct Bus {
    channels: usize,
    filters: FilterSlots,
    handle: Arc<AtomicU32>,
}

impl Bus {
    /// Stereo bus.
    pub fn new() -> Self {
        Self::with_channels(2)
    }

    pub fn mono() -> Self {
        Self::with_channels(1)
    }

    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels: channels.clamp(1, MAX_CHANNELS),
            filters: FilterSlots::new(),
            handle: Arc::new(AtomicU32::new(Handle::NONE.raw())),
        }
    }

    /// Attach a filter to the bus chain. Takes effect on the next `play` of
    /// this bus; use [`Engine::set_voice_filter`] for a bus already playing.
    pub fn set_filter(&mut self, slot: usize, filter: Option<Arc<dyn Filter>>) {
        self.filters.set(slot, filter);
    }

    /// Handle of the most recently started voice of this bus, or
    /// [`Handle::NONE`] if it was never played.
    pub fn handle(&self) -> Handle {
        Handle::from_raw(self.handle.load(Ordering::Acquire))
    }

    /// Play `source` into this bus.
    ///
    /// Returns [`Handle::NONE`] when the bus is not playing on `engine`.
    pub fn play(&self, engine: &Engine, source: &dyn AudioSource) -> Handle {
        self.play_with(engine, source, PlayParams::default())
    }

    pub fn play_with(&self, engine: &Engine, source: &dyn AudioSource, params: PlayParams) -> Handle {
        if self.handle().is_none() {
            return Handle::NONE;
        }
        engine.play_with(
            source,
            PlayParams {
                bus: self.handle(),
                ..params
            },
        )
    }

    /// Play a positioned source into this bus.
    pub fn play_3d(
        &self,
        engine: &Engine,
        source: &dyn AudioSource,
        position: Vec3,
        velocity: Vec3,
        volume: f32,
    ) -> Handle {
        if self.handle().is_none() {
            return Handle::NONE;
        }
        engine.play_3d_with(
            source,
            position,
            velocity,
            PlayParams {
                volume,
                bus: self.handle(),
                ..PlayParams::default()
            },
        )
    }

    /// Move an already playing voice into this bus.
    pub fn annex(&self, engine: &Engine, voice: Handle) -> Result<(), crate::EngineError> {
        engine.route_to_bus(voice, self.handle())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for Bus {
    fn channels(&self) -> usize {
        self.channels
    }

    /// Buses always run at the engine rate; this is the nominal value only.
    fn sample_rate(&self) -> f32 {
        44_100.0
    }

    fn create_instance(&self, ctx: &PlayContext) -> Box<dyn SourceInstance> {
        Box::new(BusInstance {
            submix: Submix::new(self.channels),
            sample_rate: ctx.sample_rate,
        })
    }

    fn filter(&self, slot: usize) -> Option<&dyn Filter> {
        self.filters.get(slot)
    }

    fn on_play(&self, handle: Handle) {
        self.handle.store(handle.raw(), Ordering::Release);
    }
}

struct BusInstance {
    submix: Submix,
    sample_rate: f32,
}

impl SourceInstance for BusInstance {
    fn channels(&self) -> usize {
        self.submix.channels()
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, stride: usize) -> usize {
        for channel in 0..self.submix.channels() {
            buffer[channel * stride..channel * stride + frames]
                .copy_from_slice(&self.submix.channel(channel)[..frames]);
        }
        frames
    }

    fn has_ended(&self) -> bool {
        false
    }

    fn submix(&mut self) -> Option<&mut Submix> {
        Some(&mut self.submix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submix_is_read_back_planar() {
        let bus = Bus::new();
        let mut instance = bus.create_instance(&PlayContext {
            sample_rate: 48_000.0,
            channels: 2,
            seed: 0,
        });

        {
            let submix = instance.submix().unwrap();
            submix.channel_mut(0)[..4].copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
            submix.channel_mut(1)[..4].copy_from_slice(&[-0.1, -0.2, -0.3, -0.4]);
        }

        let mut out = vec![0.0; 8];
        assert_eq!(instance.get_audio(&mut out, 4, 4), 4);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4, -0.1, -0.2, -0.3, -0.4]);
        assert_eq!(instance.sample_rate(), 48_000.0);

        instance.submix().unwrap().clear(4);
        instance.get_audio(&mut out, 4, 4);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn unplayed_bus_has_no_handle() {
        let bus = Bus::mono();
        assert!(bus.handle().is_none());
        assert_eq!(bus.channels(), 1);

        bus.on_play(Handle::from_raw(0x1001));
        assert_eq!(bus.clone().handle(), Handle::from_raw(0x1001));
    }
}
