//! The mixing engine.
//!
//! [`Engine`] is the single context object: it owns the voice table, voice
//! groups, master filter chain, listener state and every buffer the mixer
//! uses. All methods take `&self` and go through one lock, so the engine can
//! be shared between a control thread and an audio callback behind an
//! `Arc`.
//!
//! * `allocator` – voice table, handle resolution and eviction policies
//! * `scheduler` – faders and scheduled stop/pause
//! * `group` – voice groups
//! * `spatial` – listener and per-voice 3D state
//! * `mixer` – the `mix` entry point
//! * `control` – the control API
//! * `visual` – master output capture and spectrum

pub mod allocator;
pub mod config;
mod control;
pub(crate) mod group;
mod mixer;
pub mod scheduler;
pub mod spatial;
pub mod visual;

use std::cmp::Reverse;

use parking_lot::{Mutex, MutexGuard};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use thiserror::Error;

use crate::{
    backend::BackendId,
    handle::Handle,
    source::{AudioSource, PlayContext, SourceError},
    voice::{FilterChain, Voice},
    MAX_BLOCK_SIZE, MAX_CHANNELS,
};

use self::{
    allocator::{EvictionPolicy, Oldest, Quietest, VoiceInfo, VoiceTable},
    config::{EngineConfig, EvictionKind, InitFlags},
    group::GroupTable,
    scheduler::Fader,
    spatial::World,
    visual::{Capture, Spectrum},
};

/// Source failures kept until the control side drains them.
const MAX_SOURCE_ERRORS: usize = 64;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("{0:?} does not name a live voice")]
    InvalidHandle(Handle),
    #[error("{0:?} is not a playing bus")]
    NotABus(Handle),
    #[error("routing {voice:?} into {bus:?} would create a cycle")]
    BusCycle { voice: Handle, bus: Handle },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Initial state for a new voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    pub volume: f32,
    pub pan: f32,
    /// Start paused; resume with `set_pause(handle, false)`.
    pub paused: bool,
    /// Bus voice to mix into; `Handle::NONE` mixes into the master output.
    pub bus: Handle,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            paused: false,
            bus: Handle::NONE,
        }
    }
}

/// Realtime voice mixer.
pub struct Engine {
    state: Mutex<EngineState>,
    spectrum: Mutex<Spectrum>,
}

impl Engine {
    /// Create an engine driven by the caller (`BackendId::Null`).
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::init(config, BackendId::Null)
    }

    /// Create an engine and record which backend drives it. The backend
    /// itself is opened by its driver (see `backend::cpal`).
    pub fn init(config: EngineConfig, backend: BackendId) -> Result<Self, EngineError> {
        config.validate()?;
        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            max_voices = config.max_voices,
            ?backend,
            "engine initialized"
        );

        Ok(Self {
            state: Mutex::new(EngineState::new(config, backend)),
            spectrum: Mutex::new(Spectrum::new()),
        })
    }

    /// Stop every voice and release the master filters. Later calls are
    /// no-ops and `mix` outputs silence.
    pub fn deinit(&self) {
        let mut state = self.lock();
        if !state.initialized {
            return;
        }
        state.stop_all();
        state.master_filters = Default::default();
        state.initialized = false;
        state.reap();
        tracing::info!("engine deinitialized");
    }

    pub fn backend_id(&self) -> BackendId {
        self.state.lock().backend
    }

    pub fn sample_rate(&self) -> f32 {
        self.state.lock().config.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.state.lock().config.channels
    }

    pub fn max_voices(&self) -> usize {
        self.state.lock().voices.capacity()
    }

    /// Control-path lock: frees whatever the mixer retired since the last
    /// call before handing out the state.
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        let mut state = self.state.lock();
        state.reap();
        state
    }
}

pub(crate) struct EngineState {
    config: EngineConfig,
    backend: BackendId,
    initialized: bool,

    voices: VoiceTable,
    groups: GroupTable,
    master_filters: FilterChain,
    global_volume: f32,
    global_fader: Fader,
    prev_global: Option<f32>,
    post_clip_scaler: f32,
    world: World,
    clock: f64,
    rng: SmallRng,
    eviction: Box<dyn EvictionPolicy>,
    play_counter: u64,

    // Mixer working set, all sized at construction.
    scratch: Vec<f32>,
    master: Vec<f32>,
    order: Vec<usize>,
    parents: Vec<Option<usize>>,
    depths: Vec<usize>,
    topology_dirty: bool,
    removal: Vec<usize>,
    graveyard: Vec<Voice>,
    source_errors: Vec<(Handle, SourceError)>,
    capture: Capture,
}

impl EngineState {
    fn new(config: EngineConfig, backend: BackendId) -> Self {
        let capacity = config.max_voices;
        let eviction: Box<dyn EvictionPolicy> = match config.eviction {
            EvictionKind::Oldest => Box::new(Oldest),
            EvictionKind::Quietest => Box::new(Quietest),
        };

        Self {
            backend,
            initialized: true,
            voices: VoiceTable::new(capacity),
            groups: GroupTable::new(),
            master_filters: Default::default(),
            global_volume: config.global_volume,
            global_fader: Fader::idle(),
            prev_global: None,
            post_clip_scaler: config.post_clip_scaler,
            world: World::new(config.flags.contains(InitFlags::LEFT_HANDED_3D)),
            clock: 0.0,
            rng: SmallRng::seed_from_u64(config.seed),
            eviction,
            play_counter: 0,
            scratch: vec![0.0; MAX_CHANNELS * MAX_BLOCK_SIZE],
            master: vec![0.0; MAX_CHANNELS * MAX_BLOCK_SIZE],
            order: Vec::with_capacity(capacity),
            parents: vec![None; capacity],
            depths: vec![0; capacity],
            topology_dirty: false,
            removal: Vec::with_capacity(capacity),
            graveyard: Vec::with_capacity(capacity),
            source_errors: Vec::with_capacity(MAX_SOURCE_ERRORS),
            capture: Capture::new(config.flags.contains(InitFlags::ENABLE_VISUALIZATION)),
            config,
        }
    }

    /// Drop voices the mixer removed. Runs on the control thread.
    fn reap(&mut self) {
        self.graveyard.clear();
    }

    fn play(&mut self, source: &dyn AudioSource, params: PlayParams) -> Handle {
        if !self.initialized {
            return Handle::NONE;
        }

        if !params.bus.is_none() {
            let is_bus = self
                .voices
                .voice(params.bus)
                .is_some_and(|bus| bus.is_bus && !bus.ended);
            if !is_bus {
                tracing::debug!(bus = ?params.bus, "play into a bus that is not playing");
                return Handle::NONE;
            }
        }

        if self.voices.is_full() {
            if !self.evict() {
                tracing::warn!("voice table full and no voice can be evicted");
                return Handle::NONE;
            }
            // The graveyard only has room for one table's worth of voices,
            // all of which the mixer may retire before the next control call.
            self.reap();
        }

        let ctx = PlayContext {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            seed: self.rng.gen(),
        };
        let instance = source.create_instance(&ctx);
        self.play_counter += 1;

        let mut voice = Voice::new(source, instance, self.config.sample_rate, self.play_counter);
        voice.volume = params.volume;
        voice.pan = params.pan.clamp(-1.0, 1.0);
        voice.paused = params.paused;
        voice.bus = params.bus;

        let Ok(handle) = self.voices.insert(voice) else {
            return Handle::NONE;
        };
        self.topology_dirty = true;
        source.on_play(handle);
        tracing::debug!(?handle, bus = ?params.bus, "voice started");
        handle
    }

    /// Free one slot. Voices already pending removal go first, then the
    /// policy picks among unprotected non-bus voices.
    fn evict(&mut self) -> bool {
        let ended = self.voices.iter().find(|(_, v)| v.ended).map(|(i, _)| i);
        if let Some(index) = ended {
            self.destroy(index);
            return true;
        }

        let candidates: Vec<VoiceInfo> = self
            .voices
            .iter()
            .filter(|(_, voice)| !voice.protected && !voice.is_bus)
            .map(|(index, voice)| VoiceInfo {
                handle: self.voices.handle_of(index),
                play_index: voice.play_index,
                overall_volume: voice.overall_volume(),
                paused: voice.paused,
            })
            .collect();
        if candidates.is_empty() {
            return false;
        }

        let victim = self
            .eviction
            .select_victim(&candidates)
            .and_then(|pick| candidates.get(pick))
            .and_then(|info| self.voices.resolve(info.handle));
        match victim {
            Some(index) => {
                tracing::debug!(victim = ?self.voices.handle_of(index), "evicting voice");
                self.destroy(index);
                true
            }
            None => false,
        }
    }

    /// Remove a voice now. Destroying a bus destroys everything routed into
    /// it, recursively. Removed voices are parked in the graveyard so the
    /// audio thread never frees them.
    fn destroy(&mut self, index: usize) {
        self.removal.clear();
        self.removal.push(index);

        while let Some(current) = self.removal.pop() {
            let Some(voice) = self.voices.get(current) else {
                continue;
            };
            if voice.is_bus {
                let bus = self.voices.handle_of(current);
                for (child, voice) in self.voices.iter() {
                    if voice.bus == bus {
                        self.removal.push(child);
                    }
                }
            }

            if let Some(voice) = self.voices.remove(current) {
                if self.graveyard.len() < self.graveyard.capacity() {
                    self.graveyard.push(voice);
                }
            }
        }
        self.topology_dirty = true;
    }

    fn stop_all(&mut self) {
        for index in 0..self.voices.capacity() {
            if self.voices.get(index).is_some() {
                self.destroy(index);
            }
        }
    }

    /// Slot indices a control call on `handle` applies to: the voice itself,
    /// or every live member of a group.
    fn targets(&self, handle: Handle) -> Vec<usize> {
        if handle.is_group() {
            return self
                .groups
                .members(handle)
                .unwrap_or_default()
                .iter()
                .filter_map(|&member| self.live(member))
                .collect();
        }
        self.live(handle).into_iter().collect()
    }

    /// Resolve a voice handle, ignoring voices pending removal.
    fn live(&self, handle: Handle) -> Option<usize> {
        let index = self.voices.resolve(handle)?;
        let voice = self.voices.get(index)?;
        (!voice.ended).then_some(index)
    }

    fn for_each_voice(&mut self, handle: Handle, mut apply: impl FnMut(&mut Voice)) {
        for index in self.targets(handle) {
            if let Some(voice) = self.voices.get_mut(index) {
                apply(voice);
            }
        }
    }

    /// First live voice `handle` names; queries on groups return `None`.
    fn query(&self, handle: Handle) -> Option<&Voice> {
        self.voices.get(self.live(handle)?)
    }

    /// Recompute parents, depths and the render order: deepest voices first,
    /// so every voice is rendered before the bus it feeds.
    fn rebuild_order(&mut self) {
        let capacity = self.voices.capacity();
        for index in 0..capacity {
            self.parents[index] = self
                .voices
                .get(index)
                .and_then(|voice| self.voices.resolve(voice.bus));
        }
        for index in 0..capacity {
            let mut depth = 0;
            let mut cursor = self.parents[index];
            while let Some(parent) = cursor {
                depth += 1;
                if depth > capacity {
                    break;
                }
                cursor = self.parents[parent];
            }
            self.depths[index] = depth;
        }

        self.order.clear();
        self.order.extend(self.voices.iter().map(|(index, _)| index));
        let depths = &self.depths;
        let voices = &self.voices;
        self.order.sort_unstable_by_key(|&index| {
            (
                Reverse(depths[index]),
                voices.get(index).map_or(0, |voice| voice.play_index),
            )
        });
        self.topology_dirty = false;
    }

    /// Routing `voice` into `bus` would make `voice` its own ancestor.
    fn would_cycle(&self, voice: usize, bus: usize) -> bool {
        let mut cursor = Some(bus);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == voice {
                return true;
            }
            steps += 1;
            if steps > self.voices.capacity() {
                return true;
            }
            cursor = self
                .voices
                .get(current)
                .and_then(|v| self.voices.resolve(v.bus));
        }
        false
    }

    /// A voice is silent when it or any bus above it is paused.
    fn is_held(&self, index: usize) -> bool {
        let mut cursor = Some(index);
        let mut steps = 0;
        while let Some(current) = cursor {
            match self.voices.get(current) {
                Some(voice) if voice.paused => return true,
                Some(_) => {}
                None => return false,
            }
            steps += 1;
            if steps > self.voices.capacity() {
                return false;
            }
            cursor = self.parents[current];
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::Bus, source::Tone};

    fn engine(max_voices: usize) -> Engine {
        Engine::new(EngineConfig::new().max_voices(max_voices)).unwrap()
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn rejects_invalid_config() {
        let result = Engine::new(EngineConfig::new().channels(0));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn render_order_puts_children_before_buses() {
        let engine = engine(8);
        let outer = Bus::new();
        let inner = Bus::new();
        let outer_handle = engine.play(&outer);
        let inner_handle = outer.play(&engine, &inner);
        let leaf = inner.play(&engine, &Tone::sine(220.0));

        let mut state = engine.lock();
        state.rebuild_order();
        let position = |handle: Handle| {
            let index = state.voices.resolve(handle).unwrap();
            state.order.iter().position(|&i| i == index).unwrap()
        };
        assert!(position(leaf) < position(inner_handle));
        assert!(position(inner_handle) < position(outer_handle));
    }

    #[test]
    fn destroying_bus_destroys_children() {
        let engine = engine(8);
        let bus = Bus::new();
        let bus_handle = engine.play(&bus);
        let child = bus.play(&engine, &Tone::sine(220.0));
        assert!(engine.is_valid_voice_handle(child));

        engine.stop(bus_handle);
        assert!(!engine.is_valid_voice_handle(bus_handle));
        assert!(!engine.is_valid_voice_handle(child));
    }

    #[test]
    fn eviction_leaves_room_to_retire_every_voice() {
        let engine = engine(2);
        let short = Tone::sine(220.0).with_duration(0.001);
        let first = engine.play(&short);
        engine.play(&short);
        let third = engine.play(&short);
        assert!(!third.is_none());
        // Read without `Engine::lock`, which would reap.
        assert!(engine.state.lock().graveyard.is_empty());

        let mut out = vec![0.0; 512 * 2];
        engine.mix(&mut out, 512);
        {
            let state = engine.state.lock();
            assert_eq!(state.voices.len(), 0);
            assert_eq!(state.graveyard.len(), 2);
        }
        assert!(!engine.is_valid_voice_handle(first));
        assert!(!engine.is_valid_voice_handle(third));
    }

    #[test]
    fn deinit_silences_engine() {
        let engine = engine(4);
        let handle = engine.play(&Tone::sine(440.0));
        engine.deinit();

        assert!(!engine.is_valid_voice_handle(handle));
        assert!(engine.play(&Tone::sine(440.0)).is_none());

        let mut out = vec![1.0; 64];
        engine.mix(&mut out, 32);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
