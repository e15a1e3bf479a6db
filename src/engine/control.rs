use std::sync::Arc;

use glam::Vec3;

use crate::{
    engine::{
        allocator::EvictionPolicy,
        mixer::MIN_SPEED,
        spatial::{Attenuation, Listener, Spatial},
        visual::{FFT_BINS, WAVE_SIZE},
        Engine, EngineError, EngineState, PlayParams,
    },
    filter::{Filter, FilterContext, FilterInstance, MAX_FILTERS},
    handle::Handle,
    source::{AudioSource, SourceError},
    MAX_CHANNELS,
};

/*
Control API
===========

Every call resolves its handle first. A stale or null voice handle makes a
setter do nothing and a getter return its default. Calls that make sense on
many voices at once also accept a voice-group handle and apply to every
member that is still alive; getters on a group handle return the default.

Direct setters cancel the fader on the scalar they write, so the last write
always wins over an older fade.
*/

impl Engine {
    // --- playing -----------------------------------------------------------

    /// Start `source` with default parameters.
    ///
    /// Returns [`Handle::NONE`] when no voice slot can be obtained.
    pub fn play(&self, source: &dyn AudioSource) -> Handle {
        self.play_with(source, PlayParams::default())
    }

    pub fn play_with(&self, source: &dyn AudioSource, params: PlayParams) -> Handle {
        self.lock().play(source, params)
    }

    /// Start a positioned source. The 3D pass runs for the new voice before
    /// it becomes audible, so the first mixed chunk is already spatialized.
    pub fn play_3d(&self, source: &dyn AudioSource, position: Vec3, velocity: Vec3) -> Handle {
        self.play_3d_with(source, position, velocity, PlayParams::default())
    }

    pub fn play_3d_with(
        &self,
        source: &dyn AudioSource,
        position: Vec3,
        velocity: Vec3,
        params: PlayParams,
    ) -> Handle {
        let mut state = self.lock();
        let handle = state.play(
            source,
            PlayParams {
                paused: true,
                ..params
            },
        );

        let world = state.world;
        if let Some(voice) = state.voices.voice_mut(handle) {
            let mut spatial = Spatial::new(position, velocity);
            world.spatialize(&mut spatial);
            voice.spatial = Some(spatial);
            voice.paused = params.paused;
        }
        handle
    }

    // --- lifecycle ---------------------------------------------------------

    /// Destroy a voice (or every voice in a group) now. Stopping a bus stops
    /// everything routed into it.
    pub fn stop(&self, handle: Handle) {
        let mut state = self.lock();
        for index in state.targets(handle) {
            tracing::debug!(handle = ?state.voices.handle_of(index), "voice stopped");
            state.destroy(index);
        }
        state.reap();
    }

    pub fn stop_all(&self) {
        let mut state = self.lock();
        state.stop_all();
        state.reap();
    }

    /// True while `handle` names a voice that has not been stopped or ended.
    pub fn is_valid_voice_handle(&self, handle: Handle) -> bool {
        self.lock().live(handle).is_some()
    }

    /// Voices occupying a slot, playing or paused.
    pub fn voice_count(&self) -> usize {
        self.lock().voices.len()
    }

    /// Voices that are audible this chunk: not paused and not under a paused
    /// bus.
    pub fn active_voice_count(&self) -> usize {
        let state = self.lock();
        state
            .voices
            .iter()
            .filter(|(index, voice)| !voice.ended && !state.paused_chain(*index))
            .count()
    }

    pub fn set_pause(&self, handle: Handle, paused: bool) {
        self.lock().for_each_voice(handle, |voice| voice.paused = paused);
    }

    pub fn get_pause(&self, handle: Handle) -> bool {
        self.lock().query(handle).is_some_and(|voice| voice.paused)
    }

    pub fn set_pause_all(&self, paused: bool) {
        let mut state = self.lock();
        for (_, voice) in state.voices.iter_mut() {
            voice.paused = paused;
        }
    }

    /// Stop after `seconds` of engine time.
    pub fn schedule_stop(&self, handle: Handle, seconds: f64) {
        self.lock()
            .for_each_voice(handle, |voice| voice.faders.stop.arm(seconds));
    }

    /// Pause after `seconds` of engine time.
    pub fn schedule_pause(&self, handle: Handle, seconds: f64) {
        self.lock()
            .for_each_voice(handle, |voice| voice.faders.pause.arm(seconds));
    }

    /// Protected voices are never chosen for eviction.
    pub fn set_protect_voice(&self, handle: Handle, protect: bool) {
        self.lock()
            .for_each_voice(handle, |voice| voice.protected = protect);
    }

    pub fn get_protect_voice(&self, handle: Handle) -> bool {
        self.lock().query(handle).is_some_and(|voice| voice.protected)
    }

    pub fn set_looping(&self, handle: Handle, looping: bool) {
        self.lock()
            .for_each_voice(handle, |voice| voice.looping = looping);
    }

    pub fn get_looping(&self, handle: Handle) -> bool {
        self.lock().query(handle).is_some_and(|voice| voice.looping)
    }

    pub fn set_loop_point(&self, handle: Handle, seconds: f64) {
        self.lock()
            .for_each_voice(handle, |voice| voice.loop_point = seconds.max(0.0));
    }

    pub fn get_loop_point(&self, handle: Handle) -> f64 {
        self.lock().query(handle).map_or(0.0, |voice| voice.loop_point)
    }

    /// Move the read position of a voice's source.
    pub fn seek(&self, handle: Handle, seconds: f64) -> Result<(), EngineError> {
        let mut state = self.lock();
        let index = state.live(handle).ok_or(EngineError::InvalidHandle(handle))?;
        let voice = state
            .voices
            .get_mut(index)
            .ok_or(EngineError::InvalidHandle(handle))?;

        if let Err(error) = voice.instance.seek(seconds) {
            tracing::warn!(?handle, seconds, %error, "seek failed");
            return Err(error.into());
        }
        voice.resampler.restart();
        voice.stream_position = seconds;
        Ok(())
    }

    /// Seconds the voice has been audible.
    pub fn get_stream_time(&self, handle: Handle) -> f64 {
        self.lock().query(handle).map_or(0.0, |voice| voice.stream_time)
    }

    /// Position in the source, in seconds of source time.
    pub fn get_stream_position(&self, handle: Handle) -> f64 {
        self.lock()
            .query(handle)
            .map_or(0.0, |voice| voice.stream_position)
    }

    /// Seconds of audio mixed since the engine started.
    pub fn clock(&self) -> f64 {
        self.lock().clock
    }

    /// Replace the eviction policy used when the voice table is full.
    pub fn set_eviction_policy(&self, policy: Box<dyn EvictionPolicy>) {
        self.lock().eviction = policy;
    }

    // --- volume, pan, speed -----------------------------------------------

    pub fn set_volume(&self, handle: Handle, volume: f32) {
        self.lock().for_each_voice(handle, |voice| {
            voice.faders.volume.cancel();
            voice.volume = volume;
        });
    }

    pub fn get_volume(&self, handle: Handle) -> f32 {
        self.lock().query(handle).map_or(0.0, |voice| voice.volume)
    }

    /// Volume including 3D attenuation.
    pub fn get_overall_volume(&self, handle: Handle) -> f32 {
        self.lock()
            .query(handle)
            .map_or(0.0, |voice| voice.overall_volume())
    }

    /// -1 is full left, 1 full right.
    pub fn set_pan(&self, handle: Handle, pan: f32) {
        self.lock().for_each_voice(handle, |voice| {
            voice.faders.pan.cancel();
            voice.pan = pan.clamp(-1.0, 1.0);
        });
    }

    pub fn get_pan(&self, handle: Handle) -> f32 {
        self.lock().query(handle).map_or(0.0, |voice| voice.pan)
    }

    /// Playback rate relative to the source's own rate.
    pub fn set_relative_play_speed(&self, handle: Handle, speed: f32) {
        self.lock().for_each_voice(handle, |voice| {
            voice.faders.speed.cancel();
            voice.speed = speed.max(MIN_SPEED);
        });
    }

    pub fn get_relative_play_speed(&self, handle: Handle) -> f32 {
        self.lock().query(handle).map_or(1.0, |voice| voice.speed)
    }

    /// Rate of the voice's source in Hz.
    pub fn get_sample_rate(&self, handle: Handle) -> f32 {
        self.lock().query(handle).map_or(0.0, |voice| voice.sample_rate)
    }

    pub fn set_global_volume(&self, volume: f32) {
        let mut state = self.lock();
        state.global_fader.cancel();
        state.global_volume = volume;
    }

    pub fn get_global_volume(&self) -> f32 {
        self.lock().global_volume
    }

    /// Scale applied after clipping; keeps the clipped signal off full
    /// scale.
    pub fn set_post_clip_scaler(&self, scaler: f32) {
        self.lock().post_clip_scaler = scaler;
    }

    pub fn get_post_clip_scaler(&self) -> f32 {
        self.lock().post_clip_scaler
    }

    // --- faders ------------------------------------------------------------

    // A fade of zero or negative length is a direct set.
    pub fn fade_volume(&self, handle: Handle, to: f32, seconds: f64) {
        self.lock().for_each_voice(handle, |voice| {
            if seconds <= 0.0 {
                voice.faders.volume.cancel();
                voice.volume = to;
            } else {
                voice.faders.volume.ramp(voice.volume, to, seconds);
            }
        });
    }

    pub fn fade_pan(&self, handle: Handle, to: f32, seconds: f64) {
        let to = to.clamp(-1.0, 1.0);
        self.lock().for_each_voice(handle, |voice| {
            if seconds <= 0.0 {
                voice.faders.pan.cancel();
                voice.pan = to;
            } else {
                voice.faders.pan.ramp(voice.pan, to, seconds);
            }
        });
    }

    pub fn fade_relative_play_speed(&self, handle: Handle, to: f32, seconds: f64) {
        let to = to.max(MIN_SPEED);
        self.lock().for_each_voice(handle, |voice| {
            if seconds <= 0.0 {
                voice.faders.speed.cancel();
                voice.speed = to;
            } else {
                voice.faders.speed.ramp(voice.speed, to, seconds);
            }
        });
    }

    pub fn fade_global_volume(&self, to: f32, seconds: f64) {
        let mut state = self.lock();
        if seconds <= 0.0 {
            state.global_fader.cancel();
            state.global_volume = to;
            return;
        }
        let from = state.global_volume;
        state.global_fader.ramp(from, to, seconds);
    }

    pub fn oscillate_volume(&self, handle: Handle, from: f32, to: f32, period: f64) {
        self.lock().for_each_voice(handle, |voice| {
            voice.faders.volume.oscillate(from, to, period);
        });
    }

    pub fn oscillate_pan(&self, handle: Handle, from: f32, to: f32, period: f64) {
        self.lock().for_each_voice(handle, |voice| {
            voice
                .faders
                .pan
                .oscillate(from.clamp(-1.0, 1.0), to.clamp(-1.0, 1.0), period);
        });
    }

    pub fn oscillate_relative_play_speed(&self, handle: Handle, from: f32, to: f32, period: f64) {
        self.lock().for_each_voice(handle, |voice| {
            voice
                .faders
                .speed
                .oscillate(from.max(MIN_SPEED), to.max(MIN_SPEED), period);
        });
    }

    pub fn oscillate_global_volume(&self, from: f32, to: f32, period: f64) {
        self.lock().global_fader.oscillate(from, to, period);
    }

    // --- filters -----------------------------------------------------------

    /// Attach (or with `None` detach) a filter on the master output.
    pub fn set_global_filter(&self, slot: usize, filter: Option<Arc<dyn Filter>>) {
        let mut state = self.lock();
        let ctx = FilterContext {
            sample_rate: state.config.sample_rate,
            channels: state.config.channels,
        };
        if let Some(entry) = state.master_filters.get_mut(slot) {
            *entry = filter.map(|filter| filter.create_instance(&ctx));
        }
    }

    /// Attach (or detach) a filter on a playing voice or bus.
    pub fn set_voice_filter(&self, handle: Handle, slot: usize, filter: Option<Arc<dyn Filter>>) {
        if slot >= MAX_FILTERS {
            return;
        }
        let mut state = self.lock();
        let sample_rate = state.config.sample_rate;
        state.for_each_voice(handle, |voice| {
            let ctx = FilterContext {
                sample_rate,
                channels: voice.channels,
            };
            voice.filters[slot] = filter.as_ref().map(|filter| filter.create_instance(&ctx));
        });
    }

    /// Write a filter parameter. [`Handle::NONE`] addresses the master
    /// chain. The new value is used from the next processed chunk on.
    pub fn set_filter_parameter(&self, handle: Handle, slot: usize, param: usize, value: f32) {
        self.lock()
            .with_filters(handle, slot, |filter| filter.set_param(param, value));
    }

    pub fn get_filter_parameter(&self, handle: Handle, slot: usize, param: usize) -> Option<f32> {
        let state = self.lock();
        let chain = if handle.is_none() {
            &state.master_filters
        } else {
            &state.query(handle)?.filters
        };
        chain.get(slot)?.as_ref()?.get_param(param)
    }

    pub fn fade_filter_parameter(&self, handle: Handle, slot: usize, param: usize, to: f32, seconds: f64) {
        self.lock().with_filters(handle, slot, |filter| {
            filter.params_mut().fade(param, to, seconds);
        });
    }

    pub fn oscillate_filter_parameter(
        &self,
        handle: Handle,
        slot: usize,
        param: usize,
        from: f32,
        to: f32,
        period: f64,
    ) {
        self.lock().with_filters(handle, slot, |filter| {
            filter.params_mut().oscillate(param, from, to, period);
        });
    }

    // --- groups ------------------------------------------------------------

    /// New empty group, or [`Handle::NONE`] when the group table is full.
    pub fn create_voice_group(&self) -> Handle {
        self.lock().groups.create().unwrap_or(Handle::NONE)
    }

    /// Forget the group. Its members keep playing.
    pub fn destroy_voice_group(&self, group: Handle) {
        self.lock().groups.destroy(group);
    }

    /// Add a live voice to a live group. Members that expired meanwhile are
    /// dropped from the group.
    pub fn add_voice_to_group(&self, group: Handle, voice: Handle) {
        let mut state = self.lock();
        if state.live(voice).is_none() {
            return;
        }
        let EngineState { groups, voices, .. } = &mut *state;
        let is_live = |member: Handle| voices.voice(member).is_some_and(|v| !v.ended);
        groups.insert(group, voice, is_live);
    }

    pub fn is_voice_group(&self, group: Handle) -> bool {
        self.lock().groups.resolve(group).is_some()
    }

    /// True for a group with no live members (and for anything that is not
    /// a group).
    pub fn is_voice_group_empty(&self, group: Handle) -> bool {
        let state = self.lock();
        state
            .groups
            .members(group)
            .map_or(true, |members| members.iter().all(|&m| state.live(m).is_none()))
    }

    // --- buses -------------------------------------------------------------

    /// Move a playing voice under a playing bus.
    pub fn route_to_bus(&self, voice: Handle, bus: Handle) -> Result<(), EngineError> {
        let mut state = self.lock();
        let voice_index = state.live(voice).ok_or(EngineError::InvalidHandle(voice))?;
        let bus_index = state
            .live(bus)
            .filter(|&index| state.voices.get(index).is_some_and(|v| v.is_bus))
            .ok_or(EngineError::NotABus(bus))?;

        if state.would_cycle(voice_index, bus_index) {
            tracing::warn!(?voice, ?bus, "bus routing rejected: cycle");
            return Err(EngineError::BusCycle { voice, bus });
        }

        if let Some(entry) = state.voices.get_mut(voice_index) {
            entry.bus = bus;
            // The destination layout may differ; restart the gain ramp.
            entry.prev_gains = None;
        }
        state.topology_dirty = true;
        tracing::debug!(?voice, ?bus, "voice routed to bus");
        Ok(())
    }

    // --- 3D ----------------------------------------------------------------

    /// Recompute gain, pan and Doppler of every positioned voice from the
    /// current listener and source state.
    pub fn update_3d_audio(&self) {
        let mut state = self.lock();
        let world = state.world;
        for (_, voice) in state.voices.iter_mut() {
            if let Some(spatial) = voice.spatial.as_mut() {
                world.spatialize(spatial);
            }
        }
    }

    pub fn set_3d_listener_parameters(&self, position: Vec3, at: Vec3, up: Vec3, velocity: Vec3) {
        self.lock().world.listener = Listener {
            position,
            at,
            up,
            velocity,
        };
    }

    pub fn set_3d_listener_position(&self, position: Vec3) {
        self.lock().world.listener.position = position;
    }

    pub fn set_3d_listener_at(&self, at: Vec3) {
        self.lock().world.listener.at = at;
    }

    pub fn set_3d_listener_up(&self, up: Vec3) {
        self.lock().world.listener.up = up;
    }

    pub fn set_3d_listener_velocity(&self, velocity: Vec3) {
        self.lock().world.listener.velocity = velocity;
    }

    pub fn get_3d_listener(&self) -> Listener {
        self.lock().world.listener
    }

    /// Speed of sound in world units per second.
    pub fn set_3d_sound_speed(&self, speed: f32) -> Result<(), EngineError> {
        if speed.is_nan() || speed <= 0.0 {
            return Err(EngineError::InvalidConfig("sound speed must be positive"));
        }
        self.lock().world.sound_speed = speed;
        Ok(())
    }

    pub fn get_3d_sound_speed(&self) -> f32 {
        self.lock().world.sound_speed
    }

    /// Factor applied to every source-listener distance before attenuation.
    pub fn set_3d_distance_scale(&self, scale: f32) {
        self.lock().world.distance_scale = scale.max(0.0);
    }

    pub fn set_3d_source_parameters(&self, handle: Handle, position: Vec3, velocity: Vec3) {
        self.lock().with_spatial(handle, |spatial| {
            spatial.position = position;
            spatial.velocity = velocity;
        });
    }

    pub fn set_3d_source_position(&self, handle: Handle, position: Vec3) {
        self.lock()
            .with_spatial(handle, |spatial| spatial.position = position);
    }

    pub fn set_3d_source_velocity(&self, handle: Handle, velocity: Vec3) {
        self.lock()
            .with_spatial(handle, |spatial| spatial.velocity = velocity);
    }

    pub fn set_3d_source_min_max_distance(&self, handle: Handle, min: f32, max: f32) {
        self.lock().with_spatial(handle, |spatial| {
            spatial.min_distance = min.max(0.0);
            spatial.max_distance = max.max(spatial.min_distance);
        });
    }

    pub fn set_3d_source_attenuation(&self, handle: Handle, model: Attenuation, rolloff: f32) {
        self.lock().with_spatial(handle, |spatial| {
            spatial.attenuation = model;
            spatial.rolloff = rolloff;
        });
    }

    pub fn set_3d_source_doppler_factor(&self, handle: Handle, factor: f32) {
        self.lock()
            .with_spatial(handle, |spatial| spatial.doppler_factor = factor.max(0.0));
    }

    /// A listener-relative source keeps its offset as the listener moves.
    pub fn set_3d_source_listener_relative(&self, handle: Handle, relative: bool) {
        self.lock()
            .with_spatial(handle, |spatial| spatial.listener_relative = relative);
    }

    // --- visualization -----------------------------------------------------

    pub fn set_visualization_enable(&self, enable: bool) {
        self.lock().capture.enabled = enable;
    }

    /// First samples of the last mixed chunk, channels averaged.
    pub fn get_wave(&self) -> [f32; WAVE_SIZE] {
        self.lock().capture.wave
    }

    /// Magnitude spectrum of [`Engine::get_wave`].
    pub fn calc_fft(&self) -> [f32; FFT_BINS] {
        let wave = self.get_wave();
        self.spectrum.lock().analyze(&wave)
    }

    /// Peak level of `channel` in the last mixed chunk.
    pub fn get_approximate_volume(&self, channel: usize) -> f32 {
        if channel >= MAX_CHANNELS {
            return 0.0;
        }
        self.lock().capture.volume[channel]
    }

    /// Source failures recorded by the mixer since the last call.
    pub fn take_source_errors(&self) -> Vec<(Handle, SourceError)> {
        let mut state = self.lock();
        let errors = state.source_errors.clone();
        state.source_errors.clear();
        errors
    }
}

impl EngineState {
    fn with_filters(&mut self, handle: Handle, slot: usize, mut apply: impl FnMut(&mut dyn FilterInstance)) {
        if handle.is_none() {
            if let Some(Some(filter)) = self.master_filters.get_mut(slot) {
                apply(filter.as_mut());
            }
            return;
        }
        self.for_each_voice(handle, |voice| {
            if let Some(Some(filter)) = voice.filters.get_mut(slot) {
                apply(filter.as_mut());
            }
        });
    }

    fn with_spatial(&mut self, handle: Handle, mut apply: impl FnMut(&mut Spatial)) {
        self.for_each_voice(handle, |voice| {
            if let Some(spatial) = voice.spatial.as_mut() {
                apply(spatial);
            }
        });
    }

    /// Paused itself or under a paused bus. Walks live bus handles so it is
    /// correct between topology rebuilds.
    fn paused_chain(&self, index: usize) -> bool {
        let mut cursor = Some(index);
        let mut steps = 0;
        while let Some(current) = cursor {
            let Some(voice) = self.voices.get(current) else {
                return false;
            };
            if voice.paused {
                return true;
            }
            steps += 1;
            if steps > self.voices.capacity() {
                return false;
            }
            cursor = self.voices.resolve(voice.bus);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::Bus, engine::config::EngineConfig, source::Tone};

    fn engine() -> Engine {
        Engine::new(EngineConfig::new().max_voices(8)).unwrap()
    }

    #[test]
    fn group_getters_return_defaults() {
        let engine = engine();
        let group = engine.create_voice_group();
        let voice = engine.play(&Tone::sine(440.0));
        engine.add_voice_to_group(group, voice);
        engine.set_pan(group, 0.5);

        assert_eq!(engine.get_pan(voice), 0.5);
        assert_eq!(engine.get_pan(group), 0.0);
        assert!(!engine.get_pause(group));
    }

    #[test]
    fn adding_dead_voice_is_ignored() {
        let engine = engine();
        let group = engine.create_voice_group();
        let voice = engine.play(&Tone::sine(440.0));
        engine.stop(voice);
        engine.add_voice_to_group(group, voice);

        let state = engine.lock();
        assert_eq!(state.groups.members(group).map(<[Handle]>::len), Some(0));
    }

    #[test]
    fn paused_bus_pauses_chain() {
        let engine = engine();
        let bus = Bus::new();
        let bus_handle = engine.play(&bus);
        let child = bus.play(&engine, &Tone::sine(220.0));
        assert_eq!(engine.active_voice_count(), 2);

        engine.set_pause(bus_handle, true);
        assert_eq!(engine.active_voice_count(), 0);
        assert!(!engine.get_pause(child));
    }

    #[test]
    fn setter_cancels_running_fade() {
        let engine = engine();
        let voice = engine.play(&Tone::sine(440.0));
        engine.fade_pan(voice, 1.0, 1.0);
        engine.set_pan(voice, -0.25);

        let state = engine.lock();
        let index = state.live(voice).unwrap();
        assert!(!state.voices.get(index).unwrap().faders.pan.is_active());
    }
}
