//! Default output device through cpal.

use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Stream,
};

use crate::{
    backend::BackendId,
    engine::{config::EngineConfig, Engine, EngineError},
    MAX_BLOCK_SIZE, MAX_CHANNELS,
};

/// Keeps the output stream alive. Dropping the driver stops the callback;
/// the engine itself stays usable.
pub struct CpalDriver {
    stream: Stream,
}

impl CpalDriver {
    /// Open the default output device and start mixing into it.
    ///
    /// The device's own sample rate and channel count (capped at stereo)
    /// override the ones in `config`.
    pub fn open(config: EngineConfig) -> Result<(Arc<Engine>, CpalDriver), EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Backend("no output device available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::Backend(format!("failed to fetch default output config: {e}")))?;

        let device_channels = supported.channels() as usize;
        let sample_rate = supported.sample_rate().0 as f32;
        let channels = device_channels.min(MAX_CHANNELS);
        let engine = Arc::new(Engine::init(
            config.sample_rate(sample_rate).channels(channels),
            BackendId::Cpal,
        )?);

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            device_channels,
            "opening output stream"
        );

        let mix_engine = Arc::clone(&engine);
        let mut mixed = vec![0.0f32; MAX_BLOCK_SIZE * MAX_CHANNELS];
        let stream = device
            .build_output_stream(
                &supported.into(),
                move |data: &mut [f32], _| {
                    if device_channels == channels {
                        let frames = data.len() / channels;
                        mix_engine.mix(data, frames);
                        return;
                    }

                    // Devices with more than two channels get the mix on the
                    // first pair and silence elsewhere.
                    for block in data.chunks_mut(MAX_BLOCK_SIZE * device_channels) {
                        let frames = block.len() / device_channels;
                        mix_engine.mix(&mut mixed, frames);
                        for (frame, source) in block
                            .chunks_exact_mut(device_channels)
                            .zip(mixed.chunks_exact(channels))
                        {
                            frame[..channels].copy_from_slice(source);
                            frame[channels..].fill(0.0);
                        }
                    }
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| EngineError::Backend(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| EngineError::Backend(format!("failed to start output stream: {e}")))?;

        Ok((engine, CpalDriver { stream }))
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.stream
            .pause()
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.stream
            .play()
            .map_err(|e| EngineError::Backend(e.to_string()))
    }
}
