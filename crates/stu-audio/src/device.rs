//! Audio device output
//!
//! cpal provides the cross-platform device callback. When no device exists
//! (headless engine, CI) a null driver thread pulls blocks at block-cadence
//! so the transport keeps advancing and meters keep flowing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::render::Renderer;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no output device available")]
    NoDevice,

    #[error("no output device matching '{0}'")]
    DeviceNotFound(String),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Requested output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub device_name: Option<String>,
    pub sample_rate: u32,
    pub block_size: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            sample_rate: 48_000,
            block_size: 256,
        }
    }
}

/// A running output; dropping it stops the audio
pub struct RunningOutput {
    stream: Option<cpal::Stream>,
    null_driver: Option<NullDriver>,
    pub backend: &'static str,
}

impl RunningOutput {
    pub fn stop(mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        if let Some(null_driver) = self.null_driver.take() {
            null_driver.stop();
        }
    }
}

struct NullDriver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl NullDriver {
    fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NullDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolve the requested (or default) cpal output device
fn resolve_output_device(config: &OutputConfig) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    match &config.device_name {
        Some(search) => {
            let search_lower = search.to_lowercase();
            let devices = host
                .output_devices()
                .map_err(|e| DeviceError::Stream(e.to_string()))?;
            for candidate in devices {
                if let Ok(name) = candidate.name() {
                    if name.to_lowercase().contains(&search_lower) {
                        return Ok(candidate);
                    }
                }
            }
            Err(DeviceError::DeviceNotFound(search.clone()))
        }
        None => host.default_output_device().ok_or(DeviceError::NoDevice),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &OutputConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, DeviceError> {
    let stream_config = cpal::StreamConfig {
        channels: 2,
        sample_rate: config.sample_rate,
        buffer_size: cpal::BufferSize::Fixed(config.block_size),
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                renderer.render(data);
            },
            move |err| {
                tracing::error!(error = %err, "output stream error");
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;

    stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok(stream)
}

/// Start the null driver: renders into a discard buffer at block-cadence
pub fn start_null_output(config: &OutputConfig, mut renderer: Renderer) -> RunningOutput {
    let running = Arc::new(AtomicBool::new(true));
    let thread_running = running.clone();
    let block_frames = config.block_size as usize;
    let block_duration =
        Duration::from_secs_f64(f64::from(config.block_size) / f64::from(config.sample_rate));

    let handle = std::thread::Builder::new()
        .name("stu-null-audio".to_string())
        .spawn(move || {
            let mut scratch = vec![0.0f32; block_frames * 2];
            let mut deadline = Instant::now();
            while thread_running.load(Ordering::Acquire) {
                renderer.render(&mut scratch);
                deadline += block_duration;
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
                // When behind, render immediately until caught up so the
                // transport tracks wall clock.
            }
        })
        .expect("failed to spawn null audio thread");

    tracing::info!(
        sample_rate = config.sample_rate,
        block_size = config.block_size,
        "null audio driver started"
    );

    RunningOutput {
        stream: None,
        null_driver: Some(NullDriver {
            running,
            handle: Some(handle),
        }),
        backend: "null",
    }
}

/// Start a device output, falling back to the null driver when no device
/// can be resolved. Stream construction failures after a device was found
/// are surfaced as errors.
pub fn start_output(
    config: &OutputConfig,
    renderer: Renderer,
    allow_fallback: bool,
) -> Result<RunningOutput, DeviceError> {
    match resolve_output_device(config) {
        Ok(device) => {
            let stream = build_stream(&device, config, renderer)?;
            tracing::info!(
                sample_rate = config.sample_rate,
                block_size = config.block_size,
                "cpal output stream started"
            );
            Ok(RunningOutput {
                stream: Some(stream),
                null_driver: None,
                backend: "cpal",
            })
        }
        Err(e) if allow_fallback => {
            tracing::warn!(error = %e, "audio device unavailable, using null driver");
            Ok(start_null_output(config, renderer))
        }
        Err(e) => Err(e),
    }
}
