//! Real-time playback of the bridge through the default output device
//!
//! The cpal callback is the fixed-cadence renderer: every callback pulls
//! exactly as many frames as the device asks for and duplicates the mono
//! bridge signal onto every output channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::bridge::AudioBridge;
use crate::error::AudioError;

/// Output stream rendering an [`AudioBridge`]
pub struct BridgePlayback {
    bridge: Arc<AudioBridge>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
    callbacks: Arc<AtomicU64>,
    config: StreamConfig,
}

impl BridgePlayback {
    /// Prepare playback on the default output device at `sample_rate`
    pub fn new(bridge: Arc<AudioBridge>, sample_rate: u32) -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default output".into()))?;
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            bridge,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
            callbacks: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Start rendering
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let bridge = self.bridge.clone();
        let callbacks = self.callbacks.clone();
        let config = self.config.clone();
        let channels = self.config.channels as usize;

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("bridge-playback".into())
            .spawn(move || {
                let device = match cpal::default_host().default_output_device() {
                    Some(device) => device,
                    None => {
                        tracing::error!("Output device disappeared before stream start");
                        return;
                    }
                };

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        callbacks.fetch_add(1, Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            frame.fill(bridge.pull_sample());
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start stream: {}", e);
                            return;
                        }
                        while running.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build stream: {}", e);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop rendering
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Number of render callbacks served so far
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Check for stream errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for BridgePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
