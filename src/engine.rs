use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    assembler::FrameAssembler,
    bridge::{BridgeChannel, ChannelError, ChannelTimeouts, RenderTask},
    codec::{encode_legacy_resolution, encode_snapshot_frame, CodecError},
    config::{BridgeConfig, ConfigError, Protocol},
    platform::{ProcessError, RendererProcess, Stopwatch},
    scene::Scene,
    snapshot::{InvalidResolution, SnapshotBuilder},
};

/// Renders host scenes with the external renderer, one request at a time.
#[derive(Clone, Debug, Default)]
pub struct RenderEngine {
    config: BridgeConfig,
}

impl RenderEngine {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn snapshot_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder::new()
            .with_topology(self.config.topology)
            .with_proxy_light_marker(self.config.proxy_light_marker.clone())
    }

    /// Render `scene` and hand the image to `output`.
    ///
    /// Blocks until the external renderer returned its image or the request
    /// failed. `test_break` is polled while waiting; returning `true` aborts
    /// the request with `ChannelError::Cancelled`. On failure nothing is
    /// written to `output`.
    #[tracing::instrument(level = "info", skip_all)]
    pub fn render<F>(
        &self,
        scene: &Scene,
        output: &mut dyn FrameAssembler,
        mut test_break: F,
    ) -> Result<(), RenderError>
    where
        F: FnMut() -> bool,
    {
        let started = Stopwatch::start();
        self.config.validate()?;

        if test_break() {
            return Err(ChannelError::Cancelled.into());
        }

        // Capture the scene and build the outbound message.
        let snapshot = self.snapshot_builder().build(scene)?;
        let resolution = snapshot.resolution;

        let frame = match self.config.protocol {
            Protocol::Json => encode_snapshot_frame(&snapshot)?,
            Protocol::LegacyResolution => encode_legacy_resolution(resolution),
        };

        let snapshot_time = started.elapsed();
        debug!(
            "built {} byte {:?} message for {resolution} in {snapshot_time:?}",
            frame.len(),
            self.config.protocol
        );

        // The listener has to exist before the renderer starts or its first
        // connection attempt may be refused.
        let channel = BridgeChannel::bind(
            self.config.socket_addr()?,
            ChannelTimeouts::from(&self.config),
        )?;

        let mut renderer = match &self.config.renderer_executable {
            Some(executable) => {
                let process =
                    RendererProcess::spawn(executable, self.config.renderer_args.as_slice())?;
                info!("external renderer running as process {}", process.id());
                Some(process)
            }
            None => {
                info!(
                    "waiting for an external renderer to connect to {}",
                    channel.local_addr()
                );
                None
            }
        };

        let task = RenderTask::spawn(channel, frame, resolution, self.config.poll_interval())?;
        let pixels = task.wait(&mut test_break)?;

        let exchange_time = started.elapsed() - snapshot_time;

        // Copy the finished image into the host's result.
        output.assemble(&pixels);

        if let Some(renderer) = renderer.as_mut() {
            match renderer.try_wait() {
                Ok(Some(status)) => debug!("external renderer exited with {status}"),
                Ok(None) => debug!("external renderer is still running after sending its image"),
                Err(e) => warn!("{e}"),
            }
        }

        info!(
            "rendered {resolution} in {:?} (snapshot {snapshot_time:?}, exchange {exchange_time:?})",
            started.elapsed()
        );

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Resolution(#[from] InvalidResolution),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RenderError {
    /// Returns `true` if the request was aborted by the host.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Channel(ChannelError::Cancelled))
    }
}
