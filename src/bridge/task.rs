use std::{thread::JoinHandle, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info};

use super::{BridgeChannel, CancelToken, ChannelError};
use crate::{codec::PixelBuffer, snapshot::Resolution};

/// A render request running on its own worker thread.
///
/// The host stays responsive while the worker blocks on the socket: `wait`
/// polls the host's break callback and cancels the channel when it fires.
pub struct RenderTask {
    thread: Option<JoinHandle<()>>,
    result_rx: Receiver<Result<PixelBuffer, ChannelError>>,
    cancel: CancelToken,
    poll_interval: Duration,
}

impl RenderTask {
    /// Move `channel` onto a worker thread and run the full exchange there.
    pub fn spawn(
        channel: BridgeChannel,
        frame: Vec<u8>,
        resolution: Resolution,
        poll_interval: Duration,
    ) -> Result<Self, ChannelError> {
        let cancel = channel.cancel_token();
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);

        let thread = std::thread::Builder::new()
            .name("erpt-bridge".to_string())
            .spawn(move || {
                let result = channel.exchange(&frame, resolution);
                // The receiver is gone only if the task was dropped, nobody
                // is interested in the result anymore.
                let _ = result_tx.send(result);
            })
            .map_err(ChannelError::Spawn)?;

        Ok(Self {
            thread: Some(thread),
            result_rx,
            cancel,
            poll_interval,
        })
    }

    /// Ask the worker to abort at its next blocking point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once `cancel` was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block until the worker finishes, calling `test_break` every poll
    /// interval. Once `test_break` returns `true` the request is cancelled and
    /// this returns `ChannelError::Cancelled` as soon as the worker noticed.
    pub fn wait<F>(mut self, mut test_break: F) -> Result<PixelBuffer, ChannelError>
    where
        F: FnMut() -> bool,
    {
        loop {
            match self.result_rx.recv_timeout(self.poll_interval) {
                Ok(result) => {
                    self.join();
                    return result;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !self.is_cancelled() && test_break() {
                        info!("render cancelled by host");
                        self.cancel();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.join();
                    return Err(ChannelError::WorkerPanicked);
                }
            }
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("bridge worker thread panicked");
            }
        }
    }
}

impl Drop for RenderTask {
    fn drop(&mut self) {
        // An abandoned task must not leave its worker blocked on the socket.
        if self.thread.is_some() {
            self.cancel();
            self.join();
        }
    }
}
