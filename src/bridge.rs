//! The socket side of a render request.
//!
//! A `BridgeChannel` owns the listener and the single accepted connection of
//! one render request and walks through
//! `Idle -> Listening -> Connected -> Sending -> AwaitingResponse -> Decoded -> Closed`,
//! dropping into `Error` (and then `Closed`) as soon as any step fails.
//! Channels are never reused: every request binds, accepts and closes its own
//! sockets.
//!
//! Every blocking step wakes up at the configured poll interval to check the
//! channel's `CancelToken` and its timeout, so a renderer that never connects or
//! never closes its connection cannot hang the host.
mod task;

pub use task::*;

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    codec::{decode_pixels, CodecError, PixelBuffer},
    config::BridgeConfig,
    platform::Stopwatch,
    snapshot::Resolution,
};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Shared flag used to abort a render request from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Listening,
    Connected,
    Sending,
    AwaitingResponse,
    Decoded,
    Error,
    Closed,
}

/// Timing limits of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelTimeouts {
    pub accept: Duration,
    /// Limit for delivering the snapshot and again for receiving the image.
    pub response: Duration,
    pub poll_interval: Duration,
}

impl From<&BridgeConfig> for ChannelTimeouts {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            accept: config.accept_timeout(),
            response: config.response_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for ChannelTimeouts {
    fn default() -> Self {
        ChannelTimeouts::from(&BridgeConfig::default())
    }
}

#[derive(Debug)]
pub struct BridgeChannel {
    state: ChannelState,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    timeouts: ChannelTimeouts,
    cancel: CancelToken,
}

impl BridgeChannel {
    /// Bind a listener to `addr` for a single render request.
    ///
    /// Binding fails immediately if the address is still held by anything
    /// else, including the sockets of an earlier request the OS has not yet
    /// released. There is no retry.
    pub fn bind(addr: SocketAddr, timeouts: ChannelTimeouts) -> Result<Self, ChannelError> {
        let mut state = ChannelState::Idle;
        debug!("channel state {state:?}");

        let listener =
            TcpListener::bind(addr).map_err(|source| ChannelError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ChannelError::Accept)?;

        // Accepting polls so cancellation and the accept timeout are noticed.
        listener
            .set_nonblocking(true)
            .map_err(ChannelError::Accept)?;

        state = ChannelState::Listening;
        info!("listening for external renderer on {local_addr}");

        Ok(Self {
            state,
            local_addr,
            listener: Some(listener),
            stream: None,
            timeouts,
            cancel: CancelToken::new(),
        })
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The address the listener is bound to. Useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A token that aborts this channel at its next blocking point.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full request: accept the renderer, send `frame`, receive the
    /// image and decode it. The channel is closed when this returns, whether
    /// it succeeded or not.
    #[tracing::instrument(level = "info", skip_all, fields(addr = %self.local_addr, %resolution))]
    pub fn exchange(
        mut self,
        frame: &[u8],
        resolution: Resolution,
    ) -> Result<PixelBuffer, ChannelError> {
        let result = self.run_exchange(frame, resolution);

        if let Err(e) = &result {
            warn!("render request failed: {e}");
        }

        self.close();
        result
    }

    fn run_exchange(
        &mut self,
        frame: &[u8],
        resolution: Resolution,
    ) -> Result<PixelBuffer, ChannelError> {
        self.accept()?;
        self.send(frame)?;
        let response = self.receive()?;
        self.decode(&response, resolution)
    }

    /// Wait for the external renderer to connect. Only one connection is ever
    /// accepted; the listener is closed right after so later attempts are
    /// refused rather than served.
    pub fn accept(&mut self) -> Result<SocketAddr, ChannelError> {
        self.expect_state(ChannelState::Listening)?;

        let result = self.accept_one();
        let (stream, peer) = self.check(result)?;

        self.listener = None;
        self.stream = Some(stream);
        self.transition(ChannelState::Connected);
        info!("external renderer connected from {peer}");

        Ok(peer)
    }

    fn accept_one(&self) -> Result<(TcpStream, SocketAddr), ChannelError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or(ChannelError::InvalidState(self.state))?;
        let started = Stopwatch::start();

        loop {
            self.check_cancelled()?;

            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false).map_err(ChannelError::Accept)?;
                    return Ok((stream, peer));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if started.remaining(self.timeouts.accept).is_none() {
                        return Err(ChannelError::AcceptTimeout(self.timeouts.accept));
                    }
                    std::thread::sleep(self.timeouts.poll_interval);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ChannelError::Accept(e)),
            }
        }
    }

    /// Write the outbound frame. A short write or a connection error fails the
    /// request; nothing partially sent counts as delivered.
    pub fn send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.expect_state(ChannelState::Connected)?;
        self.transition(ChannelState::Sending);

        let result = self.write_frame(frame);
        self.check(result)?;

        debug!("sent {} byte frame", frame.len());
        self.transition(ChannelState::AwaitingResponse);
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let timeouts = self.timeouts;
        let cancel = self.cancel.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or(ChannelError::InvalidState(ChannelState::Sending))?;

        stream
            .set_write_timeout(Some(timeouts.poll_interval))
            .map_err(ChannelError::Send)?;

        let started = Stopwatch::start();
        let mut written = 0;

        while written < frame.len() {
            if cancel.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }

            match stream.write(&frame[written..]) {
                Ok(0) => {
                    return Err(ChannelError::Send(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "renderer stopped accepting data",
                    )))
                }
                Ok(n) => written += n,
                Err(e) if is_poll_timeout(&e) => {
                    if started.remaining(timeouts.response).is_none() {
                        return Err(ChannelError::SendTimeout(timeouts.response));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ChannelError::Send(e)),
            }
        }

        stream.flush().map_err(ChannelError::Send)
    }

    /// Read the renderer's response until it closes its side of the
    /// connection. The response has no length prefix; closing the connection
    /// is the only end of message marker.
    pub fn receive(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.expect_state(ChannelState::AwaitingResponse)?;

        let result = self.read_to_close();
        let response = self.check(result)?;

        info!("received {} bytes from external renderer", response.len());
        Ok(response)
    }

    fn read_to_close(&mut self) -> Result<Vec<u8>, ChannelError> {
        let timeouts = self.timeouts;
        let cancel = self.cancel.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or(ChannelError::InvalidState(ChannelState::AwaitingResponse))?;

        stream
            .set_read_timeout(Some(timeouts.poll_interval))
            .map_err(ChannelError::Receive)?;

        let started = Stopwatch::start();
        let mut response = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            if cancel.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }

            match stream.read(&mut chunk) {
                Ok(0) => return Ok(response),
                Ok(n) => response.extend_from_slice(&chunk[..n]),
                Err(e) if is_poll_timeout(&e) => {
                    if started.remaining(timeouts.response).is_none() {
                        return Err(ChannelError::ResponseTimeout(timeouts.response));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ChannelError::Receive(e)),
            }
        }
    }

    /// Decode the received response into an image of `resolution`.
    pub fn decode(
        &mut self,
        response: &[u8],
        resolution: Resolution,
    ) -> Result<PixelBuffer, ChannelError> {
        self.expect_state(ChannelState::AwaitingResponse)?;

        let result = decode_pixels(response, resolution).map_err(ChannelError::from);
        let pixels = self.check(result)?;

        self.transition(ChannelState::Decoded);
        Ok(pixels)
    }

    /// Close the connection and listener. Safe to call in any state.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        self.listener = None;

        if self.state != ChannelState::Closed {
            self.transition(ChannelState::Closed);
        }
    }

    fn check_cancelled(&self) -> Result<(), ChannelError> {
        if self.cancel.is_cancelled() {
            Err(ChannelError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn expect_state(&self, expected: ChannelState) -> Result<(), ChannelError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ChannelError::InvalidState(self.state))
        }
    }

    /// Move into the error state when `result` failed.
    fn check<T>(&mut self, result: Result<T, ChannelError>) -> Result<T, ChannelError> {
        if result.is_err() {
            self.transition(ChannelState::Error);
        }
        result
    }

    fn transition(&mut self, next: ChannelState) {
        debug!("channel state {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

impl Drop for BridgeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Socket timeouts are reported as `WouldBlock` on unix and `TimedOut` on
/// windows.
fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to bind bridge listener to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept external renderer connection: {0}")]
    Accept(#[source] io::Error),
    #[error("external renderer did not connect within {0:?}")]
    AcceptTimeout(Duration),
    #[error("failed to send scene snapshot: {0}")]
    Send(#[source] io::Error),
    #[error("external renderer did not accept the scene snapshot within {0:?}")]
    SendTimeout(Duration),
    #[error("failed to receive rendered image: {0}")]
    Receive(#[source] io::Error),
    #[error("external renderer did not finish sending its image within {0:?}")]
    ResponseTimeout(Duration),
    #[error(transparent)]
    Decode(#[from] CodecError),
    #[error("render request was cancelled")]
    Cancelled,
    #[error("operation is not valid while the channel is {0:?}")]
    InvalidState(ChannelState),
    #[error("failed to start bridge worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("bridge worker thread panicked")]
    WorkerPanicked,
}

impl ChannelError {
    /// Returns `true` if binding failed because the address is taken.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, ChannelError::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}
