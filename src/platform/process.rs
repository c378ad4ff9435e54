use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread::JoinHandle,
};

use thiserror::Error;
use tracing::{debug, info, warn};

/// An external renderer executable launched for a single render request.
///
/// The renderer's stdout and stderr are captured and drained in the background
/// so a chatty renderer can never block on a full pipe. Their content is only
/// logged at trace level. A renderer still running when this value is dropped
/// is killed.
pub struct RendererProcess {
    executable: PathBuf,
    child: Child,
    drains: Vec<JoinHandle<()>>,
}

impl RendererProcess {
    /// Launch `executable` with `args`.
    pub fn spawn<P, S>(executable: P, args: &[S]) -> Result<Self, ProcessError>
    where
        P: AsRef<Path>,
        S: AsRef<std::ffi::OsStr>,
    {
        let executable = executable.as_ref().to_path_buf();
        info!("launching external renderer {executable:?}");

        let mut child = Command::new(&executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                executable: executable.clone(),
                source,
            })?;

        let mut drains = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            drains.push(drain("stdout", stdout));
        }

        if let Some(stderr) = child.stderr.take() {
            drains.push(drain("stderr", stderr));
        }

        Ok(Self {
            executable,
            child,
            drains,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Returns the exit status if the renderer has exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        self.child.try_wait().map_err(ProcessError::Wait)
    }

    /// Block until the renderer exits.
    pub fn wait(mut self) -> Result<ExitStatus, ProcessError> {
        let status = self.child.wait().map_err(ProcessError::Wait)?;
        self.join_drains();
        Ok(status)
    }

    fn join_drains(&mut self) {
        for drain in self.drains.drain(..) {
            let _ = drain.join();
        }
    }
}

impl Drop for RendererProcess {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!("renderer {:?} exited with {status}", self.executable),
            Ok(None) => {
                warn!("renderer {:?} is still running, killing it", self.executable);
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
            Err(e) => warn!("failed to query renderer {:?}: {e}", self.executable),
        }

        // Drain threads are detached here. Grandchildren of the renderer may
        // still hold the pipes open and joining would block until they exit.
    }
}

fn drain<R>(stream_name: &'static str, mut stream: R) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => tracing::trace!(
                    "renderer {stream_name}: {}",
                    String::from_utf8_lossy(&buffer[..n])
                ),
            }
        }
    })
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch renderer {executable:?}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for renderer: {0}")]
    Wait(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_fails_to_spawn() {
        let result = RendererProcess::spawn("/definitely/not/a/renderer", &[] as &[&str]);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn output_is_captured_and_process_waited() {
        let process =
            RendererProcess::spawn("/bin/sh", &["-c", "echo rendering; echo oops >&2"]).unwrap();
        assert!(process.id() > 0);
        assert!(process.wait().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn running_process_is_killed_on_drop() {
        let mut process = RendererProcess::spawn("/bin/sh", &["-c", "exec sleep 30"]).unwrap();
        assert!(process.try_wait().unwrap().is_none());
        drop(process);
    }
}
