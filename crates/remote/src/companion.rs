use std::{
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tandem_core::{ChannelError, InterfaceKind};

use crate::{
    error::RemoteError,
    proxy::{PipeRemote, RemoteFmu},
};

/// How long a companion gets to exit after its channel closes.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// A companion process hosting one component.
///
/// Owned by the [`PipeRemote`] that talks to it. When the proxy is dropped
/// the companion is asked to shut down, given a short grace period, and
/// killed if it is still running.
#[derive(Debug)]
pub struct Companion {
    program: PathBuf,
    child: Child,
}

impl Companion {
    /// Starts `program` to host the component in `library` and connects to
    /// it over the child's stdin and stdout.
    ///
    /// The companion's stderr is inherited so its log output stays visible.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the process cannot be started, and
    /// [`RemoteError::Rejected`] if it cannot load the library.
    pub fn spawn(
        program: impl AsRef<Path>,
        library: impl AsRef<Path>,
        kind: InterfaceKind,
    ) -> Result<PipeRemote, RemoteError> {
        let program = program.as_ref().to_path_buf();
        let kind = match kind {
            InterfaceKind::CoSimulation => "co-simulation",
            InterfaceKind::ModelExchange => "model-exchange",
        };

        let mut child = Command::new(&program)
            .arg(library.as_ref())
            .arg("--kind")
            .arg(kind)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RemoteError::Spawn {
                program: program.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ChannelError::Closed.into());
        };
        tracing::debug!(program = %program.display(), pid = child.id(), "companion started");

        let companion = Self { program, child };
        RemoteFmu::new(BufReader::new(stdout), BufWriter::new(stdin))
            .with_process(companion)
            .handshake()
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for Companion {
    fn drop(&mut self) {
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(program = %self.program.display(), %status, "companion exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(program = %self.program.display(), error = %err, "failed to poll companion");
                    break;
                }
            }
        }

        tracing::warn!(program = %self.program.display(), "companion did not exit, killing it");
        if let Err(err) = self.child.kill() {
            tracing::warn!(program = %self.program.display(), error = %err, "failed to kill companion");
        }
        if let Err(err) = self.child.wait() {
            tracing::warn!(program = %self.program.display(), error = %err, "failed to reap companion");
        }
    }
}
