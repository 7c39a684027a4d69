use std::{io, path::PathBuf};

use tandem_core::ChannelError;
use thiserror::Error;

/// Errors raised while starting or connecting to a companion.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to start companion `{program}`")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to the companion")]
    Connect(#[source] io::Error),

    #[error("companion could not load its component: {reason}")]
    Rejected { reason: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
