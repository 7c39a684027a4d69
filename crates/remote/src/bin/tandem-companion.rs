//! Hosts one component library for a proxy in another process.
//!
//! Serves over stdin and stdout by default, or over a single TCP connection
//! with `--listen`. Logs go to stderr because stdout is the channel.

use std::{
    io::{self, BufReader, BufWriter},
    net::TcpListener,
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use tandem_core::InterfaceKind;
use tandem_native::{LibraryRegistry, NativeFmu};
use tandem_remote::{ProtocolError, host};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tandem-companion", version, about)]
struct Cli {
    /// Shared library of the component.
    #[arg(value_name = "LIBRARY")]
    library: PathBuf,

    /// Interface to load.
    #[arg(long, value_enum, default_value = "co-simulation")]
    kind: Kind,

    /// Serve one TCP connection on this address instead of stdin/stdout.
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    CoSimulation,
    ModelExchange,
}

impl From<Kind> for InterfaceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::CoSimulation => Self::CoSimulation,
            Kind::ModelExchange => Self::ModelExchange,
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let component = NativeFmu::load(LibraryRegistry::global(), &cli.library, cli.kind.into())
        .map_err(|err| error_chain(&err));
    let loaded = component.is_ok();
    if loaded {
        tracing::info!(library = %cli.library.display(), kind = ?cli.kind, "component loaded");
    }

    let served = match &cli.listen {
        Some(addr) => serve_tcp(addr, component),
        None => host(component, BufReader::new(io::stdin()), BufWriter::new(io::stdout())),
    };

    match served {
        Ok(()) if loaded => ExitCode::SUCCESS,
        Ok(()) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %error_chain(&err), "channel failed");
            ExitCode::FAILURE
        }
    }
}

fn serve_tcp(addr: &str, component: Result<NativeFmu, String>) -> Result<(), ProtocolError> {
    let listener = TcpListener::bind(addr)?;
    tracing::info!(addr = %listener.local_addr()?, "waiting for a proxy");
    let (stream, peer) = listener.accept()?;
    tracing::info!(%peer, "proxy connected");
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    host(component, reader, BufWriter::new(stream))
}

/// Joins an error with its sources, outermost first.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
