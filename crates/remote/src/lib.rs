//! Runs a component in a companion process behind the same call surface.
//!
//! [`RemoteFmu`] implements [`FmiCalls`](tandem_core::FmiCalls) by sending
//! each call as a request frame and blocking for the reply, so lifecycle
//! rules, drivers, and coupling work unchanged whether a component runs in
//! process or not. The companion side is [`serve`], normally hosting a
//! [`NativeFmu`](tandem_native::NativeFmu) inside the `tandem-companion`
//! binary started by [`Companion::spawn`].
//!
//! The channel carries one call at a time and is never shared between
//! instances.

pub mod codec;
mod companion;
mod error;
mod function;
mod proxy;
mod server;


pub use codec::{MAX_PAYLOAD, ProtocolError};
pub use companion::Companion;
pub use error::RemoteError;
pub use function::{CallbackKind, Function};
pub use proxy::{PipeRemote, RemoteFmu, TcpRemote};
pub use server::{host, serve};
