//! # slpd
//!
//! Service Location daemon: a single-threaded reactor serving the SLP
//! control protocol on a loopback port.
//!
//! ## Architecture
//!
//! ```text
//!      slp-client / RPC callers
//!               │  length-prefixed RpcMessage frames
//!         ┌─────▼──────┐
//!         │ RpcAcceptor │  loopback listener (borrowed descriptor)
//!         └─────┬──────┘
//!               │ one RpcConnection per peer (transferred descriptor)
//!         ┌─────▼──────┐
//!         │ RpcChannel  │  decode → dispatch → RpcCompletion
//!         └─────┬──────┘
//!         ┌─────▼────────┐
//!         │ SlpServiceImpl│ façade over the engine
//!         └─────┬────────┘
//!         ┌─────▼──────────┐
//!         │ DiscoveryEngine │ (SlpServer: in-memory registry)
//!         └────────────────┘
//! ```
//!
//! [`SlpDaemon`] owns all of it together with the [`slpd_io::Reactor`],
//! the debug console and the optional HTTP diagnostics.

pub mod acceptor;
pub mod channel;
pub mod client;
pub mod console;
pub mod daemon;
pub mod error;
pub mod http;
pub mod logging;
pub mod service;

pub use acceptor::RpcAcceptor;
pub use channel::{RpcChannel, RpcCompletion, RpcConnection};
pub use client::{ClientError, SlpClient};
pub use console::{ConsoleCommand, ConsoleReader};
pub use daemon::SlpDaemon;
pub use error::{AcceptorError, DaemonError, Result};
pub use service::{SlpService, SlpServiceImpl};
