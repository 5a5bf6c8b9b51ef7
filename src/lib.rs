//! browser-warden: a gateway that lets many agent processes share one
//! developer-mode browser.
//!
//! Each agent process gets an isolated window inside the shared browser;
//! cross-process coordination (action lock, window registry, startup
//! election, rendezvous) guarantees that only one agent drives the DevTools
//! protocol at a time. Tool handlers are thin wrappers running under the
//! exclusive-access protocol in [`exclusive`].

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod exclusive;
pub mod keys;
pub mod process;
pub mod reply;
pub mod selectors;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod startup;
pub mod tools;
pub mod window;

pub use config::GatewayConfig;
pub use errors::GatewayError;
pub use session::{SessionContext, SessionState};
