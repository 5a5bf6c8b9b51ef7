//! DevTools driver layer for the shared-browser gateway.
//!
//! The gateway core treats the browser driver as an opaque port: a handle
//! that can send raw DevTools protocol commands at either browser or page
//! session scope. This crate provides that port (`DriverOps`), a real
//! implementation speaking CDP over the browser's websocket, endpoint
//! discovery helpers (`/json/version`, `DevToolsActivePort`, TCP probes)
//! and typed wrappers for the handful of Target/Browser/Page/Network/Input
//! commands the gateway issues.

pub mod binary;
pub mod driver;
pub mod endpoint;
pub mod errors;
pub mod ops;
pub mod transport;

pub use driver::{CdpDriver, DriverOps, NoopDriver};
pub use endpoint::DebugEndpoint;
pub use errors::DriverError;
pub use transport::{CdpTransport, CommandScope};
