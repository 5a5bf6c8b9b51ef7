//! Cross-process coordination primitives for the shared-browser gateway.
//!
//! Every agent process that shares one browser profile coordinates through a
//! small set of JSON files in a common directory, namespaced by a stable
//! profile key. This crate owns those files: the advisory sentinel mutex, the
//! TTL-leased action lock, the window ownership registry and the debug-port
//! rendezvous cache. All writes are atomic (temp file + rename) and all reads
//! treat missing or unparseable files as absent.
//!
//! Everything here is synchronous; callers running on an async runtime are
//! expected to hop through `spawn_blocking` because acquisition paths sleep
//! while polling.

pub mod errors;
pub mod fsx;
pub mod mutex;
pub mod paths;
pub mod probe;
pub mod profile;
pub mod registry;
pub mod rendezvous;
pub mod softlock;

pub use errors::CoordError;
pub use mutex::{FileMutex, FileMutexGuard};
pub use paths::CoordPaths;
pub use probe::{ProcessProbe, SystemProcessProbe};
pub use profile::ProfileKey;
pub use registry::{WindowEntry, WindowRegistry};
pub use rendezvous::{Rendezvous, RendezvousFile};
pub use softlock::{AcquireOutcome, ActionLock, Lease};
