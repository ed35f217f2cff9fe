//! Failure-scope lifecycle management
//!
//! A failure scope identifies one recoverable unit of work (this server,
//! or a peer whose logs this instance has adopted). The registry tracks
//! which scopes are active, fences activation during server quiesce, and
//! drains in-flight activity before a scope is deactivated at shutdown.

mod errors;
mod registry;
mod scope;
mod signal;

pub use errors::{LifecycleError, LifecycleResult};
pub use registry::ScopeRegistry;
pub use scope::{ActivityGuard, FailureScope, Locality, ScopeLifeCycle};
pub use signal::EventLatch;
