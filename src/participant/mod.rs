//! Participant layer: status tracking, adapter contracts, heuristics
//!
//! A participant is one resource manager's stake in a transaction. This
//! module owns the status enumeration a participant moves through, the
//! adapter trait resource integrations implement, and the heuristic
//! evidence fold the coordinator uses to judge damage after completion.

pub mod heuristic;
mod resource;
mod status;

pub use resource::{Participant, StatefulResource, XaParticipant};
pub use status::{status_name, ResourceStatus};
