//! txncore - a recoverable two-phase-commit transaction coordinator
//!
//! Transactions enlist XA participants, drive prepare/commit/rollback with
//! presumed-abort logging, and survive crashes: the `txlog` force-write log
//! plus the `recovery` replay/resync passes bring in-doubt work back to a
//! resolution after restart.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod participant;
pub mod recovery;
pub mod transaction;
pub mod twophase;
pub mod txlog;
pub mod xa;
