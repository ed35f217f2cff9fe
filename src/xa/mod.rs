//! XA protocol layer: return codes, flags, branch identifiers
//!
//! Everything here mirrors the X/Open DTP definitions; the rest of the crate
//! speaks in these types at the coordinator/resource-manager boundary.

pub mod codes;
mod errors;
mod xid;

pub use codes::{convert_xa_code, is_rollback_vote, Vote};
pub use errors::{XaError, XaResult};
pub use xid::{Xid, XidError, MAX_BQUAL_SIZE, MAX_GTRID_SIZE, TXNCORE_FORMAT_ID};
