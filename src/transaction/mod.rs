//! Transaction state machine and coordination
//!
//! - `state`: the persisted transaction state codes
//! - `coordinator`: `Transaction`, driving the two-phase protocol over a
//!   participant list and one recovery-log unit

mod coordinator;
mod state;

pub use coordinator::{
    decode_heuristic, decode_state, encode_state, ParticipantRecord, SharedLog, Transaction,
    TxnOptions, SECTION_GLOBAL_ID, SECTION_HEURISTIC, SECTION_PARTICIPANT, SECTION_STATE,
};
pub use state::TransactionState;
