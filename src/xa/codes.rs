//! X/Open XA return codes, error codes, and flag constants
//!
//! Values follow the X/Open DTP specification; they appear on the wire
//! between the coordinator and resource managers and inside the recovery
//! log, so they are fixed i32 constants rather than enum discriminants.

/// Normal execution.
pub const XA_OK: i32 = 0;

/// The transaction branch was read-only and has been committed.
pub const XA_RDONLY: i32 = 3;

/// Routine returned with no effect and may be reissued.
pub const XA_RETRY: i32 = 4;

/// The transaction branch was heuristically committed and rolled back.
pub const XA_HEURMIX: i32 = 5;

/// The transaction branch was heuristically rolled back.
pub const XA_HEURRB: i32 = 6;

/// The transaction branch was heuristically committed.
pub const XA_HEURCOM: i32 = 7;

/// The transaction branch may have been heuristically completed.
pub const XA_HEURHAZ: i32 = 8;

/// The resource manager cannot migrate the branch to another thread.
pub const XA_NOMIGRATE: i32 = 9;

/// Lower bound of the rollback-vote code range.
pub const XA_RBBASE: i32 = 100;

/// The rollback was caused by an unspecified reason.
pub const XA_RBROLLBACK: i32 = 100;

/// The rollback was caused by a communication failure.
pub const XA_RBCOMMFAIL: i32 = 101;

/// A deadlock was detected.
pub const XA_RBDEADLOCK: i32 = 102;

/// A condition that violates the integrity of the resource was detected.
pub const XA_RBINTEGRITY: i32 = 103;

/// The resource manager rolled back the branch for a reason of its own.
pub const XA_RBOTHER: i32 = 104;

/// A protocol error occurred in the resource manager.
pub const XA_RBPROTO: i32 = 105;

/// A transaction branch took too long.
pub const XA_RBTIMEOUT: i32 = 106;

/// May retry the transaction branch.
pub const XA_RBTRANSIENT: i32 = 107;

/// Upper bound of the rollback-vote code range.
pub const XA_RBEND: i32 = 107;

/// Asynchronous operation already outstanding.
pub const XAER_ASYNC: i32 = -2;

/// A resource manager error occurred in the transaction branch.
pub const XAER_RMERR: i32 = -3;

/// The XID is not valid.
pub const XAER_NOTA: i32 = -4;

/// Invalid arguments were given.
pub const XAER_INVAL: i32 = -5;

/// Routine was invoked in an improper context.
pub const XAER_PROTO: i32 = -6;

/// Resource manager is unavailable.
pub const XAER_RMFAIL: i32 = -7;

/// The XID already exists.
pub const XAER_DUPID: i32 = -8;

/// The resource manager is doing work outside the global transaction.
pub const XAER_OUTSIDE: i32 = -9;

/// No flags set.
pub const TMNOFLAGS: i32 = 0x0000_0000;

/// Join an existing transaction branch.
pub const TMJOIN: i32 = 0x0020_0000;

/// Caller is using one-phase commit optimisation.
pub const TMONEPHASE: i32 = 0x4000_0000;

/// Disassociates the caller from the branch successfully.
pub const TMSUCCESS: i32 = 0x0400_0000;

/// Disassociates the caller; mark the branch rollback-only.
pub const TMFAIL: i32 = 0x2000_0000;

/// Caller is resuming association with a suspended branch.
pub const TMRESUME: i32 = 0x0800_0000;

/// Caller is suspending (not ending) its branch association.
pub const TMSUSPEND: i32 = 0x0200_0000;

/// Start a recovery scan.
pub const TMSTARTRSCAN: i32 = 0x0100_0000;

/// End a recovery scan.
pub const TMENDRSCAN: i32 = 0x0080_0000;

/// Render an XA return or error code as its symbolic name.
///
/// Unknown codes come back as their decimal representation so the function
/// is total; it exists for diagnostics and never sits on a protocol path.
pub fn convert_xa_code(code: i32) -> String {
    let name = match code {
        XA_OK => "XA_OK",
        XA_RDONLY => "XA_RDONLY",
        XA_RETRY => "XA_RETRY",
        XA_HEURMIX => "XA_HEURMIX",
        XA_HEURRB => "XA_HEURRB",
        XA_HEURCOM => "XA_HEURCOM",
        XA_HEURHAZ => "XA_HEURHAZ",
        XA_NOMIGRATE => "XA_NOMIGRATE",
        XA_RBROLLBACK => "XA_RBROLLBACK",
        XA_RBCOMMFAIL => "XA_RBCOMMFAIL",
        XA_RBDEADLOCK => "XA_RBDEADLOCK",
        XA_RBINTEGRITY => "XA_RBINTEGRITY",
        XA_RBOTHER => "XA_RBOTHER",
        XA_RBPROTO => "XA_RBPROTO",
        XA_RBTIMEOUT => "XA_RBTIMEOUT",
        XA_RBTRANSIENT => "XA_RBTRANSIENT",
        XAER_ASYNC => "XAER_ASYNC",
        XAER_RMERR => "XAER_RMERR",
        XAER_NOTA => "XAER_NOTA",
        XAER_INVAL => "XAER_INVAL",
        XAER_PROTO => "XAER_PROTO",
        XAER_RMFAIL => "XAER_RMFAIL",
        XAER_DUPID => "XAER_DUPID",
        XAER_OUTSIDE => "XAER_OUTSIDE",
        other => return other.to_string(),
    };
    name.to_string()
}

/// Whether a code falls in the rollback-vote range returned from prepare.
pub fn is_rollback_vote(code: i32) -> bool {
    (XA_RBBASE..=XA_RBEND).contains(&code)
}

/// A participant's answer to the prepare flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// The participant is prepared and will honour commit or rollback.
    Commit,
    /// The participant did no work worth completing; it drops out of
    /// phase two.
    ReadOnly,
}

impl Vote {
    /// The XA return code this vote travels as.
    pub fn as_xa_code(&self) -> i32 {
        match self {
            Vote::Commit => XA_OK,
            Vote::ReadOnly => XA_RDONLY,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // === SYMBOLIC NAME TESTS ===

    #[test]
    fn test_convert_known_codes() {
        assert_eq!(convert_xa_code(XA_OK), "XA_OK");
        assert_eq!(convert_xa_code(XA_RDONLY), "XA_RDONLY");
        assert_eq!(convert_xa_code(XA_RETRY), "XA_RETRY");
        assert_eq!(convert_xa_code(XA_HEURMIX), "XA_HEURMIX");
        assert_eq!(convert_xa_code(XA_HEURRB), "XA_HEURRB");
        assert_eq!(convert_xa_code(XA_HEURCOM), "XA_HEURCOM");
        assert_eq!(convert_xa_code(XA_HEURHAZ), "XA_HEURHAZ");
        assert_eq!(convert_xa_code(XA_NOMIGRATE), "XA_NOMIGRATE");
    }

    #[test]
    fn test_convert_rollback_codes() {
        assert_eq!(convert_xa_code(XA_RBROLLBACK), "XA_RBROLLBACK");
        assert_eq!(convert_xa_code(XA_RBCOMMFAIL), "XA_RBCOMMFAIL");
        assert_eq!(convert_xa_code(XA_RBDEADLOCK), "XA_RBDEADLOCK");
        assert_eq!(convert_xa_code(XA_RBINTEGRITY), "XA_RBINTEGRITY");
        assert_eq!(convert_xa_code(XA_RBOTHER), "XA_RBOTHER");
        assert_eq!(convert_xa_code(XA_RBPROTO), "XA_RBPROTO");
        assert_eq!(convert_xa_code(XA_RBTIMEOUT), "XA_RBTIMEOUT");
        assert_eq!(convert_xa_code(XA_RBTRANSIENT), "XA_RBTRANSIENT");
    }

    #[test]
    fn test_convert_error_codes() {
        assert_eq!(convert_xa_code(XAER_ASYNC), "XAER_ASYNC");
        assert_eq!(convert_xa_code(XAER_RMERR), "XAER_RMERR");
        assert_eq!(convert_xa_code(XAER_NOTA), "XAER_NOTA");
        assert_eq!(convert_xa_code(XAER_INVAL), "XAER_INVAL");
        assert_eq!(convert_xa_code(XAER_PROTO), "XAER_PROTO");
        assert_eq!(convert_xa_code(XAER_RMFAIL), "XAER_RMFAIL");
        assert_eq!(convert_xa_code(XAER_DUPID), "XAER_DUPID");
        assert_eq!(convert_xa_code(XAER_OUTSIDE), "XAER_OUTSIDE");
    }

    #[test]
    fn test_convert_unknown_codes_decimal() {
        assert_eq!(convert_xa_code(42), "42");
        assert_eq!(convert_xa_code(-1), "-1");
        assert_eq!(convert_xa_code(999), "999");
        assert_eq!(convert_xa_code(i32::MIN), i32::MIN.to_string());
        assert_eq!(convert_xa_code(i32::MAX), i32::MAX.to_string());
    }

    #[test]
    fn test_canonical_error_values() {
        // The negative error codes are fixed by the standard
        assert_eq!(XAER_RMERR, -3);
        assert_eq!(XAER_NOTA, -4);
        assert_eq!(XAER_RMFAIL, -7);
    }

    // === RANGE AND VOTE TESTS ===

    #[test]
    fn test_rollback_vote_range() {
        assert!(is_rollback_vote(XA_RBBASE));
        assert!(is_rollback_vote(XA_RBDEADLOCK));
        assert!(is_rollback_vote(XA_RBEND));
        assert!(!is_rollback_vote(XA_OK));
        assert!(!is_rollback_vote(99));
        assert!(!is_rollback_vote(108));
        assert!(!is_rollback_vote(XAER_RMERR));
    }

    #[test]
    fn test_vote_codes() {
        assert_eq!(Vote::Commit.as_xa_code(), XA_OK);
        assert_eq!(Vote::ReadOnly.as_xa_code(), XA_RDONLY);
    }

    #[test]
    fn test_flags_distinct() {
        let flags = [
            TMJOIN, TMONEPHASE, TMSUCCESS, TMFAIL,
            TMRESUME, TMSUSPEND, TMSTARTRSCAN, TMENDRSCAN,
        ];
        for (i, a) in flags.iter().enumerate() {
            for b in flags.iter().skip(i + 1) {
                assert_ne!(a, b);
                assert_eq!(a & b, 0, "flags must not overlap");
            }
        }
    }
}
