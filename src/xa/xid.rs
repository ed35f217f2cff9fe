//! Transaction branch identifiers
//!
//! An `Xid` names one branch of a global transaction: a format id, a global
//! transaction identifier (gtrid) shared by every branch, and a branch
//! qualifier (bqual) distinguishing this participant's slice of the work.
//! Serialized little-endian with length prefixes for the recovery log.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Maximum gtrid length in bytes, per the XA specification.
pub const MAX_GTRID_SIZE: usize = 64;

/// Maximum bqual length in bytes, per the XA specification.
pub const MAX_BQUAL_SIZE: usize = 64;

/// Format identifier stamped on every Xid minted by this coordinator.
pub const TXNCORE_FORMAT_ID: i32 = 0x7478_6331;

/// Errors constructing or decoding an Xid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XidError {
    #[error("gtrid length {0} exceeds maximum {MAX_GTRID_SIZE}")]
    GtridTooLong(usize),

    #[error("bqual length {0} exceeds maximum {MAX_BQUAL_SIZE}")]
    BqualTooLong(usize),

    #[error("byte buffer too short for xid: {0} bytes")]
    Truncated(usize),
}

/// An X/Open transaction branch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    gtrid: Vec<u8>,
    bqual: Vec<u8>,
}

impl Xid {
    /// Create an Xid from explicit parts.
    pub fn new(format_id: i32, gtrid: Vec<u8>, bqual: Vec<u8>) -> Result<Self, XidError> {
        if gtrid.len() > MAX_GTRID_SIZE {
            return Err(XidError::GtridTooLong(gtrid.len()));
        }
        if bqual.len() > MAX_BQUAL_SIZE {
            return Err(XidError::BqualTooLong(bqual.len()));
        }
        Ok(Self { format_id, gtrid, bqual })
    }

    /// Mint a fresh global transaction identity.
    ///
    /// The gtrid is a random UUID; the base bqual is empty and branch
    /// qualifiers are minted per participant via [`Xid::new_branch`].
    pub fn generate() -> Self {
        Self {
            format_id: TXNCORE_FORMAT_ID,
            gtrid: Uuid::new_v4().as_bytes().to_vec(),
            bqual: Vec::new(),
        }
    }

    /// Mint the branch Xid for participant number `branch`.
    ///
    /// Branches share the gtrid; the branch index is carried in the last
    /// four bytes of the bqual so recovered branches sort deterministically.
    pub fn new_branch(&self, branch: u32) -> Self {
        let mut bqual = Vec::with_capacity(4);
        bqual.extend_from_slice(&branch.to_le_bytes());
        Self {
            format_id: self.format_id,
            gtrid: self.gtrid.clone(),
            bqual,
        }
    }

    /// The branch index encoded in the bqual tail, if present.
    pub fn branch_index(&self) -> Option<u32> {
        if self.bqual.len() < 4 {
            return None;
        }
        let tail = &self.bqual[self.bqual.len() - 4..];
        Some(u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]))
    }

    /// The format identifier.
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// The global transaction identifier bytes.
    pub fn gtrid(&self) -> &[u8] {
        &self.gtrid
    }

    /// The branch qualifier bytes.
    pub fn bqual(&self) -> &[u8] {
        &self.bqual
    }

    /// Whether two Xids belong to the same global transaction.
    pub fn same_transaction(&self, other: &Xid) -> bool {
        self.format_id == other.format_id && self.gtrid == other.gtrid
    }

    /// Hex rendering of the gtrid for diagnostics and audit records.
    pub fn gtrid_hex(&self) -> String {
        hex_string(&self.gtrid)
    }

    /// Serialize to bytes: format id, then length-prefixed gtrid and bqual,
    /// all little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 4 + self.gtrid.len() + 4 + self.bqual.len());
        buf.extend_from_slice(&self.format_id.to_le_bytes());
        buf.extend_from_slice(&(self.gtrid.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.gtrid);
        buf.extend_from_slice(&(self.bqual.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.bqual);
        buf
    }

    /// Deserialize from bytes written by [`Xid::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XidError> {
        if bytes.len() < 8 {
            return Err(XidError::Truncated(bytes.len()));
        }

        let format_id = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let gtrid_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        if gtrid_len > MAX_GTRID_SIZE {
            return Err(XidError::GtridTooLong(gtrid_len));
        }

        let mut offset = 8;
        if bytes.len() < offset + gtrid_len + 4 {
            return Err(XidError::Truncated(bytes.len()));
        }
        let gtrid = bytes[offset..offset + gtrid_len].to_vec();
        offset += gtrid_len;

        let bqual_len = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        if bqual_len > MAX_BQUAL_SIZE {
            return Err(XidError::BqualTooLong(bqual_len));
        }
        offset += 4;

        if bytes.len() < offset + bqual_len {
            return Err(XidError::Truncated(bytes.len()));
        }
        let bqual = bytes[offset..offset + bqual_len].to_vec();

        Ok(Self { format_id, gtrid, bqual })
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}:{}:{}",
            self.format_id,
            hex_string(&self.gtrid),
            hex_string(&self.bqual)
        )
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // === CONSTRUCTION TESTS ===

    #[test]
    fn test_generate_unique_gtrids() {
        let a = Xid::generate();
        let b = Xid::generate();
        assert_ne!(a.gtrid(), b.gtrid());
        assert_eq!(a.format_id(), TXNCORE_FORMAT_ID);
    }

    #[test]
    fn test_new_rejects_oversized_parts() {
        let long = vec![0u8; MAX_GTRID_SIZE + 1];
        assert_eq!(
            Xid::new(1, long.clone(), vec![]),
            Err(XidError::GtridTooLong(MAX_GTRID_SIZE + 1))
        );
        assert_eq!(
            Xid::new(1, vec![], long),
            Err(XidError::BqualTooLong(MAX_BQUAL_SIZE + 1))
        );
    }

    #[test]
    fn test_branch_shares_gtrid() {
        let base = Xid::generate();
        let b0 = base.new_branch(0);
        let b1 = base.new_branch(1);

        assert!(b0.same_transaction(&base));
        assert!(b0.same_transaction(&b1));
        assert_ne!(b0.bqual(), b1.bqual());
        assert_eq!(b0.branch_index(), Some(0));
        assert_eq!(b1.branch_index(), Some(1));
    }

    #[test]
    fn test_branch_index_absent_on_base() {
        let base = Xid::generate();
        assert_eq!(base.branch_index(), None);
    }

    // === SERIALIZATION TESTS ===

    #[test]
    fn test_bytes_roundtrip() {
        let xid = Xid::generate().new_branch(7);
        let bytes = xid.to_bytes();
        let decoded = Xid::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, xid);
        assert_eq!(decoded.branch_index(), Some(7));
    }

    #[test]
    fn test_from_bytes_truncated() {
        let xid = Xid::generate().new_branch(1);
        let bytes = xid.to_bytes();

        assert!(matches!(Xid::from_bytes(&[]), Err(XidError::Truncated(0))));
        assert!(matches!(
            Xid::from_bytes(&bytes[..bytes.len() - 1]),
            Err(XidError::Truncated(_))
        ));
    }

    #[test]
    fn test_from_bytes_oversized_length() {
        let mut bytes = Xid::generate().to_bytes();
        // Corrupt the gtrid length field
        bytes[4..8].copy_from_slice(&(65u32).to_le_bytes());
        assert!(matches!(
            Xid::from_bytes(&bytes),
            Err(XidError::GtridTooLong(65))
        ));
    }

    #[test]
    fn test_display_contains_gtrid_hex() {
        let xid = Xid::generate();
        let shown = format!("{}", xid);
        assert!(shown.contains(&xid.gtrid_hex()));
    }
}
