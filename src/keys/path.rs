//! Derivation Paths
//!
//! Maps a `(customerId, loanId)` pair onto a BIP86 derivation path:
//!
//! ```text
//! m / 86' / 0' / 0' / customerId / loanId
//!     |     |    |    |            |
//!     |     |    |    |            +-- normal
//!     |     |    |    +-- normal
//!     |     |    +-- account 0
//!     |     +-- coin type (Bitcoin)
//!     +-- purpose (Taproot, BIP86)
//! ```
//!
//! The last two levels are non-hardened so the same tree can be walked from
//! an account-level xpub without any private key on the server.

use std::fmt;

use super::loader::Mode;
use crate::custody::CustodyError;

/// Offset added to an index to mark it hardened
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// BIP86 purpose
pub const BIP86_PURPOSE: u32 = 86;

/// SLIP-44 coin type for Bitcoin mainnet
pub const COIN_TYPE_BITCOIN: u32 = 0;

/// The only account in use
pub const ACCOUNT_INDEX: u32 = 0;

/// One step in a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildIndex {
    /// Index below 2^31
    Normal(u32),
    /// Hardened index, stored without the 2^31 offset
    Hardened(u32),
}

impl ChildIndex {
    /// Non-hardened index, `None` if `index >= 2^31`
    pub fn normal(index: u32) -> Option<Self> {
        (index < HARDENED_OFFSET).then_some(ChildIndex::Normal(index))
    }

    /// Hardened index, `None` if `index >= 2^31`
    pub fn hardened(index: u32) -> Option<Self> {
        (index < HARDENED_OFFSET).then_some(ChildIndex::Hardened(index))
    }

    /// Classify a raw 32-bit index as it appears on the wire
    pub fn from_raw(raw: u32) -> Self {
        if raw >= HARDENED_OFFSET {
            ChildIndex::Hardened(raw - HARDENED_OFFSET)
        } else {
            ChildIndex::Normal(raw)
        }
    }

    /// Raw 32-bit index including the hardened offset
    pub fn to_raw(self) -> u32 {
        match self {
            ChildIndex::Normal(index) => index,
            ChildIndex::Hardened(index) => index | HARDENED_OFFSET,
        }
    }

    pub fn is_hardened(self) -> bool {
        matches!(self, ChildIndex::Hardened(_))
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildIndex::Normal(index) => write!(f, "{}", index),
            ChildIndex::Hardened(index) => write!(f, "{}'", index),
        }
    }
}

/// Ordered list of child indices, relative to whatever key it is applied to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<ChildIndex>);

impl DerivationPath {
    /// Empty path (applying it returns the key itself)
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// `m/86'/0'/0'`
    pub fn bip86_account() -> Self {
        Self(vec![
            ChildIndex::Hardened(BIP86_PURPOSE),
            ChildIndex::Hardened(COIN_TYPE_BITCOIN),
            ChildIndex::Hardened(ACCOUNT_INDEX),
        ])
    }

    /// Append one step
    pub fn child(mut self, index: ChildIndex) -> Self {
        self.0.push(index);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChildIndex> {
        self.0.iter()
    }
}

impl From<Vec<ChildIndex>> for DerivationPath {
    fn from(indices: Vec<ChildIndex>) -> Self {
        Self(indices)
    }
}

impl AsRef<[ChildIndex]> for DerivationPath {
    fn as_ref(&self) -> &[ChildIndex] {
        &self.0
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for index in &self.0 {
            write!(f, "/{}", index)?;
        }
        Ok(())
    }
}

/// A validated `(customerId, loanId)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustodyRequest {
    customer_id: u32,
    loan_id: u32,
}

impl CustodyRequest {
    /// Both ids must be below 2^31
    pub fn new(customer_id: u32, loan_id: u32) -> Result<Self, CustodyError> {
        Ok(Self {
            customer_id: checked_index("customerId", i64::from(customer_id))?,
            loan_id: checked_index("loanId", i64::from(loan_id))?,
        })
    }

    pub fn customer_id(&self) -> u32 {
        self.customer_id
    }

    pub fn loan_id(&self) -> u32 {
        self.loan_id
    }

    /// Path walked by the derivation engine for the given mode
    pub fn derivation_path(&self, mode: Mode) -> DerivationPath {
        let base = match mode {
            Mode::SeedHolding => DerivationPath::bip86_account(),
            // the three hardened levels are already baked into the account xpub
            Mode::PublicOnly => DerivationPath::empty(),
        };
        base.child(ChildIndex::Normal(self.customer_id))
            .child(ChildIndex::Normal(self.loan_id))
    }

    /// Full path from the master key, rendered for audit regardless of mode
    pub fn audit_path(&self) -> DerivationPath {
        self.derivation_path(Mode::SeedHolding)
    }
}

/// Build the derivation path for a request
pub fn build_path(mode: Mode, customer_id: u32, loan_id: u32) -> Result<DerivationPath, CustodyError> {
    Ok(CustodyRequest::new(customer_id, loan_id)?.derivation_path(mode))
}

/// Validate an externally supplied id and narrow it to a non-hardened index
pub fn checked_index(field: &'static str, value: i64) -> Result<u32, CustodyError> {
    if (0..i64::from(HARDENED_OFFSET)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(CustodyError::InvalidIndex { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_holding_path() {
        let path = build_path(Mode::SeedHolding, 7, 42).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.to_string(), "m/86'/0'/0'/7/42");

        let raw: Vec<u32> = path.iter().map(|i| i.to_raw()).collect();
        assert_eq!(raw, vec![86 + HARDENED_OFFSET, HARDENED_OFFSET, HARDENED_OFFSET, 7, 42]);
    }

    #[test]
    fn test_public_only_path() {
        let path = build_path(Mode::PublicOnly, 7, 42).unwrap();
        assert_eq!(path.as_ref(), &[ChildIndex::Normal(7), ChildIndex::Normal(42)]);
        assert!(path.iter().all(|i| !i.is_hardened()));
    }

    #[test]
    fn test_audit_path_ignores_mode() {
        let request = CustodyRequest::new(3, 9).unwrap();
        assert_eq!(request.audit_path().to_string(), "m/86'/0'/0'/3/9");
        assert_eq!(
            request.audit_path(),
            request.derivation_path(Mode::SeedHolding)
        );
    }

    #[test]
    fn test_index_bounds() {
        let max = HARDENED_OFFSET - 1;
        assert!(build_path(Mode::SeedHolding, max, 0).is_ok());
        assert!(build_path(Mode::PublicOnly, 0, max).is_ok());

        let err = build_path(Mode::SeedHolding, HARDENED_OFFSET, 0).unwrap_err();
        assert!(matches!(
            err,
            CustodyError::InvalidIndex { field: "customerId", .. }
        ));

        let err = build_path(Mode::PublicOnly, 0, u32::MAX).unwrap_err();
        assert!(matches!(err, CustodyError::InvalidIndex { field: "loanId", .. }));
    }

    #[test]
    fn test_checked_index_rejects_negative() {
        assert!(checked_index("customerId", -1).is_err());
        assert_eq!(checked_index("customerId", 0).unwrap(), 0);
        assert!(checked_index("loanId", i64::from(HARDENED_OFFSET)).is_err());
    }

    #[test]
    fn test_child_index_raw_roundtrip() {
        assert_eq!(ChildIndex::from_raw(5), ChildIndex::Normal(5));
        assert_eq!(ChildIndex::from_raw(HARDENED_OFFSET + 86), ChildIndex::Hardened(86));
        assert_eq!(ChildIndex::Hardened(86).to_raw(), HARDENED_OFFSET + 86);
        assert!(ChildIndex::hardened(HARDENED_OFFSET).is_none());
        assert!(ChildIndex::normal(HARDENED_OFFSET).is_none());
        assert_eq!(ChildIndex::Hardened(0).to_string(), "0'");
    }
}
