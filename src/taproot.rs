//! Taproot Output Derivation (BIP341, key path only)
//!
//! # How it works
//!
//! 1. Take the leaf public key P and drop its parity: `internal_key = x(P)`
//! 2. Compute the tweak: `t = H_TapTweak(internal_key)` (no script tree, so no merkle root)
//! 3. Compute the output key: `Q = lift_x(internal_key) + t*G`
//! 4. Publish `x(Q)`; its parity is implied and not part of the address
//!
//! Deposits to these outputs are spendable through the key path only.

use secp256k1::{Parity, Scalar, XOnlyPublicKey, SECP256K1};
use sha2::{Digest, Sha256};

use crate::custody::{CustodyError, DerivationFailure};
use crate::keys::ExtendedKey;

const TAP_TWEAK_TAG: &[u8] = b"TapTweak";

/// Key-path-only Taproot output for one leaf key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaprootOutput {
    /// Untweaked x-only key (the leaf public key)
    pub internal_key: XOnlyPublicKey,
    /// `H_TapTweak(internal_key)`
    pub tweak: [u8; 32],
    /// Tweaked x-only key committed to by the address
    pub output_key: XOnlyPublicKey,
    /// Y parity of the full output point (needed later for key-path signing)
    pub output_parity: Parity,
}

impl TaprootOutput {
    pub fn internal_key_hex(&self) -> String {
        hex::encode(self.internal_key.serialize())
    }

    pub fn output_key_hex(&self) -> String {
        hex::encode(self.output_key.serialize())
    }
}

/// BIP340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data)
pub fn tagged_hash(tag: &[u8], data: &[u8]) -> [u8; 32] {
    let tag_hash: [u8; 32] = Sha256::digest(tag).into();

    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(data);
    hasher.finalize().into()
}

/// Taproot tweak for a key with no script tree
pub fn tap_tweak(internal_key: &XOnlyPublicKey) -> [u8; 32] {
    tagged_hash(TAP_TWEAK_TAG, &internal_key.serialize())
}

/// Derive the key-path-only Taproot output for a leaf key
pub fn derive_taproot_output(leaf: &ExtendedKey) -> Result<TaprootOutput, CustodyError> {
    let (internal_key, _parity) = leaf.public_key().x_only_public_key();
    tweak_internal_key(internal_key)
}

/// Apply the BIP341 tweak to an x-only internal key
pub fn tweak_internal_key(internal_key: XOnlyPublicKey) -> Result<TaprootOutput, CustodyError> {
    let tweak = tap_tweak(&internal_key);

    let scalar =
        Scalar::from_be_bytes(tweak).map_err(|_| DerivationFailure::InvalidIntermediate)?;

    let (output_key, output_parity) = internal_key
        .add_tweak(SECP256K1, &scalar)
        .map_err(|_| DerivationFailure::InvalidIntermediate)?;

    Ok(TaprootOutput {
        internal_key,
        tweak,
        output_key,
        output_parity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::key::TapTweak;

    // BIP86 m/86'/0'/0'/0/0 for the "abandon ... about" mnemonic
    const BIP86_INTERNAL_KEY: &str =
        "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115";
    const BIP86_OUTPUT_KEY: &str =
        "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c";

    fn parse_x_only(hex_str: &str) -> XOnlyPublicKey {
        XOnlyPublicKey::from_slice(&hex::decode(hex_str).unwrap()).unwrap()
    }

    #[test]
    fn test_bip86_output_key() {
        let output = tweak_internal_key(parse_x_only(BIP86_INTERNAL_KEY)).unwrap();
        assert_eq!(output.internal_key_hex(), BIP86_INTERNAL_KEY);
        assert_eq!(output.output_key_hex(), BIP86_OUTPUT_KEY);
    }

    #[test]
    fn test_tagged_hash_matches_sha256_construction() {
        let data = [0x42u8; 32];
        let tag_hash = Sha256::digest(b"TapTweak");
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&tag_hash);
        preimage.extend_from_slice(&tag_hash);
        preimage.extend_from_slice(&data);
        let expected: [u8; 32] = Sha256::digest(&preimage).into();

        assert_eq!(tagged_hash(TAP_TWEAK_TAG, &data), expected);
    }

    #[test]
    fn test_matches_bitcoin_tap_tweak() {
        for byte in [0x01u8, 0x17, 0x99] {
            let sk = secp256k1::SecretKey::from_slice(&[byte; 32]).unwrap();
            let (internal_key, _) = sk.public_key(SECP256K1).x_only_public_key();

            let ours = tweak_internal_key(internal_key).unwrap();
            let (theirs, parity) = internal_key.tap_tweak(SECP256K1, None);

            assert_eq!(ours.output_key, theirs.to_inner());
            assert_eq!(ours.output_parity, parity);
        }
    }

    #[test]
    fn test_parity_of_leaf_is_dropped() {
        // P and -P share an x coordinate and must produce the same output
        let sk = secp256k1::SecretKey::from_slice(&[0x07; 32]).unwrap();
        let pk = sk.public_key(SECP256K1);
        let neg = pk.negate(SECP256K1);

        let a = tweak_internal_key(pk.x_only_public_key().0).unwrap();
        let b = tweak_internal_key(neg.x_only_public_key().0).unwrap();
        assert_eq!(a, b);
    }
}
