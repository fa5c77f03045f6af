//! BIP32 Extended Keys
//!
//! `ExtendedKey` is an immutable value. Child derivation always returns a new
//! key and never touches the parent, so a loaded root can be shared across
//! threads without locking.
//!
//! Per step (BIP32 CKD):
//! - hardened: `HMAC-SHA512(chain_code, 0x00 || k_par || ser32(i))`, private parents only
//! - normal:   `HMAC-SHA512(chain_code, serP(K_par) || ser32(i))`
//! - `IL` tweaks the parent key (`k = IL + k_par` or `K = IL*G + K_par`), `IR` is the
//!   child chain code
//!
//! An invalid `IL` (>= n) or a zero/infinite child is reported as an error.
//! The index is never silently bumped to `i + 1`, so each request keeps a
//! single path.

use std::fmt;
use std::str::FromStr;

use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::Network;
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, SecretKey, SECP256K1};
use sha2::Sha512;
use zeroize::Zeroize;

use super::path::{ChildIndex, DerivationPath};
use crate::custody::{CustodyError, DerivationFailure};

/// Mainnet xpub version bytes
const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];

/// Mainnet xprv version bytes
const XPRV_VERSION: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];

/// Serialized extended key length (before base58check)
const ENCODED_LEN: usize = 78;

/// HMAC key for master key generation
const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

pub type Fingerprint = [u8; 4];
pub type ChainCode = [u8; 32];

/// Key material held by an extended key: exactly one of the two
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum KeyMaterial {
    Private(SecretKey),
    Public(PublicKey),
}

/// BIP32 extended key (mainnet only)
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    network: Network,
    depth: u8,
    parent_fingerprint: Fingerprint,
    child_index: u32,
    chain_code: ChainCode,
    material: KeyMaterial,
}

impl ExtendedKey {
    /// Master key from BIP39 seed bytes
    pub fn new_master(seed: &[u8]) -> Result<Self, CustodyError> {
        let mut digest = hmac_sha512(MASTER_HMAC_KEY, &[seed])?;
        let secret = SecretKey::from_slice(&digest[..32])
            .map_err(|_| CustodyError::Derivation(DerivationFailure::InvalidIntermediate));
        let chain_code = chain_code_from(&digest);
        digest.zeroize();

        Ok(Self {
            network: Network::Bitcoin,
            depth: 0,
            parent_fingerprint: [0; 4],
            child_index: 0,
            chain_code,
            material: KeyMaterial::Private(secret?),
        })
    }

    /// Parse a base58check `xpub...` / `xprv...` string
    pub fn from_base58(encoded: &str) -> Result<Self, CustodyError> {
        let mut data = base58::decode_check(encoded.trim())
            .map_err(|e| CustodyError::InvalidKeyMaterial(format!("base58: {}", e)))?;
        let key = Self::decode(&data);
        data.zeroize();
        key
    }

    /// Serialize as base58check (`xpub...` for public keys, `xprv...` for private)
    pub fn to_base58(&self) -> String {
        let mut data = self.encode();
        let encoded = base58::encode_check(&data);
        data.zeroize();
        encoded
    }

    fn decode(data: &[u8]) -> Result<Self, CustodyError> {
        if data.len() != ENCODED_LEN {
            return Err(CustodyError::InvalidKeyMaterial(format!(
                "extended key must be {} bytes, got {}",
                ENCODED_LEN,
                data.len()
            )));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[0..4]);
        let depth = data[4];
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&data[5..9]);
        let child_index = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);

        if depth == 0 && (parent_fingerprint != [0; 4] || child_index != 0) {
            return Err(CustodyError::InvalidKeyMaterial(
                "master key with non-zero parent fingerprint or index".to_string(),
            ));
        }

        let material = match version {
            XPUB_VERSION => PublicKey::from_slice(&data[45..78])
                .map(KeyMaterial::Public)
                .map_err(|e| CustodyError::InvalidKeyMaterial(format!("public key: {}", e)))?,
            XPRV_VERSION => {
                if data[45] != 0 {
                    return Err(CustodyError::InvalidKeyMaterial(
                        "private key data must be prefixed with 0x00".to_string(),
                    ));
                }
                SecretKey::from_slice(&data[46..78])
                    .map(KeyMaterial::Private)
                    .map_err(|e| CustodyError::InvalidKeyMaterial(format!("private key: {}", e)))?
            }
            other => {
                return Err(CustodyError::InvalidKeyMaterial(format!(
                    "unsupported version bytes {} (expected mainnet xpub or xprv)",
                    hex::encode(other)
                )))
            }
        };

        Ok(Self {
            network: Network::Bitcoin,
            depth,
            parent_fingerprint,
            child_index,
            chain_code,
            material,
        })
    }

    fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut data = [0u8; ENCODED_LEN];
        data[4] = self.depth;
        data[5..9].copy_from_slice(&self.parent_fingerprint);
        data[9..13].copy_from_slice(&self.child_index.to_be_bytes());
        data[13..45].copy_from_slice(&self.chain_code);
        match &self.material {
            KeyMaterial::Public(pk) => {
                data[0..4].copy_from_slice(&XPUB_VERSION);
                data[45..78].copy_from_slice(&pk.serialize());
            }
            KeyMaterial::Private(sk) => {
                data[0..4].copy_from_slice(&XPRV_VERSION);
                let mut secret = sk.secret_bytes();
                data[46..78].copy_from_slice(&secret);
                secret.zeroize();
            }
        }
        data
    }

    /// Derive one child key
    pub fn derive_child(&self, index: ChildIndex) -> Result<Self, CustodyError> {
        let parent_public = self.public_key();
        let index_bytes = index.to_raw().to_be_bytes();

        let mut digest = match (&self.material, index) {
            (KeyMaterial::Public(_), ChildIndex::Hardened(_)) => {
                return Err(DerivationFailure::HardenedFromPublic.into());
            }
            (KeyMaterial::Private(sk), ChildIndex::Hardened(_)) => {
                let mut secret = sk.secret_bytes();
                let digest = hmac_sha512(&self.chain_code, &[&[0u8], &secret, &index_bytes]);
                secret.zeroize();
                digest?
            }
            (_, ChildIndex::Normal(_)) => {
                hmac_sha512(&self.chain_code, &[&parent_public.serialize(), &index_bytes])?
            }
        };

        let mut il = [0u8; 32];
        il.copy_from_slice(&digest[..32]);
        let chain_code = chain_code_from(&digest);
        digest.zeroize();
        let tweak = Scalar::from_be_bytes(il);
        il.zeroize();
        let tweak = tweak.map_err(|_| DerivationFailure::InvalidIntermediate)?;

        let material = match &self.material {
            KeyMaterial::Private(sk) => (*sk)
                .add_tweak(&tweak)
                .map(KeyMaterial::Private)
                .map_err(|_| DerivationFailure::InvalidIntermediate)?,
            KeyMaterial::Public(pk) => (*pk)
                .add_exp_tweak(SECP256K1, &tweak)
                .map(KeyMaterial::Public)
                .map_err(|_| DerivationFailure::InvalidIntermediate)?,
        };

        let depth = self
            .depth
            .checked_add(1)
            .ok_or(DerivationFailure::MaxDepthExceeded)?;

        Ok(Self {
            network: self.network,
            depth,
            parent_fingerprint: fingerprint_of(&parent_public),
            child_index: index.to_raw(),
            chain_code,
            material,
        })
    }

    /// Walk a path index by index
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, CustodyError> {
        let mut key = self.clone();
        for index in path.iter() {
            key = key.derive_child(*index)?;
        }
        Ok(key)
    }

    /// Copy of this key without the private scalar
    pub fn neuter(&self) -> Self {
        Self {
            material: KeyMaterial::Public(self.public_key()),
            ..self.clone()
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match &self.material {
            KeyMaterial::Private(sk) => PublicKey::from_secret_key(SECP256K1, sk),
            KeyMaterial::Public(pk) => *pk,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self.material, KeyMaterial::Private(_))
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn parent_fingerprint(&self) -> Fingerprint {
        self.parent_fingerprint
    }

    pub fn child_index(&self) -> ChildIndex {
        ChildIndex::from_raw(self.child_index)
    }

    pub fn chain_code(&self) -> &ChainCode {
        &self.chain_code
    }

    /// First four bytes of HASH160 of the compressed public key
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_of(&self.public_key())
    }
}

impl FromStr for ExtendedKey {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

// Never prints key material or chain code.
impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("depth", &self.depth)
            .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
            .field("child_index", &self.child_index())
            .field("private", &self.is_private())
            .field("fingerprint", &hex::encode(self.fingerprint()))
            .finish()
    }
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], CustodyError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|e| CustodyError::InvalidKeyMaterial(format!("hmac key: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn chain_code_from(digest: &[u8; 64]) -> ChainCode {
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&digest[32..]);
    chain_code
}

fn fingerprint_of(public_key: &PublicKey) -> Fingerprint {
    let id = hash160::Hash::hash(&public_key.serialize()).to_byte_array();
    [id[0], id[1], id[2], id[3]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::path::HARDENED_OFFSET;

    // BIP32 test vector 1
    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const TV1_M_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const TV1_M_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const TV1_M0H_XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
    const TV1_M0H_XPRV: &str = "xprv9uHRZZhk6KAJC1avXpDAp4MDc3sQKNxDiPvvkX8Br5ngLNv1TxvUxt4cV1rGL5hj6KCesnDYUhd7oWgT11eZG7XnxHrnYeSvkzY7d2bhkJ7";
    const TV1_M0H1_XPUB: &str = "xpub6ASuArnXKPbfEwhqN6e3mwBcDTgzisQN1wXN9BJcM47sSikHjJf3UFHKkNAWbWMiGj7Wf5uMash7SyYq527Hqck2AxYysAA7xmALppuCkwQ";
    const TV1_M0H1_XPRV: &str = "xprv9wTYmMFdV23N2TdNG573QoEsfRrWKQgWeibmLntzniatZvR9BmLnvSxqu53Kw1UmYPxLgboyZQaXwTCg8MSY3H2EU4pWcQDnRnrVA1xe8fs";

    fn tv1_master() -> ExtendedKey {
        ExtendedKey::new_master(&hex::decode(TV1_SEED).unwrap()).unwrap()
    }

    #[test]
    fn test_master_from_seed() {
        let master = tv1_master();
        assert!(master.is_private());
        assert_eq!(master.depth(), 0);
        assert_eq!(master.to_base58(), TV1_M_XPRV);
        assert_eq!(master.neuter().to_base58(), TV1_M_XPUB);
    }

    #[test]
    fn test_private_derivation_vector() {
        let master = tv1_master();

        let m0h = master.derive_child(ChildIndex::Hardened(0)).unwrap();
        assert_eq!(m0h.to_base58(), TV1_M0H_XPRV);
        assert_eq!(m0h.neuter().to_base58(), TV1_M0H_XPUB);
        assert_eq!(m0h.depth(), 1);
        assert_eq!(m0h.parent_fingerprint(), master.fingerprint());
        assert_eq!(m0h.child_index().to_raw(), HARDENED_OFFSET);

        let m0h1 = m0h.derive_child(ChildIndex::Normal(1)).unwrap();
        assert_eq!(m0h1.to_base58(), TV1_M0H1_XPRV);
        assert_eq!(m0h1.neuter().to_base58(), TV1_M0H1_XPUB);
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let m0h_pub: ExtendedKey = TV1_M0H_XPUB.parse().unwrap();
        assert!(!m0h_pub.is_private());

        let m0h1_pub = m0h_pub.derive_child(ChildIndex::Normal(1)).unwrap();
        assert_eq!(m0h1_pub.to_base58(), TV1_M0H1_XPUB);
    }

    #[test]
    fn test_hardened_from_public_fails() {
        let xpub: ExtendedKey = TV1_M_XPUB.parse().unwrap();
        let err = xpub.derive_child(ChildIndex::Hardened(0)).unwrap_err();
        assert!(matches!(
            err,
            CustodyError::Derivation(DerivationFailure::HardenedFromPublic)
        ));
    }

    #[test]
    fn test_derive_path_walks_every_index() {
        let master = tv1_master();
        let path = DerivationPath::from(vec![ChildIndex::Hardened(0), ChildIndex::Normal(1)]);
        let derived = master.derive_path(&path).unwrap();
        assert_eq!(derived.to_base58(), TV1_M0H1_XPRV);
        assert_eq!(master.derive_path(&DerivationPath::empty()).unwrap(), master);
    }

    #[test]
    fn test_base58_roundtrip() {
        for encoded in [TV1_M_XPUB, TV1_M_XPRV, TV1_M0H1_XPUB, TV1_M0H1_XPRV] {
            let key = ExtendedKey::from_base58(encoded).unwrap();
            assert_eq!(key.to_base58(), encoded);
        }
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert!(matches!(
            ExtendedKey::from_base58("not-a-key"),
            Err(CustodyError::InvalidKeyMaterial(_))
        ));

        // valid base58check, wrong length
        let short = base58::encode_check(&[0u8; 10]);
        assert!(matches!(
            ExtendedKey::from_base58(&short),
            Err(CustodyError::InvalidKeyMaterial(_))
        ));

        // testnet tpub version is not accepted
        let mut data = ExtendedKey::from_base58(TV1_M_XPUB).unwrap().encode();
        data[0..4].copy_from_slice(&[0x04, 0x35, 0x87, 0xCF]);
        assert!(ExtendedKey::from_base58(&base58::encode_check(&data)).is_err());
    }

    #[test]
    fn test_rejects_master_with_parent_fingerprint() {
        let mut data = ExtendedKey::from_base58(TV1_M_XPUB).unwrap().encode();
        data[5] = 0x01;
        assert!(matches!(
            ExtendedKey::from_base58(&base58::encode_check(&data)),
            Err(CustodyError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_matches_reference_implementation() {
        use bitcoin::bip32::{DerivationPath as RefPath, Xpriv, Xpub};
        use bitcoin::secp256k1::Secp256k1;

        let secp = Secp256k1::new();
        let seed = [0x5au8; 64];
        let master = ExtendedKey::new_master(&seed).unwrap();
        let reference = Xpriv::new_master(Network::Bitcoin, &seed).unwrap();

        for (c, l) in [(0u32, 0u32), (1, 2), (1_000, 77), (HARDENED_OFFSET - 1, 5)] {
            let path = DerivationPath::bip86_account()
                .child(ChildIndex::Normal(c))
                .child(ChildIndex::Normal(l));
            let ours = master.derive_path(&path).unwrap();

            let ref_path: RefPath = path.to_string().parse().unwrap();
            let theirs = reference.derive_priv(&secp, &ref_path).unwrap();

            assert_eq!(ours.to_base58(), theirs.to_string());
            assert_eq!(
                ours.neuter().to_base58(),
                Xpub::from_priv(&secp, &theirs).to_string()
            );
        }
    }

    #[test]
    fn test_debug_hides_secrets() {
        let master = tv1_master();
        let printed = format!("{:?}", master);
        assert!(!printed.contains(&hex::encode(master.chain_code())));
        assert!(printed.contains("private: true"));
    }
}
