//! End-to-end address generation tests
//!
//! Reference data is the BIP86 test vector for the
//! "abandon abandon ... about" mnemonic.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::bip32::{DerivationPath as BtcPath, Xpub};
use loanvault::address::decode_p2tr;
use loanvault::custody::{AddressGenerator, CustodyError, DerivationFailure};
use loanvault::keys::{Advisory, ChildIndex, DerivationPath, ExtendedKey, KeyMaterialConfig, Mode};
use secp256k1::SECP256K1;

const BIP86_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const BIP86_ACCOUNT_XPUB: &str = "xpub6BgBgsespWvERF3LHQu6CnqdvfEvtMcQjYrcRzx53QJjSxarj2afYWcLteoGVky7D3UKDP9QyrLprQ3VCECoY49yfdDEHGCtMMj92pReUsQ";
const BIP86_ACCOUNT_XPRV: &str = "xprv9xgqHN7yz9MwCkxsBPN5qetuNdQSUttZNKw1dcYTV4mkaAFiBVGQziHs3NRSWMkCzvgjEe3n9xV8oYywvM8at9yRqyaZVz6TYYhX98VjsUk";

const FIRST_RECEIVE_ADDRESS: &str = "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr";
const FIRST_RECEIVE_INTERNAL_KEY: &str =
    "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115";
const FIRST_RECEIVE_OUTPUT_KEY: &str =
    "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c";

fn seed_generator() -> AddressGenerator {
    AddressGenerator::from_config(&KeyMaterialConfig::from_mnemonic(BIP86_MNEMONIC)).unwrap()
}

fn xpub_generator() -> AddressGenerator {
    AddressGenerator::from_config(&KeyMaterialConfig::from_xpub(BIP86_ACCOUNT_XPUB)).unwrap()
}

#[test]
fn seed_mode_reproduces_bip86_first_receive_address() {
    let generated = seed_generator().generate_address(0, 0).unwrap();

    assert_eq!(generated.address.as_str(), FIRST_RECEIVE_ADDRESS);
    assert_eq!(generated.internal_key, FIRST_RECEIVE_INTERNAL_KEY);
    assert_eq!(generated.path, "m/86'/0'/0'/0/0");
}

#[test]
fn public_mode_from_account_xpub_matches_seed_mode() {
    let public = xpub_generator();
    let seed = seed_generator();

    for (c, l) in [(0, 0), (0, 1), (1, 0), (17, 250), (0x7FFF_FFFF, 3)] {
        assert_eq!(
            public.generate_address(c, l).unwrap(),
            seed.generate_address(c, l).unwrap(),
            "pair ({}, {})",
            c,
            l
        );
    }
}

#[test]
fn path_is_rendered_in_full_regardless_of_mode() {
    let generated = xpub_generator().generate_address(12, 34).unwrap();
    assert_eq!(generated.path, "m/86'/0'/0'/12/34");
}

#[test]
fn generation_is_idempotent() {
    let generator = xpub_generator();
    let first = generator.generate_address(9, 81).unwrap();
    let second = generator.generate_address(9, 81).unwrap();
    assert_eq!(first, second);

    // a fresh generator from the same key gives the same result
    assert_eq!(xpub_generator().generate_address(9, 81).unwrap(), first);
}

#[test]
fn index_boundaries() {
    let generator = xpub_generator();

    assert!(generator.generate_address(0, 0).is_ok());
    assert!(generator.generate_address(0x7FFF_FFFF, 0).is_ok());
    assert!(generator.generate_address(0, 0x7FFF_FFFF).is_ok());

    match generator.generate_address(0x8000_0000, 0) {
        Err(CustodyError::InvalidIndex { field, value }) => {
            assert_eq!(field, "customerId");
            assert_eq!(value, 0x8000_0000);
        }
        other => panic!("expected InvalidIndex, got {:?}", other),
    }
    assert!(matches!(
        generator.generate_address(u32::MAX, u32::MAX),
        Err(CustodyError::InvalidIndex { .. })
    ));
}

#[test]
fn ten_thousand_pairs_do_not_collide() {
    let generator = xpub_generator();
    let mut seen = HashSet::new();

    for c in 0..100 {
        for l in 0..100 {
            let generated = generator.generate_address(c, l).unwrap();
            assert!(
                seen.insert(generated.address.into_string()),
                "collision at ({}, {})",
                c,
                l
            );
        }
    }

    assert_eq!(seen.len(), 10_000);
}

#[test]
fn swapped_ids_give_different_addresses() {
    let generator = xpub_generator();
    assert_ne!(
        generator.generate_address(1, 2).unwrap().address,
        generator.generate_address(2, 1).unwrap().address
    );
}

#[test]
fn decoding_recovers_output_key() {
    let generated = seed_generator().generate_address(0, 0).unwrap();
    let program = decode_p2tr(generated.address.as_str(), bitcoin::Network::Bitcoin).unwrap();
    assert_eq!(hex::encode(program), FIRST_RECEIVE_OUTPUT_KEY);
}

#[test]
fn matches_bitcoin_crate_pipeline() {
    let generator = xpub_generator();
    let account = Xpub::from_str(BIP86_ACCOUNT_XPUB).unwrap();

    for (c, l) in [(0u32, 0u32), (3, 5), (1000, 7), (0x7FFF_FFFE, 0x7FFF_FFFF)] {
        let path = BtcPath::from_str(&format!("m/{}/{}", c, l)).unwrap();
        let leaf = account.derive_pub(SECP256K1, &path).unwrap();
        let (internal_key, _) = leaf.public_key.x_only_public_key();
        let expected =
            bitcoin::Address::p2tr(SECP256K1, internal_key, None, bitcoin::Network::Bitcoin);

        let generated = generator.generate_address(c, l).unwrap();
        assert_eq!(generated.address.as_str(), expected.to_string());
        assert_eq!(generated.internal_key, hex::encode(internal_key.serialize()));
    }
}

#[test]
fn hardened_derivation_from_public_key_is_rejected() {
    let account: ExtendedKey = BIP86_ACCOUNT_XPUB.parse().unwrap();
    let path = DerivationPath::empty()
        .child(ChildIndex::Normal(0))
        .child(ChildIndex::Hardened(1));

    assert!(matches!(
        account.derive_path(&path),
        Err(CustodyError::Derivation(DerivationFailure::HardenedFromPublic))
    ));
}

#[test]
fn private_account_key_is_usable_but_flagged() {
    let generator =
        AddressGenerator::from_config(&KeyMaterialConfig::from_xpub(BIP86_ACCOUNT_XPRV)).unwrap();

    assert_eq!(generator.mode(), Mode::PublicOnly);
    assert_eq!(generator.advisories(), &[Advisory::InsecureConfiguration]);
    assert_eq!(
        generator.generate_address(0, 0).unwrap().address.as_str(),
        FIRST_RECEIVE_ADDRESS
    );
}

#[test]
fn missing_key_material_is_a_configuration_error() {
    assert!(matches!(
        AddressGenerator::from_config(&KeyMaterialConfig::default()),
        Err(CustodyError::Configuration)
    ));
}

#[test]
fn concurrent_generation_is_consistent() {
    let generator = Arc::new(xpub_generator());
    let expected: Vec<String> = (0..50)
        .map(|l| generator.generate_address(7, l).unwrap().address.into_string())
        .collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                scope.spawn(move || {
                    (0..50)
                        .map(|l| generator.generate_address(7, l).unwrap().address.into_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
