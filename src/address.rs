//! P2TR Address Encoding (BIP350)
//!
//! Witness version 1, 32-byte program, bech32m checksum. Only mainnet (`bc`)
//! is issued by this service.

use std::fmt;

use bech32::{hrp, segwit, Hrp};
use bitcoin::Network;
use secp256k1::XOnlyPublicKey;
use serde::Serialize;

use crate::custody::CustodyError;

/// Witness program length for a Taproot output
const P2TR_PROGRAM_LEN: usize = 32;

/// An encoded `bc1p...` address. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaprootAddress(String);

impl TaprootAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TaprootAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaprootAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Human readable part for a network
fn hrp_for(network: Network) -> Result<Hrp, CustodyError> {
    match network {
        Network::Bitcoin => Ok(hrp::BC),
        other => Err(CustodyError::Encoding(format!(
            "unsupported network: {}",
            other
        ))),
    }
}

/// Encode an output key as a witness v1 address
pub fn encode_p2tr(
    output_key: &XOnlyPublicKey,
    network: Network,
) -> Result<TaprootAddress, CustodyError> {
    let hrp = hrp_for(network)?;
    segwit::encode_v1(hrp, &output_key.serialize())
        .map(TaprootAddress)
        .map_err(|e| CustodyError::Encoding(e.to_string()))
}

/// Decode a witness v1 address back to its 32-byte program
pub fn decode_p2tr(address: &str, network: Network) -> Result<[u8; 32], CustodyError> {
    let expected_hrp = hrp_for(network)?;

    let (hrp, version, program) =
        segwit::decode(address).map_err(|e| CustodyError::Encoding(e.to_string()))?;

    if hrp != expected_hrp {
        return Err(CustodyError::Encoding(format!(
            "wrong human readable part: {}",
            hrp
        )));
    }
    if version != segwit::VERSION_1 {
        return Err(CustodyError::Encoding(format!(
            "expected witness version 1, got {}",
            version.to_u8()
        )));
    }
    if program.len() != P2TR_PROGRAM_LEN {
        return Err(CustodyError::Encoding(format!(
            "expected {} byte program, got {}",
            P2TR_PROGRAM_LEN,
            program.len()
        )));
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&program);
    Ok(out)
}
