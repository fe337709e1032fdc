//! Recoverable secp256k1 signatures over keccak256 of concatenated fields.
//!
//! Used by legacy user messages and by the node handshake.

use alloy::primitives::{keccak256, Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use thiserror::Error;

/// Length of a raw `r ‖ s ‖ v` signature.
pub const SIGNATURE_LEN: usize = 65;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signing failed: {0}")]
    Sign(String),

    #[error("invalid signature: {0}")]
    Invalid(String),

    #[error("signer recovery failed: {0}")]
    Recover(String),
}

/// Hash of the concatenation of `parts`.
pub fn digest(parts: &[&[u8]]) -> B256 {
    keccak256(parts.concat())
}

/// Sign the keccak256 digest of the concatenated parts.
pub fn sign_data(signer: &PrivateKeySigner, parts: &[&[u8]]) -> Result<[u8; SIGNATURE_LEN], SignatureError> {
    let signature = signer
        .sign_hash_sync(&digest(parts))
        .map_err(|e| SignatureError::Sign(e.to_string()))?;
    Ok(signature.as_bytes())
}

/// Recover the address that produced `signature` over the concatenated parts.
pub fn recover_signer(signature: &[u8], parts: &[&[u8]]) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignatureError::Invalid(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }
    let signature = Signature::from_raw(signature).map_err(|e| SignatureError::Invalid(e.to_string()))?;
    signature
        .recover_address_from_prehash(&digest(parts))
        .map_err(|e| SignatureError::Recover(e.to_string()))
}

/// Copy `value` into a zero-padded buffer of `len` bytes (truncating).
pub fn aligned(value: &str, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let bytes = value.as_bytes();
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil's first account; publicly known, test use only.
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_sign_and_recover() {
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let signature = sign_data(&signer, &[b"hello", b"world"]).unwrap();
        let recovered = recover_signer(&signature, &[b"hello", b"world"]).unwrap();
        assert_eq!(recovered, signer.address());
        assert_eq!(
            recovered.to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_recover_different_data_yields_other_address() {
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let signature = sign_data(&signer, &[b"hello"]).unwrap();
        let recovered = recover_signer(&signature, &[b"hellO"]).unwrap_or(Address::ZERO);
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn test_recover_rejects_short_signature() {
        assert!(matches!(recover_signer(&[0u8; 10], &[b"x"]), Err(SignatureError::Invalid(_))));
    }

    #[test]
    fn test_aligned_pads_and_truncates() {
        assert_eq!(aligned("ab", 4), vec![b'a', b'b', 0, 0]);
        assert_eq!(aligned("abcdef", 4), b"abcd".to_vec());
    }
}
