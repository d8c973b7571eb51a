//! Keyed checksums for signed cache entries.
//!
//! Signed entries carry an HMAC-SHA512 of the serialized value under a
//! companion key. The digest is stored hex-encoded, so it stays readable in
//! tools like `redis-cli`.

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::{ChecksumError, CacheResult};

type HmacSha512 = Hmac<Sha512>;

/// Suffix appended to a value key to form its checksum key.
pub const CHECKSUM_KEY_SUFFIX: &str = "-checksum";

/// Companion key holding the checksum of `key`.
pub fn checksum_key(key: &str) -> String {
    format!("{key}{CHECKSUM_KEY_SUFFIX}")
}

fn keyed_mac(secret: &str) -> Result<HmacSha512, ChecksumError> {
    HmacSha512::new_from_slice(secret.as_bytes()).map_err(|e| ChecksumError::InvalidKey {
        reason: e.to_string(),
    })
}

/// Compute the hex-encoded HMAC-SHA512 of `message` under `secret`.
///
/// Accepts anything byte-like, so serialized payloads and textual
/// identifiers are signed the same way.
pub fn compute_checksum(secret: &str, message: impl AsRef<[u8]>) -> CacheResult<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(message.as_ref());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `message` against a stored hex digest.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored digest
/// is not hex at all. Comparison is constant time.
pub fn verify_checksum(
    secret: &str,
    message: impl AsRef<[u8]>,
    expected_hex: &[u8],
) -> CacheResult<bool> {
    let expected = hex::decode(expected_hex).map_err(|e| ChecksumError::MalformedDigest {
        reason: e.to_string(),
    })?;
    let mut mac = keyed_mac(secret)?;
    mac.update(message.as_ref());
    Ok(mac.verify_slice(&expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_is_sha512_sized_hex() {
        let digest = compute_checksum("S", b"payload").unwrap();
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_matches_rfc4231_case_2() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let digest = compute_checksum("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554\
             9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_string_and_bytes_sign_identically() {
        let from_str = compute_checksum("secret", "location_codes").unwrap();
        let from_bytes = compute_checksum("secret", b"location_codes".as_slice()).unwrap();
        assert_eq!(from_str, from_bytes);
    }

    #[test]
    fn test_empty_secret_is_accepted_by_hmac() {
        assert!(compute_checksum("", b"x").is_ok());
    }

    #[test]
    fn test_verify_rejects_garbage_digest() {
        let result = verify_checksum("S", b"payload", b"not-hex!");
        assert!(matches!(
            result,
            Err(crate::CacheError::Checksum(ChecksumError::MalformedDigest { .. }))
        ));
    }

    #[test]
    fn test_checksum_key_suffix() {
        assert_eq!(checksum_key("app:1.0:f"), "app:1.0:f-checksum");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_verify_accepts_own_digest(
            secret in "[a-zA-Z0-9]{1,32}",
            message in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let digest = compute_checksum(&secret, &message).unwrap();
            prop_assert!(verify_checksum(&secret, &message, digest.as_bytes()).unwrap());
        }

        #[test]
        fn prop_flipped_byte_fails_verification(
            message in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
        ) {
            let digest = compute_checksum("S", &message).unwrap();
            let mut tampered = message.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= 0x01;
            prop_assert!(!verify_checksum("S", &tampered, digest.as_bytes()).unwrap());
        }

        #[test]
        fn prop_different_secrets_disagree(message in prop::collection::vec(any::<u8>(), 0..128)) {
            let a = compute_checksum("secret-a", &message).unwrap();
            let b = compute_checksum("secret-b", &message).unwrap();
            prop_assert_ne!(a, b);
        }
    }
}
