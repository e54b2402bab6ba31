//! PKCE (Proof Key for Code Exchange) per RFC 7636.
//!
//! Used in both directions: generating verifiers for the outbound Xero browser flow and
//! verifying challenges presented to the inbound authorization server.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Code challenge transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeMethod {
    #[default]
    S256,
    Plain,
}

impl ChallengeMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl FromStr for ChallengeMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(AuthError::pkce(format!("Unsupported code_challenge_method: {other}"))),
        }
    }
}

/// Generate a random code verifier (32 bytes, 43 base64url characters).
#[must_use]
pub fn generate_verifier() -> String {
    random_urlsafe(32)
}

/// Generate a random `state` nonce for the authorization request.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(16)
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute `BASE64URL(SHA256(code_verifier))`.
#[must_use]
pub fn compute_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a PKCE S256 code challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    constant_time_eq(compute_challenge(code_verifier).as_bytes(), code_challenge.as_bytes())
}

/// Verify a verifier against a stored challenge using `method`.
pub fn verify(
    method: ChallengeMethod,
    code_verifier: &str,
    code_challenge: &str,
) -> Result<(), AuthError> {
    let matches = match method {
        ChallengeMethod::S256 => verify_s256(code_verifier, code_challenge),
        ChallengeMethod::Plain => {
            constant_time_eq(code_verifier.as_bytes(), code_challenge.as_bytes())
        }
    };

    if matches {
        Ok(())
    } else {
        Err(AuthError::pkce("code_verifier does not match code_challenge"))
    }
}

/// Compare two byte strings without short-circuiting on the first difference.
///
/// Both inputs are hashed first so the comparison time does not depend on length.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let a = Sha256::digest(a);
    let b = Sha256::digest(b);
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256_valid() {
        // RFC 7636 Appendix B test vector
        assert_eq!(compute_challenge(RFC_VERIFIER), RFC_CHALLENGE);
        assert!(verify_s256(RFC_VERIFIER, RFC_CHALLENGE));
    }

    #[test]
    fn test_s256_invalid_verifier() {
        assert!(!verify_s256("wrong-verifier", RFC_CHALLENGE));
    }

    #[test]
    fn test_s256_invalid_challenge() {
        assert!(!verify_s256(RFC_VERIFIER, "wrong-challenge"));
    }

    #[test]
    fn test_plain_method() {
        assert!(verify(ChallengeMethod::Plain, "abc", "abc").is_ok());
        assert!(verify(ChallengeMethod::Plain, "abc", "abd").is_err());
    }

    #[test]
    fn test_unsupported_method() {
        let err = "S512".parse::<ChallengeMethod>().unwrap_err();
        assert!(matches!(err, AuthError::PkceVerification(ref m) if m.contains("Unsupported")));
    }

    #[test]
    fn test_generated_values() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 43);
        assert_ne!(verifier, generate_verifier());
        assert_ne!(generate_state(), generate_state());
        assert!(verify(ChallengeMethod::S256, &verifier, &compute_challenge(&verifier)).is_ok());
    }
}
