pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock, day_index, next_rollover, time_until_rollover};

use crate::error::IdentityError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

/// Length of a derived identity token in hex characters.
pub const TOKEN_LEN: usize = 32;

/// A derived per-domain, per-day pseudonym.
///
/// Always exactly [`TOKEN_LEN`] lowercase hex characters, which makes it a
/// valid DNS label for `https://{token}.{app_domain}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let well_formed = raw.len() == TOKEN_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdentityError::MalformedToken(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdentityToken {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdentityToken> for String {
    fn from(token: IdentityToken) -> Self {
        token.0
    }
}

/// Derive the identity token for `(user_id, domain, day)` keyed by `secret`.
///
/// The message is `user_id`, `domain` and the decimal day index concatenated
/// without separators; the consent server computes the same string.
pub fn derive_identity(
    user_id: &str,
    secret: &str,
    domain: &str,
    day: i64,
) -> Result<IdentityToken, IdentityError> {
    let digest = hmac_sha256(secret.as_bytes(), &message(user_id, domain, day))?;
    let mut encoded = hex::encode(digest);
    encoded.truncate(TOKEN_LEN);
    Ok(IdentityToken(encoded))
}

/// Check a presented token against the one derived for `(user_id, domain, day)`.
pub fn verify_identity(
    user_id: &str,
    secret: &str,
    domain: &str,
    day: i64,
    presented: &str,
) -> Result<bool, IdentityError> {
    let expected = derive_identity(user_id, secret, domain, day)?;
    let presented = presented.as_bytes();
    if presented.len() != TOKEN_LEN {
        return Ok(false);
    }
    Ok(expected.as_str().as_bytes().ct_eq(presented).into())
}

/// Identity URL embedded in the rewritten header: `https://{token}.{app_domain}`.
pub fn identity_url(token: &IdentityToken, app_domain: &str) -> String {
    format!("https://{token}.{app_domain}")
}

fn message(user_id: &str, domain: &str, day: i64) -> Vec<u8> {
    format!("{user_id}{domain}{day}").into_bytes()
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "abc123";
    const SECRET: &str = "s3cr3t-token-1234567890";

    #[test]
    fn derive_matches_pinned_reference_value() {
        let token = derive_identity(USER, SECRET, "example.com", 19_800).unwrap();
        assert_eq!(token.as_str(), "9f2ffb48ead1fa457535b77b582f0f70");
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_identity(USER, SECRET, "example.com", 19_800).unwrap();
        let b = derive_identity(USER, SECRET, "example.com", 19_800).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_rotates_with_day() {
        let today = derive_identity(USER, SECRET, "example.com", 19_800).unwrap();
        let tomorrow = derive_identity(USER, SECRET, "example.com", 19_801).unwrap();
        assert_ne!(today, tomorrow);
        assert_eq!(tomorrow.as_str(), "264ee8a172be9f708801bed68d1b91ee");
    }

    #[test]
    fn derive_differs_per_domain_and_secret() {
        let base = derive_identity(USER, SECRET, "example.com", 19_800).unwrap();
        let other_domain = derive_identity(USER, SECRET, "example.org", 19_800).unwrap();
        let other_secret = derive_identity(USER, "another", "example.com", 19_800).unwrap();
        assert_ne!(base, other_domain);
        assert_ne!(base, other_secret);
    }

    #[test]
    fn derive_accepts_empty_secret() {
        let token = derive_identity(USER, "", "example.com", 19_800).unwrap();
        assert_eq!(token.as_str(), "e5abfbd9bec984ac56ad3311ddf985f5");
    }

    #[test]
    fn token_is_lowercase_hex_dns_label() {
        for day in [0, 1, 19_800, i64::from(u32::MAX)] {
            let token = derive_identity(USER, SECRET, "a.example", day).unwrap();
            assert_eq!(token.as_str().len(), TOKEN_LEN);
            assert!(
                token
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            );
        }
    }

    #[test]
    fn parse_rejects_uppercase_and_wrong_length() {
        assert!(IdentityToken::parse("9F2FFB48EAD1FA457535B77B582F0F70").is_err());
        assert!(IdentityToken::parse("9f2ffb48").is_err());
        assert!(IdentityToken::parse("9f2ffb48ead1fa457535b77b582f0f70").is_ok());
    }

    #[test]
    fn token_deserialization_validates() {
        let ok: IdentityToken =
            serde_json::from_str("\"9f2ffb48ead1fa457535b77b582f0f70\"").unwrap();
        assert_eq!(ok.as_str(), "9f2ffb48ead1fa457535b77b582f0f70");
        assert!(serde_json::from_str::<IdentityToken>("\"not-a-token\"").is_err());
    }

    #[test]
    fn verify_accepts_only_the_derived_token() {
        assert!(
            verify_identity(
                USER,
                SECRET,
                "example.com",
                19_800,
                "9f2ffb48ead1fa457535b77b582f0f70"
            )
            .unwrap()
        );
        assert!(
            !verify_identity(
                USER,
                SECRET,
                "example.com",
                19_801,
                "9f2ffb48ead1fa457535b77b582f0f70"
            )
            .unwrap()
        );
        assert!(!verify_identity(USER, SECRET, "example.com", 19_800, "short").unwrap());
    }

    #[test]
    fn identity_url_prefixes_app_domain() {
        let token = derive_identity(USER, SECRET, "example.com", 19_800).unwrap();
        assert_eq!(
            identity_url(&token, "openpims.de"),
            "https://9f2ffb48ead1fa457535b77b582f0f70.openpims.de"
        );
    }
}
