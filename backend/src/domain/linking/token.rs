//! Invitation tokens, short codes and room invite codes.
//!
//! Raw tokens leave the service exactly once, in the response to the call
//! that minted them. Only their SHA-256 digest is stored or compared.

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::domain::Error;

/// Number of random bytes in an invitation token.
pub const TOKEN_BYTES: usize = 32;
/// Prefix on every invitation short code.
pub const SHORT_CODE_PREFIX: &str = "LZ-";
/// Random characters after the prefix.
pub const SHORT_CODE_LEN: usize = 6;
/// Length of a room invite code.
pub const ROOM_INVITE_CODE_LEN: usize = 8;
/// Unambiguous alphabet: no `0`, `O`, `1` or `I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Default invitation lifetime in days.
pub const DEFAULT_TTL_DAYS: i64 = 7;
/// Longest lifetime an issuer accepts; larger values are clamped.
pub const MAX_TTL_DAYS: i64 = 365;

/// Mints tokens and codes and computes expiries.
///
/// # Examples
/// ```
/// use tandem::domain::linking::TokenIssuer;
///
/// let issuer = TokenIssuer::default();
/// let token = issuer.generate_token();
/// assert_eq!(token.len(), 64);
/// assert_eq!(TokenIssuer::hash_token(&token).len(), 64);
///
/// let code = issuer.generate_short_code();
/// assert!(code.starts_with("LZ-"));
/// assert_eq!(code.len(), 9);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TokenIssuer {
    ttl: TimeDelta,
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::with_ttl_days(DEFAULT_TTL_DAYS)
    }
}

impl TokenIssuer {
    /// Issuer whose expiries lie `days` after issue. Non-positive values
    /// fall back to [`DEFAULT_TTL_DAYS`]; values above [`MAX_TTL_DAYS`] are
    /// clamped.
    #[must_use]
    pub fn with_ttl_days(days: i64) -> Self {
        let days = if days > 0 {
            days.min(MAX_TTL_DAYS)
        } else {
            DEFAULT_TTL_DAYS
        };
        let ttl = TimeDelta::try_days(days).unwrap_or_else(|| TimeDelta::days(DEFAULT_TTL_DAYS));
        Self { ttl }
    }

    /// Lifetime applied by [`Self::calculate_expiration`].
    #[must_use]
    pub const fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// 256 bits from the OS RNG, hex encoded.
    #[must_use]
    pub fn generate_token(&self) -> String {
        let mut bytes = [0_u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// `LZ-` followed by six characters from [`CODE_ALPHABET`].
    #[must_use]
    pub fn generate_short_code(&self) -> String {
        let mut code = String::with_capacity(SHORT_CODE_PREFIX.len() + SHORT_CODE_LEN);
        code.push_str(SHORT_CODE_PREFIX);
        code.push_str(&random_code(SHORT_CODE_LEN));
        code
    }

    /// Eight characters from [`CODE_ALPHABET`].
    #[must_use]
    pub fn generate_room_invite_code(&self) -> String {
        random_code(ROOM_INVITE_CODE_LEN)
    }

    /// `now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the sum leaves chrono's date range.
    pub fn calculate_expiration(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
        now.checked_add_signed(self.ttl)
            .ok_or_else(|| Error::internal("expiry lies outside the representable range"))
    }

    /// Lower-case SHA-256 hex digest of a raw token.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Trim and upper-case a user-typed code before lookup.
    #[must_use]
    pub fn normalize_short_code(code: &str) -> String {
        code.trim().to_ascii_uppercase()
    }

    /// Whether a raw token has the shape produced by [`Self::generate_token`].
    #[must_use]
    pub fn is_well_formed_token(token: &str) -> bool {
        token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

fn random_code(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .filter_map(|_| {
            CODE_ALPHABET
                .get(rng.gen_range(0..CODE_ALPHABET.len()))
                .map(|byte| char::from(*byte))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn issuer() -> TokenIssuer {
        TokenIssuer::default()
    }

    #[rstest]
    fn tokens_are_unique_hex(issuer: TokenIssuer) {
        let first = issuer.generate_token();
        let second = issuer.generate_token();
        assert_ne!(first, second);
        assert!(TokenIssuer::is_well_formed_token(&first));
    }

    #[rstest]
    fn short_codes_use_unambiguous_alphabet(issuer: TokenIssuer) {
        for _ in 0..64 {
            let code = issuer.generate_short_code();
            let suffix = code.strip_prefix(SHORT_CODE_PREFIX).expect("prefix");
            assert_eq!(suffix.len(), SHORT_CODE_LEN);
            assert!(suffix.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!suffix.contains(['0', 'O', '1', 'I']));
        }
    }

    #[rstest]
    fn room_invite_codes_have_fixed_length(issuer: TokenIssuer) {
        let code = issuer.generate_room_invite_code();
        assert_eq!(code.len(), ROOM_INVITE_CODE_LEN);
    }

    #[rstest]
    fn hash_is_sha256_hex() {
        assert_eq!(
            TokenIssuer::hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[rstest]
    #[case(0)]
    #[case(-3)]
    fn non_positive_ttl_falls_back(#[case] days: i64) {
        assert_eq!(
            TokenIssuer::with_ttl_days(days).ttl(),
            TimeDelta::days(DEFAULT_TTL_DAYS)
        );
    }

    #[rstest]
    fn expiration_adds_ttl() {
        let now = Utc::now();
        let issuer = TokenIssuer::with_ttl_days(2);
        assert_eq!(
            issuer.calculate_expiration(now).expect("in range"),
            now + TimeDelta::days(2)
        );
    }

    #[rstest]
    #[case(MAX_TTL_DAYS + 1)]
    #[case(200_000_000)]
    #[case(i64::MAX)]
    fn oversized_ttl_is_clamped(#[case] days: i64) {
        let issuer = TokenIssuer::with_ttl_days(days);
        assert_eq!(issuer.ttl(), TimeDelta::days(MAX_TTL_DAYS));
        let now = Utc::now();
        assert_eq!(
            issuer.calculate_expiration(now).expect("in range"),
            now + TimeDelta::days(MAX_TTL_DAYS)
        );
    }

    #[rstest]
    fn expiration_past_the_calendar_is_an_error(issuer: TokenIssuer) {
        let err = issuer
            .calculate_expiration(DateTime::<Utc>::MAX_UTC)
            .expect_err("overflow");
        assert_eq!(err.code(), crate::domain::ErrorCode::InternalError);
    }

    #[rstest]
    #[case(" lz-abc234 ", "LZ-ABC234")]
    #[case("LZ-XYZ789", "LZ-XYZ789")]
    fn short_codes_are_normalised(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(TokenIssuer::normalize_short_code(raw), expected);
    }

    #[rstest]
    #[case("")]
    #[case("not-a-token")]
    fn malformed_tokens_are_detected(#[case] raw: &str) {
        assert!(!TokenIssuer::is_well_formed_token(raw));
    }
}
