//! Authorization header values.
//!
//! `websocket:<base64url(connection_nonce)>:<hex counter>`, where the counter
//! is lowercase hex without `0x` or padding and keeps a leading `-` when
//! negative. Subscriber tokens count down from -1 and broadcaster tokens
//! count up from 1; every authorized frame consumes one value.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::digest::NONCE_LEN;

/// Scheme prefix of every token.
pub const AUTHORIZATION_SCHEME: &str = "websocket";

/// Formats a counter the way tokens carry it: `-1a`, `10ffffffffffffff`.
pub fn format_counter(counter: i64) -> String {
    if counter < 0 {
        format!("-{:x}", counter.unsigned_abs())
    } else {
        format!("{counter:x}")
    }
}

/// Parses a counter produced by [`format_counter`].
pub fn parse_counter(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || digits.starts_with('+') {
        return None;
    }
    let magnitude = u64::from_str_radix(digits, 16).ok()?;
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Builds the token for one authorized frame.
pub fn authorization_value(connection_nonce: &[u8; NONCE_LEN], counter: i64) -> String {
    format!(
        "{AUTHORIZATION_SCHEME}:{}:{}",
        URL_SAFE_NO_PAD.encode(connection_nonce),
        format_counter(counter)
    )
}

/// A token split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthorization {
    pub connection_nonce: Vec<u8>,
    pub counter: i64,
}

/// Splits a token back into nonce and counter. Used for diagnostics; peers
/// verify by comparing against the token they expect.
pub fn parse_authorization(value: &str) -> Option<ParsedAuthorization> {
    let mut parts = value.splitn(3, ':');
    if parts.next()? != AUTHORIZATION_SCHEME {
        return None;
    }
    let connection_nonce = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
    let counter = parse_counter(parts.next()?)?;
    Some(ParsedAuthorization {
        connection_nonce,
        counter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_formatting() {
        assert_eq!(format_counter(1), "1");
        assert_eq!(format_counter(-1), "-1");
        assert_eq!(format_counter(-26), "-1a");
        assert_eq!(format_counter(0x10ff_ffff_ffff_ffff), "10ffffffffffffff");
        assert_eq!(format_counter(i64::MIN), "-8000000000000000");
    }

    #[test]
    fn counter_parsing() {
        for n in [0, 1, -1, -26, i64::MAX, i64::MIN] {
            assert_eq!(parse_counter(&format_counter(n)), Some(n));
        }
        assert_eq!(parse_counter(""), None);
        assert_eq!(parse_counter("-"), None);
        assert_eq!(parse_counter("0x1"), None);
        assert_eq!(parse_counter("8000000000000000"), None);
    }

    #[test]
    fn token_layout() {
        let nonce = [0u8; NONCE_LEN];
        let token = authorization_value(&nonce, -1);
        assert_eq!(
            token,
            "websocket:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA:-1"
        );

        let parsed = parse_authorization(&token).unwrap();
        assert_eq!(parsed.connection_nonce, nonce.to_vec());
        assert_eq!(parsed.counter, -1);
    }

    #[test]
    fn base64_is_url_safe() {
        let nonce = [0xffu8; NONCE_LEN];
        let token = authorization_value(&nonce, 2);
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
        assert!(token.ends_with(":2"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse_authorization("bearer:AAAA:1").is_none());
        assert!(parse_authorization("websocket:AAAA").is_none());
    }
}
