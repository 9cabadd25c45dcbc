//! Canonical query serialization and HMAC signing.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Characters `encodeURIComponent` leaves as-is but `urlencoding` escapes.
const SUB_DELIMS: [(&str, &str); 5] = [
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
];

/// Percent-encodes a value in the gateway's form encoding.
///
/// Matches `encodeURIComponent` with space as `+`: `A-Z a-z 0-9 - _ . ~`
/// and `! ' ( ) *` pass through, everything else is `%XX` over its UTF-8
/// bytes.
pub fn encode_value(value: &str) -> String {
    let mut encoded = urlencoding::encode(value).replace("%20", "+");
    for (escaped, raw) in SUB_DELIMS {
        encoded = encoded.replace(escaped, raw);
    }
    encoded
}

/// Sorted `key=value` pairs joined by `&`. Empty values are dropped.
pub fn canonical_query(params: &BTreeMap<&str, &str>) -> String {
    params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex HMAC-SHA-512 of `data`.
pub fn hmac_sha512_hex(secret: &str, data: &str) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_value() {
        assert_eq!(encode_value("Thanh toan"), "Thanh+toan");
        assert_eq!(encode_value("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_value("http://x/y?z=1"), "http%3A%2F%2Fx%2Fy%3Fz%3D1");
        assert_eq!(encode_value("đ"), "%C4%91");
    }

    #[test]
    fn test_encode_value_keeps_uri_component_marks() {
        assert_eq!(encode_value("Don (2h)!"), "Don+(2h)!");
        assert_eq!(encode_value("it's*"), "it's*");
        // A literal percent sign is still escaped first.
        assert_eq!(encode_value("%21"), "%2521");
    }

    #[test]
    fn test_canonical_query_sorts_and_drops_empty() {
        let params = BTreeMap::from([("b", "2"), ("a", "1"), ("c", "")]);
        assert_eq!(canonical_query(&params), "a=1&b=2");
    }

    #[test]
    fn test_hmac_is_lowercase_hex() {
        let digest = hmac_sha512_hex("key", "data");
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
