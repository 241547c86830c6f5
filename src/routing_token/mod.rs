//! Opaque routing tokens for service identifiers
//!
//! Service keys such as `PERMIS_CONSTRUIRE` are shown in URLs as a scrambled
//! token so the address bar does not spell them out. This is obfuscation and
//! nothing more: the key is public and anyone can reverse a token.
//!
//! Layout: `<hex of key-xored UTF-16 units>-<checksum>`, where the checksum is
//! the 31-multiplier rolling hash of the plain identifier in 32-bit signed
//! arithmetic, printed as the hex of its absolute value.

const KEY: &str = "municipality-service-2024";
const SEPARATOR: char = '-';

fn key_units() -> Vec<u16> {
    KEY.encode_utf16().collect()
}

fn checksum(value: &str) -> String {
    let hash = value.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    });
    format!("{:x}", i64::from(hash).abs())
}

/// Token for a service identifier
pub fn encode(value: &str) -> String {
    let key = key_units();
    let scrambled: String = value
        .encode_utf16()
        .enumerate()
        .map(|(i, unit)| format!("{:02x}", unit ^ key[i % key.len()]))
        .collect();
    format!("{}{}{}", scrambled, SEPARATOR, checksum(value))
}

/// Identifier for a token, or `None` if the token is malformed or its
/// checksum does not match
pub fn decode(token: &str) -> Option<String> {
    let mut parts = token.split(SEPARATOR);
    let (scrambled, hash) = (parts.next()?, parts.next()?);
    if parts.next().is_some()
        || scrambled.is_empty()
        || scrambled.len() % 2 != 0
        || !scrambled.is_ascii()
    {
        return None;
    }

    let key = key_units();
    let units = (0..scrambled.len())
        .step_by(2)
        .enumerate()
        .map(|(i, offset)| {
            u16::from_str_radix(&scrambled[offset..offset + 2], 16)
                .ok()
                .map(|unit| unit ^ key[i % key.len()])
        })
        .collect::<Option<Vec<u16>>>()?;
    let value = String::from_utf16(&units).ok()?;

    (checksum(&value) == hash).then_some(value)
}

/// True when `raw` has the two-part token shape
pub fn looks_like_token(raw: &str) -> bool {
    raw.split(SEPARATOR).count() == 2
}

/// Resolve a URL parameter that may be either a token or a plain identifier
pub fn resolve(raw: &str) -> Option<String> {
    if looks_like_token(raw) {
        decode(raw)
    } else {
        Some(raw.to_string())
    }
}
