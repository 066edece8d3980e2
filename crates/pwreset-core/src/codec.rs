//! Password attribute wire encoding.
//!
//! Active Directory only accepts writes to `unicodePwd` when the value is the password wrapped
//! in double quotes and encoded as UTF-16LE. The framing has to be exact: the directory compares
//! bytes, so a missing quote or a big-endian unit is rejected as a constraint violation.

/// Encodes a plaintext password for a password-attribute write.
///
/// The plaintext is surrounded with `"` and every UTF-16 code unit of the result is emitted
/// little-endian. Characters outside the BMP become surrogate pairs.
#[must_use]
pub fn encode_password(plaintext: &str) -> Vec<u8> {
    std::iter::once('"')
        .chain(plaintext.chars())
        .chain(std::iter::once('"'))
        .collect::<String>()
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect()
}
