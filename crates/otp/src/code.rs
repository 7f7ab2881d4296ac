use rand::RngCore;

/// Digits in a generated code.
pub const OTP_LENGTH: usize = 6;

/// Placeholder substituted with the code when rendering a message.
pub const OTP_PLACEHOLDER: &str = "{otp}";

/// Generate a numeric code of `length` digits. Random bytes are mixed with
/// the salt (the receiver identifier) before digit mapping, so two
/// receivers never share a byte stream.
pub fn generate_numeric(length: usize, salt: &str) -> String {
    const DIGITS: &[u8] = b"0123456789";

    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);

    let salt_bytes = salt.as_bytes();
    if !salt_bytes.is_empty() {
        for (i, b) in bytes.iter_mut().enumerate() {
            *b ^= salt_bytes[i % salt_bytes.len()];
        }
    }

    bytes
        .iter()
        .map(|b| DIGITS[*b as usize % DIGITS.len()] as char)
        .collect()
}

/// Substitute the `{otp}` placeholder in a message template. A template
/// without the placeholder falls back to the bare code, so the code always
/// reaches the receiver.
pub fn render_template(message: &str, code: &str) -> String {
    if message.contains(OTP_PLACEHOLDER) {
        message.replace(OTP_PLACEHOLDER, code)
    } else {
        code.to_string()
    }
}
