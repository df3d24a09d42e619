//! Sanitizing answers before they are written into a running job.
//!
//! Answers end up inside the job's shell, so only characters that cover
//! confirmation flags, decimal numbers, IP and MAC addresses and short free
//! text are let through.

use crate::error::ResponseRejection;

/// Longest answer accepted, in characters.
pub const MAX_RESPONSE_LEN: usize = 256;

/// Letters, digits, space, `.`, `:` and `-`.
pub fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | ':' | '-')
}

/// Accept `text` iff every character is safe and it is at most
/// [`MAX_RESPONSE_LEN`] characters long.
pub fn validate_response(text: &str) -> Result<(), ResponseRejection> {
    if text.chars().count() > MAX_RESPONSE_LEN {
        return Err(ResponseRejection::TooLong {
            max: MAX_RESPONSE_LEN,
        });
    }
    if !text.chars().all(is_safe_char) {
        return Err(ResponseRejection::UnsafeCharacter);
    }
    Ok(())
}
