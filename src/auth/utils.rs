//! Small helpers for registration input and verification codes.

use once_cell::sync::Lazy;
use rand::{rngs::OsRng, Rng};
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of decimal digits in a verification code.
pub const VERIFICATION_CODE_DIGITS: usize = 4;
const VERIFICATION_CODE_SPACE: u32 = 10_u32.pow(VERIFICATION_CODE_DIGITS as u32);

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Draw a zero-padded decimal code uniformly from the OS random source.
pub(crate) fn generate_verification_code() -> String {
    let value = OsRng.gen_range(0..VERIFICATION_CODE_SPACE);
    format!("{value:0width$}", width = VERIFICATION_CODE_DIGITS)
}

/// Build the link included in verification emails.
pub(crate) fn build_verify_url(frontend_base_url: &str, code: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify?code={code}")
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
