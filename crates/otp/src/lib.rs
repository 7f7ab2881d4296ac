//! One-time passcodes: numeric code generation, message templating, and a
//! sqlite-backed record store with exactly-once consumption and expiry.

pub mod code;
pub mod service;
pub mod store;

pub use {
    code::{OTP_LENGTH, OTP_PLACEHOLDER, generate_numeric, render_template},
    service::{OTP_TTL, OtpService, VerifyError},
    store::{OtpRecord, SqliteOtpStore},
};
