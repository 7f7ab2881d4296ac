use std::time::{Duration, SystemTime, UNIX_EPOCH};

use {thiserror::Error, tracing::debug};

use crate::{
    code::{OTP_LENGTH, generate_numeric},
    store::SqliteOtpStore,
};

/// How long a generated code stays valid.
pub const OTP_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no verification code found")]
    NotFound,
    #[error("verification code does not match")]
    Mismatch,
    #[error("verification code expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Issues and verifies codes against the record store. One live record per
/// receiver; generate overwrites, verify consumes.
pub struct OtpService {
    store: SqliteOtpStore,
}

impl OtpService {
    pub fn new(store: SqliteOtpStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SqliteOtpStore {
        &self.store
    }

    /// Generate a code for `phone`, upserting its record.
    pub async fn issue(&self, phone: &str) -> Result<String, sqlx::Error> {
        let code = generate_numeric(OTP_LENGTH, phone);
        self.store.put(phone, &code, now_ms()).await?;
        debug!(phone = %phone, "otp issued");
        Ok(code)
    }

    /// Verify `code` for `phone`. Succeeds only when a record exists, the
    /// code matches exactly, and the record is within the TTL; the record
    /// is deleted on success and on success only.
    pub async fn verify(&self, phone: &str, code: &str) -> Result<(), VerifyError> {
        self.verify_at(phone, code, now_ms()).await
    }

    /// Verification against an explicit clock, for tests.
    pub async fn verify_at(&self, phone: &str, code: &str, now_ms: u64) -> Result<(), VerifyError> {
        let record = self.store.get(phone).await?.ok_or(VerifyError::NotFound)?;

        let age = now_ms.saturating_sub(record.issued_at_ms);
        if age > OTP_TTL.as_millis() as u64 {
            // Expired records stay on disk; the next generate overwrites.
            return Err(VerifyError::Expired);
        }
        if record.code != code {
            return Err(VerifyError::Mismatch);
        }

        self.store.delete(phone).await?;
        debug!(phone = %phone, "otp consumed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::render_template;

    async fn service() -> OtpService {
        OtpService::new(SqliteOtpStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn verify_consumes_exactly_once() {
        let svc = service().await;
        let code = svc.issue("628123").await.unwrap();

        svc.verify("628123", &code).await.unwrap();
        // The record is gone, so the same correct code now fails.
        assert!(matches!(
            svc.verify("628123", &code).await,
            Err(VerifyError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_code_fails_without_consuming() {
        let svc = service().await;
        svc.store.put("628123", "123456", 0).await.unwrap();

        let late = OTP_TTL.as_millis() as u64 + 1;
        assert!(matches!(
            svc.verify_at("628123", "123456", late).await,
            Err(VerifyError::Expired)
        ));
        // Record survives the failed attempt.
        assert!(svc.store.get("628123").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mismatched_code_fails_and_keeps_record() {
        let svc = service().await;
        let code = svc.issue("628123").await.unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        assert!(matches!(
            svc.verify("628123", wrong).await,
            Err(VerifyError::Mismatch)
        ));
        svc.verify("628123", &code).await.unwrap();
    }

    #[tokio::test]
    async fn generate_and_verify_scenario() {
        let svc = service().await;

        let code = svc.issue("628123").await.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let message = render_template("Code: {otp}", &code);
        assert_eq!(message, format!("Code: {code}"));

        // Exactly one record exists for the receiver.
        assert!(svc.store.get("628123").await.unwrap().is_some());

        svc.verify("628123", &code).await.unwrap();
        assert!(svc.store.get("628123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn regenerate_overwrites_previous_code() {
        let svc = service().await;
        let first = svc.issue("628123").await.unwrap();
        let second = svc.issue("628123").await.unwrap();

        if first != second {
            assert!(matches!(
                svc.verify("628123", &first).await,
                Err(VerifyError::Mismatch)
            ));
        }
        svc.verify("628123", &second).await.unwrap();
    }
}
