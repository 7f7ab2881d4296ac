use std::path::Path;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

/// One pending verification code for a phone-like identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub phone: String,
    pub code: String,
    pub issued_at_ms: u64,
}

#[derive(sqlx::FromRow)]
struct OtpRow {
    phone: String,
    code: String,
    issued_at_ms: i64,
}

impl From<OtpRow> for OtpRecord {
    fn from(r: OtpRow) -> Self {
        Self {
            phone: r.phone,
            code: r.code,
            issued_at_ms: r.issued_at_ms as u64,
        }
    }
}

/// Sqlite-backed OTP record store, keyed by phone identifier.
pub struct SqliteOtpStore {
    pool: SqlitePool,
}

impl SqliteOtpStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `path` and run init.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// In-memory store, for tests. A single pooled connection keeps every
    /// query on the same in-memory database.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Create the `otp_records` table if it doesn't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS otp_records (
                phone        TEXT PRIMARY KEY,
                code         TEXT NOT NULL,
                issued_at_ms INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, phone: &str) -> Result<Option<OtpRecord>, sqlx::Error> {
        let row =
            sqlx::query_as::<_, OtpRow>("SELECT * FROM otp_records WHERE phone = ?")
                .bind(phone)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    /// Insert or overwrite the record for `phone`.
    pub async fn put(
        &self,
        phone: &str,
        code: &str,
        issued_at_ms: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO otp_records (phone, code, issued_at_ms)
               VALUES (?, ?, ?)
               ON CONFLICT(phone) DO UPDATE SET
                 code = excluded.code,
                 issued_at_ms = excluded.issued_at_ms"#,
        )
        .bind(phone)
        .bind(code)
        .bind(issued_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, phone: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM otp_records WHERE phone = ?")
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
