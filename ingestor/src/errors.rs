use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Unexpected upstream payload: {0}")]
    UnexpectedPayload(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid mail address: {0}")]
    MailAddress(#[from] lettre::address::AddressError),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

impl Error {
    /// Errors raised while retrieving the upstream snapshot.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::UnexpectedPayload(_))
    }

    /// Errors raised while writing a batch.
    pub fn is_persist(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
