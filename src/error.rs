use thiserror::Error;

/// Faults of monohook itself.
///
/// A step whose command exits non-zero is not an `Error`; that is reported as
/// [`crate::step::Outcome::Failure`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid onlyOn pattern {pattern:?} for step {step}: {source}")]
    InvalidPattern {
        step: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("Invalid command for step {step}: {reason}")]
    InvalidCommand { step: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
