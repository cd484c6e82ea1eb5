//! Error types for offer processing

use thiserror::Error;

/// Result type for offer processing
pub type Result<T> = std::result::Result<T, OfferError>;

/// Document-level failures. Row-level anomalies never surface here.
#[derive(Debug, Error)]
pub enum OfferError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The package parsed but does not look like a workbook
    #[error("Invalid XLSX format: {0}")]
    InvalidFormat(String),

    /// Missing required part
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// Maximum increase outside the accepted bounds
    #[error("Invalid maximum increase {max}%: must be a finite value of at least {min}%")]
    InvalidIncrease { max: f64, min: f64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<quick_xml::events::attributes::AttrError> for OfferError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OfferError::Xml(err.into())
    }
}

impl From<std::string::FromUtf8Error> for OfferError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        OfferError::InvalidFormat(format!("part is not valid UTF-8: {err}"))
    }
}
