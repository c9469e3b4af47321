//! Document parsers
//!
//! The import engine only depends on the `DocumentParser` trait; the JSON
//! parser here reads the JSON rendition of the package model.

use super::package::Package;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Document is empty")]
    Empty,

    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Package has no id")]
    MissingPackageId,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Turns raw bytes into the typed node graph
pub trait DocumentParser {
    fn parse(&self, data: &[u8]) -> ParseResult<Package>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentParser;

impl JsonDocumentParser {
    pub fn new() -> Self {
        JsonDocumentParser
    }
}

impl DocumentParser for JsonDocumentParser {
    fn parse(&self, data: &[u8]) -> ParseResult<Package> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }

        let package: Package = serde_json::from_slice(data)?;
        if package.id.trim().is_empty() {
            return Err(ParseError::MissingPackageId);
        }

        debug!(
            package = %package.id,
            indicators = package.indicators.len(),
            observables = package.observables.len(),
            threat_actors = package.threat_actors.len(),
            "Parsed document"
        );
        Ok(package)
    }
}
