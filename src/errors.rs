/*!
 * Error types for the babelbook application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

// Allow dead code - error types are for library consumers
#![allow(dead_code)]

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The run was cancelled before the request was issued
    #[error("Request cancelled")]
    Cancelled,
}

/// Errors that can occur while loading or rebuilding the book container
#[derive(Error, Debug)]
pub enum BookError {
    /// The input file is missing or unreadable
    #[error("Cannot read input: {0}")]
    InputUnreadable(String),

    /// The container archive is malformed
    #[error("Invalid container archive: {0}")]
    InvalidArchive(String),

    /// The book failed structural validation
    #[error("Structural validation failed: {0}")]
    ValidationFailed(String),

    /// A chapter path expected in the extracted archive is missing
    #[error("Chapter path missing in extracted archive: {0}")]
    ChapterPathMissing(String),

    /// Archive assembly failed while saving
    #[error("Failed to assemble output archive: {0}")]
    AssemblyFailed(String),
}

/// Errors that can occur in the translation memory store
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Error opening or migrating the database
    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(String),

    /// Error reading from the store
    #[error("Memory read failed: {0}")]
    ReadFailed(String),

    /// Error writing to the store
    #[error("Memory write failed: {0}")]
    WriteFailed(String),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the translation memory
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// The run was cancelled
    #[error("Translation cancelled")]
    Cancelled,
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from book loading or saving
    #[error("Book error: {0}")]
    Book(#[from] BookError),

    /// Error from the translation memory
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// A precondition violation, e.g. an invalid chapter index
    #[error("Validation error: {0}")]
    Validation(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
