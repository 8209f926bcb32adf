//! Invocation-level errors and their status codes.

use crate::core::errors::OCRError;
use std::fmt;
use thiserror::Error;

/// Why an object could not be fetched from external storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalCause {
    /// The object or bucket does not exist.
    NotFound,
    /// Credentials were rejected or lack access.
    PermissionDenied,
    /// The URI cannot be routed to a store.
    InvalidUri,
    /// The store failed or could not be reached.
    Unavailable,
}

impl RetrievalCause {
    /// HTTP-style status reported for this cause.
    pub fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::PermissionDenied => 403,
            Self::InvalidUri => 400,
            Self::Unavailable => 502,
        }
    }
}

impl fmt::Display for RetrievalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound => "object not found",
            Self::PermissionDenied => "access denied",
            Self::InvalidUri => "invalid storage URI",
            Self::Unavailable => "storage unavailable",
        };
        f.write_str(text)
    }
}

/// Error raised while serving one invocation. Nothing is retried.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Bad or missing input.
    #[error("{message}")]
    Validation { message: String },

    /// External storage fetch failure.
    #[error("cannot retrieve {uri}: {cause}")]
    Retrieval {
        uri: String,
        cause: RetrievalCause,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Rendering, detection or recognition failure.
    #[error("{}", processing_message(*page))]
    Processing {
        page: Option<u32>,
        #[source]
        source: OCRError,
    },
}

fn processing_message(page: Option<u32>) -> String {
    match page {
        Some(page) => format!("internal error while processing page {page}"),
        None => "internal error while processing the document".to_string(),
    }
}

impl InvocationError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a retrieval error.
    pub fn retrieval<E>(uri: impl Into<String>, cause: RetrievalCause, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Retrieval {
            uri: uri.into(),
            cause,
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Creates a processing error, optionally tied to a page.
    pub fn processing(page: Option<u32>, source: OCRError) -> Self {
        Self::Processing { page, source }
    }

    /// Status code reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Retrieval { cause, .. } => cause.status_code(),
            Self::Processing { .. } => 500,
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Processing errors only name the page; their cause is logged instead.
    pub fn public_message(&self) -> String {
        self.to_string()
    }

    /// Full cause chain, for logs.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ProcessingStage, SimpleError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(InvocationError::validation("bad").status_code(), 400);
        let cases = [
            (RetrievalCause::NotFound, 404),
            (RetrievalCause::PermissionDenied, 403),
            (RetrievalCause::InvalidUri, 400),
            (RetrievalCause::Unavailable, 502),
        ];
        for (cause, status) in cases {
            let err = InvocationError::retrieval("s3://b/k", cause, None::<SimpleError>);
            assert_eq!(err.status_code(), status);
        }
        let err = InvocationError::processing(
            Some(2),
            OCRError::image_processing_error("secret /tmp/ocr-x/page0002.png"),
        );
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_processing_message_hides_cause() {
        let err = InvocationError::processing(
            Some(3),
            OCRError::processing(
                ProcessingStage::TextRecognition,
                "recognizer",
                SimpleError::new("/tmp/ocr-abc/page0003.png exploded"),
            ),
        );
        assert_eq!(err.public_message(), "internal error while processing page 3");
        assert!(err.detailed_message().contains("exploded"));
    }

    #[test]
    fn test_retrieval_message_names_uri() {
        let err = InvocationError::retrieval(
            "s3://bucket/missing.pdf",
            RetrievalCause::NotFound,
            None::<SimpleError>,
        );
        assert_eq!(
            err.public_message(),
            "cannot retrieve s3://bucket/missing.pdf: object not found"
        );
    }
}
