//! Quote document rendering seam.

use async_trait::async_trait;
use thiserror::Error;

use agroquote_core::domain::records::QuoteRecord;

#[derive(Debug, Error)]
#[error("quote rendering failed: {0}")]
pub struct RenderError(pub String);

/// A rendered quote ready to upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedQuote {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

#[async_trait]
pub trait QuoteRenderer: Send + Sync {
    /// `Ok(None)` when this renderer produces no document.
    async fn render(&self, quote: &QuoteRecord) -> Result<Option<RenderedQuote>, RenderError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRenderer;

#[async_trait]
impl QuoteRenderer for NoopRenderer {
    async fn render(&self, _quote: &QuoteRecord) -> Result<Option<RenderedQuote>, RenderError> {
        Ok(None)
    }
}
