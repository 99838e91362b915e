use crate::models::instrument::{Instrument, Market};
use crate::models::quote::{RawExchangeFields, RawQuoteFields};
use crate::errors::Result;
use async_trait::async_trait;

/// Base trait for quote page sources
///
/// Implementations only locate text fragments on a page; normalization is
/// left to the extractor.
#[async_trait]
pub trait QuotePageSource {
    /// Get the name of the site this source reads from
    fn source_name(&self) -> &'static str;

    /// Fetch the raw quote fragments for a single instrument code
    async fn fetch_quote_fields(&self, code: &str) -> Result<RawQuoteFields>;

    /// Fetch the raw exchange rate fragments
    async fn fetch_exchange_fields(&self) -> Result<RawExchangeFields>;

    /// Fetch one page of the market listing used to build the code directory.
    /// An empty result means the listing has no more pages.
    async fn fetch_listing_page(&self, market: Market, page: u32) -> Result<Vec<Instrument>>;
}
