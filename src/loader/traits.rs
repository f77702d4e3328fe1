use crate::model::{DateRange, LoaderError, MarketIndex, PricePoint};

/// Source of daily open/close prices for an index.
///
/// Implementations return points sorted ascending with unique dates, and fail with
/// [`LoaderError::EmptyResult`] rather than returning an empty series.
#[async_trait::async_trait]
pub trait PriceLoader: Send + Sync {
    async fn fetch(&self, index: MarketIndex, range: &DateRange) -> Result<Vec<PricePoint>, LoaderError>;
}
