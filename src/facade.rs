use crate::analyzer::Analyzer;
use crate::cache::AnalysisCache;
use crate::loader::PriceLoader;
use crate::model::{
    AnalysisError, AnalysisRequest, AnalysisResult, AnalyzeError, ChangeKind, DateRange,
    LoaderError, MarketIndex, PricePoint,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Single entry point for front ends: load, analyze and cache one index at a time.
pub struct AnalysisFacade {
    loader: Arc<dyn PriceLoader>,
    analyzer: Arc<dyn Analyzer>,
    cache: AnalysisCache,
    fetch_timeout: Duration,
}

impl AnalysisFacade {
    pub fn new(
        loader: Arc<dyn PriceLoader>,
        analyzer: Arc<dyn Analyzer>,
        cache: AnalysisCache,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            loader,
            analyzer,
            cache,
            fetch_timeout,
        }
    }

    pub async fn analyze(
        &self,
        index: MarketIndex,
        range: DateRange,
        kind: ChangeKind,
    ) -> Result<Arc<AnalysisResult>, AnalyzeError> {
        self.analyze_request(AnalysisRequest { index, range, kind })
            .await
    }

    pub async fn analyze_request(
        &self,
        request: AnalysisRequest,
    ) -> Result<Arc<AnalysisResult>, AnalyzeError> {
        let result = self
            .cache
            .get_or_compute(request, || self.compute(request))
            .await
            .map_err(|source| AnalyzeError {
                index: request.index,
                range: request.range,
                kind: request.kind,
                source,
            })?;

        if result.is_degenerate() {
            warn!("{}: zero variance, z-scores are undefined", request);
        }
        Ok(result)
    }

    async fn compute(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let prices = self.load(request).await?;
        info!("{}: loaded {} price points", request, prices.len());
        self.analyzer
            .analyze_prices(request.index, request.range, request.kind, &prices)
    }

    async fn load(&self, request: AnalysisRequest) -> Result<Vec<PricePoint>, LoaderError> {
        let prices = timeout(
            self.fetch_timeout,
            self.loader.fetch(request.index, &request.range),
        )
        .await
        .map_err(|_| LoaderError::Timeout)??;

        if prices.is_empty() {
            return Err(LoaderError::EmptyResult);
        }
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerImpl;
    use crate::cache::FixedClock;
    use crate::model::ZScore;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockLoader {
        prices: Vec<PricePoint>,
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    impl MockLoader {
        fn returning(prices: Vec<PricePoint>) -> Self {
            Self {
                prices,
                calls: AtomicUsize::new(0),
                delay: None,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PriceLoader for MockLoader {
        async fn fetch(&self, index: MarketIndex, _range: &DateRange) -> Result<Vec<PricePoint>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(LoaderError::UnknownSymbol(index.symbol().to_string()));
            }
            Ok(self.prices.clone())
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
    }

    fn range() -> DateRange {
        DateRange::new(d(1), d(30)).unwrap()
    }

    fn example_prices() -> Vec<PricePoint> {
        vec![
            PricePoint { date: d(3), open: 100.0, close: 101.0 },
            PricePoint { date: d(4), open: 101.0, close: 99.0 },
            PricePoint { date: d(5), open: 99.0, close: 100.0 },
        ]
    }

    fn facade(loader: Arc<MockLoader>, clock: Arc<FixedClock>) -> AnalysisFacade {
        AnalysisFacade::new(
            loader,
            Arc::new(AnalyzerImpl::default()),
            AnalysisCache::new(clock),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn second_call_same_day_is_served_from_cache() {
        let loader = Arc::new(MockLoader::returning(example_prices()));
        let clock = Arc::new(FixedClock::new(d(8)));
        let facade = facade(loader.clone(), clock);

        let first = facade.analyze(MarketIndex::Djia, range(), ChangeKind::Intraday).await.unwrap();
        let second = facade.analyze(MarketIndex::Djia, range(), ChangeKind::Intraday).await.unwrap();

        assert_eq!(loader.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn date_rollover_invokes_the_loader_again() {
        let loader = Arc::new(MockLoader::returning(example_prices()));
        let clock = Arc::new(FixedClock::new(d(8)));
        let facade = facade(loader.clone(), clock.clone());

        facade.analyze(MarketIndex::Sp500, range(), ChangeKind::DayOverDay).await.unwrap();
        clock.advance_days(1);
        facade.analyze(MarketIndex::Sp500, range(), ChangeKind::DayOverDay).await.unwrap();

        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn kinds_and_indices_are_cached_separately() {
        let loader = Arc::new(MockLoader::returning(example_prices()));
        let facade = facade(loader.clone(), Arc::new(FixedClock::new(d(8))));

        facade.analyze(MarketIndex::Nasdaq, range(), ChangeKind::Intraday).await.unwrap();
        facade.analyze(MarketIndex::Nasdaq, range(), ChangeKind::DayOverDay).await.unwrap();
        facade.analyze(MarketIndex::Djia, range(), ChangeKind::Intraday).await.unwrap();

        assert_eq!(loader.calls(), 3);
    }

    #[tokio::test]
    async fn end_to_end_example() {
        let loader = Arc::new(MockLoader::returning(example_prices()));
        let facade = facade(loader, Arc::new(FixedClock::new(d(8))));

        let intraday = facade.analyze(MarketIndex::Djia, range(), ChangeKind::Intraday).await.unwrap();
        assert_eq!(intraday.summary.count, 3);
        assert_eq!(intraday.summary.date_range, (d(3), d(5)));
        assert!((intraday.summary.mean - 0.01).abs() < 0.001);
        let total: usize = intraday.bins.iter().map(|b| b.observed_count).sum();
        assert_eq!(total, 3);

        let dod = facade.analyze(MarketIndex::Djia, range(), ChangeKind::DayOverDay).await.unwrap();
        assert_eq!(dod.summary.count, 2);
        assert_eq!(dod.z_scores.len(), 2);
        assert!((dod.summary.mean - (-1.980_198 + 1.010_101) / 2.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn degenerate_series_is_flagged_not_raised() {
        let flat: Vec<PricePoint> = example_prices()
            .into_iter()
            .map(|p| PricePoint { open: 20.0, close: 20.2, ..p })
            .collect();
        let facade = facade(
            Arc::new(MockLoader::returning(flat)),
            Arc::new(FixedClock::new(d(8))),
        );

        let result = facade.analyze(MarketIndex::Nifty50, range(), ChangeKind::Intraday).await.unwrap();
        assert!(result.is_degenerate());
        assert!(result.z_scores.iter().all(|z| z.value == ZScore::Undefined));
    }

    #[tokio::test]
    async fn loader_failure_is_data_unavailable_with_context() {
        let mut loader = MockLoader::returning(Vec::new());
        loader.fail = true;
        let facade = facade(Arc::new(loader), Arc::new(FixedClock::new(d(8))));

        let err = facade.analyze(MarketIndex::Nasdaq, range(), ChangeKind::Intraday).await.unwrap_err();
        assert_eq!(err.index, MarketIndex::Nasdaq);
        assert_eq!(err.range, range());
        assert!(matches!(
            err.source,
            AnalysisError::DataUnavailable(LoaderError::UnknownSymbol(_))
        ));
        assert!(err.to_string().contains("NASDAQ 2025-11-01 to 2025-11-30"));
    }

    #[tokio::test]
    async fn empty_loader_result_is_data_unavailable() {
        let facade = facade(
            Arc::new(MockLoader::returning(Vec::new())),
            Arc::new(FixedClock::new(d(8))),
        );
        let err = facade.analyze(MarketIndex::Djia, range(), ChangeKind::Intraday).await.unwrap_err();
        assert!(matches!(
            err.source,
            AnalysisError::DataUnavailable(LoaderError::EmptyResult)
        ));
    }

    #[tokio::test]
    async fn slow_loader_times_out() {
        let mut loader = MockLoader::returning(example_prices());
        loader.delay = Some(Duration::from_secs(5));
        let facade = facade(Arc::new(loader), Arc::new(FixedClock::new(d(8))));

        let err = facade.analyze(MarketIndex::Sp500, range(), ChangeKind::Intraday).await.unwrap_err();
        assert!(matches!(
            err.source,
            AnalysisError::DataUnavailable(LoaderError::Timeout)
        ));
    }

    #[tokio::test]
    async fn insufficient_data_propagates_as_is() {
        let one = example_prices().into_iter().take(1).collect();
        let loader = Arc::new(MockLoader::returning(one));
        let facade = facade(loader.clone(), Arc::new(FixedClock::new(d(8))));

        let err = facade.analyze(MarketIndex::Djia, range(), ChangeKind::DayOverDay).await.unwrap_err();
        assert!(matches!(
            err.source,
            AnalysisError::InsufficientData { required: 2, actual: 1 }
        ));

        // Failures are not cached.
        let _ = facade.analyze(MarketIndex::Djia, range(), ChangeKind::DayOverDay).await;
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn nan_price_is_rejected_not_propagated() {
        let mut prices = example_prices();
        prices.push(PricePoint { date: d(6), open: 100.0, close: 102.0 });
        prices[1].open = f64::NAN;
        let loader = Arc::new(MockLoader::returning(prices));
        let facade = facade(loader, Arc::new(FixedClock::new(d(8))));

        let result = facade.analyze(MarketIndex::Djia, range(), ChangeKind::Intraday).await.unwrap();
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].date, d(4));
        assert_eq!(result.summary.count, 3);
        assert!(result.summary.mean.is_finite());
        assert!(result.summary.stdev.is_finite() && result.summary.stdev > 0.0);
        assert!(!result.is_degenerate());
        assert!(result.z_scores.iter().all(|z| matches!(z.value, ZScore::Defined(_))));
    }
}
