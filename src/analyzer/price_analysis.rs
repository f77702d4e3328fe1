use crate::analyzer::changes::derive;
use crate::analyzer::distribution::{exceedances, summarize, BinSpec, DEFAULT_THRESHOLDS};
use crate::analyzer::zscore::build_z_scores;
use crate::model::{AnalysisError, AnalysisResult, ChangeKind, DateRange, MarketIndex, PricePoint};
use tracing::{debug, warn};

/// Trait defining the interface for a price-change distribution analyzer.
pub trait Analyzer: Send + Sync {
    /// Runs derive -> summarize -> z-scores -> tail table over one price series.
    fn analyze_prices(
        &self,
        index: MarketIndex,
        range: DateRange,
        kind: ChangeKind,
        prices: &[PricePoint],
    ) -> Result<AnalysisResult, AnalysisError>;
}

/// Implementation of the distribution analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerImpl {
    bins: BinSpec,
    thresholds: Vec<f64>,
}

impl AnalyzerImpl {
    pub fn new(bins: BinSpec) -> Self {
        Self {
            bins,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.thresholds = thresholds;
        self
    }
}

impl Default for AnalyzerImpl {
    fn default() -> Self {
        Self::new(BinSpec::default())
    }
}

impl Analyzer for AnalyzerImpl {
    fn analyze_prices(
        &self,
        index: MarketIndex,
        range: DateRange,
        kind: ChangeKind,
        prices: &[PricePoint],
    ) -> Result<AnalysisResult, AnalysisError> {
        let changes = derive(prices, kind)?;
        for rejected in &changes.rejected {
            warn!(
                "{} {}: skipping {} ({})",
                index, kind, rejected.date, rejected.reason
            );
        }

        let distribution = summarize(&changes, &self.bins)?;
        let z_scores = build_z_scores(&changes, &distribution.summary);
        let exceedances = exceedances(&z_scores, &self.thresholds);

        debug!(
            "{} {}: n = {}, mean = {:.6}, stdev = {:.6}, status = {}",
            index,
            kind,
            distribution.summary.count,
            distribution.summary.mean,
            distribution.summary.stdev,
            distribution.status.label()
        );

        Ok(AnalysisResult {
            index,
            change_kind: kind,
            requested_range: range,
            summary: distribution.summary,
            bins: distribution.bins,
            z_scores,
            exceedances,
            rejected: changes.rejected,
            status: distribution.status,
        })
    }
}
