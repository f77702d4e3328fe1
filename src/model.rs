// Core structs: PricePoint, ChangeSeries, AnalysisResult and the error taxonomy
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Market indices the engine knows how to analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum MarketIndex {
    Djia,
    Sp500,
    Nasdaq,
    Nifty50,
}

impl MarketIndex {
    pub const ALL: [MarketIndex; 4] = [
        MarketIndex::Djia,
        MarketIndex::Sp500,
        MarketIndex::Nasdaq,
        MarketIndex::Nifty50,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MarketIndex::Djia => "DJIA",
            MarketIndex::Sp500 => "SP500",
            MarketIndex::Nasdaq => "NASDAQ",
            MarketIndex::Nifty50 => "NIFTY50",
        }
    }

    /// Symbol used by the upstream market-data provider.
    pub fn symbol(self) -> &'static str {
        match self {
            MarketIndex::Djia => "^DJI",
            MarketIndex::Sp500 => "^GSPC",
            MarketIndex::Nasdaq => "^IXIC",
            MarketIndex::Nifty50 => "^NSEI",
        }
    }
}

impl fmt::Display for MarketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarketIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|index| index.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown market index '{}'", s))
    }
}

impl TryFrom<String> for MarketIndex {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AnalysisError> {
        if start > end {
            return Err(AnalysisError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Open to close of the same session.
    Intraday,
    /// Close to the next session's close.
    DayOverDay,
    /// Natural log of consecutive closes.
    LogDayOverDay,
}

impl ChangeKind {
    /// Fewest price points that yield at least one change.
    pub fn min_prices(self) -> usize {
        match self {
            ChangeKind::Intraday => 1,
            ChangeKind::DayOverDay | ChangeKind::LogDayOverDay => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Intraday => "intraday",
            ChangeKind::DayOverDay => "day_over_day",
            ChangeKind::LogDayOverDay => "log_day_over_day",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One analysis to run: which index, over which dates, on which kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisRequest {
    pub index: MarketIndex,
    pub range: DateRange,
    pub kind: ChangeKind,
}

impl fmt::Display for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.index, self.range, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangePoint {
    pub date: NaiveDate,
    /// Percentage change.
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Zero open or zero prior close.
    ZeroBase,
    /// Zero or negative price where a logarithm is required.
    NonPositivePrice,
    /// NaN or infinite price, or a change that overflowed.
    NonFinite,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ZeroBase => f.write_str("division by zero (zero base price)"),
            RejectReason::NonPositivePrice => f.write_str("non-positive price"),
            RejectReason::NonFinite => f.write_str("non-finite price or change"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedPoint {
    pub date: NaiveDate,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSeries {
    pub kind: ChangeKind,
    pub points: Vec<ChangePoint>,
    pub rejected: Vec<RejectedPoint>,
}

impl ChangeSeries {
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBin {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub observed_count: usize,
    pub expected_count: f64,
}

impl FrequencyBin {
    /// Bins are open below and closed above: a value on an edge belongs to the lower bin.
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower_bound && value <= self.upper_bound
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStatistics {
    pub count: usize,
    /// First and last date of the change series.
    pub date_range: (NaiveDate, NaiveDate),
    pub mean: f64,
    pub stdev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZScore {
    Defined(f64),
    /// Zero variance: no meaningful score exists.
    Undefined,
}

impl ZScore {
    pub fn value(self) -> Option<f64> {
        match self {
            ZScore::Defined(v) => Some(v),
            ZScore::Undefined => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScorePoint {
    pub date: NaiveDate,
    pub value: ZScore,
}

/// Observed vs normal-expected count of |z| above a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailExceedance {
    pub threshold_sigma: f64,
    pub observed_count: usize,
    pub observed_pct: f64,
    pub expected_count: f64,
    pub expected_pct: f64,
}

impl TailExceedance {
    pub fn diff_count(&self) -> f64 {
        self.observed_count as f64 - self.expected_count
    }

    pub fn diff_pct(&self) -> f64 {
        self.observed_pct - self.expected_pct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Complete,
    /// Zero variance; z-scores are undefined and the table has a single catch-all bin.
    Degenerate,
}

impl AnalysisStatus {
    pub fn label(self) -> &'static str {
        match self {
            AnalysisStatus::Complete => "complete",
            AnalysisStatus::Degenerate => "degenerate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub index: MarketIndex,
    pub change_kind: ChangeKind,
    pub requested_range: DateRange,
    pub summary: SummaryStatistics,
    pub bins: Vec<FrequencyBin>,
    pub z_scores: Vec<ZScorePoint>,
    pub exceedances: Vec<TailExceedance>,
    pub rejected: Vec<RejectedPoint>,
    pub status: AnalysisStatus,
}

impl AnalysisResult {
    pub fn is_degenerate(&self) -> bool {
        self.status == AnalysisStatus::Degenerate
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("request timed out")]
    Timeout,
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("no price data in the requested range")]
    EmptyResult,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("price data unavailable: {0}")]
    DataUnavailable(#[from] LoaderError),
    #[error("insufficient data: at least {required} observations required, got {actual}")]
    InsufficientData { required: usize, actual: usize },
    #[error("price series is not strictly ascending by date at {date}")]
    UnorderedSeries { date: NaiveDate },
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid bin spec: {0}")]
    InvalidBinSpec(String),
}

/// An [`AnalysisError`] annotated with the request it came from.
#[derive(Debug, Error)]
#[error("{index} {range} ({kind}): {source}")]
pub struct AnalyzeError {
    pub index: MarketIndex,
    pub range: DateRange,
    pub kind: ChangeKind,
    #[source]
    pub source: AnalysisError,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}
