//! Distribution analysis of daily index price changes against the normal distribution.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod facade;
pub mod loader;
pub mod model;
pub mod normalizer;
pub mod storage;
pub mod utils;

pub use cache::{AnalysisCache, Clock, FixedClock, SystemClock};
pub use facade::AnalysisFacade;
pub use model::{AnalysisRequest, AnalysisResult, AnalyzeError, ChangeKind, DateRange, MarketIndex};
