use crate::loader::traits::PriceLoader;
use crate::model::{DateRange, LoaderError, MarketIndex, PricePoint};
use crate::normalizer::normalize_all;
use crate::utils::{date_from_unix, unix_midnight};

use chrono::Duration;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Daily prices from the Yahoo Finance chart endpoint.
pub struct YahooLoader {
    client: Client,
    base_url: String,
}

impl YahooLoader {
    pub fn new() -> Result<Self, LoaderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, LoaderError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) SigmaWatch/0.1")
            .build()
            .map_err(|e| LoaderError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, index: MarketIndex, range: &DateRange) -> String {
        // period2 is exclusive, so ask for midnight after the last day.
        format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url,
            index.symbol().replace('^', "%5E"),
            unix_midnight(range.start()),
            unix_midnight(range.end() + Duration::days(1)),
        )
    }
}

#[async_trait::async_trait]
impl PriceLoader for YahooLoader {
    async fn fetch(&self, index: MarketIndex, range: &DateRange) -> Result<Vec<PricePoint>, LoaderError> {
        let url = self.build_url(index, range);
        info!("Fetching {} prices ({})", index, range);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LoaderError::Timeout
                } else {
                    LoaderError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LoaderError::Http(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Err(LoaderError::UnknownSymbol(index.symbol().to_string()));
        }
        if !status.is_success() {
            return Err(LoaderError::Http(format!("status {}", status)));
        }

        parse_chart(&body, range)
    }
}

/// Extracts daily open/close points inside `range` from a chart response body.
fn parse_chart(body: &str, range: &DateRange) -> Result<Vec<PricePoint>, LoaderError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| LoaderError::InvalidResponse(e.to_string()))?;

    if let Some(err) = response.chart.error {
        let description = err.description.unwrap_or_default();
        return Err(if err.code.eq_ignore_ascii_case("not found") {
            LoaderError::UnknownSymbol(description)
        } else {
            LoaderError::InvalidResponse(format!("{}: {}", err.code, description))
        });
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or(LoaderError::EmptyResult)?;
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| LoaderError::InvalidResponse("missing quote block".into()))?;

    let offset = result.meta.gmtoffset;
    let mut points: Vec<PricePoint> = result
        .timestamp
        .iter()
        .zip(quote.open.iter().zip(quote.close.iter()))
        .filter_map(|(&ts, (open, close))| {
            Some(PricePoint {
                date: date_from_unix(ts, offset)?,
                open: (*open)?,
                close: (*close)?,
            })
        })
        .filter(|p| range.contains(p.date))
        .collect();

    normalize_all(&mut points);

    if points.is_empty() {
        return Err(LoaderError::EmptyResult);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn parses_open_close_and_skips_nulls() {
        let body = r#"{"chart":{"result":[{
            "meta":{"symbol":"^GSPC","gmtoffset":-18000},
            "timestamp":[1704205800,1704292200,1704378600,1704465000],
            "indicators":{"quote":[{
                "open":[4745.2,4725.07,null,4690.57],
                "close":[4742.83,4704.81,4688.68,4697.24]
            }]}
        }],"error":null}}"#;

        let points = parse_chart(body, &range()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(points[0].open, 4745.2);
        assert_eq!(points[2].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(points[2].close, 4697.24);
    }

    #[test]
    fn points_outside_the_range_are_dropped() {
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":0},
            "timestamp":[1703980800,1704153600],
            "indicators":{"quote":[{"open":[1.0,2.0],"close":[1.5,2.5]}]}
        }],"error":null}}"#;
        let points = parse_chart(body, &range()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].open, 2.0);
    }

    #[test]
    fn upstream_errors_are_classified() {
        let not_found = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse_chart(not_found, &range()),
            Err(LoaderError::UnknownSymbol(_))
        ));

        let empty = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(matches!(parse_chart(empty, &range()), Err(LoaderError::EmptyResult)));

        assert!(matches!(
            parse_chart("<html>", &range()),
            Err(LoaderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn url_encodes_symbol_and_covers_the_last_day() {
        let loader = YahooLoader::with_base_url("http://localhost:9/chart/").unwrap();
        let url = loader.build_url(MarketIndex::Djia, &range());
        assert_eq!(
            url,
            "http://localhost:9/chart/%5EDJI?period1=1704067200&period2=1706745600&interval=1d&events=history"
        );
    }
}
