use crate::model::{
    AnalysisError, ChangeKind, ChangePoint, ChangeSeries, PricePoint, RejectReason, RejectedPoint,
};

/// Derives a percentage change series of the given kind from an ascending price series.
///
/// Points whose base price is zero (or non-positive for log changes), or whose prices or
/// resulting change are not finite, are reported in `rejected` instead of `points`, so `points.len() + rejected.len()` always equals the
/// number of changes the series can produce.
pub fn derive(prices: &[PricePoint], kind: ChangeKind) -> Result<ChangeSeries, AnalysisError> {
    let required = kind.min_prices();
    if prices.len() < required {
        return Err(AnalysisError::InsufficientData {
            required,
            actual: prices.len(),
        });
    }

    if let Some(w) = prices.windows(2).find(|w| w[1].date <= w[0].date) {
        return Err(AnalysisError::UnorderedSeries { date: w[1].date });
    }

    let mut points = Vec::with_capacity(prices.len());
    let mut rejected = Vec::new();

    let mut push = |date, change: Result<f64, RejectReason>| match change {
        Ok(value) if value.is_finite() => points.push(ChangePoint { date, value }),
        Ok(_) => rejected.push(RejectedPoint {
            date,
            reason: RejectReason::NonFinite,
        }),
        Err(reason) => rejected.push(RejectedPoint { date, reason }),
    };

    match kind {
        ChangeKind::Intraday => {
            for p in prices {
                push(p.date, pct_change(p.open, p.close));
            }
        }
        ChangeKind::DayOverDay => {
            for w in prices.windows(2) {
                push(w[1].date, pct_change(w[0].close, w[1].close));
            }
        }
        ChangeKind::LogDayOverDay => {
            for w in prices.windows(2) {
                push(w[1].date, log_change(w[0].close, w[1].close));
            }
        }
    }

    Ok(ChangeSeries {
        kind,
        points,
        rejected,
    })
}

fn pct_change(base: f64, next: f64) -> Result<f64, RejectReason> {
    if !base.is_finite() || !next.is_finite() {
        return Err(RejectReason::NonFinite);
    }
    if base == 0.0 {
        return Err(RejectReason::ZeroBase);
    }
    Ok((next - base) / base * 100.0)
}

fn log_change(base: f64, next: f64) -> Result<f64, RejectReason> {
    if !base.is_finite() || !next.is_finite() {
        return Err(RejectReason::NonFinite);
    }
    if base <= 0.0 || next <= 0.0 {
        return Err(RejectReason::NonPositivePrice);
    }
    Ok((next.ln() - base.ln()) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample() -> Vec<PricePoint> {
        vec![
            PricePoint { date: day(1), open: 100.0, close: 101.0 },
            PricePoint { date: day(2), open: 101.0, close: 99.0 },
            PricePoint { date: day(3), open: 99.0, close: 100.0 },
        ]
    }

    #[test]
    fn intraday_changes_match_worked_example() {
        let series = derive(&sample(), ChangeKind::Intraday).unwrap();
        let values: Vec<f64> = series.values().collect();
        assert_eq!(values.len(), 3);
        assert!((values[0] - 1.0).abs() < 1e-9);
        assert!((values[1] - (-1.980198)).abs() < 1e-5);
        assert!((values[2] - 1.010101).abs() < 1e-5);
        assert!(series.rejected.is_empty());
    }

    #[test]
    fn day_over_day_drops_first_date() {
        let series = derive(&sample(), ChangeKind::DayOverDay).unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].date, day(2));
        assert!((series.points[0].value - (-1.980198)).abs() < 1e-5);
        assert!((series.points[1].value - 1.010101).abs() < 1e-5);
    }

    #[test]
    fn log_changes_use_consecutive_closes() {
        let series = derive(&sample(), ChangeKind::LogDayOverDay).unwrap();
        let expected = ((99.0f64).ln() - (101.0f64).ln()) * 100.0;
        assert!((series.points[0].value - expected).abs() < 1e-12);
    }

    #[test]
    fn lengths_follow_series_length() {
        for n in 2..20u32 {
            let prices: Vec<PricePoint> = (1..=n)
                .map(|d| PricePoint {
                    date: day(d),
                    open: 50.0 + d as f64,
                    close: 51.0 + (d as f64 * 0.7).sin(),
                })
                .collect();
            assert_eq!(derive(&prices, ChangeKind::Intraday).unwrap().points.len(), n as usize);
            assert_eq!(
                derive(&prices, ChangeKind::DayOverDay).unwrap().points.len(),
                n as usize - 1
            );
        }
    }

    #[test]
    fn too_few_points_is_insufficient_data() {
        let one = &sample()[..1];
        assert!(matches!(
            derive(one, ChangeKind::DayOverDay),
            Err(AnalysisError::InsufficientData { required: 2, actual: 1 })
        ));
        assert!(matches!(
            derive(&[], ChangeKind::Intraday),
            Err(AnalysisError::InsufficientData { required: 1, actual: 0 })
        ));
        assert_eq!(derive(one, ChangeKind::Intraday).unwrap().points.len(), 1);
    }

    #[test]
    fn zero_base_is_flagged_not_dropped() {
        let mut prices = sample();
        prices[1].open = 0.0;
        prices[0].close = 0.0;

        let intraday = derive(&prices, ChangeKind::Intraday).unwrap();
        assert_eq!(intraday.points.len(), 2);
        assert_eq!(
            intraday.rejected,
            vec![RejectedPoint { date: day(2), reason: RejectReason::ZeroBase }]
        );

        let dod = derive(&prices, ChangeKind::DayOverDay).unwrap();
        assert_eq!(dod.points.len(), 1);
        assert_eq!(dod.rejected[0].date, day(2));

        let log = derive(&prices, ChangeKind::LogDayOverDay).unwrap();
        assert_eq!(log.rejected[0].reason, RejectReason::NonPositivePrice);
    }

    #[test]
    fn unordered_or_duplicate_dates_are_rejected() {
        let mut prices = sample();
        prices.swap(1, 2);
        assert!(matches!(
            derive(&prices, ChangeKind::Intraday),
            Err(AnalysisError::UnorderedSeries { date }) if date == day(2)
        ));

        let mut dup = sample();
        dup[2].date = day(2);
        assert!(derive(&dup, ChangeKind::DayOverDay).is_err());
    }

    #[test]
    fn non_finite_prices_are_flagged() {
        let mut prices = sample();
        prices[1].open = f64::NAN;
        prices[2].close = f64::INFINITY;

        let intraday = derive(&prices, ChangeKind::Intraday).unwrap();
        assert_eq!(intraday.points.len(), 1);
        assert_eq!(
            intraday.rejected,
            vec![
                RejectedPoint { date: day(2), reason: RejectReason::NonFinite },
                RejectedPoint { date: day(3), reason: RejectReason::NonFinite },
            ]
        );
        assert!(intraday.values().all(f64::is_finite));

        for kind in [ChangeKind::DayOverDay, ChangeKind::LogDayOverDay] {
            let series = derive(&prices, kind).unwrap();
            assert_eq!(series.points.len(), 1);
            assert_eq!(series.rejected[0].date, day(3));
            assert_eq!(series.rejected[0].reason, RejectReason::NonFinite);
        }
    }

    #[test]
    fn overflowing_change_is_flagged() {
        let prices = vec![
            PricePoint { date: day(1), open: f64::MIN_POSITIVE, close: f64::MAX },
            PricePoint { date: day(2), open: 1.0, close: 2.0 },
        ];
        let series = derive(&prices, ChangeKind::Intraday).unwrap();
        assert_eq!(series.points.len(), 1);
        assert_eq!(series.rejected[0].reason, RejectReason::NonFinite);
    }
}
