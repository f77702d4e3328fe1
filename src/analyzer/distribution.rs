use crate::analyzer::normal;
use crate::model::{
    AnalysisError, AnalysisStatus, ChangeSeries, FrequencyBin, SummaryStatistics, TailExceedance,
    ZScorePoint,
};

/// |z| thresholds reported in the tail exceedance table.
pub const DEFAULT_THRESHOLDS: [f64; 10] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];

/// Shape of the frequency table: `bin_count` finite bins, each `width_in_stdev` wide,
/// centred on the mean, plus one open-ended tail bin on each side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinSpec {
    pub width_in_stdev: f64,
    pub bin_count: usize,
}

impl Default for BinSpec {
    fn default() -> Self {
        Self {
            width_in_stdev: 1.0,
            bin_count: 6,
        }
    }
}

impl BinSpec {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.width_in_stdev.is_finite() || self.width_in_stdev <= 0.0 {
            return Err(AnalysisError::InvalidBinSpec(format!(
                "bin width must be a positive number of standard deviations, got {}",
                self.width_in_stdev
            )));
        }
        if self.bin_count == 0 {
            return Err(AnalysisError::InvalidBinSpec(
                "at least one finite bin is required".into(),
            ));
        }
        Ok(())
    }

    /// Finite edges in sigma units, ascending: `(k - n/2) * width` for `k = 0..=n`.
    fn sigma_edges(&self) -> Vec<f64> {
        let half = self.bin_count as f64 / 2.0;
        (0..=self.bin_count)
            .map(|k| (k as f64 - half) * self.width_in_stdev)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub summary: SummaryStatistics,
    pub bins: Vec<FrequencyBin>,
    pub status: AnalysisStatus,
}

/// Computes summary statistics and the observed-vs-normal frequency table.
///
/// The standard deviation is the sample estimator. A series with zero variance yields a
/// single catch-all bin and [`AnalysisStatus::Degenerate`].
pub fn summarize(changes: &ChangeSeries, spec: &BinSpec) -> Result<Distribution, AnalysisError> {
    spec.validate()?;

    let (first, last) = match (changes.points.first(), changes.points.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => {
            return Err(AnalysisError::InsufficientData {
                required: 1,
                actual: 0,
            })
        }
    };

    let values: Vec<f64> = changes.values().collect();
    let count = values.len();
    let (mean, stdev) = mean_and_sample_stdev(&values);

    let summary = SummaryStatistics {
        count,
        date_range: (first, last),
        mean,
        stdev,
    };

    if stdev == 0.0 {
        return Ok(Distribution {
            summary,
            bins: vec![FrequencyBin {
                lower_bound: f64::NEG_INFINITY,
                upper_bound: f64::INFINITY,
                observed_count: count,
                expected_count: 0.0,
            }],
            status: AnalysisStatus::Degenerate,
        });
    }

    let sigma_edges = spec.sigma_edges();
    let edges: Vec<f64> = sigma_edges.iter().map(|s| mean + s * stdev).collect();

    let mut observed = vec![0usize; edges.len() + 1];
    for v in &values {
        // First edge >= v; edges are closed above so ties stay in the lower bin.
        observed[edges.partition_point(|edge| *edge < *v)] += 1;
    }

    let bounds = |i: usize, from: &[f64]| -> (f64, f64) {
        let lower = if i == 0 { f64::NEG_INFINITY } else { from[i - 1] };
        let upper = from.get(i).copied().unwrap_or(f64::INFINITY);
        (lower, upper)
    };

    let bins = observed
        .iter()
        .enumerate()
        .map(|(i, &observed_count)| {
            let (lower_bound, upper_bound) = bounds(i, edges.as_slice());
            let (lower_sigma, upper_sigma) = bounds(i, sigma_edges.as_slice());
            FrequencyBin {
                lower_bound,
                upper_bound,
                observed_count,
                expected_count: count as f64 * normal::mass_between(lower_sigma, upper_sigma),
            }
        })
        .collect();

    Ok(Distribution {
        summary,
        bins,
        status: AnalysisStatus::Complete,
    })
}

/// Counts defined z-scores beyond each threshold and compares with the normal expectation.
pub fn exceedances(z_scores: &[ZScorePoint], thresholds: &[f64]) -> Vec<TailExceedance> {
    let defined: Vec<f64> = z_scores.iter().filter_map(|z| z.value.value()).collect();
    if defined.is_empty() {
        return Vec::new();
    }
    let total = defined.len() as f64;

    thresholds
        .iter()
        .map(|&threshold_sigma| {
            let observed_count = defined.iter().filter(|z| z.abs() > threshold_sigma).count();
            let expected_prob = normal::two_sided_tail(threshold_sigma);
            TailExceedance {
                threshold_sigma,
                observed_count,
                observed_pct: observed_count as f64 / total * 100.0,
                expected_count: expected_prob * total,
                expected_pct: expected_prob * 100.0,
            }
        })
        .collect()
}

/// Relative spread below which a series counts as constant.
const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Mean and Bessel-corrected standard deviation. Zero when fewer than two values or all equal,
/// including values that differ only by rounding.
pub fn mean_and_sample_stdev(values: &[f64]) -> (f64, f64) {
    let Some(&first) = values.first() else {
        return (0.0, 0.0);
    };
    if values.iter().all(|v| *v == first) {
        return (first, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stdev = variance.sqrt();
    if stdev <= DEGENERATE_TOLERANCE * mean.abs().max(1.0) {
        return (mean, 0.0);
    }
    (mean, stdev)
}
