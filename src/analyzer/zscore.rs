use crate::model::{ChangeSeries, SummaryStatistics, ZScore, ZScorePoint};

/// Standardizes every change against the series' own mean and stdev, keeping the dates.
/// With zero stdev every score is [`ZScore::Undefined`].
pub fn build_z_scores(changes: &ChangeSeries, summary: &SummaryStatistics) -> Vec<ZScorePoint> {
    changes
        .points
        .iter()
        .map(|p| ZScorePoint {
            date: p.date,
            value: if summary.stdev > 0.0 {
                ZScore::Defined((p.value - summary.mean) / summary.stdev)
            } else {
                ZScore::Undefined
            },
        })
        .collect()
}
