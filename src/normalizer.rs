use crate::model::PricePoint;

/// Puts a raw price series into the shape the analyzer expects: finite prices only,
/// ascending by date, one point per date (the last one seen wins).
pub fn normalize_all(points: &mut Vec<PricePoint>) {
    points.retain(|p| p.open.is_finite() && p.close.is_finite());
    points.sort_by_key(|p| p.date);
    points.dedup_by(|later, kept| {
        if later.date == kept.date {
            *kept = *later;
            true
        } else {
            false
        }
    });
}
