use crate::domain::baseline::{BaselineRecord, PartialBaseline, Period};

/// Chronologically latest row by (year, quarter). Equal keys keep import order, so the last
/// such row wins.
pub fn select_latest(rows: &[PartialBaseline]) -> Option<&PartialBaseline> {
    let mut sorted: Vec<&PartialBaseline> = rows.iter().collect();
    sorted.sort_by_key(|row| row.sort_key());
    sorted.last().copied()
}

/// First row whose year and quarter both equal `period`.
pub fn select_for_period(rows: &[PartialBaseline], period: Period) -> Option<&PartialBaseline> {
    rows.iter()
        .find(|row| row.year == Some(period.year) && row.quarter == Some(period.quarter))
}

/// Merges the latest row onto a copy of `baseline` and returns it with the row it came from.
/// `None` when there are no rows.
pub fn apply_latest<'a>(
    baseline: &BaselineRecord,
    rows: &'a [PartialBaseline],
) -> Option<(BaselineRecord, &'a PartialBaseline)> {
    let row = select_latest(rows)?;
    let mut out = baseline.clone();
    out.merge(row);
    Some((out, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: i32, quarter: u32, budget: f64) -> PartialBaseline {
        PartialBaseline {
            year: Some(year),
            quarter: Some(quarter),
            budget: Some(budget),
            ..Default::default()
        }
    }

    #[test]
    fn latest_row_is_chronological_not_positional() {
        let rows = vec![row(2024, 1, 1.0), row(2024, 3, 3.0), row(2023, 4, 4.0)];
        let latest = select_latest(&rows).unwrap();
        assert_eq!((latest.year, latest.quarter), (Some(2024), Some(3)));
        // Import buffer untouched.
        assert_eq!(rows[0].quarter, Some(1));
    }

    #[test]
    fn latest_of_empty_is_none() {
        assert!(select_latest(&[]).is_none());
    }

    #[test]
    fn exact_match_returns_first_matching_row() {
        let rows = vec![row(2024, 1, 1.0), row(2024, 2, 2.0), row(2024, 2, 3.0)];
        let hit = select_for_period(&rows, Period::new(2024, 2).unwrap()).unwrap();
        assert_eq!(hit.budget, Some(2.0));
        assert!(select_for_period(&rows, Period::new(2022, 2).unwrap()).is_none());
    }

    #[test]
    fn apply_latest_merges_present_fields_only() {
        let base = BaselineRecord::default();
        let rows = vec![row(2023, 2, 9.0)];
        let (merged, row) = apply_latest(&base, &rows).unwrap();
        assert_eq!(row.quarter, Some(2));
        assert_eq!(merged.year, 2023);
        assert_eq!(merged.budget, 9.0);
        assert_eq!(merged.rnd_spend, base.rnd_spend);
        assert!(apply_latest(&base, &[]).is_none());
    }
}
