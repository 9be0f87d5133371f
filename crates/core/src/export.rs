use crate::domain::baseline::Department;
use crate::domain::history::HistoryEntry;
use anyhow::Context;

/// Renders one run as a comma-delimited summary.
///
/// Layout: `Year` and `Quarter` rows for the forecast period, a summary row
/// `Budget,<target budget>,Total Growth,<optimizer score>` (score left empty when the
/// optimizer did not report one), then one `<department>,<percent>,<amount>` row per
/// department, where amount is the target budget share in whole currency units.
pub fn render_run_csv(entry: &HistoryEntry) -> anyhow::Result<String> {
    let growth = entry
        .result
        .total_growth
        .map(|g| g.to_string())
        .unwrap_or_default();
    let amounts = entry.result.allocation.amounts(entry.target_budget);

    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(vec![]);
    wtr.write_record(["Year".to_string(), entry.target.year.to_string()])?;
    wtr.write_record(["Quarter".to_string(), entry.target.quarter.to_string()])?;
    wtr.write_record([
        "Budget".to_string(),
        entry.target_budget.to_string(),
        "Total Growth".to_string(),
        growth,
    ])?;
    for dept in Department::ALL {
        wtr.write_record([
            dept.label().to_string(),
            entry.result.allocation.get(dept).to_string(),
            amounts.get(dept).to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush export csv")?;
    String::from_utf8(data).context("export csv is not utf-8")
}

pub fn export_file_name(entry: &HistoryEntry) -> String {
    format!(
        "forecast_Q{}_{}_{}.csv",
        entry.target.quarter, entry.target.year, entry.id
    )
}
