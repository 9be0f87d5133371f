use crate::domain::baseline::{BaselineField, PartialBaseline};
use crate::import::error::ImportFormatError;
use anyhow::Context;
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes raw import bytes to text.
///
/// A UTF-8 BOM is stripped. Bytes that are not valid UTF-8 are decoded as Windows-1252,
/// which is what most spreadsheet exports fall back to.
pub fn decode_import(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            tracing::debug!("import is not valid UTF-8; decoding as windows-1252");
            let (cow, _, _) = WINDOWS_1252.decode(bytes);
            cow
        }
    }
}

pub fn parse_import_bytes(bytes: &[u8]) -> anyhow::Result<Vec<PartialBaseline>> {
    parse_import(&decode_import(bytes))
}

/// Parses a comma-delimited import into partial baseline rows.
///
/// Blank lines are skipped. Unknown header columns are ignored. Malformed, empty, or missing
/// cells in a recognized column read as 0; grouping commas inside a quoted number are
/// accepted. Rows end up empty only when no header column is recognized; those are dropped.
pub fn parse_import(text: &str) -> anyhow::Result<Vec<PartialBaseline>> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return Err(ImportFormatError {
            line_count: lines.len(),
        }
        .into());
    }

    let body = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.context("failed to read import header")?,
        None => {
            return Err(ImportFormatError { line_count: 0 }.into());
        }
    };
    let columns: Vec<Option<BaselineField>> = header
        .iter()
        .map(|h| BaselineField::from_name(unquote(h)))
        .collect();

    let recognized = columns.iter().flatten().count();
    if recognized == 0 {
        tracing::warn!(header = lines[0], "import header has no recognized columns");
    }

    let mut rows = Vec::with_capacity(lines.len() - 1);
    let mut dropped: usize = 0;
    for (line, record) in records.enumerate() {
        let record = record.with_context(|| format!("failed to read import row {}", line + 1))?;
        let mut row = PartialBaseline::default();
        let mut matched: usize = 0;
        for (idx, column) in columns.iter().enumerate() {
            let Some(field) = column else {
                continue;
            };
            row.set(*field, parse_cell(record.get(idx)));
            matched += 1;
        }

        if matched == 0 {
            dropped += 1;
            continue;
        }
        rows.push(row);
    }

    tracing::debug!(rows = rows.len(), dropped, recognized, "parsed baseline import");
    Ok(rows)
}

// Stray single quotes survive CSV unquoting, so both quote characters are stripped.
fn unquote(s: &str) -> &str {
    s.trim().trim_matches(['\'', '"'])
}

fn parse_cell(cell: Option<&str>) -> f64 {
    let Some(cell) = cell else {
        return 0.0;
    };
    match unquote(cell).replace(',', "").parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}
