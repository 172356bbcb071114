//! Delimited-text parsing into ordered row records

use crate::error::PipelineError;

/// One parsed data row: column name → value, in header order.
///
/// Column order is the source header order, so serializing a record
/// reproduces the row as it appeared in the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    fields: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON object for downstream API payloads and telemetry.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Split one CSV line into fields: quoted fields may contain the delimiter,
/// newlines are already stripped, `""` inside quotes is an escaped quote.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Parse the header line into column names.
pub fn parse_header(line: &str) -> Vec<String> {
    split_line(line.trim_end_matches('\r'))
}

/// Zip one data line against the header. Short rows leave trailing columns
/// empty; extra values beyond the header are dropped.
pub fn parse_row(header: &[String], line: &str) -> RowRecord {
    let values = split_line(line.trim_end_matches('\r'));
    let fields = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), values.get(i).cloned().unwrap_or_default()))
        .collect();
    RowRecord::new(fields)
}

/// Parse a full text object as header + data rows. Blank lines are skipped.
pub fn parse_rows(content: &str) -> Result<(Vec<String>, Vec<RowRecord>), PipelineError> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(line) => parse_header(line),
        None => return Ok((Vec::new(), Vec::new())),
    };
    if header.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::processing("empty header row"));
    }
    let rows = lines.map(|line| parse_row(&header, line)).collect();
    Ok((header, rows))
}
