//! CSV encoding and decoding for ledger persistence
//!
//! Ledgers persist as comma-separated files with RFC 4180 quoting.
//! Cell types are re-inferred on read (i64, u64, f64, bool, then
//! string) so a round-tripped record compares equal to its freshly
//! parsed form - the merge engine's deduplication depends on that.

use serde_json::{Map, Number, Value};

/// A telemetry record: field name -> scalar value.
pub type Record = Map<String, Value>;

/// Render records as CSV under the given column order.
///
/// Missing fields and JSON nulls both render as an empty cell.
pub fn encode(columns: &[String], records: &[Record]) -> String {
    let mut out = String::with_capacity(64 * (records.len() + 1));
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_cell_str(&mut out, col);
    }
    out.push('\n');

    for record in records {
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            push_cell(&mut out, record.get(col.as_str()));
        }
        out.push('\n');
    }
    out
}

/// Parse CSV text into its header columns and records.
///
/// An empty cell yields no field at all, so a round-tripped record
/// never grows phantom empty strings. Empty input yields no columns
/// and no records.
pub fn decode(text: &str) -> (Vec<String>, Vec<Record>) {
    let mut rows = parse_rows(text).into_iter();
    let header = match rows.next() {
        Some(cells) => cells,
        None => return (Vec::new(), Vec::new()),
    };

    let mut records = Vec::new();
    for cells in rows {
        let mut record = Record::new();
        for (col, cell) in header.iter().zip(cells) {
            if cell.is_empty() {
                continue;
            }
            record.insert(col.clone(), infer_value(&cell));
        }
        records.push(record);
    }
    (header, records)
}

fn push_cell(out: &mut String, value: Option<&Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => push_cell_str(out, s),
        Some(Value::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
        Some(Value::Number(n)) => out.push_str(&n.to_string()),
        // Nested values are rare in telemetry streams; keep their JSON
        // text so nothing is silently dropped.
        Some(other) => push_cell_str(out, &other.to_string()),
    }
}

fn push_cell_str(out: &mut String, s: &str) {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        out.push('"');
        out.push_str(&s.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(s);
    }
}

/// Split CSV text into rows of cells, honouring RFC 4180 quoting
/// (including newlines inside quoted cells). Blank lines are skipped.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut row_started = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                row_started = true;
            }
            ',' => {
                row.push(std::mem::take(&mut cell));
                row_started = true;
            }
            '\r' => {}
            '\n' => {
                if row_started {
                    row.push(std::mem::take(&mut cell));
                    rows.push(std::mem::take(&mut row));
                    row_started = false;
                }
            }
            _ => {
                cell.push(c);
                row_started = true;
            }
        }
    }
    if row_started {
        row.push(cell);
        rows.push(row);
    }
    rows
}

fn infer_value(cell: &str) -> Value {
    if let Ok(n) = cell.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = cell.parse::<u64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match cell {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}
