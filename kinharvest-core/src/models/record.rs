//! Row-tabular records produced by harvest drivers.
//!
//! Harvests normalize vendor JSON into [`Table`]s: an ordered column list
//! plus rows keyed by column name. The tabular sink renders cells with a
//! stable delimiter and an explicit missing-value marker, so absent fields
//! must be distinguishable from empty strings.

use serde_json::Value;

/// Marker written for cells with no value.
pub const MISSING: &str = "NA";

// ============================================================================
// Record
// ============================================================================

/// A single row: column name to cell value, insertion-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a cell, replacing any previous value for the column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.fields.push((column, value));
        }
    }

    /// Sets a cell from a JSON value, mapping null to the missing marker.
    pub fn set_json(&mut self, column: impl Into<String>, value: &Value) {
        self.set(column, json_cell(value));
    }

    /// Returns the cell for a column, if present.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the columns this record carries, in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }
}

/// Builds a record from a JSON object, one cell per top-level key.
///
/// Nested arrays and objects are rendered as compact JSON, matching how
/// the harvested tables flatten structured cells.
pub fn record_from_object(object: &serde_json::Map<String, Value>) -> Record {
    let mut record = Record::new();
    for (key, value) in object {
        record.set_json(key.clone(), value);
    }
    record
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => MISSING.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Table
// ============================================================================

/// An ordered set of columns plus the rows harvested for them.
///
/// Rows may carry a subset of the columns; missing cells render as
/// [`MISSING`]. Rows may not introduce columns the table does not declare
/// unless added through [`Table::push_extending`].
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    /// Creates a table with a fixed column order.
    pub fn with_columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    /// Appends a row, adding any columns it carries that the table lacks.
    pub fn push_extending(&mut self, record: Record) {
        for column in record.columns() {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
        self.rows.push(record);
    }

    /// Returns the declared columns in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows in insertion order.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cell for a row/column pair, or [`MISSING`].
    pub fn cell(&self, row: usize, column: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(MISSING)
    }
}
