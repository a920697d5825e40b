//! Tab-separated rendering of harvested tables.

use std::path::Path;

use anyhow::{Context, Result};
use kinharvest_core::{Table, MISSING};
use tracing::info;

/// Renders a table as TSV: a header row, then one line per record.
/// Absent cells carry the missing marker; embedded tabs and newlines are
/// flattened to spaces so the delimiter stays unambiguous.
pub fn render_tsv(table: &Table) -> String {
    let mut out = String::new();

    let header: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    push_row(&mut out, &header);

    for row in table.rows() {
        let cells: Vec<&str> = table
            .columns()
            .iter()
            .map(|column| row.get(column).unwrap_or(MISSING))
            .collect();
        push_row(&mut out, &cells);
    }

    out
}

fn push_row(out: &mut String, cells: &[&str]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        for c in cell.chars() {
            out.push(if c == '\t' || c == '\n' || c == '\r' {
                ' '
            } else {
                c
            });
        }
    }
    out.push('\n');
}

/// Writes a table as TSV to `path`.
pub fn write_tsv(path: impl AsRef<Path>, table: &Table) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, render_tsv(table))
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), rows = table.len(), "Wrote table");
    Ok(())
}

/// Writes a body to `path` verbatim, for payloads already in their final
/// shape (the aggregate CSV download).
pub fn write_raw(path: impl AsRef<Path>, body: &str) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), bytes = body.len(), "Wrote download");
    Ok(())
}
