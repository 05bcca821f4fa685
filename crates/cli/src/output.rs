use crate::error::CliError;
use model::{pagination::page::Page, records::row::Row};
use serde::Serialize;
use std::io::Write;

/// One JSON object per line.
pub fn write_row<W: Write>(out: &mut W, row: &Row) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, &row.to_json())?;
    writeln!(out)?;
    Ok(())
}

/// A header line for the page followed by its rows.
pub fn write_page<W: Write>(out: &mut W, page: &Page) -> Result<(), CliError> {
    let header = serde_json::json!({
        "page": page.index,
        "offset": page.offset,
        "rows": page.len(),
        "last": page.is_last(),
    });
    serde_json::to_writer(&mut *out, &header)?;
    writeln!(out)?;
    for row in &page.rows {
        write_row(out, row)?;
    }
    Ok(())
}

pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
