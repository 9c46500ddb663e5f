//! Plain-text CSV export of the record set
//!
//! The export is for operators who want to open the data in a spreadsheet.
//! Columns are the union of record fields in first-seen order followed by
//! the page number and capture time. A field that shares a name with one of
//! those two columns is exported under a `field_` prefix.

use crate::record::{Record, CAPTURED_AT_COLUMN, PAGE_NUMBER_COLUMN};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Byte order mark so spreadsheet applications detect UTF-8
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Prefix for fields whose name is taken by a fixed column
const FIELD_PREFIX: &str = "field_";

/// A record field and the header it is exported under
struct FieldColumn<'a> {
    name: &'a str,
    header: String,
}

fn field_columns(records: &[Record]) -> Vec<FieldColumn<'_>> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for record in records {
        for (name, _) in record.fields() {
            if seen.insert(name) {
                names.push(name);
            }
        }
    }

    let mut taken: HashSet<String> = names.iter().map(|name| name.to_string()).collect();
    taken.insert(PAGE_NUMBER_COLUMN.to_string());
    taken.insert(CAPTURED_AT_COLUMN.to_string());

    names
        .into_iter()
        .map(|name| {
            if name != PAGE_NUMBER_COLUMN && name != CAPTURED_AT_COLUMN {
                return FieldColumn { name, header: name.to_string() };
            }
            let mut header = format!("{}{}", FIELD_PREFIX, name);
            while taken.contains(&header) {
                header.insert_str(0, FIELD_PREFIX);
            }
            taken.insert(header.clone());
            FieldColumn { name, header }
        })
        .collect()
}

/// Collects the export header for a record set
pub fn export_columns(records: &[Record]) -> Vec<String> {
    field_columns(records)
        .into_iter()
        .map(|column| column.header)
        .chain([PAGE_NUMBER_COLUMN.to_string(), CAPTURED_AT_COLUMN.to_string()])
        .collect()
}

/// Writes `records` as CSV to `path`
///
/// The file is written next to its destination and renamed into place, so a
/// reader never sees a half-written export.
pub fn write_csv_export(path: &Path, records: &[Record]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("csv.tmp");
    {
        let file = fs::File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(UTF8_BOM)?;
        write_csv(&mut writer, records)?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    tracing::debug!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

/// Writes the header and one row per record to any writer
pub fn write_csv<W: Write>(mut w: W, records: &[Record]) -> io::Result<()> {
    let columns = field_columns(records);
    let header = columns
        .iter()
        .map(|column| column.header.as_str())
        .chain([PAGE_NUMBER_COLUMN, CAPTURED_AT_COLUMN]);
    write_row(&mut w, header)?;

    for record in records {
        let page = record.page_number.to_string();
        let captured = record.captured_at.to_rfc3339();
        let cells = columns
            .iter()
            .map(|column| record.get(column.name).unwrap_or(""))
            .chain([page.as_str(), captured.as_str()]);
        write_row(&mut w, cells)?;
    }
    Ok(())
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<'a, W, I>(w: &mut W, cells: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a str>,
{
    let mut first = true;
    for cell in cells {
        if !first {
            w.write_all(b",")?;
        }
        first = false;
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}
