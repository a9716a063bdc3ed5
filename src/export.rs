//! Spreadsheet export of a report's patents.
//!
//! Produces a minimal Office Open XML workbook (`.xlsx`) with a single
//! `Patents` sheet: one header row, then one row per patent with its
//! related rows flattened into comma-separated cells. Strings are written
//! inline, so the package needs no shared-strings part.

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;

use anyhow::{Context, Result};
use patent_inspector_core::models::PatentRecord;
use zip::write::SimpleFileOptions;

pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Blob key of a report's export.
pub fn export_key(report_id: i64) -> String {
    format!("exports/{}.xlsx", report_id)
}

const HEADERS: &[&str] = &[
    "Office",
    "Patent ID",
    "Type",
    "Application Filed Date",
    "Granted Date",
    "Title",
    "Abstract",
    "Claims Count",
    "Figures Count",
    "Sheets Count",
    "CPC Groups",
    "PCT Documents",
    "Inventors",
    "Assignees",
    "Withdrawn",
];

enum Cell {
    Text(String),
    Number(i64),
    Empty,
}

impl From<Option<i64>> for Cell {
    fn from(v: Option<i64>) -> Self {
        v.map_or(Cell::Empty, Cell::Number)
    }
}

/// Distinct non-blank values joined by `", "`, in sorted order.
fn joined(values: impl IntoIterator<Item = String>) -> Cell {
    let set: BTreeSet<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if set.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(set.into_iter().collect::<Vec<_>>().join(", "))
    }
}

fn text(v: Option<&str>) -> Cell {
    v.map_or(Cell::Empty, |s| Cell::Text(s.to_string()))
}

fn row_cells(record: &PatentRecord) -> Vec<Cell> {
    let p = &record.patent;
    vec![
        Cell::Text(p.office.clone()),
        Cell::Text(p.office_patent_id.clone()),
        text(p.patent_type.as_deref()),
        text(p.application_filed_date.map(|d| d.to_string()).as_deref()),
        Cell::Text(p.granted_date.to_string()),
        Cell::Text(p.title.clone()),
        text(p.abstract_text.as_deref()),
        Cell::Number(p.claims_count),
        p.figures_count.into(),
        p.sheets_count.into(),
        joined(record.cpc_groups.iter().cloned()),
        joined(record.pct.iter().map(|r| r.representation())),
        joined(record.inventors.iter().map(|i| i.display_name())),
        joined(record.assignees.iter().map(|a| a.display_name())),
        Cell::Text(if p.withdrawn { "yes" } else { "no" }.to_string()),
    ]
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || *c >= ' ')
        .collect()
}

fn write_row(xml: &mut String, row: usize, cells: &[Cell]) {
    xml.push_str(&format!("<row r=\"{}\">", row));
    for (col, cell) in cells.iter().enumerate() {
        let reference = format!("{}{}", column_name(col), row);
        match cell {
            Cell::Text(s) => xml.push_str(&format!(
                "<c r=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                reference,
                quick_xml::escape::escape(xml_safe(s).as_str())
            )),
            Cell::Number(n) => {
                xml.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", reference, n))
            }
            Cell::Empty => {}
        }
    }
    xml.push_str("</row>");
}

fn sheet_xml(records: &[PatentRecord]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    let header: Vec<Cell> = HEADERS.iter().map(|h| Cell::Text(h.to_string())).collect();
    write_row(&mut xml, 1, &header);
    for (i, record) in records.iter().enumerate() {
        write_row(&mut xml, i + 2, &row_cells(record));
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Patents" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Build the workbook bytes for `records`.
pub fn build_workbook(records: &[PatentRecord]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let sheet = sheet_xml(records);
    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)
            .with_context(|| format!("Failed to start workbook part {}", name))?;
        zip.write_all(body.as_bytes())?;
    }
    let cursor = zip.finish().context("Failed to finish workbook")?;
    Ok(cursor.into_inner())
}

/// Write export bytes to `output`, or to stdout when `None`.
pub fn write_output(bytes: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
