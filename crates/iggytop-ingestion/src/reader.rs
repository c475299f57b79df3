//! Readers for the raw source exports.
//!
//! Everything is read into an all-string [`Table`]. Values that equal one of
//! the source's null tokens (or are blank) become `None` at read time.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use iggytop_common::table::Cell;
use iggytop_common::{IggytopError, Result, Table};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    /// Tab separated, quote characters are literal.
    Tsv,
    /// CSV whose header spans two rows ("Chain 1" / "CDR3 Curated").
    TwoRowHeaderCsv,
    /// First worksheet of an Excel workbook.
    Xlsx,
}

/// Read `path` as `format` and null out `null_tokens`.
pub fn read_table(path: &Path, format: TableFormat, null_tokens: &[&str]) -> Result<Table> {
    let mut table = match format {
        TableFormat::Csv => read_delimited(path, b',', true, 1)?,
        TableFormat::Tsv => read_delimited(path, b'\t', false, 1)?,
        TableFormat::TwoRowHeaderCsv => read_delimited(path, b',', true, 2)?,
        TableFormat::Xlsx => read_xlsx(path)?,
    };
    table.replace_nulls(null_tokens);
    info!(
        path = %path.display(),
        ?format,
        rows = table.len(),
        columns = table.columns().len(),
        "Read source table"
    );
    Ok(table)
}

fn lossy(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

fn read_delimited(path: &Path, delimiter: u8, quoting: bool, header_rows: usize) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .quoting(quoting)
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = reader.byte_records();
    let mut header_parts: Vec<Vec<String>> = Vec::with_capacity(header_rows);
    for _ in 0..header_rows {
        match records.next() {
            Some(record) => header_parts.push(record?.iter().map(lossy).collect()),
            None => break,
        }
    }
    let columns = join_header_rows(&header_parts);

    let mut table = Table::new(columns);
    for record in records {
        let record = record?;
        table.push_row(record.iter().map(|f| Some(lossy(f))).collect());
    }
    Ok(table)
}

/// Column names from one or more header rows, joined per column with a space.
fn join_header_rows(rows: &[Vec<String>]) -> Vec<String> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|i| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

// ── XLSX ──────────────────────────────────────────────────────────────────────

fn read_zip_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Worksheet part of the first sheet: `sheet1.xml`, or the lowest-numbered one.
fn first_sheet_name(archive: &zip::ZipArchive<File>) -> Option<String> {
    archive
        .file_names()
        .filter_map(|n| {
            let number = n
                .strip_prefix("xl/worksheets/sheet")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, n.to_string()))
        })
        .min_by_key(|(number, _)| *number)
        .map(|(_, name)| name)
}

fn read_xlsx(path: &Path) -> Result<Table> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let shared = match read_zip_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let sheet = first_sheet_name(&archive)
        .ok_or_else(|| IggytopError::Xml(format!("{} has no worksheets", path.display())))?;
    let xml = read_zip_entry(&mut archive, &sheet)?
        .ok_or_else(|| IggytopError::Xml(format!("{sheet} missing from workbook")))?;
    debug!(sheet, n_shared = shared.len(), "Parsing worksheet");

    let mut rows = parse_sheet(&xml, &shared)?.into_values();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let columns: Vec<String> = header.into_iter().map(Option::unwrap_or_default).collect();
    Ok(Table::from_rows(columns, rows))
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(ref e) if in_text => {
                current.push_str(&e.unescape().map_err(quick_xml::Error::from)?);
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column index from a cell reference ("C12" → 2).
/// Widest worksheet Excel writes (column `XFD`).
const MAX_COLUMNS: usize = 16_384;

/// Zero-based column of a cell reference (`AA3` → 26). `Ok(None)` when the
/// reference has no column letters.
fn column_from_ref(cell_ref: &str) -> Result<Option<usize>> {
    let out_of_range = || IggytopError::Xml(format!("cell reference {cell_ref:?} is out of range"));
    let mut index = 0usize;
    let mut letters = 0;
    for b in cell_ref.bytes().take_while(u8::is_ascii_alphabetic) {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .filter(|&i| i <= MAX_COLUMNS)
            .ok_or_else(out_of_range)?;
        letters += 1;
    }
    Ok((letters > 0).then(|| index - 1))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| lossy(&a.value))
}

#[derive(Debug, Default)]
struct PendingCell {
    column: usize,
    kind: Option<String>,
    value: String,
}

/// Rows keyed by their row number; each row is dense up to its last cell.
fn parse_sheet(xml: &str, shared: &[String]) -> Result<BTreeMap<usize, Vec<Cell>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows: BTreeMap<usize, Vec<Cell>> = BTreeMap::new();
    let mut row_number = 0usize;
    let mut next_column = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = attribute(e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(row_number + 1);
                    next_column = 0;
                }
                b"c" => {
                    let column = attribute(e, b"r")
                        .map(|r| column_from_ref(&r))
                        .transpose()?
                        .flatten()
                        .unwrap_or(next_column);
                    cell = Some(PendingCell {
                        column,
                        kind: attribute(e, b"t"),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                next_column = attribute(e, b"r")
                    .map(|r| column_from_ref(&r))
                    .transpose()?
                    .flatten()
                    .unwrap_or(next_column)
                    + 1;
            }
            Event::Text(ref e) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&e.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        next_column = c.column + 1;
                        let value = match c.kind.as_deref() {
                            Some("s") => c.value.trim().parse::<usize>().ok().and_then(|i| shared.get(i).cloned()),
                            Some("b") => Some(if c.value == "1" { "TRUE" } else { "FALSE" }.to_string()),
                            _ => Some(c.value),
                        };
                        let row = rows.entry(row_number).or_default();
                        if row.len() <= c.column {
                            row.resize(c.column + 1, None);
                        }
                        row[c.column] = value;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Write a single-sheet workbook of inline strings; empty cells are omitted.
#[cfg(test)]
pub(crate) fn write_test_xlsx(path: &Path, rows: &[Vec<&str>]) {
    use std::io::Write;

    fn column_letters(mut index: usize) -> String {
        let mut letters = Vec::new();
        loop {
            letters.push(b'A' + (index % 26) as u8);
            if index < 26 {
                break;
            }
            index = index / 26 - 1;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap()
    }

    let mut sheet = String::from(
        r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate().filter(|(_, v)| !v.is_empty()) {
            let escaped = value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
            sheet.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t>{escaped}</t></is></c>"#,
                column_letters(c),
                r + 1
            ));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    zip.start_file("xl/worksheets/sheet1.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(sheet.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write(dir: &Path, name: &str, body: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_csv_with_quotes_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "mcpas.csv",
            b"CDR3.beta.aa,Pathology,Epitope.peptide\nCASSF,\"Influenza, seasonal\",GILGFVFTL\nCASRF,nan,\n",
        );
        let table = read_table(&path, TableFormat::Csv, &["nan"]).unwrap();
        assert_eq!(table.columns(), &["CDR3.beta.aa", "Pathology", "Epitope.peptide"]);
        assert_eq!(table.get(0, "Pathology"), Some("Influenza, seasonal"));
        assert_eq!(table.get(1, "Pathology"), None);
        assert_eq!(table.get(1, "Epitope.peptide"), None);
    }

    #[test]
    fn test_tsv_keeps_quote_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "t.tsv", b"Epitope\tTCR_organism\n\"ABC\tHuman\nDEF\tn.a.\n");
        let table = read_table(&path, TableFormat::Tsv, &["n.a."]).unwrap();
        assert_eq!(table.get(0, "Epitope"), Some("\"ABC"));
        assert_eq!(table.get(1, "TCR_organism"), None);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "latin1.csv", b"Antigen\n\xb5-protein\n");
        let table = read_table(&path, TableFormat::Csv, &[]).unwrap();
        assert_eq!(table.get(0, "Antigen"), Some("\u{FFFD}-protein"));
    }

    #[test]
    fn test_two_row_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "tcr_full_v3.csv",
            b"Epitope,Chain 1,Chain 1\nName,CDR3 Curated,CDR3 Calculated\nGILGFVFTL,,CAVRF\n",
        );
        let table = read_table(&path, TableFormat::TwoRowHeaderCsv, &[]).unwrap();
        assert_eq!(
            table.columns(),
            &["Epitope Name", "Chain 1 CDR3 Curated", "Chain 1 CDR3 Calculated"]
        );
        assert_eq!(table.get(0, "Chain 1 CDR3 Curated"), None);
        assert_eq!(table.get(0, "Chain 1 CDR3 Calculated"), Some("CAVRF"));
    }

    #[test]
    fn test_written_workbook_round_trips_sparse_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neotcr.xlsx");
        write_test_xlsx(&path, &[vec!["TRA_CDR3", "PubMed ID"], vec!["", "PMID: 1"]]);
        let table = read_table(&path, TableFormat::Xlsx, &[]).unwrap();
        assert_eq!(table.get(0, "TRA_CDR3"), None);
        assert_eq!(table.get(0, "PubMed ID"), Some("PMID: 1"));
    }

    #[test]
    fn test_column_from_ref() {
        assert_eq!(column_from_ref("A1").unwrap(), Some(0));
        assert_eq!(column_from_ref("C12").unwrap(), Some(2));
        assert_eq!(column_from_ref("AA3").unwrap(), Some(26));
        assert_eq!(column_from_ref("XFD1").unwrap(), Some(16_383));
        assert_eq!(column_from_ref("12").unwrap(), None);
    }

    #[test]
    fn test_oversized_cell_reference_is_rejected() {
        assert!(matches!(column_from_ref("XFE1"), Err(IggytopError::Xml(_))));
        assert!(column_from_ref(&format!("{}1", "Z".repeat(40))).is_err());

        let sheet = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#;
        assert!(parse_sheet(sheet, &[]).is_err());
    }

    #[test]
    fn test_xlsx_first_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trait.xlsx");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();

        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<si><t>CDR3&#945;</t></si><si><t>Epitope</t></si><si><r><t>CASS</t></r><r><t>LF</t></r></si></sst>"#,
        )
        .unwrap();

        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="inlineStr"><is><t>Count</t></is></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="C2"><v>7</v></c></row>
<row r="3"><c r="B3" t="inlineStr"><is><t>NLVPMVATV</t></is></c></row>
</sheetData></worksheet>"#,
        )
        .unwrap();
        zip.finish().unwrap();

        let table = read_table(&path, TableFormat::Xlsx, &[]).unwrap();
        assert_eq!(table.columns(), &["CDR3α", "Epitope", "Count"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "CDR3α"), Some("CASSLF"));
        assert_eq!(table.get(0, "Epitope"), None);
        assert_eq!(table.get(0, "Count"), Some("7"));
        assert_eq!(table.get(1, "CDR3α"), None);
        assert_eq!(table.get(1, "Epitope"), Some("NLVPMVATV"));
    }
}
