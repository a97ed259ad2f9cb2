//! Summary workbook for the indicators an upload produced.
//!
//! The workbook is a minimal SpreadsheetML package written by hand: one sheet
//! of inline strings, no shared string table, a single default style.

use quick_xml::escape::escape;
use std::borrow::Cow;
use std::io::{Cursor, Write};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{Category, Indicator, ReportArtifact};
use crate::error::Result;

pub const REPORT_SHEET_NAME: &str = "Résultats";
pub const REPORT_HEADER: [&str; 5] = ["Title", "Description", "Category", "Status", "Created At"];
pub const CREATED_STATUS_LABEL: &str = "Créé";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

/// Column letters for a zero-based index: 0 -> A, 25 -> Z, 26 -> AA
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Characters XML 1.0 cannot carry in element text
fn is_xml_illegal(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// `_xHHHH_` at the start of `s`, the SpreadsheetML character escape form
fn starts_with_hex_escape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 7
        && b[0] == b'_'
        && b[1] == b'x'
        && b[2..6].iter().all(|c| c.is_ascii_hexdigit())
        && b[6] == b'_'
}

/// Encode illegal characters as `_xHHHH_`, and protect literal text that
/// already looks like such an escape by encoding its leading underscore.
fn encode_cell_text(value: &str) -> Cow<'_, str> {
    if !value.chars().any(is_xml_illegal) && !value.contains("_x") {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 8);
    for (idx, c) in value.char_indices() {
        if is_xml_illegal(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && starts_with_hex_escape(&value[idx..]) {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape(sheet_name)
    )
}

fn sheet_xml<S: AsRef<str>>(header: &[&str], rows: &[Vec<S>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    let header_row: Vec<&str> = header.to_vec();
    let all_rows = std::iter::once(header_row)
        .chain(rows.iter().map(|r| r.iter().map(|c| c.as_ref()).collect()));

    for (row_idx, row) in all_rows.enumerate() {
        let row_number = row_idx + 1;
        xml.push_str(&format!(r#"<row r="{}">"#, row_number));
        for (col_idx, value) in row.iter().enumerate() {
            xml.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                column_letter(col_idx),
                row_number,
                escape(&*encode_cell_text(value))
            ));
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Write a single-sheet `.xlsx` workbook holding text cells
pub fn write_workbook<S: AsRef<str>>(
    sheet_name: &str,
    header: &[&str],
    rows: &[Vec<S>],
) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, String); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook_xml(sheet_name)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/styles.xml", STYLES.to_string()),
    ];
    for (name, content) in parts.iter() {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(sheet_xml(header, rows).as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

/// Builds the downloadable report from the indicators a run created
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn report_file_name(upload_id: Uuid) -> String {
        format!("etl_output_{}.xlsx", upload_id)
    }

    pub fn rows(category: &Category, indicators: &[Indicator]) -> Vec<Vec<String>> {
        indicators
            .iter()
            .map(|indicator| {
                vec![
                    indicator.title.clone(),
                    indicator.description.clone(),
                    category.name.clone(),
                    CREATED_STATUS_LABEL.to_string(),
                    indicator.created_at.format(TIMESTAMP_FORMAT).to_string(),
                ]
            })
            .collect()
    }

    pub fn generate(
        upload_id: Uuid,
        category: &Category,
        indicators: &[Indicator],
    ) -> Result<ReportArtifact> {
        let rows = Self::rows(category, indicators);
        let bytes = write_workbook(REPORT_SHEET_NAME, &REPORT_HEADER, &rows)?;
        Ok(ReportArtifact {
            file_name: Self::report_file_name(upload_id),
            bytes,
        })
    }
}
