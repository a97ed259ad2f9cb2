use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::{debug, info};

use crate::domain::FileFormat;
use crate::error::{EtlError, Result};
use crate::pipeline::table::{is_missing_token, Cell, Table};

/// Delimiters tried in order before falling back to sniffing
pub const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Delimiters the sniffer considers
const SNIFF_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_SAMPLE_LINES: usize = 20;

fn delimiter_name(delimiter: u8) -> &'static str {
    match delimiter {
        b',' => "comma",
        b';' => "semicolon",
        b'\t' => "tab",
        b'|' => "pipe",
        _ => "other",
    }
}

/// Loads an uploaded file into a generic table
pub struct TabularReader;

impl TabularReader {
    /// Read using a declared format tag such as `CSV` or `EXCEL`
    pub fn read(bytes: &[u8], declared_format: &str) -> Result<Table> {
        let format: FileFormat = declared_format.parse()?;
        Self::read_as(bytes, format)
    }

    pub fn read_as(bytes: &[u8], format: FileFormat) -> Result<Table> {
        let table = match format {
            FileFormat::Csv => read_csv(bytes)?,
            FileFormat::Excel => read_spreadsheet(bytes)?,
        };
        info!(
            "Read {} table: {} columns, {} rows",
            format,
            table.column_count(),
            table.row_count()
        );
        Ok(table)
    }
}

/// Decode file bytes as UTF-8 (BOM stripped), falling back to Windows-1252
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("Upload is not valid UTF-8, decoding as Windows-1252");
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text
        }
    }
}

fn read_csv(bytes: &[u8]) -> Result<Table> {
    let text = decode_text(bytes);
    let header_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut failures = Vec::new();

    for &delimiter in CANDIDATE_DELIMITERS.iter() {
        match parse_delimited(&text, delimiter, false) {
            Ok(table) if is_collapsed(&table, header_line, delimiter) => {
                debug!(
                    "Delimiter {} collapsed the header into one column",
                    delimiter_name(delimiter)
                );
                failures.push(format!("{}: single column", delimiter_name(delimiter)));
            }
            Ok(table) => {
                debug!("Parsed CSV with {} delimiter", delimiter_name(delimiter));
                return Ok(table);
            }
            Err(e) => {
                debug!("Delimiter {} failed: {}", delimiter_name(delimiter), e);
                failures.push(format!("{}: {}", delimiter_name(delimiter), e));
            }
        }
    }

    let delimiter = sniff_delimiter(&text).ok_or_else(|| {
        EtlError::UnreadableFile(format!("no usable delimiter ({})", failures.join("; ")))
    })?;
    debug!("Sniffed {} delimiter", delimiter_name(delimiter));
    parse_delimited(&text, delimiter, true).map_err(EtlError::UnreadableFile)
}

/// A one-column result is a failed attempt when the header holds another delimiter
fn is_collapsed(table: &Table, header_line: &str, delimiter: u8) -> bool {
    table.column_count() <= 1
        && SNIFF_DELIMITERS
            .iter()
            .filter(|&&d| d != delimiter)
            .any(|&d| header_line.contains(d as char))
}

/// A record that is one whitespace-only field came from a blank line
fn is_blank_line(record: &csv::StringRecord) -> bool {
    record.len() == 1 && record[0].trim().is_empty()
}

/// Parse with one delimiter. In strict mode every record must match the
/// header width; blank lines are skipped before that check.
fn parse_delimited(
    text: &str,
    delimiter: u8,
    flexible: bool,
) -> std::result::Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            if h.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                h.to_string()
            }
        })
        .collect();
    let width = columns.len();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        if is_blank_line(&record) {
            continue;
        }
        if !flexible && record.len() != width {
            return Err(format!(
                "record {} has {} fields, expected {}",
                rows.len() + 1,
                record.len(),
                width
            ));
        }
        let mut row: Vec<Cell> = record.iter().map(Cell::from_field).collect();
        row.resize(width, Cell::Empty);
        rows.push(row);
    }

    Ok(Table::new(columns, rows))
}

/// Pick the delimiter with a stable non-zero count per line, else the most frequent one
fn sniff_delimiter(text: &str) -> Option<u8> {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return None;
    }

    let count = |line: &str, d: u8| line.bytes().filter(|&b| b == d).count();

    let consistent = SNIFF_DELIMITERS.iter().copied().find(|&d| {
        let first = count(sample[0], d);
        first > 0 && sample.iter().all(|line| count(line, d) == first)
    });
    if consistent.is_some() {
        return consistent;
    }

    SNIFF_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, sample.iter().map(|line| count(line, d)).sum::<usize>()))
        .filter(|&(_, total)| total > 0)
        .max_by_key(|&(_, total)| total)
        .map(|(d, _)| d)
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| EtlError::UnreadableFile(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::UnreadableFile("workbook has no sheets".to_string()))?
        .map_err(|e| EtlError::UnreadableFile(e.to_string()))?;

    let mut rows_iter = range.rows();
    let columns: Vec<String> = match rows_iter.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(idx, cell)| match cell {
                Data::Empty => format!("Unnamed: {}", idx),
                Data::String(s) if s.is_empty() => format!("Unnamed: {}", idx),
                Data::String(s) => s.clone(),
                other => convert_cell(other).to_string(),
            })
            .collect(),
        None => Vec::new(),
    };
    let rows = rows_iter
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();

    Ok(Table::new(columns, rows))
}

fn convert_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) if is_missing_token(s) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}
