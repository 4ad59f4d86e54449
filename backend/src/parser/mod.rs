//! CSV reading and writing with encoding and delimiter auto-detection.
//!
//! Rows are read into [`FlatRow`]s keyed by header. Nothing here knows
//! about streams or edges.

use std::io::Write;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::FlatRow;

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed rows, keyed by header, in file order
    pub records: Vec<FlatRow>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
    /// 1-based data row number of each record, counting skipped blank rows
    pub row_numbers: Vec<usize>,
}

impl ParseResult {
    /// Records paired with their data row number.
    pub fn numbered_records(&self) -> impl Iterator<Item = (usize, &FlatRow)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (self.row_numbers.get(i).copied().unwrap_or(i + 1), record))
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);

    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(String::from_utf8(bytes.to_vec())
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => Ok(enc.decode(bytes).0.to_string()),
            None => Err(CsvError::EncodingError(format!("unsupported encoding '{}'", other))),
        },
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn delimiter_byte(delimiter: char) -> CsvResult<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(CsvError::WriteError(format!(
            "delimiter '{}' is not a single-byte character",
            delimiter
        )))
    }
}

/// Parse CSV text with an explicit delimiter.
///
/// Quoting follows RFC 4180. Blank lines are skipped, short rows are padded
/// with empty cells and extra cells are ignored.
///
/// # Example
/// ```ignore
/// use txedit::parser::parse_str;
///
/// let result = parse_str("id,name\ns1,One", ',', "utf-8".into()).unwrap();
/// assert_eq!(result.records[0]["name"], "One");
/// ```
pub fn parse_str(content: &str, delimiter: char, encoding: String) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(CsvError::NoHeaders);
    }

    let mut records = Vec::new();
    let mut row_numbers = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result?;

        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut flat = FlatRow::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            flat.insert(header.clone(), row.get(i).unwrap_or("").to_string());
        }
        records.push(flat);
        row_numbers.push(index + 1);
    }

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
        row_numbers,
    })
}

/// Parse CSV bytes. Encoding and delimiter are detected unless given.
pub fn parse_bytes(
    bytes: &[u8],
    delimiter: Option<char>,
    encoding: Option<&str>,
) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let encoding = encoding
        .map(str::to_string)
        .unwrap_or_else(|| detect_encoding(bytes));
    let content = decode_content(bytes, &encoding)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    parse_str(&content, delimiter, encoding)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    parse_bytes(bytes, None, None)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
///
/// # Example
/// ```ignore
/// let result = parse_file_auto("/path/to/streams.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", result.encoding, result.delimiter);
/// println!("Rows: {}", result.records.len());
/// ```
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

// =============================================================================
// Writing
// =============================================================================

/// A header plus rows, ready to be written as CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<FlatRow>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<FlatRow>) -> Self {
        Self { headers, rows }
    }

    /// Write the table. Missing cells are written as `missing`.
    pub fn write<W: Write>(&self, writer: W, delimiter: char, missing: &str) -> CsvResult<()> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(delimiter_byte(delimiter)?)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        out.write_record(&self.headers)?;
        for row in &self.rows {
            out.write_record(
                self.headers
                    .iter()
                    .map(|h| row.get(h).map(String::as_str).unwrap_or(missing)),
            )?;
        }
        out.flush()?;
        Ok(())
    }

    /// Render as a UTF-8 CSV string.
    pub fn to_csv_string(&self, delimiter: char) -> CsvResult<String> {
        let mut buf = Vec::new();
        self.write(&mut buf, delimiter, "")?;
        String::from_utf8(buf).map_err(|e| CsvError::WriteError(e.to_string()))
    }

    /// Write to a file as UTF-8 CSV.
    pub fn write_file<P: AsRef<Path>>(&self, path: P, delimiter: char) -> CsvResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write(std::io::BufWriter::new(file), delimiter, "")
    }
}
