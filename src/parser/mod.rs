//! Flat-file readers for add and remove batches.
//!
//! Add files start with a header naming the columns present; every following
//! line is one field record. Remove files carry one field name per line and
//! no header. Both readers are lazy: rows are pulled from the underlying
//! `BufRead` as the caller iterates.

use crate::constants::*;
use crate::error::{ReconError, Result};
use serde::Serialize;
use std::io::{BufRead, Lines};
use tracing::{debug, warn};

/// UTF-8 BOM, stripped from the first line if present
const UTF8_BOM: char = '\u{feff}';

/// A column declared in the add-file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderColumn {
    ReconFieldName,
    FieldType,
    IsRequired,
}

impl HeaderColumn {
    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case(RECON_FIELD_ATTR_NAME) {
            Some(HeaderColumn::ReconFieldName)
        } else if token.eq_ignore_ascii_case(RECON_FIELD_ATTR_TYPE) {
            Some(HeaderColumn::FieldType)
        } else if token.eq_ignore_ascii_case(RECON_FIELD_ATTR_ISREQUIRED) {
            Some(HeaderColumn::IsRequired)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderColumn::ReconFieldName => RECON_FIELD_ATTR_NAME,
            HeaderColumn::FieldType => RECON_FIELD_ATTR_TYPE,
            HeaderColumn::IsRequired => RECON_FIELD_ATTR_ISREQUIRED,
        }
    }
}

/// Ordered set of columns declared by an add-file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    columns: Vec<HeaderColumn>,
}

impl Header {
    /// Parse the header line. `None` means the file was empty.
    pub fn parse(line: Option<&str>, delimiter: &str) -> Result<Self> {
        let line = line.ok_or_else(|| ReconError::MissingHeader(header_names().join(", ")))?;
        let line = line.trim_start_matches(UTF8_BOM);

        let mut columns = Vec::new();
        for token in line.split(delimiter).map(str::trim).filter(|t| !t.is_empty()) {
            let column = HeaderColumn::from_token(token).ok_or_else(|| {
                ReconError::BadFormat(format!(
                    "Field attribute name '{}' is invalid. Valid attribute names are: {}",
                    token,
                    header_names().join(", ")
                ))
            })?;
            if columns.contains(&column) {
                return Err(ReconError::BadFormat(format!(
                    "Field attribute name '{}' is declared more than once",
                    column.as_str()
                )));
            }
            columns.push(column);
        }

        for required in [HeaderColumn::ReconFieldName, HeaderColumn::FieldType] {
            if !columns.contains(&required) {
                return Err(ReconError::MissingRequiredField(required.as_str().to_string()));
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[HeaderColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One data line of an add file, split into tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based, header is line 1
    pub line_number: usize,
    pub line: String,
    pub tokens: Vec<String>,
}

/// A line dropped by the reader before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub line_number: usize,
    pub line: String,
    pub expected_tokens: usize,
    pub found_tokens: usize,
}

fn check_delimiter(delimiter: &str) -> Result<()> {
    if delimiter.is_empty() {
        return Err(ReconError::Config("Delimiter must not be empty".to_string()));
    }
    Ok(())
}

/// Lazy reader over the records of an add file
pub struct AddFileReader<R: BufRead> {
    lines: Lines<R>,
    header: Header,
    delimiter: String,
    line_number: usize,
    skipped: Vec<SkippedLine>,
}

impl<R: BufRead> AddFileReader<R> {
    /// Read and validate the header. Fails before any data line is read.
    pub fn new(reader: R, delimiter: &str) -> Result<Self> {
        check_delimiter(delimiter)?;
        let mut lines = reader.lines();
        let first = lines.next().transpose()?;
        let header = Header::parse(first.as_deref(), delimiter)?;
        debug!("Add file header columns: {:?}", header.columns());

        Ok(Self {
            lines,
            header,
            delimiter: delimiter.to_string(),
            line_number: 1,
            skipped: Vec::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Drain the lines dropped so far because their token count did not
    /// match the header
    pub fn take_skipped(&mut self) -> Vec<SkippedLine> {
        std::mem::take(&mut self.skipped)
    }
}

impl<R: BufRead> Iterator for AddFileReader<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;

            let tokens: Vec<String> = line.split(self.delimiter.as_str()).map(str::to_string).collect();
            if tokens.len() != self.header.len() {
                warn!(
                    "[Warning] Line = {} : Size of row is invalid. Field will not be added: {}",
                    self.line_number, line
                );
                self.skipped.push(SkippedLine {
                    line_number: self.line_number,
                    expected_tokens: self.header.len(),
                    found_tokens: tokens.len(),
                    line,
                });
                continue;
            }

            return Some(Ok(RawRow {
                line_number: self.line_number,
                line,
                tokens,
            }));
        }
    }
}

/// A field name requested for removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameLine {
    pub line_number: usize,
    pub name: String,
}

/// Lazy reader over a remove file: one bare field name per line
pub struct RemoveFileReader<R: BufRead> {
    lines: Lines<R>,
    line_number: usize,
}

impl<R: BufRead> RemoveFileReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for RemoveFileReader<R> {
    type Item = Result<NameLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;

            let name = if self.line_number == 1 {
                line.trim_start_matches(UTF8_BOM).to_string()
            } else {
                line
            };
            if name.trim().is_empty() {
                debug!("Line {} is blank, skipping", self.line_number);
                continue;
            }

            return Some(Ok(NameLine {
                line_number: self.line_number,
                name,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn add_reader(content: &str) -> Result<AddFileReader<Cursor<&str>>> {
        AddFileReader::new(Cursor::new(content), ",")
    }

    #[test]
    fn test_header_is_case_insensitive() {
        let header = Header::parse(Some("reconfieldname,FIELDTYPE,IsRequired"), ",").unwrap();
        assert_eq!(
            header.columns(),
            &[HeaderColumn::ReconFieldName, HeaderColumn::FieldType, HeaderColumn::IsRequired]
        );
    }

    #[test]
    fn test_header_keeps_declared_order() {
        let header = Header::parse(Some("FieldType|ReconFieldName"), "|").unwrap();
        assert_eq!(header.columns(), &[HeaderColumn::FieldType, HeaderColumn::ReconFieldName]);
    }

    #[test]
    fn test_empty_file_is_missing_header() {
        assert!(matches!(add_reader(""), Err(ReconError::MissingHeader(_))));
    }

    #[test]
    fn test_unknown_header_token_is_bad_format() {
        let err = add_reader("ReconFieldName,FieldType,Length\n").err().unwrap();
        match err {
            ReconError::BadFormat(msg) => assert!(msg.contains("Length")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_repeated_header_token_is_bad_format() {
        let err = add_reader("ReconFieldName,FieldType,reconfieldname\n").err().unwrap();
        assert!(matches!(err, ReconError::BadFormat(_)));
    }

    #[test]
    fn test_header_requires_name_and_type() {
        let err = add_reader("FieldType,isRequired\n").err().unwrap();
        assert!(matches!(err, ReconError::MissingRequiredField(ref f) if f == "ReconFieldName"));

        let err = add_reader("ReconFieldName,isRequired\n").err().unwrap();
        assert!(matches!(err, ReconError::MissingRequiredField(ref f) if f == "FieldType"));
    }

    #[test]
    fn test_header_strips_bom() {
        let reader = add_reader("\u{feff}ReconFieldName,FieldType\n").unwrap();
        assert_eq!(reader.header().len(), 2);
    }

    #[test]
    fn test_empty_delimiter_is_rejected() {
        let err = AddFileReader::new(Cursor::new("ReconFieldName"), "").err().unwrap();
        assert!(matches!(err, ReconError::Config(_)));
    }

    #[test]
    fn test_rows_with_wrong_token_count_are_skipped() {
        let mut reader = add_reader(
            "ReconFieldName,FieldType,isRequired\n\
             UserLogin,String,1\n\
             Broken,String\n\
             TooMany,String,1,extra\n\
             Email,String,0\n",
        )
        .unwrap();

        let rows: Vec<RawRow> = reader.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tokens, vec!["UserLogin", "String", "1"]);
        assert_eq!(rows[0].line_number, 2);
        assert_eq!(rows[1].line_number, 5);

        let skipped = reader.take_skipped();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].line_number, 3);
        assert_eq!(skipped[0].found_tokens, 2);
        assert_eq!(skipped[1].found_tokens, 4);
    }

    #[test]
    fn test_trailing_empty_token_is_kept() {
        let mut reader = add_reader("ReconFieldName,FieldType,isRequired\nUserLogin,String,\n").unwrap();
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.tokens, vec!["UserLogin", "String", ""]);
    }

    #[test]
    fn test_multi_char_delimiter() {
        let mut reader =
            AddFileReader::new(Cursor::new("ReconFieldName::FieldType\nIT Res::IT Resource\n"), "::").unwrap();
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.tokens, vec!["IT Res", "IT Resource"]);
    }

    #[test]
    fn test_remove_reader_skips_blank_lines() {
        let names: Vec<NameLine> = RemoveFileReader::new(Cursor::new("UserLogin\r\n\nEmail\n   \nPhone"))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                NameLine { line_number: 1, name: "UserLogin".into() },
                NameLine { line_number: 3, name: "Email".into() },
                NameLine { line_number: 5, name: "Phone".into() },
            ]
        );
    }
}
