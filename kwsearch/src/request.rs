use std::path::{Path, PathBuf};

use crate::errors::{KwError, KwResult};

/// Longest directory path a request may carry
pub const MAX_DIR_PATH: usize = 1024;

/// Longest keyword a request may carry
pub const MAX_KEYWORD: usize = 256;

/// Bytes one record may occupy in the queue region: path, separator, keyword, terminator
pub const MAX_RECORD_LEN: usize = MAX_DIR_PATH + 1 + MAX_KEYWORD + 1;

/// Record that tells the dispatcher to stop accepting jobs
pub const EXIT_RECORD: &str = "exit";

/// A parsed `"<directoryPath> <keyword>"` job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Directory whose immediate entries are scanned
    pub directory: PathBuf,
    /// Whitespace-delimited token to look for
    pub keyword: String,
}

impl Request {
    pub fn new(directory: impl Into<PathBuf>, keyword: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            keyword: keyword.into(),
        }
    }

    /// Parses a record as the client wrote it.
    ///
    /// Fields are separated by spaces; anything after the keyword is ignored.
    pub fn parse(record: &str) -> KwResult<Self> {
        let mut fields = record.split(' ').filter(|f| !f.is_empty());
        let directory = fields
            .next()
            .ok_or_else(|| KwError::invalid_request("empty record"))?;
        let keyword = fields
            .next()
            .ok_or_else(|| KwError::invalid_request(format!("no keyword in {:?}", record)))?;

        if directory.len() > MAX_DIR_PATH {
            return Err(KwError::invalid_request(format!(
                "directory path is {} bytes, limit is {}",
                directory.len(),
                MAX_DIR_PATH
            )));
        }
        if keyword.len() > MAX_KEYWORD {
            return Err(KwError::invalid_request(format!(
                "keyword is {} bytes, limit is {}",
                keyword.len(),
                MAX_KEYWORD
            )));
        }

        Ok(Self::new(directory, keyword))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Whether a dequeued record is the shutdown sentinel
pub fn is_exit_record(record: &str) -> bool {
    record == EXIT_RECORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let req = Request::parse("/tmp/docs foo").unwrap();
        assert_eq!(req.directory, PathBuf::from("/tmp/docs"));
        assert_eq!(req.keyword, "foo");
    }

    #[test]
    fn test_parse_ignores_extra_fields_and_spaces() {
        let req = Request::parse("dir  needle trailing words").unwrap();
        assert_eq!(req.directory, PathBuf::from("dir"));
        assert_eq!(req.keyword, "needle");
    }

    #[test]
    fn test_parse_rejects_incomplete_records() {
        assert!(matches!(
            Request::parse(""),
            Err(KwError::InvalidRequest(_))
        ));
        assert!(matches!(
            Request::parse("/only/a/dir"),
            Err(KwError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_enforces_field_limits() {
        let long_dir = "d".repeat(MAX_DIR_PATH + 1);
        assert!(Request::parse(&format!("{} kw", long_dir)).is_err());

        let long_kw = "k".repeat(MAX_KEYWORD + 1);
        assert!(Request::parse(&format!("dir {}", long_kw)).is_err());

        let max_dir = "d".repeat(MAX_DIR_PATH);
        let max_kw = "k".repeat(MAX_KEYWORD);
        let record = format!("{} {}", max_dir, max_kw);
        assert_eq!(record.len() + 1, MAX_RECORD_LEN);
        assert!(Request::parse(&record).is_ok());
    }

    #[test]
    fn test_exit_record() {
        assert!(is_exit_record("exit"));
        assert!(!is_exit_record("exit "));
        assert!(!is_exit_record("/tmp exit"));
    }
}
