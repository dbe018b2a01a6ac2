use crate::core::{BatchError, FieldBindingSpec, RawTuple, RawTupleStream, Result, Source};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

/// Where the lines come from.
#[derive(Debug, Clone)]
pub enum Resource {
    File(PathBuf),
    Inline(String),
}

impl Resource {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Resource::File(path.as_ref().to_path_buf())
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Resource::Inline(text.into())
    }

    async fn reader(&self) -> Result<Pin<Box<dyn AsyncBufRead + Send>>> {
        match self {
            Resource::File(path) => {
                let file = File::open(path).await?;
                Ok(Box::pin(BufReader::new(file)))
            }
            Resource::Inline(text) => Ok(Box::pin(Cursor::new(text.clone().into_bytes()))),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File(path) => write!(f, "{}", path.display()),
            Resource::Inline(_) => write!(f, "<inline>"),
        }
    }
}

#[derive(Debug, Clone)]
struct LineFormat {
    delimiter: u8,
    expected_fields: usize,
    lines_to_skip: usize,
    comment_prefixes: Vec<String>,
    skip_blank_lines: bool,
}

impl LineFormat {
    fn read(&self, index: usize, line: std::io::Result<String>) -> Option<Result<RawTuple>> {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(BatchError::Io(e))),
        };

        if index < self.lines_to_skip
            || (self.skip_blank_lines && line.trim().is_empty())
            || self
                .comment_prefixes
                .iter()
                .any(|prefix| line.starts_with(prefix.as_str()))
        {
            return None;
        }

        let line_number = index + 1;
        let values = match split_fields(&line, self.delimiter) {
            Ok(values) => values,
            Err(e) => return Some(Err(e)),
        };

        if values.len() != self.expected_fields {
            return Some(Err(BatchError::MalformedRecord {
                line: line_number,
                expected: self.expected_fields,
                found: values.len(),
            }));
        }

        Some(Ok(RawTuple::new(line_number, values)))
    }
}

fn split_fields(line: &str, delimiter: u8) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(|f| f.trim().to_string()).collect()),
        // A blank line is one empty field.
        None => Ok(vec![String::new()]),
    }
}

/// Reads one raw tuple per delimited line. Lines whose field count differs
/// from the binding spec come out as `MalformedRecord` errors; the stream
/// itself keeps going so the caller decides whether to stop.
pub struct DelimitedSource {
    resource: Resource,
    format: LineFormat,
}

impl DelimitedSource {
    pub fn new(resource: Resource, spec: &FieldBindingSpec) -> Self {
        Self {
            resource,
            format: LineFormat {
                delimiter: b',',
                expected_fields: spec.len(),
                lines_to_skip: 0,
                comment_prefixes: vec!["#".to_string()],
                skip_blank_lines: false,
            },
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.format.delimiter = delimiter;
        self
    }

    pub fn with_lines_to_skip(mut self, lines_to_skip: usize) -> Self {
        self.format.lines_to_skip = lines_to_skip;
        self
    }

    pub fn with_comment_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.format.comment_prefixes = prefixes;
        self
    }

    /// Drops blank lines instead of checking them against the field count.
    pub fn with_skip_blank_lines(mut self, skip: bool) -> Self {
        self.format.skip_blank_lines = skip;
        self
    }
}

#[async_trait]
impl Source for DelimitedSource {
    async fn open(&self) -> Result<RawTupleStream> {
        let reader = self.resource.reader().await?;
        let lines = LinesStream::new(reader.lines());
        debug!(resource = %self.resource, "Opened delimited source");

        let format = self.format.clone();
        let stream = lines
            .enumerate()
            .filter_map(move |(index, line)| futures::future::ready(format.read(index, line)));

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<()> {
        debug!(resource = %self.resource, "Closed delimited source");
        Ok(())
    }
}
