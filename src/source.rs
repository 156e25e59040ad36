// jogja_ingestor/src/source.rs
// Streaming CSV row source with delimiter sniffing.

use std::path::Path;

use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use futures_util::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info};

use crate::columns::RawRow;
use crate::error::{IngestorError, Result};

/// Header lines need more than this many semicolons before the file is read
/// as semicolon-delimited.
const SEMICOLON_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
        }
    }
}

/// Picks the delimiter from the header line. Some exports come out
/// semicolon-separated; everything else is treated as comma-separated.
pub fn sniff_delimiter(header_line: &str) -> Delimiter {
    let commas = header_line.matches(',').count();
    let semicolons = header_line.matches(';').count();
    debug!(commas, semicolons, "delimiter analysis");
    if semicolons > commas && semicolons > SEMICOLON_THRESHOLD {
        Delimiter::Semicolon
    } else {
        Delimiter::Comma
    }
}

/// Lazily yields [`RawRow`]s from delimited text.
pub struct CsvRowSource<R> {
    reader:  AsyncReader<R>,
    headers: Vec<String>,
    record:  StringRecord,
}

impl<R> CsvRowSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub async fn new(input: R, delimiter: Delimiter) -> Result<Self> {
        let mut reader = AsyncReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter.as_byte())
            .quote(b'"')
            .double_quote(true)
            .flexible(true)
            .create_reader(input);
        let headers = reader
            .headers()
            .await?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        Ok(Self {
            reader,
            headers,
            record: StringRecord::new(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Next row, or `None` at end of input. Blank lines are skipped by the
    /// reader; short rows are padded with empty values.
    pub async fn next_row(&mut self) -> Option<Result<RawRow>> {
        match self.reader.read_record(&mut self.record).await {
            Ok(true) => {
                let row = self
                    .headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), self.record.get(i).unwrap_or("").to_string()))
                    .collect();
                Some(Ok(row))
            },
            Ok(false) => None,
            Err(e) => Some(Err(IngestorError::from(e))),
        }
    }

    pub fn into_rows(self) -> impl Stream<Item = Result<RawRow>> + Send
    where
        R: 'static,
    {
        futures_util::stream::unfold(self, |mut source| async move {
            source.next_row().await.map(|row| (row, source))
        })
    }
}

/// Opens `path` for streaming. A missing file is fatal.
pub async fn open_csv(path: &Path) -> Result<CsvRowSource<tokio::fs::File>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(IngestorError::MissingInput(path.to_path_buf()));
    }

    let mut header_line = String::new();
    BufReader::new(tokio::fs::File::open(path).await?)
        .read_line(&mut header_line)
        .await?;
    let delimiter = sniff_delimiter(&header_line);
    if delimiter == Delimiter::Semicolon {
        info!("Detected semicolon delimiter in {}", path.display());
    }

    let source = CsvRowSource::new(tokio::fs::File::open(path).await?, delimiter).await?;
    info!(
        "Reading CSV file {} ({} columns: {:?})",
        path.display(),
        source.headers().len(),
        source.headers()
    );
    Ok(source)
}
