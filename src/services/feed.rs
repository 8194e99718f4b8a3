//! Streaming JSON feed reader
//!
//! Fetches a JSON document over HTTP and yields the values found under a
//! JSON pointer one record at a time, without buffering the whole body.
//! Only the bytes of the record currently being decoded are held in memory,
//! which keeps multi-megabyte catalogs cheap to walk.
//!
//! # Pointer semantics
//!
//! - `/channel/item` - when the target is an array, each element is a record;
//!   when it is an object, each member value is a record; a scalar target is a
//!   single record.
//! - `-` matches every array index: `/channel/-/programme` walks the
//!   `programme` array of every element of `channel`.
//! - `~1` and `~0` unescape to `/` and `~`.
//!
//! Record streams are single-pass: the HTTP body is consumed as the stream is
//! polled, and reading the feed again requires a fresh request.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::services::metrics;

/// Bytes requested from the body per read
const READ_CHUNK_BYTES: usize = 16 * 1024;

/// Upper bound for a single captured record
const MAX_RECORD_BYTES: usize = 8 * 1024 * 1024;

/// Feed reader errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON at byte {offset}: {reason}")]
    Syntax { offset: u64, reason: &'static str },
    #[error("record exceeds {0} bytes")]
    RecordTooLarge(usize),
    #[error("record decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FeedError {
    /// A single record failed to decode; the rest of the stream is still usable
    pub fn is_record_error(&self) -> bool {
        matches!(self, FeedError::Decode(_))
    }
}

/// Stream of decoded records
pub type RecordStream<T> = BoxStream<'static, Result<T, FeedError>>;

// ============================================================================
// JSON Pointer
// ============================================================================

/// Parsed JSON pointer with `-` wildcard support
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointer {
    segments: Vec<String>,
}

/// One step in the path to the value currently being scanned
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathElem {
    Key(String),
    Index(usize),
}

impl JsonPointer {
    pub const WILDCARD: &'static str = "-";

    /// Parse a pointer such as `/channel/item`; the empty string is the root
    pub fn parse(pointer: &str) -> Self {
        let segments = pointer
            .split('/')
            .skip(1)
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect();
        Self { segments }
    }

    fn len(&self) -> usize {
        self.segments.len()
    }

    fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| s == Self::WILDCARD)
    }

    fn matches(&self, depth: usize, elem: &PathElem) -> bool {
        let Some(segment) = self.segments.get(depth) else {
            return false;
        };
        match elem {
            PathElem::Key(key) => segment == key,
            PathElem::Index(index) => {
                segment == Self::WILDCARD || segment.parse::<usize>().ok() == Some(*index)
            }
        }
    }
}

impl From<&str> for JsonPointer {
    fn from(pointer: &str) -> Self {
        Self::parse(pointer)
    }
}

// ============================================================================
// Byte source
// ============================================================================

struct ByteSource<R> {
    inner: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    offset: u64,
}

impl<R: AsyncRead + Unpin> ByteSource<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; READ_CHUNK_BYTES].into_boxed_slice(),
            pos: 0,
            len: 0,
            offset: 0,
        }
    }

    async fn peek(&mut self) -> Result<Option<u8>, FeedError> {
        if self.pos == self.len {
            self.len = self.inner.read(&mut self.buf).await?;
            self.pos = 0;
            if self.len == 0 {
                return Ok(None);
            }
        }
        Ok(Some(self.buf[self.pos]))
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.offset += 1;
    }

    async fn next(&mut self) -> Result<u8, FeedError> {
        match self.peek().await? {
            Some(b) => {
                self.advance();
                Ok(b)
            }
            None => Err(self.syntax("unexpected end of input")),
        }
    }

    /// Skip whitespace and return the next significant byte without consuming it
    async fn skip_ws(&mut self) -> Result<Option<u8>, FeedError> {
        loop {
            match self.peek().await? {
                Some(b' ' | b'\n' | b'\r' | b'\t') => self.advance(),
                other => return Ok(other),
            }
        }
    }

    async fn significant(&mut self) -> Result<u8, FeedError> {
        self.skip_ws()
            .await?
            .ok_or_else(|| self.syntax("unexpected end of input"))
    }

    fn syntax(&self, reason: &'static str) -> FeedError {
        FeedError::Syntax {
            offset: self.offset,
            reason,
        }
    }

    /// Consume one complete value, returning its raw bytes when `capture` is set
    async fn consume_value(&mut self, capture: bool) -> Result<Option<Vec<u8>>, FeedError> {
        let mut out = capture.then(Vec::new);
        let first = self.significant().await?;

        match first {
            b'{' | b'[' => {
                let mut depth = 0usize;
                loop {
                    let b = self.next().await?;
                    push(&mut out, b)?;
                    match b {
                        b'"' => self.consume_string_body(&mut out).await?,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            b'"' => {
                self.advance();
                push(&mut out, b'"')?;
                self.consume_string_body(&mut out).await?;
            }
            b'}' | b']' | b',' | b':' => return Err(self.syntax("expected a value")),
            _ => {
                while let Some(b) = self.peek().await? {
                    if matches!(b, b',' | b'}' | b']' | b' ' | b'\n' | b'\r' | b'\t') {
                        break;
                    }
                    self.advance();
                    push(&mut out, b)?;
                }
            }
        }

        Ok(out)
    }

    /// Consume a string after its opening quote, through the closing quote
    async fn consume_string_body(&mut self, out: &mut Option<Vec<u8>>) -> Result<(), FeedError> {
        loop {
            let b = self.next().await?;
            push(out, b)?;
            match b {
                b'\\' => {
                    let escaped = self.next().await?;
                    push(out, escaped)?;
                }
                b'"' => return Ok(()),
                _ => {}
            }
        }
    }

    /// Read an object member key and its `:` separator
    async fn read_member_key(&mut self) -> Result<String, FeedError> {
        if self.significant().await? != b'"' {
            return Err(self.syntax("expected object key"));
        }
        let raw = self.consume_value(true).await?.unwrap_or_default();
        let key: String = serde_json::from_slice(&raw)?;

        if self.significant().await? != b':' {
            return Err(self.syntax("expected ':' after object key"));
        }
        self.advance();
        Ok(key)
    }
}

fn push(out: &mut Option<Vec<u8>>, b: u8) -> Result<(), FeedError> {
    if let Some(buf) = out.as_mut() {
        if buf.len() >= MAX_RECORD_BYTES {
            return Err(FeedError::RecordTooLarge(MAX_RECORD_BYTES));
        }
        buf.push(b);
    }
    Ok(())
}

// ============================================================================
// Path scanner
// ============================================================================

#[derive(Debug)]
struct Frame {
    array: bool,
    index: usize,
    key: Option<String>,
    /// This container is the pointer target; its children are records
    emitting: bool,
}

impl Frame {
    fn elem(&self) -> PathElem {
        if self.array {
            PathElem::Index(self.index)
        } else {
            PathElem::Key(self.key.clone().unwrap_or_default())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectValue,
    AfterValue,
    Done,
}

enum Relation {
    /// The value sits exactly at the pointer
    Target,
    /// The value is a direct child of the target container
    Record,
    /// The value is on the way to the pointer
    Ancestor,
    Unrelated,
}

/// Incremental scanner yielding the raw bytes of each record under a pointer
struct PathScanner<R> {
    source: ByteSource<R>,
    pointer: JsonPointer,
    wildcard: bool,
    stack: Vec<Frame>,
    state: State,
}

impl<R: AsyncRead + Unpin> PathScanner<R> {
    fn new(reader: R, pointer: JsonPointer) -> Self {
        Self {
            source: ByteSource::new(reader),
            wildcard: pointer.has_wildcard(),
            pointer,
            stack: Vec::new(),
            state: State::ExpectValue,
        }
    }

    fn relation(&self) -> Relation {
        let depth = self.stack.len();
        let target = self.pointer.len();

        if depth == target + 1 && self.stack[target].emitting {
            return Relation::Record;
        }
        if depth > target {
            return Relation::Unrelated;
        }

        let on_path = self
            .stack
            .iter()
            .enumerate()
            .all(|(i, frame)| self.pointer.matches(i, &frame.elem()));

        match (on_path, depth == target) {
            (false, _) => Relation::Unrelated,
            (true, true) => Relation::Target,
            (true, false) => Relation::Ancestor,
        }
    }

    /// State after the target (or a container) has been fully read
    fn after_target(&self) -> State {
        if self.wildcard {
            State::AfterValue
        } else {
            State::Done
        }
    }

    async fn enter(&mut self, open: u8, emitting: bool) -> Result<(), FeedError> {
        self.source.advance();
        let array = open == b'[';
        let close = if array { b']' } else { b'}' };

        if self.source.significant().await? == close {
            self.source.advance();
            self.state = if emitting {
                self.after_target()
            } else {
                State::AfterValue
            };
            return Ok(());
        }

        let key = if array {
            None
        } else {
            Some(self.source.read_member_key().await?)
        };

        self.stack.push(Frame {
            array,
            index: 0,
            key,
            emitting,
        });
        self.state = State::ExpectValue;
        Ok(())
    }

    async fn next_raw(&mut self) -> Result<Option<Vec<u8>>, FeedError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::ExpectValue => match self.relation() {
                    Relation::Record => {
                        let raw = self.source.consume_value(true).await?;
                        self.state = State::AfterValue;
                        return Ok(raw);
                    }
                    Relation::Target => {
                        let b = self.source.significant().await?;
                        if b == b'{' || b == b'[' {
                            self.enter(b, true).await?;
                        } else {
                            let raw = self.source.consume_value(true).await?;
                            self.state = if self.stack.is_empty() {
                                State::Done
                            } else {
                                self.after_target()
                            };
                            return Ok(raw);
                        }
                    }
                    Relation::Ancestor => {
                        let b = self.source.significant().await?;
                        if b == b'{' || b == b'[' {
                            self.enter(b, false).await?;
                        } else {
                            self.source.consume_value(false).await?;
                            self.state = State::AfterValue;
                        }
                    }
                    Relation::Unrelated => {
                        self.source.consume_value(false).await?;
                        self.state = State::AfterValue;
                    }
                },
                State::AfterValue => {
                    let Some(array) = self.stack.last().map(|f| f.array) else {
                        self.state = State::Done;
                        continue;
                    };

                    let b = self.source.significant().await?;
                    self.source.advance();

                    match (b, array) {
                        (b',', true) => {
                            if let Some(frame) = self.stack.last_mut() {
                                frame.index += 1;
                            }
                            self.state = State::ExpectValue;
                        }
                        (b',', false) => {
                            let key = self.source.read_member_key().await?;
                            if let Some(frame) = self.stack.last_mut() {
                                frame.key = Some(key);
                            }
                            self.state = State::ExpectValue;
                        }
                        (b']', true) | (b'}', false) => {
                            let finished = self.stack.pop();
                            if finished.map(|f| f.emitting).unwrap_or(false) {
                                self.state = self.after_target();
                            }
                        }
                        _ => return Err(self.source.syntax("expected ',' or closing bracket")),
                    }
                }
            }
        }
    }
}

/// Decode every record found under `pointer` in a JSON byte source.
///
/// A record that fails to decode yields `Err(FeedError::Decode)` and the scan
/// continues; any other error is yielded once and ends the stream.
pub fn decode_records<R, T>(reader: R, pointer: JsonPointer) -> impl Stream<Item = Result<T, FeedError>>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    stream! {
        let mut scanner = PathScanner::new(reader, pointer);
        loop {
            match scanner.next_raw().await {
                Ok(Some(raw)) => yield serde_json::from_slice::<T>(&raw).map_err(FeedError::from),
                Ok(None) => break,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

// ============================================================================
// HTTP feed reader
// ============================================================================

/// HTTP collaborator for one provider: plain GETs, streamed or buffered
#[derive(Clone)]
pub struct FeedReader {
    http: Client,
    provider: &'static str,
}

impl FeedReader {
    pub fn new(http: Client, provider: &'static str) -> Self {
        Self { http, provider }
    }

    /// Issue a GET and fail on non-2xx status
    pub async fn open(
        &self,
        url: &str,
        feed: &'static str,
        headers: Option<HeaderMap>,
    ) -> Result<Response, FeedError> {
        debug!(provider = self.provider, feed, "GET {}", url);
        metrics::record_request(self.provider, feed);

        let mut request = self.http.get(url);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }

        let result = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FeedError::Http(status.as_u16()));
            }
            Ok(response)
        }
        .await;

        if result.is_err() {
            metrics::record_failure(self.provider, feed);
        }
        result
    }

    /// Fetch a whole body as text
    pub async fn fetch_text(
        &self,
        url: &str,
        feed: &'static str,
        headers: Option<HeaderMap>,
    ) -> Result<String, FeedError> {
        let response = self.open(url, feed, headers).await?;
        Ok(response.text().await?)
    }

    /// Fetch and decode a small document in one piece
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str, feed: &'static str) -> Result<T, FeedError> {
        let response = self.open(url, feed, None).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Lazily stream the records under `pointer`. Nothing is requested until
    /// the stream is first polled.
    pub fn stream_records<T>(&self, url: String, feed: &'static str, pointer: JsonPointer) -> RecordStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let reader = self.clone();
        stream! {
            let response = match reader.open(&url, feed, None).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let records = records_from_response::<T>(response, pointer);
            futures::pin_mut!(records);
            while let Some(record) = records.next().await {
                yield record;
            }
        }
        .boxed()
    }
}

/// Stream records out of an already-open response body
pub fn records_from_response<T>(response: Response, pointer: JsonPointer) -> impl Stream<Item = Result<T, FeedError>>
where
    T: DeserializeOwned + Send + 'static,
{
    let body = response
        .bytes_stream()
        .map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
    let reader = StreamReader::new(Box::pin(body));
    decode_records(reader, pointer)
}

/// Accept upstream identifiers encoded either as strings or numbers
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}
