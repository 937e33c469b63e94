//! The streaming download pipeline: range handling, transparent gzip decoding, and integrity
//! verification of the on-wire bytes against the digests the server advertises.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt};

use crate::client::DOWNLOAD_BASE;
use crate::hash::{Algorithm, ObjectHasher};
use crate::{Error, ObjectHandle, Validation};

/// How to download an object: which digests to verify, and optionally which byte range to ask
/// for.
///
/// Ranges and validation are mutually exclusive: the server's digests describe the whole object,
/// so a slice of it can never be verified. Asking for both is an error.
#[derive(Debug, Clone, Default)]
pub struct DownloadConfig {
    /// Which digests to verify. Quietly does nothing when set to [`Validation::None`]; loudly
    /// rejected when combined with a range.
    pub validation: Validation,
    /// First byte to request, inclusive.
    pub start: Option<i64>,
    /// Last byte to request, inclusive. Negative with no `start` asks for the trailing |end|
    /// bytes of the object.
    pub end: Option<i64>,
}

impl DownloadConfig {
    /// Equivalent to `DownloadConfig::default()`: full object, both digests verified.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets which digests to verify.
    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Requests bytes starting at `start`, inclusive.
    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Requests bytes up to `end`, inclusive. A negative `end` without a `start` requests the
    /// last |end| bytes of the object.
    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    fn is_range(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    fn check(&self) -> Result<(), Error> {
        if self.is_range() && self.validation.enabled() {
            return Err(Error::Validation(
                "Cannot use validation with file ranges".to_string(),
            ));
        }
        Ok(())
    }

    fn range_header(&self) -> Option<String> {
        match (self.start, self.end) {
            (None, None) => None,
            // a tail request: the negative end doubles as "-N"
            (None, Some(end)) if end < 0 => Some(format!("bytes={}", end)),
            (start, end) => Some(format!(
                "bytes={}-{}",
                start.unwrap_or(0),
                end.map(|e| e.to_string()).unwrap_or_default(),
            )),
        }
    }
}

/// The digests the server advertised for an object in its `x-goog-hash` response header.
#[derive(Debug, Clone, Default, PartialEq)]
struct ServerHashes {
    crc32c: Option<String>,
    md5: Option<String>,
}

fn parse_goog_hash(headers: &reqwest::header::HeaderMap) -> ServerHashes {
    let mut hashes = ServerHashes::default();
    for value in headers.get_all("x-goog-hash") {
        let Ok(value) = value.to_str() else { continue };
        for entry in value.split(',') {
            // the base64 digest itself contains '=' padding, so only the first one splits
            match entry.trim().split_once('=') {
                Some(("crc32c", digest)) => hashes.crc32c = Some(digest.to_string()),
                Some(("md5", digest)) => hashes.md5 = Some(digest.to_string()),
                _ => {}
            }
        }
    }
    hashes
}

/// Feeds every chunk that passes through into the shared hasher, before any decoding happens.
pub(crate) struct HashTap<S> {
    inner: S,
    hasher: Option<Arc<Mutex<ObjectHasher>>>,
}

impl<S> HashTap<S> {
    pub(crate) fn new(inner: S, hasher: Option<Arc<Mutex<ObjectHasher>>>) -> Self {
        Self { inner, hasher }
    }
}

impl<S: Stream<Item = Result<Bytes, Error>> + Unpin> Stream for HashTap<S> {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let polled = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            if let Some(hasher) = &self.hasher {
                hasher.lock().unwrap().update(chunk);
            }
        }
        polled
    }
}

struct IntegrityCheck {
    hasher: Arc<Mutex<ObjectHasher>>,
    expected: ServerHashes,
}

impl IntegrityCheck {
    fn verify(self) -> Result<(), Error> {
        let hasher = self.hasher.lock().unwrap();
        for (algorithm, expected) in [
            (Algorithm::Crc32c, self.expected.crc32c),
            (Algorithm::Md5, self.expected.md5),
        ] {
            let Some(expected) = expected else { continue };
            if hasher.test(algorithm, &expected) == Some(false) {
                return Err(Error::DownloadMismatch {
                    algorithm: algorithm.name(),
                    expected,
                    computed: hasher.digest(algorithm).unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

/// A downloaded object's byte stream.
///
/// Yields the (decompressed, when the server sent gzip) object bytes. When integrity checking is
/// active the final item is an [`Error::DownloadMismatch`] if the on-wire bytes do not digest to
/// what the server advertised. Dropping the stream aborts the request and releases the
/// connection; nothing is persisted for downloads.
pub struct ObjectStream {
    headers: reqwest::header::HeaderMap,
    size: Option<u64>,
    inner: BoxStream<'static, Result<Bytes, Error>>,
    check: Option<IntegrityCheck>,
}

impl ObjectStream {
    /// The response headers the server sent before the body, `x-goog-hash` included.
    pub fn headers(&self) -> &reqwest::header::HeaderMap {
        &self.headers
    }

    /// The on-wire `Content-Length`, when the server sent one. For gzip transfers this counts
    /// compressed bytes, not the bytes this stream yields.
    pub fn content_length(&self) -> Option<u64> {
        self.size
    }
}

impl Stream for ObjectStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(None) => match self.check.take().map(IntegrityCheck::verify) {
                Some(Err(mismatch)) => Poll::Ready(Some(Err(mismatch))),
                _ => Poll::Ready(None),
            },
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.size.and_then(|s| usize::try_from(s).ok());
        (size.unwrap_or(0), size)
    }
}

pub(crate) fn wrap_io(err: Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err)
}

pub(crate) fn unwrap_io(err: std::io::Error) -> Error {
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<Error>() {
            Ok(ours) => *ours,
            Err(other) => Error::Io(std::io::Error::new(kind, other)),
        },
        None => Error::Io(kind.into()),
    }
}

/// Builds the consumer-visible byte stream: tap the raw bytes for hashing, then decode gzip if
/// the server applied it.
fn decode_body<S>(
    raw: S,
    gzipped: bool,
    hasher: Option<Arc<Mutex<ObjectHasher>>>,
) -> BoxStream<'static, Result<Bytes, Error>>
where
    S: Stream<Item = Result<Bytes, Error>> + Send + Unpin + 'static,
{
    let tapped = HashTap { inner: raw, hasher };
    if gzipped {
        let reader = tokio_util::io::StreamReader::new(tapped.map_err(wrap_io));
        let decoder = async_compression::tokio::bufread::GzipDecoder::new(reader);
        tokio_util::io::ReaderStream::new(decoder)
            .map_err(unwrap_io)
            .boxed()
    } else {
        tapped.boxed()
    }
}

impl<'a> ObjectHandle<'a> {
    /// Streams the content of this object.
    ///
    /// The returned [`ObjectStream`] carries the response headers; the request is aborted if the
    /// stream is dropped early. With validation enabled (and no range configured), the bytes as
    /// they came over the wire are digested and compared against the server's `x-goog-hash`
    /// header once the body completes; a corrupt transfer surfaces as
    /// [`Error::DownloadMismatch`].
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use futures_util::StreamExt;
    /// use gcs_objects::{Client, DownloadConfig};
    ///
    /// let client = Client::default();
    /// let mut stream = client
    ///     .object("my_bucket", "path/to/my/file.png")
    ///     .download_stream(DownloadConfig::default())
    ///     .await?;
    /// while let Some(chunk) = stream.next().await {
    ///     let chunk = chunk?;
    ///     // write it somewhere
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download_stream(&self, config: DownloadConfig) -> Result<ObjectStream, Error> {
        self.check_addressable()?;
        config.check()?;

        let url = format!(
            "{}/{}/{}",
            DOWNLOAD_BASE,
            crate::percent_encode(self.bucket()),
            crate::percent_encode_noslash(self.name()),
        );
        let mut headers = self.client().get_headers().await?;
        headers.insert(reqwest::header::ACCEPT_ENCODING, "gzip".parse()?);
        if let Some(range) = config.range_header() {
            headers.insert(reqwest::header::RANGE, range.parse()?);
        }
        let mut request = self.client().reqwest.get(&url).headers(headers);
        if let Some(generation) = self.generation() {
            request = request.query(&[("generation", generation)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::new(&response.text().await?));
        }

        let headers = response.headers().clone();
        let size = response.content_length();
        let gzipped = headers
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |encoding| encoding.contains("gzip"));

        // Integrity covers what the server stored, so the hasher taps the wire bytes and only
        // full-object downloads qualify.
        let hasher = if config.is_range() {
            None
        } else {
            ObjectHasher::for_validation(config.validation).map(|h| Arc::new(Mutex::new(h)))
        };
        let check = hasher.clone().map(|hasher| IntegrityCheck {
            hasher,
            expected: parse_goog_hash(&headers),
        });

        let raw = response.bytes_stream().map_err(Error::from);
        Ok(ObjectStream {
            inner: decode_body(raw, gzipped, hasher),
            headers,
            size,
            check,
        })
    }

    /// Downloads the content of this object into memory.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::{Client, DownloadConfig};
    ///
    /// let client = Client::default();
    /// let bytes = client
    ///     .object("my_bucket", "path/to/my/file.png")
    ///     .download(DownloadConfig::default())
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download(&self, config: DownloadConfig) -> Result<Vec<u8>, Error> {
        let mut stream = self.download_stream(config).await?;
        let mut content = Vec::with_capacity(stream.size_hint().0);
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk?);
        }
        Ok(content)
    }

    /// Downloads the content of this object to a local file, without holding it all in memory.
    pub async fn download_to_file(
        &self,
        path: impl AsRef<std::path::Path>,
        config: DownloadConfig,
    ) -> Result<(), Error> {
        use tokio::io::AsyncWriteExt;

        let mut stream = self.download_stream(config).await?;
        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn ranged(start: Option<i64>, end: Option<i64>) -> DownloadConfig {
        DownloadConfig {
            validation: Validation::None,
            start,
            end,
        }
    }

    #[test]
    fn range_headers_cover_normal_and_tail_requests() {
        assert_eq!(ranged(None, None).range_header(), None);
        assert_eq!(ranged(Some(2), Some(4)).range_header().unwrap(), "bytes=2-4");
        assert_eq!(ranged(Some(5), None).range_header().unwrap(), "bytes=5-");
        assert_eq!(ranged(None, Some(999)).range_header().unwrap(), "bytes=0-999");
        assert_eq!(ranged(None, Some(-100)).range_header().unwrap(), "bytes=-100");
        // a start pins the negative end to a literal (nonsensical, but not a tail request)
        assert_eq!(ranged(Some(0), Some(-1)).range_header().unwrap(), "bytes=0--1");
    }

    #[test]
    fn ranges_and_validation_do_not_mix() {
        let config = DownloadConfig::new().start(2).end(4);
        let err = config.check().unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg == "Cannot use validation with file ranges"));

        assert!(ranged(Some(2), Some(4)).check().is_ok());
        assert!(DownloadConfig::new().check().is_ok());
    }

    #[test]
    fn goog_hash_parsing_takes_what_it_knows() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-goog-hash",
            "crc32c=mnG7TA==,md5=XUFAKrxLKna5cZ2REBfFkg==".parse().unwrap(),
        );
        let hashes = parse_goog_hash(&headers);
        assert_eq!(hashes.crc32c.as_deref(), Some("mnG7TA=="));
        assert_eq!(hashes.md5.as_deref(), Some("XUFAKrxLKna5cZ2REBfFkg=="));

        let mut split = reqwest::header::HeaderMap::new();
        split.append("x-goog-hash", "crc32c=mnG7TA==".parse().unwrap());
        split.append("x-goog-hash", "sha256=ignored,md5=XUFAKrxLKna5cZ2REBfFkg==".parse().unwrap());
        assert_eq!(parse_goog_hash(&split), hashes);

        assert_eq!(parse_goog_hash(&reqwest::header::HeaderMap::new()), ServerHashes::default());
    }

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, Error>> + Send + Unpin + 'static {
        let parts: Vec<Result<Bytes, Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(parts)
    }

    fn stream_with_check(
        parts: &[&[u8]],
        advertised: ServerHashes,
    ) -> ObjectStream {
        let hasher = Arc::new(Mutex::new(
            ObjectHasher::for_validation(Validation::Both).unwrap(),
        ));
        ObjectStream {
            headers: reqwest::header::HeaderMap::new(),
            size: None,
            inner: decode_body(chunks(parts), false, Some(hasher.clone())),
            check: Some(IntegrityCheck {
                hasher,
                expected: advertised,
            }),
        }
    }

    #[tokio::test]
    async fn an_intact_download_completes_cleanly() {
        let mut stream = stream_with_check(
            &[b"he", b"llo"],
            ServerHashes {
                crc32c: Some("mnG7TA==".to_string()),
                md5: Some("XUFAKrxLKna5cZ2REBfFkg==".to_string()),
            },
        );
        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn a_tampered_download_fails_with_a_mismatch_code() {
        // digests advertised for "hello", bytes of "hellx"
        let mut stream = stream_with_check(
            &[b"hellx"],
            ServerHashes {
                crc32c: Some("mnG7TA==".to_string()),
                md5: None,
            },
        );
        let mut last = None;
        while let Some(item) = stream.next().await {
            last = Some(item);
        }
        let err = last.unwrap().unwrap_err();
        assert_eq!(err.code(), Some("CONTENT_DOWNLOAD_MISMATCH"));
    }

    #[tokio::test]
    async fn absent_server_digests_are_not_an_error() {
        let mut stream = stream_with_check(&[b"hello"], ServerHashes::default());
        let mut ok = true;
        while let Some(item) = stream.next().await {
            ok &= item.is_ok();
        }
        assert!(ok);
    }

    #[tokio::test]
    async fn gzip_bodies_hash_compressed_and_yield_decompressed() {
        use tokio::io::AsyncWriteExt;

        let mut encoder =
            async_compression::tokio::write::GzipEncoder::new(Vec::new());
        encoder.write_all(b"hello").await.unwrap();
        encoder.shutdown().await.unwrap();
        let compressed = encoder.into_inner();

        let mut wire_hasher = ObjectHasher::for_validation(Validation::Crc32c).unwrap();
        wire_hasher.update(&compressed);
        let wire_crc = wire_hasher.digest(Algorithm::Crc32c).unwrap();

        let hasher = Arc::new(Mutex::new(
            ObjectHasher::for_validation(Validation::Crc32c).unwrap(),
        ));
        let mut decoded = decode_body(chunks(&[compressed.as_slice()]), true, Some(hasher.clone()));
        let mut received = Vec::new();
        while let Some(chunk) = decoded.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, b"hello");
        // the tap saw the wire bytes, not the decompressed ones
        assert_eq!(
            hasher.lock().unwrap().digest(Algorithm::Crc32c).unwrap(),
            wire_crc,
        );
    }
}
