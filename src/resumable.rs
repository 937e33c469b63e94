//! The resumable upload state machine.
//!
//! A resumable upload is a server-tracked session: one POST creates it and yields a session url,
//! then PUTs with `Content-Range` append bytes until the body ends and the server answers with
//! the final object metadata. This module drives that protocol, persists the session across
//! process restarts, probes the server for how far an interrupted transfer got, skips what is
//! already there, and backs off and retries on transient failures.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{stream, Stream, StreamExt};
use rand::Rng;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::StatusCode;

use crate::client::UPLOAD_BASE;
use crate::hash::ObjectHasher;
use crate::models::GoogleResponse;
use crate::session::SessionRecord;
use crate::{Error, Object, ObjectHandle, UploadConfig};

/// How many failures a single upload may absorb before the error goes to the caller.
const RETRY_LIMIT: u32 = 5;
/// How many payload bytes identify it across invocations.
const FIRST_CHUNK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    /// No usable session: create one.
    Start,
    /// A persisted session exists: ask the server how much of it arrived.
    Probe,
    /// Send everything past the server's acknowledged offset.
    Transmit,
}

/// What to do about a failed round trip.
enum Failure {
    /// The session is gone (404): forget it and start a new one.
    Gone(Error),
    /// A transient failure (5xx or transport): back off, probe, resend.
    Retry(Error),
    /// Not recoverable: hand the error to the caller.
    Fatal(Error),
}

/// The mutable half of the machine: where we are, which session we hold, how much the server
/// acknowledged, and how much retry budget is burnt.
struct Machine {
    state: State,
    session_uri: Option<String>,
    /// The last byte offset the server acknowledged, -1 when unknown.
    bytes_written: i64,
    retries: u32,
}

impl Machine {
    fn restart_session(&mut self) {
        self.session_uri = None;
        self.bytes_written = -1;
        self.state = State::Start;
    }

    /// The shared error policy: 404 restarts the session, 5xx and transport errors back off
    /// and probe, everything else (and an exhausted retry budget) surfaces.
    async fn absorb(
        &mut self,
        failure: Failure,
        handle: &ObjectHandle<'_>,
        name: &str,
    ) -> Result<(), Error> {
        match failure {
            Failure::Gone(error) => {
                if self.retries >= RETRY_LIMIT {
                    return Err(error);
                }
                self.retries += 1;
                log::debug!("upload session for {} vanished, starting a new one", name);
                handle.client().sessions.delete(name).await?;
                self.restart_session();
                Ok(())
            }
            Failure::Retry(error) => {
                if self.retries >= RETRY_LIMIT {
                    return Err(error);
                }
                self.retries += 1;
                self.bytes_written = -1;
                let delay = backoff_delay(self.retries);
                log::debug!(
                    "upload of {} failed ({}), retry {} of {} in {:?}",
                    name,
                    error,
                    self.retries,
                    RETRY_LIMIT,
                    delay,
                );
                tokio::time::sleep(delay).await;
                self.state = if self.session_uri.is_some() { State::Probe } else { State::Start };
                Ok(())
            }
            Failure::Fatal(error) => Err(error),
        }
    }
}

/// Drives a whole resumable upload for `handle`, pulling a fresh payload stream out of `media`
/// for every transmission attempt.
pub(crate) async fn upload<F, S>(
    handle: &mut ObjectHandle<'_>,
    mut media: F,
    config: UploadConfig,
) -> Result<Object, Error>
where
    F: FnMut() -> S,
    S: Stream<Item = Result<Bytes, Error>> + Send + Unpin + 'static,
{
    let name = handle.name().to_string();

    let mut machine = match handle.client().sessions.get(&name).await? {
        Some(record) => {
            log::debug!("resuming upload session for {}", name);
            Machine {
                state: State::Probe,
                session_uri: Some(record.uri),
                bytes_written: -1,
                retries: 0,
            }
        }
        None => Machine {
            state: State::Start,
            session_uri: None,
            bytes_written: -1,
            retries: 0,
        },
    };

    loop {
        match machine.state {
            State::Start => match start_session(handle, &config).await {
                Ok(uri) => {
                    handle
                        .client()
                        .sessions
                        .put(&name, SessionRecord { uri: uri.clone(), first_chunk: None })
                        .await?;
                    machine.session_uri = Some(uri);
                    machine.bytes_written = -1;
                    machine.state = State::Transmit;
                }
                Err(failure) => machine.absorb(failure, handle, &name).await?,
            },
            State::Probe => {
                let Some(uri) = machine.session_uri.clone() else {
                    machine.state = State::Start;
                    continue;
                };
                machine.bytes_written = probe(handle, &uri).await?;
                log::debug!(
                    "upload session for {} has {} bytes on the server",
                    name,
                    machine.bytes_written + 1,
                );
                machine.state = State::Transmit;
            }
            State::Transmit => {
                let Some(uri) = machine.session_uri.clone() else {
                    machine.state = State::Start;
                    continue;
                };

                let source: BoxStream<'static, Result<Bytes, Error>> = if config.gzip {
                    crate::upload::gzip_stream(media())
                } else {
                    media().boxed()
                };
                let (first_chunk, source) = read_first_chunk(source).await?;

                // A resumed session must be carrying the same payload it started with; the
                // cached head of the stream is how we tell. A different payload under the same
                // name abandons the session before any byte reaches its url.
                match handle.client().sessions.get(&name).await? {
                    Some(record)
                        if record.first_chunk.as_deref() == Some(&first_chunk[..]) => {}
                    Some(record) if record.first_chunk.is_some() => {
                        log::debug!(
                            "payload for {} changed since its session was created, restarting",
                            name,
                        );
                        handle.client().sessions.delete(&name).await?;
                        machine.restart_session();
                        continue;
                    }
                    _ => {
                        // no chunk on record yet (or the record vanished): this attempt defines it
                        handle
                            .client()
                            .sessions
                            .put(
                                &name,
                                SessionRecord {
                                    uri: uri.clone(),
                                    first_chunk: Some(first_chunk.clone()),
                                },
                            )
                            .await?;
                    }
                }

                let offset = machine.bytes_written + 1;
                let hasher = ObjectHasher::for_validation(config.validation)
                    .map(|hasher| Arc::new(Mutex::new(hasher)));
                let gate = OffsetGate::new(source, offset as u64, hasher.clone());

                let headers = handle.client().get_headers().await?;
                let result = handle
                    .client()
                    .reqwest
                    .put(&uri)
                    .header(CONTENT_RANGE, format!("bytes {}-*/*", offset))
                    .headers(headers)
                    .body(reqwest::Body::wrap_stream(gate))
                    .send()
                    .await;

                let failure = match result {
                    Ok(response) if response.status().is_success() => {
                        let parsed: GoogleResponse<Object> = response.json().await?;
                        let hasher = hasher.map(|shared| shared.lock().unwrap().clone());
                        handle.client().sessions.delete(&name).await?;
                        return handle.finish_upload(parsed, hasher).await;
                    }
                    Ok(response) => classify_response(response).await,
                    Err(transport) => Failure::Retry(transport.into()),
                };
                machine.absorb(failure, handle, &name).await?;
            }
        }
    }
}

/// Exponential backoff with up to a second of jitter.
fn backoff_delay(retries: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..1000);
    Duration::from_millis(u64::from(2u32.pow(retries)) * 1000 + jitter)
}

/// POSTs the initial metadata; the `Location` header of the answer is the session url.
async fn start_session(
    handle: &ObjectHandle<'_>,
    config: &UploadConfig,
) -> Result<String, Failure> {
    let url = format!("{}/{}/o", UPLOAD_BASE, crate::percent_encode(handle.bucket()));
    let mut query: Vec<(&str, String)> = vec![
        ("uploadType", "resumable".to_string()),
        ("name", handle.name().to_string()),
    ];
    if let Some(generation) = handle.generation() {
        query.push(("ifGenerationMatch", generation.to_string()));
    }
    let mut headers = handle
        .client()
        .get_headers()
        .await
        .map_err(Failure::Fatal)?;
    if let Some(content_type) = config.content_type() {
        match content_type.parse() {
            Ok(value) => {
                headers.insert("X-Upload-Content-Type", value);
            }
            Err(e) => return Err(Failure::Fatal(Error::InvalidHeaderValue(e))),
        }
    }
    let response = handle
        .client()
        .reqwest
        .post(&url)
        .query(&query)
        .headers(headers)
        .json(&config.wire_metadata())
        .send()
        .await
        .map_err(|e| Failure::Retry(e.into()))?;

    if !response.status().is_success() {
        return Err(classify_response(response).await);
    }
    match response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
        Some(uri) => Ok(uri.to_string()),
        None => Err(Failure::Fatal(Error::new(
            "the upload session response carried no Location header",
        ))),
    }
}

/// Asks the session how much of the payload it has. 308 with a `Range` header answers that;
/// anything else means the server acknowledged nothing usable and we restart from byte 0.
async fn probe(handle: &ObjectHandle<'_>, uri: &str) -> Result<i64, Error> {
    let mut headers = handle.client().get_headers().await?;
    headers.insert(CONTENT_LENGTH, "0".parse()?);
    headers.insert(CONTENT_RANGE, "bytes */*".parse()?);
    let response = handle.client().reqwest.put(uri).headers(headers).send().await;
    Ok(match response {
        Ok(response) if response.status() == StatusCode::PERMANENT_REDIRECT => {
            parse_range_end(
                response
                    .headers()
                    .get(RANGE)
                    .and_then(|value| value.to_str().ok()),
            )
            .unwrap_or(-1)
        }
        _ => -1,
    })
}

/// The last acknowledged byte out of a `Range: bytes=0-N` header.
fn parse_range_end(range: Option<&str>) -> Option<i64> {
    range?.rsplit('-').next()?.trim().parse().ok()
}

async fn classify_response(response: reqwest::Response) -> Failure {
    let status = response.status();
    let error = match response.json::<crate::models::ErrorResponse>().await {
        Ok(envelope) => Error::Google(envelope),
        Err(_) => Error::Other(format!("upload session answered with status {}", status)),
    };
    if status == StatusCode::NOT_FOUND {
        Failure::Gone(error)
    } else if status.is_server_error() {
        Failure::Retry(error)
    } else {
        Failure::Fatal(error)
    }
}

/// Buffers the head of the stream until the payload's identifying prefix (or the whole payload,
/// if shorter) is known, then hands back the prefix together with the *complete* stream.
async fn read_first_chunk(
    mut source: BoxStream<'static, Result<Bytes, Error>>,
) -> Result<(Vec<u8>, BoxStream<'static, Result<Bytes, Error>>), Error> {
    let mut prefix = Vec::with_capacity(FIRST_CHUNK_LEN);
    let mut buffered = Vec::new();
    while prefix.len() < FIRST_CHUNK_LEN {
        match source.next().await {
            Some(Ok(chunk)) => {
                let take = (FIRST_CHUNK_LEN - prefix.len()).min(chunk.len());
                prefix.extend_from_slice(&chunk[..take]);
                buffered.push(Ok(chunk));
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }
    Ok((prefix, stream::iter(buffered).chain(source).boxed()))
}

/// Forwards only the bytes past the server-acknowledged offset, regardless of how the producer
/// chose its chunk boundaries, while feeding *every* byte to the hasher so the digests cover the
/// whole payload.
struct OffsetGate<S> {
    inner: S,
    skip: u64,
    seen: u64,
    hasher: Option<Arc<Mutex<ObjectHasher>>>,
}

impl<S> OffsetGate<S> {
    fn new(inner: S, skip: u64, hasher: Option<Arc<Mutex<ObjectHasher>>>) -> Self {
        Self { inner, skip, seen: 0, hasher }
    }
}

impl<S: Stream<Item = Result<Bytes, Error>> + Unpin> Stream for OffsetGate<S> {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        loop {
            match self.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if let Some(hasher) = &self.hasher {
                        hasher.lock().unwrap().update(&chunk);
                    }
                    let seen_before = self.seen;
                    self.seen += chunk.len() as u64;
                    if self.seen <= self.skip {
                        continue;
                    }
                    let start = self.skip.saturating_sub(seen_before) as usize;
                    let chunk = if start == 0 { chunk } else { chunk.slice(start..) };
                    return Poll::Ready(Some(Ok(chunk)));
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Algorithm, Validation};

    fn byte_stream(parts: &[&[u8]]) -> BoxStream<'static, Result<Bytes, Error>> {
        let parts: Vec<Result<Bytes, Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(parts).boxed()
    }

    async fn collect(mut stream: impl Stream<Item = Result<Bytes, Error>> + Unpin) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn the_gate_skips_exactly_the_acknowledged_prefix() {
        let gate = OffsetGate::new(byte_stream(&[b"hello ", b"world"]), 3, None);
        assert_eq!(collect(gate).await, b"lo world");

        // a skip that lands exactly on a chunk boundary
        let gate = OffsetGate::new(byte_stream(&[b"hello ", b"world"]), 6, None);
        assert_eq!(collect(gate).await, b"world");

        // a skip inside the second chunk
        let gate = OffsetGate::new(byte_stream(&[b"hello ", b"world"]), 7, None);
        assert_eq!(collect(gate).await, b"orld");

        let gate = OffsetGate::new(byte_stream(&[b"hello ", b"world"]), 0, None);
        assert_eq!(collect(gate).await, b"hello world");

        let gate = OffsetGate::new(byte_stream(&[b"hello ", b"world"]), 11, None);
        assert_eq!(collect(gate).await, b"");

        let gate = OffsetGate::new(byte_stream(&[b"hello ", b"world"]), 400, None);
        assert_eq!(collect(gate).await, b"");
    }

    #[tokio::test]
    async fn the_gate_hashes_skipped_bytes_too() {
        let hasher = Arc::new(Mutex::new(
            ObjectHasher::for_validation(Validation::Crc32c).unwrap(),
        ));
        let gate = OffsetGate::new(byte_stream(&[b"hel", b"lo"]), 3, Some(hasher.clone()));
        assert_eq!(collect(gate).await, b"lo");
        // digest covers all of "hello", not just the transmitted suffix
        assert_eq!(
            hasher.lock().unwrap().digest(Algorithm::Crc32c).unwrap(),
            "mnG7TA==",
        );
    }

    #[tokio::test]
    async fn the_first_chunk_is_gathered_across_tiny_chunks() {
        let (prefix, rest) =
            read_first_chunk(byte_stream(&[b"abc", b"def", b"ghi", b"jkl", b"mno", b"pqr"]))
                .await
                .unwrap();
        assert_eq!(prefix, b"abcdefghijklmnop");
        // nothing is lost: the full payload still flows
        assert_eq!(collect(rest).await, b"abcdefghijklmnopqr");
    }

    #[tokio::test]
    async fn a_short_payload_identifies_by_what_there_is() {
        let (prefix, rest) = read_first_chunk(byte_stream(&[b"tiny"])).await.unwrap();
        assert_eq!(prefix, b"tiny");
        assert_eq!(collect(rest).await, b"tiny");

        let (prefix, rest) = read_first_chunk(byte_stream(&[])).await.unwrap();
        assert_eq!(prefix, b"");
        assert_eq!(collect(rest).await, b"");
    }

    #[test]
    fn range_headers_yield_their_last_byte() {
        assert_eq!(parse_range_end(Some("bytes=0-32767")), Some(32767));
        assert_eq!(parse_range_end(Some("0-99")), Some(99));
        assert_eq!(parse_range_end(Some("bytes")), None);
        assert_eq!(parse_range_end(None), None);
    }

    #[test]
    fn backoff_grows_exponentially_with_bounded_jitter() {
        for retries in 1..=5u32 {
            let base = u128::from(2u32.pow(retries)) * 1000;
            let delay = backoff_delay(retries).as_millis();
            assert!(delay >= base && delay < base + 1000, "retry {}: {}ms", retries, delay);
        }
    }
}
