//! Upload configuration, the single-shot multipart upload, and the integrity check both upload
//! paths run against the metadata the server answers with.

use bytes::Bytes;
use futures_util::{stream, Stream};

use crate::client::UPLOAD_BASE;
use crate::hash::{Algorithm, ObjectHasher};
use crate::models::GoogleResponse;
use crate::{Error, Object, ObjectHandle, Validation};

/// How to upload an object.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Compress the payload with gzip on the way out and record
    /// `contentEncoding: "gzip"` on the object, so the server stores (and digests) the
    /// compressed representation.
    pub gzip: bool,
    /// Use the resumable protocol. Defaults to yes; set to `Some(false)` for small payloads
    /// where a session round trip is not worth it.
    pub resumable: Option<bool>,
    /// Which digests to verify after the upload completes.
    pub validation: Validation,
    /// The initial metadata for the object, sent verbatim as the JSON part of the upload. A
    /// `contentType` in here becomes the object's content type.
    pub metadata: serde_json::Value,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            gzip: false,
            resumable: None,
            validation: Validation::default(),
            metadata: serde_json::json!({}),
        }
    }
}

impl UploadConfig {
    /// Equivalent to `UploadConfig::default()`: resumable, uncompressed, both digests verified.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to gzip the payload.
    pub fn gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Forces the resumable or the single-shot path.
    pub fn resumable(mut self, resumable: bool) -> Self {
        self.resumable = Some(resumable);
        self
    }

    /// Sets which digests to verify after the upload.
    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Sets the initial object metadata.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn is_resumable(&self) -> bool {
        self.resumable.unwrap_or(true)
    }

    pub(crate) fn content_type(&self) -> Option<&str> {
        self.metadata.get("contentType").and_then(|v| v.as_str())
    }

    /// The metadata as it goes over the wire, with the content encoding the gzip option implies.
    pub(crate) fn wire_metadata(&self) -> serde_json::Value {
        let mut metadata = match &self.metadata {
            serde_json::Value::Object(_) => self.metadata.clone(),
            _ => serde_json::json!({}),
        };
        if self.gzip {
            metadata["contentEncoding"] = serde_json::json!("gzip");
        }
        metadata
    }
}

pub(crate) async fn gzip_bytes(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    use tokio::io::AsyncWriteExt;

    let mut encoder = async_compression::tokio::write::GzipEncoder::new(Vec::new());
    encoder.write_all(bytes).await?;
    encoder.shutdown().await?;
    Ok(encoder.into_inner())
}

/// Pipes a byte stream through a gzip encoder, chunk boundaries not preserved.
pub(crate) fn gzip_stream<S>(
    source: S,
) -> futures_util::stream::BoxStream<'static, Result<Bytes, Error>>
where
    S: Stream<Item = Result<Bytes, Error>> + Send + Unpin + 'static,
{
    use futures_util::{StreamExt, TryStreamExt};

    let reader = tokio_util::io::StreamReader::new(source.map_err(crate::download::wrap_io));
    let encoder = async_compression::tokio::bufread::GzipEncoder::new(reader);
    tokio_util::io::ReaderStream::new(encoder)
        .map_err(crate::download::unwrap_io)
        .boxed()
}

impl<'a> ObjectHandle<'a> {
    /// Uploads `payload` as the content of this object and returns the resulting metadata.
    ///
    /// Resumable by default, which survives transient network failures and lets an interrupted
    /// process pick the transfer back up later; `config.resumable(false)` sends everything in a
    /// single multipart request instead. When the handle is pinned to a generation, it is sent
    /// as an `ifGenerationMatch` precondition. With validation enabled, the payload digests are
    /// compared against what the server stored; a mismatch deletes the remote object and
    /// surfaces as [`Error::UploadMismatch`].
    /// ### Example
    /// ```rust,no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # fn read_cute_cat(_in: &str) -> Vec<u8> { vec![0, 1] }
    /// use gcs_objects::{Client, UploadConfig};
    ///
    /// let file: Vec<u8> = read_cute_cat("cat.png");
    /// let client = Client::default();
    /// let config = UploadConfig::new().metadata(serde_json::json!({ "contentType": "image/png" }));
    /// client.object("cat-photos", "recently read cat.png").upload(file, config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload(
        &mut self,
        payload: impl Into<Bytes>,
        config: UploadConfig,
    ) -> Result<Object, Error> {
        self.check_addressable()?;
        let payload = payload.into();
        if config.is_resumable() {
            let media = move || stream::iter([Ok::<Bytes, Error>(payload.clone())]);
            crate::resumable::upload(self, media, config).await
        } else {
            self.upload_multipart(payload, config).await
        }
    }

    /// Uploads this object from a stream factory, without holding the payload in memory.
    ///
    /// `media` is called once per transfer attempt and must yield the same bytes each time; the
    /// resumable machinery re-reads it from the start after a retry or a session restart and
    /// skips what the server already has.
    /// ### Example
    /// ```rust,no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use bytes::Bytes;
    /// use gcs_objects::{Client, Error, UploadConfig};
    ///
    /// let client = Client::default();
    /// let chunks = vec![Bytes::from("hello "), Bytes::from("world")];
    /// client
    ///     .object("my_bucket", "greeting.txt")
    ///     .upload_streamed(
    ///         move || futures_util::stream::iter(chunks.clone().into_iter().map(Ok::<_, Error>)),
    ///         UploadConfig::default(),
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload_streamed<F, S>(
        &mut self,
        mut media: F,
        config: UploadConfig,
    ) -> Result<Object, Error>
    where
        F: FnMut() -> S,
        S: Stream<Item = Result<Bytes, Error>> + Send + Unpin + 'static,
    {
        self.check_addressable()?;
        if config.is_resumable() {
            crate::resumable::upload(self, media, config).await
        } else {
            self.upload_multipart_stream(media(), config).await
        }
    }

    /// The single-shot upload: one multipart request carrying the metadata part and the content
    /// part. Nothing is persisted; a failure means starting over.
    async fn upload_multipart(
        &mut self,
        payload: Bytes,
        config: UploadConfig,
    ) -> Result<Object, Error> {
        let payload = if config.gzip {
            gzip_bytes(&payload).await?
        } else {
            payload.to_vec()
        };
        let mut hasher = ObjectHasher::for_validation(config.validation);
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&payload);
        }
        let file_part = reqwest::multipart::Part::bytes(payload);
        let response = self.send_multipart(file_part, &config).await?;
        self.finish_upload(response, hasher).await
    }

    async fn upload_multipart_stream<S>(
        &mut self,
        source: S,
        config: UploadConfig,
    ) -> Result<Object, Error>
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + Unpin + 'static,
    {
        use std::sync::{Arc, Mutex};

        let source = if config.gzip {
            gzip_stream(source)
        } else {
            futures_util::StreamExt::boxed(source)
        };
        let hasher = ObjectHasher::for_validation(config.validation)
            .map(|hasher| Arc::new(Mutex::new(hasher)));
        let tapped = crate::download::HashTap::new(source, hasher.clone());
        let file_part = reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(tapped));
        let response = self.send_multipart(file_part, &config).await?;
        let hasher = hasher.map(|shared| shared.lock().unwrap().clone());
        self.finish_upload(response, hasher).await
    }

    async fn send_multipart(
        &self,
        file_part: reqwest::multipart::Part,
        config: &UploadConfig,
    ) -> Result<GoogleResponse<Object>, Error> {
        let url = format!("{}/{}/o", UPLOAD_BASE, crate::percent_encode(self.bucket()));
        let mut query: Vec<(&str, String)> = vec![
            ("uploadType", "multipart".to_string()),
            ("name", self.name().to_string()),
        ];
        if let Some(generation) = self.generation() {
            query.push(("ifGenerationMatch", generation.to_string()));
        }

        let metadata_part = reqwest::multipart::Part::text(config.wire_metadata().to_string())
            .mime_str("application/json")?;
        let file_part = file_part
            .mime_str(config.content_type().unwrap_or("application/octet-stream"))?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        Ok(self
            .client()
            .reqwest
            .post(&url)
            .query(&query)
            .headers(self.client().get_headers().await?)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?)
    }

    /// Shared tail of both upload paths: unwrap the response, verify the digests, adopt the
    /// metadata. On a digest mismatch the remote object is deleted as a precaution and the
    /// error code says whether that worked.
    pub(crate) async fn finish_upload(
        &mut self,
        response: GoogleResponse<Object>,
        hasher: Option<ObjectHasher>,
    ) -> Result<Object, Error> {
        let object = response.into_result()?;
        if let Some(hasher) = hasher {
            if let Some(algorithm) = find_upload_mismatch(&hasher, &object) {
                log::warn!(
                    "upload of {}/{} failed {} validation, deleting the remote object",
                    object.bucket,
                    object.name,
                    algorithm.name(),
                );
                return Err(match self.delete_uploaded().await {
                    Ok(()) => Error::UploadMismatch {
                        algorithm: algorithm.name(),
                    },
                    Err(delete_error) => Error::UploadMismatchDelete {
                        algorithm: algorithm.name(),
                        error: Box::new(delete_error),
                    },
                });
            }
        }
        self.metadata = Some(object.clone());
        Ok(object)
    }

    /// Deletes the object that the upload just created. Unlike [`ObjectHandle::delete`] this
    /// never sends the handle's generation: that one predates the upload.
    async fn delete_uploaded(&self) -> Result<(), Error> {
        let response = self
            .client()
            .reqwest
            .delete(self.object_url())
            .headers(self.client().get_headers().await?)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Google(response.json().await?))
        }
    }
}

/// The first algorithm whose computed digest contradicts the stored object, if any. A digest the
/// server did not return cannot be checked and does not fail the upload.
fn find_upload_mismatch(hasher: &ObjectHasher, object: &Object) -> Option<Algorithm> {
    if hasher.test(Algorithm::Crc32c, &object.crc32c) == Some(false) {
        return Some(Algorithm::Crc32c);
    }
    if let Some(md5) = &object.md5_hash {
        if hasher.test(Algorithm::Md5, md5) == Some(false) {
            return Some(Algorithm::Md5);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_metadata_records_the_content_encoding_when_gzipping() {
        let config = UploadConfig::new()
            .gzip(true)
            .metadata(serde_json::json!({ "contentType": "text/plain" }));
        assert_eq!(
            config.wire_metadata(),
            serde_json::json!({ "contentType": "text/plain", "contentEncoding": "gzip" }),
        );

        let plain = UploadConfig::new();
        assert_eq!(plain.wire_metadata(), serde_json::json!({}));
        assert_eq!(plain.content_type(), None);
    }

    #[test]
    fn resumable_is_the_default_path() {
        assert!(UploadConfig::new().is_resumable());
        assert!(!UploadConfig::new().resumable(false).is_resumable());
    }

    fn stored_object(crc32c: &str, md5: Option<&str>) -> Object {
        serde_json::from_value(serde_json::json!({
            "kind": "storage#object",
            "id": "b/o/1",
            "selfLink": "https://example/o",
            "name": "o",
            "bucket": "b",
            "generation": "1",
            "metageneration": "1",
            "timeCreated": "2021-01-07T06:13:20.000Z",
            "updated": "2021-01-07T06:13:20.000Z",
            "storageClass": "STANDARD",
            "timeStorageClassUpdated": "2021-01-07T06:13:20.000Z",
            "size": "5",
            "md5Hash": md5,
            "mediaLink": "https://example/o?alt=media",
            "crc32c": crc32c,
            "etag": "CAE=",
        }))
        .unwrap()
    }

    #[test]
    fn matching_digests_pass_upload_validation() {
        let mut hasher = ObjectHasher::for_validation(Validation::Both).unwrap();
        hasher.update(b"hello");
        let object = stored_object("mnG7TA==", Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert_eq!(find_upload_mismatch(&hasher, &object), None);
    }

    #[test]
    fn corrupt_uploads_name_the_failing_algorithm() {
        let mut hasher = ObjectHasher::for_validation(Validation::Both).unwrap();
        hasher.update(b"hellx");
        let object = stored_object("mnG7TA==", Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert_eq!(find_upload_mismatch(&hasher, &object), Some(Algorithm::Crc32c));
    }

    #[test]
    fn a_missing_server_md5_is_not_a_mismatch() {
        let mut hasher = ObjectHasher::for_validation(Validation::Md5).unwrap();
        hasher.update(b"hello");
        let object = stored_object("mnG7TA==", None);
        assert_eq!(find_upload_mismatch(&hasher, &object), None);
    }

    async fn gunzip(compressed: &[u8]) -> Vec<u8> {
        use tokio::io::AsyncReadExt;

        let mut decoder = async_compression::tokio::bufread::GzipDecoder::new(compressed);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn both_gzip_helpers_round_trip() {
        use futures_util::StreamExt;

        let as_bytes = gzip_bytes(b"hello hello hello").await.unwrap();
        assert_eq!(gunzip(&as_bytes).await, b"hello hello hello");

        let source = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"hello")),
        ]);
        let mut streamed = Vec::new();
        let mut encoder = gzip_stream(source);
        while let Some(chunk) = encoder.next().await {
            streamed.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(gunzip(&streamed).await, b"hello hello hello");
    }
}
