//! Signed urls and signed POST policy documents: self-authenticating credentials a browser can
//! use against storage without ever seeing the service account key.

use base64::Engine;

use crate::{crypto, Error, ObjectHandle};

/// What a signed url permits its holder to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignedUrlAction {
    /// Fetch the object (HTTP GET).
    Read,
    /// Replace the object's content (HTTP PUT).
    Write,
    /// Delete the object (HTTP DELETE).
    Delete,
}

impl SignedUrlAction {
    fn verb(self) -> &'static str {
        match self {
            SignedUrlAction::Read => "GET",
            SignedUrlAction::Write => "PUT",
            SignedUrlAction::Delete => "DELETE",
        }
    }
}

/// Everything that goes into a signed url.
///
/// `expires` is an absolute unix timestamp in seconds and must lie in the future. Every optional
/// field that is set becomes part of the signature, so the holder of the url is pinned to it: a
/// signed `content_type`, for example, forces the uploader to send exactly that type.
#[derive(Debug, Clone)]
pub struct SignedUrlRequest {
    action: SignedUrlAction,
    expires: i64,
    content_md5: Option<String>,
    content_type: Option<String>,
    extension_headers: Vec<(String, String)>,
    response_disposition: Option<String>,
    response_type: Option<String>,
    prompt_save_as: Option<String>,
}

impl SignedUrlRequest {
    /// A request for `action`, expiring at the unix timestamp `expires`.
    pub fn new(action: SignedUrlAction, expires: i64) -> Self {
        Self {
            action,
            expires,
            content_md5: None,
            content_type: None,
            extension_headers: Vec::new(),
            response_disposition: None,
            response_type: None,
            prompt_save_as: None,
        }
    }

    /// A download url expiring at the unix timestamp `expires`.
    pub fn read(expires: i64) -> Self {
        Self::new(SignedUrlAction::Read, expires)
    }

    /// An upload url expiring at the unix timestamp `expires`.
    pub fn write(expires: i64) -> Self {
        Self::new(SignedUrlAction::Write, expires)
    }

    /// A delete url expiring at the unix timestamp `expires`.
    pub fn delete(expires: i64) -> Self {
        Self::new(SignedUrlAction::Delete, expires)
    }

    /// Pins the request to a `Content-MD5` the caller will have to send.
    pub fn content_md5(mut self, md5: &str) -> Self {
        self.content_md5 = Some(md5.to_string());
        self
    }

    /// Pins the request to a `Content-Type` the caller will have to send.
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Adds an `x-goog-` extension header to the signature; the caller will have to send it.
    pub fn extension_header(mut self, name: &str, value: &str) -> Self {
        self.extension_headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Overrides the `Content-Disposition` the server responds with.
    pub fn response_disposition(mut self, disposition: &str) -> Self {
        self.response_disposition = Some(disposition.to_string());
        self
    }

    /// Overrides the `Content-Type` the server responds with.
    pub fn response_type(mut self, content_type: &str) -> Self {
        self.response_type = Some(content_type.to_string());
        self
    }

    /// Makes browsers save the download under `filename` instead of displaying it. An explicit
    /// [`response_disposition`](Self::response_disposition) wins over this.
    pub fn prompt_save_as(mut self, filename: &str) -> Self {
        self.prompt_save_as = Some(filename.to_string());
        self
    }

    fn disposition(&self) -> Option<String> {
        self.response_disposition.clone().or_else(|| {
            self.prompt_save_as
                .as_ref()
                .map(|name| format!("attachment; filename=\"{}\"", crate::percent_encode(name)))
        })
    }
}

/// The constraints a signed POST policy document places on a browser upload.
///
/// Condition fields are spelled the way the form names them, `$` included: for example
/// `equals("$Content-Type", "image/png")`.
#[derive(Debug, Clone, Default)]
pub struct SignedPolicyRequest {
    expiration: i64,
    equals: Vec<(String, String)>,
    starts_with: Vec<(String, String)>,
    acl: Option<String>,
    success_redirect: Option<String>,
    success_status: Option<String>,
    content_length_range: Option<(u64, u64)>,
}

impl SignedPolicyRequest {
    /// A policy expiring at the unix timestamp `expiration`.
    pub fn new(expiration: i64) -> Self {
        Self {
            expiration,
            ..Self::default()
        }
    }

    /// Requires the form field to equal `value` exactly.
    pub fn equals(mut self, field: &str, value: &str) -> Self {
        self.equals.push((field.to_string(), value.to_string()));
        self
    }

    /// Requires the form field to start with `prefix`.
    pub fn starts_with(mut self, field: &str, prefix: &str) -> Self {
        self.starts_with.push((field.to_string(), prefix.to_string()));
        self
    }

    /// Requires the upload to carry this canned acl.
    pub fn acl(mut self, acl: &str) -> Self {
        self.acl = Some(acl.to_string());
        self
    }

    /// Where the service redirects the browser after a successful upload.
    pub fn success_redirect(mut self, url: &str) -> Self {
        self.success_redirect = Some(url.to_string());
        self
    }

    /// The status code the service answers a successful upload with, as the form field expects
    /// it (for example `"201"`).
    pub fn success_status(mut self, status: &str) -> Self {
        self.success_status = Some(status.to_string());
        self
    }

    /// Bounds the upload size in bytes, inclusive on both ends.
    pub fn content_length_range(mut self, min: u64, max: u64) -> Self {
        self.content_length_range = Some((min, max));
        self
    }

    fn document(&self, bucket: &str, name: &str) -> Result<PolicyDocument, Error> {
        let expiration = time::OffsetDateTime::from_unix_timestamp(self.expiration)
            .map_err(|e| Error::Validation(format!("invalid expiration timestamp: {}", e)))?
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| Error::Other(e.to_string()))?;

        let mut conditions = vec![
            serde_json::json!(["eq", "$key", name]),
            serde_json::json!({ "bucket": bucket }),
        ];
        for (field, value) in &self.equals {
            conditions.push(serde_json::json!(["eq", field, value]));
        }
        for (field, prefix) in &self.starts_with {
            conditions.push(serde_json::json!(["starts-with", field, prefix]));
        }
        if let Some(acl) = &self.acl {
            conditions.push(serde_json::json!({ "acl": acl }));
        }
        if let Some(redirect) = &self.success_redirect {
            conditions.push(serde_json::json!({ "success_action_redirect": redirect }));
        }
        if let Some(status) = &self.success_status {
            conditions.push(serde_json::json!({ "success_action_status": status }));
        }
        if let Some((min, max)) = self.content_length_range {
            conditions.push(serde_json::json!(["content-length-range", min, max]));
        }
        Ok(PolicyDocument { expiration, conditions })
    }
}

// Field order matters: the serialized form is what gets signed.
#[derive(serde::Serialize)]
struct PolicyDocument {
    expiration: String,
    conditions: Vec<serde_json::Value>,
}

/// A signed POST policy document, ready to be embedded in an html form.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedPolicy {
    /// The policy document as JSON.
    pub string: String,
    /// The base64 of `string`; goes into the form's `policy` field.
    pub base64: String,
    /// The base64 RSA-SHA256 signature over `base64`; goes into the form's `signature` field.
    pub signature: String,
}

fn check_expiration(expires: i64) -> Result<(), Error> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if expires <= now {
        return Err(Error::Validation(
            "an expiration date cannot be in the past".to_string(),
        ));
    }
    Ok(())
}

fn string_to_sign(
    verb: &str,
    content_md5: &str,
    content_type: &str,
    expires: i64,
    extension_headers: &[(String, String)],
    resource: &str,
) -> String {
    let extension_headers: String = extension_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    format!(
        "{verb}\n{content_md5}\n{content_type}\n{expires}\n{extension_headers}{resource}",
    )
}

impl<'a> ObjectHandle<'a> {
    /// Creates a [signed url](https://cloud.google.com/storage/docs/access-control/signed-urls)
    /// for this object: anyone holding it can perform the requested action until the url
    /// expires, without any further authentication.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::{Client, SignedUrlRequest};
    ///
    /// let client = Client::default();
    /// let object = client.object("my_bucket", "file1");
    /// let url = object.signed_url(SignedUrlRequest::read(1893456000))?;
    /// // anyone can GET that url until 2030 rolls around
    /// # Ok(())
    /// # }
    /// ```
    pub fn signed_url(&self, request: SignedUrlRequest) -> Result<String, Error> {
        self.check_addressable()?;
        check_expiration(request.expires)?;

        let resource = format!("/{}/{}", self.bucket(), crate::percent_encode(self.name()));
        let plain = string_to_sign(
            request.action.verb(),
            request.content_md5.as_deref().unwrap_or(""),
            request.content_type.as_deref().unwrap_or(""),
            request.expires,
            &request.extension_headers,
            &resource,
        );
        let account = &self.client().service_account;
        let signature = crypto::rsa_sha256_base64(&plain, account.private_key.as_bytes())?;

        let mut url = format!(
            "https://storage.googleapis.com{resource}?GoogleAccessId={access_id}&Expires={expires}&Signature={signature}",
            resource = resource,
            access_id = crate::percent_encode(&account.client_email),
            expires = request.expires,
            signature = crate::percent_encode(&signature),
        );
        if let Some(response_type) = &request.response_type {
            url.push_str("&response-content-type=");
            url.push_str(&crate::percent_encode(response_type));
        }
        if let Some(disposition) = request.disposition() {
            url.push_str("&response-content-disposition=");
            url.push_str(&crate::percent_encode(&disposition));
        }
        Ok(url)
    }

    /// Creates a signed [policy document](https://cloud.google.com/storage/docs/xml-api/post-object-forms):
    /// the `policy` and `signature` form fields that authorize a browser to POST an upload
    /// within the policy's constraints.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::{Client, SignedPolicyRequest};
    ///
    /// let client = Client::default();
    /// let object = client.object("my_bucket", "file1");
    /// let policy = object.signed_policy(
    ///     SignedPolicyRequest::new(1893456000)
    ///         .equals("$Content-Type", "image/png")
    ///         .content_length_range(0, 1_000_000),
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn signed_policy(&self, request: SignedPolicyRequest) -> Result<SignedPolicy, Error> {
        self.check_addressable()?;
        check_expiration(request.expiration)?;

        let string = serde_json::to_string(&request.document(self.bucket(), self.name())?)?;
        let base64 = base64::engine::general_purpose::STANDARD.encode(&string);
        let account = &self.client().service_account;
        let signature = crypto::rsa_sha256_base64(&base64, account.private_key.as_bytes())?;
        Ok(SignedPolicy {
            string,
            base64,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_canonical_string_keeps_empty_fields_as_blank_lines() {
        let plain = string_to_sign("GET", "", "", 1577836800, &[], "/b/o.txt");
        assert_eq!(plain, "GET\n\n\n1577836800\n/b/o.txt");
    }

    #[test]
    fn extension_headers_sit_between_expiry_and_resource() {
        let headers = vec![
            ("x-goog-acl".to_string(), "public-read".to_string()),
            ("x-goog-meta-owner".to_string(), "me".to_string()),
        ];
        let plain = string_to_sign("PUT", "", "text/plain", 1577836800, &headers, "/b/o.txt");
        assert_eq!(
            plain,
            "PUT\n\ntext/plain\n1577836800\nx-goog-acl:public-read\nx-goog-meta-owner:me\n/b/o.txt",
        );
    }

    #[test]
    fn expirations_up_to_and_including_now_are_rejected() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        assert!(check_expiration(now).is_err());
        assert!(check_expiration(now - 100).is_err());
        assert!(check_expiration(now + 3600).is_ok());
    }

    #[test]
    fn an_explicit_disposition_beats_prompt_save_as() {
        let both = SignedUrlRequest::read(1893456000)
            .prompt_save_as("cat.png")
            .response_disposition("inline");
        assert_eq!(both.disposition().as_deref(), Some("inline"));

        let prompt_only = SignedUrlRequest::read(1893456000).prompt_save_as("my cat.png");
        assert_eq!(
            prompt_only.disposition().as_deref(),
            Some("attachment; filename=\"my%20cat.png\""),
        );

        assert_eq!(SignedUrlRequest::read(1893456000).disposition(), None);
    }

    #[test]
    fn policy_documents_keep_their_condition_order() {
        let request = SignedPolicyRequest::new(1893456000)
            .equals("$Content-Type", "image/png")
            .starts_with("$key", "file")
            .acl("public-read")
            .success_redirect("https://example.com/done")
            .success_status("201")
            .content_length_range(0, 1024);
        let document = request.document("my-bucket", "file.png").unwrap();
        assert_eq!(
            serde_json::to_string(&document).unwrap(),
            concat!(
                "{\"expiration\":\"2030-01-01T00:00:00Z\",\"conditions\":[",
                "[\"eq\",\"$key\",\"file.png\"],",
                "{\"bucket\":\"my-bucket\"},",
                "[\"eq\",\"$Content-Type\",\"image/png\"],",
                "[\"starts-with\",\"$key\",\"file\"],",
                "{\"acl\":\"public-read\"},",
                "{\"success_action_redirect\":\"https://example.com/done\"},",
                "{\"success_action_status\":\"201\"},",
                "[\"content-length-range\",0,1024]",
                "]}",
            ),
        );
    }

    #[test]
    fn a_minimal_policy_still_pins_key_and_bucket() {
        let document = SignedPolicyRequest::new(1893456000)
            .document("b", "o.txt")
            .unwrap();
        assert_eq!(
            serde_json::to_string(&document).unwrap(),
            "{\"expiration\":\"2030-01-01T00:00:00Z\",\"conditions\":[[\"eq\",\"$key\",\"o.txt\"],{\"bucket\":\"b\"}]}",
        );
    }
}
