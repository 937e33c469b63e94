//! This crate moves object data in and out of Google Cloud Storage over its JSON API, with the
//! emphasis on getting the transfer path right: streaming downloads with end-to-end integrity
//! checking, resumable uploads that survive restarts of the uploading process, and signed urls
//! that let browsers fetch or post objects without credentials.
//!
//! This project talks to Google using a `Service Account`. A service account is an account that you
//! must create in the [cloud storage console](https://console.cloud.google.com/). When the account
//! is created, you can download the file `service-account-********.json`. Store this file somewhere
//! on your machine, and place the path to this file in the environment parameter `SERVICE_ACCOUNT`.
//! Environment parameters declared in the `.env` file are also registered. The service account can
//! then be granted `Roles` in the cloud storage console. The roles required for this project to
//! function are `Service Account Token Creator` and `Storage Object Admin`.
//!
//! # Quickstart
//! Add the following line to your `Cargo.toml`
//! ```toml
//! [dependencies]
//! gcs-objects = "0.1"
//! ```
//!
//! ## Examples:
//! Uploading a file, letting the library pick the resumable path:
//! ```rust,no_run
//! # use gcs_objects::{Client, UploadConfig};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::default();
//! let mut object = client.object("my_bucket", "big-file.bin");
//! let payload = std::fs::read("big-file.bin")?;
//! object.upload(payload, UploadConfig::default()).await?;
//! # Ok(())
//! # }
//! ```
//! Downloading it again, verified against the server's digests:
//! ```rust,no_run
//! # use gcs_objects::{Client, DownloadConfig};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::default();
//! let object = client.object("my_bucket", "big-file.bin");
//! let bytes = object.download(DownloadConfig::default()).await?;
//! # Ok(())
//! # }
//! ```
//! Handing out a time-limited download link:
//! ```rust,no_run
//! # use gcs_objects::{Client, SignedUrlRequest};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::default();
//! let object = client.object("my_bucket", "big-file.bin");
//! let url = object.signed_url(SignedUrlRequest::read(1893456000))?;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code, missing_docs)]

// export time, so implementing libraries can use it
pub extern crate time;

pub mod models;

mod client;
mod crypto;
mod download;
mod error;
mod hash;
mod object;
mod resumable;
mod service_account;
mod session;
mod sign;
mod token;
mod upload;

pub use crate::{
    client::{Client, ClientBuilder},
    download::{DownloadConfig, ObjectStream},
    error::Error,
    hash::Validation,
    models::Object,
    object::{CopyDestination, ObjectHandle},
    service_account::ServiceAccount,
    session::{SessionRecord, SessionStore},
    sign::{SignedPolicy, SignedPolicyRequest, SignedUrlAction, SignedUrlRequest},
    token::{Token, TokenCache},
    upload::UploadConfig,
};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'*').remove(b'-').remove(b'.').remove(b'_');
const NOSLASH_ENCODE_SET: &AsciiSet = &ENCODE_SET.remove(b'/').remove(b'~');

// We need to be able to percent encode stuff, but without touching the slashes in filenames. To
// this end we create an implementation that does this, without touching the slashes.
fn percent_encode_noslash(input: &str) -> String {
    utf8_percent_encode(input, NOSLASH_ENCODE_SET).to_string()
}

pub(crate) fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, ENCODE_SET).to_string()
}

fn from_str<'de, T, D>(deserializer: D) -> std::result::Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: serde::Deserializer<'de>,
{
    use serde::de::Deserialize;
    let s = String::deserialize(deserializer)?;
    T::from_str(&s).map_err(serde::de::Error::custom)
}

fn from_str_opt<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: serde::Deserializer<'de>,
{
    let s: std::result::Result<serde_json::Value, _> = serde::Deserialize::deserialize(deserializer);
    match s {
        Ok(serde_json::Value::String(s)) => T::from_str(&s)
            .map_err(serde::de::Error::custom)
            .map(Option::from),
        Ok(serde_json::Value::Number(num)) => T::from_str(&num.to_string())
            .map_err(serde::de::Error::custom)
            .map(Option::from),
        Ok(_value) => Err(serde::de::Error::custom("Incorrect type")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn percent_encoding_keeps_slashes_out_of_resource_paths_only() {
        assert_eq!(super::percent_encode("a/b c.txt"), "a%2Fb%20c.txt");
        assert_eq!(super::percent_encode_noslash("a/b c.txt"), "a/b%20c.txt");
    }
}
