use crate::models::ErrorResponse;

/// Represents any of the ways moving data in or out of Google Cloud Storage can fail.
#[derive(Debug)]
pub enum Error {
    /// An error returned by Google in response to a request.
    Google(ErrorResponse),
    /// The request was rejected locally, before any network traffic happened.
    Validation(String),
    /// The bytes received during a download do not digest to the checksum that the server
    /// advertised for the object. The transfer should be considered corrupt and retried.
    DownloadMismatch {
        /// The digest algorithm that detected the corruption.
        algorithm: &'static str,
        /// The base64 digest the server advertised.
        expected: String,
        /// The base64 digest computed over the received bytes.
        computed: String,
    },
    /// The bytes sent during an upload do not digest to the checksum the server stored. The
    /// remote object was deleted as a precaution; uploading again is safe.
    UploadMismatch {
        /// The digest algorithm that detected the corruption.
        algorithm: &'static str,
    },
    /// The uploaded bytes were corrupt *and* the precautionary delete of the remote object
    /// failed, so a corrupt object remains in the bucket. Carries the delete failure.
    UploadMismatchDelete {
        /// The digest algorithm that detected the corruption.
        algorithm: &'static str,
        /// Why the precautionary delete failed.
        error: Box<Error>,
    },
    /// A network or protocol level error from the http client.
    Reqwest(reqwest::Error),
    /// A value could not be turned into a valid http header.
    InvalidHeaderValue(reqwest::header::InvalidHeaderValue),
    /// A payload could not be serialized or deserialized.
    Serialization(serde_json::Error),
    /// Minting the service account JWT failed.
    Jwt(jsonwebtoken::errors::Error),
    /// Reading or writing local state failed.
    Io(std::io::Error),
    /// Signing with the service account key failed.
    #[cfg(feature = "openssl")]
    Ssl(openssl::error::ErrorStack),
    /// The service account key is not valid PEM.
    #[cfg(all(feature = "ring", not(feature = "openssl")))]
    Pem(pem::PemError),
    /// The service account key was rejected by the signer.
    #[cfg(all(feature = "ring", not(feature = "openssl")))]
    KeyRejected(ring::error::KeyRejected),
    /// Signing with the service account key failed.
    #[cfg(all(feature = "ring", not(feature = "openssl")))]
    Signing(ring::error::Unspecified),
    /// Anything else.
    Other(String),
}

impl Error {
    /// A stable machine readable code for the integrity failures, `None` for everything else.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::DownloadMismatch { .. } => Some("CONTENT_DOWNLOAD_MISMATCH"),
            Error::UploadMismatch { .. } => Some("FILE_NO_UPLOAD"),
            Error::UploadMismatchDelete { .. } => Some("FILE_NO_UPLOAD_DELETE"),
            _ => None,
        }
    }

    pub(crate) fn new(msg: &str) -> Error {
        Error::Other(msg.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Google(e) => write!(f, "{}", e),
            Error::Validation(msg) => write!(f, "{}", msg),
            Error::DownloadMismatch { algorithm, expected, computed } => write!(
                f,
                "the downloaded data did not match the data from the server \
                 ({} expected {}, computed {}); to be sure the content is the same, \
                 you should download the file again",
                algorithm, expected, computed,
            ),
            Error::UploadMismatch { algorithm } => write!(
                f,
                "the uploaded data did not match the data received by the server ({}); \
                 as a precaution the file has been deleted, try uploading again",
                algorithm,
            ),
            Error::UploadMismatchDelete { algorithm, error } => write!(
                f,
                "the uploaded data did not match the data received by the server ({}) \
                 and deleting the corrupt file failed: {}",
                algorithm, error,
            ),
            Error::Reqwest(e) => write!(f, "{}", e),
            Error::InvalidHeaderValue(e) => write!(f, "{}", e),
            Error::Serialization(e) => write!(f, "{}", e),
            Error::Jwt(e) => write!(f, "{}", e),
            Error::Io(e) => write!(f, "{}", e),
            #[cfg(feature = "openssl")]
            Error::Ssl(e) => write!(f, "{}", e),
            #[cfg(all(feature = "ring", not(feature = "openssl")))]
            Error::Pem(e) => write!(f, "{}", e),
            #[cfg(all(feature = "ring", not(feature = "openssl")))]
            Error::KeyRejected(e) => write!(f, "{}", e),
            #[cfg(all(feature = "ring", not(feature = "openssl")))]
            Error::Signing(e) => write!(f, "{}", e),
            Error::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Google(e) => Some(e),
            Error::UploadMismatchDelete { error, .. } => Some(error.as_ref()),
            Error::Reqwest(e) => Some(e),
            Error::InvalidHeaderValue(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Jwt(e) => Some(e),
            Error::Io(e) => Some(e),
            #[cfg(feature = "openssl")]
            Error::Ssl(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ErrorResponse> for Error {
    fn from(err: ErrorResponse) -> Self {
        Self::Google(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Reqwest(err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeaderValue(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "openssl")]
impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Ssl(err)
    }
}

#[cfg(all(feature = "ring", not(feature = "openssl")))]
impl From<pem::PemError> for Error {
    fn from(err: pem::PemError) -> Self {
        Self::Pem(err)
    }
}

#[cfg(all(feature = "ring", not(feature = "openssl")))]
impl From<ring::error::KeyRejected> for Error {
    fn from(err: ring::error::KeyRejected) -> Self {
        Self::KeyRejected(err)
    }
}

#[cfg(all(feature = "ring", not(feature = "openssl")))]
impl From<ring::error::Unspecified> for Error {
    fn from(err: ring::error::Unspecified) -> Self {
        Self::Signing(err)
    }
}
