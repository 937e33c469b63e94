//! The http client everything else borrows from.

use std::{fmt, sync};

use crate::{token::TokenCache, Error, ObjectHandle, ServiceAccount, SessionStore};

pub(crate) const STORAGE_BASE: &str = "https://storage.googleapis.com/storage/v1";
pub(crate) const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/storage/v1/b";
pub(crate) const DOWNLOAD_BASE: &str = "https://storage.googleapis.com";

/// The primary entrypoint to perform operations with Google Cloud Storage.
///
/// Holds the shared connection pool, the service account credentials, the token cache and the
/// resumable session store; every [`ObjectHandle`] borrows all four.
pub struct Client {
    pub(crate) reqwest: reqwest::Client,
    pub(crate) service_account: ServiceAccount,
    /// Caches an access token across operations, refreshing it when it expires.
    pub(crate) token_cache: sync::Arc<dyn TokenCache>,
    pub(crate) sessions: SessionStore,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("client", &self.reqwest)
            .field("token_cache", &"<opaque>")
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self {
            reqwest: Default::default(),
            service_account: ServiceAccount::default(),
            token_cache: sync::Arc::new(crate::Token::default()),
            sessions: SessionStore::default(),
        }
    }
}

impl Client {
    /// Constructs a client with the given reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            reqwest: client,
            ..Self::default()
        }
    }

    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// A handle to the object `name` in `bucket`.
    ///
    /// Nothing is sent over the wire yet; the handle validates its identifiers when it is first
    /// used. Chain [`ObjectHandle::with_generation`] to scope every operation to one generation.
    pub fn object(&self, bucket: &str, name: &str) -> ObjectHandle {
        ObjectHandle::new(self, bucket, name)
    }

    pub(crate) async fn get_headers(&self) -> Result<reqwest::header::HeaderMap, Error> {
        let mut result = reqwest::header::HeaderMap::new();
        let token = self
            .token_cache
            .get(
                &self.reqwest,
                self.service_account.client_email.clone(),
                self.service_account.private_key.as_bytes(),
            )
            .await?;
        result.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token).parse()?,
        );
        Ok(result)
    }
}

/// A ClientBuilder can be used to create a Client with custom configuration.
#[derive(Default)]
pub struct ClientBuilder {
    client: Option<reqwest::Client>,
    token_cache: Option<sync::Arc<dyn TokenCache>>,
    service_account: Option<ServiceAccount>,
    sessions: Option<SessionStore>,
}

impl ClientBuilder {
    /// Constructs a new ClientBuilder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns a `Client` that uses this `ClientBuilder` configuration.
    pub fn build(self) -> Client {
        Client {
            reqwest: self.client.unwrap_or_default(),
            token_cache: self
                .token_cache
                .unwrap_or_else(|| sync::Arc::new(crate::Token::default())),
            service_account: self.service_account.unwrap_or_default(),
            sessions: self.sessions.unwrap_or_default(),
        }
    }

    /// Sets a refreshable token cache.
    pub fn with_cache(mut self, token: impl TokenCache + 'static) -> Self {
        self.token_cache = Some(sync::Arc::new(token));
        self
    }

    /// Sets the service account to authenticate and sign with.
    pub fn with_service_account(mut self, service_account: ServiceAccount) -> Self {
        self.service_account = Some(service_account);
        self
    }

    /// Sets the internal [reqwest Client](https://docs.rs/reqwest/latest/reqwest/struct.Client.html).
    pub fn with_reqwest_client(mut self, reqwest_client: reqwest::Client) -> Self {
        self.client = Some(reqwest_client);
        self
    }

    /// Sets where resumable upload sessions are persisted between runs.
    pub fn with_session_store(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }
}
