use crate::Error;

/// Refreshes an OAuth2 access token when it is expired.
///
/// The default implementation, [`Token`], mints an RS256 JWT from the service account key and
/// exchanges it at Google's token endpoint. Bring your own implementation when tokens come from
/// somewhere else, for example a metadata server.
#[async_trait::async_trait]
pub trait TokenCache: Sync + Send {
    /// Returns the token that is currently held within the instance of `TokenCache`, together with
    /// the expiry of that token as a u64 in seconds since the Unix Epoch (1 Jan 1970).
    async fn token_and_exp(&self) -> Option<(String, u64)>;

    /// Updates the token to the value `token`.
    async fn set_token(&self, token: String, exp: u64) -> Result<(), Error>;

    /// Returns the intended scope for the current token.
    async fn scope(&self) -> String;

    /// Returns a valid, unexpired token. If the contained token is expired, it updates and returns
    /// the token.
    async fn get(
        &self,
        client: &reqwest::Client,
        client_email: String,
        private_key: &[u8],
    ) -> Result<String, Error> {
        match self.token_and_exp().await {
            Some((jwt, exp)) if now() + 300 < exp => Ok(jwt),
            _ => {
                let (jwt, exp) = self.fetch_token(client, client_email, private_key).await?;
                self.set_token(jwt, exp).await?;
                self.token_and_exp()
                    .await
                    .map(|(jwt, _)| jwt)
                    .ok_or_else(|| Error::new("token is not set"))
            }
        }
    }

    /// Fetches and returns the token using the service account.
    async fn fetch_token(
        &self,
        client: &reqwest::Client,
        client_email: String,
        private_key: &[u8],
    ) -> Result<(String, u64), Error>;
}

#[derive(serde::Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

#[derive(serde::Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// The default `TokenCache`: one token with its expiry and access scope, refreshed on demand.
pub struct Token {
    // token and expiry live in one Option: if one is set, the other must be too.
    current: tokio::sync::RwLock<Option<(String, u64)>>,
    access_scope: String,
}

impl Default for Token {
    fn default() -> Self {
        Token::new("https://www.googleapis.com/auth/devstorage.full_control")
    }
}

impl Token {
    pub(crate) fn new(scope: &str) -> Self {
        Self {
            current: tokio::sync::RwLock::new(None),
            access_scope: scope.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TokenCache for Token {
    async fn scope(&self) -> String {
        self.access_scope.clone()
    }

    async fn token_and_exp(&self) -> Option<(String, u64)> {
        self.current.read().await.clone()
    }

    async fn set_token(&self, token: String, exp: u64) -> Result<(), Error> {
        *self.current.write().await = Some((token, exp));
        Ok(())
    }

    async fn fetch_token(
        &self,
        client: &reqwest::Client,
        client_email: String,
        private_key: &[u8],
    ) -> Result<(String, u64), Error> {
        let iat = now();
        let claims = Claims {
            iss: client_email,
            scope: self.scope().await,
            aud: "https://www.googleapis.com/oauth2/v4/token".to_string(),
            exp: iat + 3600,
            iat,
        };
        let header = jsonwebtoken::Header {
            alg: jsonwebtoken::Algorithm::RS256,
            ..Default::default()
        };
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key)?;
        let jwt = jsonwebtoken::encode(&header, &claims, &key)?;
        let body = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];
        let response: TokenResponse = client
            .post("https://www.googleapis.com/oauth2/v4/token")
            .form(&body)
            .send()
            .await?
            .json()
            .await?;
        Ok((response.access_token, iat + response.expires_in))
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
