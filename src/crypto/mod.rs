//! RSA-SHA256 signing with the service account private key, behind whichever backend the feature
//! flags select. `openssl` wins when both are enabled.

#[cfg(feature = "openssl")]
mod openssl;
#[cfg(feature = "openssl")]
pub use self::openssl::*;

#[cfg(all(feature = "ring", not(feature = "openssl")))]
mod ring;
#[cfg(all(feature = "ring", not(feature = "openssl")))]
pub use self::ring::*;

use crate::Error;

/// Signs `message` with the PEM encoded private key and returns the signature as standard base64,
/// which is how both signed urls and policy documents embed it.
pub(crate) fn rsa_sha256_base64(message: &str, private_pem: &[u8]) -> Result<String, Error> {
    use base64::Engine;
    let signature = rsa_pkcs1_sha256(message, private_pem)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(signature))
}
