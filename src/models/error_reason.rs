use std::str::FromStr;

/// The reason Google attaches to an error item, normalized to the values the storage API is
/// documented to return. Unrecognized reasons are preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorReason {
    /// The request had an invalid parameter or was otherwise malformed.
    Invalid,
    /// A parameter carried an invalid value.
    InvalidParameter,
    /// A required parameter or header was missing.
    Required,
    /// No `Authorization` header, or the token it carried was not accepted.
    AuthError,
    /// The authenticated account is not allowed to perform the operation.
    Forbidden,
    /// The referenced bucket or object does not exist.
    NotFound,
    /// A precondition such as `ifGenerationMatch` failed.
    ConditionNotMet,
    /// Too many requests; back off.
    RateLimitExceeded,
    /// The account's quota was exhausted.
    QuotaExceeded,
    /// The user project is missing or invalid.
    UserProjectMissing,
    /// A transient server side failure.
    BackendError,
    /// A server side error without further classification.
    InternalError,
    /// Any reason this library does not know about.
    Other(String),
}

impl FromStr for ErrorReason {
    type Err = std::convert::Infallible;

    fn from_str(reason: &str) -> Result<Self, Self::Err> {
        Ok(match reason {
            "invalid" => ErrorReason::Invalid,
            "invalidParameter" => ErrorReason::InvalidParameter,
            "required" => ErrorReason::Required,
            "authError" => ErrorReason::AuthError,
            "forbidden" => ErrorReason::Forbidden,
            "notFound" => ErrorReason::NotFound,
            "conditionNotMet" => ErrorReason::ConditionNotMet,
            "rateLimitExceeded" => ErrorReason::RateLimitExceeded,
            "quotaExceeded" => ErrorReason::QuotaExceeded,
            "userProjectMissing" => ErrorReason::UserProjectMissing,
            "backendError" => ErrorReason::BackendError,
            "internalError" => ErrorReason::InternalError,
            other => ErrorReason::Other(other.to_string()),
        })
    }
}

impl<'de> serde::Deserialize<'de> for ErrorReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;
        let reason = String::deserialize(deserializer)?;
        Ok(reason.parse().unwrap_or(ErrorReason::Other(reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_reasons_both_deserialize() {
        assert_eq!(
            serde_json::from_str::<ErrorReason>("\"rateLimitExceeded\"").unwrap(),
            ErrorReason::RateLimitExceeded,
        );
        assert_eq!(
            serde_json::from_str::<ErrorReason>("\"somethingNew\"").unwrap(),
            ErrorReason::Other("somethingNew".to_string()),
        );
    }
}
