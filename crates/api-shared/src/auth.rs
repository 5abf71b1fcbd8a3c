/// Header carrying the API key on privileged requests.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("API key not configured on the server")]
    NotConfigured,
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates the provided API key against the key configured at start-up.
///
/// Privileged operations stay locked when no key is configured.
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> Result<(), AuthError> {
    let expected = expected.ok_or(AuthError::NotConfigured)?;
    let provided = provided.ok_or(AuthError::Missing)?;

    if provided == expected {
        Ok(())
    } else {
        Err(AuthError::Invalid)
    }
}
