use serde::Serialize;

#[derive(Clone, Copy, Debug)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    NotConfigured,
    Unsupported,
    AuthFailed,
    RateLimited,
    ProviderError,
    FetchFailed,
    SearchFailed,
    ContextError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::NotConfigured => "not_configured",
            Self::Unsupported => "unsupported",
            Self::AuthFailed => "auth_failed",
            Self::RateLimited => "rate_limited",
            Self::ProviderError => "provider_error",
            Self::FetchFailed => "fetch_failed",
            Self::SearchFailed => "search_failed",
            Self::ContextError => "context_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            // Transient: an external retrier may reasonably try again.
            Self::RateLimited | Self::FetchFailed | Self::SearchFailed | Self::ContextError => true,
            // Invalid input or configuration won't change without intervention.
            Self::InvalidParams
            | Self::InvalidUrl
            | Self::NotConfigured
            | Self::Unsupported
            | Self::AuthFailed
            | Self::ProviderError => false,
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}
