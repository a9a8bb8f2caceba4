//! Response handling shared by the HTTP provider clients.

use genrelay_core::JobError;
use reqwest::StatusCode;
use serde_json::Value;

/// Longest slice of an error body carried into a [`JobError`].
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Map a transport-level failure (DNS, TLS, timeout, ...) to the taxonomy.
pub(crate) fn request_failed(provider: &str, err: reqwest::Error) -> JobError {
    JobError::ProviderUnavailable(format!("{provider} request failed: {err}"))
}

/// Map a non-2xx status to the taxonomy.
///
/// Payload rejections (400, 404, 413, 422) are the caller's fault and map to
/// [`JobError::InvalidInput`]; auth, throttling and server errors map to
/// [`JobError::ProviderUnavailable`].
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> JobError {
    let body = genrelay_core::messages::truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS);
    match status.as_u16() {
        400 | 404 | 413 | 422 => {
            JobError::InvalidInput(format!("{provider} rejected the request ({status}): {body}"))
        }
        _ => JobError::ProviderUnavailable(format!("{provider} returned {status}: {body}")),
    }
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or the classified error carrying the body text.
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, JobError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::warn!(provider, %status, body = %body, "Provider returned an error status");
        return Err(classify_status(provider, status, &body));
    }
    Ok(response)
}

/// Parse a successful JSON response body.
pub(crate) async fn read_json(
    provider: &str,
    response: reqwest::Response,
) -> Result<Value, JobError> {
    let response = ensure_success(provider, response).await?;
    let text = response
        .text()
        .await
        .map_err(|e| request_failed(provider, e))?;
    serde_json::from_str(&text).map_err(|_| {
        tracing::warn!(provider, raw_payload = %text, "Provider returned non-JSON body");
        JobError::UnrecognizedResponseShape {
            provider: provider.to_string(),
            raw: text,
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn payload_rejections_are_invalid_input() {
        for code in [400, 404, 413, 422] {
            let status = StatusCode::from_u16(code).expect("status");
            assert_matches!(
                classify_status("replicate", status, "bad field"),
                JobError::InvalidInput(msg) if msg.contains("bad field")
            );
        }
    }

    #[test]
    fn auth_throttle_and_server_errors_are_unavailable() {
        for code in [401, 403, 429, 500, 502, 503] {
            let status = StatusCode::from_u16(code).expect("status");
            assert_matches!(
                classify_status("openai", status, ""),
                JobError::ProviderUnavailable(_)
            );
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = classify_status("openai", StatusCode::BAD_GATEWAY, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn transport_errors_are_unavailable() {
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        assert_matches!(request_failed("openai", req_err), JobError::ProviderUnavailable(_));
    }
}
