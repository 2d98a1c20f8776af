//! HTTP retry helpers for transient errors.
//!
//! Every request the client makes goes through [`send`] or [`send_json`]
//! so that timeouts, connection resets, rate limiting and server errors
//! are retried with exponential backoff. Other 4xx responses are
//! permanent and returned immediately.
//!
//! # Usage
//!
//! ```ignore
//! let info: ProjectInfo = retry::send_json(|| client.get(url.clone()).bearer_auth(token)).await?;
//! let response = retry::send(|| client.get(url.clone())).await?;
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::MerginError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// Backoff doubles from 2s, so five retries wait 62 seconds in total
/// before giving up.
const MAX_RETRIES: u32 = 5;

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends the request built by `build_request` and decodes the JSON body
/// as `T`.
///
/// The closure is called once per attempt because a
/// [`reqwest::RequestBuilder`] is consumed by `.send()`.
///
/// # Errors
///
/// Returns [`MerginError`] if the request fails after all retries, the
/// server answers with a non-retryable status, or the body is not valid
/// JSON for `T`.
#[allow(clippy::future_not_send)]
pub async fn send_json<T, F>(build_request: F) -> Result<T, MerginError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send(build_request).await?;
    let url = response.url().clone();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "JSON parse failed for {}: {e}\n  body preview: {}",
            redact(&url),
            preview(&text)
        );
        MerginError::Json(e)
    })
}

/// Sends the request built by `build_request`, retrying transient
/// failures, and returns the successful response with its body unread.
///
/// # Errors
///
/// Returns [`MerginError::Http`] for a non-transient transport error or
/// one that persists after [`MAX_RETRIES`] retries, and
/// [`MerginError::Status`] for a 4xx response (other than 429) or a 429
/// / 5xx that persists.
#[allow(clippy::future_not_send)]
pub async fn send<F>(build_request: F) -> Result<reqwest::Response, MerginError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < MAX_RETRIES {
                    log::warn!("  transient error: {}", e.without_url());
                    attempt += 1;
                    continue;
                }
                return Err(MerginError::Http(e.without_url()));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < MAX_RETRIES {
                        log::warn!("  HTTP {status} from {}", redact(response.url()));
                        attempt += 1;
                        continue;
                    }
                    return Err(status_error(response).await);
                }

                if status.is_client_error() {
                    return Err(status_error(response).await);
                }

                return Ok(response);
            }
        }
    }
}

async fn status_error(response: reqwest::Response) -> MerginError {
    let status = response.status().as_u16();
    let url = redact(response.url());
    let body = response.text().await.unwrap_or_default();

    MerginError::Status {
        status,
        url,
        message: preview(&body),
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// The URL without its query string, which may carry file names and
/// versions but never belongs in an error banner verbatim.
fn redact(url: &reqwest::Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

fn preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_string();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_PREVIEW_LEN);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.len() <= BODY_PREVIEW_LEN + 3);

        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn redact_drops_query() {
        let url =
            reqwest::Url::parse("https://example.com/v1/project/raw/a/b?file=x.gpkg&version=v2")
                .unwrap();
        assert_eq!(redact(&url), "https://example.com/v1/project/raw/a/b");
    }
}
