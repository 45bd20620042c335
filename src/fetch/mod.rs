mod basic;
pub mod auth;
#[cfg(test)]
pub(crate) mod testing;

pub use basic::BasicClient;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Longest server-supplied wait that is still trusted.
pub const MAX_RESET_HINT: Duration = Duration::from_secs(60 * 60);

const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Transport seam for every upstream request.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// GETs `url` and decodes a JSON body, classifying failures for the poller.
pub async fn get_json<C: HttpClient, T: DeserializeOwned>(
    client: &C,
    url: Url,
) -> Result<T, FetchError> {
    let req = Request::new(reqwest::Method::GET, url);
    let url = redacted(req.url());
    let resp = client.execute(req).await?;
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset = reset_hint(resp.headers());
        return Err(FetchError::RateLimited { url, reset });
    } else if status == StatusCode::INTERNAL_SERVER_ERROR
        || status == StatusCode::SERVICE_UNAVAILABLE
    {
        return Err(FetchError::ServerError {
            url,
            status: status.as_u16(),
        });
    } else if status.is_client_error() || status.is_server_error() {
        return Err(FetchError::Status {
            url,
            status: status.as_u16(),
        });
    }

    let body = resp.bytes().await?;
    debug!(%url, bytes = body.len(), "Response received");
    serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
}

/// Reads the rate-limit reset hint, in whole seconds.
///
/// Values outside `0..=MAX_RESET_HINT` are discarded.
pub fn reset_hint(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers
        .get(RETRY_AFTER)
        .or_else(|| headers.get(RATE_LIMIT_RESET))?
        .to_str()
        .ok()?
        .trim();

    let Ok(seconds) = raw.parse::<i64>() else {
        warn!(value = raw, "Ignoring unparseable rate-limit reset hint");
        return None;
    };

    match u64::try_from(seconds).map(Duration::from_secs) {
        Ok(hint) if hint <= MAX_RESET_HINT => Some(hint),
        _ => {
            warn!(seconds, "Ignoring out-of-range rate-limit reset hint");
            None
        }
    }
}

fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde::Deserialize;
    use crate::fetch::testing::MockClient;

    #[derive(Debug, Deserialize)]
    struct Body {
        ok: bool,
    }

    fn url() -> Url {
        "http://api.test/x?page=1".parse().unwrap()
    }

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_reset_hint_bounds() {
        assert_eq!(
            reset_hint(&headers("retry-after", "500")),
            Some(Duration::from_secs(500))
        );
        assert_eq!(
            reset_hint(&headers("x-ratelimit-reset", "0")),
            Some(Duration::ZERO)
        );
        assert_eq!(
            reset_hint(&headers("retry-after", "3600")),
            Some(MAX_RESET_HINT)
        );
        assert_eq!(reset_hint(&headers("retry-after", "3601")), None);
        assert_eq!(reset_hint(&headers("retry-after", "-5")), None);
        assert_eq!(reset_hint(&headers("retry-after", "soon")), None);
        assert_eq!(reset_hint(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_get_json_ok() {
        let client = MockClient::new();
        client.push_json(200, r#"{"ok": true}"#);
        let body: Body = get_json(&client, url()).await.unwrap();
        assert!(body.ok);
        assert_eq!(client.requests()[0].url.as_str(), "http://api.test/x?page=1");
    }

    #[tokio::test]
    async fn test_get_json_classifies_statuses() {
        let client = MockClient::new();
        client.push_json(500, "");
        client.push_json(503, "");
        client.push_with_headers(429, &[("retry-after", "120")], "");
        client.push_json(404, "");
        client.push_json(200, "not json");

        let err = get_json::<_, Body>(&client, url()).await.unwrap_err();
        assert!(matches!(err, FetchError::ServerError { status: 500, .. }));

        let err = get_json::<_, Body>(&client, url()).await.unwrap_err();
        assert!(matches!(err, FetchError::ServerError { status: 503, .. }));

        let err = get_json::<_, Body>(&client, url()).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::RateLimited { reset: Some(d), .. } if d == Duration::from_secs(120)
        ));

        let err = get_json::<_, Body>(&client, url()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));

        let err = get_json::<_, Body>(&client, url()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
