use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body.  Anything but a final 200 is an error.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher.  Redirects are followed by hand so every hop is
/// logged and bounded.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_redirects: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("music-presence/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_redirects,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let mut current = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        for _ in 0..=self.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|source| FetchError::Network {
                    url: current.to_string(),
                    source,
                })?;

            let status = response.status();
            if status.is_redirection() {
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or_else(|| FetchError::BadRedirect {
                        url: current.to_string(),
                    })?;
                debug!("fetch: {} {} -> {}", status.as_u16(), current, next);
                current = next;
                continue;
            }

            if status != StatusCode::OK {
                return Err(FetchError::Status {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            return response.text().await.map_err(|source| FetchError::Network {
                url: current.to_string(),
                source,
            });
        }

        Err(FetchError::TooManyRedirects {
            url: url.to_string(),
            hops: self.max_redirects,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode as AxumStatus};
    use axum::{routing::get, Router};
    use tokio::net::TcpListener;

    async fn serve() -> String {
        let app = Router::new()
            .route("/ok", get(|| async { "hello" }))
            .route(
                "/moved",
                get(|| async { (AxumStatus::FOUND, [(header::LOCATION, "/ok")]) }),
            )
            .route(
                "/loop",
                get(|| async { (AxumStatus::FOUND, [(header::LOCATION, "/loop")]) }),
            )
            .route("/nolocation", get(|| async { AxumStatus::MOVED_PERMANENTLY }))
            .route("/created", get(|| async { (AxumStatus::CREATED, "made") }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), 3).unwrap()
    }

    #[tokio::test]
    async fn test_plain_and_redirected_get() {
        let base = serve().await;
        let f = fetcher();
        assert_eq!(f.fetch_text(&format!("{}/ok", base)).await.unwrap(), "hello");
        assert_eq!(f.fetch_text(&format!("{}/moved", base)).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_non_200_is_an_error() {
        let base = serve().await;
        let f = fetcher();

        match f.fetch_text(&format!("{}/created", base)).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 201),
            other => panic!("expected status error, got {:?}", other),
        }
        match f.fetch_text(&format!("{}/absent", base)).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_limits() {
        let base = serve().await;
        let f = fetcher();

        assert!(matches!(
            f.fetch_text(&format!("{}/loop", base)).await,
            Err(FetchError::TooManyRedirects { hops: 3, .. })
        ));
        assert!(matches!(
            f.fetch_text(&format!("{}/nolocation", base)).await,
            Err(FetchError::BadRedirect { .. })
        ));
        assert!(matches!(
            f.fetch_text("not a url").await,
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
