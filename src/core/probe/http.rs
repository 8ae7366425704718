// src/core/probe/http.rs

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client};
use tracing::debug;
use url::Url;

use super::{HttpProber, PageSnapshot, PathResponse};
use crate::config::HttpConfig;
use crate::core::error::ProbeError;

const MAX_PAGE_REDIRECTS: usize = 5;

/// HTTP probes over reqwest. Path probes never follow redirects so that
/// 3xx answers stay visible; page fetches follow a few.
pub struct HttpClientProber {
    paths: Client,
    pages: Client,
}

impl HttpClientProber {
    pub fn new(config: &HttpConfig) -> Result<Self, ProbeError> {
        let paths = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .redirect(redirect::Policy::none())
            .build()?;
        let pages = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .redirect(redirect::Policy::limited(MAX_PAGE_REDIRECTS))
            .build()?;
        Ok(Self { paths, pages })
    }
}

/// Joins a candidate path onto a base URL, treating the base as a directory.
pub fn join_path(base: &Url, path: &str) -> Result<Url, ProbeError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.set_query(None);
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ProbeError::Connect(format!("cannot join {:?}: {}", path, e)))
}

#[async_trait]
impl HttpProber for HttpClientProber {
    async fn probe_path(&self, base: &Url, path: &str) -> Result<PathResponse, ProbeError> {
        let url = join_path(base, path)?;
        let response = self.paths.get(url.clone()).send().await?;
        debug!(url = %url, status = %response.status(), "Path probe answered.");
        Ok(PathResponse {
            status_code: response.status().as_u16(),
            content_type: response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            content_length: response.content_length(),
        })
    }

    async fn fetch_page(&self, url: &Url) -> Result<PageSnapshot, ProbeError> {
        let response = self.pages.get(url.clone()).send().await?;
        let status_code = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(url = %final_url, status = %status_code, bytes = %body.len(), "Page fetched.");
        Ok(PageSnapshot { url: final_url, status_code, headers, body })
    }
}
