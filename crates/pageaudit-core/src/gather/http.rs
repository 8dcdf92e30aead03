//! Gathering over plain HTTP.
//!
//! Each pass issues one GET for the target and derives the artifacts its
//! gatherers ask for from the response. No script runs, so artifacts that
//! need a rendered page are out of reach.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{GatherContext, Gatherer};
use crate::artifacts::Artifacts;
use crate::config::PassConfig;
use crate::error::GatherError;

/// Gatherer names understood by [`HttpGatherer`].
pub const HTTP_GATHERERS: [&str; 7] = [
    "URL",
    "HTTPS",
    "StatusCode",
    "Headers",
    "HTML",
    "Title",
    "Viewport",
];

/// Snapshot of one HTTP response.
#[derive(Debug, Clone)]
struct PageResponse {
    final_url: String,
    status: u16,
    headers: Map<String, Value>,
    body: String,
}

pub struct HttpGatherer {
    title: Regex,
    viewport: Regex,
}

impl HttpGatherer {
    pub fn new() -> Self {
        Self {
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static title pattern"),
            viewport: Regex::new(r#"(?is)<meta\s[^>]*name\s*=\s*["']?viewport["'\s>/]"#)
                .expect("static viewport pattern"),
        }
    }

    fn extract(&self, gatherer: &str, page: &PageResponse) -> Result<Value, GatherError> {
        let value = match gatherer {
            "URL" => json!(page.final_url),
            "HTTPS" => json!(page.final_url.starts_with("https://")),
            "StatusCode" => json!(page.status),
            "Headers" => Value::Object(page.headers.clone()),
            "HTML" => json!(page.body),
            "Title" => self
                .title
                .captures(&page.body)
                .map(|c| json!(c[1].trim()))
                .unwrap_or(Value::Null),
            "Viewport" => json!(self.viewport.is_match(&page.body)),
            other => return Err(GatherError::UnknownGatherer(other.to_string())),
        };
        Ok(value)
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> Result<PageResponse, GatherError> {
        let response = client.get(url).send().await?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    json!(String::from_utf8_lossy(value.as_bytes())),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(PageResponse {
            final_url,
            status,
            headers,
            body,
        })
    }

    fn validate(passes: &[PassConfig]) -> Result<(), GatherError> {
        for gatherer in passes.iter().flat_map(|p| p.gatherers.iter()) {
            if !HTTP_GATHERERS.contains(&gatherer.as_str()) {
                return Err(GatherError::UnknownGatherer(gatherer.clone()));
            }
        }
        Ok(())
    }
}

impl Default for HttpGatherer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpGatherer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatherer").finish()
    }
}

#[async_trait]
impl Gatherer for HttpGatherer {
    type Session = reqwest::Client;

    async fn gather(
        &self,
        ctx: GatherContext<'_, reqwest::Client>,
        passes: &[PassConfig],
    ) -> Result<Artifacts, GatherError> {
        Self::validate(passes)?;

        let mut artifacts = Artifacts::new();
        for pass in passes {
            info!(pass = %pass.name, url = %ctx.url, "Running pass");
            let page = Self::fetch(ctx.session, ctx.url.as_str()).await?;
            debug!(
                pass = %pass.name,
                status = page.status,
                bytes = page.body.len(),
                "Fetched page"
            );

            for gatherer in &pass.gatherers {
                artifacts.insert(gatherer.clone(), self.extract(gatherer, &page)?);
            }
        }

        Ok(artifacts)
    }
}
