//! Unpaywall open-access resolver.
//!
//! Looks up a DOI in the Unpaywall API and tries every open-access URL it
//! reports, best location first. API documentation: <https://unpaywall.org/api/v2>

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::models::SourceTag;
use crate::sources::{PdfSource, SourceError};
use crate::utils::{Doi, HttpClient, PdfDownloader};

/// Unpaywall acquisition strategy
///
/// Requires a contact email; without one every attempt returns
/// [`SourceError::Disabled`].
#[derive(Debug, Clone)]
pub struct UnpaywallSource {
    client: Arc<HttpClient>,
    downloader: PdfDownloader,
    base_url: String,
    email: Option<String>,
}

impl UnpaywallSource {
    pub fn new(client: Arc<HttpClient>, config: &ResolverConfig) -> Self {
        Self {
            downloader: PdfDownloader::new(Arc::clone(&client)),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.contact_email().map(String::from),
        }
    }

    /// Whether a contact email is configured
    pub fn is_enabled(&self) -> bool {
        self.email.is_some()
    }

    async fn lookup(&self, doi: &Doi, email: &str) -> Result<UnpaywallResponse, SourceError> {
        let url = format!("{}/{}", self.base_url, doi.url_path());
        let response = self.client.get_with_query(&url, &[("email", email)]).await?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "Unpaywall returned status {} for {}",
                response.status(),
                doi
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PdfSource for UnpaywallSource {
    fn id(&self) -> &str {
        "unpaywall"
    }

    fn tag(&self) -> SourceTag {
        SourceTag::Resolver
    }

    async fn attempt(&self, doi: &Doi, destination: &Path) -> Result<(), SourceError> {
        let Some(email) = self.email.as_deref() else {
            return Err(SourceError::Disabled(
                "no Unpaywall contact email configured".to_string(),
            ));
        };

        let payload = self.lookup(doi, email).await?;
        let urls = candidate_urls(&payload);
        if urls.is_empty() {
            return Err(SourceError::NotFound(format!(
                "Unpaywall has no OA URLs for DOI {}",
                doi
            )));
        }

        for url in &urls {
            tracing::info!("Trying Unpaywall URL for DOI {}: {}", doi, url);
            if self.downloader.download(url, destination).await {
                return Ok(());
            }
        }

        Err(SourceError::NotFound(format!(
            "none of {} Unpaywall URLs yielded a PDF",
            urls.len()
        )))
    }
}

/// Unpaywall API response, reduced to the location fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnpaywallResponse {
    #[serde(default)]
    pub best_oa_location: Option<OaLocation>,
    #[serde(default)]
    pub oa_locations: Option<Vec<OaLocation>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OaLocation {
    #[serde(default)]
    pub url_for_pdf: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl OaLocation {
    fn urls(&self) -> impl Iterator<Item = &str> {
        [self.url_for_pdf.as_deref(), self.url.as_deref()]
            .into_iter()
            .flatten()
            .filter(|url| !url.is_empty())
    }
}

/// Candidate download URLs in preference order, without duplicates.
///
/// The best location's direct PDF link and landing URL come first, followed
/// by the same pair for every other listed location.
pub fn candidate_urls(response: &UnpaywallResponse) -> Vec<String> {
    let others = response.oa_locations.iter().flatten();
    let mut urls: Vec<String> = Vec::new();

    for url in response
        .best_oa_location
        .iter()
        .chain(others)
        .flat_map(|location| location.urls())
    {
        if !urls.iter().any(|seen| seen == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RetryConfig;
    use mockito::{Matcher, Server};
    use tempfile::tempdir;

    fn source(base_url: &str, email: Option<&str>) -> UnpaywallSource {
        let client = HttpClient::new()
            .unwrap()
            .with_retry_config(RetryConfig::immediate(0));
        let config = ResolverConfig {
            email: email.map(String::from),
            base_url: base_url.to_string(),
        };
        UnpaywallSource::new(Arc::new(client), &config)
    }

    #[test]
    fn test_candidate_urls_order_and_dedup() {
        let payload: UnpaywallResponse = serde_json::from_str(
            r#"{
                "best_oa_location": {"url_for_pdf": "https://a/pdf", "url": "https://a/landing"},
                "oa_locations": [
                    {"url_for_pdf": "https://a/pdf", "url": "https://a/landing"},
                    {"url_for_pdf": null, "url": "https://b/landing"},
                    {"url_for_pdf": "", "url": "https://c/landing"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            candidate_urls(&payload),
            vec![
                "https://a/pdf",
                "https://a/landing",
                "https://b/landing",
                "https://c/landing"
            ]
        );
    }

    #[test]
    fn test_candidate_urls_missing_locations() {
        let payload: UnpaywallResponse =
            serde_json::from_str(r#"{"best_oa_location": null, "oa_locations": null}"#).unwrap();
        assert!(candidate_urls(&payload).is_empty());

        let payload: UnpaywallResponse = serde_json::from_str(r#"{"doi": "10.1/x"}"#).unwrap();
        assert!(candidate_urls(&payload).is_empty());
    }

    #[test]
    fn test_blank_email_disables() {
        assert!(!source("http://localhost", Some("  ")).is_enabled());
        assert!(!source("http://localhost", None).is_enabled());
        assert!(source("http://localhost", Some("me@example.org")).is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_without_email_makes_no_request() {
        let dir = tempdir().unwrap();
        let doi = Doi::parse("10.1234/abc").unwrap();
        let result = source("http://127.0.0.1:9", None)
            .attempt(&doi, &dir.path().join("a.pdf"))
            .await;
        assert!(matches!(result, Err(SourceError::Disabled(_))));
    }

    #[tokio::test]
    async fn test_falls_through_to_second_candidate() {
        let mut server = Server::new_async().await;
        let body = format!(
            r#"{{"best_oa_location": {{"url_for_pdf": "{0}/landing", "url": null}},
                 "oa_locations": [{{"url_for_pdf": "{0}/file.pdf", "url": null}}]}}"#,
            server.url()
        );
        let lookup = server
            .mock("GET", "/v2/10.1234/abc")
            .match_query(Matcher::UrlEncoded("email".into(), "me@example.org".into()))
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/landing")
            .with_header("content-type", "text/html")
            .with_body("<html>paywall</html>")
            .create_async()
            .await;
        server
            .mock("GET", "/file.pdf")
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.7 resolved")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.pdf");
        let doi = Doi::parse("10.1234/abc").unwrap();

        source(&format!("{}/v2", server.url()), Some("me@example.org"))
            .attempt(&doi, &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7 resolved");
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn test_lookup_failure_is_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/10.1234/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let doi = Doi::parse("10.1234/missing").unwrap();
        let result = source(&format!("{}/v2", server.url()), Some("me@example.org"))
            .attempt(&doi, &dir.path().join("a.pdf"))
            .await;

        assert!(matches!(result, Err(SourceError::Api(_))));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/10.1234/abc")
            .match_query(Matcher::Any)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let doi = Doi::parse("10.1234/abc").unwrap();
        let result = source(&format!("{}/v2", server.url()), Some("me@example.org"))
            .attempt(&doi, &dir.path().join("a.pdf"))
            .await;

        assert!(matches!(result, Err(SourceError::Parse(_))));
    }
}
