//! Mirror site acquisition.
//!
//! A mirror answers `{base}/{doi}` with either the PDF itself or an HTML page
//! that embeds or links to it. One [`MirrorSource`] wraps one mirror host; the
//! waterfall holds one per configured host, in configured order.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::Arc;
use url::Url;

use crate::models::SourceTag;
use crate::sources::{PdfSource, SourceError};
use crate::utils::{content_type, is_pdf_content_type, save_pdf_response, Doi, HttpClient, PdfDownloader};

/// Structural selectors for the PDF element, most specific first
const PDF_LINK_SELECTORS: &[&str] = &[
    "iframe#pdf",
    "iframe[src*='.pdf']",
    "embed[src*='.pdf']",
    "a[href$='.pdf']",
    "a[href*='/downloads/'][href*='.pdf']",
];

/// A single mirror host
#[derive(Debug, Clone)]
pub struct MirrorSource {
    client: Arc<HttpClient>,
    downloader: PdfDownloader,
    id: String,
    base_url: String,
}

impl MirrorSource {
    /// Create a strategy for `host`; bare hosts are given an `https://` scheme
    pub fn new(client: Arc<HttpClient>, host: &str) -> Self {
        let base_url = mirror_base_url(host);
        Self {
            downloader: PdfDownloader::new(Arc::clone(&client)),
            client,
            id: format!("mirror:{}", host.trim()),
            base_url,
        }
    }
}

#[async_trait]
impl PdfSource for MirrorSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn tag(&self) -> SourceTag {
        SourceTag::Mirror
    }

    async fn attempt(&self, doi: &Doi, destination: &Path) -> Result<(), SourceError> {
        let lookup_url = format!("{}/{}", self.base_url, doi.url_path());
        tracing::info!("Trying mirror {}", lookup_url);

        let response = self.client.get(&lookup_url).await?;
        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "mirror {} returned status {}",
                self.base_url,
                response.status()
            )));
        }

        if is_pdf_content_type(&content_type(&response)) {
            return if save_pdf_response(response, destination).await? {
                Ok(())
            } else {
                Err(SourceError::NotFound("empty PDF response".to_string()))
            };
        }

        let html = response.text().await?;
        let Some(pdf_url) = extract_pdf_link(&html, &self.base_url) else {
            return Err(SourceError::NotFound(format!(
                "no PDF link found in mirror response: {}",
                self.base_url
            )));
        };

        if self.downloader.download(&pdf_url, destination).await {
            Ok(())
        } else {
            Err(SourceError::NotFound(format!(
                "linked document at {} is not a PDF",
                pdf_url
            )))
        }
    }
}

/// `https://` for bare hosts, no trailing slash
pub fn mirror_base_url(host: &str) -> String {
    let host = host.trim();
    let base = if host.starts_with("http") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    base.trim_end_matches('/').to_string()
}

/// Find the PDF element in a mirror page and resolve its link against `base_url`.
pub fn extract_pdf_link(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok()?;

    for css in PDF_LINK_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let Some(element) = document.select(&selector).next() else {
            continue;
        };

        let link = element
            .value()
            .attr("src")
            .filter(|src| !src.is_empty())
            .or_else(|| element.value().attr("href"))
            .map(str::trim)
            .filter(|link| !link.is_empty());

        if let Some(link) = link {
            return base.join(link).ok().map(String::from);
        }
    }
    None
}
