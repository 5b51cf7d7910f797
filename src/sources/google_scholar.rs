//! Google Scholar search paginator.
//!
//! Google Scholar has no public API, so results are scraped from the HTML
//! listing. All knowledge of that page layout lives in this module: the
//! result-block selectors, the metadata-line conventions and the phrases that
//! signal a block page.
//!
//! Pagination walks `start=0, 10, 20, ...` strictly in order and never fails:
//! when the page keeps erroring or rate limiting, whatever was accumulated so
//! far is returned.

use rand::Rng;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::config::SearchConfig;
use crate::models::{SearchQuery, SearchResult, SearchResultBuilder};
use crate::utils::HttpClient;

static RESULT_BLOCK: LazyLock<Selector> = LazyLock::new(|| selector("div.gs_r.gs_or.gs_scl"));
static TITLE_LINK: LazyLock<Selector> = LazyLock::new(|| selector("h3.gs_rt a"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h3.gs_rt"));
static SNIPPET: LazyLock<Selector> = LazyLock::new(|| selector("div.gs_rs"));
static METADATA_LINE: LazyLock<Selector> = LazyLock::new(|| selector("div.gs_a"));
static FOOTER_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(".gs_fl a"));

/// Authors end at the first hyphen preceded by a space or a non-breaking space.
static AUTHOR_SEPARATOR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[\u{a0}\s]-").expect("valid separator regex"));
static YEAR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));
static DOI_CANDIDATE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)10\.\d{4,}/\S+").expect("valid DOI regex"));
static CITED_BY: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)Cited by\s+(\d+)").expect("valid citation regex"));

const RATE_LIMIT_MARKERS: &[&str] = &[
    "our systems have detected unusual traffic",
    "please show you're not a robot",
    "detected unusual traffic",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

/// Where the paginator is between requests
#[derive(Debug, Clone, Copy, PartialEq)]
enum PageState {
    Fetching,
    Backoff(Duration),
    Done,
}

/// What a single page request produced
#[derive(Debug)]
enum PageFetch {
    Page(Vec<SearchResult>),
    RateLimited,
    Failed(String),
}

/// Google Scholar search source
#[derive(Debug, Clone)]
pub struct GoogleScholarSource {
    client: Arc<HttpClient>,
    config: SearchConfig,
}

impl GoogleScholarSource {
    pub fn new(client: Arc<HttpClient>, config: SearchConfig) -> Self {
        Self { client, config }
    }

    /// Fetch pages until `max_results` records are collected, the listing runs
    /// dry, or too many consecutive attempts fail.
    pub async fn search(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let mut results = Vec::new();
        if query.max_results == 0 {
            return results;
        }

        let mut offset = 0usize;
        let mut attempt = 0u32;
        let mut state = PageState::Fetching;

        loop {
            match state {
                PageState::Done => break,
                PageState::Backoff(wait) => {
                    if attempt >= self.config.max_attempts {
                        tracing::warn!(
                            "Giving up on Google Scholar after {} consecutive failures at start={}",
                            attempt,
                            offset
                        );
                        state = PageState::Done;
                        continue;
                    }
                    tokio::time::sleep(wait).await;
                    state = PageState::Fetching;
                }
                PageState::Fetching => {
                    tracing::info!("Fetching Scholar page start={}", offset);
                    state = match self.fetch_page(query, offset).await {
                        PageFetch::Failed(reason) => {
                            let wait = self.failure_wait(attempt);
                            tracing::warn!(
                                "Scholar request failed ({}). Retrying in {:?}",
                                reason,
                                wait
                            );
                            attempt += 1;
                            PageState::Backoff(wait)
                        }
                        PageFetch::RateLimited => {
                            let wait = self.rate_limit_wait(attempt);
                            tracing::warn!("Scholar rate limit detected. Backing off for {:?}", wait);
                            attempt += 1;
                            PageState::Backoff(wait)
                        }
                        PageFetch::Page(entries) if entries.is_empty() => {
                            tracing::info!("No further Scholar results found");
                            PageState::Done
                        }
                        PageFetch::Page(entries) => {
                            results.extend(entries);
                            offset += self.config.page_size;
                            attempt = 0;
                            if results.len() >= query.max_results {
                                PageState::Done
                            } else {
                                tokio::time::sleep(self.politeness_pause()).await;
                                PageState::Fetching
                            }
                        }
                    };
                }
            }
        }

        results.truncate(query.max_results);
        results
    }

    async fn fetch_page(&self, query: &SearchQuery, offset: usize) -> PageFetch {
        let start = offset.to_string();
        let params = [
            ("q", query.query.as_str()),
            ("hl", query.language.as_str()),
            ("start", start.as_str()),
        ];

        let response = match self.client.get_with_query(&self.config.base_url, &params).await {
            Ok(response) => response,
            Err(e) => return PageFetch::Failed(e.to_string()),
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return PageFetch::RateLimited;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return PageFetch::Failed(format!("failed to read page: {}", e)),
        };

        if is_rate_limited(&body) {
            return PageFetch::RateLimited;
        }
        if !status.is_success() {
            return PageFetch::Failed(format!("status {}", status));
        }

        PageFetch::Page(parse_results(&body))
    }

    /// `2^attempt` units after a transport failure
    fn failure_wait(&self, attempt: u32) -> Duration {
        self.exponential(attempt)
    }

    /// `min(cap, 2^attempt units + jitter)` after a rate-limit signal
    fn rate_limit_wait(&self, attempt: u32) -> Duration {
        let jitter = random_between(self.config.jitter_min_ms, self.config.jitter_max_ms);
        let cap = Duration::from_secs(self.config.backoff_cap_secs);
        (self.exponential(attempt) + jitter).min(cap)
    }

    fn politeness_pause(&self) -> Duration {
        random_between(self.config.politeness_min_ms, self.config.politeness_max_ms)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.config.backoff_unit_ms.saturating_mul(factor))
    }
}

fn random_between(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Whether a response body is a block or CAPTCHA page rather than results.
pub fn is_rate_limited(body: &str) -> bool {
    let lowered = body.to_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Parse every result block on a listing page, in page order.
pub fn parse_results(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    document.select(&RESULT_BLOCK).filter_map(parse_entry).collect()
}

fn parse_entry(block: ElementRef<'_>) -> Option<SearchResult> {
    let title_link = block.select(&TITLE_LINK).next();
    let title_element = title_link.or_else(|| block.select(&TITLE).next())?;

    let title = element_text(title_element);
    let url = title_link
        .and_then(|link| link.value().attr("href"))
        .unwrap_or_default()
        .to_string();
    let snippet = block
        .select(&SNIPPET)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let metadata = block
        .select(&METADATA_LINE)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let doi = extract_doi_candidate(&[&title, &url, &snippet]);

    Some(
        SearchResultBuilder::new(title)
            .authors(extract_authors(&metadata))
            .year(extract_year(&metadata))
            .doi(doi)
            .url(url)
            .snippet(snippet)
            .citations(extract_citations(block))
            .build(),
    )
}

/// Text content with each fragment trimmed and joined by single spaces
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Authors are the comma-separated names before the first ` -` separator.
pub fn extract_authors(metadata: &str) -> Vec<String> {
    let segment = AUTHOR_SEPARATOR
        .splitn(metadata, 2)
        .next()
        .unwrap_or_default();

    segment
        .split(',')
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .map(String::from)
        .collect()
}

/// First standalone 19xx/20xx token
pub fn extract_year(metadata: &str) -> Option<u16> {
    YEAR.find(metadata)
        .and_then(|found| found.as_str().parse().ok())
}

/// First DOI-looking token across the candidates, in priority order
pub fn extract_doi_candidate(candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter(|value| !value.is_empty())
        .find_map(|value| DOI_CANDIDATE.find(value))
        .map(|found| {
            found
                .as_str()
                .trim_end_matches(['.', ',', ';', ')'])
                .to_string()
        })
}

fn extract_citations(block: ElementRef<'_>) -> u32 {
    block
        .select(&FOOTER_LINKS)
        .find_map(|link| {
            let text = element_text(link);
            CITED_BY
                .captures(&text)
                .and_then(|caps| caps[1].parse().ok())
        })
        .unwrap_or(0)
}
