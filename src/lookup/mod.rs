// src/lookup/mod.rs — Market-Value Lookup Bridge
//
// One search per (item, source) pair against the search collaborator.
// Structured price annotations are the primary extraction path; a $-amount
// text pattern over title/snippet is the fallback. Source failures are
// isolated — one bad source never abandons the batch.

use std::sync::OnceLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::infra::errors::VendoraError;

/// Default search sources when the config names none.
pub const DEFAULT_SOURCES: [&str; 2] = ["synergysurgical.com", "dotmed.com"];

/// An inventory item to value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupItem {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
}

/// One organic search result, with the structured price annotation when
/// the source provides one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub rich_snippet: Option<RichSnippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RichSnippet {
    #[serde(default)]
    pub bottom: Option<SnippetExtensions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnippetExtensions {
    #[serde(default)]
    pub detected_extensions: Option<DetectedExtensions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectedExtensions {
    #[serde(default)]
    pub price: Option<f64>,
}

/// A price hit recovered from one search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceQuote {
    pub title: String,
    pub link: String,
    pub price: f64,
}

/// Per-source outcome for one item.
#[derive(Debug, Clone, Serialize)]
pub struct SourceBreakdown {
    pub source: String,
    pub found: bool,
    pub quotes: Vec<SourceQuote>,
    pub average_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One item's valuation across all configured sources.
///
/// `average_price` is `None` when no source produced a single price hit —
/// "no market data", which is not the same as a free item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemValuation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub sources: Vec<SourceBreakdown>,
    pub average_price: Option<f64>,
}

/// Whole-batch outcome. The batch succeeds even when individual items or
/// sources produced nothing.
#[derive(Debug, Clone, Serialize)]
pub struct LookupOutcome {
    pub success: bool,
    pub results: Vec<ItemValuation>,
    pub message: String,
}

/// Search collaborator: free-text query plus a target site filter.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, site: &str) -> Result<Vec<OrganicResult>, VendoraError>;
}

#[derive(Debug, Deserialize)]
struct SearchWire {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

/// Webhook-backed search client.
pub struct SearchClient {
    client: reqwest::Client,
    search_url: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl SearchClient {
    pub fn new(search_url: String, api_key: Option<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            search_url,
            api_key,
            bearer_token,
        }
    }
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn search(&self, query: &str, site: &str) -> Result<Vec<OrganicResult>, VendoraError> {
        let mut params: Vec<(&str, &str)> = vec![("query", query), ("site", site)];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }

        let mut request = self.client.get(&self.search_url).query(&params);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let lookup_err = |message: String| VendoraError::Lookup {
            source_name: site.to_string(),
            message,
        };

        let response = request.send().await.map_err(|e| lookup_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(lookup_err(format!("HTTP {status}: {body}")));
        }

        let wire: SearchWire = response
            .json()
            .await
            .map_err(|e| lookup_err(format!("Malformed search response: {e}")))?;
        Ok(wire.organic_results)
    }
}

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\s?(\d+(?:,\d+)?(?:\.\d+)?)").expect("price pattern"))
}

/// Pull a price out of one search result: the structured annotation when
/// present, otherwise the first $-amount in title, then snippet.
pub fn extract_price(result: &OrganicResult) -> Option<f64> {
    if let Some(price) = result
        .rich_snippet
        .as_ref()
        .and_then(|r| r.bottom.as_ref())
        .and_then(|b| b.detected_extensions.as_ref())
        .and_then(|d| d.price)
    {
        return Some(price);
    }

    for text in [&result.title, &result.snippet] {
        if let Some(captures) = price_pattern().captures(text) {
            let raw = captures[1].replace(',', "");
            if let Ok(price) = raw.parse::<f64>() {
                return Some(price);
            }
        }
    }
    None
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn search_query(item: &LookupItem, source: &str) -> String {
    format!("{} site:{}", item.name.trim(), source)
}

async fn value_item_source(
    backend: &dyn SearchBackend,
    item: &LookupItem,
    source: &str,
) -> SourceBreakdown {
    match backend.search(&search_query(item, source), source).await {
        Ok(results) => {
            let quotes: Vec<SourceQuote> = results
                .iter()
                .filter_map(|r| {
                    extract_price(r).map(|price| SourceQuote {
                        title: r.title.clone(),
                        link: r.link.clone(),
                        price,
                    })
                })
                .collect();
            let prices: Vec<f64> = quotes.iter().map(|q| q.price).collect();
            SourceBreakdown {
                source: source.to_string(),
                found: !quotes.is_empty(),
                average_price: mean(&prices),
                quotes,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(source, "market-value search failed: {e}");
            SourceBreakdown {
                source: source.to_string(),
                found: false,
                quotes: Vec::new(),
                average_price: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Value each item across the configured sources. Sources are queried
/// concurrently per item; failures stay confined to their breakdown entry.
pub async fn lookup_values(
    backend: &dyn SearchBackend,
    items: &[LookupItem],
    sources: &[String],
) -> LookupOutcome {
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let breakdowns = join_all(
            sources
                .iter()
                .map(|source| value_item_source(backend, item, source)),
        )
        .await;

        let source_averages: Vec<f64> =
            breakdowns.iter().filter_map(|b| b.average_price).collect();

        results.push(ItemValuation {
            name: item.name.clone(),
            sku: item.sku.clone(),
            sources: breakdowns,
            average_price: mean(&source_averages),
        });
    }

    let priced = results.iter().filter(|r| r.average_price.is_some()).count();
    LookupOutcome {
        success: true,
        results,
        message: format!(
            "Found market values for {priced} out of {} items",
            items.len()
        ),
    }
}
