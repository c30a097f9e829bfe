// src/cli/lookup.rs — Market-value lookup command

use crate::infra::config::Config;
use crate::infra::session::Session;
use crate::lookup::{self, LookupItem, SearchClient};

pub async fn run_lookup(
    config: &Config,
    session: &Session,
    name: String,
    sku: Option<String>,
    source_override: Vec<String>,
) -> anyhow::Result<()> {
    let sources = if source_override.is_empty() {
        config.lookup.sources.clone()
    } else {
        source_override
    };

    let backend = SearchClient::new(
        config.endpoints.search_url.clone(),
        config.lookup.api_key.clone(),
        Some(session.token.clone()),
    );

    let items = vec![LookupItem {
        name,
        sku,
        expiration_date: None,
        unit_of_measure: None,
    }];

    let outcome = lookup::lookup_values(&backend, &items, &sources).await;

    for item in &outcome.results {
        match item.average_price {
            Some(avg) => println!("{}: ${avg:.2} average", item.name),
            None => println!("{}: no market data", item.name),
        }
        for breakdown in &item.sources {
            match (&breakdown.error, breakdown.average_price) {
                (Some(err), _) => println!("  {}: error ({err})", breakdown.source),
                (None, Some(avg)) => println!(
                    "  {}: ${avg:.2} across {} listing(s)",
                    breakdown.source,
                    breakdown.quotes.len()
                ),
                (None, None) => println!("  {}: no price hits", breakdown.source),
            }
        }
    }
    eprintln!("{}", outcome.message);
    Ok(())
}
