//! Unified news and profile fetch example
//!
//! Fetches a week of news and the company profile for one symbol concurrently
//! and prints where each result came from.
//!
//! To run this example:
//! ```bash
//! # Optional: enables the enhanced strategy
//! export ALPHA_VANTAGE_API_KEY=your_key_here
//! export DATA_SOURCE_STRATEGY=enhanced
//!
//! cargo run -p agent-data --example unified_fetch AAPL
//! ```

use agent_data::{FetchResult, NewsQuery, ProfileQuery, UnifiedDataService};
use chrono::{Duration, Utc};
use std::env;

fn print_provenance<T>(label: &str, result: &FetchResult<T>) {
    println!(
        "{label}: served by {} (cache: {})",
        result.served_by, result.served_from_cache
    );
    for attempt in &result.attempts {
        println!("  - {attempt}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_utils::init_tracing_with("warn,agent_data=info");

    let symbol = env::args().nth(1).unwrap_or_else(|| "AAPL".to_string());
    let service = UnifiedDataService::from_env()?;

    let summary = service.current_config().summary();
    println!("=== Unified Data Fetch ===\n");
    println!("Symbol: {symbol}");
    println!("Strategy: {} (auto fallback: {})", summary.strategy, summary.auto_fallback_enabled);
    println!("News priority: {:?}", summary.news_priority);
    println!("Profile priority: {:?}\n", summary.profile_priority);

    let today = Utc::now().date_naive();
    let news_query = NewsQuery::new(&symbol, today - Duration::days(7), today).limit(5);
    let profile_query = ProfileQuery::new(&symbol);

    let (news, profile) = tokio::join!(
        service.get_company_news_unified(news_query),
        service.get_company_profile_unified(profile_query),
    );

    match news {
        Ok(news) => {
            print_provenance("News", &news);
            for item in &news.payload {
                println!("  * {} ({})", item.title, item.source);
            }
        },
        Err(e) => println!("News unavailable: {e}"),
    }
    println!();

    match profile {
        Ok(profile) => {
            print_provenance("Profile", &profile);
            let company = &profile.payload;
            println!("  {} [{:?}]", company.official_name, company.market_cap_range);
            if let Some(industry) = &company.industry {
                println!("  Industry: {industry}");
            }
        },
        Err(e) => println!("Profile unavailable: {e}"),
    }

    println!("\n=== Data Source Status ===");
    println!("{}", serde_json::to_string_pretty(&service.data_source_status())?);

    Ok(())
}
