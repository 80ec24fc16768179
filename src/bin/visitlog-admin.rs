use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use visitlog::analytics::{GeoLocator, VisitorService};
use visitlog::api::handlers::{generate_session_id, validate_pagination};
use visitlog::config::Config;
use visitlog::storage;

#[derive(Parser)]
#[command(name = "visitlog-admin")]
#[command(about = "Visitlog admin management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the visitors table and indexes
    Init,
    /// Show visitor totals and the latest visits
    Stats,
    /// Show one page of visit history
    Page {
        /// 1-based page number
        page: i64,
        /// Visits per page (1-100)
        #[arg(long, default_value_t = 20)]
        page_size: i64,
    },
    /// Show the most recent visits
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Record a visit by hand
    Record {
        /// Session identifier; generated when omitted
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value = "unknown")]
        ip: String,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long, default_value = "direct")]
        referer: String,
    },
    /// Check database connectivity
    Health,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let executor = storage::connect(&config.database).await?;

    // Ensure database is initialized
    executor.init().await?;

    let locator = GeoLocator::new(config.analytics.geoip_city_db_path.as_deref())?;
    let service = Arc::new(
        VisitorService::new(Arc::clone(&executor), config.cache.clone()).with_locator(locator),
    );

    match cli.command {
        Commands::Init => {
            println!("✓ Visitors table ready ({})", executor.dialect().name());
        }
        Commands::Stats => {
            let stats = service.get_stats().await?;
            print_json(&stats)?;
        }
        Commands::Page { page, page_size } => {
            let (page, page_size) = validate_pagination(page, page_size)
                .map_err(|_| anyhow::anyhow!("page must be >= 1 and page size within 1-100"))?;
            let result = service.get_paginated(page, page_size).await?;
            print_json(&result)?;
        }
        Commands::Recent { limit } => {
            let recent = service.get_recent_visitors(limit).await?;
            if recent.is_empty() {
                println!("No visits recorded yet.");
            } else {
                println!(
                    "{:<8} {:<24} {:<10} {:<10} {:<10} {}",
                    "ID", "Visited at", "Device", "Browser", "OS", "Location"
                );
                println!("{}", "-".repeat(90));
                for visit in recent {
                    println!(
                        "{:<8} {:<24} {:<10} {:<10} {:<10} {}/{}/{}",
                        visit.id,
                        visit.visited_at,
                        visit.device_type,
                        visit.browser,
                        visit.os,
                        visit.country,
                        visit.region,
                        visit.city
                    );
                }
            }
        }
        Commands::Record {
            session_id,
            ip,
            user_agent,
            referer,
        } => {
            let session_id = session_id.unwrap_or_else(generate_session_id);
            service
                .record_visit(&ip, user_agent.as_deref(), &referer, &session_id)
                .await
                .context("Failed to record visit")?;
            println!("✓ Recorded visit for session '{}'", session_id);
        }
        Commands::Health => {
            let report = service.health().await;
            print_json(&report)?;
            if !report.healthy {
                anyhow::bail!("database is unreachable");
            }
        }
    }

    Ok(())
}
