pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod log;
pub mod quota;
pub mod request;
pub mod rotation;
pub mod service;
pub mod store;
pub mod transport;

use crate::config::{ApiCategory, AppConfig};
use crate::quota::ApiUsage;
use crate::service::FeedService;
use crate::store::{DiskStore, KeyValue};
use crate::transport::HttpTransport;
use anyhow::{Context, Result};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub enum AppCommand {
    Fetch {
        category: ApiCategory,
        endpoint: String,
        params: Vec<(String, Option<String>)>,
        ttl_secs: u64,
    },
    Usage,
    CacheClear {
        prefix: Option<String>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    let data_path = AppConfig::default_data_path()?.join("store");
    let store: Arc<dyn KeyValue> = Arc::new(DiskStore::open(&data_path, "finfeed")?);
    let transport = Arc::new(HttpTransport::new()?);
    let service = FeedService::new(&config, store, transport)?;

    match command {
        AppCommand::Fetch {
            category,
            endpoint,
            params,
            ttl_secs,
        } => {
            let payload = service
                .fetch(category, &endpoint, &params, Duration::from_secs(ttl_secs))
                .await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        AppCommand::Usage => {
            let snapshot = service.usage_snapshot();
            if snapshot.is_empty() {
                println!("No API calls recorded today.");
            } else {
                println!("{}", usage_table(&snapshot));
            }
        }
        AppCommand::CacheClear { prefix } => {
            match &prefix {
                Some(prefix) => service.cache().invalidate_by_prefix(prefix),
                None => service.cache().invalidate_all(),
            }
            info!(?prefix, "Cache cleared");
        }
    }
    Ok(())
}

/// Parses repeated `name=value` CLI arguments; a bare `name` becomes a
/// valueless parameter that the request builder will skip.
pub fn parse_params(raw: &[String]) -> Vec<(String, Option<String>)> {
    raw.iter()
        .map(|p| match p.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (p.clone(), None),
        })
        .collect()
}

fn usage_table(snapshot: &[ApiUsage]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        header_cell("API"),
        header_cell("Used"),
        header_cell("Remaining"),
        header_cell("Daily limit"),
    ]);

    for usage in snapshot {
        table.add_row(vec![
            Cell::new(&usage.api),
            Cell::new(usage.count).set_alignment(CellAlignment::Right),
            optional_cell(usage.remaining),
            optional_cell(usage.total),
        ]);
    }
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn optional_cell(value: Option<u32>) -> Cell {
    value.map_or(
        Cell::new("unlimited")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(v).set_alignment(CellAlignment::Right),
    )
}

pub fn write_default_config() -> Result<()> {
    let path = AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = serde_yaml::to_string(&AppConfig::default())?;
    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    info!("Created default configuration at {}", path.display());
    Ok(())
}
