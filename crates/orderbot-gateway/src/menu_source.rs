//! Menu loading: JSON file, published spreadsheet CSV, periodic refresh

use orderbot_core::{price_in_range, Decimal, Menu, MenuHandle};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::MenuSettings;
use crate::{GatewayError, Result};

const NAME_COLUMN: &str = "name";
const ITEM_COLUMN: &str = "item";
const PRICE_COLUMN: &str = "price";

/// Where the menu comes from
#[derive(Debug, Clone)]
pub struct MenuSource {
    path: PathBuf,
    sheet_csv_url: Option<String>,
    http_client: reqwest::Client,
}

impl MenuSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet_csv_url: None,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_sheet(mut self, url: impl Into<String>) -> Self {
        self.sheet_csv_url = Some(url.into());
        self
    }

    pub fn from_settings(settings: &MenuSettings) -> Self {
        let source = Self::new(&settings.path);
        match &settings.sheet_csv_url {
            Some(url) => source.with_sheet(url),
            None => source,
        }
    }

    /// Fetch the sheet when one is configured, otherwise (or when the fetch
    /// fails) read the JSON file.
    pub async fn load(&self) -> Result<Menu> {
        if let Some(url) = &self.sheet_csv_url {
            match self.fetch_sheet(url).await {
                Ok(menu) => {
                    tracing::info!(url = %url, items = menu.item_count(), "Menu synced from sheet");
                    return Ok(menu);
                }
                Err(e) => {
                    tracing::warn!(url = %url, "Sheet sync failed, using {}: {}", self.path.display(), e);
                }
            }
        }
        read_menu_file(&self.path)
    }

    /// Startup load; any failure yields an empty menu so the bot can answer
    /// "menu unavailable" instead of refusing to start.
    pub async fn load_or_empty(&self) -> Menu {
        match self.load().await {
            Ok(menu) => menu,
            Err(e) => {
                tracing::error!("Failed to load menu: {}", e);
                Menu::empty()
            }
        }
    }

    async fn fetch_sheet(&self, url: &str) -> Result<Menu> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::MenuSource(format!(
                "sheet download failed ({})",
                status
            )));
        }
        let body = response.bytes().await?;
        parse_sheet_csv(body.as_ref())
    }
}

/// Read a JSON menu document; a missing file is an empty menu.
pub fn read_menu_file(path: &Path) -> Result<Menu> {
    if !path.exists() {
        tracing::warn!("{} not found, starting with an empty menu", path.display());
        return Ok(Menu::empty());
    }
    let content = std::fs::read_to_string(path)?;
    let menu = Menu::from_json_str(&content)?;
    tracing::info!(
        path = %path.display(),
        sections = menu.sections().len(),
        items = menu.item_count(),
        "Menu loaded"
    );
    Ok(menu)
}

/// Parse a `Name,Item,Price` sheet export into a sectioned menu.
///
/// Rows with a blank name or item, or a price outside the accepted range,
/// are skipped. A repeated item keeps the last price.
pub fn parse_sheet_csv<R: Read>(reader: R) -> Result<Menu> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| GatewayError::MenuSource(format!("sheet has no '{}' column", name)))
    };
    let (name_col, item_col, price_col) =
        (column(NAME_COLUMN)?, column(ITEM_COLUMN)?, column(PRICE_COLUMN)?);

    let mut sections: BTreeMap<String, BTreeMap<String, Decimal>> = BTreeMap::new();
    let mut skipped = 0usize;
    for record in csv_reader.records() {
        let record = record?;
        let name = record.get(name_col).unwrap_or_default().to_lowercase();
        let item = record.get(item_col).unwrap_or_default().to_lowercase();
        let price = record
            .get(price_col)
            .map(|p| p.trim_start_matches('$'))
            .and_then(|p| Decimal::from_str(p).ok())
            .filter(price_in_range);

        match price {
            Some(price) if !name.is_empty() && !item.is_empty() => {
                sections.entry(name).or_default().insert(item, price);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, "Skipped incomplete sheet rows");
    }
    Ok(Menu::sectioned(sections)?)
}

/// Periodically reload `source` into `handle`. A failed or empty reload
/// keeps the current snapshot.
pub fn spawn_refresh(source: MenuSource, handle: MenuHandle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match source.load().await {
                Ok(menu) if !menu.is_empty() => handle.replace(menu),
                Ok(_) => tracing::warn!("Menu refresh produced an empty menu, keeping current"),
                Err(e) => tracing::warn!("Menu refresh failed, keeping current: {}", e),
            }
        }
    })
}
