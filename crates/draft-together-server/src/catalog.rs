// Champion catalog ingestion: Data Dragon champion data, community play
// rates for eligible positions, and the periodic refresh job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use draft_together_core::champion::{Catalog, Champion, ChampionId, ChampionRole};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::{CatalogConfig, CatalogSourceKind};
use crate::db::Database;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Data Dragon returned no game versions")]
    NoVersions,

    #[error("champion {riot_id} has a non-numeric key {key:?}")]
    InvalidKey { riot_id: String, key: String },

    #[error("malformed champion data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages from the refresh job to the application loop.
#[derive(Debug)]
pub enum CatalogEvent {
    Refreshed(Catalog),
}

// ---------------------------------------------------------------------------
// Data Dragon champion data
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChampionFullFile {
    data: HashMap<String, DataDragonChampion>,
}

#[derive(Debug, Deserialize)]
struct DataDragonChampion {
    id: String,
    key: String,
    name: String,
    image: DataDragonImage,
    #[serde(default)]
    skins: Vec<DataDragonSkin>,
}

#[derive(Debug, Deserialize)]
struct DataDragonImage {
    full: String,
}

#[derive(Debug, Deserialize)]
struct DataDragonSkin {
    num: i64,
    name: String,
}

/// File name of a champion's centered splash for the given skin.
///
/// Riot publishes Fiddlesticks' centered art as `FiddleSticks_*.jpg` even
/// though the champion id is `Fiddlesticks`.
pub fn centered_image_name(riot_id: &str, skin_num: i64) -> String {
    let file_id = if riot_id == "Fiddlesticks" {
        "FiddleSticks"
    } else {
        riot_id
    };
    format!("{file_id}_{skin_num}.jpg")
}

/// Parse a `championFull.json` document into champion records whose image
/// paths point at the Data Dragon CDN rooted at `base_url`.
pub fn parse_champion_full(
    json: &str,
    base_url: &str,
    version: &str,
) -> Result<Vec<Champion>, CatalogError> {
    let file: ChampionFullFile = serde_json::from_str(json)?;
    let base_url = base_url.trim_end_matches('/');

    let mut champions = Vec::with_capacity(file.data.len());
    for (field, data) in file.data {
        trace!("parsing champion {field}");

        let id: i32 = data.key.parse().map_err(|_| CatalogError::InvalidKey {
            riot_id: data.id.clone(),
            key: data.key.clone(),
        })?;

        let default_skin_num = data
            .skins
            .iter()
            .find(|skin| skin.name == "default")
            .map(|skin| skin.num)
            .unwrap_or(0);

        champions.push(Champion {
            id: ChampionId(id),
            default_skin_image_path: format!(
                "{base_url}/cdn/{version}/img/champion/{}",
                data.image.full
            ),
            centered_default_skin_image_path: format!(
                "{base_url}/cdn/img/champion/centered/{}",
                centered_image_name(&data.id, default_skin_num)
            ),
            riot_id: data.id,
            name: data.name,
            positions: Vec::new(),
        });
    }

    champions.sort_by_key(|c| c.id);
    Ok(champions)
}

// ---------------------------------------------------------------------------
// Community play rates
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRate {
    pub play_rate: f32,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "UPPERCASE", default)]
pub struct ChampionRates {
    pub top: PositionRate,
    pub jungle: PositionRate,
    pub middle: PositionRate,
    pub bottom: PositionRate,
    pub utility: PositionRate,
}

/// Play rates keyed by numeric champion id.
#[derive(Debug, Default, Deserialize)]
pub struct RatesData {
    pub data: HashMap<i32, ChampionRates>,
}

/// Roles whose play rate is above `threshold`, in lane order.
pub fn roles_from_rates(rates: &ChampionRates, threshold: f32) -> Vec<ChampionRole> {
    [
        (ChampionRole::Top, rates.top),
        (ChampionRole::Jungle, rates.jungle),
        (ChampionRole::Mid, rates.middle),
        (ChampionRole::Bot, rates.bottom),
        (ChampionRole::Support, rates.utility),
    ]
    .into_iter()
    .filter(|(_, rate)| rate.play_rate > threshold)
    .map(|(role, _)| role)
    .collect()
}

/// Eligible positions of every champion listed in `rates`.
pub fn positions_from_rates(
    rates: &RatesData,
    threshold: f32,
) -> HashMap<ChampionId, Vec<ChampionRole>> {
    rates
        .data
        .iter()
        .map(|(id, rates)| (ChampionId(*id), roles_from_rates(rates, threshold)))
        .collect()
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where champion data comes from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Newest game data version available from this source.
    async fn latest_version(&self) -> anyhow::Result<String>;

    /// Every champion of `version`. Positions may be left empty; they are
    /// maintained separately through [`CatalogSource::fetch_positions`].
    async fn fetch_champions(&self, version: &str) -> anyhow::Result<Vec<Champion>>;

    /// Eligible positions, keyed by champion id.
    async fn fetch_positions(&self) -> anyhow::Result<HashMap<ChampionId, Vec<ChampionRole>>>;
}

/// Riot's Data Dragon CDN plus community play-rate statistics, over HTTP.
pub struct DataDragonSource {
    client: reqwest::Client,
    base_url: String,
    locale: String,
    play_rates_url: String,
    play_rate_threshold: f32,
}

impl DataDragonSource {
    pub fn new(config: &CatalogConfig) -> Self {
        DataDragonSource {
            client: reqwest::Client::new(),
            base_url: config.data_dragon_url.trim_end_matches('/').to_string(),
            locale: config.locale.clone(),
            play_rates_url: config.play_rates_url.clone(),
            play_rate_threshold: config.play_rate_threshold,
        }
    }

    async fn fetch_rates(&self) -> anyhow::Result<RatesData> {
        debug!("fetching champion play rates from {}", self.play_rates_url);
        let rates = self
            .client
            .get(&self.play_rates_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("failed to decode champion play rates")?;
        Ok(rates)
    }
}

#[async_trait]
impl CatalogSource for DataDragonSource {
    async fn latest_version(&self) -> anyhow::Result<String> {
        let url = format!("{}/api/versions.json", self.base_url);
        let versions: Vec<String> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("failed to decode Data Dragon versions")?;

        versions
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NoVersions.into())
    }

    async fn fetch_champions(&self, version: &str) -> anyhow::Result<Vec<Champion>> {
        let url = format!(
            "{}/cdn/{version}/data/{}/championFull.json",
            self.base_url, self.locale
        );
        info!("downloading champion data from {url}");
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(parse_champion_full(&body, &self.base_url, version)?)
    }

    async fn fetch_positions(&self) -> anyhow::Result<HashMap<ChampionId, Vec<ChampionRole>>> {
        let rates = self.fetch_rates().await?;
        Ok(positions_from_rates(&rates, self.play_rate_threshold))
    }
}

/// On-disk catalog snapshot, for running without network access.
#[derive(Debug, Deserialize)]
pub struct CatalogSnapshot {
    pub version: String,
    pub champions: Vec<Champion>,
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }

    fn read(&self) -> anyhow::Result<CatalogSnapshot> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read catalog snapshot {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&text).map_err(CatalogError::Malformed)?;
        Ok(snapshot)
    }
}

#[async_trait]
impl CatalogSource for FileSource {
    async fn latest_version(&self) -> anyhow::Result<String> {
        Ok(self.read()?.version)
    }

    async fn fetch_champions(&self, _version: &str) -> anyhow::Result<Vec<Champion>> {
        Ok(self.read()?.champions)
    }

    async fn fetch_positions(&self) -> anyhow::Result<HashMap<ChampionId, Vec<ChampionRole>>> {
        Ok(self
            .read()?
            .champions
            .into_iter()
            .map(|c| (c.id, c.positions))
            .collect())
    }
}

/// Build the source selected in the config.
pub fn source_from_config(config: &CatalogConfig) -> Arc<dyn CatalogSource> {
    match (config.source, &config.snapshot_path) {
        (CatalogSourceKind::File, Some(path)) => Arc::new(FileSource::new(path)),
        _ => Arc::new(DataDragonSource::new(config)),
    }
}

// ---------------------------------------------------------------------------
// Refresh job
// ---------------------------------------------------------------------------

/// Catalog as currently stored in the database.
pub fn load_stored(db: &Database) -> anyhow::Result<Catalog> {
    let champions = db.load_champions()?;
    let catalog = Catalog::new(champions);
    Ok(match db.get_data_version()? {
        Some(version) => catalog.with_version(version),
        None => catalog,
    })
}

/// Bring the stored champions up to the source's latest version.
///
/// Returns `None` when the database already holds that version. Stored
/// positions are left untouched; see [`refresh_positions`].
pub async fn refresh(source: &dyn CatalogSource, db: &Database) -> anyhow::Result<Option<Catalog>> {
    let latest = source.latest_version().await?;
    db.record_catalog_check()?;
    debug!("latest game data version: {latest}");

    if db.get_data_version()?.as_deref() == Some(latest.as_str()) {
        info!("catalog is already at version {latest}, update skipped");
        return Ok(None);
    }

    let champions = source.fetch_champions(&latest).await?;
    db.upsert_champions(&champions)?;
    db.set_data_version(&latest)?;
    info!("catalog updated to version {latest} ({} champions)", champions.len());

    load_stored(db).map(Some)
}

/// Replace stored positions with the source's current ones. Champions the
/// source has no data for keep what is stored. Returns the number updated.
pub async fn refresh_positions(source: &dyn CatalogSource, db: &Database) -> anyhow::Result<usize> {
    let positions = source.fetch_positions().await?;
    let updated = db.update_positions(&positions)?;
    info!("champion positions updated for {updated} champions");
    Ok(updated)
}

/// Load the stored catalog and hand it to the application loop. Returns
/// false once the receiver is gone.
async fn publish(db: &Database, tx: &mpsc::Sender<CatalogEvent>) -> bool {
    match load_stored(db) {
        Ok(catalog) => tx.send(CatalogEvent::Refreshed(catalog)).await.is_ok(),
        Err(e) => {
            error!("failed to load refreshed catalog: {e:#}");
            true
        }
    }
}

/// Keep the stored catalog current and forward every change to the
/// application loop. Champion data is checked every `catalog_interval` and
/// positions are refreshed every `positions_interval`; a failed positions
/// refresh is retried on the next catalog check. Returns when the receiver
/// is dropped.
pub async fn run_refresh_loop(
    source: Arc<dyn CatalogSource>,
    db: Arc<Database>,
    catalog_interval: Duration,
    positions_interval: Duration,
    tx: mpsc::Sender<CatalogEvent>,
) {
    let mut catalog_tick = tokio::time::interval(catalog_interval);
    let mut positions_tick = tokio::time::interval(positions_interval);
    let mut positions_stale = false;

    loop {
        let changed = tokio::select! {
            _ = catalog_tick.tick() => {
                let imported = match refresh(source.as_ref(), &db).await {
                    Ok(catalog) => catalog.is_some(),
                    Err(e) => {
                        error!("error while updating champion catalog: {e:#}");
                        false
                    }
                };
                // Newly imported champions need positions too.
                positions_stale |= imported;

                let mut positions_updated = false;
                if positions_stale {
                    match refresh_positions(source.as_ref(), &db).await {
                        Ok(_) => {
                            positions_stale = false;
                            positions_updated = true;
                        }
                        Err(e) => warn!("champion positions not refreshed, keeping stored ones: {e:#}"),
                    }
                }
                imported || positions_updated
            }
            _ = positions_tick.tick() => {
                match refresh_positions(source.as_ref(), &db).await {
                    Ok(_) => {
                        positions_stale = false;
                        true
                    }
                    Err(e) => {
                        warn!("champion positions not refreshed, keeping stored ones: {e:#}");
                        positions_stale = true;
                        false
                    }
                }
            }
            _ = tx.closed() => break,
        };

        if changed && !publish(&db, &tx).await {
            break;
        }
    }
    debug!("catalog refresh loop stopped");
}
