/// eBird API 2.0 sighting store
///
/// Historic checklists never change once the day is over, so responses are
/// cached in Redis for a long time.
///
/// API Flow:
/// 1. Checklist feed: /product/lists/{locId}/{y}/{m}/{d} → checklist ids for the day
/// 2. Checklist view: /product/checklist/view/{subId} → species reported
/// 3. Taxonomy: /ref/taxonomy/ebird → common/scientific names, loaded once
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{Checklist, HotspotId, Species, SpeciesCode},
    services::providers::{SightingStore, TaxonomySource},
};
use chrono::{Datelike, NaiveDate};
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::instrument;

const FEED_CACHE_TTL: u64 = 2_592_000; // 30 days
const CHECKLIST_CACHE_TTL: u64 = 2_592_000; // 30 days
const TAXONOMY_CACHE_TTL: u64 = 604_800; // 1 week

/// eBird caps the checklist feed at 200 entries
const MAX_FEED_RESULTS: &str = "200";

const TOKEN_HEADER: &str = "X-eBirdApiToken";

/// Entry of the per-day checklist feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChecklistSummary {
    pub sub_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChecklistView {
    pub sub_id: String,
    #[serde(default)]
    pub obs: Vec<ApiObservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiObservation {
    pub species_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTaxon {
    pub species_code: String,
    pub com_name: String,
    pub sci_name: String,
}

type Taxonomy = HashMap<SpeciesCode, Species>;

#[derive(Clone)]
pub struct EbirdApiStore {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
    max_concurrency: usize,
    taxonomy: Arc<OnceCell<Arc<Taxonomy>>>,
}

impl EbirdApiStore {
    pub fn new(cache: Cache, api_key: String, api_url: String, max_concurrency: usize) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
            max_concurrency: max_concurrency.max(1),
            taxonomy: Arc::new(OnceCell::new()),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let response = self
            .http_client
            .get(url)
            .header(TOKEN_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DataUnavailable(format!(
                "eBird API returned status {} for {}: {}",
                status, url, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn checklist_feed(
        &self,
        hotspot: &HotspotId,
        date: NaiveDate,
    ) -> AppResult<Vec<ApiChecklistSummary>> {
        let key = CacheKey::ChecklistFeed {
            hotspot: hotspot.clone(),
            date,
        };
        cached!(self.cache, key, FEED_CACHE_TTL, async {
            let url = format!(
                "{}/product/lists/{}/{}/{}/{}",
                self.api_url,
                hotspot,
                date.year(),
                date.month(),
                date.day()
            );
            self.get_json::<Vec<ApiChecklistSummary>>(&url, &[("maxResults", MAX_FEED_RESULTS)])
                .await
        })
    }

    async fn checklist_view(&self, sub_id: &str) -> AppResult<ApiChecklistView> {
        cached!(
            self.cache,
            CacheKey::Checklist(sub_id.to_string()),
            CHECKLIST_CACHE_TTL,
            async {
                let url = format!("{}/product/checklist/view/{}", self.api_url, sub_id);
                self.get_json::<ApiChecklistView>(&url, &[]).await
            }
        )
    }

    async fn fetch_taxonomy(&self) -> AppResult<Vec<ApiTaxon>> {
        cached!(self.cache, CacheKey::Taxonomy, TAXONOMY_CACHE_TTL, async {
            let url = format!("{}/ref/taxonomy/ebird", self.api_url);
            self.get_json::<Vec<ApiTaxon>>(&url, &[("fmt", "json")]).await
        })
    }

    /// Species names by code, fetched on first use
    async fn taxonomy(&self) -> AppResult<Arc<Taxonomy>> {
        self.taxonomy
            .get_or_try_init(|| async {
                let taxa = self.fetch_taxonomy().await?;
                tracing::info!(taxa = taxa.len(), "Loaded eBird taxonomy");
                Ok::<_, AppError>(Arc::new(index_taxonomy(taxa)))
            })
            .await
            .cloned()
    }

    /// Every checklist submitted at `hotspot` on `date`
    async fn fetch_day(&self, hotspot: HotspotId, date: NaiveDate) -> AppResult<Vec<Checklist>> {
        let summaries = self.checklist_feed(&hotspot, date).await?;
        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let taxonomy = self.taxonomy().await?;
        let mut checklists = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let view = self.checklist_view(&summary.sub_id).await?;
            checklists.push(to_checklist(&hotspot, date, view, &taxonomy));
        }

        tracing::debug!(
            hotspot = %hotspot,
            date = %date,
            checklists = checklists.len(),
            "Fetched checklists for day"
        );

        Ok(checklists)
    }
}

fn index_taxonomy(taxa: Vec<ApiTaxon>) -> Taxonomy {
    taxa.into_iter()
        .map(|taxon| {
            let species = Species::new(&taxon.species_code, &taxon.com_name, &taxon.sci_name);
            (species.code.clone(), species)
        })
        .collect()
}

/// Converts a checklist view; codes missing from the taxonomy keep the bare code
fn to_checklist(
    hotspot: &HotspotId,
    date: NaiveDate,
    view: ApiChecklistView,
    taxonomy: &Taxonomy,
) -> Checklist {
    let species = view
        .obs
        .into_iter()
        .map(|obs| {
            let code = SpeciesCode(obs.species_code);
            taxonomy
                .get(&code)
                .cloned()
                .unwrap_or_else(|| Species::with_code(code))
        })
        .collect();

    Checklist {
        id: view.sub_id,
        hotspot: hotspot.clone(),
        date,
        species,
    }
}

#[async_trait::async_trait]
impl SightingStore for EbirdApiStore {
    #[instrument(skip_all, fields(hotspots = hotspots.len(), dates = dates.len()))]
    async fn fetch_checklists(
        &self,
        hotspots: &BTreeSet<HotspotId>,
        dates: &BTreeSet<NaiveDate>,
    ) -> AppResult<Vec<Checklist>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        // One task per hotspot/day, bounded by the semaphore
        for hotspot in hotspots {
            for date in dates {
                let store = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let hotspot = hotspot.clone();
                let date = *date;
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| AppError::Internal(e.to_string()))?;
                    store.fetch_day(hotspot, date).await
                });
            }
        }

        // Any failed lookup fails the batch; dropping the set aborts the rest
        let mut checklists = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(day)) => checklists.extend(day),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "eBird lookup failed");
                    return Err(e);
                }
                Err(e) => return Err(AppError::Internal(e.to_string())),
            }
        }

        checklists.sort_by(|a, b| (&a.hotspot, a.date, &a.id).cmp(&(&b.hotspot, b.date, &b.id)));

        tracing::info!(checklists = checklists.len(), "Fetched checklists from eBird");

        Ok(checklists)
    }

    fn name(&self) -> &'static str {
        "ebird_api"
    }
}

#[async_trait::async_trait]
impl TaxonomySource for EbirdApiStore {
    async fn fetch_species(&self) -> AppResult<Vec<Species>> {
        Ok(self.taxonomy().await?.values().cloned().collect())
    }
}
