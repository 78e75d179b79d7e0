//! Sighting store backed by a PostgreSQL copy of the eBird Basic Dataset
//!
//! Expects the EBD split into `checklists` (one row per sampling event),
//! `observations` (one row per species per sampling event) and `species`
//! (taxonomy). Both the checklist and the observer queries are single
//! round trips regardless of how many hotspots or dates are asked for.
use chrono::NaiveDate;
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

use crate::{
    error::AppResult,
    models::{Checklist, HotspotId, ObserverRecord, Species},
    services::providers::{ObserverHistory, SightingStore, TaxonomySource},
};

const CHECKLIST_QUERY: &str = r#"
    SELECT
        c.sampling_event_id,
        c.locality_id,
        c.observation_date,
        o.species_code,
        s.common_name,
        s.scientific_name
    FROM checklists c
    JOIN observations o ON o.sampling_event_id = c.sampling_event_id
    JOIN species s ON s.species_code = o.species_code
    WHERE c.locality_id = ANY($1) AND c.observation_date = ANY($2)
    ORDER BY c.locality_id, c.observation_date, c.sampling_event_id, o.species_code
"#;

const OBSERVER_QUERY: &str = r#"
    SELECT
        c.observer_id,
        c.sampling_event_id,
        c.locality_id,
        c.observation_date,
        o.species_code,
        s.common_name,
        s.scientific_name
    FROM checklists c
    JOIN observations o ON o.sampling_event_id = c.sampling_event_id
    JOIN species s ON s.species_code = o.species_code
    WHERE c.observer_id = ANY($1) AND c.observation_date < $2
    ORDER BY c.observer_id, c.observation_date, c.sampling_event_id, o.species_code
"#;

const SPECIES_QUERY: &str = r#"
    SELECT species_code, common_name, scientific_name
    FROM species
    ORDER BY species_code
"#;

/// One species on one checklist
#[derive(Debug, Clone, sqlx::FromRow)]
struct ObservationRow {
    sampling_event_id: String,
    locality_id: String,
    observation_date: NaiveDate,
    species_code: String,
    common_name: String,
    scientific_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ObserverRow {
    observer_id: String,
    #[sqlx(flatten)]
    observation: ObservationRow,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SpeciesRow {
    species_code: String,
    common_name: String,
    scientific_name: String,
}

impl ObservationRow {
    fn species(&self) -> Species {
        Species::new(&self.species_code, &self.common_name, &self.scientific_name)
    }
}

#[derive(Clone)]
pub struct PostgresStore {
    db_pool: PgPool,
}

impl PostgresStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

/// Folds flat observation rows into one checklist per sampling event
fn group_rows(rows: Vec<ObservationRow>) -> Vec<Checklist> {
    let mut checklists: BTreeMap<String, Checklist> = BTreeMap::new();
    for row in rows {
        let species = row.species();
        checklists
            .entry(row.sampling_event_id.clone())
            .or_insert_with(|| Checklist {
                id: row.sampling_event_id,
                hotspot: HotspotId(row.locality_id),
                date: row.observation_date,
                species: Vec::new(),
            })
            .species
            .push(species);
    }
    checklists.into_values().collect()
}

#[async_trait::async_trait]
impl SightingStore for PostgresStore {
    #[instrument(skip_all, fields(hotspots = hotspots.len(), dates = dates.len()))]
    async fn fetch_checklists(
        &self,
        hotspots: &BTreeSet<HotspotId>,
        dates: &BTreeSet<NaiveDate>,
    ) -> AppResult<Vec<Checklist>> {
        let locality_ids: Vec<String> = hotspots.iter().map(|h| h.0.clone()).collect();
        let observation_dates: Vec<NaiveDate> = dates.iter().copied().collect();

        let rows = sqlx::query_as::<_, ObservationRow>(CHECKLIST_QUERY)
            .bind(locality_ids)
            .bind(observation_dates)
            .fetch_all(&self.db_pool)
            .await?;

        let checklists = group_rows(rows);

        tracing::debug!(checklists = checklists.len(), "Fetched checklists from database");

        Ok(checklists)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait::async_trait]
impl ObserverHistory for PostgresStore {
    #[instrument(skip_all, fields(observers = observer_ids.len()))]
    async fn fetch_observer_records(
        &self,
        observer_ids: &[String],
        until: NaiveDate,
    ) -> AppResult<Vec<ObserverRecord>> {
        let rows = sqlx::query_as::<_, ObserverRow>(OBSERVER_QUERY)
            .bind(observer_ids.to_vec())
            .bind(until)
            .fetch_all(&self.db_pool)
            .await?;

        tracing::debug!(records = rows.len(), "Fetched observer history from database");

        Ok(rows
            .into_iter()
            .map(|row| ObserverRecord {
                species: row.observation.species(),
                observer_id: row.observer_id,
                checklist_id: row.observation.sampling_event_id,
                hotspot: HotspotId(row.observation.locality_id),
                date: row.observation.observation_date,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl TaxonomySource for PostgresStore {
    async fn fetch_species(&self) -> AppResult<Vec<Species>> {
        let rows = sqlx::query_as::<_, SpeciesRow>(SPECIES_QUERY)
            .fetch_all(&self.db_pool)
            .await?;

        tracing::debug!(species = rows.len(), "Fetched taxonomy from database");

        Ok(rows
            .into_iter()
            .map(|row| Species::new(&row.species_code, &row.common_name, &row.scientific_name))
            .collect())
    }
}
