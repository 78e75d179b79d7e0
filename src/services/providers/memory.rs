use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::AppResult,
    models::{Checklist, HotspotId, ObserverRecord, Species, SpeciesCode},
    services::providers::{ObserverHistory, SightingStore, TaxonomySource},
};

/// Sighting store held entirely in memory
///
/// Backs tests and fixture-driven runs. Checklists come back sorted by hotspot,
/// date and id whatever order they were inserted in.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    checklists: Vec<Checklist>,
    records: Vec<ObserverRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checklists(checklists: Vec<Checklist>) -> Self {
        Self {
            checklists,
            records: Vec::new(),
        }
    }

    /// Builds a store from observer records; their checklists feed `SightingStore` too
    pub fn from_records(records: Vec<ObserverRecord>) -> Self {
        let mut grouped: BTreeMap<&str, Checklist> = BTreeMap::new();
        for record in &records {
            grouped
                .entry(record.checklist_id.as_str())
                .or_insert_with(|| Checklist {
                    id: record.checklist_id.clone(),
                    hotspot: record.hotspot.clone(),
                    date: record.date,
                    species: Vec::new(),
                })
                .species
                .push(record.species.clone());
        }
        let checklists = grouped.into_values().collect();

        Self {
            checklists,
            records,
        }
    }
}

#[async_trait::async_trait]
impl SightingStore for InMemoryStore {
    async fn fetch_checklists(
        &self,
        hotspots: &BTreeSet<HotspotId>,
        dates: &BTreeSet<NaiveDate>,
    ) -> AppResult<Vec<Checklist>> {
        let mut matching: Vec<Checklist> = self
            .checklists
            .iter()
            .filter(|c| hotspots.contains(&c.hotspot) && dates.contains(&c.date))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            (&a.hotspot, a.date, &a.id).cmp(&(&b.hotspot, b.date, &b.id))
        });

        Ok(matching)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait::async_trait]
impl ObserverHistory for InMemoryStore {
    async fn fetch_observer_records(
        &self,
        observer_ids: &[String],
        until: NaiveDate,
    ) -> AppResult<Vec<ObserverRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.date < until && observer_ids.contains(&r.observer_id))
            .cloned()
            .collect())
    }
}

/// The taxonomy is whatever species the stored checklists mention
#[async_trait::async_trait]
impl TaxonomySource for InMemoryStore {
    async fn fetch_species(&self) -> AppResult<Vec<Species>> {
        let mut species: BTreeMap<&SpeciesCode, &Species> = BTreeMap::new();
        let reported = self
            .checklists
            .iter()
            .flat_map(|c| c.species.iter())
            .chain(self.records.iter().map(|r| &r.species));
        for s in reported {
            species.entry(&s.code).or_insert(s);
        }
        Ok(species.into_values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(observer: &str, checklist: &str, hotspot: &str, day: NaiveDate, code: &str) -> ObserverRecord {
        ObserverRecord {
            observer_id: observer.to_string(),
            checklist_id: checklist.to_string(),
            hotspot: HotspotId::from(hotspot),
            date: day,
            species: Species::with_code(code.into()),
        }
    }

    #[tokio::test]
    async fn test_fetch_filters_by_hotspot_and_date() {
        let store = InMemoryStore::from_records(vec![
            record("obs1", "S2", "L1", date(2023, 6, 10), "amecro"),
            record("obs1", "S2", "L1", date(2023, 6, 10), "blujay"),
            record("obs1", "S1", "L1", date(2023, 6, 9), "amecro"),
            record("obs2", "S3", "L2", date(2023, 6, 10), "norcar"),
            record("obs2", "S4", "L1", date(2023, 7, 1), "mallar"),
        ]);

        let hotspots = BTreeSet::from([HotspotId::from("L1")]);
        let dates = BTreeSet::from([date(2023, 6, 9), date(2023, 6, 10)]);
        let checklists = store.fetch_checklists(&hotspots, &dates).await.unwrap();

        let ids: Vec<&str> = checklists.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
        assert_eq!(checklists[1].species.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_with_no_matching_data_is_empty() {
        let store = InMemoryStore::new();
        let hotspots = BTreeSet::from([HotspotId::from("L1")]);
        let dates = BTreeSet::from([date(2023, 6, 10)]);
        assert!(store.fetch_checklists(&hotspots, &dates).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observer_records_are_cut_at_until() {
        let store = InMemoryStore::from_records(vec![
            record("obs1", "S1", "L1", date(2023, 6, 9), "amecro"),
            record("obs1", "S2", "L1", date(2023, 6, 10), "blujay"),
            record("obs2", "S3", "L1", date(2023, 6, 1), "norcar"),
        ]);

        let records = store
            .fetch_observer_records(&["obs1".to_string()], date(2023, 6, 10))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].checklist_id, "S1");
    }

    #[tokio::test]
    async fn test_taxonomy_lists_each_reported_species_once() {
        let store = InMemoryStore::with_checklists(vec![
            Checklist {
                id: "S1".to_string(),
                hotspot: HotspotId::from("L1"),
                date: date(2023, 6, 10),
                species: vec![
                    Species::new("blujay", "Blue Jay", "Cyanocitta cristata"),
                    Species::new("amecro", "American Crow", "Corvus brachyrhynchos"),
                ],
            },
            Checklist {
                id: "S2".to_string(),
                hotspot: HotspotId::from("L2"),
                date: date(2023, 6, 11),
                species: vec![Species::new("amecro", "American Crow", "Corvus brachyrhynchos")],
            },
        ]);

        let species = store.fetch_species().await.unwrap();

        let codes: Vec<&str> = species.iter().map(|s| s.code.0.as_str()).collect();
        assert_eq!(codes, vec!["amecro", "blujay"]);
        assert_eq!(species[0].scientific_name, "Corvus brachyrhynchos");
    }
}
