use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{EvaluationCase, HotspotId, LifeList, ObserverRecord, SpeciesCode},
    services::providers::ObserverHistory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalDataConfig {
    /// Days from the as-of date in which new species count as found
    pub horizon_days: i64,
    /// Cases kept per observer, hotspots with the most new species first
    pub cases_per_observer: usize,
}

impl Default for EvalDataConfig {
    fn default() -> Self {
        Self {
            horizon_days: 1,
            cases_per_observer: 1,
        }
    }
}

/// Builds evaluation cases from what `observer_ids` actually saw around `as_of_date`
///
/// Each case pairs the observer's life list strictly before `as_of_date` with the
/// new species they went on to record at one hotspot within the horizon.
#[instrument(skip_all, fields(observers = observer_ids.len(), as_of_date = %as_of_date))]
pub async fn make_e2e_eval_data(
    history: &dyn ObserverHistory,
    observer_ids: &[String],
    as_of_date: NaiveDate,
    config: EvalDataConfig,
) -> AppResult<Vec<EvaluationCase>> {
    if config.horizon_days <= 0 {
        return Err(AppError::invalid_config(
            "horizon_days",
            format!("must be positive, got {}", config.horizon_days),
        ));
    }
    if config.cases_per_observer == 0 {
        return Err(AppError::invalid_config("cases_per_observer", "must be positive"));
    }
    if observer_ids.is_empty() {
        return Err(AppError::InvalidInput("no observer ids given".to_string()));
    }

    let until = as_of_date
        .checked_add_signed(Duration::days(config.horizon_days))
        .ok_or_else(|| AppError::invalid_config("horizon_days", "reaches past the calendar"))?;

    let records = history.fetch_observer_records(observer_ids, until).await?;
    let cases = build_cases(&records, as_of_date, until, config.cases_per_observer);

    tracing::info!(
        records = records.len(),
        cases = cases.len(),
        "Built evaluation cases"
    );

    Ok(cases)
}

/// Derives cases from observer records, observers in id order
///
/// Records on or after `until` are ignored.
pub fn build_cases(
    records: &[ObserverRecord],
    as_of_date: NaiveDate,
    until: NaiveDate,
    cases_per_observer: usize,
) -> Vec<EvaluationCase> {
    let mut by_observer: BTreeMap<&str, Vec<&ObserverRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.date < until) {
        by_observer
            .entry(record.observer_id.as_str())
            .or_default()
            .push(record);
    }

    let mut cases = Vec::new();
    for (observer_id, observer_records) in by_observer {
        let mut life_list_before = LifeList::new();
        for record in observer_records.iter().filter(|r| r.date < as_of_date) {
            life_list_before.add(record.species.code.clone(), Some(record.date));
        }

        let mut found: BTreeMap<&HotspotId, BTreeSet<&SpeciesCode>> = BTreeMap::new();
        for record in observer_records.iter().filter(|r| r.date >= as_of_date) {
            if !life_list_before.contains(&record.species.code) {
                found
                    .entry(&record.hotspot)
                    .or_default()
                    .insert(&record.species.code);
            }
        }

        let mut hotspots: Vec<(&HotspotId, BTreeSet<&SpeciesCode>)> = found.into_iter().collect();
        hotspots.sort_by(|(a_id, a_new), (b_id, b_new)| {
            b_new.len().cmp(&a_new.len()).then_with(|| a_id.cmp(b_id))
        });

        for (hotspot, new_species) in hotspots.into_iter().take(cases_per_observer) {
            cases.push(EvaluationCase {
                observer_id: observer_id.to_string(),
                as_of_date,
                hotspot: hotspot.clone(),
                life_list_before: life_list_before.clone(),
                newly_observed_species: new_species.into_iter().cloned().collect(),
            });
        }
    }

    cases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Species;
    use crate::services::providers::InMemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(observer: &str, hotspot: &str, day: NaiveDate, code: &str) -> ObserverRecord {
        ObserverRecord {
            observer_id: observer.to_string(),
            checklist_id: format!("S-{}-{}-{}", observer, hotspot, day),
            hotspot: HotspotId::from(hotspot),
            date: day,
            species: Species::with_code(code.into()),
        }
    }

    fn history() -> InMemoryStore {
        InMemoryStore::from_records(vec![
            record("obs1", "L1", date(2023, 5, 1), "amecro"),
            record("obs1", "L1", date(2023, 6, 9), "blujay"),
            record("obs1", "L1", date(2023, 6, 10), "amecro"),
            record("obs1", "L1", date(2023, 6, 10), "norcar"),
            record("obs1", "L2", date(2023, 6, 10), "norcar"),
            record("obs1", "L2", date(2023, 6, 10), "yerwar"),
            record("obs1", "L2", date(2023, 6, 10), "mallar"),
            record("obs1", "L3", date(2023, 6, 11), "baleag"),
            record("obs2", "L1", date(2023, 6, 10), "blujay"),
            record("obs3", "L1", date(2023, 6, 1), "blujay"),
        ])
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_case_for_hotspot_with_most_new_species() {
        let cases = make_e2e_eval_data(
            &history(),
            &ids(&["obs1"]),
            date(2023, 6, 10),
            EvalDataConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.hotspot, HotspotId::from("L2"));
        assert_eq!(
            case.newly_observed_species,
            vec![
                SpeciesCode::from("mallar"),
                SpeciesCode::from("norcar"),
                SpeciesCode::from("yerwar")
            ]
        );
        assert_eq!(case.life_list_before.len(), 2);
        assert_eq!(
            case.life_list_before.first_observed(&"amecro".into()),
            Some(date(2023, 5, 1))
        );
    }

    #[tokio::test]
    async fn test_no_leakage_across_as_of_date() {
        let as_of = date(2023, 6, 10);
        let config = EvalDataConfig {
            horizon_days: 3,
            cases_per_observer: 10,
        };
        let records = history()
            .fetch_observer_records(&ids(&["obs1", "obs2", "obs3"]), date(2024, 1, 1))
            .await
            .unwrap();

        let cases = make_e2e_eval_data(&history(), &ids(&["obs1", "obs2", "obs3"]), as_of, config)
            .await
            .unwrap();

        assert!(!cases.is_empty());
        for case in &cases {
            for (_, first_observed) in case.life_list_before.iter() {
                assert!(first_observed.unwrap() < as_of);
            }
            for code in &case.newly_observed_species {
                assert!(!records.iter().any(|r| r.observer_id == case.observer_id
                    && &r.species.code == code
                    && r.date < as_of));
            }
        }
    }

    #[tokio::test]
    async fn test_horizon_bounds_new_species() {
        let config = EvalDataConfig {
            horizon_days: 2,
            cases_per_observer: 5,
        };
        let cases = make_e2e_eval_data(&history(), &ids(&["obs1"]), date(2023, 6, 10), config)
            .await
            .unwrap();

        let hotspots: Vec<&str> = cases.iter().map(|c| c.hotspot.0.as_str()).collect();
        assert_eq!(hotspots, vec!["L2", "L1", "L3"]);
        assert_eq!(cases[1].newly_observed_species, vec![SpeciesCode::from("norcar")]);
    }

    #[tokio::test]
    async fn test_observer_without_new_species_has_no_case() {
        let cases = make_e2e_eval_data(
            &history(),
            &ids(&["obs2", "obs3"]),
            date(2023, 6, 10),
            EvalDataConfig::default(),
        )
        .await
        .unwrap();

        let observers: Vec<&str> = cases.iter().map(|c| c.observer_id.as_str()).collect();
        assert_eq!(observers, vec!["obs2"]);
        assert!(cases[0].life_list_before.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_horizon_is_rejected() {
        let config = EvalDataConfig {
            horizon_days: 0,
            ..EvalDataConfig::default()
        };
        let err = make_e2e_eval_data(&history(), &ids(&["obs1"]), date(2023, 6, 10), config)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::InvalidConfiguration { ref parameter, .. } if parameter == "horizon_days"
        ));
    }

    #[test]
    fn test_build_cases_ignores_records_past_until() {
        let records = vec![record("obs1", "L1", date(2023, 6, 12), "amecro")];
        let cases = build_cases(&records, date(2023, 6, 10), date(2023, 6, 11), 1);
        assert!(cases.is_empty());
    }
}
