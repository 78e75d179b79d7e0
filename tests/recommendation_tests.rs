use chrono::NaiveDate;
use std::sync::Arc;

use sitta::models::{HotspotId, LifeList, ObserverRecord, Species, SpeciesCode};
use sitta::services::eval_data::{make_e2e_eval_data, EvalDataConfig};
use sitta::services::providers::InMemoryStore;
use sitta::services::{
    datasets, evaluate, EvaluationConfig, HistoricalSightingRecommender, HotspotRecommender,
    RecommenderConfig,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sighting(observer: &str, checklist: &str, hotspot: &str, day: NaiveDate, code: &str) -> ObserverRecord {
    ObserverRecord {
        observer_id: observer.to_string(),
        checklist_id: checklist.to_string(),
        hotspot: HotspotId::from(hotspot),
        date: day,
        species: Species::with_code(SpeciesCode::from(code)),
    }
}

/// Three years of June checklists at a marsh (L1) and a woodland (L2), then a 2024 visit
fn history() -> InMemoryStore {
    let mut records = Vec::new();
    for (year, observer) in [(2021, "local1"), (2022, "local2"), (2023, "local1")] {
        let marsh = format!("M{}", year);
        let woods = format!("W{}", year);
        for code in ["mallar", "rewbla", "sora"] {
            records.push(sighting(observer, &marsh, "L1", date(year, 6, 10), code));
        }
        for code in ["amecro", "ovenbi"] {
            records.push(sighting(observer, &woods, "L2", date(year, 6, 11), code));
        }
    }

    // The visitor knew the marsh birds before the evaluation date
    records.push(sighting("visitor", "V1", "L9", date(2020, 5, 1), "mallar"));
    records.push(sighting("visitor", "V1", "L9", date(2020, 5, 1), "rewbla"));
    // ...and found two lifers in the woodland on the day
    records.push(sighting("visitor", "V2", "L2", date(2024, 6, 10), "amecro"));
    records.push(sighting("visitor", "V2", "L2", date(2024, 6, 10), "ovenbi"));
    records.push(sighting("visitor", "V2", "L2", date(2024, 6, 10), "mallar"));

    InMemoryStore::from_records(records)
}

fn config() -> RecommenderConfig {
    RecommenderConfig {
        historical_years: 3,
        day_window: 2,
        ..RecommenderConfig::default()
    }
}

#[tokio::test]
async fn test_recommend_ranks_hotspots_by_expected_lifers() {
    let recommender = HistoricalSightingRecommender::day_window(Arc::new(history()), config());
    let life_list: LifeList = ["mallar", "rewbla"].into_iter().map(SpeciesCode::from).collect();

    let recommendations = recommender
        .recommend(
            &[HotspotId::from("L1"), HotspotId::from("L2")],
            date(2024, 6, 10),
            &life_list,
        )
        .await
        .unwrap();

    let hotspots: Vec<&str> = recommendations.iter().map(|r| r.hotspot.0.as_str()).collect();
    assert_eq!(hotspots, vec!["L2", "L1"]);
    assert_eq!(recommendations[0].score, 2.0);
    assert_eq!(recommendations[1].score, 1.0);
    assert_eq!(recommendations[1].species[0].species.code, SpeciesCode::from("sora"));
    for recommendation in &recommendations {
        assert!(recommendation.species_codes().all(|code| !life_list.contains(code)));
    }
}

#[tokio::test]
async fn test_eval_data_round_trip_and_evaluation() {
    let store = Arc::new(history());
    let as_of = date(2024, 6, 10);

    let cases = make_e2e_eval_data(
        store.as_ref(),
        &["visitor".to_string()],
        as_of,
        EvalDataConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].hotspot, HotspotId::from("L2"));
    assert_eq!(
        cases[0].newly_observed_species,
        vec![SpeciesCode::from("amecro"), SpeciesCode::from("ovenbi")]
    );
    assert!(cases[0].life_list_before.contains(&SpeciesCode::from("mallar")));

    let dir = tempfile::tempdir().unwrap();
    let eval_file = dir.path().join("eval.json");
    datasets::save_cases(&eval_file, &cases).await.unwrap();
    let cases = datasets::load_cases(&eval_file).await.unwrap();

    let recommender: Arc<dyn HotspotRecommender> =
        Arc::new(HistoricalSightingRecommender::day_window(store, config()));
    let eval_config = EvaluationConfig {
        top_k: 2,
        max_concurrency: 4,
    };
    let report = evaluate(recommender, &cases, eval_config).await.unwrap();

    assert_eq!(report.cases, 1);
    assert_eq!(report.hit_rate, 1.0);
    assert_eq!(report.mean_precision_at_k, 1.0);
    assert_eq!(report.mean_recall_at_k, 1.0);
    assert_eq!(report.mean_reciprocal_rank, 1.0);
    assert_eq!(report.mean_abs_score_error, 0.0);
}
