//! File formats read and written by the CLI
//!
//! Life lists come either as eBird's own life-list CSV download or as JSON rows
//! of `{species_code, first_observed}`. Observer id files are CSV with an
//! `observer_id` column. Evaluation cases are a pretty-printed JSON array.
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::{
    error::{AppError, AppResult},
    models::{EvaluationCase, LifeList, Species, SpeciesCode},
    services::providers::TaxonomySource,
};

/// Dates in eBird's life-list download look like `10 Jun 2023`
const EBIRD_DATE_FORMAT: &str = "%d %b %Y";

const OBSERVER_ID_COLUMN: &str = "observer_id";

/// Row of eBird's life-list download; the other columns are ignored
#[derive(Debug, Deserialize)]
struct EbirdLifeListRow {
    #[serde(rename = "Scientific Name")]
    scientific_name: String,
    #[serde(rename = "Date")]
    date: String,
}

#[derive(Debug, Deserialize)]
struct ObserverIdRow {
    observer_id: String,
}

/// Which rows of an observer id file to use, counted from the first data row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverSlice {
    pub start: usize,
    pub limit: Option<usize>,
}

fn malformed(what: &str, path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::InvalidInput(format!("{} {} is malformed: {}", what, path.display(), e))
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Loads a life list, picking the format from the file extension
///
/// `.json` files hold species codes directly. Anything else is read as eBird's
/// CSV download, whose scientific names are resolved through `taxonomy`.
pub async fn load_life_list(path: &Path, taxonomy: &dyn TaxonomySource) -> AppResult<LifeList> {
    let contents = tokio::fs::read(path).await?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let life_list: LifeList = if is_json {
        serde_json::from_slice(&contents).map_err(|e| malformed("life list", path, e))?
    } else {
        let codes = codes_by_scientific_name(taxonomy.fetch_species().await?);
        parse_ebird_life_list(contents.as_slice(), &codes).map_err(|e| match e {
            AppError::InvalidInput(message) => malformed("life list", path, message),
            other => other,
        })?
    };

    tracing::debug!(path = %path.display(), species = life_list.len(), "Loaded life list");

    Ok(life_list)
}

/// Scientific name to species code; species without a scientific name are left out
pub fn codes_by_scientific_name(
    species: impl IntoIterator<Item = Species>,
) -> HashMap<String, SpeciesCode> {
    species
        .into_iter()
        .filter(|s| !s.scientific_name.is_empty())
        .map(|s| (s.scientific_name, s.code))
        .collect()
}

/// Reads eBird's life-list CSV download
///
/// Every row must name a species the taxonomy knows; a silently dropped row
/// would turn a species already seen back into a lifer.
pub fn parse_ebird_life_list<R: Read>(
    reader: R,
    codes: &HashMap<String, SpeciesCode>,
) -> AppResult<LifeList> {
    let mut life_list = LifeList::new();

    for (index, row) in csv_reader(reader).deserialize::<EbirdLifeListRow>().enumerate() {
        let row = row.map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let line = index + 2;

        let code = codes.get(&row.scientific_name).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "line {}: no species code for scientific name `{}`",
                line, row.scientific_name
            ))
        })?;
        let first_observed =
            NaiveDate::parse_from_str(&row.date, EBIRD_DATE_FORMAT).map_err(|e| {
                AppError::InvalidInput(format!("line {}: bad date `{}`: {}", line, row.date, e))
            })?;

        life_list.add(code.clone(), Some(first_observed));
    }

    Ok(life_list)
}

pub async fn load_observer_ids(path: &Path, slice: ObserverSlice) -> AppResult<Vec<String>> {
    let contents = tokio::fs::read(path).await?;
    parse_observer_ids(contents.as_slice(), slice).map_err(|e| match e {
        AppError::InvalidInput(message) => malformed("observer id file", path, message),
        other => other,
    })
}

/// Reads the `observer_id` column of a CSV file, keeping the rows in `slice`
pub fn parse_observer_ids<R: Read>(reader: R, slice: ObserverSlice) -> AppResult<Vec<String>> {
    let mut reader = csv_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    if !headers.iter().any(|header| header == OBSERVER_ID_COLUMN) {
        return Err(AppError::InvalidInput(format!(
            "no `{}` column",
            OBSERVER_ID_COLUMN
        )));
    }

    reader
        .deserialize::<ObserverIdRow>()
        .skip(slice.start)
        .take(slice.limit.unwrap_or(usize::MAX))
        .map(|row| {
            row.map(|row| row.observer_id)
                .map_err(|e| AppError::InvalidInput(e.to_string()))
        })
        .collect()
}

pub async fn save_cases(path: &Path, cases: &[EvaluationCase]) -> AppResult<()> {
    let json = serde_json::to_string_pretty(cases)?;
    tokio::fs::write(path, json).await?;

    tracing::info!(path = %path.display(), cases = cases.len(), "Saved evaluation cases");

    Ok(())
}

pub async fn load_cases(path: &Path) -> AppResult<Vec<EvaluationCase>> {
    let contents = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&contents).map_err(|e| malformed("evaluation file", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Checklist, HotspotId};
    use crate::services::providers::InMemoryStore;

    const EBIRD_HEADER: &str = "Row #,Taxon Order,Category,Common Name,Scientific Name,Count,Location,S/P,Date,LocID,SubID,Exotic,Countable";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A store whose checklists name American Crow and Blue Jay
    fn taxonomy() -> InMemoryStore {
        InMemoryStore::with_checklists(vec![Checklist {
            id: "S1".to_string(),
            hotspot: HotspotId::from("L1"),
            date: date(2023, 6, 10),
            species: vec![
                Species::new("amecro", "American Crow", "Corvus brachyrhynchos"),
                Species::new("blujay", "Blue Jay", "Cyanocitta cristata"),
            ],
        }])
    }

    #[tokio::test]
    async fn test_load_ebird_life_list_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ebird_world_life_list.csv");
        let export = format!(
            "{}\n\
             1,20145,species,American Crow,Corvus brachyrhynchos,3,\"Central Park, New York\",US-NY,10 Jun 2023,L191106,S140230491,,1\n\
             2,20010,species,Blue Jay,Cyanocitta cristata,1,Prospect Park,US-NY,02 Jan 2019,L109516,S51234567,,1\n",
            EBIRD_HEADER
        );
        std::fs::write(&path, export).unwrap();

        let life_list = load_life_list(&path, &taxonomy()).await.unwrap();

        assert_eq!(life_list.len(), 2);
        assert_eq!(
            life_list.first_observed(&SpeciesCode::from("amecro")),
            Some(date(2023, 6, 10))
        );
        assert_eq!(
            life_list.first_observed(&SpeciesCode::from("blujay")),
            Some(date(2019, 1, 2))
        );
    }

    #[test]
    fn test_unknown_scientific_name_is_invalid_input() {
        let export = format!(
            "{}\n1,1,species,Dodo,Raphus cucullatus,1,Mauritius,MU,01 Jan 1600,L1,S1,,1\n",
            EBIRD_HEADER
        );
        let codes = codes_by_scientific_name(vec![Species::new(
            "amecro",
            "American Crow",
            "Corvus brachyrhynchos",
        )]);

        let err = parse_ebird_life_list(export.as_bytes(), &codes).unwrap_err();

        match err {
            AppError::InvalidInput(message) => assert!(message.contains("Raphus cucullatus")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_export_date_must_match_ebird_format() {
        let export = format!(
            "{}\n1,1,species,American Crow,Corvus brachyrhynchos,1,Home,US-NY,2023-06-10,L1,S1,,1\n",
            EBIRD_HEADER
        );
        let codes = codes_by_scientific_name(vec![Species::new(
            "amecro",
            "American Crow",
            "Corvus brachyrhynchos",
        )]);

        let err = parse_ebird_life_list(export.as_bytes(), &codes).unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_load_json_life_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("life.json");
        std::fs::write(
            &path,
            r#"[{"species_code": "amecro", "first_observed": "2020-04-01"}, {"species_code": "blujay"}]"#,
        )
        .unwrap();

        let life_list = load_life_list(&path, &InMemoryStore::new()).await.unwrap();

        assert_eq!(life_list.len(), 2);
        assert!(life_list.contains(&SpeciesCode::from("blujay")));
    }

    #[tokio::test]
    async fn test_malformed_life_list_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("life.json");
        std::fs::write(&path, "amecro,blujay").unwrap();

        let err = load_life_list(&path, &InMemoryStore::new()).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_observer_ids_selects_column() {
        let contents = "observer_id,observer_name\nobsr1,Alice\nobsr2,Bob\n";

        let ids = parse_observer_ids(contents.as_bytes(), ObserverSlice::default()).unwrap();

        assert_eq!(ids, vec!["obsr1".to_string(), "obsr2".to_string()]);
    }

    #[test]
    fn test_parse_observer_ids_slice() {
        let contents = "checklists,observer_id\n40,obsr1\n31,obsr2\n12,obsr3\n9,obsr4\n";
        let slice = ObserverSlice {
            start: 1,
            limit: Some(2),
        };

        let ids = parse_observer_ids(contents.as_bytes(), slice).unwrap();

        assert_eq!(ids, vec!["obsr2".to_string(), "obsr3".to_string()]);
    }

    #[test]
    fn test_observer_file_without_id_column_is_invalid_input() {
        let err = parse_observer_ids("obsr1\nobsr2\n".as_bytes(), ObserverSlice::default())
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_cases_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.json");
        let as_of_date = date(2023, 6, 10);
        let mut life_list_before = LifeList::new();
        life_list_before.add("amecro".into(), Some(date(2022, 1, 1)));
        let cases = vec![EvaluationCase {
            observer_id: "obsr1".to_string(),
            as_of_date,
            hotspot: HotspotId::from("L1"),
            life_list_before,
            newly_observed_species: vec![SpeciesCode::from("norcar")],
        }];

        save_cases(&path, &cases).await.unwrap();
        let loaded = load_cases(&path).await.unwrap();
        assert_eq!(loaded, cases);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["hotspot"], "L1");
        assert_eq!(raw[0]["as_of_date"], "2023-06-10");
        assert_eq!(raw[0]["life_list_before"][0]["species_code"], "amecro");
        assert_eq!(raw[0]["newly_observed_species"][0], "norcar");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cases(&dir.path().join("missing.json")).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
