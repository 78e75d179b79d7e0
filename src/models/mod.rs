use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display};

pub mod evaluation;

pub use evaluation::{CaseMetrics, EvaluationCase, EvaluationReport};

/// eBird taxonomic code for a species (e.g. "amecro")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesCode(pub String);

impl Display for SpeciesCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SpeciesCode {
    fn from(code: &str) -> Self {
        SpeciesCode(code.to_string())
    }
}

/// eBird location identifier of a hotspot (e.g. "L109516")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HotspotId(pub String);

impl Display for HotspotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HotspotId {
    fn from(id: &str) -> Self {
        HotspotId(id.to_string())
    }
}

/// Taxonomic reference data for one species
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Species {
    pub code: SpeciesCode,
    pub common_name: String,
    pub scientific_name: String,
}

impl Species {
    pub fn new(code: &str, common_name: &str, scientific_name: &str) -> Self {
        Self {
            code: SpeciesCode::from(code),
            common_name: common_name.to_string(),
            scientific_name: scientific_name.to_string(),
        }
    }

    /// Species known only by its code, used when no taxonomy is at hand
    pub fn with_code(code: SpeciesCode) -> Self {
        Self {
            common_name: code.0.clone(),
            scientific_name: String::new(),
            code,
        }
    }
}

/// One submitted checklist: everything reported at a hotspot during one outing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: String,
    pub hotspot: HotspotId,
    pub date: NaiveDate,
    pub species: Vec<Species>,
}

/// One row of a life list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeListEntry {
    pub species_code: SpeciesCode,
    #[serde(default)]
    pub first_observed: Option<NaiveDate>,
}

/// Species a birder has already observed, keyed by species code
///
/// Serialized as a sequence of `{species_code, first_observed}` rows. Entries are
/// only ever added; a species keeps the earliest date it was reported with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LifeListEntry>", into = "Vec<LifeListEntry>")]
pub struct LifeList {
    entries: BTreeMap<SpeciesCode, Option<NaiveDate>>,
}

impl LifeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a species; returns true if it was not already on the list
    pub fn add(&mut self, code: SpeciesCode, first_observed: Option<NaiveDate>) -> bool {
        match self.entries.get_mut(&code) {
            Some(existing) => {
                if let Some(date) = first_observed {
                    if (*existing).map_or(true, |current| date < current) {
                        *existing = Some(date);
                    }
                }
                false
            }
            None => {
                self.entries.insert(code, first_observed);
                true
            }
        }
    }

    pub fn contains(&self, code: &SpeciesCode) -> bool {
        self.entries.contains_key(code)
    }

    pub fn first_observed(&self, code: &SpeciesCode) -> Option<NaiveDate> {
        self.entries.get(code).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SpeciesCode, Option<NaiveDate>)> {
        self.entries.iter().map(|(code, date)| (code, *date))
    }

    /// The life list as it stood strictly before `date`
    ///
    /// Undated entries cannot be placed in time and are kept.
    pub fn before(&self, date: NaiveDate) -> LifeList {
        let entries = self
            .entries
            .iter()
            .filter(|(_, first)| first.map_or(true, |d| d < date))
            .map(|(code, first)| (code.clone(), *first))
            .collect();
        LifeList { entries }
    }
}

impl From<Vec<LifeListEntry>> for LifeList {
    fn from(rows: Vec<LifeListEntry>) -> Self {
        rows.into_iter().collect()
    }
}

impl From<LifeList> for Vec<LifeListEntry> {
    fn from(list: LifeList) -> Self {
        list.entries
            .into_iter()
            .map(|(species_code, first_observed)| LifeListEntry {
                species_code,
                first_observed,
            })
            .collect()
    }
}

impl FromIterator<LifeListEntry> for LifeList {
    fn from_iter<I: IntoIterator<Item = LifeListEntry>>(iter: I) -> Self {
        let mut list = LifeList::new();
        for row in iter {
            list.add(row.species_code, row.first_observed);
        }
        list
    }
}

impl FromIterator<SpeciesCode> for LifeList {
    fn from_iter<I: IntoIterator<Item = SpeciesCode>>(iter: I) -> Self {
        let mut list = LifeList::new();
        for code in iter {
            list.add(code, None);
        }
        list
    }
}

/// Likelihood of seeing a species at a hotspot, from the share of window checklists reporting it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesScore {
    pub species: Species,
    pub likelihood: f64,
}

/// A hotspot worth visiting and the lifers it is likely to produce
///
/// `score` reads as the expected number of new species at the hotspot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub hotspot: HotspotId,
    pub score: f64,
    pub checklist_count: usize,
    pub species: Vec<SpeciesScore>,
}

impl Recommendation {
    pub fn species_codes(&self) -> impl Iterator<Item = &SpeciesCode> {
        self.species.iter().map(|s| &s.species.code)
    }
}

/// One historical observation of a species by an observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverRecord {
    pub observer_id: String,
    pub checklist_id: String,
    pub hotspot: HotspotId,
    pub date: NaiveDate,
    pub species: Species,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_life_list_has_no_duplicates() {
        let mut list = LifeList::new();
        assert!(list.add("amecro".into(), None));
        assert!(!list.add("amecro".into(), Some(date(2020, 5, 1))));
        assert_eq!(list.len(), 1);
        assert_eq!(list.first_observed(&"amecro".into()), Some(date(2020, 5, 1)));
    }

    #[test]
    fn test_life_list_keeps_earliest_date() {
        let mut list = LifeList::new();
        list.add("blujay".into(), Some(date(2021, 3, 1)));
        list.add("blujay".into(), Some(date(2019, 7, 4)));
        list.add("blujay".into(), Some(date(2022, 1, 1)));
        list.add("blujay".into(), None);
        assert_eq!(list.first_observed(&"blujay".into()), Some(date(2019, 7, 4)));
    }

    #[test]
    fn test_life_list_before_is_strict() {
        let mut list = LifeList::new();
        list.add("amecro".into(), Some(date(2023, 6, 9)));
        list.add("blujay".into(), Some(date(2023, 6, 10)));
        list.add("norcar".into(), None);

        let before = list.before(date(2023, 6, 10));
        assert!(before.contains(&"amecro".into()));
        assert!(!before.contains(&"blujay".into()));
        assert!(before.contains(&"norcar".into()));
    }

    #[test]
    fn test_life_list_serializes_as_rows() {
        let mut list = LifeList::new();
        list.add("amecro".into(), Some(date(2023, 6, 9)));
        list.add("blujay".into(), None);

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"species_code": "amecro", "first_observed": "2023-06-09"},
                {"species_code": "blujay", "first_observed": null}
            ])
        );
    }

    #[test]
    fn test_life_list_rows_collapse_duplicates() {
        let json = r#"[
            {"species_code": "amecro", "first_observed": "2023-06-09"},
            {"species_code": "amecro", "first_observed": "2021-01-02"},
            {"species_code": "blujay"}
        ]"#;
        let list: LifeList = serde_json::from_str(json).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.first_observed(&"amecro".into()), Some(date(2021, 1, 2)));
        assert_eq!(list.first_observed(&"blujay".into()), None);
    }

    #[test]
    fn test_ids_display_plain() {
        assert_eq!(format!("{}", HotspotId::from("L109516")), "L109516");
        assert_eq!(format!("{}", SpeciesCode::from("amecro")), "amecro");
    }
}
