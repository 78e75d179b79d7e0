use std::collections::{BTreeMap, HashSet};

use crate::models::{Checklist, LifeList, Species, SpeciesCode, SpeciesScore};

/// How per-species likelihoods roll up into a hotspot score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Sum over every candidate species
    #[default]
    All,
    /// Sum over the K most likely candidate species
    TopK(usize),
}

/// Scores for one hotspot over one historical window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HotspotScore {
    /// Distinct checklists in the window
    pub checklist_count: usize,
    /// Candidate species, most likely first
    pub species: Vec<SpeciesScore>,
    /// Expected number of new species
    pub score: f64,
}

/// Scores the checklists of a single hotspot against a life list
///
/// A species' likelihood is the share of distinct checklists reporting it. Species
/// already on the life list are left out of the result but their checklists still
/// count towards the denominator. No checklists means a zero score.
pub fn score<'a, I>(checklists: I, life_list: &LifeList, aggregation: Aggregation) -> HotspotScore
where
    I: IntoIterator<Item = &'a Checklist>,
{
    let mut seen_checklists: HashSet<&str> = HashSet::new();
    let mut counts: BTreeMap<&SpeciesCode, (&Species, usize)> = BTreeMap::new();

    for checklist in checklists {
        if !seen_checklists.insert(checklist.id.as_str()) {
            continue;
        }
        let mut on_checklist: HashSet<&SpeciesCode> = HashSet::new();
        for species in &checklist.species {
            if on_checklist.insert(&species.code) {
                counts.entry(&species.code).or_insert((species, 0)).1 += 1;
            }
        }
    }

    let checklist_count = seen_checklists.len();
    if checklist_count == 0 {
        return HotspotScore::default();
    }

    let mut species: Vec<SpeciesScore> = counts
        .into_iter()
        .filter(|(code, _)| !life_list.contains(code))
        .map(|(_, (species, count))| SpeciesScore {
            species: species.clone(),
            likelihood: count as f64 / checklist_count as f64,
        })
        .collect();

    species.sort_by(|a, b| {
        b.likelihood
            .total_cmp(&a.likelihood)
            .then_with(|| a.species.code.cmp(&b.species.code))
    });

    let counted = match aggregation {
        Aggregation::All => species.len(),
        Aggregation::TopK(k) => k.min(species.len()),
    };
    let score = species[..counted]
        .iter()
        .fold(0.0, |total, s| total + s.likelihood);

    HotspotScore {
        checklist_count,
        species,
        score,
    }
}
