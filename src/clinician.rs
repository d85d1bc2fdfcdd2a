//! Clinician dashboard assembly: per-patient assessment timelines and sharp-drop
//! flags between a patient's two most recent assessments.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{Assessment, Dimension, DimensionScore, FlaggedChange};

/// A score change at or below this (after rounding to 2 decimals) is flagged.
pub const DROP_THRESHOLD: f64 = -1.0;

/// Known dimensions compare by id so "Relational Wellness" and "social" match.
fn dimension_key(label: &str) -> String {
  Dimension::from_label(label)
    .map(|d| d.id().to_string())
    .unwrap_or_else(|| label.trim().to_lowercase())
}

/// Dimensions in `current` that fell by at least one point since `previous`.
/// Dimensions absent from `previous` are not compared.
pub fn flag_drops(user_id: &str, previous: &[DimensionScore], current: &[DimensionScore]) -> Vec<FlaggedChange> {
  let before: HashMap<String, f64> = previous.iter().map(|s| (dimension_key(&s.label), s.score)).collect();
  current
    .iter()
    .filter_map(|s| {
      let prior = before.get(&dimension_key(&s.label))?;
      let delta = ((s.score - prior) * 100.0).round() / 100.0;
      (delta <= DROP_THRESHOLD).then(|| FlaggedChange {
        user_id: user_id.to_string(),
        dimension: s.label.clone(),
        delta,
      })
    })
    .collect()
}

/// Oldest-first assessments per linked patient. Patients without assessments get
/// an empty timeline; assessments of unlinked users are dropped.
pub fn group_timelines(patient_ids: &[String], assessments: Vec<Assessment>) -> BTreeMap<String, Vec<Assessment>> {
  let mut timelines: BTreeMap<String, Vec<Assessment>> =
    patient_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
  for a in assessments {
    if let Some(timeline) = timelines.get_mut(&a.user_id) {
      timeline.push(a);
    }
  }
  for timeline in timelines.values_mut() {
    timeline.sort_by_key(|a| a.created_at);
  }
  timelines
}

pub fn flag_timelines(timelines: &BTreeMap<String, Vec<Assessment>>) -> Vec<FlaggedChange> {
  timelines
    .iter()
    .filter_map(|(user_id, timeline)| match timeline.as_slice() {
      [.., prev, curr] => Some(flag_drops(user_id, &prev.scores, &curr.scores)),
      _ => None,
    })
    .flatten()
    .collect()
}
