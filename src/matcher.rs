use anyhow::{Context, Result};
use image::DynamicImage;
use noseprint_vision::{Embedding, EmbeddingExtractor, NoseClassifier, NoseScore};

use crate::{config::Thresholds, profile::DogProfile, storage::ProfileStore};

/// Result of one identification attempt. Every variant is a normal outcome
/// the operator can be shown.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The query image could not be read.
    Unreadable(String),
    /// The classifier says the query is not a nose.
    NotANose { score: NoseScore },
    /// No nose print could be computed for the query.
    EmbeddingFailed,
    /// No stored profile carries a nose print.
    NoData,
    Match { profile: DogProfile, distance: f32 },
    /// Closest profile, for context only; not an identification.
    NoMatch { closest: DogProfile, distance: f32 },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Match { .. })
    }

    /// Operator-facing status line(s).
    pub fn describe(&self) -> String {
        match self {
            MatchOutcome::Unreadable(reason) => format!("Could not read image: {}", reason),
            MatchOutcome::NotANose { score } => format!(
                "This does not look like a dog nose (model score: {}% 'not nose')",
                (score * 100.0) as i32
            ),
            MatchOutcome::EmbeddingFailed => "Could not generate nose ID.".to_string(),
            MatchOutcome::NoData => "Database has no valid embeddings.".to_string(),
            MatchOutcome::Match { profile, distance } => format!(
                "MATCH FOUND: {} (breed: {}, owner: {}), distance {:.3}",
                profile.details.name,
                profile.details.breed,
                profile.details.owner_name.as_deref().unwrap_or("-"),
                distance
            ),
            MatchOutcome::NoMatch { closest, distance } => format!(
                "NO MATCH FOUND. Closest was {} at distance {:.3}",
                closest.details.name, distance
            ),
        }
    }
}

/// Exhaustive scan for the closest stored nose print. Profiles without an
/// embedding, or whose distance is not finite, are skipped; on equal
/// distance the earlier profile is kept.
pub fn nearest<'a>(query: &Embedding, profiles: &'a [DogProfile]) -> Option<(&'a DogProfile, f32)> {
    let mut best: Option<(&DogProfile, f32)> = None;
    for profile in profiles.iter().filter(|p| p.has_embedding()) {
        let distance = query.distance(&profile.embedding);
        if !distance.is_finite() {
            log::warn!("profile {} has an unusable nose print, skipping", profile.id);
            continue;
        }
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((profile, distance));
        }
    }
    best
}

/// Nearest neighbour plus the strict `distance < threshold` acceptance rule.
pub fn match_against(query: &Embedding, profiles: &[DogProfile], threshold: f32) -> MatchOutcome {
    match nearest(query, profiles) {
        None => MatchOutcome::NoData,
        Some((profile, distance)) if distance < threshold => MatchOutcome::Match {
            profile: profile.clone(),
            distance,
        },
        Some((closest, distance)) => MatchOutcome::NoMatch {
            closest: closest.clone(),
            distance,
        },
    }
}

pub struct Matcher<'a> {
    pub classifier: &'a NoseClassifier,
    pub extractor: &'a EmbeddingExtractor,
    pub store: &'a dyn ProfileStore,
    pub nose_threshold: NoseScore,
    pub match_threshold: f32,
}

impl<'a> Matcher<'a> {
    pub fn new(
        classifier: &'a NoseClassifier,
        extractor: &'a EmbeddingExtractor,
        store: &'a dyn ProfileStore,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            classifier,
            extractor,
            store,
            nose_threshold: thresholds.identify_nose,
            match_threshold: thresholds.match_distance,
        }
    }

    /// Gate, embed, then scan the store. Only store errors are returned as `Err`.
    pub fn identify(&self, query: &DynamicImage) -> Result<MatchOutcome> {
        let score = self.classifier.classify(query);
        if score > self.nose_threshold {
            log::info!("query rejected as not a nose (score {:.3})", score);
            return Ok(MatchOutcome::NotANose { score });
        }

        let embedding = match self.extractor.embed(query) {
            Some(e) => e,
            None => return Ok(MatchOutcome::EmbeddingFailed),
        };

        let profiles = self.store.get_all().context("loading profiles")?;
        let outcome = match_against(&embedding, &profiles, self.match_threshold);
        match &outcome {
            MatchOutcome::Match { profile, distance } => {
                log::info!("matched profile {} at {:.3}", profile.id, distance)
            }
            MatchOutcome::NoMatch { closest, distance } => {
                log::info!("no match, closest profile {} at {:.3}", closest.id, distance)
            }
            _ => log::info!("no stored nose prints to compare against"),
        }
        Ok(outcome)
    }
}
