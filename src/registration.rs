use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use noseprint_vision::{EmbeddingExtractor, MediaSource, NoseClassifier, NoseScore};
use thiserror::Error;

use crate::evaluation::{evaluate_references, Evaluation};
use crate::profile::{DogDetails, DogProfile};
use crate::storage::ProfileStore;

pub const MIN_IMAGES: usize = 2;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("unable to pick a valid image for the nose print")]
    NoCandidate,
    #[error("nose print extraction failed for {0}")]
    EmbeddingFailed(String),
    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(anyhow::Error),
    #[error("saving profile: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug)]
pub enum RegistrationOutcome {
    /// Some images failed validation and no override was given. Nothing was
    /// written.
    NeedsReview(Evaluation<String>),
    Registered {
        id: i64,
        evaluation: Evaluation<String>,
    },
}

/// Where a registration's images ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedImages {
    pub folder: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Durable copy of the accepted images.
pub trait ImageArchive: Send + Sync {
    fn archive(&self, target_dir: &Path, folder_name: &str, images: &[String])
        -> anyhow::Result<ArchivedImages>;
}

/// Copies images into `{target}/{folder}/nose_{index}_{epochMillis}.jpg`.
/// A failed copy aborts; files already copied are left in place.
#[derive(Debug, Default, Clone)]
pub struct FsArchive;

impl ImageArchive for FsArchive {
    fn archive(
        &self,
        target_dir: &Path,
        folder_name: &str,
        images: &[String],
    ) -> anyhow::Result<ArchivedImages> {
        use anyhow::Context;

        anyhow::ensure!(
            target_dir.is_dir(),
            "{} is not an accessible directory",
            target_dir.display()
        );
        let folder = target_dir.join(folder_name);
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("creating {}", folder.display()))?;

        let mut files = Vec::with_capacity(images.len());
        for (index, src) in images.iter().enumerate() {
            let dest = folder.join(format!(
                "nose_{}_{}.jpg",
                index,
                Utc::now().timestamp_millis()
            ));
            std::fs::copy(src, &dest)
                .with_context(|| format!("copying {} to {}", src, dest.display()))?;
            files.push(dest);
        }
        Ok(ArchivedImages { folder, files })
    }
}

/// `{name}_{yyyyMMdd_HHmmss}`, with `dog` standing in for a blank name. The
/// name is used as given apart from path separators.
pub fn folder_name(dog_name: &str, now: chrono::DateTime<Local>) -> String {
    let base = if dog_name.trim().is_empty() {
        "dog"
    } else {
        dog_name
    };
    let safe: String = base
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect();
    format!("{}_{}", safe, now.format("%Y%m%d_%H%M%S"))
}

pub struct Registrar<'a> {
    pub media: &'a dyn MediaSource,
    pub classifier: &'a NoseClassifier,
    pub extractor: &'a EmbeddingExtractor,
    pub store: &'a dyn ProfileStore,
    pub archive: &'a dyn ImageArchive,
    pub pass_threshold: NoseScore,
}

impl<'a> Registrar<'a> {
    /// Pre-submit report. Touches nothing.
    pub fn validate(&self, images: &[String]) -> Evaluation<String> {
        evaluate_references(self.media, self.classifier, images, self.pass_threshold)
    }

    /// Evaluate, extract the nose print from the best image, archive the
    /// images, then insert the profile. Any failure before the insert leaves
    /// the store untouched.
    pub fn submit(
        &self,
        details: DogDetails,
        images: &[String],
        target_dir: &Path,
        override_validation: bool,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        if images.len() < MIN_IMAGES {
            return Err(RegistrationError::InvalidRequest(format!(
                "upload at least {} images",
                MIN_IMAGES
            )));
        }
        if details.name.trim().is_empty() {
            return Err(RegistrationError::InvalidRequest("name required".into()));
        }

        let evaluation = self.validate(images);
        if evaluation.has_failure() && !override_validation {
            log::info!(
                "{} of {} images failed validation, review required",
                evaluation.failures().count(),
                images.len()
            );
            return Ok(RegistrationOutcome::NeedsReview(evaluation));
        }

        let source = evaluation
            .embedding_source()
            .ok_or(RegistrationError::NoCandidate)?
            .image
            .clone();
        log::info!("extracting nose print from {}", source);

        let embedding = match self.media.load(&source) {
            Ok(img) => self.extractor.embed(&img),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
        .ok_or_else(|| RegistrationError::EmbeddingFailed(source.clone()))?;

        let folder = folder_name(&details.name, Local::now());
        let archived = self
            .archive
            .archive(target_dir, &folder, images)
            .map_err(RegistrationError::StorageUnavailable)?;

        let mut profile = DogProfile::new(details, embedding);
        profile.image_uri = archived
            .files
            .first()
            .map(|p| p.to_string_lossy().into_owned());
        profile.storage_uri = Some(archived.folder.to_string_lossy().into_owned());

        let id = self.store.insert(profile).map_err(RegistrationError::Store)?;
        log::info!("registered profile {} in {}", id, archived.folder.display());
        Ok(RegistrationOutcome::Registered { id, evaluation })
    }
}
