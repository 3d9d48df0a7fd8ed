use anyhow::{Context, Result};
use noseprint_vision::{EmbeddingExtractor, FileMedia, MediaSource, NoseClassifier, ObjectDetector};

use crate::config::Config;
use crate::matcher::{MatchOutcome, Matcher};
use crate::registration::{FsArchive, ImageArchive, Registrar};
use crate::storage::{FileStore, ProfileStore};
use crate::validation::NoseValidator;

/// Owns every long-lived component. Opened once at startup and closed at
/// shutdown; everything else borrows from here.
pub struct NoseApp {
    pub config: Config,
    pub store: Box<dyn ProfileStore>,
    pub media: Box<dyn MediaSource>,
    pub archive: Box<dyn ImageArchive>,
    pub classifier: NoseClassifier,
    pub extractor: EmbeddingExtractor,
    pub detector: ObjectDetector,
}

impl NoseApp {
    /// Open the store and load all models. Missing models degrade the
    /// matching features instead of failing; an unreadable store fails.
    pub fn open(config: Config) -> Result<Self> {
        let store = FileStore::open(&config.store_dir).context("opening profile store")?;
        let threads = config.num_threads;
        let classifier = NoseClassifier::load(&config.classifier_model, threads);
        let extractor = EmbeddingExtractor::load(&config.embedding_model, threads);
        let detector = ObjectDetector::load(
            &config.detector_model,
            &config.detector_labels,
            config.detector_settings(),
            threads,
        );
        let media = FileMedia::new(config.max_image_dimension);

        Ok(Self {
            store: Box::new(store),
            media: Box::new(media),
            archive: Box::new(FsArchive),
            classifier,
            extractor,
            detector,
            config,
        })
    }

    /// Assemble from pre-built parts.
    pub fn from_parts(
        config: Config,
        store: Box<dyn ProfileStore>,
        media: Box<dyn MediaSource>,
        classifier: NoseClassifier,
        extractor: EmbeddingExtractor,
        detector: ObjectDetector,
    ) -> Self {
        Self {
            config,
            store,
            media,
            archive: Box::new(FsArchive),
            classifier,
            extractor,
            detector,
        }
    }

    /// Registration and identification both need the classifier and the
    /// embedding model.
    pub fn models_ready(&self) -> bool {
        self.classifier.is_ready() && self.extractor.is_ready()
    }

    pub fn registrar(&self) -> Registrar<'_> {
        Registrar {
            media: self.media.as_ref(),
            classifier: &self.classifier,
            extractor: &self.extractor,
            store: self.store.as_ref(),
            archive: self.archive.as_ref(),
            pass_threshold: self.config.thresholds.register_nose,
        }
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(
            &self.classifier,
            &self.extractor,
            self.store.as_ref(),
            &self.config.thresholds,
        )
    }

    pub fn validator(&self) -> NoseValidator<'_> {
        NoseValidator::new(
            self.media.as_ref(),
            &self.classifier,
            &self.detector,
            &self.config.thresholds,
        )
    }

    /// Identify the dog in the image at `reference`.
    pub fn identify(&self, reference: &str) -> Result<MatchOutcome> {
        match self.media.load(reference) {
            Ok(img) => self.matcher().identify(&img),
            Err(e) => Ok(MatchOutcome::Unreadable(e.to_string())),
        }
    }

    /// Release the models. The store needs no explicit shutdown.
    pub fn close(self) {
        self.classifier.close();
        self.extractor.close();
        self.detector.close();
        log::debug!("models released");
    }
}
