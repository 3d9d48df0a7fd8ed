use noseprint_vision::{MediaSource, NoseClassifier, NoseScore, FAIL_CLOSED_SCORE};

/// Outcome for one candidate image.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationEntry<R> {
    pub image: R,
    pub score: NoseScore,
    pub passed: bool,
}

/// Scores for a batch of registration images, plus the picks used to source
/// the stored nose print.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<R> {
    pub entries: Vec<ValidationEntry<R>>,
    best_passing: Option<usize>,
    best_overall: Option<usize>,
}

impl<R> Evaluation<R> {
    /// Lowest-scoring entry among those that passed.
    pub fn best_passing(&self) -> Option<&ValidationEntry<R>> {
        self.best_passing.map(|i| &self.entries[i])
    }

    /// Lowest-scoring entry overall.
    pub fn best_overall(&self) -> Option<&ValidationEntry<R>> {
        self.best_overall.map(|i| &self.entries[i])
    }

    pub fn best_passing_index(&self) -> Option<usize> {
        self.best_passing
    }

    pub fn best_overall_index(&self) -> Option<usize> {
        self.best_overall
    }

    pub fn has_failure(&self) -> bool {
        self.entries.iter().any(|e| !e.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationEntry<R>> {
        self.entries.iter().filter(|e| !e.passed)
    }

    /// The single image the nose print is extracted from.
    pub fn embedding_source(&self) -> Option<&ValidationEntry<R>> {
        self.best_passing().or_else(|| self.best_overall())
    }
}

/// Score every image once and track the minimum among passing entries and
/// overall. Equal scores keep the earlier entry.
pub fn evaluate<R: Clone>(
    images: &[R],
    mut score_of: impl FnMut(&R) -> NoseScore,
    passes: impl Fn(NoseScore) -> bool,
) -> Evaluation<R> {
    let mut entries = Vec::with_capacity(images.len());
    let mut best_passing: Option<usize> = None;
    let mut best_overall: Option<usize> = None;

    for (idx, image) in images.iter().enumerate() {
        let score = score_of(image);
        let passed = passes(score);

        let lower = |best: Option<usize>, entries: &[ValidationEntry<R>]| match best {
            Some(b) => score < entries[b].score,
            None => true,
        };
        if passed && lower(best_passing, &entries) {
            best_passing = Some(idx);
        }
        if lower(best_overall, &entries) {
            best_overall = Some(idx);
        }

        entries.push(ValidationEntry {
            image: image.clone(),
            score,
            passed,
        });
    }

    Evaluation {
        entries,
        best_passing,
        best_overall,
    }
}

/// `score <= threshold`.
pub fn passes_at(threshold: NoseScore) -> impl Fn(NoseScore) -> bool {
    move |score| score <= threshold
}

/// Decode each reference and classify it. Images that cannot be decoded get
/// the fail-closed score and stay in the report.
pub fn evaluate_references(
    media: &dyn MediaSource,
    classifier: &NoseClassifier,
    references: &[String],
    threshold: NoseScore,
) -> Evaluation<String> {
    evaluate(
        references,
        |reference| match media.load(reference) {
            Ok(img) => classifier.classify(&img),
            Err(e) => {
                log::warn!("{}: {}", reference, e);
                FAIL_CLOSED_SCORE
            }
        },
        passes_at(threshold),
    )
}
