mod common;

use anyhow::Result;
use common::*;
use noseprint::{
    storage::ProfileStore, DogDetails, DogProfile, Embedding, MatchOutcome, NoseApp,
};

fn register(app: &NoseApp, name: &str, vector: Vec<f32>) -> Result<i64> {
    let details = DogDetails {
        name: name.into(),
        ..Default::default()
    };
    app.store
        .insert(DogProfile::new(details, Embedding::from_vec(vector)))
}

fn nose_photo(dir: &std::path::Path) -> String {
    grey_image(dir, "query.png", 40)
}

#[test]
fn test_query_matches_identical_print() -> Result<()> {
    env_logger::try_init().ok();
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.1])), Box::new(Fixed(unit(0, 1.0))))?;
    let first = register(&app, "one", unit(0, 1.0))?;
    register(&app, "two", unit(0, -1.0))?;

    match app.identify(&nose_photo(work.path()))? {
        MatchOutcome::Match { profile, distance } => {
            assert_eq!(profile.id, first);
            assert_eq!(distance, 0.0);
        }
        other => panic!("expected match, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_distance_threshold_is_strict() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.1])), Box::new(Fixed(unit(0, 1.0))))?;
    // Query is unit e0, so a stored [x, 0, ...] sits at distance 1 - x
    register(&app, "at-0.80", unit(0, 0.2))?;
    let boundary = register(&app, "at-0.75", unit(0, 0.25))?;

    match app.identify(&nose_photo(work.path()))? {
        MatchOutcome::NoMatch { closest, distance } => {
            assert_eq!(closest.id, boundary);
            assert_eq!(distance, 0.75);
        }
        other => panic!("expected no match, got {:?}", other),
    }

    let near = register(&app, "at-0.74", unit(0, 0.26))?;
    match app.identify(&nose_photo(work.path()))? {
        MatchOutcome::Match { profile, distance } => {
            assert_eq!(profile.id, near);
            assert!((distance - 0.74).abs() < 1e-6);
        }
        other => panic!("expected match, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_empty_store_is_no_data() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.1])), Box::new(Fixed(unit(0, 1.0))))?;
    assert_eq!(app.identify(&nose_photo(work.path()))?, MatchOutcome::NoData);

    assert!(register(&app, "no-print", vec![]).is_err());
    assert_eq!(app.identify(&nose_photo(work.path()))?, MatchOutcome::NoData);
    Ok(())
}

#[test]
fn test_non_nose_is_rejected_before_embedding() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.9])), Box::new(Failing))?;
    register(&app, "one", unit(0, 1.0))?;

    assert_eq!(
        app.identify(&nose_photo(work.path()))?,
        MatchOutcome::NotANose { score: 0.9 }
    );
    Ok(())
}

#[test]
fn test_nose_gate_accepts_exact_threshold() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.5])), Box::new(Failing))?;
    assert_eq!(
        app.identify(&nose_photo(work.path()))?,
        MatchOutcome::EmbeddingFailed
    );
    Ok(())
}

#[test]
fn test_classifier_failure_is_rejection() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Failing), Box::new(Fixed(unit(0, 1.0))))?;
    assert_eq!(
        app.identify(&nose_photo(work.path()))?,
        MatchOutcome::NotANose { score: 1.0 }
    );
    Ok(())
}

#[test]
fn test_unreadable_query() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.1])), Box::new(Fixed(unit(0, 1.0))))?;
    let missing = work.path().join("missing.jpg");
    assert!(matches!(
        app.identify(&missing.to_string_lossy())?,
        MatchOutcome::Unreadable(_)
    ));
    Ok(())
}

#[test]
fn test_closed_models_degrade_to_rejection() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(Fixed(vec![0.1])), Box::new(Fixed(unit(0, 1.0))))?;
    register(&app, "one", unit(0, 1.0))?;
    app.classifier.close();
    assert!(!app.models_ready());
    assert_eq!(
        app.identify(&nose_photo(work.path()))?,
        MatchOutcome::NotANose { score: 1.0 }
    );
    // Listing still works without models
    assert_eq!(app.store.get_all()?.len(), 1);
    Ok(())
}
