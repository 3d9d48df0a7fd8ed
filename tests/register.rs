mod common;

use anyhow::Result;
use common::*;
use noseprint::{
    registration::{RegistrationError, RegistrationOutcome},
    storage::ProfileStore,
    DogDetails, Embedding,
};

fn details(name: &str) -> DogDetails {
    DogDetails {
        name: name.into(),
        breed: "Beagle".into(),
        ..Default::default()
    }
}

fn entries_in(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn test_registers_from_best_passing_image() -> Result<()> {
    env_logger::try_init().ok();
    let work = tempfile::tempdir()?;
    let target = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(PixelEmbedding))?;

    let images = vec![
        grey_image(work.path(), "a.png", 51),
        grey_image(work.path(), "b.png", 0),
        grey_image(work.path(), "c.png", 25),
    ];

    let outcome = app
        .registrar()
        .submit(details("Rex"), &images, target.path(), false)?;
    let id = match outcome {
        RegistrationOutcome::Registered { id, evaluation } => {
            assert!(!evaluation.has_failure());
            assert_eq!(evaluation.best_passing_index(), Some(1));
            id
        }
        other => panic!("expected registration, got {:?}", other),
    };

    let profile = app.store.get_by_id(id)?.expect("profile stored");
    // Black image normalizes to -1.0
    assert_eq!(
        profile.embedding,
        Embedding::normalized(pixel_embedding_raw(-1.0))
    );
    assert!((profile.embedding.norm() - 1.0).abs() < 1e-4);
    assert_eq!(profile.details.breed, "Beagle");

    let folder = std::path::PathBuf::from(profile.storage_uri.unwrap());
    let folder_name = folder.file_name().unwrap().to_string_lossy().into_owned();
    assert!(folder_name.starts_with("Rex_"));
    assert_eq!(folder_name.len(), "Rex_".len() + "yyyyMMdd_HHmmss".len());
    assert_eq!(entries_in(&folder), 3);

    let first = std::path::PathBuf::from(profile.image_uri.unwrap());
    assert_eq!(first.parent(), Some(folder.as_path()));
    assert!(first
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("nose_0_"));
    Ok(())
}

#[test]
fn test_failed_image_requires_review() -> Result<()> {
    let work = tempfile::tempdir()?;
    let target = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(PixelEmbedding))?;
    let images = vec![
        grey_image(work.path(), "ok.png", 10),
        grey_image(work.path(), "bad.png", 230),
    ];

    match app
        .registrar()
        .submit(details("Rex"), &images, target.path(), false)?
    {
        RegistrationOutcome::NeedsReview(evaluation) => {
            let passed: Vec<bool> = evaluation.entries.iter().map(|e| e.passed).collect();
            assert_eq!(passed, vec![true, false]);
        }
        other => panic!("expected review, got {:?}", other),
    }
    assert_eq!(app.store.count()?, 0);
    assert_eq!(entries_in(target.path()), 0);
    Ok(())
}

#[test]
fn test_override_uses_best_overall_when_nothing_passes() -> Result<()> {
    let work = tempfile::tempdir()?;
    let target = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(PixelEmbedding))?;
    let images = vec![
        grey_image(work.path(), "a.png", 255),
        grey_image(work.path(), "b.png", 200),
        grey_image(work.path(), "c.png", 200),
    ];

    let outcome = app
        .registrar()
        .submit(details("Rex"), &images, target.path(), true)?;
    match outcome {
        RegistrationOutcome::Registered { evaluation, .. } => {
            assert!(evaluation.best_passing().is_none());
            assert_eq!(evaluation.best_overall_index(), Some(1));
        }
        other => panic!("expected registration, got {:?}", other),
    }
    assert_eq!(app.store.count()?, 1);
    Ok(())
}

#[test]
fn test_embedding_failure_stores_nothing() -> Result<()> {
    let work = tempfile::tempdir()?;
    let target = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(Failing))?;
    let images = vec![
        grey_image(work.path(), "a.png", 0),
        grey_image(work.path(), "b.png", 0),
    ];

    let err = app
        .registrar()
        .submit(details("Rex"), &images, target.path(), false)
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EmbeddingFailed(_)));
    assert_eq!(app.store.count()?, 0);
    assert_eq!(entries_in(target.path()), 0);
    Ok(())
}

#[test]
fn test_non_finite_print_is_never_stored() -> Result<()> {
    let work = tempfile::tempdir()?;
    let target = tempfile::tempdir()?;
    let mut raw = unit(0, 0.1);
    raw[5] = f32::NAN;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(Fixed(raw)))?;
    let images = vec![
        grey_image(work.path(), "a.png", 0),
        grey_image(work.path(), "b.png", 0),
    ];

    let err = app
        .registrar()
        .submit(details("Rex"), &images, target.path(), false)
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EmbeddingFailed(_)));
    assert_eq!(app.store.count()?, 0);
    assert_eq!(entries_in(target.path()), 0);
    Ok(())
}

#[test]
fn test_inaccessible_folder_stores_nothing() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(PixelEmbedding))?;
    let images = vec![
        grey_image(work.path(), "a.png", 0),
        grey_image(work.path(), "b.png", 0),
    ];

    let err = app
        .registrar()
        .submit(
            details("Rex"),
            &images,
            &work.path().join("no-such-dir"),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::StorageUnavailable(_)));
    assert_eq!(app.store.count()?, 0);
    Ok(())
}

#[test]
fn test_request_checks() -> Result<()> {
    let work = tempfile::tempdir()?;
    let target = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(PixelEmbedding))?;
    let one = vec![grey_image(work.path(), "a.png", 0)];
    let two = vec![one[0].clone(), grey_image(work.path(), "b.png", 0)];

    let registrar = app.registrar();
    assert!(matches!(
        registrar.submit(details("Rex"), &one, target.path(), true),
        Err(RegistrationError::InvalidRequest(_))
    ));
    assert!(matches!(
        registrar.submit(details("   "), &two, target.path(), true),
        Err(RegistrationError::InvalidRequest(_))
    ));
    assert_eq!(app.store.count()?, 0);
    Ok(())
}

#[test]
fn test_unreadable_image_fails_closed_in_report() -> Result<()> {
    let work = tempfile::tempdir()?;
    let app = app_with(work.path(), Box::new(BrightnessScore), Box::new(PixelEmbedding))?;
    let broken = work.path().join("broken.jpg");
    std::fs::write(&broken, b"garbage")?;
    let images = vec![
        grey_image(work.path(), "a.png", 0),
        broken.to_string_lossy().into_owned(),
    ];

    let evaluation = app.registrar().validate(&images);
    assert_eq!(evaluation.entries.len(), 2);
    assert_eq!(evaluation.entries[1].score, 1.0);
    assert!(!evaluation.entries[1].passed);
    assert_eq!(evaluation.best_passing_index(), Some(0));
    Ok(())
}
