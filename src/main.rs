use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use noseprint::{
    config,
    evaluation::Evaluation,
    profile::{DogColor, DogGender, DogType, VaccinationRecord},
    registration::RegistrationOutcome,
    storage::ProfileStore,
    validation::DEFAULT_ATTEMPTS,
    DogDetails, NoseApp,
};
use noseprint_vision::Camera;

#[derive(Parser)]
#[command(name = "noseprint")]
#[command(version, about = "Register and identify dogs by nose print")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a dog from two or more nose photos
    Register {
        #[arg(short, long)]
        name: String,
        /// Directory the photos are copied into
        #[arg(short, long)]
        folder: PathBuf,
        #[arg(long, default_value = "")]
        breed: String,
        #[arg(long, default_value = "none")]
        gender: DogGender,
        #[arg(long, default_value = "none")]
        primary_color: DogColor,
        #[arg(long, default_value = "none")]
        secondary_color: DogColor,
        #[arg(long, default_value_t = 0)]
        age_months: u32,
        #[arg(long = "type", default_value = "pet")]
        dog_type: DogType,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        adopted_on: Option<String>,
        #[arg(long)]
        microchip: Option<String>,
        /// Vaccination dates, repeatable
        #[arg(long = "vaccinated")]
        vaccinations: Vec<String>,
        /// Register even if some photos fail the nose check
        #[arg(long)]
        force: bool,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Score photos without registering anything
    Validate {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Run the full object + classifier gate and embed one photo
    Check { image: PathBuf },
    /// Identify a dog from one nose photo
    Identify { image: PathBuf },
    /// List registered dogs
    List,
    /// Show one registered dog as JSON
    Show { id: i64 },
    /// Delete a registered dog
    Delete { id: i64 },
    /// Capture nose photos from the camera into the capture directory
    Capture {
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Register {
            name,
            folder,
            breed,
            gender,
            primary_color,
            secondary_color,
            age_months,
            dog_type,
            owner,
            adopted_on,
            microchip,
            vaccinations,
            force,
            images,
        } => {
            let details = DogDetails {
                name,
                breed,
                gender,
                primary_color,
                secondary_color,
                age_in_months: age_months,
                dog_type,
                owner_name: owner,
                adoption_date: adopted_on,
                vaccinations: vaccinations.into_iter().map(VaccinationRecord::new).collect(),
                microchip_number: microchip,
            };
            with_app(cfg, |app| register(app, details, &references(&images), &folder, force))
        }
        Commands::Validate { images } => with_app(cfg, |app| validate(app, &references(&images))),
        Commands::Check { image } => with_app(cfg, |app| check(app, &reference(&image))),
        Commands::Identify { image } => with_app(cfg, |app| identify(app, &reference(&image))),
        Commands::List => with_app(cfg, list),
        Commands::Show { id } => with_app(cfg, |app| show(app, id)),
        Commands::Delete { id } => with_app(cfg, |app| delete(app, id)),
        Commands::Capture { count } => capture(&cfg, count),
        Commands::Config => open_config(cli.config),
    }
}

fn with_app(cfg: config::Config, f: impl FnOnce(&NoseApp) -> Result<()>) -> Result<()> {
    let app = NoseApp::open(cfg).context("Failed to initialize noseprint")?;
    let result = f(&app);
    app.close();
    result
}

fn reference(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn references(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| reference(p)).collect()
}

fn require_models(app: &NoseApp) -> Result<()> {
    if !app.models_ready() {
        anyhow::bail!(
            "Nose models are not available. Check classifier_model and embedding_model in {}",
            config::CONFIG_PATH.display()
        );
    }
    Ok(())
}

fn print_report(evaluation: &Evaluation<String>) {
    for entry in &evaluation.entries {
        let mark = if entry.passed { "✓" } else { "✗" };
        info!("{} {:.3} {}", mark, entry.score, entry.image);
    }
    if let Some(best) = evaluation.embedding_source() {
        info!("Best image: {} ({:.3})", best.image, best.score);
    }
}

fn register(
    app: &NoseApp,
    details: DogDetails,
    images: &[String],
    folder: &std::path::Path,
    force: bool,
) -> Result<()> {
    require_models(app)?;
    info!("Registering {} from {} image(s)", details.name, images.len());

    match app.registrar().submit(details, images, folder, force)? {
        RegistrationOutcome::Registered { id, evaluation } => {
            print_report(&evaluation);
            info!("✓ Registered dog with id {}", id);
            Ok(())
        }
        RegistrationOutcome::NeedsReview(evaluation) => {
            print_report(&evaluation);
            warn!("Some images do not look like a dog nose. Re-run with --force to register anyway.");
            anyhow::bail!("Registration not saved")
        }
    }
}

fn validate(app: &NoseApp, images: &[String]) -> Result<()> {
    if !app.classifier.is_ready() {
        warn!("Nose classifier not loaded; every image will fail");
    }
    let evaluation = app.registrar().validate(images);
    print_report(&evaluation);
    if evaluation.has_failure() {
        warn!("{} image(s) failed validation", evaluation.failures().count());
    } else {
        info!("✓ All images look like dog noses");
    }
    Ok(())
}

fn check(app: &NoseApp, image: &str) -> Result<()> {
    require_models(app)?;
    let (embedding, score) = app
        .validator()
        .process_safely(image, &app.extractor, DEFAULT_ATTEMPTS)?;
    info!(
        "✓ Accepted (score {:.3}), nose print of {} values",
        score,
        embedding.len()
    );
    Ok(())
}

fn identify(app: &NoseApp, image: &str) -> Result<()> {
    require_models(app)?;
    let outcome = app.identify(image)?;
    if outcome.is_match() {
        info!("✓ {}", outcome.describe());
    } else {
        warn!("{}", outcome.describe());
    }
    Ok(())
}

fn list(app: &NoseApp) -> Result<()> {
    let mut profiles = app.store.get_all().context("Failed to load profiles")?;
    if profiles.is_empty() {
        info!("No dogs registered");
        return Ok(());
    }
    // newest first
    profiles.sort_by(|a, b| b.id.cmp(&a.id));
    for p in &profiles {
        let created = chrono::DateTime::from_timestamp_millis(p.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        info!(
            "{:>4}  {:<16} {:<16} {:<10} {}",
            p.id, p.details.name, p.details.breed, p.details.dog_type, created
        );
    }
    Ok(())
}

fn show(app: &NoseApp, id: i64) -> Result<()> {
    let profile = app
        .store
        .get_by_id(id)?
        .with_context(|| format!("No dog with id {}", id))?;
    let json = serde_json::json!({
        "id": profile.id,
        "details": profile.details,
        "image_uri": profile.image_uri,
        "storage_uri": profile.storage_uri,
        "created_at": profile.created_at,
        "embedding_len": profile.embedding.len(),
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn delete(app: &NoseApp, id: i64) -> Result<()> {
    match app.store.delete_by_id(id)? {
        0 => anyhow::bail!("No dog with id {}", id),
        _ => {
            info!("✓ Deleted dog {}", id);
            Ok(())
        }
    }
}

fn capture(cfg: &config::Config, count: usize) -> Result<()> {
    info!("Opening camera: {}", cfg.camera);
    let mut camera = Camera::open(&cfg.camera).context("Failed to open camera")?;

    for i in 0..count {
        let path = camera
            .capture_to(&cfg.capture_dir)
            .context("Failed to capture frame")?;
        info!("Frame {}: {}", i + 1, path.display());
        std::thread::sleep(std::time::Duration::from_millis(500));
    }
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.clone());
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(&config_path))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
