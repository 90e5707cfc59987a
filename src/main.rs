use facegate::camera::STREAM_CONTENT_TYPE;
use facegate::matching::KnownFace;
use facegate::{
    best_match_across_models, BincodeStore, CameraSessionManager, ColorSpace, Config, FaceProvider,
    Frame, IdentityMatchingEngine, ServiceProvider, V4l2Source,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use facegate::storage::EnrollmentStore;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face authentication over a shared camera")]
struct Cli {
    /// Path to the TOML config file (defaults to configs/facegate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one frame and save it as a JPEG
    TestCamera {
        #[arg(short, long, default_value = "test_capture.jpg")]
        output: PathBuf,
    },
    /// Write the MJPEG multipart stream to stdout
    Stream {
        /// Stop after this many frames (runs until interrupted when omitted)
        #[arg(short, long)]
        frames: Option<u64>,
    },
    /// Enroll a new identity from a live capture
    Enroll {
        #[arg(short, long)]
        identity: String,
    },
    /// Authenticate a live capture against all enrollments
    Authenticate,
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        #[arg(short, long)]
        identity: String,
    },
    /// Best-match evaluation of an image file across candidate models
    Evaluate {
        /// Probe image to identify
        #[arg(short, long)]
        probe: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .unwrap_or_else(|e| {
        tracing::warn!("{}; using built-in defaults", e);
        Config::default()
    });
    config.validate()?;

    match cli.command {
        Commands::TestCamera { output } => {
            let session = open_camera(&config);
            session.start()?;
            let frame = session.get_frame(ColorSpace::Rgb)?;
            std::fs::write(&output, frame.to_jpeg()?)?;
            session.stop();
            println!(
                "Saved {}x{} frame to {}",
                frame.width(),
                frame.height(),
                output.display()
            );
        }
        Commands::Stream { frames } => {
            let session = open_camera(&config);
            eprintln!("Content-Type: {}", STREAM_CONTENT_TYPE);
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut yielded = 0u64;
            for part in session.stream_frames()? {
                out.write_all(&part?)?;
                yielded += 1;
                if frames.is_some_and(|n| yielded >= n) {
                    break;
                }
            }
        }
        Commands::Enroll { identity } => {
            let session = open_camera(&config);
            let frame = session.get_frame(ColorSpace::Rgb)?;
            session.stop();

            let engine = build_engine(&config)?;
            let record = engine.enroll(&identity, &frame)?;
            println!(
                "Enrolled {:?} ({} dimensions, model {})",
                record.identity,
                record.embedding.len(),
                record.model_id
            );
        }
        Commands::Authenticate => {
            let session = open_camera(&config);
            let frame = session.get_frame(ColorSpace::Rgb)?;
            session.stop();

            let engine = build_engine(&config)?;
            let result = engine.authenticate(&frame)?;
            match result.identity {
                Some(identity) => {
                    println!("Matched {:?} (confidence {:.2})", identity, result.confidence)
                }
                None => println!("Unknown face"),
            }
        }
        Commands::List => {
            let store = open_store(&config)?;
            let records = store.list_all()?;
            if records.is_empty() {
                println!("No identities enrolled");
            }
            for record in records {
                println!(
                    "{}  (model {}, enrolled {})",
                    record.identity,
                    record.model_id,
                    record.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Remove { identity } => {
            let store = open_store(&config)?;
            if store.delete(&identity)? {
                println!("Removed {:?}", identity);
            } else {
                println!("No such identity: {:?}", identity);
            }
        }
        Commands::Evaluate { probe } => {
            let bytes = std::fs::read(&probe)?;
            let frame = Frame::from_jpeg(&bytes)?;

            let mut providers: Vec<ServiceProvider> = Vec::new();
            for socket in std::iter::once(&config.provider.socket_path)
                .chain(config.provider.candidate_sockets.iter())
            {
                match ServiceProvider::connect(socket, config.provider.connect_retries) {
                    Ok(p) => providers.push(p),
                    Err(e) => tracing::warn!("Skipping provider at {}: {}", socket.display(), e),
                }
            }
            if providers.is_empty() {
                anyhow::bail!("No embedding providers reachable");
            }
            let provider_refs: Vec<&dyn FaceProvider> =
                providers.iter().map(|p| p as &dyn FaceProvider).collect();

            let store = open_store(&config)?;
            let mut known = Vec::new();
            for record in store.list_all()? {
                if let Some(jpeg) = &record.reference_jpeg {
                    known.push(KnownFace {
                        identity: record.identity.clone(),
                        reference: Frame::from_jpeg(jpeg)?,
                    });
                }
            }
            if known.is_empty() {
                anyhow::bail!("No enrollments with reference images to evaluate against");
            }

            let best = best_match_across_models(
                &frame,
                &provider_refs,
                &known,
                config.matching.high_confidence_cutoff,
            );
            match best.identity {
                Some(identity) => println!(
                    "Recognized {:?} via {} (confidence {:.2})",
                    identity,
                    best.model_id.as_deref().unwrap_or("?"),
                    best.confidence
                ),
                None => println!("Unknown face"),
            }
        }
    }

    Ok(())
}

fn open_camera(config: &Config) -> CameraSessionManager<V4l2Source> {
    CameraSessionManager::new(
        V4l2Source::new(config.camera.clone()),
        Duration::from_millis(config.camera.min_operation_interval_ms),
    )
}

fn open_store(config: &Config) -> Result<BincodeStore> {
    Ok(match &config.storage.data_dir {
        Some(dir) => BincodeStore::new(dir.clone())?,
        None => BincodeStore::open_default()?,
    })
}

fn build_engine(config: &Config) -> Result<IdentityMatchingEngine<ServiceProvider, BincodeStore>> {
    let provider =
        ServiceProvider::connect(&config.provider.socket_path, config.provider.connect_retries)?;
    let store = open_store(config)?;
    Ok(IdentityMatchingEngine::new(
        provider,
        store,
        config.matching.match_threshold,
    ))
}

fn setup_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }
}
