//! # Chronic KB CLI (`ckb`)
//!
//! ## Usage
//!
//! ```bash
//! ckb --config ./config/ckb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ckb init` | Create the SQLite database and schema |
//! | `ckb ingest <file>` | Ingest a text document with governance metadata |
//! | `ckb seed <file>` | Ingest structured disease records from JSON |
//! | `ckb search "<query>"` | Nearest knowledge units |
//! | `ckb get <id>` | A stored unit, or every chunk of a document |
//! | `ckb update <id>` | Replace a unit's text or governance metadata |
//! | `ckb delete <id>` | Remove a document and its chunks |
//! | `ckb diseases` | Distinct disease tags |
//! | `ckb stats` | Store overview |
//! | `ckb clear --yes` | Drop every stored unit |
//! | `ckb classify "<query>"` | Query classification only |
//! | `ckb ask "<query>"` | Grounded answer, optionally for a patient |
//! | `ckb recommend --patient <file>` | Personalized recommendations |
//! | `ckb metric bp 130 85` | Classify a blood-pressure reading |
//!
//! ## Examples
//!
//! ```bash
//! ckb seed data/sample_knowledge.json
//! ckb ingest notes.txt --disease hypertension --category treatment \
//!     --source-id nice-ng136 --document-version NG136 --evidence-level guideline_consensus
//! ckb ask "What are early signs of type 2 diabetes?"
//! ckb recommend --patient data/patients/sample_patient.json --type diet
//! ckb metric glucose 132 --context fasting
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use chronic_kb::config::{self, Config};
use chronic_kb::core::governance::{DOCUMENT_VERSION, EVIDENCE_LEVEL, SOURCE_ID};
use chronic_kb::core::metrics::{classify_blood_pressure, classify_glucose, GlucoseContext};
use chronic_kb::core::models::{DiseaseKnowledge, Metadata, QueryRequest, RecommendationRequest};
use chronic_kb::knowledge::KnowledgeStore;
use chronic_kb::patients::{InMemoryPatientDirectory, PatientDirectory};
use chronic_kb::{app, migrate, stats};

/// Chronic KB CLI: governed knowledge store and agent pipeline for
/// chronic-disease questions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without the file, built-in defaults are used (in-memory store,
/// hashing embedder, demo model).
#[derive(Parser)]
#[command(
    name = "ckb",
    about = "Chronic KB: governed knowledge store and agent pipeline for chronic-disease questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ckb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and schema. Idempotent.
    Init,

    /// Ingest a text document.
    ///
    /// The governance fields are checked against the source registry
    /// before anything is stored.
    Ingest {
        /// Path to a UTF-8 text file.
        file: PathBuf,
        #[arg(long)]
        disease: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        source_id: String,
        #[arg(long)]
        document_version: String,
        /// One of GRADE_HIGH, GRADE_MODERATE, GRADE_LOW, GUIDELINE_CONSENSUS,
        /// EXPERT_OPINION (case-insensitive).
        #[arg(long)]
        evidence_level: String,
        /// Extra metadata as `key=value` pairs.
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Replace the text and/or governance metadata of a stored unit.
    ///
    /// Any metadata flag replaces the unit's metadata as a whole, so the
    /// three governance fields must be given together.
    Update {
        id: String,
        /// New text for the unit.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        source_id: Option<String>,
        #[arg(long)]
        document_version: Option<String>,
        #[arg(long)]
        evidence_level: Option<String>,
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Ingest structured disease records from a JSON array.
    Seed {
        file: PathBuf,
    },

    /// Nearest knowledge units to a query.
    Search {
        query: String,
        #[arg(long)]
        disease: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Defaults to `[retrieval] top_k`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// A stored unit, or every chunk of a document in order.
    Get {
        id: String,
    },

    /// Remove a document and all of its chunks.
    Delete {
        id: String,
    },

    /// List distinct disease tags.
    Diseases,

    /// Show unit counts and breakdowns.
    Stats,

    /// Drop every stored unit.
    Clear {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },

    /// Classify a query without answering it.
    Classify {
        query: String,
    },

    /// Answer a question from the knowledge store.
    Ask {
        query: String,
        /// Patient JSON file (snapshot plus optional `metrics`).
        #[arg(long)]
        patient: Option<PathBuf>,
        /// Defaults to `[retrieval] top_k`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Personalized recommendations for a patient.
    Recommend {
        /// Patient JSON file (snapshot plus optional `metrics`).
        #[arg(long)]
        patient: PathBuf,
        /// lifestyle, medication, diet, exercise, ...
        #[arg(long = "type", default_value = "lifestyle")]
        kind: String,
        #[arg(long)]
        context: Option<String>,
        #[arg(long = "constraint")]
        constraints: Vec<String>,
    },

    /// Classify a single health reading.
    Metric {
        #[command(subcommand)]
        reading: MetricReading,
    },
}

#[derive(Subcommand)]
enum MetricReading {
    /// Blood pressure in mmHg.
    Bp { systolic: u32, diastolic: u32 },
    /// Blood glucose in mg/dL.
    Glucose {
        value: f64,
        /// fasting, postprandial or random.
        #[arg(long, default_value = "random")]
        context: GlucoseContext,
    },
}

/// Parse a `key=value` pair for `--meta` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    init_logging(&cfg.logging.level);
    if !cli.config.exists() {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
    }

    // Commands that don't touch the store
    match &cli.command {
        Commands::Metric { reading } => {
            match reading {
                MetricReading::Bp {
                    systolic,
                    diastolic,
                } => println!("{}", classify_blood_pressure(*systolic, *diastolic)),
                MetricReading::Glucose { value, context } => {
                    println!("{}", classify_glucose(*value, *context))
                }
            }
            return Ok(());
        }
        Commands::Init => {
            if cfg.store.backend != "sqlite" {
                bail!("init requires [store] backend = \"sqlite\"");
            }
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.store.path.display());
            return Ok(());
        }
        _ => {}
    }

    let store = app::open_store(&cfg).await?;

    match cli.command {
        Commands::Ingest {
            file,
            disease,
            category,
            source_id,
            document_version,
            evidence_level,
            meta,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut metadata: Metadata = meta
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();
            metadata.insert(SOURCE_ID.into(), Value::from(source_id));
            metadata.insert(DOCUMENT_VERSION.into(), Value::from(document_version));
            metadata.insert(EVIDENCE_LEVEL.into(), Value::from(evidence_level));

            let doc_id = store
                .ingest(&content, &disease, &category, &metadata)
                .await?;
            println!("{}", doc_id);
        }
        Commands::Update {
            id,
            file,
            source_id,
            document_version,
            evidence_level,
            meta,
        } => {
            let content = file
                .map(|f| {
                    std::fs::read_to_string(&f)
                        .with_context(|| format!("Failed to read {}", f.display()))
                })
                .transpose()?;
            let replaces_metadata = source_id.is_some()
                || document_version.is_some()
                || evidence_level.is_some()
                || !meta.is_empty();
            let metadata = replaces_metadata.then(|| {
                let mut metadata: Metadata = meta
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect();
                for (key, value) in [
                    (SOURCE_ID, source_id),
                    (DOCUMENT_VERSION, document_version),
                    (EVIDENCE_LEVEL, evidence_level),
                ] {
                    if let Some(v) = value {
                        metadata.insert(key.into(), Value::from(v));
                    }
                }
                metadata
            });

            let unit = store
                .update(&id, content.as_deref(), metadata.as_ref())
                .await?;
            print_json(&unit)?;
        }
        Commands::Seed { file } => {
            seed(&store, &file).await?;
        }
        Commands::Search {
            query,
            disease,
            category,
            limit,
        } => {
            let hits = store
                .search(
                    &query,
                    disease.as_deref(),
                    category.as_deref(),
                    limit.unwrap_or(cfg.retrieval.top_k),
                )
                .await?;
            print_json(&hits)?;
        }
        Commands::Get { id } => {
            print_json(&store.get_document(&id).await?)?;
        }
        Commands::Delete { id } => {
            if !store.delete(&id).await? {
                bail!("document {} not found", id);
            }
            println!("Deleted {}", id);
        }
        Commands::Diseases => {
            for disease in store.all_diseases().await? {
                println!("{}", disease);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg, &store).await?;
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the store without --yes");
            }
            store.clear().await?;
            println!("Store cleared.");
        }
        Commands::Classify { query } => {
            let orchestrator = app::build_orchestrator(
                &cfg,
                store.clone(),
                Arc::new(InMemoryPatientDirectory::new()),
            )?;
            print_json(&orchestrator.classify(&query).await)?;
        }
        Commands::Ask {
            query,
            patient,
            limit,
        } => {
            let mut request = QueryRequest::new(query);
            request.max_results = limit.unwrap_or(cfg.retrieval.top_k);
            let directory: Arc<dyn PatientDirectory> = match patient {
                Some(path) => {
                    let (directory, id) = app::load_patient_file(&path)?;
                    request.patient_id = Some(id);
                    directory
                }
                None => Arc::new(InMemoryPatientDirectory::new()),
            };
            let orchestrator = app::build_orchestrator(&cfg, store.clone(), directory)?;
            print_json(&orchestrator.answer_for_patient(&request).await?)?;
        }
        Commands::Recommend {
            patient,
            kind,
            context,
            constraints,
        } => {
            let (directory, patient_id) = app::load_patient_file(&patient)?;
            let orchestrator = app::build_orchestrator(&cfg, store.clone(), directory)?;
            let request = RecommendationRequest {
                patient_id,
                recommendation_type: kind,
                context,
                constraints,
            };
            print_json(&orchestrator.recommend_for_patient(&request).await?)?;
        }
        Commands::Init | Commands::Metric { .. } => {
            // Handled above
            unreachable!()
        }
    }

    Ok(())
}

async fn seed(store: &KnowledgeStore, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records: Vec<DiseaseKnowledge> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse disease records in {}", file.display()))?;

    let mut ingested = 0usize;
    for record in &records {
        match store.ingest_structured(record).await {
            Ok(doc_id) => {
                ingested += 1;
                println!("{}\t{}", record.disease_id, doc_id);
            }
            Err(e) if e.is_configuration_fault() => return Err(e.into()),
            Err(e) => eprintln!("{}\trejected: {}", record.disease_id, e),
        }
    }
    println!("Seeded {} of {} records.", ingested, records.len());
    Ok(())
}
