//! Intake CLI — questionnaire submission intake and enrichment.
//!
//! Usage:
//!   intake create --input submission.json [--no-enrich] [--db path]
//!   intake get <id> [--db path]
//!   intake classification <id> [--db path]
//!   intake enrich <id> --task <slot> [--db path]
//!   intake classify --input submission.json
//!   intake list [--limit N] [--db path]
//!   intake sync <id> [--db path]
//!
//! The generation endpoint comes from INTAKE_GENERATE_URL (token:
//! INTAKE_GENERATE_TOKEN); the relationship index from INTAKE_INDEX_URL
//! (token: INTAKE_INDEX_TOKEN). Reads, `classify`, and
//! `create --no-enrich` work without either.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use intake::classify;
use intake::generate::{
    GenerateError, GenerateRequest, GenerativeClient, HttpGenerator, ENDPOINT_ENV,
};
use intake::mirror::{HttpRelationshipIndex, SyncOutcome};
use intake::orchestrate::StepOutcome;
use intake::service::SubmissionService;
use intake::store::{OpenStore, SqliteRecordStore};
use intake::submission::{NewSubmission, SubmissionId};

#[derive(Parser)]
#[command(
    name = "intake",
    version,
    about = "Questionnaire intake with segment classification and enrichment"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new submission and run its enrichment plan
    Create {
        /// Submission JSON file ('-' for stdin)
        #[arg(long)]
        input: PathBuf,
        /// Store only; skip enrichment and index sync
        #[arg(long)]
        no_enrich: bool,
    },
    /// Print a submission, backfilling read-due enrichment first
    Get {
        /// Submission id
        id: String,
    },
    /// Print a submission's classification
    Classification {
        /// Submission id
        id: String,
    },
    /// Run one enrichment task, regenerating its slot
    Enrich {
        /// Submission id
        id: String,
        /// Task slot (report, action_plan, summary)
        #[arg(long)]
        task: String,
    },
    /// Classify submission JSON without storing anything
    Classify {
        /// Submission JSON file ('-' for stdin)
        #[arg(long)]
        input: PathBuf,
    },
    /// List recent submissions
    List {
        /// Maximum rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Push a submission into the relationship index
    Sync {
        /// Submission id
        id: String,
    },
}

/// Stands in when no generation endpoint is configured. Reads then
/// degrade to the stored record; explicit enrichment reports the missing
/// configuration.
struct UnconfiguredGenerator;

#[async_trait::async_trait]
impl GenerativeClient for UnconfiguredGenerator {
    async fn complete(&self, _request: &GenerateRequest) -> Result<String, GenerateError> {
        Err(GenerateError::NotConfigured(format!("{ENDPOINT_ENV} not set")))
    }
}

/// Get the default database path (~/.local/share/intake/intake.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let intake_dir = data_dir.join("intake");
    std::fs::create_dir_all(&intake_dir).ok();
    intake_dir.join("intake.db")
}

fn build_service(db: Option<PathBuf>) -> Result<SubmissionService, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteRecordStore::open(&db_path)
        .map_err(|e| format!("failed to open database: {}", e))?;

    let client: Arc<dyn GenerativeClient> = match HttpGenerator::from_env() {
        Ok(generator) => Arc::new(generator),
        Err(_) => Arc::new(UnconfiguredGenerator),
    };

    // The CLI drives enrichment inline so the process doesn't exit with
    // spawned work still in flight.
    let mut service =
        SubmissionService::new(Arc::new(store), client).with_background_enrichment(false);
    if let Some(index) = HttpRelationshipIndex::from_env() {
        service = service.with_index(Arc::new(index));
    }
    Ok(service)
}

fn read_input(path: &Path) -> Result<NewSubmission, String> {
    let text = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .map_err(|e| format!("cannot read stdin: {}", e))?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid submission JSON: {}", e))
}

/// Mutating commands that call out need a real endpoint; fail up front
/// instead of half-running the plan.
fn require_generator() -> Result<(), String> {
    HttpGenerator::from_env().map(|_| ()).map_err(|e| e.to_string())
}

fn describe_step(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Written => "written".to_string(),
        StepOutcome::SkippedExisting => "skipped (already present)".to_string(),
        StepOutcome::Failed(reason) => format!("failed: {}", reason),
        StepOutcome::Aborted(reason) => format!("aborted: {}", reason),
    }
}

async fn cmd_create(service: &SubmissionService, input: &Path, no_enrich: bool) -> i32 {
    if !no_enrich {
        if let Err(e) = require_generator() {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let new = match read_input(input) {
        Ok(new) => new,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let outcome = match service.create(new).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let dominant = outcome
        .classification
        .dominant
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("Created submission {}", outcome.id);
    println!(
        "Classification: dominant {}, status {:?}",
        dominant, outcome.classification.status
    );

    if no_enrich {
        return 0;
    }

    let report = match service.run_plan(&outcome.id).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    for (slot, step) in &report.steps {
        println!("  {:<12} {}", slot, describe_step(step));
    }

    match service.sync_index(&outcome.id).await {
        Ok(sync) => println!("Index sync: {}", describe_sync(sync)),
        // no index configured is fine; create stands on its own
        Err(intake::service::ServiceError::Configuration(_)) => {}
        Err(e) => eprintln!("Warning: index sync failed: {}", e),
    }

    if report.completed() {
        0
    } else {
        1
    }
}

async fn cmd_get(service: &SubmissionService, id: &str) -> i32 {
    let id = SubmissionId::from_string(id);
    match service.get(&id).await {
        Ok(record) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&record).expect("record serializes")
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_classification(service: &SubmissionService, id: &str) -> i32 {
    let id = SubmissionId::from_string(id);
    match service.classification(&id).await {
        Ok(classification) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&classification).expect("classification serializes")
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_enrich(service: &SubmissionService, id: &str, task: &str) -> i32 {
    if let Err(e) = require_generator() {
        eprintln!("Error: {}", e);
        return 1;
    }
    let id = SubmissionId::from_string(id);
    match service.run_task(&id, task).await {
        Ok(value) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&value).expect("value serializes")
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_classify(input: &Path) -> i32 {
    let new = match read_input(input) {
        Ok(new) => new,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let classification = classify::classify(&new.answers, &new.contact_details);
    println!(
        "{}",
        serde_json::to_string_pretty(&classification).expect("classification serializes")
    );
    0
}

fn cmd_list(service: &SubmissionService, limit: usize) -> i32 {
    let rows = match service.list_recent(limit) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if rows.is_empty() {
        println!("No submissions stored.");
        return 0;
    }
    println!(
        "{:<22}  {:<16}  {:<10}  {:<9}  {}",
        "ID", "CREATED", "FAMILY", "STATUS", "DOMINANT"
    );
    println!("{}", "-".repeat(72));
    for row in rows {
        println!(
            "{:<22}  {:<16}  {:<10}  {:<9}  {}",
            row.id,
            row.created_at.format("%Y-%m-%d %H:%M"),
            row.segment_family,
            if row.ready { "ready" } else { "not-ready" },
            row.dominant.as_deref().unwrap_or("-"),
        );
    }
    0
}

fn describe_sync(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Inserted => "entry created",
        SyncOutcome::Updated => "entry updated",
        SyncOutcome::SkippedLookupFailed => "skipped (index lookup failed)",
        SyncOutcome::Failed => "failed (see log)",
    }
}

async fn cmd_sync(service: &SubmissionService, id: &str) -> i32 {
    let id = SubmissionId::from_string(id);
    match service.sync_index(&id).await {
        Ok(outcome @ (SyncOutcome::Inserted | SyncOutcome::Updated)) => {
            println!("Index sync: {}", describe_sync(outcome));
            0
        }
        Ok(outcome) => {
            eprintln!("Index sync: {}", describe_sync(outcome));
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("intake=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // classify is pure; no database involved
    if let Commands::Classify { input } = &cli.command {
        std::process::exit(cmd_classify(input));
    }

    let service = match build_service(cli.db) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Create { input, no_enrich } => cmd_create(&service, &input, no_enrich).await,
        Commands::Get { id } => cmd_get(&service, &id).await,
        Commands::Classification { id } => cmd_classification(&service, &id).await,
        Commands::Enrich { id, task } => cmd_enrich(&service, &id, &task).await,
        Commands::Classify { .. } => unreachable!("handled before the database opens"),
        Commands::List { limit } => cmd_list(&service, limit),
        Commands::Sync { id } => cmd_sync(&service, &id).await,
    };
    std::process::exit(code);
}
