//! Nota daemon CLI - rubric notation over recorded prospection sessions.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use notad::engine::{NotationEngine, NotationOutcome};
use notad::evaluator::OllamaEvaluator;
use notad::provider::FileSessionProvider;
use notad::store::FileResultStore;
use nota_common::config::{NotaConfig, CONFIG_PATH};
use nota_common::scoring::{points_sur, NiveauPerformance};
use nota_common::transcript::{ConversationRef, SessionRecord, TranscriptTurn};
use nota_common::NotaError;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "notad", version, about = "Notation engine for recorded prospection sessions")]
struct Cli {
    /// Alternate configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score one session and persist the notation
    Note {
        /// Session id to score
        #[arg(long, conflicts_with = "scenario")]
        session: Option<String>,
        /// Score the latest completed session of this scenario
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Print the stored notation for a session
    Show {
        #[arg(long)]
        session: String,
    },
    /// Import a transcript file as a completed session
    Import {
        /// Scenario the session belongs to
        #[arg(long)]
        scenario: String,
        /// Free-form scenario context forwarded to the evaluator
        #[arg(long)]
        context: Option<String>,
        /// JSON file containing the transcript turns
        file: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let config = NotaConfig::load(&config_path)?;

    match cli.command {
        Command::Note { session, scenario } => {
            let conversation = match (session, scenario) {
                (Some(id), _) => ConversationRef::Session(id),
                (None, Some(id)) => ConversationRef::LatestForScenario(id),
                (None, None) => anyhow::bail!("--session or --scenario is required"),
            };
            run_notation(&config, &conversation).await
        }
        Command::Show { session } => {
            let store = FileResultStore::new(&config.storage);
            let stored = store.load(&session).map_err(exit_with_code)?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
            Ok(())
        }
        Command::Import {
            scenario,
            context,
            file,
        } => import_session(&config, &scenario, context, &file),
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_notation(config: &NotaConfig, conversation: &ConversationRef) -> Result<()> {
    let evaluator = OllamaEvaluator::new(&config.evaluator, config.prompts.clone());
    if !evaluator.is_available().await {
        warn!(
            "Evaluator at {} is not answering; rubric calls will likely fail",
            config.evaluator.base_url
        );
    }
    let provider = FileSessionProvider::new(&config.storage);
    let store = FileResultStore::new(&config.storage);
    let engine = NotationEngine::new(evaluator, provider, store);

    let outcome = engine
        .compute_notation(conversation)
        .await
        .map_err(exit_with_code)?;

    print_summary(&outcome);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let Some(store_error) = &outcome.store_error {
        anyhow::bail!("notation computed but not persisted: {}", store_error);
    }
    Ok(())
}

/// Convert a fatal engine error into its stable exit code.
fn exit_with_code(e: NotaError) -> anyhow::Error {
    error!("{}", e);
    std::process::exit(e.code());
}

fn print_summary(outcome: &NotationOutcome) {
    if let Some(score) = outcome.resultat.score_global() {
        let niveau = score.niveau_performance.as_str();
        let niveau = match score.niveau_performance {
            NiveauPerformance::Faible => niveau.red().to_string(),
            NiveauPerformance::Moyen => niveau.yellow().to_string(),
            _ => niveau.green().to_string(),
        };
        eprintln!(
            "Score global : {} / 100 ({})",
            score.valeur.bold(),
            niveau
        );
        for detail in &score.detail_calcul {
            eprintln!(
                "  {}  {:>5.1} /100  ->  {:.1} pts /5",
                detail.code,
                detail.score_etape,
                points_sur(detail.score_etape, 5.0)
            );
        }
        eprintln!("  {}", score.commentaire);
    } else {
        eprintln!("{}", "Pas de score global (méthodologie absente)".yellow());
    }
    for err in &outcome.errors {
        eprintln!("  {} {}", "[!]".red(), err);
    }
}

fn import_session(
    config: &NotaConfig,
    scenario: &str,
    context: Option<String>,
    file: &PathBuf,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let turns: Vec<TranscriptTurn> =
        serde_json::from_str(&content).context("Transcript file must be a JSON array of turns")?;
    anyhow::ensure!(!turns.is_empty(), "transcript has no turns");

    let session = SessionRecord {
        session_id: Uuid::new_v4().to_string(),
        scenario_id: scenario.to_string(),
        contexte: context,
        started_at: turns.first().map(|t| t.occurred_at).unwrap_or_else(Utc::now),
        ended_at: Some(turns.last().map(|t| t.occurred_at).unwrap_or_else(Utc::now)),
        turns,
    };

    let provider = FileSessionProvider::new(&config.storage);
    let path = provider.save_session(&session).map_err(exit_with_code)?;
    println!("{}", session.session_id);
    eprintln!("Session imported to {}", path.display());
    Ok(())
}
