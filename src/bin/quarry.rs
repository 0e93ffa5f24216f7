//! Quarry CLI — prior-art extraction pipeline with an interactive checkpoint.
//!
//! Usage:
//!   quarry extract "Smart irrigation system using soil sensors"
//!   quarry extract --file idea.txt --auto-approve --json

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use quarry::{
    Collaborators, DecisionContext, DecisionHandler, GateError, Orchestrator, PipelineConfig,
    RunState, RunStatus, ScriptedDecisions, SeedKeywords, ValidationDecision,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "quarry",
    version,
    about = "Prior-art search pipeline with human-in-the-loop keyword validation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an extraction against the built-in stub collaborators
    Extract {
        /// Invention description text (or use --file)
        text: Option<String>,
        /// Read the invention description from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// YAML pipeline configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Approve the checkpoint automatically instead of prompting
        #[arg(long)]
        auto_approve: bool,
        /// Override the validation retry limit
        #[arg(long)]
        max_retries: Option<u32>,
        /// Print the final pipeline state as JSON
        #[arg(long)]
        json: bool,
        /// Enable tracing output
        #[arg(long)]
        verbose: bool,
    },
}

/// Terminal decision handler — the original interactive validation flow.
struct InteractiveHandler;

#[async_trait]
impl DecisionHandler for InteractiveHandler {
    async fn decide(&self, ctx: DecisionContext) -> Result<ValidationDecision, GateError> {
        // Blocking stdin reads stay off the async runtime.
        tokio::task::spawn_blocking(move || prompt_for_decision(&ctx))
            .await
            .map_err(|err| GateError::HandlerUnavailable(err.to_string()))?
    }
}

fn prompt_for_decision(ctx: &DecisionContext) -> Result<ValidationDecision, GateError> {
    let separator = "=".repeat(60);
    println!("\n{}", separator);
    println!("KEYWORD VALIDATION — attempt {}", ctx.attempt);
    println!("{}", separator);

    println!("\nConcept matrix:");
    println!("  Problem / purpose: {}", ctx.concept_matrix.problem_purpose);
    println!("  Object / system: {}", ctx.concept_matrix.object_system);
    println!(
        "  Environment / field: {}",
        ctx.concept_matrix.environment_field
    );

    println!("\nSeed keywords:");
    println!(
        "  Problem / purpose: {}",
        ctx.seed_keywords.problem_purpose.join(", ")
    );
    println!(
        "  Object / system: {}",
        ctx.seed_keywords.object_system.join(", ")
    );
    println!(
        "  Environment / field: {}",
        ctx.seed_keywords.environment_field.join(", ")
    );

    println!("\nChoose an action:");
    println!("  1. approve — continue with these keywords");
    println!("  2. reject  — regenerate keywords with feedback");
    println!("  3. edit    — manually modify keywords");

    loop {
        let answer = read_line("\nYour choice (1/2/3 or approve/reject/edit): ")?;
        match answer.trim().to_lowercase().as_str() {
            "1" | "a" | "approve" => return Ok(ValidationDecision::approve()),
            "2" | "r" | "reject" => {
                let feedback = read_line("Feedback for regeneration: ")?;
                let feedback = feedback.trim();
                return Ok(ValidationDecision::reject(
                    (!feedback.is_empty()).then(|| feedback.to_string()),
                ));
            }
            "3" | "e" | "edit" => {
                return Ok(ValidationDecision::edit(prompt_for_edits(
                    &ctx.seed_keywords,
                )?))
            }
            _ => println!("Invalid choice. Enter 1, 2, 3, or approve/reject/edit."),
        }
    }
}

fn prompt_for_edits(current: &SeedKeywords) -> Result<SeedKeywords, GateError> {
    println!("\nManual editing mode");
    println!("Press Enter to keep the current list, or type new keywords separated by commas.");
    Ok(SeedKeywords {
        problem_purpose: edit_category("Problem / purpose", &current.problem_purpose)?,
        object_system: edit_category("Object / system", &current.object_system)?,
        environment_field: edit_category("Environment / field", &current.environment_field)?,
    })
}

fn edit_category(label: &str, current: &[String]) -> Result<Vec<String>, GateError> {
    println!("\n{}: [{}]", label, current.join(", "));
    let input = read_line(&format!("New {} (or Enter to keep): ", label))?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(current.to_vec());
    }
    Ok(trimmed
        .split(',')
        .map(|keyword| keyword.trim().to_string())
        .filter(|keyword| !keyword.is_empty())
        .collect())
}

fn read_line(prompt: &str) -> Result<String, GateError> {
    print!("{}", prompt);
    io::stdout()
        .flush()
        .map_err(|err| GateError::HandlerUnavailable(err.to_string()))?;
    let mut buffer = String::new();
    let read = io::stdin()
        .read_line(&mut buffer)
        .map_err(|err| GateError::HandlerUnavailable(err.to_string()))?;
    if read == 0 {
        return Err(GateError::HandlerUnavailable("stdin closed".to_string()));
    }
    Ok(buffer)
}

fn resolve_input(text: Option<String>, file: Option<PathBuf>) -> Result<String, String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|err| format!("cannot read '{}': {}", path.display(), err)),
        (None, None) => Err("provide invention text or --file".to_string()),
    }
}

fn load_config(path: Option<PathBuf>, max_retries: Option<u32>) -> Result<PipelineConfig, String> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_yaml_file(&path)
            .map_err(|err| format!("cannot load config: {}", err))?,
        None => PipelineConfig::default(),
    };
    if let Some(limit) = max_retries {
        config = config.with_max_validation_retries(limit);
    }
    Ok(config)
}

fn print_report(status: &RunStatus, json: bool) {
    if json {
        match serde_json::to_string_pretty(&status.state) {
            Ok(rendered) => println!("{}", rendered),
            Err(err) => eprintln!("Error rendering state: {}", err),
        }
        return;
    }

    let state = &status.state;
    if let Some(matrix) = &state.concept_matrix {
        println!("\nConcept matrix:");
        println!("  Problem / purpose: {}", matrix.problem_purpose);
        println!("  Object / system: {}", matrix.object_system);
        println!("  Environment / field: {}", matrix.environment_field);
    }
    if let Some(summary) = &state.summary_text {
        println!("\nSummary: {}", summary);
    }
    if !state.ipc_codes.is_empty() {
        println!("\nIPC classifications:");
        for prediction in &state.ipc_codes {
            println!("  {} ({:.2})", prediction.category, prediction.score);
        }
    }
    if !state.expanded_keywords.is_empty() {
        println!("\nExpanded keywords:");
        for (keyword, synonyms) in &state.expanded_keywords {
            println!("  {}: {}", keyword, synonyms.join(", "));
        }
    }
    if !state.queries.is_empty() {
        println!("\nSearch queries:");
        for query in &state.queries {
            println!("  {}", query);
        }
    }
    if !state.candidate_documents.is_empty() {
        println!("\nCandidate documents:");
        for doc in &state.candidate_documents {
            println!(
                "  {} (scenario: {:.3}, problem: {:.3})",
                doc.url, doc.scenario_score, doc.problem_score
            );
        }
    }
}

async fn cmd_extract(
    text: Option<String>,
    file: Option<PathBuf>,
    config_path: Option<PathBuf>,
    auto_approve: bool,
    max_retries: Option<u32>,
    json: bool,
) -> i32 {
    let input = match resolve_input(text, file) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };
    let config = match load_config(config_path, max_retries) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };

    let handler: Arc<dyn DecisionHandler> = if auto_approve {
        Arc::new(ScriptedDecisions::repeating(ValidationDecision::approve()))
    } else {
        Arc::new(InteractiveHandler)
    };
    let orchestrator =
        Orchestrator::new(Collaborators::stubbed(), config).with_decision_handler(handler);

    let status = orchestrator.start(&input).await;
    match &status.status {
        RunState::Done => {
            print_report(&status, json);
            0
        }
        RunState::RetryLimitExceeded => {
            eprintln!(
                "Could not reach approval within {} rejections",
                status.rejections
            );
            1
        }
        RunState::Cancelled => {
            eprintln!("Run cancelled");
            1
        }
        RunState::Failed { diagnostic } => {
            eprintln!("Run failed: {}", diagnostic);
            1
        }
        other => {
            eprintln!("Run ended unexpectedly in state {:?}", other);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            text,
            file,
            config,
            auto_approve,
            max_retries,
            json,
            verbose,
        } => {
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            }
            let code = cmd_extract(text, file, config, auto_approve, max_retries, json).await;
            std::process::exit(code);
        }
    }
}
