//! Mastery loop CLI
//!
//! Drives the mastery verification loop from the terminal: an interactive
//! session, a scripted dry run against the live content service, and a
//! web-search probe.

mod learner;

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mastery_core::{
    run_to_mastery, AnswerSet, Config, EventBroadcaster, ExerciseBattery, LessonContext,
    MasteryLoop, MasteryOutcome, Verdict,
};
use mastery_services::{
    build_lesson_queries, build_structure_queries, current_year, ChatCompletionsClient,
    SearchResult, WebSearchClient,
};
use tracing_subscriber::EnvFilter;

use crate::learner::TerminalLearner;

/// Explanation submitted by the dry run.
const DRY_RUN_EXPLANATION: &str = "I don't know, magic?";

/// Characters of remediation shown by the dry run.
const REMEDIATION_PREVIEW_CHARS: usize = 100;

/// Mastery Loop - test, grade, remediate, repeat
///
/// Turns a lesson into exercises, grades the answers against the lesson's
/// mastery criteria, and re-teaches the gaps until the learner passes.
#[derive(Parser, Debug)]
#[command(name = "mastery")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: mastery.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an interactive mastery session in the terminal
    Run {
        /// Lesson JSON file (default: built-in photosynthesis lesson)
        #[arg(short, long, value_name = "FILE")]
        lesson: Option<String>,

        /// Stop after this many failed attempts (default: no ceiling)
        #[arg(short, long, value_name = "N")]
        max_attempts: Option<u32>,
    },

    /// Build a battery, submit poor answers, and check that they fail
    DryRun {
        /// Lesson JSON file (default: built-in photosynthesis lesson)
        #[arg(short, long, value_name = "FILE")]
        lesson: Option<String>,
    },

    /// Query the web-search service
    Search {
        /// Free-text query
        #[arg(value_name = "QUERY", required_unless_present_any = ["lesson_title", "subject"])]
        query: Option<String>,

        /// Build lesson queries from this title instead
        #[arg(long, value_name = "TITLE", conflicts_with_all = ["query", "subject"])]
        lesson_title: Option<String>,

        /// Build course-structure queries for this subject instead
        #[arg(long, value_name = "SUBJECT", conflicts_with = "query")]
        subject: Option<String>,

        /// Results per query (default: search.resultCount)
        #[arg(short = 'n', long, value_name = "N")]
        count: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    let result = match load_config(args.config.as_deref()) {
        Ok(config) => match args.command {
            Command::Run {
                lesson,
                max_attempts,
            } => run_session(&config, lesson.as_deref(), max_attempts).await,
            Command::DryRun { lesson } => run_dry_run(&config, lesson.as_deref()).await,
            Command::Search {
                query,
                lesson_title,
                subject,
                count,
            } => match search_queries(query, lesson_title, subject) {
                Ok(queries) => run_search(&config, &queries, count).await,
                Err(e) => Err(e),
            },
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs an interactive session until the learner passes or hits the ceiling.
async fn run_session(
    config: &Config,
    lesson_path: Option<&str>,
    max_attempts: Option<u32>,
) -> anyhow::Result<ExitCode> {
    let lesson = load_lesson(lesson_path)?;
    let max_attempts = max_attempts.or(config.max_attempts);
    if max_attempts == Some(0) {
        anyhow::bail!("--max-attempts must be at least 1");
    }
    print_config(config, max_attempts);

    let client = ChatCompletionsClient::from_env(config)?;
    let broadcaster = EventBroadcaster::default();
    spawn_event_logger(&broadcaster);
    let mastery = MasteryLoop::new(client).with_events(broadcaster);

    print_lesson(&lesson);
    let mut learner = TerminalLearner::default();
    learner
        .ask("Press Enter when you are done reading...")
        .await?;

    println!();
    println!("Generating exercises...");
    let outcome = run_to_mastery(&mastery, lesson, &mut learner, max_attempts).await?;

    print_outcome(&outcome);
    Ok(if outcome.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Exercises every collaborator call once with answers that must fail.
async fn run_dry_run(config: &Config, lesson_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let lesson = load_lesson(lesson_path)?;
    let client = ChatCompletionsClient::from_env(config)?;
    let mastery = MasteryLoop::new(client);

    println!("Starting dry run...");
    println!();
    println!("1. Generating exercises...");
    let (mut state, battery) = mastery.start_session(lesson).await?;
    let slots: Vec<String> = battery.slots().iter().map(ToString::to_string).collect();
    println!("   Slots: {}", slots.join(", "));
    println!("   Items: {}", battery.item_count());

    println!();
    println!("2. Submitting poor answers...");
    let answers = poor_answers(&battery);

    println!();
    println!("3. Evaluating...");
    let verdict = mastery.submit_answers(&mut state, &answers).await?;
    print_verdict(&verdict);

    if verdict.passed() {
        anyhow::bail!(
            "learner passed with deliberately poor answers\n\nSuggestion: Check the evaluator prompt and model"
        );
    }

    println!();
    println!("4. Remediation...");
    if let Some(remediation) = mastery.get_remediation(&state)? {
        let preview: String = remediation
            .markdown
            .chars()
            .take(REMEDIATION_PREVIEW_CHARS)
            .collect();
        println!("   {preview}...");
    }

    println!();
    println!("Dry run complete");
    Ok(ExitCode::SUCCESS)
}

/// Expands the search arguments into queries.
fn search_queries(
    query: Option<String>,
    lesson_title: Option<String>,
    subject: Option<String>,
) -> anyhow::Result<Vec<String>> {
    match (query, lesson_title, subject) {
        (_, Some(title), _) => Ok(build_lesson_queries(&title)),
        (_, None, Some(subject)) => Ok(build_structure_queries(&subject, current_year())),
        (Some(query), None, None) => Ok(vec![query]),
        (None, None, None) => anyhow::bail!("provide a QUERY, --lesson-title or --subject"),
    }
}

/// Runs the given queries and prints the combined results.
async fn run_search(
    config: &Config,
    queries: &[String],
    count: Option<u32>,
) -> anyhow::Result<ExitCode> {
    let client = WebSearchClient::from_env(&config.search)?;
    if !client.has_credentials() {
        eprintln!("Warning: YDC_API_KEY is not set; searches will return no results");
    }
    let count = count.unwrap_or(config.search.result_count);

    tracing::debug!(queries = ?queries, count, "Searching");

    let results = client.search_all(queries, count).await;
    print_search_results(&results);
    Ok(ExitCode::SUCCESS)
}

/// Wrong first answer, nothing else but a non-explanation.
fn poor_answers(battery: &ExerciseBattery) -> AnswerSet {
    let first_wrong = battery
        .multiple_choice
        .first()
        .and_then(|q| (q.correct_option_index + 1).checked_rem(q.options.len()));
    AnswerSet::new()
        .with_multiple_choice(vec![first_wrong])
        .with_explanation(DRY_RUN_EXPLANATION)
}

/// Loads configuration from the given path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the lesson file, or the built-in sample.
fn load_lesson(path: Option<&str>) -> anyhow::Result<LessonContext> {
    match path {
        Some(path) => {
            tracing::info!(lesson = %path, "Loading lesson");
            LessonContext::load(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Ok(LessonContext::sample()),
    }
}

/// Logs loop events at debug level.
fn spawn_event_logger(broadcaster: &EventBroadcaster) {
    let mut receiver = broadcaster.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(event = event.event_name(), payload = %json, "Loop event"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize loop event"),
            }
        }
    });
}

fn print_config(config: &Config, max_attempts: Option<u32>) {
    println!("Configuration loaded:");
    println!("  Model: {}", config.model);
    println!("  Endpoint: {}", config.base_url);
    println!("  Timeout: {}s", config.request_timeout_secs);
    match max_attempts {
        Some(max) => println!("  Max attempts: {max}"),
        None => println!("  Max attempts: none"),
    }
}

fn print_lesson(lesson: &LessonContext) {
    println!();
    println!("LESSON: {}", lesson.title);
    println!("-----------------------------------");
    println!("{}", lesson.content_text);
    println!("-----------------------------------");
    println!("You will be checked on:");
    for criterion in &lesson.mastery_criteria {
        println!("  - {criterion}");
    }
    println!();
}

fn print_verdict(verdict: &Verdict) {
    if verdict.passed() {
        println!("   Verdict: PASSED");
    } else {
        println!("   Verdict: FAILED");
        for gap in verdict.gaps() {
            println!("   - {gap}");
        }
    }
}

fn print_outcome(outcome: &MasteryOutcome) {
    println!();
    println!("==========================================");
    if outcome.passed {
        println!("Mastered in {} attempt(s)", outcome.attempts);
    } else {
        println!("Not mastered after {} attempt(s)", outcome.attempts);
        if let Some(reason) = &outcome.aborted_reason {
            println!("Stopped: {reason}");
        }
        println!("Remaining gaps:");
        for gap in outcome.verdict.gaps() {
            println!("  - {gap}");
        }
    }
    for record in &outcome.history {
        let result = if record.verdict.passed() {
            "passed"
        } else {
            "failed"
        };
        println!(
            "  Attempt {}: {result} ({} gaps, {}s)",
            record.attempt,
            record.verdict.gaps().len(),
            (record.evaluated_at - record.started_at).num_seconds()
        );
    }
    println!("==========================================");
}

fn print_search_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}. {}", i + 1, result.title);
        println!("   {}", result.url);
        for snippet in &result.snippets {
            println!("   > {snippet}");
        }
    }
}
