use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use doc_query_service::{
    FileStatus, Orchestrator, Phase, RawFile, ServiceConfig, WorkspaceState,
    clipboard::SystemClipboard,
    config::{EngineKind, PipelineTiming, build_engine, parse_engine},
    presenter::{DecisionView, ExportArtifact, NotificationVariant, copy_raw_response},
    query::{QueryDraft, SAMPLE_QUERIES},
    steps::PipelineStage,
    telemetry::init_cli_tracing,
    upload::{extension_of, format_file_size, mime_for_extension},
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "docquery", about = "Ask a question about policy documents and get a decision")]
struct Cli {
    /// Log pipeline activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the sample queries
    Samples,
    /// Run one query through the decision pipeline
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Query text, or `@N` to use sample N (1-based)
    #[arg(short, long)]
    query: String,

    /// Document to attach; may be repeated
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Write the analysis export into this directory
    #[arg(long)]
    export: Option<PathBuf>,

    /// Copy the raw response to the system clipboard
    #[arg(long)]
    copy: bool,

    /// Decision engine; defaults to DECISION_ENGINE or keyword
    #[arg(long, value_enum)]
    engine: Option<EngineArg>,

    /// Base URL of the remote reasoning service
    #[arg(long)]
    engine_url: Option<String>,

    /// Skip upload and stage pacing delays
    #[arg(long)]
    fast: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Keyword,
    Remote,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose);

    match cli.command {
        Command::Samples => {
            for (i, sample) in SAMPLE_QUERIES.iter().enumerate() {
                println!("{}. {}", i + 1, sample);
            }
            Ok(())
        }
        Command::Analyze(args) => analyze(args).await,
    }
}

fn resolve_query(raw: &str) -> Result<String> {
    let mut draft = QueryDraft::new(raw);
    if let Some(index) = raw.strip_prefix('@') {
        let n: usize = index
            .parse()
            .with_context(|| format!("`{raw}` is not a sample number"))?;
        if !n.checked_sub(1).is_some_and(|i| draft.use_sample(i)) {
            bail!("there are {} samples, got {n}", SAMPLE_QUERIES.len());
        }
    }
    Ok(draft.submission()?)
}

/// Describe a local file for upload; an unreadable one comes back with the reason.
fn raw_file(path: &Path) -> (RawFile, Option<String>) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = extension_of(&name)
        .and_then(|ext| mime_for_extension(&ext))
        .unwrap_or_default();

    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => (RawFile::new(name, metadata.len(), mime_type), None),
        Ok(_) => (RawFile::new(name, 0, mime_type), Some("not a regular file".to_string())),
        Err(e) => (RawFile::new(name, 0, mime_type), Some(e.to_string())),
    }
}

fn engine_kind(args: &AnalyzeArgs, config: &ServiceConfig) -> Result<EngineKind> {
    let kind = match args.engine {
        Some(EngineArg::Keyword) => return Ok(EngineKind::Keyword),
        Some(EngineArg::Remote) => Some("remote"),
        None if args.engine_url.is_some() => Some("remote"),
        None => return Ok(config.engine.clone()),
    };
    let url = args.engine_url.clone().or_else(|| match &config.engine {
        EngineKind::Remote { url } => Some(url.clone()),
        EngineKind::Keyword => std::env::var("DECISION_ENGINE_URL").ok(),
    });
    Ok(parse_engine(kind, url)?)
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let timing = if args.fast {
        PipelineTiming {
            stage_timeout: config.timing.stage_timeout,
            ..PipelineTiming::immediate()
        }
    } else {
        config.timing
    };
    let engine = build_engine(&engine_kind(&args, &config)?, &timing)?;
    let orchestrator = Orchestrator::new(engine, timing);
    let query = resolve_query(&args.query)?;

    if !args.files.is_empty() {
        let mut read = Vec::with_capacity(args.files.len());
        for path in &args.files {
            let (file, reason) = raw_file(path);
            if let Some(reason) = &reason {
                eprintln!("failed {}: {}", path.display(), reason);
            }
            read.push((file, reason));
        }

        let acceptance = orchestrator.upload_read(read);
        for rejected in &acceptance.rejected {
            eprintln!("skipped {}: {}", rejected.name, rejected.reason);
        }
        for file in &acceptance.accepted {
            if file.status == FileStatus::Uploading {
                println!("uploading {} ({})", file.name, format_file_size(file.size));
            }
        }
        orchestrator
            .wait_for(|state| !state.has_pending_uploads())
            .await;
    }

    println!("engine: {}", orchestrator.engine_name());
    println!("query:  {query}");
    println!();

    let generation = orchestrator.submit_query(&query)?;
    let state = follow_progress(&orchestrator, generation).await;

    match state.phase {
        Phase::Complete => {}
        Phase::Failed => {
            let failure = state
                .failure
                .ok_or_else(|| anyhow!("analysis failed without a reason"))?;
            bail!("analysis failed at {}: {}", failure.stage.title(), failure.message);
        }
        phase => bail!("analysis ended unexpectedly in {phase:?}"),
    }

    let decision = state
        .result
        .ok_or_else(|| anyhow!("analysis completed without a decision"))?;
    print_view(&DecisionView::from(&decision));

    if let Some(dir) = &args.export {
        let artifact = ExportArtifact::new(query.clone(), &decision);
        let path = artifact.write_to_dir(dir)?;
        println!("exported to {}", path.display());
    }

    if args.copy {
        let notification = copy_raw_response(&decision, &SystemClipboard);
        match notification.variant {
            NotificationVariant::Destructive => {
                eprintln!("{}: {}", notification.title, notification.description)
            }
            NotificationVariant::Default => {
                println!("{}: {}", notification.title, notification.description)
            }
        }
    }

    Ok(())
}

/// Print each stage as it starts and return the settled state.
async fn follow_progress(orchestrator: &Orchestrator, generation: u64) -> WorkspaceState {
    let mut rx = orchestrator.subscribe();
    let mut announced: Option<usize> = None;

    loop {
        let state = rx.borrow_and_update().clone();
        if state.generation != generation {
            return state;
        }
        if state.is_processing() && announced != Some(state.step) {
            if let Some(stage) = PipelineStage::from_index(state.step) {
                let percent = state.step_view().map(|v| v.progress_percent).unwrap_or(0);
                println!(
                    "[{}/{}] {:<20} {:>3}%  {}",
                    stage.index() + 1,
                    PipelineStage::COUNT,
                    stage.title(),
                    percent,
                    stage.description()
                );
            }
            announced = Some(state.step);
        }
        if !state.is_processing() {
            return state;
        }
        if rx.changed().await.is_err() {
            return orchestrator.snapshot();
        }
    }
}

fn print_view(view: &DecisionView) {
    println!();
    println!("decision:   {}", view.decision.label);
    if let Some(amount) = &view.amount {
        println!("amount:     {amount}");
    }
    println!("confidence: {}", view.confidence.label);
    println!();
    println!("{}", view.justification);
    println!();

    println!("extracted entities:");
    for row in &view.entities {
        println!("  {:<16} {}", row.label, row.value);
    }
    println!();

    println!("relevant clauses:");
    for clause in &view.clauses {
        println!("  [{}] {} ({})", clause.relevance.label, clause.source, clause.id);
        println!("      {}", clause.text);
    }
    println!();
}
