mod console;

use anyhow::{ensure, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use console::{print_answer, print_citations, print_inspection, ConsoleObserver};
use diabetes_rag_core::{
    inspect_corpus, load_documents, BuildOptions, ChatCompletionSynthesizer, CorpusSettings,
    Embedder, IndexBuilder, IndexOrigin, LoadOptions, QueryEngine, ReadyIndex, ResponseMode,
    Settings, TextNormalizer, DEFAULT_EXCERPT_CHARS,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "diabetes-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder with the source documents.
    #[arg(long, global = true, env = "DOCUMENTS_DIR")]
    documents_dir: Option<PathBuf>,

    /// Folder holding the persisted index.
    #[arg(long, global = true, env = "STORAGE_DIR")]
    storage_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Load the persisted index, or build it from the documents folder.
    Index {
        /// Rebuild even when a persisted index exists.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Retrieve the passages closest to a query.
    Search {
        #[arg(long)]
        query: String,
        /// Number of passages to return.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question from the indexed documents. Without --question, read
    /// questions from stdin until `exit`.
    Ask {
        #[arg(long)]
        question: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
        /// compact or refine.
        #[arg(long)]
        mode: Option<ResponseMode>,
    },
    /// Show what cleaning does to a corpus and flag likely problems.
    Inspect {
        /// Documents folder or single file. Defaults to the documents folder.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Print the start of every document before and after cleaning.
        #[arg(long, default_value_t = false)]
        preview: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "diabetes-rag boot"
    );

    // Inspection only reads documents, so it must work without embedding credentials.
    if let Command::Inspect { path, preview } = &cli.command {
        let mut corpus = CorpusSettings::from_env().context("invalid configuration")?;
        if let Some(path) = path.clone().or_else(|| cli.documents_dir.clone()) {
            corpus.documents_dir = path;
        }
        return inspect(corpus, *preview).await;
    }

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.documents_dir {
        settings.documents_dir = dir;
    }
    if let Some(dir) = cli.storage_dir {
        settings.storage_dir = dir;
    }

    match cli.command {
        Command::Index { rebuild } => index(&settings, rebuild).await,
        Command::Search { query, top_k } => {
            apply_top_k(&mut settings, top_k)?;
            search(&settings, &query).await
        }
        Command::Ask {
            question,
            top_k,
            mode,
        } => {
            apply_top_k(&mut settings, top_k)?;
            if let Some(mode) = mode {
                settings.response_mode = mode;
            }
            ask(&settings, question).await
        }
        Command::Inspect { .. } => Ok(()),
    }
}

fn apply_top_k(settings: &mut Settings, top_k: Option<usize>) -> anyhow::Result<()> {
    if let Some(top_k) = top_k {
        ensure!(top_k > 0, "--top-k must be at least 1");
        settings.top_k = top_k;
    }
    Ok(())
}

fn embedder(settings: &Settings) -> Arc<dyn Embedder> {
    Arc::new(settings.embedding.clone().into_provider())
}

async fn ready_index(settings: &Settings, embedder: Arc<dyn Embedder>) -> anyhow::Result<ReadyIndex> {
    let ready = IndexBuilder::new(BuildOptions::from_settings(settings), embedder)
        .with_observer(Arc::new(ConsoleObserver::default()))
        .build_or_load()
        .await
        .context("could not prepare the index")?;
    Ok(ready)
}

async fn index(settings: &Settings, rebuild: bool) -> anyhow::Result<()> {
    let builder = IndexBuilder::new(BuildOptions::from_settings(settings), embedder(settings))
        .with_observer(Arc::new(ConsoleObserver::default()));

    let ready = if rebuild {
        ReadyIndex {
            index: builder.build().await.context("index build failed")?,
            origin: IndexOrigin::Built,
        }
    } else {
        builder
            .build_or_load()
            .await
            .context("could not prepare the index")?
    };

    let verb = match ready.origin {
        IndexOrigin::Built => "built",
        IndexOrigin::Loaded => "loaded",
    };
    println!(
        "index {verb}: {} entries, model {}, stored in {}",
        ready.index.len(),
        ready.index.model_identity(),
        settings.storage_dir.display()
    );
    Ok(())
}

async fn search(settings: &Settings, query: &str) -> anyhow::Result<()> {
    let embedder = embedder(settings);
    let ready = ready_index(settings, Arc::clone(&embedder)).await?;
    let engine = QueryEngine::new(ready.index, embedder, settings.top_k)?;

    let result = engine.query(query).await?;
    print_citations(&result.citations(DEFAULT_EXCERPT_CHARS));
    Ok(())
}

async fn ask(settings: &Settings, question: Option<String>) -> anyhow::Result<()> {
    let llm = settings.llm.resolve().context("answer synthesis is not configured")?;
    let embedder = embedder(settings);
    let ready = ready_index(settings, Arc::clone(&embedder)).await?;
    let engine = QueryEngine::new(ready.index, embedder, settings.top_k)?.with_synthesizer(
        Arc::new(ChatCompletionSynthesizer::new(llm)),
        settings.response_mode,
    );

    if let Some(question) = question {
        let answer = engine.answer(&question).await?;
        print_answer(&answer);
        return Ok(());
    }

    println!("\nThe query engine is ready. Ask about diabetes, or type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"\nquestion> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        println!("generating answer...");
        match engine.answer(question).await {
            Ok(answer) => print_answer(&answer),
            Err(error) => eprintln!("query failed: {error}"),
        }
    }

    println!("goodbye");
    Ok(())
}

async fn inspect(corpus: CorpusSettings, preview: bool) -> anyhow::Result<()> {
    let path = corpus.documents_dir.clone();
    println!("analysing documents in {}", path.display());

    let load = LoadOptions {
        recursive: corpus.recursive_load,
    };
    let load_path = path.clone();
    let report = tokio::task::spawn_blocking(move || load_documents(&load_path, load))
        .await?
        .with_context(|| format!("could not load documents from {}", path.display()))?;
    println!(
        "{} document(s) loaded, {} skipped",
        report.documents.len(),
        report.skipped.len()
    );

    let normalizer = TextNormalizer::new(corpus.normalizer)?;
    let inspection = inspect_corpus(&report.documents, &normalizer);
    print_inspection(&inspection, preview);
    Ok(())
}
