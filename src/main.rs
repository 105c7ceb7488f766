use clap::Parser;
use docrag::{
    DataDir,
    Engine,
    EngineConfig,
    Error,
    Result,
    SettingsDb,
    ingestion::ProgressError,
};
use kdam::{Bar, BarExt, tqdm};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, QueryArgs, SearchArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCRAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Config { action } => {
            let settings = SettingsDb::open(&data_dir.settings_db())?;
            cmd_config(&settings, action)?;
        }
        Command::Rebuild => {
            let engine = Engine::open(&data_dir)?;
            let mut progress = progress_bar("Rebuilding");
            let report = engine.build(true, &mut progress)?;
            eprintln!();
            eprintln!(
                "Indexed {} documents: {} chunks ({} new)",
                report.processed, report.chunks_prepared, report.chunks_added
            );
            engine.close();
        }
        Command::Sync => {
            let engine = Engine::open(&data_dir)?;
            let mut progress = progress_bar("Syncing");
            let report = engine.update(&mut progress)?;
            if report.processed == 0 {
                eprintln!("Index is up to date.");
            } else {
                eprintln!();
                eprintln!(
                    "Updated {} of {} documents: {} new chunks",
                    report.processed, report.documents, report.chunks_added
                );
            }
            for path in &report.deleted {
                eprintln!("  removed from corpus: {path}");
            }
            engine.close();
        }
        Command::Query(args) => {
            let engine = Engine::open(&data_dir)?;
            cmd_query(&engine, &args)?;
            engine.close();
        }
        Command::Search(args) => {
            let engine = Engine::open(&data_dir)?;
            cmd_search(&engine, &args)?;
            engine.close();
        }
        Command::Status(args) => {
            let engine = Engine::open(&data_dir)?;
            let status = engine.status()?;
            if args.json {
                println!("{}", serde_json::to_string(&status)?);
            } else {
                println!("Data directory: {}", data_dir.root().display());
                println!("Model: {}", status.embedding_model);
                println!("Corpus: {}", status.documents_path.display());
                println!("Indexed documents: {}", status.indexed_documents);
                println!("Indexed chunks: {}", status.indexed_chunks);
                match (status.pending, &status.deleted) {
                    (Some(pending), Some(deleted)) => {
                        println!("Pending: {pending}");
                        println!("Removed: {}", deleted.len());
                    }
                    _ => println!("Corpus directory not found."),
                }
                if status.stale_documents > 0 {
                    println!(
                        "Stale chunks possible: {} edited documents since \
                         the last rebuild (run `docrag rebuild`)",
                        status.stale_documents
                    );
                }
            }
            engine.close();
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

/// Progress callback that drives a terminal bar, created on the first
/// report once the total is known.
fn progress_bar(
    desc: &'static str,
) -> impl FnMut(usize, usize) -> std::result::Result<(), ProgressError> {
    let mut bar: Option<Bar> = None;
    move |done, total| {
        let pb = bar.get_or_insert_with(|| {
            tqdm!(total = total, desc = desc, unit = " chunks")
        });
        pb.update_to(done)?;
        Ok(())
    }
}

fn cmd_config(settings: &SettingsDb, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let config = EngineConfig::load(settings)?;
            let value = serde_json::to_value(&config)?;
            if json {
                println!("{value}");
            } else {
                for key in docrag::config::KEYS {
                    match &value[*key] {
                        serde_json::Value::String(s) => println!("{key} = {s}"),
                        other => println!("{key} = {other}"),
                    }
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = EngineConfig::load(settings)?;
            config.set(&key, &value)?;
            config.validate()?;
            settings.set_setting(&key, value.trim())?;
            println!("Set {key} = {}", value.trim());
        }
        ConfigAction::Clear { key } => {
            if !settings.remove_setting(&key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
            println!("Cleared {key}");
        }
    }
    Ok(())
}

fn cmd_query(engine: &Engine, args: &QueryArgs) -> Result<()> {
    let candidates = args.candidates.unwrap_or(engine.config().max_candidates);
    let retrieval = engine.retrieve_with(&args.query, candidates);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&retrieval)?);
        return Ok(());
    }

    println!("{}", retrieval.context);
    if retrieval.weak && !retrieval.is_empty() {
        eprintln!("Warning: the retrieved context looks thin or generic.");
    }

    if args.debug {
        let debug = &retrieval.debug;
        eprintln!("\n--- query (pivot) ---\n{}", debug.query_translated);
        eprintln!("\n--- ranked candidates ---");
        for (rank, candidate) in retrieval.ranked.iter().enumerate() {
            eprintln!(
                "{:>3}. {:.4}  (recall #{})  {}",
                rank + 1,
                candidate.score,
                candidate.recall_rank + 1,
                candidate.chunk.source
            );
        }
        eprintln!("\n--- context (pivot) ---\n{}", debug.context_translated);
        eprintln!("\n--- normalized ---\n{}", debug.normalized);
    }
    Ok(())
}

fn cmd_search(engine: &Engine, args: &SearchArgs) -> Result<()> {
    let count = args.count.unwrap_or(engine.config().similarity_k);
    let hits = engine.search(&args.query, count)?;

    if args.json {
        println!("{}", serde_json::to_string(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let preview: String = hit
            .chunk
            .text
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();
        match &hit.chunk.section {
            Some(section) => println!(
                "{:>3}. {:.4}  {} [{section}]",
                i + 1,
                hit.score,
                hit.chunk.source
            ),
            None => {
                println!("{:>3}. {:.4}  {}", i + 1, hit.score, hit.chunk.source)
            }
        }
        println!("     {preview}");
    }
    Ok(())
}
