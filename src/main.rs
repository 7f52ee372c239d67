use lexground::assistant::{
    index_status, ocr_from_config, open_index, rebuild_index, Assistant, Reply, TurnOptions,
    TurnOutcome,
};
use lexground::chunking::LegalChunker;
use lexground::cli::{Cli, Commands, ConfigAction, CorpusAction, FactsAction, IndexAction};
use lexground::config::Config;
use lexground::embedding::load_provider;
use lexground::error::{LexgroundError, Result};
use lexground::grounding::ImageInput;
use lexground::index::{IndexError, IndexStatus};
use lexground::ingest::{base_name, image_mime_type, DocumentLoader};
use lexground::retrieval::FocusMode;
use lexground::storage::StorageManager;
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| LexgroundError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })?;

    // Handle commands
    match cli.command {
        Commands::Index { action } => {
            let config = load_config(cli.config, cli.profile)?;
            runtime.block_on(cmd_index(&config, action))?;
        }
        Commands::Corpus { action } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_corpus(&config, action)?;
        }
        Commands::Ask {
            question,
            focus,
            only,
            image,
            upload,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            runtime.block_on(cmd_ask(config, &question, focus, only, image, upload, json))?;
        }
        Commands::Chat {
            focus,
            only,
            upload,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            runtime.block_on(cmd_chat(config, focus, only, upload))?;
        }
        Commands::Facts { action } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_facts(&config, action)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("lexground=debug")
    } else {
        EnvFilter::try_from_env("LEXGROUND_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("lexground=info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_index(config: &Config, action: IndexAction) -> Result<()> {
    let storage = StorageManager::new(&config.storage)?;

    match action {
        IndexAction::Status => {
            match index_status(config, &storage)? {
                IndexStatus::Missing => {
                    println!("✗ No index at {}", storage.index_path().display());
                    println!("  Run 'lexground index build' to create it");
                }
                IndexStatus::Fresh { chunks, built_at } => {
                    println!("✓ Index is up to date");
                    println!("  Chunks: {}", chunks);
                    println!("  Built:  {}", built_at);
                }
                IndexStatus::Stale { chunks, built_at } => {
                    println!("! Corpus changed since the index was built");
                    println!("  Chunks: {}", chunks);
                    println!("  Built:  {}", built_at);
                    println!("  Run 'lexground index rebuild' to refresh it");
                }
                IndexStatus::ModelChanged { stored } => {
                    println!(
                        "! Index was built with '{}' but '{}' is configured",
                        stored, config.embedding.model
                    );
                    println!("  Run 'lexground index rebuild' to refresh it");
                }
            }
            return Ok(());
        }
        IndexAction::Build | IndexAction::Rebuild => {}
    }

    let provider = load_provider(&config.embedding).map_err(IndexError::from)?;
    let loader = DocumentLoader::new(ocr_from_config(config));
    let chunker = LegalChunker::from_config(&config.chunking);

    let index = match action {
        IndexAction::Rebuild => rebuild_index(config, &storage, provider, &loader, &chunker).await?,
        _ => open_index(config, &storage, provider, &loader, &chunker).await?,
    };

    println!("✓ Index ready at {}", storage.index_path().display());
    println!("  Chunks: {}", index.len());
    println!("  Files:  {}", index.sources().count());
    println!("  Model:  {}", index.meta().embedding_model);
    Ok(())
}

fn cmd_corpus(config: &Config, action: CorpusAction) -> Result<()> {
    let storage = StorageManager::new(&config.storage)?;

    match action {
        CorpusAction::Add { files } => {
            for path in files {
                let bytes = read_file(&path)?;
                let name = path.to_string_lossy().to_string();
                let target = storage.save_to_corpus(&name, &bytes)?;
                println!("✓ Added {}", target.display());
            }
            println!("  Index invalidated; it is rebuilt on next use");
        }
        CorpusAction::Remove { name } => {
            if storage.remove_from_corpus(&name)? {
                println!("✓ Removed {}", name);
                println!("  Index invalidated; it is rebuilt on next use");
            } else {
                println!("✗ No corpus file named {}", name);
            }
        }
        CorpusAction::List => {
            let entries = storage.list_corpus()?;
            if entries.is_empty() {
                println!("Corpus at {} is empty", storage.corpus_dir().display());
                return Ok(());
            }

            println!("Corpus ({}):", storage.corpus_dir().display());
            for entry in entries {
                println!(
                    "  {:<40} {:>10}",
                    entry.name,
                    StorageManager::format_size(entry.size_bytes)
                );
            }
        }
    }

    Ok(())
}

fn turn_options(focus: Vec<String>, only: bool, image: Option<PathBuf>) -> Result<TurnOptions> {
    let image = match image {
        Some(path) => {
            let name = base_name(&path.to_string_lossy());
            let extension = name.rsplit('.').next().unwrap_or_default().to_lowercase();
            let mime_type = image_mime_type(&extension).ok_or_else(|| {
                LexgroundError::Config(format!("Unsupported image type: {}", path.display()))
            })?;
            Some(ImageInput {
                mime_type: mime_type.to_string(),
                data: read_file(&path)?,
            })
        }
        None => None,
    };

    Ok(TurnOptions {
        focus: focus.iter().map(|f| base_name(f)).collect::<BTreeSet<_>>(),
        focus_mode: if only {
            FocusMode::Restrict
        } else {
            FocusMode::Prioritize
        },
        image,
    })
}

async fn upload_session_documents(assistant: &Assistant, uploads: Vec<PathBuf>) -> Result<()> {
    if uploads.is_empty() {
        return Ok(());
    }

    let mut files = Vec::with_capacity(uploads.len());
    for path in uploads {
        files.push((path.to_string_lossy().to_string(), read_file(&path)?));
    }

    let report = assistant.add_session_documents(&files).await?;
    println!(
        "✓ Added {} session chunks ({} skipped)",
        report.added, report.skipped
    );
    Ok(())
}

async fn cmd_ask(
    config: Config,
    question: &str,
    focus: Vec<String>,
    only: bool,
    image: Option<PathBuf>,
    upload: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    let options = turn_options(focus, only, image)?;
    let assistant = Assistant::from_config(config).await?;
    upload_session_documents(&assistant, upload).await?;

    let mut session = assistant.new_session()?;
    let turn = assistant.ask(&mut session, question, &options).await?;

    if json {
        let value = serde_json::json!({
            "answer": turn.outcome,
            "offenders": turn.offenders(),
            "sources": turn.sources(),
        });
        let text = serde_json::to_string_pretty(&value).map_err(|e| LexgroundError::Json {
            source: e,
            context: "Failed to serialize answer".to_string(),
        })?;
        println!("{}", text);
    } else {
        print_turn(&turn);
    }
    Ok(())
}

async fn cmd_chat(
    config: Config,
    focus: Vec<String>,
    only: bool,
    upload: Vec<PathBuf>,
) -> Result<()> {
    let options = turn_options(focus, only, None)?;
    let assistant = Assistant::from_config(config).await?;
    upload_session_documents(&assistant, upload).await?;

    let capabilities = assistant.capabilities().await;
    let mut session = assistant.new_session()?;

    println!("lexground chat ({} chunks indexed)", capabilities.chunks);
    println!(
        "  Lexical: {}  Reranker: {}  OCR: {}",
        on_off(capabilities.lexical),
        capabilities.reranker,
        on_off(capabilities.ocr)
    );
    println!("  remember:/memo:/role: update memory, 'show snippet [#n]' shows evidence, 'exit' quits");

    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush().map_err(|e| LexgroundError::Io {
            source: e,
            context: "Failed to flush stdout".to_string(),
        })?;

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).map_err(|e| LexgroundError::Io {
            source: e,
            context: "Failed to read input".to_string(),
        })?;
        let input = line.trim();
        if read == 0 || input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        match assistant.handle(&mut session, input, &options).await {
            Ok(Reply::Notice(notice)) => println!("{}", notice),
            Ok(Reply::Snippet(item)) => println!("{}", item.render()),
            Ok(Reply::Answer(turn)) => print_turn(&turn),
            Err(e) if e.is_retryable() => println!("✗ {} (try again)", e),
            Err(e) => println!("✗ {}", e),
        }
    }

    tracing::debug!(
        "Session {} ended after {} turns",
        session.id(),
        session.turn_count()
    );
    Ok(())
}

fn print_turn(turn: &TurnOutcome) {
    println!("{}", turn.answer());

    if !turn.offenders().is_empty() {
        let shown: Vec<&str> = turn.offenders().iter().take(3).map(String::as_str).collect();
        println!("\n⚠ Sentences without citations: {}", shown.join(" | "));
    }

    if !turn.sources().is_empty() {
        println!("\nSources used:");
        for item in turn.sources() {
            println!("  {} -> {}", item.tag, item.label());
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn cmd_facts(config: &Config, action: FactsAction) -> Result<()> {
    let storage = StorageManager::new(&config.storage)?;

    match action {
        FactsAction::List => {
            let facts = storage.open_facts()?.load_all()?;
            if facts.is_empty() {
                println!("No stored facts. Add one in chat with 'remember: <fact>'");
                return Ok(());
            }
            for (i, fact) in facts.iter().enumerate() {
                println!("  {}. {}", i + 1, fact);
            }
        }
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = toml::Value::try_from(&config)?;

            let shown = match section {
                Some(name) => value.get(&name).cloned().ok_or_else(|| {
                    LexgroundError::Config(format!("Unknown configuration section: {}", name))
                })?,
                None => value,
            };
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LexgroundError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let mut config = Config::default();
            config.relocate(Config::default_data_dir()?);
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Data directory: {}", config.storage.data_dir.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lexground config init' to create one."
        );
        let mut config = Config::default();
        config.relocate(Config::default_data_dir()?);
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        config
    } else if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)?
    } else {
        Config::load(&path)?
    };

    expand_storage_paths(&mut config)?;
    Ok(config)
}

fn expand_storage_paths(config: &mut Config) -> Result<()> {
    let storage = &mut config.storage;
    storage.data_dir = expand_path(&storage.data_dir)?;
    storage.corpus_dir = expand_path(&storage.corpus_dir)?;
    storage.index_path = expand_path(&storage.index_path)?;
    storage.facts_path = expand_path(&storage.facts_path)?;
    Ok(())
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| LexgroundError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LexgroundError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| LexgroundError::Io {
        source: e,
        context: format!("Failed to read {}", path.display()),
    })
}
