use anyhow::Result;
use clap::{Parser, Subcommand};
use qhse_common::{logger, AppConfig};
use qhse_model::TokenVocabulary;
use qhse_vector::{load_qa_pairs, EmbeddingIndex};
use std::path::PathBuf;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        // Fallback to default dotenv behavior
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "qhse")]
#[command(about = "QHSE Expert - safety chatbot and observation analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Recompute the embedding index for the QA corpus
    Embed,

    /// Rebuild the token vocabulary from the QA corpus questions
    Vocab,

    /// Answer one question and exit
    Ask {
        /// Question text
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env before any CLI override is written into the environment
    load_dotenv_from_project_root();

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            data_dir,
        }) => {
            // Override with CLI arguments
            if let Some(host) = &host {
                std::env::set_var("SERVER_HOST", host);
            }
            if let Some(port) = port {
                std::env::set_var("SERVER_PORT", port.to_string());
            }
            if let Some(dir) = &data_dir {
                std::env::set_var("DATA_DIR", dir);
            }

            serve(AppConfig::from_env()?).await?;
        }
        Some(Commands::Embed) => {
            let config = AppConfig::from_env()?;
            logger::setup_console_logging(&config.log_level)?;

            let pairs = load_qa_pairs(config.qa_pairs_path.as_deref())?;
            let embedder = qhse_server::build_embedder(&config, &pairs).await?;
            let index = EmbeddingIndex::build(&pairs, embedder.as_ref()).await?;
            index.save(&config.embeddings_path)?;

            println!(
                "Embedded {} questions with {} (dim {}) -> {}",
                index.entries.len(),
                index.embedding_model,
                index.embedding_dim,
                config.embeddings_path.display()
            );
        }
        Some(Commands::Vocab) => {
            let config = AppConfig::from_env()?;
            logger::setup_console_logging(&config.log_level)?;

            let pairs = load_qa_pairs(config.qa_pairs_path.as_deref())?;
            let vocabulary = TokenVocabulary::build(pairs.iter().map(|p| p.question.as_str()));
            vocabulary.save(&config.vocabulary_path)?;

            println!(
                "Vocabulary of {} tokens -> {}",
                vocabulary.len(),
                config.vocabulary_path.display()
            );
        }
        Some(Commands::Ask { query }) => {
            let config = AppConfig::from_env()?;
            logger::setup_console_logging(&config.log_level)?;

            let engine = qhse_server::build_engine(&config).await?;
            let answer = engine.answer(&query).await?;
            println!("{}", answer.text);
        }
        None => {
            // Default: start server with default config
            serve(AppConfig::from_env()?).await?;
        }
    }

    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("QHSE Expert starting...");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Bind: {}", config.server_bind_address());
    tracing::info!("  Data: {}", config.data_dir.display());
    tracing::info!("  Embeddings: {:?}", config.embedding_backend);

    println!("Server listening on http://{}", config.server_bind_address());

    qhse_server::start_server(config).await?;
    Ok(())
}
