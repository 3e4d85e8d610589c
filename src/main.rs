mod doctor;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardforge_anki::AnkiConnect;
use cardforge_core::config::{AppConfig, LlmConfig};
use cardforge_flows::{FlowDeps, ListeningFlow, ListeningOutcome, VocabFlow, VocabOutcome};
use cardforge_gateway::{AppState, GatewayServer};
use cardforge_speech::GoogleTts;

#[derive(Parser)]
#[command(name = "cardforge", version, about = "Korean flashcard generator for Anki")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cardforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve,
    /// Create a vocabulary card for one word
    Vocab {
        word: String,
        /// Rewrite the card even if the word is already in the deck
        #[arg(long)]
        force: bool,
    },
    /// Create a listening card for one sentence
    Listening {
        sentence: String,
        /// Chinese translation to use instead of generating one
        #[arg(long)]
        translation: Option<String>,
        /// Rewrite the card even if the sentence is already in the deck
        #[arg(long)]
        force: bool,
    },
    /// Show current configuration
    Config,
    /// Check Anki, decks, note types and the LLM settings
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cardforge=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "cardforge", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        eprintln!(
            "Warning: {} not found, using defaults and environment variables",
            cli.config.display()
        );
        create_env_config()
    };
    let config = Arc::new(config);

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(config.as_ref())?);
        }
        Commands::Doctor => {
            println!("Cardforge Doctor");
            println!("================");
            doctor::run_doctor(&config).await;
        }
        Commands::Serve => {
            let anki = AnkiConnect::from_config(&config.anki)?;
            let state = AppState::new(anki, flow_deps(config.clone())?)?;
            let server = GatewayServer::new(state);

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Vocab { word, force } => {
            let flow = VocabFlow::new(&flow_deps(config.clone())?)?;
            match flow.run(&word, force).await? {
                VocabOutcome::Created(card) => {
                    println!("{}", serde_json::to_string_pretty(&card)?);
                }
                VocabOutcome::Skipped { anki_note_id } => {
                    println!(
                        "'{}' is already in the deck (note {}); use --force to rewrite it",
                        word, anki_note_id
                    );
                }
            }
        }
        Commands::Listening {
            sentence,
            translation,
            force,
        } => {
            let flow = ListeningFlow::new(&flow_deps(config.clone())?)?;
            match flow.run(&sentence, translation.as_deref(), force).await? {
                ListeningOutcome::Created(card) => {
                    println!("{}", serde_json::to_string_pretty(&card)?);
                }
                ListeningOutcome::Skipped { anki_note_id } => {
                    println!(
                        "Sentence is already in the deck (note {}); use --force to rewrite it",
                        anki_note_id
                    );
                }
            }
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wire the real collaborators.
fn flow_deps(config: Arc<AppConfig>) -> anyhow::Result<FlowDeps> {
    let generator = cardforge_llm::create_generator(&config.llm)?;
    info!(provider = %config.llm.provider, model = %config.llm.model_id, "LLM client ready");
    Ok(FlowDeps::new(
        Arc::from(generator),
        Arc::new(AnkiConnect::from_config(&config.anki)?),
        Arc::new(GoogleTts::new(&config.speech)?),
        config,
    ))
}

/// Defaults plus whatever Azure/OpenAI credentials the environment holds.
fn create_env_config() -> AppConfig {
    let azure_key = std::env::var("AZURE_OPENAI_API_KEY").ok();
    let azure_endpoint = std::env::var("AZURE_OPENAI_ENDPOINT").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    let llm = match (azure_key, openai_key) {
        (Some(key), _) => LlmConfig {
            api_key: Some(key),
            base_url: azure_endpoint,
            azure_deployment: std::env::var("AZURE_OPENAI_DEPLOYMENT").ok(),
            ..LlmConfig::default()
        },
        (None, Some(key)) => LlmConfig {
            provider: "openai".to_string(),
            api_key: Some(key),
            ..LlmConfig::default()
        },
        (None, None) => LlmConfig::default(),
    };

    AppConfig {
        llm,
        ..AppConfig::default()
    }
}
