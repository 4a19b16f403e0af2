mod chat;
mod echo;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use precis_core::{Acquirer, Config, Outcome, Services, Session, http_client};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the Key Vault client secret.
const KEY_VAULT_SECRET_VAR: &str = "PRECIS_KEY_VAULT_CLIENT_SECRET";

/// Summarize web articles through a chain of LLM providers
#[derive(Parser, Debug)]
#[command(name = "precis")]
#[command(author = "Precis Contributors")]
#[command(version)]
#[command(about = "Summarize web articles through a chain of LLM providers", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file (default: <config dir>/precis/config.toml)
    #[arg(short, long, global = true, env = "PRECIS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Whose profile to load and save
    #[arg(short, long, global = true, env = "PRECIS_USER", value_name = "NAME")]
    user: Option<String>,

    /// Assistant used to process articles
    #[arg(short, long, global = true, value_name = "NAME")]
    assistant: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive session (the default)
    Chat,
    /// Process one article with a stored prompt and print the answer
    Process {
        /// Article URL
        url: String,
        /// Prompt to use (default: the first stored prompt)
        #[arg(short, long, value_name = "NAME")]
        prompt: Option<String>,
    },
    /// Scrape an article and print its cleaned text
    Fetch {
        /// Article URL
        url: String,
    },
    /// Show the stored prompts and filter words
    Profile,
    /// Generate a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "precis=debug,precis_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(assistant) = &args.assistant {
        config.assistant = assistant.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn start_session(config: &Config) -> anyhow::Result<Session> {
    let secrets = config.secret_source(std::env::var(KEY_VAULT_SECRET_VAR).ok())?;
    let services = Services::from_config(config, secrets.as_ref()).await.context("Failed to start")?;
    Ok(Session::start(services).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(Command::Completions { shell }) = &args.command {
        clap_complete::generate(*shell, &mut Args::command(), "precis", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&args)?;
    tracing::debug!(user = %config.user, assistant = %config.assistant, "configuration loaded");

    match args.command.unwrap_or(Command::Chat) {
        Command::Chat => chat::run(start_session(&config).await?).await,
        Command::Process { url, prompt } => {
            let mut session = start_session(&config).await?;
            for warning in session.take_warnings() {
                echo::print_warning(&warning);
            }
            if let Some(prompt) = prompt {
                session.select_prompt(&prompt)?;
            }

            match session.process_article(&url).await {
                Outcome::Answered(answer) => {
                    println!("{answer}");
                    Ok(())
                }
                Outcome::InvalidUrl => bail!("Not a valid http(s) URL: {url}"),
                Outcome::NoPrompt => bail!("No prompt available for user '{}'", config.user),
                Outcome::NoText => bail!("Could not read any text from {url}"),
                Outcome::NoAnswer => bail!("None of the models produced an answer"),
            }
        }
        Command::Fetch { url } => {
            if !precis_core::is_valid_url(&url) {
                bail!("Not a valid http(s) URL: {url}");
            }
            let secrets = config.secret_source(std::env::var(KEY_VAULT_SECRET_VAR).ok())?;
            let scrapers = config.scrapers(secrets.as_ref()).await.context("Failed to start")?;
            let acquirer = Acquirer::new(http_client()?, scrapers, config.fetch_config());

            let text = acquirer.acquire(&url).await.with_context(|| format!("Could not read any text from {url}"))?;
            println!("{text}");
            Ok(())
        }
        Command::Profile => {
            let secrets = config.secret_source(std::env::var(KEY_VAULT_SECRET_VAR).ok())?;
            let store = config.profile_store(http_client()?, secrets.as_ref()).await?;
            let profile = store
                .load()
                .await
                .with_context(|| format!("Failed to load the profile of '{}'", config.user))?;

            echo::print_prompts(&profile, profile.prompt_names().next());
            echo::print_filter_words(&profile);
            Ok(())
        }
        Command::Completions { .. } => Ok(()),
    }
}
