//! Persona MCP CLI
//!
//! Chat with a personal assistant about one person, from stdin.

use clap::Parser;
use persona_mcp::{
    Assistant, AssistantConfig, ChatClient, GithubClient, GithubSnapshot, KnowledgeBase,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Persona MCP - answer questions about a person from their notes and GitHub
#[derive(Parser, Debug)]
#[command(name = "persona-mcp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the knowledge base text file
    #[arg(short, long)]
    knowledge: Option<PathBuf>,

    /// GitHub account to snapshot
    #[arg(long)]
    github_user: Option<String>,

    /// Verbose output: debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print replies as HTML instead of markdown
    #[arg(long)]
    html: bool,

    /// Initial question; the session continues on stdin afterwards
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = resolve_config(&cli)?;
    info!("Starting Persona MCP for {}", config.subject_name);
    info!("Knowledge file: {:?}", config.knowledge_file);

    let knowledge = KnowledgeBase::load(&config.knowledge_file).await?;

    let github = match &config.github_user {
        Some(user) => {
            let client = GithubClient::new(config.github_token.clone())?;
            client.snapshot(user).await
        }
        None => {
            warn!("No GitHub user configured, skipping repository snapshot");
            GithubSnapshot::empty("")
        }
    };

    let completer = ChatClient::from_config(&config)?;
    let assistant = Assistant::new(config, knowledge, completer);

    if !cli.prompt.is_empty() {
        let question = cli.prompt.join(" ");
        answer(&assistant, &question, &github, cli.html).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for item in assistant.history().await.iter().rev() {
                    let text = item.content().as_text().unwrap_or("<structured>");
                    println!("[{}] {}", item.kind(), text);
                }
            }
            question => answer(&assistant, question, &github, cli.html).await,
        }
    }

    Ok(())
}

/// Config file (explicit or default path), then env overrides, then CLI flags
fn resolve_config(cli: &Cli) -> anyhow::Result<AssistantConfig> {
    let config = match &cli.config {
        Some(path) => AssistantConfig::load(path)?,
        None => match AssistantConfig::default_path() {
            Some(path) if path.exists() => AssistantConfig::load(&path)?,
            _ => AssistantConfig::default(),
        },
    }
    .with_env_overrides();
    Ok(apply_cli(config, cli))
}

fn apply_cli(mut config: AssistantConfig, cli: &Cli) -> AssistantConfig {
    if let Some(path) = &cli.knowledge {
        config = config.with_knowledge_file(path.clone());
    }
    if let Some(user) = &cli.github_user {
        config = config.with_github_user(user.clone());
    }
    config
}

async fn answer(
    assistant: &Assistant<ChatClient>,
    question: &str,
    github: &GithubSnapshot,
    html: bool,
) {
    match assistant.respond(question, github).await {
        Ok(reply) => {
            let out = if html { reply.html } else { reply.text };
            println!("{}", out);
            let _ = std::io::stdout().flush();
        }
        Err(e) => error!("Failed to answer: {}", e),
    }
}
