//! heimdall: command-line front end for the gateway
//!
//! Send one request through a locally built gateway, or run the built-in
//! safety heuristics over a piece of text.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use heimdall::providers::OpenAiClient;
use heimdall::{Config, Heimdall, HeuristicPolicy, Request, RouteOptions, SafetyStage, Task};

/// Heimdall CLI
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(version = heimdall::PKG_VERSION)]
#[command(about = "AI request gateway")]
struct Args {
    /// Config file (default: ~/.heimdall/config.toml, then /etc/heimdall/config.toml)
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route one request and print the JSON response
    Route {
        /// Prompt, or content to moderate (or omit to read from stdin)
        prompt: Option<String>,
        /// Task: parse, generate, match, coverLetter, suggest, embed, moderate
        #[arg(short, long, default_value = "generate")]
        task: Task,
        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
        /// Input text for embed (repeatable)
        #[arg(long = "text")]
        texts: Vec<String>,
        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
        /// Override the configured provider
        #[arg(long)]
        provider: Option<String>,
        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// API key for the OpenAI-compatible provider
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,
        /// Base URL for the OpenAI-compatible provider
        #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
        base_url: String,
    },

    /// Run the built-in safety heuristics over text
    Check {
        /// Text to screen (or omit to read from stdin)
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Route {
            prompt,
            task,
            system,
            texts,
            no_cache,
            provider,
            timeout_ms,
            api_key,
            base_url,
        } => {
            let config = Config::load(args.config.as_deref())?;
            let client = OpenAiClient::with_base_url(api_key, base_url)?;
            let gateway = Heimdall::builder()
                .config(&config)?
                .provider(Arc::new(client))
                .build()?;

            let request = build_request(task, prompt, system, texts)?;
            let mut options = RouteOptions::new().allow_cache(!no_cache);
            if let Some(provider) = provider {
                options = options.force_provider(provider);
            }
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }

            let response = gateway.route(&request, &options).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.ok {
                std::process::exit(1);
            }
        }

        Command::Check { text } => {
            let text = resolve_text(text, "check")?;
            let policy = HeuristicPolicy::new();
            for stage in [SafetyStage::Pre, SafetyStage::Post] {
                let verdict = policy.screen(stage, &text);
                let flags = if verdict.flags.is_empty() {
                    "-".to_string()
                } else {
                    verdict.flags.join(", ")
                };
                let status = if verdict.allowed { "allowed" } else { "blocked" };
                println!("{:<5} {status:<8} {flags}", stage.as_str());
            }
        }
    }

    Ok(())
}

fn build_request(
    task: Task,
    prompt: Option<String>,
    system: Option<String>,
    texts: Vec<String>,
) -> Result<Request, Box<dyn std::error::Error>> {
    let request = match task {
        Task::Embed if !texts.is_empty() => Request::embed(texts),
        Task::Embed => Request::embed([resolve_text(prompt, "route")?]),
        Task::Moderate => Request::moderate(resolve_text(prompt, "route")?),
        task => Request::new(task).prompt(resolve_text(prompt, "route")?),
    };
    Ok(match system {
        Some(system) => request.system(system),
        None => request,
    })
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// Combination rules:
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_is_pipe = !io::stdin().is_terminal();
    let stdin_text = if stdin_is_pipe {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    } else {
        None
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
