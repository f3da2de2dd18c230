//! vordr: inspection CLI
//!
//! Validates configuration files and shows how the governance layer would
//! treat a request, without calling any provider.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vordr::version::BuildInfo;
use vordr::{Config, OperationRequest, OperationType, VordrBuilder, estimate_tokens};

/// Vordr CLI
#[derive(Parser)]
#[command(name = "vordr")]
#[command(version = vordr::PKG_VERSION)]
#[command(about = "Governance layer for LLM operations")]
struct Args {
    /// Path to configuration file (default: ~/.vordr/config.toml, then
    /// /etc/vordr/config.toml, then built-in defaults).
    #[arg(short, long, env = "VORDR_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the configuration and print a summary
    Check,

    /// List the effective operation presets
    Presets,

    /// Print the cache key for a request
    CacheKey {
        /// User prompt (or omit to read from stdin)
        prompt: Option<String>,
        #[arg(short, long, default_value = "summarization")]
        operation: String,
        #[arg(short, long)]
        provider: String,
        #[arg(short, long)]
        model: String,
        #[arg(short, long)]
        system: Option<String>,
        /// Temperature override
        #[arg(short, long)]
        temperature: Option<f32>,
    },

    /// Estimate tokens and cost for a prompt
    Estimate {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        #[arg(short, long, default_value = "summarization")]
        operation: String,
        #[arg(short, long)]
        model: String,
    },

    /// Show build information
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Command::Version { json } = args.command {
        let info = BuildInfo::current();
        if json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            println!("vordr {}", vordr::version_string());
            println!("built: {}", info.built_at);
        }
        return Ok(());
    }

    let config = Config::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Check => {
            let orchestrator = VordrBuilder::from_config(&config)?.build()?;
            let cache = orchestrator.cache().config();
            let budget = orchestrator.budgets().config();
            println!("configuration ok");
            println!("presets: {}", orchestrator.presets().len());
            println!(
                "cache: {} (max {} entries, ttl {}s, temperature <= {})",
                if cache.enabled { "enabled" } else { "disabled" },
                cache.max_entries,
                cache.default_ttl.as_secs(),
                cache.deterministic_temperature_threshold
            );
            println!(
                "budget: {} limits, session tokens {}, session cost {}",
                if budget.enforce_hard_limits { "hard" } else { "soft" },
                display_limit(budget.max_tokens_per_session),
                display_limit(budget.max_cost_per_session)
            );
            println!(
                "priced models: {}",
                orchestrator.cost_model().models.len()
            );
        }

        Command::Presets => {
            let registry = config.preset_registry()?;
            println!(
                "{:<24} {:>5} {:>5} {:>7} {:>8} {:>7}",
                "operation", "temp", "top_p", "tokens", "timeout", "retries"
            );
            for preset in registry.list() {
                println!(
                    "{:<24} {:>5.2} {:>5.2} {:>7} {:>7}s {:>7}",
                    preset.operation_type().as_str(),
                    preset.temperature(),
                    preset.top_p(),
                    preset.max_tokens(),
                    preset.timeout_seconds(),
                    preset.max_retries()
                );
            }
        }

        Command::CacheKey {
            prompt,
            operation,
            provider,
            model,
            system,
            temperature,
        } => {
            let prompt = resolve_text(prompt, "cache-key")?;
            let orchestrator = VordrBuilder::from_config(&config)?.build()?;
            let mut request = OperationRequest::new(
                "cli",
                OperationType::from(operation.as_str()),
                provider,
                model,
                prompt,
            );
            if let Some(system) = system {
                request = request.system_prompt(system);
            }
            if let Some(temperature) = temperature {
                request = request.temperature(temperature);
            }
            let key = orchestrator.cache_key_for(&request)?;
            println!("{key}");
        }

        Command::Estimate {
            prompt,
            operation,
            model,
        } => {
            let prompt = resolve_text(prompt, "estimate")?;
            let registry = config.preset_registry()?;
            let preset = registry.get(&OperationType::from(operation.as_str()));
            let tokens_in = estimate_tokens(&prompt);
            let tokens_out = u64::from(preset.max_tokens());
            let cost = config.pricing.cost(&model, tokens_in, tokens_out);
            println!("input tokens (est.): {tokens_in}");
            println!("output tokens (max): {tokens_out}");
            println!("cost (worst case): {cost:.6}");
        }

        Command::Version { .. } => {}
    }

    Ok(())
}

fn display_limit<T: std::fmt::Display>(limit: Option<T>) -> String {
    limit.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
}

/// Resolve text input from CLI arg and/or stdin.
///
/// If stdin is piped and an arg is given, they are joined with a blank line.
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
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
