mod approval;
mod budget;
mod client;
mod config;
mod enrich;
mod exit;
mod history;
mod input_log;
mod logging;
mod recall;
mod session;
mod status;
mod tools;
mod tui;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use config::{ConfigFile, Overrides, ResolvedConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

use approval::ApprovalInput;
use enrich::EnrichOptions;
use input_log::InputLog;
use session::{Session, SessionConfig, Step};

#[derive(Parser, Debug)]
#[command(
    name = "chatgate",
    about = "Terminal chat for OpenAI-compatible model servers, with approval-gated file context",
    long_about = None,
)]
struct Args {
    /// Prompt to send once on plain stdout (omit to enter the interactive TUI)
    prompt: Option<String>,

    /// Profile to use from config file
    #[arg(short, long, env = "CHATGATE_PROFILE")]
    profile: Option<String>,

    /// Override endpoint URL
    #[arg(long, env = "CHATGATE_ENDPOINT")]
    endpoint: Option<String>,

    /// Use this model instead of the first one the server lists
    #[arg(short, long, env = "CHATGATE_MODEL")]
    model: Option<String>,

    /// Override API key
    #[arg(long, env = "CHATGATE_API_KEY")]
    api_key: Option<String>,

    /// Read referenced files without asking
    #[arg(long)]
    autopilot: bool,

    /// Write a default config file to ~/.config/chatgate/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List available profiles and exit
    #[arg(long)]
    profiles: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: chatgate");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;

    // ── --profiles ────────────────────────────────────────────────────────────
    if args.profiles {
        print_profiles(&file);
        return Ok(());
    }

    // Logging is best-effort; the session runs without it
    if let Err(e) = logging::init() {
        eprintln!("  logging disabled: {e}");
    }

    let resolved = ResolvedConfig::resolve(
        &file,
        &Overrides {
            profile: args.profile.as_deref(),
            endpoint: args.endpoint.as_deref(),
            model: args.model.as_deref(),
            api_key: args.api_key.as_deref(),
            autopilot: args.autopilot,
        },
    );
    tracing::info!(
        profile = %resolved.profile_name,
        endpoint = %resolved.endpoint,
        model = ?resolved.model,
        "chatgate starting"
    );

    let mut client = client::Client::new(resolved.endpoint.clone(), resolved.request_timeout);
    if let Some(key) = &resolved.api_key {
        client.set_api_key(key.clone());
    }
    let session = Session::new(
        SessionConfig {
            selected_model: resolved.model.clone(),
            autopilot: resolved.autopilot,
        },
        EnrichOptions {
            max_depth: resolved.search_depth,
            ..EnrichOptions::default()
        },
    );
    let input_log = InputLog::new(input_log::default_path());

    // ── Single-shot mode (non-TUI) ────────────────────────────────────────────
    if let Some(prompt) = args.prompt {
        let code = run_single_shot(prompt, resolved, session, client, input_log).await?;
        std::process::exit(code);
    }

    // ── Interactive TUI mode ──────────────────────────────────────────────────
    tui::run(resolved, session, client, input_log).await
}

// ── Single-shot mode (plain stdout, no TUI) ───────────────────────────────────

/// Runs one prompt through the full pipeline. Returns the process exit code.
async fn run_single_shot(
    prompt: String,
    resolved: ResolvedConfig,
    mut session: Session,
    client: client::Client,
    input_log: InputLog,
) -> Result<i32> {
    let model_label = resolved.model.as_deref().unwrap_or("auto");
    println!();
    println!("  ▲ chatgate  {}  ·  {model_label}", resolved.profile_name);
    println!();

    let mut printed = 0;
    session.apply_models(client.list_models().await);
    print_new_entries(&session, &mut printed);
    if session.config().selected_model.is_none() {
        eprintln!("  ✗ no model available, pass --model or check {}", resolved.endpoint);
        return Ok(1);
    }

    if let Err(e) = input_log.append(&prompt) {
        tracing::warn!(error = %e, "input log append failed");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut step = session.submit(&prompt);
    loop {
        step = session.run_step(&client, step).await;
        print_new_entries(&session, &mut printed);
        if step != Step::AwaitApproval {
            break;
        }
        let Some(request) = session.pending_approval() else { break };
        print!("  ? {} [Y/n] ", request.message);
        let _ = std::io::Write::flush(&mut std::io::stdout());
        // EOF on stdin counts as a refusal
        let answer = match stdin.next_line().await? {
            Some(line) => ApprovalInput::from_text(&line),
            None => ApprovalInput::No,
        };
        step = session.respond(answer);
    }
    Ok(0)
}

fn print_new_entries(session: &Session, printed: &mut usize) {
    for entry in session.history().since(*printed) {
        println!("{}", ui::plain_line(entry.kind, &entry.text));
    }
    *printed = session.history().len();
}

// ── Profiles listing (non-TUI) ────────────────────────────────────────────────

fn print_profiles(file: &ConfigFile) {
    let mut entries: Vec<(&String, &config::Profile)> = file.profiles.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    println!();
    println!("  Profiles");
    if entries.is_empty() {
        println!("  (none — run `chatgate --init` to create a config)");
    }
    for (name, p) in &entries {
        let marker = if **name == file.default_profile { " ←" } else { "" };
        println!("  {name}{marker}");
        println!("    endpoint   {}", p.endpoint);
        println!("    model      {}", p.model.as_deref().unwrap_or("(first listed)"));
        println!("    autopilot  {}", if p.autopilot { "on" } else { "off" });
        println!();
    }
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash"    => Shell::Bash,
        "zsh"     => Shell::Zsh,
        "fish"    => Shell::Fish,
        "elvish"  => Shell::Elvish,
        _ => {
            eprintln!("Unknown shell: {shell_name}");
            eprintln!("Supported: bash, zsh, fish, elvish");
            std::process::exit(1);
        }
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "chatgate", &mut std::io::stdout());
    Ok(())
}
