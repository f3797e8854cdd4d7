//! Analysis-lock command line client.
//!
//! Provides the `proflock` binary for inspecting and driving the analysis
//! lock of a profiler deployment from a terminal:
//!
//! - `status` prints the current (global or per-submission) snapshot and the
//!   lock it implies
//! - `submit` starts an analysis, follows it to completion and optionally
//!   through its cooldown
//! - `watch` follows the lock until interrupted
//!
//! Connection settings come from `PROFLOCK_*` environment variables and can
//! be overridden with `--api-base` and `--token`.

use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use proflock_client::{
    AnalysisApi, AnalysisLockCoordinator, ClientConfig, ClientError, CompletionCallback,
    HttpAnalysisApi, RefreshTrigger, SessionGate, SubmitOptions,
};
use proflock_core::{reconcile, LockState, LockView, PayloadMode, SubmissionId};

/// Analysis lock client for the profiler backend.
#[derive(Parser)]
#[command(name = "proflock", about = "Analysis lock client for the profiler backend")]
struct Cli {
    /// Backend base URL (overrides PROFLOCK_API_BASE).
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Bearer token (overrides PROFLOCK_TOKEN).
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print a status snapshot and the lock it implies.
    Status {
        /// Query one submission's job instead of the global status.
        #[arg(short, long)]
        submission: Option<String>,
    },

    /// Submit a submission for analysis and follow the job.
    Submit {
        /// Submission ID to analyse.
        submission: String,

        /// Payload mode: MINIMAL, ENRICHED or FULL.
        #[arg(short, long, default_value = "MINIMAL")]
        mode: String,

        /// Ask the backend to re-run an analysis that already exists.
        #[arg(long)]
        force: bool,

        /// Retry budget passed to the backend.
        #[arg(long, default_value_t = 1)]
        retry: u32,

        /// Keep running until the post-analysis cooldown has elapsed.
        #[arg(long)]
        wait_cooldown: bool,
    },

    /// Follow the lock until interrupted.
    Watch {
        /// Seconds between forced global refreshes.
        #[arg(long, default_value_t = 15)]
        refresh_every: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.api_base, cli.token) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(3);
        }
    };
    tracing::debug!(api_base = %config.api_base, intervals = ?config.intervals, "Configuration loaded");

    let exit_code = match cli.command {
        Commands::Status { submission } => run_status(&config, submission).await,
        Commands::Submit {
            submission,
            mode,
            force,
            retry,
            wait_cooldown,
        } => run_submit(&config, submission, &mode, force, retry, wait_cooldown).await,
        Commands::Watch { refresh_every } => run_watch(&config, refresh_every).await,
    };
    process::exit(exit_code);
}

fn load_config(
    api_base: Option<String>,
    token: Option<String>,
) -> Result<ClientConfig, ClientError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_base) = api_base {
        config.api_base = api_base;
    }
    if let Some(token) = token {
        config.token = Some(token);
    }
    Ok(config)
}

fn session_for(config: &ClientConfig) -> SessionGate {
    SessionGate::authenticated(config.token.clone())
}

/// Execute the status subcommand.
///
/// Returns exit code: 0 = success, 1 = request error, 3 = configuration error.
async fn run_status(config: &ClientConfig, submission: Option<String>) -> i32 {
    let api = match HttpAnalysisApi::new(config, session_for(config)) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 3;
        }
    };

    let context = submission.map(SubmissionId::from);
    let fetched = match &context {
        Some(id) => api.job_status(id).await,
        None => api.global_status().await,
    };
    let snapshot = match fetched {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("Error: status request failed: {}", err);
            return 1;
        }
    };

    let context = context.or_else(|| snapshot.as_ref().and_then(|s| s.submission_id.clone()));
    let lock = reconcile(&LockState::unlocked(), context.as_ref(), snapshot.as_ref());
    let out = serde_json::json!({
        "snapshot": snapshot,
        "lock": lock,
        "badge": lock.view().badge(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&out)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e))
    );
    0
}

/// Execute the submit subcommand.
///
/// Returns exit code: 0 = analysis finished, 1 = request error or failed
/// analysis, 2 = refused because the lock is held, 3 = configuration error.
async fn run_submit(
    config: &ClientConfig,
    submission: String,
    mode: &str,
    force: bool,
    retry: u32,
    wait_cooldown: bool,
) -> i32 {
    let mode = match mode.parse::<PayloadMode>() {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 3;
        }
    };
    let coordinator = match AnalysisLockCoordinator::from_config(config, session_for(config)) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 3;
        }
    };

    // Learn about locks held elsewhere before deciding whether to submit.
    coordinator.refresh(RefreshTrigger::Startup).await;

    let (tx, rx) = oneshot::channel();
    let on_done: CompletionCallback = Box::new(move |snapshot| {
        let _ = tx.send(snapshot);
    });
    let options = SubmitOptions { mode, force, retry };

    match coordinator
        .submit_analysis(SubmissionId::from(submission), options, on_done)
        .await
    {
        Ok(()) => {}
        Err(ClientError::Locked {
            source_submission_id,
        }) => {
            let view = coordinator.lock();
            eprintln!(
                "Refused: analysis lock is held{} ({})",
                source_submission_id
                    .map(|id| format!(" by submission {}", id))
                    .unwrap_or_default(),
                view.badge().unwrap_or_default()
            );
            return 2;
        }
        Err(err) => {
            eprintln!("Error: failed to submit analysis: {}", err);
            return 1;
        }
    }
    print_badge(&coordinator.lock());

    let Ok(snapshot) = rx.await else {
        eprintln!("Error: hard poll stopped before the analysis finished");
        return 1;
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e))
    );
    let failed = snapshot.status != proflock_core::JobStatus::Done;

    if wait_cooldown {
        let mut rx = coordinator.subscribe();
        let mut last_minute = None;
        loop {
            let view = rx.borrow_and_update().view();
            if !view.locked {
                break;
            }
            let minute = view.remaining.map(|s| s / 60);
            if minute != last_minute {
                print_badge(&view);
                last_minute = minute;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        println!("unlocked");
    }

    coordinator.dispose();
    if failed {
        1
    } else {
        0
    }
}

/// Execute the watch subcommand. Runs until Ctrl-C.
async fn run_watch(config: &ClientConfig, refresh_every: u64) -> i32 {
    let coordinator = match AnalysisLockCoordinator::from_config(config, session_for(config)) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 3;
        }
    };
    let mut rx = coordinator.subscribe();
    let mut refresh = tokio::time::interval(Duration::from_secs(refresh_every.max(1)));
    let mut last = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = refresh.tick() => {
                coordinator.refresh(RefreshTrigger::Focus).await;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let view = rx.borrow_and_update().view();
        // one line per phase change or per started minute
        let key = (view.locked, view.remaining.map(|s| s / 60), view.remaining.is_none());
        if last != Some(key) {
            print_badge(&view);
            last = Some(key);
        }
    }

    coordinator.dispose();
    0
}

fn print_badge(view: &LockView) {
    match view.badge() {
        Some(badge) => println!("{}", badge),
        None => println!("unlocked"),
    }
}
