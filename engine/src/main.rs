use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drover_core::{resolve_state_dir, EngineConfig, OrchestrationEngine};
use drover_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, ObservabilityEvent, ProcessKind,
};
use drover_server::{serve, AppState};
use drover_types::TaskStatus;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drover-engine")]
#[command(about = "Headless Drover task orchestration service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 4400)]
        port: u16,
        #[arg(long)]
        state_dir: Option<String>,
        #[arg(long)]
        agent_bin: Option<String>,
    },
    /// Submit one task, wait for it to finish, print the final record
    Run {
        prompt: String,
        #[arg(long)]
        state_dir: Option<String>,
        #[arg(long)]
        agent_bin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            hostname,
            port,
            state_dir,
            agent_bin,
        } => {
            let config = build_config(state_dir, agent_bin);
            let logs_dir = canonical_logs_dir_from_root(&config.state_dir);
            let (_log_guard, log_info) =
                init_process_logging(ProcessKind::Engine, &logs_dir, 14)?;
            info!("engine logging initialized: {:?}", log_info);

            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            info!(
                "starting drover-engine on http://{addr} (state dir {})",
                config.state_dir.display()
            );
            let startup_detail = format!("agent_bin={}", config.agent_bin);
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Engine,
                ObservabilityEvent {
                    event: "engine.startup.ready",
                    component: "engine.main",
                    task_id: None,
                    phase: None,
                    status: Some("ok"),
                    detail: Some(startup_detail.as_str()),
                },
            );

            let engine = OrchestrationEngine::new(config);
            serve(addr, AppState::new(engine)).await?;
        }
        Command::Run {
            prompt,
            state_dir,
            agent_bin,
        } => {
            let config = build_config(state_dir, agent_bin);
            let logs_dir = canonical_logs_dir_from_root(&config.state_dir);
            let (_log_guard, _) = init_process_logging(ProcessKind::Cli, &logs_dir, 14)?;

            let engine = OrchestrationEngine::new(config);
            let record = engine.submit(prompt).await;
            info!(task_id = %record.id, "task submitted, waiting for completion");

            let finished = loop {
                tokio::time::sleep(Duration::from_secs(2)).await;
                let Some(current) = engine.registry().get(&record.id).await else {
                    anyhow::bail!("task record disappeared: {}", record.id);
                };
                if current.status.is_terminal() {
                    break current;
                }
            };

            println!("{}", serde_json::to_string_pretty(&finished)?);
            if finished.status == TaskStatus::Failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn build_config(state_dir: Option<String>, agent_bin: Option<String>) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    config.state_dir = resolve_state_dir(state_dir);
    if let Some(agent_bin) = agent_bin {
        config.agent_bin = agent_bin;
    }
    config
}
