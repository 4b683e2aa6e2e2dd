use clap::{Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::process;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;

use specter_core::llm::PromptAuditor;
use specter_core::store::postgres::PostgresFindingStore;
use specter_core::{
    FlowSnapshot, Interceptor, OpenAiChatClient, Orchestrator, RedisStore, ReportGenerator,
    ScanConfig, TaskRunner,
};

#[derive(Parser, Debug)]
#[command(
    name = "SPECTER",
    version,
    about = "LLM-assisted web vulnerability scanner",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Scan loop against the queue:      specter run
  Bridge a mitmproxy flow export:   mitmdump -s flow_export.py | specter intercept
  Tagged captures:                  specter intercept --project shop-audit

Configuration comes from the environment: TARGET_WHITELIST, REDIS_URL,
POSTGRES_URL, OPENAI_API_KEY, SCAN_MAX_TASKS, SCAN_TIMEOUT, ..."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pop captured requests off the task queue and scan them.
    Run,
    /// Read intercepted flow snapshots (JSON, one per line) from stdin,
    /// filter and deduplicate them, and enqueue scan tasks.
    Intercept {
        /// Project tag attached to every enqueued task.
        #[arg(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = ScanConfig::from_env();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.clone()),
    )
    .init();

    print_banner();

    let result = match args.command {
        Command::Run => run_scanner(config).await,
        Command::Intercept { project } => run_interceptor(config, project).await,
    };

    if let Err(e) = result {
        eprint!("{}\r\n", format!("[!] {:#}", e).red());
        process::exit(1);
    }
}

fn print_banner() {
    let banner = r#"
   _____ ____  ______ ______________________
  / ___// __ \/ ____// ____/_  __/ ____/ __ \
  \__ \/ /_/ / __/  / /     / / / __/ / /_/ /
 ___/ / ____/ /___ / /___  / / / /___/ _, _/
/____/_/   /_____/ \____/ /_/ /_____/_/ |_|
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Wires the scan side: Redis queue + param index, Postgres findings, two
/// LLM clients, the orchestrator and the bounded task runner.
async fn run_scanner(config: ScanConfig) -> anyhow::Result<()> {
    print_config(&config);

    let redis = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let findings = Arc::new(PostgresFindingStore::connect(&config.postgres_url).await?);
    let auditor = Arc::new(PromptAuditor::new(
        "logs/llm_audit",
        config.log_prompt_interaction,
    ));

    let manager_llm = Arc::new(OpenAiChatClient::new(
        config.openai_api_base.clone(),
        config.openai_api_key.clone(),
        config.model_name_manager.clone(),
        auditor.clone(),
    ));
    let worker_llm = Arc::new(OpenAiChatClient::new(
        config.openai_api_base.clone(),
        config.openai_api_key.clone(),
        config.model_name_worker.clone(),
        auditor,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        manager_llm,
        worker_llm,
        redis.clone(),
        findings,
    ));
    let runner = Arc::new(TaskRunner::new(
        redis,
        orchestrator,
        Arc::new(ReportGenerator::new("reports")),
        config.scan_max_tasks,
    ));

    // Ctrl-C stops the queue pump; in-flight scans drain before exit.
    let stopper = runner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print!("{}\r\n", "[*] Shutting down, draining in-flight scans...".yellow());
            std::io::stdout().flush().ok();
            stopper.stop();
        }
    });

    runner.run().await;
    Ok(())
}

/// Wires the capture side: stdin flow bridge -> interceptor -> Redis queue.
async fn run_interceptor(config: ScanConfig, project: Option<String>) -> anyhow::Result<()> {
    let redis = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let interceptor = Interceptor::new(
        config.target_whitelist.clone(),
        redis.clone(),
        redis.clone(),
        redis,
        project,
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FlowSnapshot>(&line) {
            Ok(flow) => {
                if let Err(e) = interceptor.process_flow(&flow).await {
                    log::error!("Failed to process flow: {}", e);
                }
            }
            Err(e) => log::warn!("Skipping malformed flow line: {}", e),
        }
    }
    Ok(())
}

fn print_config(config: &ScanConfig) {
    print!("{}\r\n", format!("[+] Whitelist:   {:?}", config.target_whitelist).green().bold());
    print!("{}\r\n", format!("[+] Max scans:   {}", config.scan_max_tasks).blue());
    print!("{}\r\n", format!("[+] Probe conc.: {}", config.scan_max_concurrency).blue());
    print!("{}\r\n", format!("[+] Max retries: {}", config.scan_max_retries).blue());
    print!("{}\r\n", format!("[+] Timeout:     {}s", config.scan_timeout).blue());
    if let Some(proxy) = &config.scan_proxy {
        print!("{}\r\n", format!("[+] Scan proxy:  {}", proxy).yellow());
    }
    print!("{}\r\n", format!("[+] Manager LLM: {}", config.model_name_manager).magenta());
    print!("{}\r\n", format!("[+] Worker LLM:  {}", config.model_name_worker).magenta());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}
