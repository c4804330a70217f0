//! schedule-task-host: a minimal host process for the scheduling core.
//!
//! Schedules, lists and cancels tasks from the command line, and doubles as
//! the cold-start target: launched with `--run-task=<name>` it runs that task
//! straight away instead of parsing subcommands.

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use schedule_task::constants::CONFIG_PATH_ENV;
use schedule_task::{
    CancelTaskRequest, ScheduleTaskRequest, ScheduleTime, Scheduler, SchedulerConfig, TaskHandler, TaskParameters, TriggerPayload,
};

/// Host process for deferred tasks
#[derive(Parser)]
#[command(name = "schedule-task-host")]
#[command(about = "Schedule, list and cancel deferred tasks", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $SCHEDULE_TASK_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a task
    Schedule {
        /// Task name passed to the entry point
        name: String,

        /// Fire after this many seconds
        #[arg(long = "in", conflicts_with = "at")]
        delay: Option<f64>,

        /// Fire at this ISO-8601 instant
        #[arg(long)]
        at: Option<String>,

        /// Task parameter as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Stay alive until the task has run
        #[arg(long)]
        wait: bool,
    },

    /// Cancel a task by id
    Cancel {
        /// Task id returned by `schedule`
        task_id: String,
    },

    /// List all known tasks
    List,
}

/// Entry point that logs each invocation.
struct LoggingHandler;

#[async_trait]
impl TaskHandler for LoggingHandler {
    async fn run_task(&self, task_id: &str, task_name: &str, parameters: &TaskParameters) -> Result<()> {
        let mut params: Vec<_> = parameters.iter().collect();
        params.sort_unstable();
        tracing::info!(task_id = %task_id, task_name = %task_name, parameters = ?params, "task invoked");
        println!("ran {task_name} ({task_id}) with {params:?}");
        Ok(())
    }
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

fn load_config(path: Option<String>) -> Result<SchedulerConfig> {
    match path.or_else(|| std::env::var(CONFIG_PATH_ENV).ok()) {
        Some(path) => SchedulerConfig::load(&path).with_context(|| format!("loading config from {path}")),
        None => {
            let mut config = SchedulerConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }
}

#[cfg(feature = "logging")]
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(not(feature = "logging"))]
fn init_logging() {}

/// Launch arguments as text. Bytes that are not UTF-8 become U+FFFD rather
/// than aborting the cold start.
fn launch_args(args: impl IntoIterator<Item = OsString>) -> Vec<String> {
    args.into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    // Cold start: the launch arguments are the trigger payload.
    if let Some(payload) = TriggerPayload::from_launch_args(launch_args(std::env::args_os().skip(1))) {
        let config = load_config(None)?;
        let scheduler = Scheduler::new(&config, Arc::new(LoggingHandler));
        let outcome = scheduler.handle_payload(&payload).await;
        tracing::info!(outcome = %outcome, "cold-start task finished");
        return Ok(());
    }

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let scheduler = Scheduler::new(&config, Arc::new(LoggingHandler));

    match cli.command {
        Commands::Schedule {
            name,
            delay,
            at,
            params,
            wait,
        } => {
            let request = ScheduleTaskRequest {
                task_name: name,
                schedule_time: ScheduleTime {
                    date_time: at,
                    duration: delay,
                },
                parameters: Some(params.into_iter().collect::<HashMap<_, _>>()),
            };
            let response = scheduler.schedule_task(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if wait && response.success {
                wait_until_settled(&scheduler, &response.task_id).await?;
            }
        }
        Commands::Cancel { task_id } => {
            let response = scheduler.cancel(CancelTaskRequest { task_id }).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::List => {
            println!("{}", serde_json::to_string_pretty(&scheduler.list_tasks())?);
        }
    }

    Ok(())
}

async fn wait_until_settled(scheduler: &Scheduler, task_id: &str) -> Result<()> {
    loop {
        let record = scheduler.registry().get(task_id)?;
        if record.status.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&record.to_task_info())?);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn non_utf8_arguments_do_not_abort_cold_start() {
        use std::os::unix::ffi::OsStringExt;

        let args = vec![
            OsString::from("--task-id=t1"),
            OsString::from("--run-task=backup"),
            OsString::from_vec(b"--task-param=path=/tmp/\xff".to_vec()),
            OsString::from_vec(b"--unrelated-\xfe".to_vec()),
        ];
        let payload = TriggerPayload::from_launch_args(launch_args(args)).unwrap();

        assert_eq!(payload.task_name(), Some("backup"));
        assert_eq!(payload.parameters().get("path"), Some("/tmp/\u{fffd}"));
    }
}
