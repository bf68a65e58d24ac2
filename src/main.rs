//! mqprobe - publish stored message test cases to RabbitMQ
//!
//! ## Usage
//!
//! ```bash
//! # Store a test case
//! mqprobe add order --route-key q.orders --payload '{"id": 1}'
//!
//! # Run every stored test case, 5 at a time, 100ms apart
//! mqprobe batch --all -c 5 -d 100
//!
//! # Run one test case
//! mqprobe run order
//!
//! # Publish it 100 times with a fresh random id each time
//! mqprobe run order -n 100 --mock id:int
//!
//! # Point at another broker
//! mqprobe config set host http://rabbit.local:15672
//!
//! # Switch to (or create) a settings profile
//! mqprobe config select staging
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use mqprobe::cli::{self, Args};
use mqprobe::config::{print_env_help, AppConfig, EnvConfig, ProfileManager};
use mqprobe::executor::{BatchExecutor, BatchOptions, ExecutionRegistry, LogBus};
use mqprobe::http::RabbitClient;
use mqprobe::models::{repeated_tasks, ExecutionSnapshot, MockSpec, Task, TestCase};
use mqprobe::output::{write_report_to_file, OutputFormat, ResultFormatter};
use mqprobe::store::TestCaseStore;
use mqprobe::utils::{init_logger, Timer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    init_logger(env.resolve_log_level(args.verbose));

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.clone())
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    debug!("Using settings file {}", config_path.display());

    match args.command {
        cli::Command::Batch(batch_args) => {
            let config = AppConfig::load_effective(&config_path)?.with_env(&env);
            run_batch(&config, batch_args).await?;
        }
        cli::Command::Run(run_args) => {
            let config = AppConfig::load_effective(&config_path)?.with_env(&env);
            run_single(&config, run_args).await?;
        }
        cli::Command::Add(add_args) => {
            let config = AppConfig::load_effective(&config_path)?.with_env(&env);
            add_test_case(&config, add_args)?;
        }
        cli::Command::List(list_args) => {
            let config = AppConfig::load_effective(&config_path)?.with_env(&env);
            list_test_cases(&config, list_args)?;
        }
        cli::Command::Health => {
            let config = AppConfig::load_effective(&config_path)?.with_env(&env);
            check_health(&config).await?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &config_path, &env)?;
        }
    }

    Ok(())
}

fn engine(config: &AppConfig) -> Result<BatchExecutor<RabbitClient>> {
    let client = RabbitClient::from_config(config)?;
    Ok(BatchExecutor::with_parts(
        Arc::new(client),
        Arc::new(ExecutionRegistry::new()),
        LogBus::with_capacity(config.log_buffer),
    ))
}

fn parse_format(raw: &str) -> Result<OutputFormat> {
    OutputFormat::parse(raw).ok_or_else(|| anyhow::anyhow!("Unknown output format: {raw}"))
}

async fn run_batch(config: &AppConfig, args: cli::BatchArgs) -> Result<()> {
    let format = parse_format(&args.format)?;
    let store = TestCaseStore::new(config.tests_dir());

    let (test_cases, skipped) = if args.all {
        store.load_all()?
    } else if args.names.is_empty() {
        bail!("No test cases given. Pass names or use --all");
    } else {
        store.load_many(&args.names)
    };

    for skip in &skipped {
        eprintln!("⚠ Skipping {}: {}", skip.name, skip.reason);
    }
    if test_cases.is_empty() && !skipped.is_empty() {
        bail!("None of the requested test cases could be loaded");
    }

    let defaults = config.batch_options();
    let options = BatchOptions::from_raw(
        args.concurrency.unwrap_or(defaults.concurrency as i64),
        args.delay.unwrap_or(defaults.delay.as_millis() as i64),
    );

    let tasks = test_cases
        .into_iter()
        .map(|tc| Task::new(tc.name.clone(), tc))
        .collect();

    let snapshot = execute(config, tasks, options, format).await?;
    print_report(&snapshot, format);

    if let Some(path) = &args.output {
        write_report_to_file(path, &snapshot, format)?;
        info!("Report written to {path}");
    }

    if snapshot.failure_count > 0 {
        bail!(
            "{} of {} test cases did not succeed",
            snapshot.failure_count,
            snapshot.total_tests
        );
    }
    Ok(())
}

async fn run_single(config: &AppConfig, args: cli::RunArgs) -> Result<()> {
    let format = parse_format(&args.format)?;
    let test_case = TestCaseStore::new(config.tests_dir()).load(&args.name)?;

    let mocks = args
        .mock
        .as_deref()
        .map(MockSpec::parse)
        .unwrap_or_default();
    for entry in &mocks.invalid {
        eprintln!("⚠ Ignoring mock entry {entry:?}, expected field:type");
    }
    let tasks = repeated_tasks(&test_case, args.quantity, &mocks, &mut rand::rng());
    debug!("Publishing {} {} time(s)", test_case.name, tasks.len());

    let snapshot = execute(config, tasks, BatchOptions::sequential(), format).await?;
    let formatter = ResultFormatter::new(format);
    for result in &snapshot.results {
        println!("{}", formatter.format_result(result));
    }

    if snapshot.failure_count > 0 {
        bail!(
            "Test case {} did not succeed ({} of {} runs failed)",
            args.name,
            snapshot.failure_count,
            snapshot.total_tests
        );
    }
    Ok(())
}

/// Run tasks through the engine, printing live events until the execution
/// completes. A first Ctrl-C cancels the tasks that have not started yet, a
/// second one stops waiting for the running ones.
async fn execute(
    config: &AppConfig,
    tasks: Vec<Task<TestCase>>,
    options: BatchOptions,
    format: OutputFormat,
) -> Result<ExecutionSnapshot> {
    let engine = engine(config)?;
    let formatter = ResultFormatter::new(format);
    let timer = Timer::start("batch");

    let (id, mut logs) = engine.start_observed(tasks, options)?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut listening = true;
    let mut interrupts = cli::Interrupts::default();

    loop {
        tokio::select! {
            event = logs.recv() => match event {
                Some(event) => {
                    if format.streams_events() {
                        println!("{}", formatter.format_event(&event));
                    }
                }
                None => break,
            },
            signal = &mut ctrl_c, if listening => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {e}");
                    listening = false;
                    continue;
                }
                match interrupts.press() {
                    cli::Interrupt::CancelPending => {
                        eprintln!("⚠ Cancelling pending tasks, press Ctrl-C again to stop waiting");
                        engine.cancel(&id)?;
                        ctrl_c.set(tokio::signal::ctrl_c());
                    }
                    cli::Interrupt::Abort => bail!("Interrupted, execution {id} left running"),
                }
            }
        }
    }

    let snapshot = engine.wait(&id).await?;
    timer.stop();
    Ok(snapshot)
}

fn print_report(snapshot: &ExecutionSnapshot, format: OutputFormat) {
    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_report(snapshot));
}

fn add_test_case(config: &AppConfig, args: cli::AddArgs) -> Result<()> {
    let raw = match (&args.payload, &args.file) {
        (Some(payload), _) => payload.clone(),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read payload file {file}"))?,
        (None, None) => "{}".to_string(),
    };

    let payload: Map<String, Value> = match serde_json::from_str::<Value>(&raw)
        .context("Payload is not valid JSON")?
    {
        Value::Object(map) => map,
        _ => bail!("Payload must be a JSON object"),
    };

    let mut test_case = TestCase::new(&args.name, &args.route_key).with_payload(payload);
    for raw_header in &args.headers {
        let (key, value) = cli::parse_header(raw_header)
            .ok_or_else(|| anyhow::anyhow!("Invalid header {raw_header:?}, expected key=value"))?;
        test_case = test_case.with_header(key, value);
    }

    let path = TestCaseStore::new(config.tests_dir()).save(&test_case)?;
    println!("✓ Saved {} ({})", test_case, path.display());
    Ok(())
}

fn list_test_cases(config: &AppConfig, args: cli::ListArgs) -> Result<()> {
    let store = TestCaseStore::new(config.tests_dir());
    let names = store.list()?;

    if names.is_empty() {
        println!("No test cases in {}", store.base_dir().display());
        return Ok(());
    }

    println!("Test cases in {}:", store.base_dir().display());
    println!("{:-<60}", "");
    for name in &names {
        if !args.detailed {
            println!("  {name}");
            continue;
        }
        match store.load(name) {
            Ok(tc) => {
                println!("  {:24} -> {}", tc.name, tc.route_key);
                println!("    payload: {}", Value::Object(tc.json_pool.clone()));
                for (key, value) in &tc.headers {
                    println!("    header:  {key}: {value}");
                }
            }
            Err(e) => println!("  {name:24} (unreadable: {e:#})"),
        }
    }
    println!("{:-<60}", "");
    println!("{} test case(s)", names.len());
    Ok(())
}

async fn check_health(config: &AppConfig) -> Result<()> {
    let client = RabbitClient::from_config(config)?;
    let report = client.health().await?;

    if report.is_healthy() {
        println!(
            "✓ {} is reachable (status {}, {}ms)",
            report.url, report.status_code, report.duration_ms
        );
        Ok(())
    } else {
        println!("✗ {} answered with status {}", report.url, report.status_code);
        if !report.body.is_empty() {
            println!("  {}", report.body);
        }
        bail!("Management API is not healthy")
    }
}

fn manage_config(args: cli::ConfigArgs, path: &Path, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show { env: show_env, format } => {
            if show_env {
                env.print_summary();
                println!();
                print_env_help();
            } else {
                let config = AppConfig::load_effective(path)?.with_env(env);
                let output = if format == "yaml" {
                    serde_yaml::to_string(&config)?
                } else {
                    serde_json::to_string_pretty(&config)?
                };
                println!("{output}");
            }
        }
        cli::ConfigAction::Get { key } => {
            let config = AppConfig::load_effective(path)?.with_env(env);
            println!("{}", config.get(&key)?);
        }
        cli::ConfigAction::Set { key, value } => {
            // env overrides are not persisted
            let target = AppConfig::active_path(path)?;
            let mut config = AppConfig::load_or_default(&target)?;
            config.set(&key, &value)?;
            config.save(&target)?;
            println!("✓ {key} = {} ({})", config.get(&key)?, target.display());
        }
        cli::ConfigAction::Select { name } => {
            let profiles = ProfileManager::for_settings(path);
            match name {
                Some(name) => {
                    let selection = profiles.select(path, &name)?;
                    if selection.created {
                        println!("✓ Created profile {} ({})", selection.name, selection.path.display());
                    }
                    println!("✓ Active profile is now {}", selection.name);
                }
                None => {
                    let active = AppConfig::load_or_default(path)?.profile;
                    let names = profiles.list()?;
                    if names.is_empty() {
                        println!(
                            "No profiles in {}. Pass a name to create one, e.g. `mqprobe config select staging`",
                            profiles.base_dir().display()
                        );
                    } else {
                        println!("Profiles in {}:", profiles.base_dir().display());
                        for name in &names {
                            let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { " " };
                            println!("{marker} {name}");
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
