//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// Batch message test runner for the RabbitMQ management API
#[derive(Parser, Debug)]
#[command(name = "mqprobe")]
#[command(version)]
#[command(about = "Publish stored message test cases to RabbitMQ, one at a time or in batches")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to ~/.mqprobe/settings.json)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run several test cases with bounded concurrency
    Batch(BatchArgs),

    /// Run a single test case
    Run(RunArgs),

    /// Create or replace a test case
    Add(AddArgs),

    /// List stored test cases
    List(ListArgs),

    /// Check that the management API is reachable
    Health,

    /// Show or change settings
    Config(ConfigArgs),
}

/// Arguments for batch command
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Test case names to run
    pub names: Vec<String>,

    /// Run every stored test case
    #[arg(short, long, conflicts_with = "names")]
    pub all: bool,

    /// Number of tests in flight at once (defaults to the configured value)
    #[arg(short, long, allow_negative_numbers = true)]
    pub concurrency: Option<i64>,

    /// Delay in milliseconds before each test after the first
    #[arg(short, long, allow_negative_numbers = true)]
    pub delay: Option<i64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save the final report to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Test case name
    pub name: String,

    /// Number of times to publish the test case, one after another
    #[arg(short = 'n', long, default_value = "1")]
    pub quantity: usize,

    /// Payload fields to fill with random values on every publish, as
    /// field:type pairs (int, float, string, time, bool), comma separated
    /// or as a JSON array
    #[arg(short, long)]
    pub mock: Option<String>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for add command
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Test case name
    pub name: String,

    /// Routing key the message is published with
    #[arg(short, long)]
    pub route_key: String,

    /// JSON object used as the message payload
    #[arg(short, long, conflicts_with = "file")]
    pub payload: Option<String>,

    /// Read the JSON payload from a file
    #[arg(long)]
    pub file: Option<String>,

    /// Extra request header (repeatable), as key=value
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show routing keys and payloads
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective settings
    Show {
        /// Show environment variable overrides instead
        #[arg(short, long)]
        env: bool,

        /// Output format (json, yaml)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Print one setting
    Get {
        /// Setting key
        key: String,
    },

    /// Change one setting and save it
    Set {
        /// Setting key
        key: String,

        /// New value
        value: String,
    },

    /// List settings profiles, or switch to one (created with defaults if
    /// missing)
    Select {
        /// Profile name
        name: Option<String>,
    },
}

/// What a Ctrl-C press during a run should do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// Skip the tasks that have not started yet
    CancelPending,
    /// Stop waiting for the tasks that are still running
    Abort,
}

/// Counts Ctrl-C presses during one run
#[derive(Debug, Default)]
pub struct Interrupts {
    presses: usize,
}

impl Interrupts {
    pub fn press(&mut self) -> Interrupt {
        self.presses += 1;
        if self.presses == 1 {
            Interrupt::CancelPending
        } else {
            Interrupt::Abort
        }
    }
}

/// Split a `key=value` header argument
pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_args() {
        let args = Args::parse_from(["mqprobe", "batch", "order", "audit", "-c", "5", "-d", "0"]);
        match args.command {
            Command::Batch(batch) => {
                assert_eq!(batch.names, vec!["order", "audit"]);
                assert_eq!(batch.concurrency, Some(5));
                assert_eq!(batch.delay, Some(0));
                assert!(!batch.all);
                assert_eq!(batch.format, "table");
            }
            _ => panic!("Expected Batch command"),
        }
    }

    #[test]
    fn test_batch_negative_values_parse() {
        let args = Args::parse_from(["mqprobe", "batch", "--all", "-c", "-2", "-d", "-10"]);
        match args.command {
            Command::Batch(batch) => {
                assert!(batch.all);
                assert_eq!(batch.concurrency, Some(-2));
                assert_eq!(batch.delay, Some(-10));
            }
            _ => panic!("Expected Batch command"),
        }
    }

    #[test]
    fn test_batch_all_conflicts_with_names() {
        assert!(Args::try_parse_from(["mqprobe", "batch", "--all", "order"]).is_err());
    }

    #[test]
    fn test_add_args() {
        let args = Args::parse_from([
            "mqprobe",
            "--verbose",
            "add",
            "order",
            "--route-key",
            "q.orders",
            "--payload",
            "{\"id\":1}",
            "-H",
            "x-zone=eu",
            "-H",
            "x-team=core",
        ]);
        assert!(args.verbose);
        match args.command {
            Command::Add(add) => {
                assert_eq!(add.route_key, "q.orders");
                assert_eq!(add.payload.as_deref(), Some("{\"id\":1}"));
                assert_eq!(add.headers.len(), 2);
            }
            _ => panic!("Expected Add command"),
        }
    }

    #[test]
    fn test_config_set() {
        let args = Args::parse_from(["mqprobe", "config", "set", "host", "http://mq:15672"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Set { key, value },
            }) => {
                assert_eq!(key, "host");
                assert_eq!(value, "http://mq:15672");
            }
            _ => panic!("Expected Config set"),
        }
    }

    #[test]
    fn test_run_args() {
        let args = Args::parse_from(["mqprobe", "run", "order"]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.quantity, 1);
                assert!(run.mock.is_none());
            }
            _ => panic!("Expected Run command"),
        }

        let args = Args::parse_from([
            "mqprobe", "run", "order", "-n", "25", "--mock", "id:int,sent:time",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.name, "order");
                assert_eq!(run.quantity, 25);
                assert_eq!(run.mock.as_deref(), Some("id:int,sent:time"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_config_select() {
        let args = Args::parse_from(["mqprobe", "config", "select", "staging"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Select { name },
            }) => assert_eq!(name.as_deref(), Some("staging")),
            _ => panic!("Expected Config select"),
        }

        let args = Args::parse_from(["mqprobe", "config", "select"]);
        assert!(matches!(
            args.command,
            Command::Config(ConfigArgs {
                action: ConfigAction::Select { name: None },
            })
        ));
    }

    #[test]
    fn test_second_interrupt_aborts() {
        let mut interrupts = Interrupts::default();
        assert_eq!(interrupts.press(), Interrupt::CancelPending);
        assert_eq!(interrupts.press(), Interrupt::Abort);
        assert_eq!(interrupts.press(), Interrupt::Abort);
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("x-zone = eu"),
            Some(("x-zone".to_string(), "eu".to_string()))
        );
        assert_eq!(parse_header("novalue"), None);
        assert_eq!(parse_header("=eu"), None);
    }
}
