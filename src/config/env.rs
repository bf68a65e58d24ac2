//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

use crate::utils::LogLevel;

/// Environment variable prefix
const ENV_PREFIX: &str = "MQPROBE";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Management API URL from MQPROBE_HOST
    pub host: Option<String>,
    /// Credentials from MQPROBE_AUTH
    pub auth: Option<String>,
    /// Exchange from MQPROBE_EXCHANGE
    pub exchange: Option<String>,
    /// Test case directory from MQPROBE_TESTS_DIR
    pub tests_dir: Option<String>,
    /// Batch concurrency from MQPROBE_CONCURRENCY
    pub concurrency: Option<usize>,
    /// Batch delay from MQPROBE_DELAY_MS
    pub delay_ms: Option<u64>,
    /// Timeout from MQPROBE_TIMEOUT
    pub timeout: Option<u64>,
    /// Config file from MQPROBE_CONFIG
    pub config_file: Option<String>,
    /// Verbose from MQPROBE_VERBOSE
    pub verbose: Option<bool>,
    /// Diagnostic level from MQPROBE_LOG_LEVEL
    pub log_level: Option<LogLevel>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            host: get_env("HOST"),
            auth: get_env("AUTH"),
            exchange: get_env("EXCHANGE"),
            tests_dir: get_env("TESTS_DIR"),
            concurrency: get_env_parse("CONCURRENCY"),
            delay_ms: get_env_parse("DELAY_MS"),
            timeout: get_env_parse("TIMEOUT"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
            log_level: get_env("LOG_LEVEL").and_then(|v| LogLevel::parse(&v)),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.host.is_some()
            || self.auth.is_some()
            || self.exchange.is_some()
            || self.tests_dir.is_some()
            || self.concurrency.is_some()
            || self.delay_ms.is_some()
            || self.timeout.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
            || self.log_level.is_some()
    }

    /// Level for diagnostics: verbose wins, then the configured level
    pub fn resolve_log_level(&self, verbose_flag: bool) -> LogLevel {
        if verbose_flag || self.verbose.unwrap_or(false) {
            LogLevel::from_verbose(true)
        } else {
            self.log_level.unwrap_or(LogLevel::from_verbose(false))
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_HOST:         {:?}", ENV_PREFIX, self.host);
        println!(
            "  {}_AUTH:         {}",
            ENV_PREFIX,
            if self.auth.is_some() { "<set>" } else { "None" }
        );
        println!("  {}_EXCHANGE:     {:?}", ENV_PREFIX, self.exchange);
        println!("  {}_TESTS_DIR:    {:?}", ENV_PREFIX, self.tests_dir);
        println!("  {}_CONCURRENCY:  {:?}", ENV_PREFIX, self.concurrency);
        println!("  {}_DELAY_MS:     {:?}", ENV_PREFIX, self.delay_ms);
        println!("  {}_TIMEOUT:      {:?}", ENV_PREFIX, self.timeout);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_LOG_LEVEL:    {:?}", ENV_PREFIX, self.log_level);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables in tests
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    /// Set management API URL
    pub fn host(self, host: impl Into<String>) -> Self {
        self.var("HOST", host)
    }

    /// Set exchange
    pub fn exchange(self, exchange: impl Into<String>) -> Self {
        self.var("EXCHANGE", exchange)
    }

    /// Set batch concurrency
    pub fn concurrency(self, concurrency: usize) -> Self {
        self.var("CONCURRENCY", concurrency.to_string())
    }

    /// Set batch delay
    pub fn delay_ms(self, delay_ms: u64) -> Self {
        self.var("DELAY_MS", delay_ms.to_string())
    }

    /// Set timeout
    pub fn timeout(self, timeout: u64) -> Self {
        self.var("TIMEOUT", timeout.to_string())
    }

    /// Set verbose
    pub fn verbose(self, verbose: bool) -> Self {
        self.var("VERBOSE", verbose.to_string())
    }

    /// Set diagnostic level
    pub fn log_level(self, level: impl Into<String>) -> Self {
        self.var("LOG_LEVEL", level)
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

#[cfg(test)]
impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all MQPROBE environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_HOST          Management API URL (default http://localhost:15672)");
    println!("  {ENV_PREFIX}_AUTH          Base64 encoded user:password");
    println!("  {ENV_PREFIX}_EXCHANGE      Exchange to publish through");
    println!("  {ENV_PREFIX}_TESTS_DIR     Directory holding test case files");
    println!("  {ENV_PREFIX}_CONCURRENCY   Default batch concurrency");
    println!("  {ENV_PREFIX}_DELAY_MS      Default delay between batch tasks");
    println!("  {ENV_PREFIX}_TIMEOUT       Request timeout in seconds");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE       Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_LOG_LEVEL     Diagnostic level (trace, debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_HOST=http://rabbit.local:15672");
    println!("  mqprobe batch --all");
}
