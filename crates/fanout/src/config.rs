//! Configuration Management
//!
//! Settings for the submitting side (master, streamer, submissions), taken
//! from the command line or from a YAML/JSON file.
//!
//! ```text
//! MasterConfig
//!   ├─ NetworkConfig  (task_in / task_out / receiver urls, control port)
//!   ├─ ClusterConfig  (hosts, pool program, remote shell)
//!   └─ LoggingConfig
//! ```

use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, Parser};
use fanout_protocol::{parse_hosts, Endpoint, HostSpec};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Master configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct MasterConfig {
    #[command(flatten)]
    pub network: NetworkConfig,

    #[command(flatten)]
    pub cluster: ClusterConfig,

    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Load settings from a YAML or JSON file instead of the command line
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// Endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct NetworkConfig {
    /// Streamer inbound endpoint; submitters push tasks here
    #[arg(long, default_value = "tcp://127.0.0.1:1911")]
    pub task_in_url: String,

    /// Streamer outbound endpoint; workers pull tasks from here
    #[arg(long, default_value = "tcp://127.0.0.1:1910")]
    pub task_out_url: String,

    /// Reply endpoint hint for submissions: fixed port, 0, or a range lo-hi
    #[arg(long, default_value = "tcp://127.0.0.1:0")]
    pub receiver_url: String,

    /// Port every pool binds its control endpoint on
    #[arg(long, default_value_t = 1909)]
    pub ctrl_port: u16,
}

/// Hosts and how to launch pools on them
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct ClusterConfig {
    /// Hosts and their worker counts, e.g. "127.0.0.1 -1, node2 16"
    #[arg(long, default_value = "127.0.0.1 -1")]
    pub hosts: String,

    /// Pool supervisor program for local hosts (defaults to fanout-pool next to this binary)
    #[arg(long)]
    pub pool_program: Option<PathBuf>,

    /// Pool supervisor program on remote hosts (defaults to the local pool program)
    #[arg(long)]
    pub remote_program: Option<String>,

    /// Remote shell used to launch pools on other hosts
    #[arg(long, default_value = "ssh")]
    pub remote_shell: String,
}

/// Logging
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl LoggingConfig {
    pub fn new(log_level: impl Into<String>) -> Self {
        Self {
            log_level: log_level.into(),
        }
    }

    /// Effective level, `info` when the configured one is not recognised.
    pub fn level(&self) -> &str {
        if LOG_LEVELS.contains(&self.log_level.as_str()) {
            &self.log_level
        } else {
            eprintln!("Invalid log level: {}, using 'info'", self.log_level);
            "info"
        }
    }
}

impl MasterConfig {
    /// Read a YAML (.yaml/.yml) or JSON (.json) configuration file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let name = path.to_string_lossy();

        if name.ends_with(".yaml") || name.ends_with(".yml") {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", name, e)))
        } else if name.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", name, e)))
        } else {
            Err(Error::Config(format!(
                "unsupported config file format for {} (use .yaml, .yml or .json)",
                name
            )))
        }
    }

    /// Load the config file when one is given, let flags set on the command
    /// line override it, then validate.
    pub fn resolve(self, matches: &ArgMatches) -> Result<Self> {
        let config = match &self.config_file {
            Some(path) => {
                let mut file_config = Self::from_file(path)?;
                file_config.config_file = Some(path.clone());
                self.merge_with(file_config, matches)
            }
            None => self,
        };
        config.validate()?;
        Ok(config)
    }

    /// Command-line values win over `file_config` only where they were
    /// actually given; clap defaults never override the file.
    fn merge_with(self, file_config: Self, matches: &ArgMatches) -> Self {
        let given = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
        let mut merged = file_config;

        if given("task_in_url") {
            merged.network.task_in_url = self.network.task_in_url;
        }
        if given("task_out_url") {
            merged.network.task_out_url = self.network.task_out_url;
        }
        if given("receiver_url") {
            merged.network.receiver_url = self.network.receiver_url;
        }
        if given("ctrl_port") {
            merged.network.ctrl_port = self.network.ctrl_port;
        }
        if given("hosts") {
            merged.cluster.hosts = self.cluster.hosts;
        }
        if given("pool_program") {
            merged.cluster.pool_program = self.cluster.pool_program;
        }
        if given("remote_program") {
            merged.cluster.remote_program = self.cluster.remote_program;
        }
        if given("remote_shell") {
            merged.cluster.remote_shell = self.cluster.remote_shell;
        }
        if given("log_level") {
            merged.logging.log_level = self.logging.log_level;
        }
        merged
    }

    pub fn validate(&self) -> Result<()> {
        for url in [
            &self.network.task_in_url,
            &self.network.task_out_url,
            &self.network.receiver_url,
        ] {
            url.parse::<Endpoint>()?;
        }

        if self.network.task_in_url == self.network.task_out_url {
            return Err(Error::Config(
                "task_in_url and task_out_url must differ".to_string(),
            ));
        }

        if self.network.ctrl_port == 0 {
            return Err(Error::Config("ctrl_port must be greater than 0".to_string()));
        }

        if self.host_specs()?.is_empty() {
            return Err(Error::Config("at least one host is required".to_string()));
        }

        if !LOG_LEVELS.contains(&self.logging.log_level.as_str()) {
            return Err(Error::Config(format!(
                "invalid log_level: {} (must be trace/debug/info/warn/error)",
                self.logging.log_level
            )));
        }

        Ok(())
    }

    pub fn host_specs(&self) -> Result<Vec<HostSpec>> {
        Ok(parse_hosts(&self.cluster.hosts)?)
    }

    pub fn print_summary(&self) {
        println!("Fanout configuration:");
        println!("  Network:");
        println!("    Task in:    {}", self.network.task_in_url);
        println!("    Task out:   {}", self.network.task_out_url);
        println!("    Receiver:   {}", self.network.receiver_url);
        println!("    Ctrl port:  {}", self.network.ctrl_port);
        println!("  Cluster:");
        println!("    Hosts:      {}", self.cluster.hosts);
        if let Some(program) = &self.cluster.pool_program {
            println!("    Pool:       {}", program.display());
        }
        println!("    Shell:      {}", self.cluster.remote_shell);
        println!("  Logging:");
        println!("    Level:      {}", self.logging.log_level);
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            task_in_url: "tcp://127.0.0.1:1911".to_string(),
            task_out_url: "tcp://127.0.0.1:1910".to_string(),
            receiver_url: "tcp://127.0.0.1:0".to_string(),
            ctrl_port: 1909,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hosts: "127.0.0.1 -1".to_string(),
            pool_program: None,
            remote_program: None,
            remote_shell: "ssh".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info")
    }
}
