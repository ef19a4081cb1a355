use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use tokio::time::Duration;

use crate::runner::RunConfig;
use crate::utils::parse_duration_string;
use crate::window::PacingMode;

/// Container variables carrying the per-direction flags, e.g. `-sr -rcu 5`.
pub const READ_STRESS_CONFIG: &str = "READ_STRESS_CONFIG";
pub const WRITE_STRESS_CONFIG: &str = "WRITE_STRESS_CONFIG";

/// Single-dash multi-letter flags accepted for compatibility with existing
/// task definitions, and the long flag each one stands for.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-sr", "--stress-read"),
    ("-sw", "--stress-write"),
    ("-rcu", "--read-capacity"),
    ("-wcu", "--write-capacity"),
];

/// Throughput-controlled read/write load against a DynamoDB table.
#[derive(Debug, Clone, Parser)]
#[command(name = "ddb_stress", version, about, long_about = None, args_override_self = true)]
pub struct Config {
    /// Stress table reads
    #[arg(long)]
    pub stress_read: bool,

    /// Stress table writes
    #[arg(long)]
    pub stress_write: bool,

    /// Read capacity units to consume per second
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub read_capacity: i64,

    /// Write capacity units to consume per second
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub write_capacity: i64,

    /// Region of the target table
    #[arg(short = 'r', long, env = "TABLE_REGION")]
    pub table_region: String,

    /// Name of the target table
    #[arg(short = 'n', long, env = "TABLE_NAME")]
    pub table_name: String,

    /// Hash key attribute name of the target table
    #[arg(short = 'k', long, env = "HASH_KEY")]
    pub hash_key: String,

    /// Test duration: whole seconds, or 30s, 10m, 2h, 1d
    #[arg(short = 'd', long, env = "DURATION", default_value = "60", value_parser = parse_duration_string)]
    pub test_duration: Duration,

    /// Named AWS credentials profile
    #[arg(short = 'p', long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// How calls are spread inside each one-second window: burst or smooth
    #[arg(long, default_value = "burst")]
    pub pacing: PacingMode,

    /// Upper bound on each idle sleep of the pacing loop, in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub idle_tick_ms: u64,

    /// File of partition key values, one per line
    #[arg(long)]
    pub key_values_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this port while the run is active
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Drive a simulated provider instead of DynamoDB
    #[arg(long)]
    pub dry_run: bool,

    /// Simulated operation latency for --dry-run, in milliseconds
    #[arg(long, default_value_t = 5)]
    pub dry_run_latency_ms: u64,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

/// Rewrites legacy single-dash flags to their long form.
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            LEGACY_FLAGS
                .iter()
                .find(|(legacy, _)| arg.to_str() == Some(*legacy))
                .map(|(_, long)| OsString::from(*long))
                .unwrap_or(arg)
        })
        .collect()
}

/// Appends the whitespace-separated flags of the container variables.
/// A flag repeated here overrides the same flag given on the command line.
pub fn append_stress_config(
    mut args: Vec<OsString>,
    read_config: Option<&str>,
    write_config: Option<&str>,
) -> Vec<OsString> {
    for config in [read_config, write_config].into_iter().flatten() {
        args.extend(config.split_whitespace().map(OsString::from));
    }
    args
}

impl Config {
    /// Parses arguments after folding in the container variables and
    /// normalising legacy flags.
    pub fn try_parse_with_env<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let read_config = env::var(READ_STRESS_CONFIG).ok();
        let write_config = env::var(WRITE_STRESS_CONFIG).ok();
        let args = append_stress_config(
            args.into_iter().map(Into::into).collect(),
            read_config.as_deref(),
            write_config.as_deref(),
        );
        Self::try_parse_from(normalize_legacy_flags(args))
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    /// The run parameters; validation happens in [`RunConfig::validate`].
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            stress_read: self.stress_read,
            stress_write: self.stress_write,
            read_capacity: self.read_capacity,
            write_capacity: self.write_capacity,
            duration: self.test_duration,
            key: self.hash_key.clone(),
            pacing: self.pacing,
            idle_tick: self.idle_tick(),
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        println!("Starting stress test:");
        println!("  Table: {} ({})", self.table_name, self.table_region);
        println!("  Hash Key: {}", self.hash_key);
        println!("  Test Duration: {:?}", self.test_duration);
        if self.stress_read {
            println!("  Reads: {} per second", self.read_capacity);
        } else {
            println!("  Reads: disabled");
        }
        if self.stress_write {
            println!("  Writes: {} per second", self.write_capacity);
        } else {
            println!("  Writes: disabled");
        }
        println!("  Pacing: {:?}", self.pacing);
        if let Some(profile) = &self.profile {
            println!("  Credentials Profile: {}", profile);
        }
        if self.dry_run {
            println!("  Dry Run: Yes (simulated provider, {}ms latency)", self.dry_run_latency_ms);
        }
        if let Some(port) = self.metrics_port {
            println!("  Metrics: http://0.0.0.0:{}/metrics", port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_legacy_flags() {
        let args = normalize_legacy_flags(["ddb_stress", "-sr", "-rcu", "10", "-sw", "-wcu", "3", "-r", "eu-west-1"]);
        let args: Vec<_> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            vec![
                "ddb_stress",
                "--stress-read",
                "--read-capacity",
                "10",
                "--stress-write",
                "--write-capacity",
                "3",
                "-r",
                "eu-west-1"
            ]
        );
    }

    #[test]
    fn test_append_stress_config() {
        let args = append_stress_config(
            vec![OsString::from("ddb_stress")],
            Some("-sr -rcu 5"),
            Some(""),
        );
        assert_eq!(args.len(), 4);
        assert_eq!(args[3], OsString::from("5"));
    }

    #[test]
    fn test_parse_full_command_line() {
        let config = Config::try_parse_from(normalize_legacy_flags([
            "ddb_stress", "-sw", "-wcu", "7", "-r", "eu-west-1", "-n", "MyTable2", "-k", "MyKey", "-d", "420",
        ]))
        .unwrap();

        assert!(config.stress_write);
        assert!(!config.stress_read);
        assert_eq!(config.write_capacity, 7);
        assert_eq!(config.read_capacity, 5);
        assert_eq!(config.test_duration, Duration::from_secs(420));
        assert_eq!(config.pacing, PacingMode::Burst);

        let run = config.to_run_config();
        assert_eq!(run.key, "MyKey");
        assert_eq!(run.validate().unwrap().len(), 1);
    }

    #[test]
    fn test_negative_capacity_parses_then_fails_validation() {
        let config = Config::try_parse_from([
            "ddb_stress", "--stress-read", "--read-capacity", "-2", "-r", "x", "-n", "t", "-k", "k",
        ])
        .unwrap();
        assert_eq!(config.read_capacity, -2);
        assert!(config.to_run_config().validate().is_err());
    }

    #[test]
    fn test_duration_suffix_and_pacing() {
        let config = Config::try_parse_from([
            "ddb_stress", "-r", "x", "-n", "t", "-k", "k", "-d", "2m", "--pacing", "smooth",
        ])
        .unwrap();
        assert_eq!(config.test_duration, Duration::from_secs(120));
        assert_eq!(config.pacing, PacingMode::Smooth);
    }

    #[test]
    fn test_zero_idle_tick_rejected() {
        let result = Config::try_parse_from([
            "ddb_stress", "-r", "x", "-n", "t", "-k", "k", "--idle-tick-ms", "0",
        ]);
        assert!(result.is_err());
    }
}
