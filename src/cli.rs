use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{BatchOptions, ConnectionDescriptor, EnginePolicy, MigrationMode, OnError, RetryPolicy};
use crate::error::MigrateError;

/// Migrates authoritative DNS zones between two PowerDNS servers.
///
/// Flag surface mirrors `original_source/powerdns_migrator/cli.py`'s
/// `argparse` parser 1:1, generalized to `clap::Parser` the way
/// `ktheindifferent-AtlasDNS/src/bin/atlas-cli.rs` derives its CLI.
#[derive(Debug, Parser)]
#[command(name = "pdns-migrate", about, version)]
pub struct Cli {
    #[arg(long, env = "PDNS_MIGRATE_SOURCE_URL")]
    pub source_url: String,
    #[arg(long, env = "PDNS_MIGRATE_SOURCE_KEY")]
    pub source_key: String,
    #[arg(long, default_value = "localhost", env = "PDNS_MIGRATE_SOURCE_SERVER_ID")]
    pub source_server_id: String,
    #[arg(long)]
    pub insecure_source: bool,

    #[arg(long, env = "PDNS_MIGRATE_TARGET_URL")]
    pub target_url: String,
    #[arg(long, env = "PDNS_MIGRATE_TARGET_KEY")]
    pub target_key: String,
    #[arg(long, default_value = "localhost", env = "PDNS_MIGRATE_TARGET_SERVER_ID")]
    pub target_server_id: String,
    #[arg(long)]
    pub insecure_target: bool,

    /// Migrate a single zone. Mutually exclusive with `--zones-file`.
    #[arg(long)]
    pub zone: Option<String>,

    /// Migrate every zone named in this file, one per line.
    #[arg(long)]
    pub zones_file: Option<PathBuf>,

    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,
    #[arg(long)]
    pub recreate: bool,
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, default_value_t = 3)]
    pub retries: u32,
    #[arg(long, default_value_t = 0.5)]
    pub retry_backoff: f64,
    #[arg(long, default_value_t = 5.0)]
    pub retry_max_backoff: f64,
    #[arg(long, default_value_t = 0.1)]
    pub retry_jitter: f64,

    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,
    #[arg(long, value_enum, default_value_t = OnErrorArg::Continue)]
    pub on_error: OnErrorArg,
    #[arg(long, default_value_t = 30.0)]
    pub progress_interval: f64,
    #[arg(long, default_value_t = 0.0)]
    pub graceful_timeout: f64,

    /// Drop an invalid apex CNAME rather than fail the zone on conflict.
    #[arg(long)]
    pub auto_fix_cname_conflicts: bool,
    /// Drop a duplicate CNAME rrset at the same name.
    #[arg(long)]
    pub auto_fix_double_cname_conflicts: bool,
    /// Canonicalize doubled backslash escapes in TXT record content.
    #[arg(long)]
    pub normalize_txt_escapes: bool,
    /// Preserve the target's SOA serial instead of overwriting it from source.
    #[arg(long)]
    pub ignore_soa_serial: bool,

    #[arg(long, default_value = "info", env = "PDNS_MIGRATE_LOG_LEVEL")]
    pub log_level: String,
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OnErrorArg {
    Continue,
    Stop,
}

impl From<OnErrorArg> for OnError {
    fn from(v: OnErrorArg) -> Self {
        match v {
            OnErrorArg::Continue => OnError::Continue,
            OnErrorArg::Stop => OnError::Stop,
        }
    }
}

impl Cli {
    pub fn validate(&self) -> Result<(), MigrateError> {
        match (&self.zone, &self.zones_file) {
            (Some(_), Some(_)) => Err(MigrateError::config(
                "--zone and --zones-file are mutually exclusive",
            )),
            (None, None) => Err(MigrateError::config(
                "one of --zone or --zones-file is required",
            )),
            _ => Ok(()),
        }
    }

    pub fn source_connection(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.source_url.clone(), self.source_key.clone())
            .with_server_id(self.source_server_id.clone())
            .with_verify_ssl(!self.insecure_source)
    }

    pub fn target_connection(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.target_url.clone(), self.target_key.clone())
            .with_server_id(self.target_server_id.clone())
            .with_verify_ssl(!self.insecure_target)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs_f64(self.timeout),
            retries: self.retries,
            backoff: Duration::from_secs_f64(self.retry_backoff),
            max_backoff: Duration::from_secs_f64(self.retry_max_backoff),
            jitter: Duration::from_secs_f64(self.retry_jitter),
        }
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            ignore_soa_serial: self.ignore_soa_serial,
            auto_fix_cname_conflicts: self.auto_fix_cname_conflicts,
            auto_fix_double_cname_conflicts: self.auto_fix_double_cname_conflicts,
            normalize_txt_escapes: self.normalize_txt_escapes,
        }
    }

    pub fn migration_mode(&self) -> MigrationMode {
        MigrationMode {
            recreate: self.recreate,
            dry_run: self.dry_run,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency.max(1),
            on_error: self.on_error.into(),
            progress_interval: Duration::from_secs_f64(self.progress_interval),
            graceful_timeout: Duration::from_secs_f64(self.graceful_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "pdns-migrate",
            "--source-url", "http://source:8081",
            "--source-key", "skey",
            "--target-url", "http://target:8081",
            "--target-key", "tkey",
        ]
    }

    #[test]
    fn rejects_both_zone_and_zones_file() {
        let mut args = base_args();
        args.extend(["--zone", "example.com.", "--zones-file", "zones.txt"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn rejects_neither_zone_nor_zones_file() {
        let cli = Cli::try_parse_from(base_args()).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn accepts_single_zone() {
        let mut args = base_args();
        args.extend(["--zone", "example.com."]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn insecure_flags_invert_into_verify_ssl() {
        let mut args = base_args();
        args.extend(["--zone", "example.com.", "--insecure-source"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(!cli.source_connection().verify_ssl);
        assert!(cli.target_connection().verify_ssl);
    }
}
