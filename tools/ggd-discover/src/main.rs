// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ggd-discover - Greengrass core discovery from the command line
//!
//! Asks the discovery service which core a thing belongs to, picks a
//! reachable connectivity endpoint and prints it together with the group CA.
//!
//! # Usage
//!
//! ```bash
//! # Discover with mutual TLS
//! ggd-discover --endpoint greengrass-ats.iot.eu-west-1.amazonaws.com \
//!     --thing-name sensor-01 --root-ca AmazonRootCA1.pem \
//!     --cert device.pem.crt --key private.pem.key --ca-out group-ca.pem
//!
//! # Everything from a config file, JSON output
//! ggd-discover --config discovery.json --format json
//!
//! # Plain HTTP against a local test responder, fixed interface
//! ggd-discover --endpoint localhost --port 8080 --thing-name t1 --plain --interface 0
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use ggd_discovery::{
    Connector, DiscoveryConfig, DiscoveryError, DiscoverySession, HostAddressData, TcpConnector,
    TlsConnector,
};
use std::path::PathBuf;
use tracing::{info, warn, Level};

/// Greengrass core discovery
#[derive(Parser, Debug)]
#[command(name = "ggd-discover")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format); flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Discovery service host
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Discovery service port
    #[arg(short, long)]
    port: Option<u16>,

    /// Thing name to discover the core for
    #[arg(short, long)]
    thing_name: Option<String>,

    /// Use this connectivity entry instead of probing
    #[arg(short, long)]
    interface: Option<usize>,

    /// Scratch buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Root CA for the discovery service (PEM)
    #[arg(long)]
    root_ca: Option<PathBuf>,

    /// Client certificate (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Attempts before giving up
    #[arg(long)]
    attempts: Option<u32>,

    /// Pause between attempts in milliseconds
    #[arg(long)]
    retry_wait_ms: Option<u64>,

    /// Plain TCP instead of TLS (local testing only)
    #[arg(long, default_value = "false")]
    plain: bool,

    /// Write the group CA to this file
    #[arg(long)]
    ca_out: Option<PathBuf>,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = load_config(&args)?;
    config.validate().context("invalid configuration")?;

    let core = if args.plain {
        discover_with_retry(TcpConnector::new(config.timeouts()), &config)?
    } else {
        let credentials = config
            .tls_credentials()
            .context("loading TLS credentials")?;
        let connector = TlsConnector::new(&credentials, config.timeouts())
            .context("building TLS client")?;
        discover_with_retry(connector, &config)?
    };

    print_core(&core, args.format)?;

    if let Some(path) = &args.ca_out {
        let pem = core
            .certificate_pem()
            .ok_or_else(|| anyhow!("group CA is not valid UTF-8"))?;
        std::fs::write(path, format!("{}\n", pem))
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Group CA written to {}", path.display());
    }

    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // try_init also routes `log` records from the library into tracing.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

fn load_config(args: &Args) -> Result<DiscoveryConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            DiscoveryConfig::from_file(path).with_context(|| format!("reading {:?}", path))?
        }
        None => {
            let (Some(endpoint), Some(thing_name)) = (&args.endpoint, &args.thing_name) else {
                bail!("--endpoint and --thing-name are required without --config");
            };
            DiscoveryConfig::new(endpoint.as_str(), thing_name.as_str())
        }
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(thing_name) = &args.thing_name {
        config.thing_name.clone_from(thing_name);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.interface.is_some() {
        config.interface = args.interface;
    }
    if let Some(buffer_size) = args.buffer_size {
        config.buffer_size = buffer_size;
    }
    if args.root_ca.is_some() {
        config.root_ca_path.clone_from(&args.root_ca);
    }
    if args.cert.is_some() {
        config.client_cert_path.clone_from(&args.cert);
    }
    if args.key.is_some() {
        config.client_key_path.clone_from(&args.key);
    }
    if let Some(attempts) = args.attempts {
        config.attempts = attempts;
    }
    if let Some(retry_wait_ms) = args.retry_wait_ms {
        config.retry_wait_ms = retry_wait_ms;
    }

    Ok(config)
}

fn discover_with_retry<C: Connector>(
    connector: C,
    config: &DiscoveryConfig,
) -> Result<HostAddressData> {
    let mut session = DiscoverySession::new(connector, config.buffer_size);
    let request = config.request();

    info!(
        "Discovering core for {} via {}:{}",
        config.thing_name, config.endpoint, config.port
    );

    let mut attempt = 1;
    loop {
        let err = match session.discover(&request) {
            Ok(core) => return Ok(core),
            Err(err) => err,
        };

        if let DiscoveryError::BufferTooSmall { required, .. } = &err {
            bail!(
                "discovery document needs {} bytes, buffer_size is {}; increase buffer_size",
                required,
                config.buffer_size
            );
        }
        if !err.is_retryable() || attempt >= config.attempts {
            return Err(err)
                .with_context(|| format!("discovery failed after {} attempt(s)", attempt));
        }

        warn!(
            "Attempt {}/{} failed: {}; retrying in {:?}",
            attempt,
            config.attempts,
            err,
            config.retry_wait()
        );
        std::thread::sleep(config.retry_wait());
        attempt += 1;
    }
}

fn print_core(core: &HostAddressData, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Pretty => {
            println!("core:        {}:{}", core.host, core.port);
            if let Some(arn) = &core.core_thing_arn {
                println!("thing arn:   {}", arn);
            }
            if let Some(group) = &core.group_id {
                println!("group:       {}", group);
            }
            if let Some(cert) = &core.certificate {
                println!("group CA:    {} bytes", cert.len());
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "host": core.host,
                "port": core.port,
                "group_id": core.group_id,
                "core_thing_arn": core.core_thing_arn,
                "certificate": core.certificate_pem(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ggd_discovery::transport::{MemoryConnector, Route};
    use ggd_discovery::Selection;

    fn args(list: &[&str]) -> Args {
        let mut argv = vec!["ggd-discover"];
        argv.extend_from_slice(list);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_from_flags() {
        let config = load_config(&args(&[
            "--endpoint",
            "gg.local",
            "--thing-name",
            "t1",
            "--interface",
            "2",
            "--attempts",
            "1",
        ]))
        .unwrap();

        assert_eq!(config.endpoint, "gg.local");
        assert_eq!(config.port, 8443);
        assert_eq!(config.attempts, 1);
        assert!(matches!(config.selection(), Selection::Manual(p) if p.interface == 2));
    }

    #[test]
    fn test_flags_required_without_config() {
        assert!(load_config(&args(&["--endpoint", "gg.local"])).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.json");
        let mut base = DiscoveryConfig::new("gg.local", "t1");
        base.buffer_size = 8192;
        base.to_file(&path).unwrap();

        let config = load_config(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--port",
            "443",
        ]))
        .unwrap();

        assert_eq!(config.port, 443);
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.thing_name, "t1");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("p".parse::<OutputFormat>().unwrap(), OutputFormat::Pretty);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_retry_stops_at_attempts() {
        let mut config = DiscoveryConfig::new("gg.local", "t1");
        config.attempts = 3;
        config.retry_wait_ms = 1;
        let connector = MemoryConnector::new();
        let probe = connector.clone();

        let err = discover_with_retry(connector, &config).unwrap_err();
        assert!(err.to_string().contains("after 3 attempt"));
        assert_eq!(probe.connect_attempts().len(), 3);
    }

    #[test]
    fn test_buffer_too_small_is_not_retried() {
        let body = "x".repeat(200);
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let connector = MemoryConnector::new().route(
            "gg.local",
            8443,
            Route::respond(vec![response.into_bytes()]),
        );
        let probe = connector.clone();

        let mut config = DiscoveryConfig::new("gg.local", "t1");
        config.buffer_size = 128;
        config.retry_wait_ms = 1;

        let err = discover_with_retry(connector, &config).unwrap_err();
        assert!(err.to_string().contains("needs 201 bytes"));
        assert_eq!(probe.connect_attempts().len(), 1);
    }
}
