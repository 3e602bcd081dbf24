//! CLI configuration module
//!
//! Turns parsed arguments into a host configuration plus the list of
//! downloads to submit.

use crate::cli::args::CliArgs;
use crate::host::HostConfig;
use crate::torrent::{MagnetInfo, MagnetParser, TorrentMeta, TorrentParser};
use crate::tracker::TaskSource;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// One download requested on the command line
#[derive(Debug, Clone)]
pub enum Input {
    Magnet(MagnetInfo),
    Torrent { path: PathBuf, meta: TorrentMeta },
    Uri(String),
}

impl Input {
    /// Classify and check an input string
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if MagnetParser::is_magnet_link(text) {
            return Ok(Input::Magnet(MagnetParser::parse(text)?));
        }

        let path = Path::new(text);
        if TorrentParser::is_torrent_path(text) || path.is_file() {
            let meta = TorrentParser::parse_file(path)?;
            return Ok(Input::Torrent {
                path: path.to_path_buf(),
                meta,
            });
        }

        let url = Url::parse(text).with_context(|| format!("'{}' is not a magnet link, URL or torrent file", text))?;
        match url.scheme() {
            "http" | "https" | "ftp" | "sftp" => Ok(Input::Uri(text.to_string())),
            other => Err(anyhow!("Unsupported URL scheme '{}' in '{}'", other, text)),
        }
    }

    /// Name shown until the engine reports one
    pub fn label(&self) -> String {
        match self {
            Input::Magnet(info) => info.label(),
            Input::Torrent { meta, .. } => meta.name.clone(),
            Input::Uri(uri) => uri.rsplit('/').find(|s| !s.is_empty()).unwrap_or(uri.as_str()).to_string(),
        }
    }

    /// What to submit to the engine, preferring a metadata file an earlier
    /// session saved into `download_dir` over fetching it again
    pub fn source_in(&self, download_dir: &Path) -> TaskSource {
        if let Input::Magnet(info) = self {
            if let Some(meta) = saved_torrent(info, download_dir) {
                info!("Reusing saved metadata for {}", info.label());
                return TaskSource::Torrent {
                    torrent: meta.raw,
                    web_seed_uris: None,
                };
            }
        }
        self.source()
    }

    /// What to submit to the engine
    pub fn source(&self) -> TaskSource {
        match self {
            Input::Magnet(info) => TaskSource::Magnet(info.uri.clone()),
            Input::Torrent { meta, .. } => TaskSource::Torrent {
                torrent: meta.raw.clone(),
                web_seed_uris: None,
            },
            Input::Uri(uri) => TaskSource::Uri(vec![uri.clone()]),
        }
    }
}

/// The `<info hash>.torrent` the engine writes once a magnet's metadata arrives
fn saved_torrent(info: &MagnetInfo, download_dir: &Path) -> Option<TorrentMeta> {
    let path = download_dir.join(format!("{}.torrent", info.info_hash_hex()));
    if !path.is_file() {
        return None;
    }
    match TorrentParser::parse_file(&path) {
        Ok(meta) if meta.info_hash == info.info_hash => Some(meta),
        Ok(meta) => {
            warn!(
                "Ignoring {}: info hash is {}",
                path.display(),
                meta.info_hash_hex()
            );
            None
        }
        Err(e) => {
            warn!("Ignoring {}: {:#}", path.display(), e);
            None
        }
    }
}

/// Configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine host settings
    pub host: HostConfig,
    /// Downloads to submit, in command-line order
    pub inputs: Vec<Input>,
    /// Leftover engine to kill before starting
    pub reclaim_pid: Option<u32>,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let inputs = args
            .inputs
            .iter()
            .map(|text| Input::parse(text))
            .collect::<Result<Vec<_>>>()?;

        let download_dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./downloads"));

        let host = HostConfig {
            executable: args.aria2c.clone(),
            work_dir: args.work_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            download_dir,
            port: args.port,
            secret: args.secret.clone(),
            probe_attempts: args.probe_attempts,
            probe_interval: Duration::from_millis(args.probe_interval_ms),
            refresh_interval: Duration::from_millis(args.refresh_ms),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            ..HostConfig::default()
        };

        Ok(Self {
            host,
            inputs,
            reclaim_pid: args.reclaim_pid,
            verbose: args.verbose,
            quiet: args.quiet,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(anyhow!("Nothing to download"));
        }

        self.host.validate()?;
        Ok(())
    }

    /// Whether a previous engine may still hold the configured port
    pub fn should_reclaim(&self) -> bool {
        self.reclaim_pid.is_some() || (self.host.port.is_some() && self.host.secret.is_some())
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const MAGNET: &str = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Big+Buck+Bunny";

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["aria2-host"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_from_args() {
        let config = Config::from_args(&args(&[
            "-o",
            "/tmp/downloads",
            "-p",
            "6882",
            "--refresh-ms",
            "250",
            "--probe-attempts",
            "3",
            MAGNET,
        ]))
        .unwrap();

        assert_eq!(config.host.download_dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.host.port, Some(6882));
        assert_eq!(config.host.refresh_interval, Duration::from_millis(250));
        assert_eq!(config.host.probe_attempts, 3);
        assert_eq!(config.host.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.inputs.len(), 1);
        assert!(config.validate().is_ok());
        assert!(!config.should_reclaim());
    }

    #[test]
    fn test_input_kinds() {
        let magnet = Input::parse(MAGNET).unwrap();
        assert_eq!(magnet.label(), "Big Buck Bunny");
        assert_eq!(magnet.source(), TaskSource::Magnet(MAGNET.to_string()));

        let uri = Input::parse("https://example.com/iso/disk.iso").unwrap();
        assert_eq!(uri.label(), "disk.iso");
        assert_eq!(
            uri.source(),
            TaskSource::Uri(vec!["https://example.com/iso/disk.iso".to_string()])
        );
    }

    #[test]
    fn test_torrent_input() {
        let dir = std::env::temp_dir().join(format!("aria2-host-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("single.torrent");
        let data = b"d4:infod6:lengthi7e4:name5:a.bin12:piece lengthi16384e6:pieces0:ee".to_vec();
        std::fs::write(&path, &data).unwrap();

        let input = Input::parse(path.to_str().unwrap()).unwrap();
        assert_eq!(input.label(), "a.bin");
        assert_eq!(
            input.source(),
            TaskSource::Torrent {
                torrent: data,
                web_seed_uris: None
            }
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_magnet_reuses_saved_torrent() {
        let dir = std::env::temp_dir().join(format!("aria2-host-saved-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let data = b"d4:infod6:lengthi7e4:name5:a.bin12:piece lengthi16384e6:pieces0:ee".to_vec();
        let meta = TorrentParser::parse_bytes(data.clone()).unwrap();
        let magnet = Input::parse(&format!("magnet:?xt=urn:btih:{}", meta.info_hash_hex())).unwrap();

        // nothing saved yet
        assert!(matches!(magnet.source_in(&dir), TaskSource::Magnet(_)));

        std::fs::write(dir.join(format!("{}.torrent", meta.info_hash_hex())), &data).unwrap();
        assert_eq!(
            magnet.source_in(&dir),
            TaskSource::Torrent {
                torrent: data,
                web_seed_uris: None
            }
        );

        // a file under the magnet's name holding some other torrent is skipped
        let other = Input::parse(MAGNET).unwrap();
        let other_data = b"d4:infod6:lengthi9e4:name5:b.bin12:piece lengthi16384e6:pieces0:ee".to_vec();
        std::fs::write(dir.join("dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c.torrent"), &other_data).unwrap();
        assert_eq!(other.source_in(&dir), TaskSource::Magnet(MAGNET.to_string()));

        let uri = Input::parse("https://example.com/iso/disk.iso").unwrap();
        assert_eq!(uri.source_in(&dir), uri.source());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejected_inputs() {
        assert!(Input::parse("missing-file.torrent").is_err());
        assert!(Input::parse("mailto:someone@example.com").is_err());
        assert!(Input::parse("just some words").is_err());
    }

    #[test]
    fn test_config_validate_invalid_port() {
        let config = Config::from_args(&args(&["-p", "0", MAGNET])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_should_reclaim() {
        let config = Config::from_args(&args(&["-p", "6800", "--secret", "abc", MAGNET])).unwrap();
        assert!(config.should_reclaim());

        let config = Config::from_args(&args(&["--reclaim-pid", "99", MAGNET])).unwrap();
        assert!(config.should_reclaim());
    }
}
