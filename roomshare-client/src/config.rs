use std::{path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use crate::error::ClientError;

const MAX_SERVER_URL_LEN: usize = 2048;
const MAX_CONCURRENT_UPLOADS: usize = 16;

#[derive(Parser, Debug, Clone)]
#[command(name = "roomshare", about = "Terminal client for a local file-sharing room")]
pub struct ClientArgs {
    /// Room origin, as printed by the host (e.g. http://192.168.1.20:8080).
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub server_url: String,
    #[arg(long, default_value_t = 3000)]
    pub reconnect_delay_ms: u64,
    #[arg(long, default_value_t = 30)]
    pub refresh_interval_secs: u64,
    #[arg(long, default_value_t = 3000)]
    pub notification_ttl_ms: u64,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
    /// Upper bound on transfers running at the same time.
    #[arg(long, default_value_t = 3)]
    pub max_concurrent_uploads: usize,
    #[arg(long, default_value = ".")]
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub origin: Url,
    pub reconnect_delay: Duration,
    pub refresh_interval: Duration,
    pub notification_ttl: Duration,
    pub connect_timeout: Duration,
    pub max_concurrent_uploads: usize,
    pub download_dir: PathBuf,
}

impl ClientConfig {
    pub fn from_args(args: &ClientArgs) -> Result<Self, ClientError> {
        let mut errors: Vec<String> = Vec::new();

        let server_url = args.server_url.trim();
        let origin = if server_url.is_empty() {
            errors.push("server URL is required".to_owned());
            None
        } else if server_url.len() > MAX_SERVER_URL_LEN {
            errors.push(format!(
                "server URL is too long ({} > {} chars)",
                server_url.len(),
                MAX_SERVER_URL_LEN
            ));
            None
        } else {
            match Url::parse(server_url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url),
                Ok(_) => {
                    errors.push("server URL must start with http:// or https://".to_owned());
                    None
                }
                Err(err) => {
                    errors.push(format!("server URL is invalid: {err}"));
                    None
                }
            }
        };

        if args.max_concurrent_uploads == 0 || args.max_concurrent_uploads > MAX_CONCURRENT_UPLOADS
        {
            errors.push(format!(
                "max concurrent uploads must be between 1 and {MAX_CONCURRENT_UPLOADS}"
            ));
        }
        if args.reconnect_delay_ms == 0 {
            errors.push("reconnect delay must be at least one millisecond".to_owned());
        }
        if args.refresh_interval_secs == 0 {
            errors.push("refresh interval must be at least one second".to_owned());
        }

        match origin {
            Some(origin) if errors.is_empty() => Ok(Self {
                origin,
                reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
                refresh_interval: Duration::from_secs(args.refresh_interval_secs),
                notification_ttl: Duration::from_millis(args.notification_ttl_ms),
                connect_timeout: Duration::from_secs(args.connect_timeout_secs),
                max_concurrent_uploads: args.max_concurrent_uploads,
                download_dir: args.download_dir.clone(),
            }),
            _ => Err(ClientError::Config(errors.join("; "))),
        }
    }

    /// Defaults for `origin`, matching the command-line defaults.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            reconnect_delay: Duration::from_secs(3),
            refresh_interval: Duration::from_secs(30),
            notification_ttl: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            max_concurrent_uploads: 3,
            download_dir: PathBuf::from("."),
        }
    }
}
