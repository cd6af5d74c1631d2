//! Command-line arguments.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "forum", version, about = "Forum server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml", env = "FORUM_CONFIG")]
    pub config: String,

    /// Listen host
    #[arg(long, env = "FORUM_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, env = "FORUM_PORT")]
    pub port: Option<u16>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", env = "FORUM_LOG_LEVEL")]
    pub log_level: String,

    /// Seconds to wait for in-flight requests after shutdown is signalled
    #[arg(long, default_value = "5")]
    pub shutdown_timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["forum"]).unwrap();
        assert_eq!(cli.config, "config.yaml");
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.shutdown_timeout, 5);
        assert!(cli.port.is_none());
    }

    #[test]
    fn test_overrides() {
        let cli =
            Cli::try_parse_from(["forum", "-c", "/etc/forum.yaml", "--port", "9090"]).unwrap();
        assert_eq!(cli.config, "/etc/forum.yaml");
        assert_eq!(cli.port, Some(9090));
    }
}
