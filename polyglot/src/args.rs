use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Polyglot LLM protocol gateway
#[derive(Debug, Parser)]
#[command(name = "polyglot", about = "Translate LLM API calls between wire protocols")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "polyglot.toml", env = "POLYGLOT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "POLYGLOT_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Override the log filter, e.g. `polyglot_llm=debug`
    #[arg(long, env = "POLYGLOT_LOG")]
    pub log: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["polyglot"]).unwrap();
        assert_eq!(args.config, PathBuf::from("polyglot.toml"));
        assert!(args.listen.is_none());
    }

    #[test]
    fn overrides() {
        let args =
            Args::try_parse_from(["polyglot", "-c", "/etc/p.toml", "--listen", "127.0.0.1:9000", "--log", "debug"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/p.toml"));
        assert_eq!(args.listen, Some(SocketAddr::from(([127, 0, 0, 1], 9000))));
        assert_eq!(args.log.as_deref(), Some("debug"));
    }
}
