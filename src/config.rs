use {
    crate::auction::entities::Amount,
    anyhow::Result,
    clap::{
        crate_authors,
        crate_description,
        crate_name,
        crate_version,
        Args,
        Parser,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        fs,
        time::Duration,
    },
};

mod server;

pub use server::Options as ServerOptions;

#[derive(Parser, Debug)]
#[command(name = crate_name!())]
#[command(author = crate_authors!())]
#[command(about = crate_description!())]
#[command(version = crate_version!())]
pub enum Options {
    /// Run the auction server.
    Run(RunOptions),
}

#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    /// Server Options
    #[command(flatten)]
    pub server: server::Options,

    #[command(flatten)]
    pub config: ConfigOptions,
}

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Config Options")]
#[group(id = "Config")]
pub struct ConfigOptions {
    /// Path to a configuration file containing the auction tunables
    #[arg(long = "config")]
    #[arg(env = "GAVEL_CONFIG")]
    #[arg(default_value = "config.yaml")]
    pub config: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub auction: AuctionConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let yaml_content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&yaml_content)?;
        Ok(config)
    }
}

/// Tunables for bid admission and the lifecycle sweep. All of these are
/// deployment decisions, none are hard-coded elsewhere.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Minimum amount a new bid must exceed the current price by, in minor
    /// currency units.
    #[serde(default = "default_min_increment")]
    pub min_increment: Amount,

    /// Number of optimistic-concurrency attempts before a bid is rejected
    /// with a conflict.
    #[serde(default = "default_max_bid_attempts")]
    pub max_bid_attempts: u32,

    /// Deadline for a single durable-store round trip.
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    pub store_timeout: Duration,

    /// Period of the background status sweep.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

fn default_min_increment() -> Amount {
    100
}

fn default_max_bid_attempts() -> u32 {
    4
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            min_increment:    default_min_increment(),
            max_bid_attempts: default_max_bid_attempts(),
            store_timeout:    default_store_timeout(),
            sweep_interval:   default_sweep_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_empty_auction_section() {
        let config: Config = serde_yaml::from_str("auction: {}").unwrap();
        assert_eq!(config.auction.min_increment, 100);
        assert_eq!(config.auction.max_bid_attempts, 4);
        assert_eq!(config.auction.store_timeout, Duration::from_secs(2));
        assert_eq!(config.auction.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_durations_parse_as_humantime() {
        let config: Config = serde_yaml::from_str(
            "auction:\n  min_increment: 10\n  sweep_interval: 5s\n  store_timeout: 250ms\n",
        )
        .unwrap();
        assert_eq!(config.auction.min_increment, 10);
        assert_eq!(config.auction.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.auction.store_timeout, Duration::from_millis(250));
    }
}
