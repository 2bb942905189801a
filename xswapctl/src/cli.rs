use std::path::PathBuf;
use structopt::StructOpt;
use xswap::{
    asset::{Amount, Asset},
    config::{File, Settings},
    RelativeTime,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "xswapctl", about = "Drive HTLC atomic swaps between Ethereum and BitShares")]
pub struct Options {
    /// Path to configuration file
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config_file: Option<PathBuf>,

    /// Commands available
    #[structopt(subcommand)]
    pub cmd: Command,
}

impl Options {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }
}

#[derive(StructOpt, Debug, Clone)]
pub enum Command {
    /// Dump the current configuration
    DumpConfig,
    /// Run a swap against in-memory ledgers and print its events
    Simulate(Simulate),
}

#[derive(StructOpt, Debug, Clone)]
pub struct Simulate {
    /// happy, timeout or mismatch
    #[structopt(long = "scenario", default_value = "happy")]
    pub scenario: Scenario,

    /// Timelock window of the initiator leg in seconds
    #[structopt(long = "window-secs", default_value = "7200", parse(try_from_str = parse_window))]
    pub window: RelativeTime,

    /// Ether the initiator locks
    #[structopt(long = "eth", default_value = "1.0", parse(try_from_str = parse_ether))]
    pub ether: Amount,

    /// BTS the participant locks
    #[structopt(long = "bts", default_value = "100", parse(try_from_str = parse_bts))]
    pub bts: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Scenario {
    /// Both legs fund and get redeemed.
    Happy,
    /// The participant never funds, the initiator refunds.
    Timeout,
    /// The participant locks less than agreed.
    Mismatch,
}

fn parse_window(s: &str) -> anyhow::Result<RelativeTime> {
    Ok(RelativeTime::new(s.parse()?))
}

fn parse_ether(s: &str) -> anyhow::Result<Amount> {
    Ok(Amount::parse(Asset::ether(), s)?)
}

fn parse_bts(s: &str) -> anyhow::Result<Amount> {
    Ok(Amount::parse(Asset::bts(), s)?)
}

pub fn dump_config(settings: Settings) -> anyhow::Result<()> {
    let file = File::from(settings);
    let serialized = toml::to_string(&file)?;
    println!("{}", serialized);
    Ok(())
}
