use anyhow::{anyhow, Context, Result};
use clap::{App, Arg, ArgMatches};
use log::info;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use prebench::config::{BenchmarkConfig, EnvironmentConfig, DEFAULT_MAX_KFRAG_ATTEMPTS};
use prebench::topology::Topology;
use prebench::Harness;

fn cli() -> App<'static, 'static> {
    App::new("prebench")
        .about("Load-test harness for a threshold proxy re-encryption access workflow")
        .arg(Arg::with_name("bobs").short("b").long("bobs").takes_value(true).default_value("10").help("Number of simulated data owners"))
        .arg(Arg::with_name("threshold").short("t").long("threshold").takes_value(true).default_value("2").help("Fragments needed to decrypt"))
        .arg(Arg::with_name("nodes").short("n").long("nodes").takes_value(true).default_value("4").help("Number of service nodes"))
        .arg(Arg::with_name("tests").short("x").long("tests").takes_value(true).default_value("1").help("Number of test iterations"))
        .arg(Arg::with_name("cycles").short("c").long("cycles").takes_value(true).default_value("20").help("Cycles per iteration"))
        .arg(Arg::with_name("lambda").short("l").long("lambda").takes_value(true).default_value("1500").help("Poisson rate parameter in milliseconds"))
        .arg(Arg::with_name("directory").short("d").long("directory").takes_value(true).default_value("outputDataset").help("Output directory for result logs"))
        .arg(Arg::with_name("no-key-refresh").long("no-key-refresh").help("Skip the key refresh stage"))
        .arg(Arg::with_name("max-kfrag-attempts").long("max-kfrag-attempts").takes_value(true).help("Key fragment split attempts before giving up"))
        .arg(Arg::with_name("preflight").long("preflight").help("Check the deployment end to end before timing"))
        .arg(Arg::with_name("warmup-ms").long("warmup-ms").takes_value(true).default_value("2000").help("Pause before provisioning each iteration"))
        .arg(Arg::with_name("settle-ms").long("settle-ms").takes_value(true).default_value("5000").help("Pause between provisioning and the first cycle"))
}

fn parse_arg<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = matches.value_of(name).ok_or_else(|| anyhow!("Missing value for --{}", name))?;
    raw.parse::<T>().map_err(|e| anyhow!("Invalid --{} '{}': {}", name, raw, e))
}

fn benchmark_config(matches: &ArgMatches) -> Result<BenchmarkConfig> {
    let max_kfrag_attempts = match matches.value_of("max-kfrag-attempts") {
        Some(_) => parse_arg(matches, "max-kfrag-attempts")?,
        None => DEFAULT_MAX_KFRAG_ATTEMPTS,
    };
    Ok(BenchmarkConfig {
        entity_count: parse_arg(matches, "bobs")?,
        threshold: parse_arg(matches, "threshold")?,
        node_count: parse_arg(matches, "nodes")?,
        test_runs: parse_arg(matches, "tests")?,
        cycles: parse_arg(matches, "cycles")?,
        lambda_ms: parse_arg(matches, "lambda")?,
        output_dir: PathBuf::from(parse_arg::<String>(matches, "directory")?),
        key_refresh: !matches.is_present("no-key-refresh"),
        max_kfrag_attempts,
        preflight: matches.is_present("preflight"),
        warmup: Duration::from_millis(parse_arg(matches, "warmup-ms")?),
        settle: Duration::from_millis(parse_arg(matches, "settle-ms")?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables if present
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let config = benchmark_config(&matches)?;
    config.validate()?;

    let env = EnvironmentConfig::load(config.node_count).context("Failed to load deployment endpoints")?;
    info!(
        "{} nodes, coordinator {}, ledger {}, timeout {:?}",
        env.nodes.len(),
        env.coordinator_auth_url,
        env.ledger_url,
        env.request_timeout
    );
    let topology = Topology::connect(&env)?;

    let harness = Harness::new(config, topology, env.funding_wei, env.request_timeout)?;
    let summaries = harness.run().await;
    info!(
        "{} of {} test iterations completed",
        summaries.len(),
        harness.config().test_runs
    );
    Ok(())
}
