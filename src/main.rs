use bifrost::config::BifrostConfig;
use bifrost::message::Message;
use bifrost::proxy::{Chain, Resolver};
use clap::{Arg, ArgAction, ArgMatches, Command};
use hickory_proto::rr::RecordType;
use serde_json::json;
use std::str::FromStr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();

    let config = load_config(&matches)?;
    let chain = Chain::from_config(&config).await?;

    match matches.subcommand() {
        Some(("lookup", args)) => lookup(&chain, args).await,
        Some(("preload", _)) => {
            let report = chain.preload().await;
            println!("{}", serde_json::to_string_pretty(&json!({
                "replayed": report.replayed,
                "failed": report.failed,
                "skipped": report.skipped,
            }))?);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn cli() -> Command {
    Command::new("bifrost")
        .version(env!("CARGO_PKG_VERSION"))
        .about("DNS over HTTPS resolver with DNSSEC chain validation")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("TOML configuration file (defaults plus BIFROST_* variables when absent)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("lookup")
                .about("Resolve a name and print the answer as JSON")
                .arg(Arg::new("name").required(true).help("Name to resolve"))
                .arg(
                    Arg::new("type")
                        .default_value("A")
                        .help("Record type (A, AAAA, TXT, MX, ...)"),
                )
                .arg(
                    Arg::new("preload")
                        .long("preload")
                        .action(ArgAction::SetTrue)
                        .help("Replay every persisted question before resolving"),
                ),
        )
        .subcommand(Command::new("preload").about("Replay every persisted question"))
}

fn load_config(matches: &ArgMatches) -> Result<BifrostConfig, Box<dyn std::error::Error>> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            info!("Loading configuration from {}", path);
            let mut config = BifrostConfig::from_file(path)?;
            config.apply_env()?;
            config
        }
        None => BifrostConfig::from_env()?,
    };
    Ok(config)
}

async fn lookup(chain: &Chain, args: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let name = args
        .get_one::<String>("name")
        .ok_or("a name to resolve is required")?;
    let record_type = args
        .get_one::<String>("type")
        .map(|t| RecordType::from_str(&t.to_uppercase()))
        .transpose()?
        .unwrap_or(RecordType::A);

    if args.get_flag("preload") {
        let report = chain.preload().await;
        info!(
            "Preloaded {} stored questions ({} failed, {} skipped)",
            report.replayed, report.failed, report.skipped
        );
    }

    match chain.resolver().query(name, record_type).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&render(&response, None))?);
            Ok(())
        }
        Err(e) => {
            error!("{} {} failed: {}", name, record_type, e);
            if let Some(response) = e.message() {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&render(response, Some(e.to_string())))?
                );
            }
            Err(e.into())
        }
    }
}

fn render(response: &Message, error: Option<String>) -> serde_json::Value {
    let answers: Vec<serde_json::Value> = response
        .answers()
        .iter()
        .map(|record| {
            json!({
                "name": record.name().to_string(),
                "type": record.record_type().to_string(),
                "ttl": record.ttl(),
                "data": record.data().map(|d| d.to_string()).unwrap_or_default(),
            })
        })
        .collect();

    json!({
        "name": response.name().to_string(),
        "type": response.record_type().to_string(),
        "id": response.id(),
        "signed": response.has_rrsig(),
        "answers": answers,
        "error": error,
    })
}
