use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use proxy_vet::proxy::parser::DEFAULT_PORT;
use proxy_vet::store::{fingerprint, JsonFileStore};
use proxy_vet::token::TokenScheme;
use proxy_vet::{
    AddressParser, Candidate, DohResolver, GeoInfo, HttpEnricher, Orchestrator, Prober, BATCH_SIZE,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A proxy IP checker with batched concurrent probing
#[derive(Parser)]
#[command(name = "proxy-vet")]
#[command(about = "A proxy IP checker with batched concurrent probing and resumable caching")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Result cache file path
    #[arg(long, default_value = "proxy-vet-cache.json")]
    cache: PathBuf,

    /// Override secret; configuring one turns off open-mode authorization
    #[arg(long)]
    secret: Option<String>,

    /// Probe token to present when a secret is configured
    #[arg(long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one or more proxy addresses
    Check {
        /// Addresses: bare IP, host:port, [ipv6]:port, or tp-marked names
        addresses: Vec<String>,
        /// Output file for working proxies (auto-named if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Expand CIDR /24 blocks or numeric ranges and check them
    Range {
        /// Ranges like 192.0.2.0/24 or 192.0.2.10-50
        ranges: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve domains and check every resolved address
    Domain {
        domains: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract addresses from a file or URL and check them
    File {
        /// Local path or http(s) URL of a proxy list
        source: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve a domain through the DNS-over-HTTPS collaborator
    Resolve { domain: String },
    /// Issue the probe token for the current time window
    Token {
        /// Caller identity the token is derived for
        caller_id: String,
        /// Host identity mixed into the derivation
        #[arg(long, default_value = "proxy-vet")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // open mode unless a secret is configured; see the token module docs
    let mut scheme = TokenScheme::new("proxy-vet");
    if let Some(secret) = &cli.secret {
        scheme = scheme.with_override(secret.clone());
    }

    match cli.command {
        Commands::Check { addresses, output } => {
            scheme.authorize(cli.token.as_deref(), "cli")?;
            let candidates = AddressParser::parse_many(&addresses);
            let scope_key = format!("check:{}", addresses.join(","));
            let content = addresses.join("\n");
            run_and_report(
                &cli.cache,
                candidates,
                scope_key,
                fingerprint(content.as_bytes()),
                output,
            )
            .await
        }
        Commands::Range { ranges, output } => {
            scheme.authorize(cli.token.as_deref(), "cli")?;
            let candidates = AddressParser::parse_many(&ranges);
            if candidates.is_empty() {
                println!("No addresses found in the given range(s).");
                return Ok(());
            }
            let scope_key = format!("range:{}", ranges.join(","));
            let content = ranges.join("\n");
            run_and_report(
                &cli.cache,
                candidates,
                scope_key,
                fingerprint(content.as_bytes()),
                output,
            )
            .await
        }
        Commands::Domain { domains, output } => {
            scheme.authorize(cli.token.as_deref(), "cli")?;
            let resolver = DohResolver::new()?;
            let mut candidates = Vec::new();
            for domain in &domains {
                match resolver.resolve(domain).await {
                    Ok(ips) => {
                        println!("Resolved {} to {} address(es)", domain, ips.len());
                        candidates.extend(
                            ips.into_iter()
                                .map(|ip| Candidate::new(ip, DEFAULT_PORT, domain.clone())),
                        );
                    }
                    Err(e) => eprintln!("Error resolving {}: {}", domain, e),
                }
            }
            let candidates = AddressParser::dedup(candidates);
            if candidates.is_empty() {
                bail!("could not resolve any addresses from the given domain(s)");
            }
            let scope_key = format!("domain:{}", domains.join(","));
            let content = candidates
                .iter()
                .map(|c| c.host.clone())
                .collect::<Vec<_>>()
                .join("\n");
            run_and_report(
                &cli.cache,
                candidates,
                scope_key,
                fingerprint(content.as_bytes()),
                output,
            )
            .await
        }
        Commands::File { source, output } => {
            scheme.authorize(cli.token.as_deref(), "cli")?;
            let content = fetch_source(&source).await?;
            let candidates = AddressParser::extract_from_text(&content);
            if candidates.is_empty() {
                println!("No addresses found in {}", source);
                return Ok(());
            }
            println!("Found {} addresses in {}", candidates.len(), source);
            let scope_key = format!("file:{}", source);
            run_and_report(
                &cli.cache,
                candidates,
                scope_key,
                fingerprint(content.as_bytes()),
                output,
            )
            .await
        }
        Commands::Resolve { domain } => {
            let resolver = DohResolver::new()?;
            let ips = resolver.resolve(&domain).await?;
            for ip in ips {
                println!("{}", ip);
            }
            Ok(())
        }
        Commands::Token { caller_id, host } => {
            let scheme = TokenScheme::new(host);
            let token = scheme.issue(&caller_id);
            println!("{}", token.value);
            println!("valid {} .. {}", token.valid_from, token.valid_until);
            Ok(())
        }
    }
}

/// Drive the orchestrator over the candidate set, print working proxies as
/// they surface, and save them to a file when the run finishes.
async fn run_and_report(
    cache_path: &PathBuf,
    candidates: Vec<Candidate>,
    scope_key: String,
    content_fingerprint: u32,
    output: Option<PathBuf>,
) -> Result<()> {
    let total = candidates.len();
    if total == 0 {
        println!("No candidates to check.");
        return Ok(());
    }

    let store = Arc::new(JsonFileStore::open(cache_path).await?);
    let enricher = Arc::new(HttpEnricher::new()?);
    let orchestrator = Orchestrator::new(Prober::new(), enricher, store);

    println!(
        "Checking {} candidate(s) in batches of {}...",
        total, BATCH_SIZE
    );

    let mut stream = orchestrator.run_batches(candidates, scope_key, content_fingerprint);
    let mut working = Vec::new();
    while let Some(result) = stream.next().await {
        let geo = result.geo.clone().unwrap_or_else(GeoInfo::placeholder);
        println!("  {} ({})", result.endpoint(), geo);
        working.push(result);
    }

    println!("\nResults: {} working out of {} checked", working.len(), total);

    if !working.is_empty() {
        let path = output.unwrap_or_else(default_output_path);
        let content: String = working
            .iter()
            .map(|r| r.endpoint())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&path, content)?;
        println!("Saved {} working proxies to {:?}", working.len(), path);
    }

    Ok(())
}

/// Fetch a proxy list from a URL or read it from disk
async fn fetch_source(source: &str) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(client.get(source).send().await?.error_for_status()?.text().await?)
    } else {
        Ok(tokio::fs::read_to_string(source).await?)
    }
}

fn default_output_path() -> PathBuf {
    let id = Uuid::new_v4().simple().to_string();
    PathBuf::from(format!("working_proxies_{}.txt", &id[..6]))
}
