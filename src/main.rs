//! ctk - deploy, verify and upgrade capped, role-gated tokens.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use alloy_primitives::utils::format_ether;
use alloy_primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ctk::config::{self, ConfigFile, Endpoint, NetworkConfig, Secrets};
use ctk::logic::{LogicCatalog, CUSTOM_TOKEN, CUSTOM_TOKEN_FINAL, CUSTOM_TOKEN_UPGRADEABLE};
use ctk::network::{ConfirmationSource, DevChain, ExecutionClient, RpcClient};
use ctk::orchestrator::{parse_address, Orchestrator, TokenParams, Verification};
use ctk::signer::LocalSigner;
use ctk::verify::EtherscanVerifier;

#[derive(Parser, Debug)]
#[command(name = "ctk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Built-in network (dev, localhost, sepolia, mainnet) or an entry of --config
    #[arg(long, global = true, env = "CTK_NETWORK", default_value = "dev")]
    network: String,

    /// JSON file with a `networks` table
    #[arg(long, global = true, env = "CTK_CONFIG")]
    config: Option<PathBuf>,

    /// Hex-encoded 32-byte signing key of the deployer
    #[arg(long, global = true, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[arg(long, global = true, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    alchemy_api_key: Option<String>,

    #[arg(long, global = true, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    etherscan_api_key: Option<String>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy a non-upgradeable token
    DeployToken(TokenArgs),

    /// Deploy upgradeable logic behind an initialized proxy
    DeployProxyToken(TokenArgs),

    /// Point a proxy at a fresh deployment of newer logic
    Upgrade {
        #[arg(long)]
        proxy: String,

        #[arg(long, default_value = CUSTOM_TOKEN_FINAL)]
        new_logic: String,
    },

    /// Read back token metadata
    Inspect {
        #[arg(long)]
        address: String,
    },

    /// Write a fresh signing key to <out-dir>/sk.hex and pk.hex
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TokenArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    symbol: String,

    /// Supply cap in whole tokens, e.g. 1000000 or 0.5
    #[arg(long)]
    cap: String,

    /// Comma-separated minter addresses
    #[arg(long, default_value = "")]
    minters: String,

    /// Comma-separated pauser addresses
    #[arg(long)]
    pausers: Option<String>,
}

impl TokenArgs {
    fn params(&self) -> Result<TokenParams> {
        Ok(TokenParams::parse(
            &self.name,
            &self.symbol,
            &self.cap,
            &self.minters,
            self.pausers.as_deref(),
        )?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Keygen { out_dir } => keygen(out_dir),
        Commands::DeployToken(args) => {
            let params = args.params()?;
            let orch = connect(&cli)?;
            print_params(CUSTOM_TOKEN, orch.config(), orch.deployer(), &params);
            let deployment = orch.deploy_token(&params).await?;
            println!("Token deployed to: {}", deployment.address);
            print_verification(&deployment.verification);
            Ok(())
        }
        Commands::DeployProxyToken(args) => {
            let params = args.params()?;
            let orch = connect(&cli)?;
            print_params(CUSTOM_TOKEN_UPGRADEABLE, orch.config(), orch.deployer(), &params);
            let deployment = orch.deploy_proxy_token(&params).await?;
            println!("Token deployed to: {}", deployment.proxy);
            println!("Implementation address: {}", deployment.implementation);
            print_verification(&deployment.verification);
            Ok(())
        }
        Commands::Upgrade { proxy, new_logic } => {
            let proxy = address_arg("--proxy", proxy)?;
            let orch = connect(&cli)?;
            println!("Upgrading proxy {proxy} to {new_logic} on {}", orch.config().name);
            let outcome = orch.upgrade(proxy, new_logic).await?;
            println!("Previous implementation: {}", outcome.previous_implementation);
            println!("Implementation address: {}", outcome.implementation);
            print_verification(&outcome.verification);
            Ok(())
        }
        Commands::Inspect { address } => {
            let address = address_arg("--address", address)?;
            let orch = connect(&cli)?;
            let summary = orch.inspect(address).await?;
            println!("Address: {}", summary.address);
            println!("Name: {}", summary.name);
            println!("Symbol: {}", summary.symbol);
            println!("Decimals: {}", summary.decimals);
            println!("Cap: {} ({})", summary.cap, format_ether(summary.cap));
            println!("Total supply: {} ({})", summary.total_supply, format_ether(summary.total_supply));
            println!("Paused: {}", summary.paused);
            println!("Version: {}", summary.version);
            match summary.implementation {
                Some(implementation) => println!("Implementation address: {implementation}"),
                None => println!("Implementation address: none (not a proxy)"),
            }
            Ok(())
        }
    }
}

fn address_arg(flag: &str, raw: &str) -> Result<Address> {
    parse_address(raw).ok_or_else(|| anyhow!("invalid {flag} address: `{raw}`"))
}

fn connect(cli: &Cli) -> Result<Orchestrator> {
    let secrets = Secrets {
        alchemy_api_key: cli.alchemy_api_key.clone(),
        etherscan_api_key: cli.etherscan_api_key.clone(),
    };
    let file = match &cli.config {
        Some(path) => Some(ConfigFile::load(path)?),
        None => None,
    };
    let network = config::resolve_network(&cli.network, file.as_ref(), &secrets)?;

    let Some(key) = cli.private_key.as_deref() else {
        bail!("no signing key: set PRIVATE_KEY or pass --private-key");
    };
    let signer = LocalSigner::from_hex(key).context("invalid PRIVATE_KEY")?;

    let (client, confirmations): (Arc<dyn ExecutionClient>, Arc<dyn ConfirmationSource>) =
        match &network.endpoint {
            Endpoint::Dev { state_file } => {
                let chain = Arc::new(
                    DevChain::open(state_file, LogicCatalog::builtin())
                        .with_context(|| format!("opening dev chain {}", state_file.display()))?,
                );
                (chain.clone() as Arc<dyn ExecutionClient>, chain as Arc<dyn ConfirmationSource>)
            }
            Endpoint::Rpc { url } => {
                let rpc = Arc::new(RpcClient::new(network.name.clone(), url.clone())?);
                (rpc.clone() as Arc<dyn ExecutionClient>, rpc as Arc<dyn ConfirmationSource>)
            }
        };

    let verifier = verifier_for(&network)?;
    let mut orch = Orchestrator::new(network, client, confirmations, signer);
    if let Some(verifier) = verifier {
        orch = orch.with_verifier(verifier);
    }
    Ok(orch)
}

fn verifier_for(network: &NetworkConfig) -> Result<Option<Arc<EtherscanVerifier>>> {
    if !network.verify {
        return Ok(None);
    }
    let url = network
        .explorer_url
        .as_deref()
        .with_context(|| format!("network `{}` enables verification without explorer_url", network.name))?;
    let key = network.explorer_api_key.as_deref().unwrap_or_default();
    if key.is_empty() {
        tracing::warn!(network = %network.name, "ETHERSCAN_API_KEY not set, verification will fail");
    }
    let verifier = EtherscanVerifier::new(url, key)?.with_poll_interval(network.poll_interval());
    Ok(Some(Arc::new(verifier)))
}

fn print_params(logic: &str, network: &NetworkConfig, admin: Address, params: &TokenParams) {
    println!("Deploying {logic} on {}", network.name);
    println!("Name: {}", params.name);
    println!("Symbol: {}", params.symbol);
    println!("Cap: {} ({} tokens)", params.cap, format_ether(params.cap));
    println!("Admin: {admin}");
    println!("Minters: {}", join(&params.minters));
    if !params.pausers.is_empty() {
        println!("Pausers: {}", join(&params.pausers));
    }
}

fn print_verification(verification: &Verification) {
    for (address, status) in verification {
        println!("Verification {address}: {status}");
    }
}

fn join(addresses: &[Address]) -> String {
    if addresses.is_empty() {
        return "none".into();
    }
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn keygen(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let signer = LocalSigner::generate();
    fs::write(out_dir.join("sk.hex"), signer.secret_hex()).context("writing sk.hex")?;
    fs::write(out_dir.join("pk.hex"), hex::encode(signer.public_key().as_bytes()))
        .context("writing pk.hex")?;
    println!("keypair written → {}", out_dir.display());
    println!("Address: {}", signer.address());
    Ok(())
}
