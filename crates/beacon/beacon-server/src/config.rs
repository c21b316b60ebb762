use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use alloy::{
    primitives::Address,
    signers::local::PrivateKeySigner,
};
use bollard::Docker;
use clap::Parser;
use regex::Regex;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    bootstrap::{
        BootstrapError,
        DeployParams,
    },
    chain::{
        ChainClient,
        GasSettings,
    },
    server::BeaconServer,
    solc::Solc,
    store::DeploymentStore,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON-RPC endpoint of the target chain node
    #[arg(long, env = "BEACON_RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: Url,
    /// Hex-encoded private key that signs the deployment transaction
    #[arg(long, env = "BEACON_PRIVATE_KEY")]
    pub private_key: String,
    /// Chain id the deployment transaction is bound to
    #[arg(long, env = "BEACON_CHAIN_ID", default_value = "999")]
    pub chain_id: u64,
    /// Price-feed address handed to the contract constructor
    #[arg(
        long,
        env = "BEACON_PRICE_FEED",
        default_value = "0x0000000000000000000000000000000000000000"
    )]
    pub price_feed: Address,
    /// Path of the Solidity source to compile and deploy
    #[arg(long, env = "BEACON_CONTRACT_PATH", default_value = "contract.sol")]
    pub contract_path: PathBuf,
    /// Contract to pick from the compiler output; defaults to the only
    /// contract with creation bytecode
    #[arg(long, env = "BEACON_CONTRACT_NAME")]
    pub contract_name: Option<String>,
    /// Exact solc version the source is compiled with
    #[arg(long, env = "BEACON_SOLC_VERSION", default_value = "0.8.21")]
    pub solc_version: String,
    /// Path of the persisted deployment record
    #[arg(long, env = "BEACON_RECORD_PATH", default_value = "deployed.json")]
    pub record_path: PathBuf,
    /// Api server address
    #[arg(long, env = "BEACON_LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: SocketAddr,
    /// Gas limit of the deployment transaction
    #[arg(long, env = "BEACON_GAS_LIMIT", default_value = "6000000")]
    pub gas_limit: u64,
    /// Fixed gas price in gwei; queried from the node when unset
    #[arg(long, env = "BEACON_GAS_PRICE_GWEI")]
    pub gas_price_gwei: Option<u64>,
    /// Seconds to wait for the deployment receipt
    #[arg(long, env = "BEACON_RECEIPT_TIMEOUT", default_value = "180")]
    pub receipt_timeout: u64,
    /// Log level
    #[arg(long, env = "BEACON_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Config {
    /// Build the beacon server: validate the credential, bind the listener,
    /// and connect the external collaborators. Nothing here deploys; the
    /// deploy-once decision happens in [`BeaconServer::run`].
    pub async fn build(self) -> anyhow::Result<BeaconServer> {
        let signer: PrivateKeySigner = self
            .private_key
            .parse()
            .map_err(|err| BootstrapError::Configuration(format!("invalid private key: {err}")))?;

        let version_regex = Regex::new(r"^\d+\.\d+\.\d+$").unwrap();
        if !version_regex.is_match(&self.solc_version) {
            return Err(BootstrapError::Configuration(format!(
                "invalid solc version '{}', expected e.g. 0.8.21",
                self.solc_version
            ))
            .into());
        }

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!(listen_addr = ?self.listen_addr, "Listening on address");

        let chain = ChainClient::connect(self.rpc_url.clone(), self.chain_id, signer).await?;

        let docker = Arc::new(Docker::connect_with_local_defaults()?);
        tracing::info!("Connected to Docker daemon");

        let server = BeaconServer {
            listener,
            chain,
            solc: Solc::new(docker, self.solc_version.clone()),
            store: DeploymentStore::new(self.record_path.clone()),
            params: DeployParams {
                contract_path: self.contract_path.clone(),
                contract_name: self.contract_name.clone(),
                price_feed: self.price_feed,
                gas: GasSettings {
                    limit: self.gas_limit,
                    price_wei: self.gas_price_gwei.map(|gwei| u128::from(gwei) * 1_000_000_000),
                    receipt_timeout: Duration::from_secs(self.receipt_timeout),
                },
            },
        };

        Ok(server)
    }
}
