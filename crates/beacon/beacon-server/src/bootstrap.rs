//! Deploy-once bootstrap: `CHECK_RECORD -> {REUSE | DEPLOY} -> READY`.
//!
//! The persisted record is the single source of truth for "has deployment
//! already happened". While it parses, the recorded address is adopted
//! without touching the chain; otherwise the contract is compiled, deployed
//! and the record written, all before the service accepts any request.

use std::path::PathBuf;

use alloy::primitives::Address;
use alloy_dyn_abi::DynSolValue;
use beacon_core::DeploymentRecord;

use crate::{
    chain::{
        ChainClient,
        ChainError,
        GasSettings,
    },
    solc::{
        CompilationError,
        CompiledContract,
        Solc,
    },
    store::DeploymentStore,
};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read contract source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error("contract constructor takes {0}, expected none or a single address (the price feed)")]
    ConstructorMismatch(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// How the address was resolved: adopted from a persisted record, or freshly
/// deployed this run.
#[derive(Debug, Clone)]
pub enum Resolution {
    Reused(DeploymentRecord),
    Deployed(DeploymentRecord),
}

impl Resolution {
    pub fn address(&self) -> Address {
        self.record().address
    }

    pub fn record(&self) -> &DeploymentRecord {
        match self {
            Resolution::Reused(record) | Resolution::Deployed(record) => record,
        }
    }
}

/// Inputs of the deploy path.
#[derive(Debug, Clone)]
pub struct DeployParams {
    pub contract_path: PathBuf,
    pub contract_name: Option<String>,
    pub price_feed: Address,
    pub gas: GasSettings,
}

/// Resolve the canonical contract address, deploying at most once. Across
/// restarts, as long as the persisted record stays readable, this never
/// issues another chain transaction, whether or not the recorded address is
/// still live on-chain.
pub async fn resolve(
    store: &DeploymentStore,
    chain: &ChainClient,
    solc: &Solc,
    params: &DeployParams,
) -> Result<Resolution, BootstrapError> {
    if let Some(record) = store.load() {
        tracing::info!(
            target: "bootstrap",
            address = %record.address,
            tx = %record.transaction_hash,
            "Reusing persisted deployment record"
        );
        metrics::counter!("beacon_record_reused_total").increment(1);
        return Ok(Resolution::Reused(record));
    }

    let source = std::fs::read_to_string(&params.contract_path).map_err(|source| {
        BootstrapError::SourceRead {
            path: params.contract_path.clone(),
            source,
        }
    })?;
    let compiled = solc.compile(&source, params.contract_name.as_deref()).await?;
    tracing::info!(
        target: "bootstrap",
        contract = %compiled.name,
        bytecode_len = compiled.bytecode.len(),
        "Compiled contract source"
    );

    let record = deploy(store, chain, &compiled, params).await?;
    Ok(Resolution::Deployed(record))
}

/// Post-compile half of the bootstrap: constructor encoding, submission,
/// receipt wait, record persistence.
pub async fn deploy(
    store: &DeploymentStore,
    chain: &ChainClient,
    compiled: &CompiledContract,
    params: &DeployParams,
) -> Result<DeploymentRecord, BootstrapError> {
    let mut init_code = compiled.bytecode.clone();
    init_code.extend_from_slice(&constructor_args(compiled, params.price_feed)?);

    let record = chain.deploy(init_code, &params.gas).await?;
    tracing::info!(
        target: "bootstrap",
        address = %record.address,
        tx = %record.transaction_hash,
        "Contract deployed"
    );

    // Non-fatal: the in-memory address still serves, but the next restart
    // will redeploy.
    if let Err(err) = store.save(&record) {
        tracing::warn!(target: "bootstrap", %err, "Failed to persist deployment record");
        metrics::counter!("beacon_record_write_failures_total").increment(1);
    }

    Ok(record)
}

/// Encode the constructor arguments the compiled ABI asks for. The contract
/// either takes no arguments or a single address, the price feed.
fn constructor_args(
    compiled: &CompiledContract,
    price_feed: Address,
) -> Result<Vec<u8>, BootstrapError> {
    let Some(constructor) = &compiled.abi.constructor else {
        return Ok(Vec::new());
    };
    match constructor.inputs.as_slice() {
        [] => Ok(Vec::new()),
        [input] if input.ty == "address" => Ok(DynSolValue::Address(price_feed).abi_encode()),
        inputs => {
            let shape = inputs
                .iter()
                .map(|param| param.ty.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(BootstrapError::ConstructorMismatch(format!("({shape})")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_rpc::{
        self,
        CONTRACT_ADDRESS,
    };
    use alloy::{
        primitives::{
            B256,
            address,
        },
        signers::local::PrivateKeySigner,
    };
    use alloy_json_abi::JsonAbi;
    use std::{
        str::FromStr,
        time::Duration,
    };
    use tempfile::TempDir;

    fn params(dir: &TempDir) -> DeployParams {
        DeployParams {
            contract_path: dir.path().join("missing.sol"),
            contract_name: None,
            price_feed: address!("00000000000000000000000000000000000000aa"),
            gas: GasSettings {
                limit: 6_000_000,
                price_wei: Some(1_000_000_000),
                receipt_timeout: Duration::from_secs(5),
            },
        }
    }

    fn compiled_with_constructor() -> CompiledContract {
        let abi: JsonAbi = serde_json::from_str(
            r#"[{"type":"constructor","stateMutability":"nonpayable","inputs":[{"name":"feed","type":"address","internalType":"address"}]}]"#,
        )
        .unwrap();
        CompiledContract {
            name: "Anchor".to_string(),
            abi,
            bytecode: vec![0x60, 0x80, 0x60, 0x40],
        }
    }

    async fn connected_chain(node: &wiremock::MockServer) -> ChainClient {
        ChainClient::connect(node.uri().parse().unwrap(), 999, PrivateKeySigner::random())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn existing_record_is_reused_without_a_transaction() {
        let node = test_rpc::start_node().await;
        let chain = connected_chain(&node).await;

        let dir = TempDir::new().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployed.json"));
        let persisted = DeploymentRecord {
            address: address!("5fbdb2315678afecb367f032d93f642f64180aa3"),
            transaction_hash: B256::repeat_byte(0x34),
        };
        store.save(&persisted).unwrap();

        let solc = test_solc();
        let resolution = resolve(&store, &chain, &solc, &params(&dir)).await.unwrap();

        assert!(matches!(resolution, Resolution::Reused(_)));
        assert_eq!(resolution.address(), persisted.address);
        // The record short-circuits the deploy path entirely.
        assert_eq!(test_rpc::method_calls(&node, "eth_sendRawTransaction").await, 0);
    }

    #[tokio::test]
    async fn corrupt_record_proceeds_to_deploy() {
        let node = test_rpc::start_node().await;
        let chain = connected_chain(&node).await;

        let dir = TempDir::new().unwrap();
        let record_path = dir.path().join("deployed.json");
        std::fs::write(&record_path, "{ definitely not json").unwrap();
        let store = DeploymentStore::new(record_path);

        // The missing source file proves the deploy branch was taken: a
        // readable record would have returned before touching it.
        let solc = test_solc();
        let err = resolve(&store, &chain, &solc, &params(&dir)).await.unwrap_err();

        assert!(matches!(err, BootstrapError::SourceRead { .. }));
        assert_eq!(test_rpc::method_calls(&node, "eth_sendRawTransaction").await, 0);
    }

    #[tokio::test]
    async fn absent_record_proceeds_to_deploy() {
        let node = test_rpc::start_node().await;
        let chain = connected_chain(&node).await;

        let dir = TempDir::new().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployed.json"));

        let solc = test_solc();
        let err = resolve(&store, &chain, &solc, &params(&dir)).await.unwrap_err();
        assert!(matches!(err, BootstrapError::SourceRead { .. }));
    }

    #[tokio::test]
    async fn deploy_writes_exactly_one_record_with_the_receipt_address() {
        let node = test_rpc::start_node().await;
        let chain = connected_chain(&node).await;

        let dir = TempDir::new().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployed.json"));

        let record = deploy(&store, &chain, &compiled_with_constructor(), &params(&dir))
            .await
            .unwrap();

        assert_eq!(record.address, Address::from_str(CONTRACT_ADDRESS).unwrap());
        assert_eq!(test_rpc::method_calls(&node, "eth_sendRawTransaction").await, 1);
        assert_eq!(store.load(), Some(record.clone()));

        // A second bootstrap run now reuses the record: full idempotency.
        let solc = test_solc();
        let resolution = resolve(&store, &chain, &solc, &params(&dir)).await.unwrap();
        assert!(matches!(resolution, Resolution::Reused(_)));
        assert_eq!(resolution.address(), record.address);
        assert_eq!(test_rpc::method_calls(&node, "eth_sendRawTransaction").await, 1);
    }

    #[tokio::test]
    async fn unwritable_record_path_is_not_fatal() {
        let node = test_rpc::start_node().await;
        let chain = connected_chain(&node).await;

        let dir = TempDir::new().unwrap();
        // Point the record inside a directory that does not exist.
        let store = DeploymentStore::new(dir.path().join("no-such-dir").join("deployed.json"));

        let record = deploy(&store, &chain, &compiled_with_constructor(), &params(&dir))
            .await
            .unwrap();

        // The deployment still resolved; only persistence degraded.
        assert_eq!(record.address, Address::from_str(CONTRACT_ADDRESS).unwrap());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn constructor_args_cover_the_supported_shapes() {
        let feed = address!("00000000000000000000000000000000000000aa");

        // No constructor at all.
        let mut compiled = compiled_with_constructor();
        compiled.abi = JsonAbi::default();
        assert!(constructor_args(&compiled, feed).unwrap().is_empty());

        // Zero-argument constructor.
        compiled.abi = serde_json::from_str(
            r#"[{"type":"constructor","stateMutability":"nonpayable","inputs":[]}]"#,
        )
        .unwrap();
        assert!(constructor_args(&compiled, feed).unwrap().is_empty());

        // Single address argument: one ABI word holding the feed.
        let encoded = constructor_args(&compiled_with_constructor(), feed).unwrap();
        assert_eq!(encoded.len(), 32);
        assert_eq!(&encoded[12..], feed.as_slice());

        // Anything else is a mismatch.
        compiled.abi = serde_json::from_str(
            r#"[{"type":"constructor","stateMutability":"nonpayable","inputs":[{"name":"a","type":"uint256","internalType":"uint256"},{"name":"b","type":"address","internalType":"address"}]}]"#,
        )
        .unwrap();
        let err = constructor_args(&compiled, feed).unwrap_err();
        assert!(matches!(err, BootstrapError::ConstructorMismatch(_)));
    }

    fn test_solc() -> Solc {
        // The reuse/short-circuit tests never reach the compiler; Docker is
        // only contacted on an actual compile.
        Solc::new(
            std::sync::Arc::new(
                bollard::Docker::connect_with_local_defaults().expect("docker client handle"),
            ),
            "0.8.21".to_string(),
        )
    }
}
