use std::time::Duration;

use alloy::{
    network::{
        Ethereum,
        EthereumWallet,
        ReceiptResponse,
        TransactionBuilder,
        TransactionBuilderError,
    },
    primitives::{
        Address,
        B256,
    },
    providers::{
        Provider,
        ProviderBuilder,
        RootProvider,
    },
    rpc::types::{
        TransactionReceipt,
        TransactionRequest,
    },
    signers::local::PrivateKeySigner,
    transports::{
        RpcError,
        TransportErrorKind,
    },
};
use beacon_core::DeploymentRecord;
use url::Url;

/// How often the node is asked for the deployment receipt.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("JSON-RPC node at {url} is unreachable: {source}")]
    RpcUnavailable {
        url: Url,
        #[source]
        source: RpcError<TransportErrorKind>,
    },
    #[error("failed to sign deployment transaction: {0}")]
    Signing(#[source] TransactionBuilderError<Ethereum>),
    #[error("node rejected deployment transaction: {0}")]
    Submission(#[source] RpcError<TransportErrorKind>),
    #[error("no receipt for {tx} within {timeout:?}")]
    ReceiptTimeout { tx: B256, timeout: Duration },
    #[error("receipt for {0} carries no contract address")]
    MissingContractAddress(B256),
    #[error("RPC request failed: {0}")]
    Rpc(#[from] RpcError<TransportErrorKind>),
}

/// Gas parameters of the deployment transaction.
#[derive(Debug, Clone)]
pub struct GasSettings {
    pub limit: u64,
    /// Fixed price in wei; when `None` the node's current gas price is used.
    pub price_wei: Option<u128>,
    /// Upper bound on the receipt wait.
    pub receipt_timeout: Duration,
}

/// Connection to the JSON-RPC node plus the account that pays for the
/// deployment.
pub struct ChainClient {
    provider: RootProvider,
    wallet: EthereumWallet,
    sender: Address,
    chain_id: u64,
}

impl ChainClient {
    /// Connect to the node and verify it is actually reachable before any
    /// deployment work starts.
    pub async fn connect(
        url: Url,
        chain_id: u64,
        signer: PrivateKeySigner,
    ) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new().connect_http(url.clone()).root().clone();

        let node_chain_id = provider
            .get_chain_id()
            .await
            .map_err(|source| ChainError::RpcUnavailable { url: url.clone(), source })?;
        if node_chain_id != chain_id {
            tracing::warn!(
                target: "chain",
                configured = chain_id,
                node = node_chain_id,
                "Node reports a different chain id than configured"
            );
        }

        let sender = signer.address();
        tracing::info!(target: "chain", %url, chain_id, sender = %sender, "Connected to JSON-RPC node");

        Ok(Self {
            provider,
            wallet: EthereumWallet::from(signer),
            sender,
            chain_id,
        })
    }

    /// Submit the contract-creation transaction and block until its receipt
    /// is available, bounded by the configured timeout.
    pub async fn deploy(
        &self,
        init_code: Vec<u8>,
        gas: &GasSettings,
    ) -> Result<DeploymentRecord, ChainError> {
        let nonce = self.provider.get_transaction_count(self.sender).await?;
        let gas_price = match gas.price_wei {
            Some(price) => price,
            None => self.provider.get_gas_price().await?,
        };

        let request = TransactionRequest::default()
            .with_deploy_code(init_code)
            .with_from(self.sender)
            .with_nonce(nonce)
            .with_gas_limit(gas.limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        let envelope = request.build(&self.wallet).await.map_err(ChainError::Signing)?;
        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(ChainError::Submission)?;
        let tx_hash = *pending.tx_hash();
        tracing::info!(target: "chain", %tx_hash, nonce, gas_price, "Deployment transaction submitted");

        let receipt = self.wait_for_receipt(tx_hash, gas.receipt_timeout).await?;
        if !receipt.status() {
            tracing::warn!(target: "chain", %tx_hash, "Deployment transaction reverted on-chain");
        }
        let address = receipt
            .contract_address()
            .ok_or(ChainError::MissingContractAddress(tx_hash))?;

        metrics::counter!("beacon_deployments_total").increment(1);
        Ok(DeploymentRecord {
            address,
            transaction_hash: tx_hash,
        })
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<TransactionReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout { tx: tx_hash, timeout });
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
