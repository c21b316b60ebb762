use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    api,
    bootstrap::{
        self,
        DeployParams,
        Resolution,
    },
    chain::ChainClient,
    solc::Solc,
    store::DeploymentStore,
};

/// The assembled service: bootstrap collaborators plus the bound listener.
pub struct BeaconServer {
    pub listener: TcpListener,
    pub chain: ChainClient,
    pub solc: Solc,
    pub store: DeploymentStore,
    pub params: DeployParams,
}

impl BeaconServer {
    /// Resolve the contract address (deploying at most once), then serve
    /// until the cancellation token fires. Any deploy-path error aborts
    /// startup; the service never accepts traffic without a resolved
    /// address.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        let resolution =
            bootstrap::resolve(&self.store, &self.chain, &self.solc, &self.params).await?;

        let address = resolution.address();
        match resolution {
            Resolution::Reused(_) => {
                tracing::info!(%address, "Serving previously deployed contract address");
            }
            Resolution::Deployed(_) => {
                tracing::info!(%address, "Serving freshly deployed contract address");
            }
        }

        api::serve(self.listener, Some(address), cancel_token).await
    }
}
