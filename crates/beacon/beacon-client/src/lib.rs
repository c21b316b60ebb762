use alloy::primitives::Address;
use reqwest::Client;
use url::Url;

pub use beacon_core::AddressResponse;

/// Client for the beacon's read-only HTTP surface.
///
/// ```no_run
/// use beacon_client::BeaconClient;
///
/// #[tokio::main]
/// async fn main() {
///     let client = BeaconClient::new("http://localhost:8000").unwrap();
///     let address = client.fetch_address().await.unwrap();
///     println!("contract lives at {address:?}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, thiserror::Error)]
pub enum BeaconClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),
}

impl BeaconClient {
    pub fn new(base_url: &str) -> Result<Self, BeaconClientError> {
        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Fetch the resolved contract address; `None` while unresolved.
    pub async fn fetch_address(&self) -> Result<Option<Address>, BeaconClientError> {
        let response = self.client.get(self.base_url.join("address")?).send().await?;
        if !response.status().is_success() {
            return Err(BeaconClientError::Status(response.status()));
        }

        let body: AddressResponse = response.json().await?;
        Ok(body.address)
    }

    /// Liveness probe.
    pub async fn health(&self) -> Result<(), BeaconClientError> {
        let response = self.client.get(self.base_url.join("health")?).send().await?;
        if !response.status().is_success() {
            return Err(BeaconClientError::Status(response.status()));
        }
        Ok(())
    }
}
