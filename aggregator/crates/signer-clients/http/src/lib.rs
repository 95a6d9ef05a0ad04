use std::time::Duration;

use aggregator_bundle::Bundle;
use aggregator_signer_interface::{BundleSigner, SignerError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;


#[derive(Clone, Debug)]
pub struct HttpSignerValidatedArgs {
    pub signer_url: Url,
    pub request_timeout: Duration,
}

/// Delegates BLS verification and aggregation to a remote signing service.
///
/// The service exposes `POST /verify`, `POST /aggregate` and `POST /probe`, each taking
/// and returning camelCase JSON.
pub struct HttpBundleSigner {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    bundle: &'a Bundle,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
}

#[derive(Serialize)]
struct AggregateRequest<'a> {
    bundles: &'a [Bundle],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeRequest {
    operation_count: usize,
}

#[derive(Deserialize)]
struct BundleResponse {
    bundle: Bundle,
}

impl HttpBundleSigner {
    pub fn new_with_args(args: &HttpSignerValidatedArgs) -> Result<Self, SignerError> {
        let client = reqwest::Client::builder()
            .timeout(args.request_timeout)
            .build()
            .map_err(|e| SignerError::Internal(Box::new(e)))?;

        // `Url::join` replaces the last path segment unless the base ends with a slash
        let mut base_url = args.signer_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    async fn post<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp, SignerError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.base_url.join(endpoint).map_err(|e| SignerError::Internal(Box::new(e)))?;
        debug!(url = %url, "Calling signer");

        let response =
            self.client.post(url).json(body).send().await.map_err(|e| SignerError::Internal(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SignerError::Rejected(format!("{endpoint} returned {status}: {text}")));
        }

        response.json::<Resp>().await.map_err(|e| SignerError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl BundleSigner for HttpBundleSigner {
    async fn verify(&self, bundle: &Bundle) -> Result<bool, SignerError> {
        let response: VerifyResponse = self.post("verify", &VerifyRequest { bundle }).await?;
        Ok(response.valid)
    }

    async fn aggregate(&self, bundles: &[Bundle]) -> Result<Bundle, SignerError> {
        if bundles.is_empty() {
            return Ok(Bundle::empty());
        }
        let response: BundleResponse = self.post("aggregate", &AggregateRequest { bundles }).await?;
        Ok(response.bundle)
    }

    async fn probe_bundle(&self, operation_count: usize) -> Result<Bundle, SignerError> {
        let response: BundleResponse = self.post("probe", &ProbeRequest { operation_count }).await?;
        if response.bundle.operation_count() != operation_count {
            return Err(SignerError::InvalidResponse(format!(
                "probe bundle has {} operations, expected {operation_count}",
                response.bundle.operation_count()
            )));
        }
        Ok(response.bundle)
    }
}
