use clap::Args;
use url::Url;

/// Parameters used to reach the BLS signing service.
#[derive(Debug, Clone, Args)]
pub struct SignerCliArgs {
    /// Base URL of the signing service.
    #[arg(env = "AGGREGATOR_SIGNER_URL", long)]
    pub signer_url: Url,

    /// Timeout of one signer request, in seconds.
    #[arg(env = "AGGREGATOR_SIGNER_TIMEOUT_SECS", long, default_value = "10")]
    pub signer_timeout_secs: u64,
}
