use std::time::Duration;

use aggregator_http_signer::HttpSignerValidatedArgs;

use crate::cli::signer::SignerCliArgs;

pub fn signer_params(args: &SignerCliArgs) -> HttpSignerValidatedArgs {
    HttpSignerValidatedArgs {
        signer_url: args.signer_url.clone(),
        request_timeout: Duration::from_secs(args.signer_timeout_secs),
    }
}
