use std::sync::Arc;

use aggregator_ethereum_execution_client::EthereumExecutionClient;
use aggregator_execution_client_interface::ExecutionClient;
use aggregator_http_signer::HttpBundleSigner;
use aggregator_signer_interface::BundleSigner;
use tracing::info;

use crate::cli::RunCmd;
use crate::error::AggregatorResult;
use crate::queue::BundleTable;
use crate::strategy::FeePolicy;
use crate::types::params::ethereum::ethereum_params;
use crate::types::params::signer::signer_params;
use crate::types::params::{BatchingParams, DatabaseParams, ServiceParams, SubmissionParams};

/// Everything needed to start the aggregator service: validated parameters plus the
/// opened store and the concrete clients.
pub struct Config {
    params: ServiceParams,
    database: DatabaseParams,
    table: BundleTable,
    execution: Arc<dyn ExecutionClient>,
    signer: Arc<dyn BundleSigner>,
}

impl Config {
    pub fn new(
        params: ServiceParams,
        database: DatabaseParams,
        table: BundleTable,
        execution: Arc<dyn ExecutionClient>,
        signer: Arc<dyn BundleSigner>,
    ) -> Self {
        Self { params, database, table, execution, signer }
    }

    /// Validates the command line arguments and builds the clients they describe.
    pub async fn from_run_cmd(run_cmd: &RunCmd) -> AggregatorResult<Self> {
        let batching = BatchingParams::try_from(run_cmd.batching_args.clone())?;
        let submission = SubmissionParams::from(run_cmd.submission_args.clone());
        let fees = FeePolicy::try_from(run_cmd.fee_args.clone())?;
        let database = DatabaseParams::from(run_cmd.database_args.clone());

        let execution_args = ethereum_params(run_cmd, fees.token.address());
        let execution = EthereumExecutionClient::new_with_args(&execution_args)?;
        info!(
            category = "config",
            wallet = %execution.wallet_address(),
            gateway = %execution_args.gateway_address,
            "Execution client initialised"
        );

        let signer = HttpBundleSigner::new_with_args(&signer_params(&run_cmd.signer_args))?;
        let table = BundleTable::open(&database.path)?;
        info!(category = "config", path = %database.path.display(), "Bundle table opened");

        Ok(Self::new(
            ServiceParams { batching, submission, fees },
            database,
            table,
            Arc::new(execution),
            Arc::new(signer),
        ))
    }

    pub fn params(&self) -> &ServiceParams {
        &self.params
    }

    pub fn database(&self) -> &DatabaseParams {
        &self.database
    }

    pub fn table(&self) -> &BundleTable {
        &self.table
    }

    pub fn execution(&self) -> Arc<dyn ExecutionClient> {
        Arc::clone(&self.execution)
    }

    pub fn signer(&self) -> Arc<dyn BundleSigner> {
        Arc::clone(&self.signer)
    }
}
