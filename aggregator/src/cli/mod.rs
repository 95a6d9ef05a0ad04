use clap::{Parser, Subcommand};

pub mod batching;
pub mod database;
pub mod ethereum;
pub mod fees;
pub mod signer;
pub mod submission;

#[derive(Parser, Debug)]
#[command(
    name = "aggregator",
    about = "Bundle aggregator - batches signed bundles into single on-chain submissions",
    after_help = "Examples:\n  \
    aggregator run --ethereum-rpc-url http://localhost:8545 --signer-url http://localhost:3000 ...\n\n\
    Every flag can also be set through its AGGREGATOR_* environment variable or a .env file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the aggregator service
    Run {
        #[command(flatten)]
        run_command: Box<RunCmd>,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct RunCmd {
    #[clap(flatten, next_help_heading = "Batching")]
    pub batching_args: batching::BatchingCliArgs,

    #[clap(flatten, next_help_heading = "Submission")]
    pub submission_args: submission::SubmissionCliArgs,

    #[clap(flatten, next_help_heading = "Fees")]
    pub fee_args: fees::FeeCliArgs,

    #[clap(flatten, next_help_heading = "Database")]
    pub database_args: database::DatabaseCliArgs,

    #[clap(flatten, next_help_heading = "Ethereum")]
    pub ethereum_args: ethereum::EthereumCliArgs,

    #[clap(flatten, next_help_heading = "Signer")]
    pub signer_args: signer::SignerCliArgs,
}
