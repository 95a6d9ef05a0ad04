pub mod batching;
pub mod database;
pub mod ethereum;
pub mod fees;
pub mod service;
pub mod signer;
pub mod submission;

pub use batching::BatchingParams;
pub use database::DatabaseParams;
pub use service::ServiceParams;
pub use submission::SubmissionParams;
