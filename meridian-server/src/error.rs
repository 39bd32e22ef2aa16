use meridian_txn::CoordinatorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeridianServerError {
    #[error("transaction recovery failed during startup: {0}")]
    Recovery(#[source] CoordinatorError),
}
