use keepdate_core::error::CoreError;

use crate::delivery::DeliveryError;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}
