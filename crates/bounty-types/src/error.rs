use crate::lifecycle::{BountyEvent, BountyStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid transition: event {event:?} is not valid in state {from:?}")]
    InvalidTransition {
        from: BountyStatus,
        event: BountyEvent,
    },

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),
}

pub type Result<T> = std::result::Result<T, TypesError>;
