use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlightPlanError>;

#[derive(Error, Debug)]
pub enum FlightPlanError {
    /// Rejected before anything was sent or touched
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("only the master flight plan manager may modify the simulator flight plan (instrument {0})")]
    NotMaster(String),

    #[error("failed to encode sync event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed sync event: {0}")]
    MalformedEvent(String),

    #[error("sync transport error: {0}")]
    Transport(String),

    #[error("simulator call failed: {0}")]
    Simulator(#[from] anyhow::Error),
}

pub fn invalid_argument(msg: impl ToString) -> FlightPlanError {
    FlightPlanError::InvalidArgument(msg.to_string())
}

pub fn malformed_event(msg: impl ToString) -> FlightPlanError {
    FlightPlanError::MalformedEvent(msg.to_string())
}
