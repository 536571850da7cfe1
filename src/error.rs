use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The requested participant record does not exist.
    #[error("participant not found")]
    NotFound,
    /// A collaborator call failed for any other reason. The context string is
    /// for logs only and never reaches the visitor.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Exchange rates for the requested conversion could not be fetched.
    /// Callers must treat this as blocking, never as a zero rate.
    #[error("exchange rate unavailable for {from}->{to}")]
    RateUnavailable { from: String, to: String },
    /// An internal payment method reached the customer-facing flow. This is an
    /// invariant violation, not a user error, and aborts the request.
    #[error("internal payment method {0} offered to customer")]
    InternalMethod(u32),
}

pub type Result<T> = std::result::Result<T, RegistrationError>;
