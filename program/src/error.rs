use solana_program::{
    decode_error::DecodeError,
    msg,
    program_error::{PrintProgramError, ProgramError},
};
use thiserror::Error;

/// Errors that may be returned by the Polylotto raffle program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Construction or round parameters are invalid
    #[error("Invalid raffle configuration")]
    InvalidConfig,

    /// Round is not accepting tickets
    #[error("Round is closed for ticket purchases")]
    RoundClosed,

    /// Payment is zero or not an exact multiple of the ticket price
    #[error("Payment must be an exact multiple of the ticket price")]
    InsufficientPayment,

    /// Randomness oracle could not take the request
    #[error("Randomness oracle is unavailable")]
    OracleUnavailable,

    /// Price feed is missing, stale or zero
    #[error("Price oracle is unavailable or stale")]
    PriceUnavailable,

    /// Randomness is already pending for the current round
    #[error("Randomness has already been requested for this round")]
    AlreadyRequested,

    /// The handle was already fulfilled
    #[error("Randomness request was already fulfilled")]
    DuplicateFulfillment,

    /// The handle is unknown, invalidated or belongs to another round
    #[error("Randomness request handle is stale")]
    StaleRequest,

    /// Payouts or pool do not reconcile
    #[error("Payout accounting does not match the round pool")]
    AccountingMismatch,

    /// The engine is not in a state that allows the operation
    #[error("Invalid round state transition")]
    InvalidTransition,

    /// Forced retry before the randomness timeout elapsed
    #[error("Randomness request has not timed out yet")]
    RandomnessNotExpired,

    /// Raffle is paused by the admin
    #[error("Raffle is paused")]
    RafflePaused,

    /// Caller is not the admin or oracle authority
    #[error("Caller is not authorized for this operation")]
    Unauthorized,

    /// Player has no credited balance
    #[error("Nothing to claim")]
    NothingToClaim,

    /// Too many tickets in a single purchase
    #[error("Ticket purchase exceeds the per-purchase limit")]
    TicketLimitExceeded,

    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstructionData,

    /// The engine account has no room for another purchase this round
    #[error("Engine account is full for this round")]
    LedgerFull,
}

impl RaffleError {
    /// Failures that leave the round where it was and are worth retrying later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RaffleError::OracleUnavailable | RaffleError::PriceUnavailable
        )
    }

    /// Replayed or out-of-order calls, rejected without any state change
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RaffleError::AlreadyRequested
                | RaffleError::DuplicateFulfillment
                | RaffleError::StaleRequest
        )
    }
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for RaffleError {
    fn type_of() -> &'static str {
        "Raffle Error"
    }
}

impl PrintProgramError for RaffleError {
    fn print<E>(&self) {
        msg!(&self.to_string());
    }
}
