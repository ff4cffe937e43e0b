// Randomness requests for the raffle program
use solana_program::{
    account_info::AccountInfo, keccak::hashv, msg, program_error::ProgramError, pubkey::Pubkey,
};

use crate::{
    error::RaffleError,
    oracle::{RandomnessOracle, RequestHandle},
};

const REQUEST_SEED: &[u8] = b"vrf-request";

/// Issues request handles for the configured randomness authority.
///
/// A request is a log line the off-chain oracle watches for; the answer comes back
/// as a `FulfillRandomness` instruction signed by that same authority. Handles are
/// derived from the engine, the authority, the round and the current slot, so a retry
/// in a later slot always gets a fresh handle.
pub struct VrfRequester {
    pub engine: Pubkey,
    pub oracle: Pubkey,
    pub slot: u64,
}

impl VrfRequester {
    pub fn new(engine: Pubkey, oracle: Pubkey, slot: u64) -> Self {
        Self {
            engine,
            oracle,
            slot,
        }
    }

    pub fn handle_for(&self, round_id: u64) -> RequestHandle {
        let hash = hashv(&[
            REQUEST_SEED,
            self.engine.as_ref(),
            self.oracle.as_ref(),
            &round_id.to_le_bytes()[..],
            &self.slot.to_le_bytes()[..],
        ]);
        RequestHandle(hash.to_bytes())
    }
}

impl RandomnessOracle for VrfRequester {
    fn request(&mut self, round_id: u64) -> Result<RequestHandle, RaffleError> {
        if self.oracle == Pubkey::default() {
            msg!("No randomness authority configured");
            return Err(RaffleError::OracleUnavailable);
        }
        let handle = self.handle_for(round_id);
        msg!(
            "VRF request: engine {} round {} authority {} handle {}",
            self.engine,
            round_id,
            self.oracle,
            handle
        );
        Ok(handle)
    }
}

// The fulfiller must be the configured authority and must have signed
pub fn verify_fulfiller(oracle_info: &AccountInfo, expected: &Pubkey) -> Result<(), ProgramError> {
    if !oracle_info.is_signer {
        msg!("Randomness authority must sign the fulfillment");
        return Err(ProgramError::MissingRequiredSignature);
    }
    if oracle_info.key != expected {
        msg!("Fulfillment from {} rejected, expected {}", oracle_info.key, expected);
        return Err(RaffleError::Unauthorized.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_differ_by_round_and_slot() {
        let engine = Pubkey::new_unique();
        let oracle = Pubkey::new_unique();

        let mut requester = VrfRequester::new(engine, oracle, 42);
        let first = requester.request(1).unwrap();
        assert_eq!(first, requester.handle_for(1));
        assert_ne!(first, requester.handle_for(2));

        requester.slot = 43;
        assert_ne!(first, requester.request(1).unwrap());
    }

    #[test]
    fn test_unset_authority_is_unavailable() {
        let mut requester = VrfRequester::new(Pubkey::new_unique(), Pubkey::default(), 1);
        assert_eq!(requester.request(1), Err(RaffleError::OracleUnavailable));
    }

    #[test]
    fn test_verify_fulfiller() {
        let key = Pubkey::new_unique();
        let owner = Pubkey::default();
        let mut lamports = 0;
        let mut data: [u8; 0] = [];

        let signed =
            AccountInfo::new(&key, true, false, &mut lamports, &mut data, &owner, false, 0);
        assert_eq!(verify_fulfiller(&signed, &key), Ok(()));
        assert_eq!(
            verify_fulfiller(&signed, &Pubkey::new_unique()),
            Err(RaffleError::Unauthorized.into())
        );

        let mut lamports = 0;
        let mut data: [u8; 0] = [];
        let unsigned =
            AccountInfo::new(&key, false, false, &mut lamports, &mut data, &owner, false, 0);
        assert_eq!(
            verify_fulfiller(&unsigned, &key),
            Err(ProgramError::MissingRequiredSignature)
        );
    }
}
