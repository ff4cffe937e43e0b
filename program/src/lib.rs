// PolyLotto: recurring raffle rounds settled by verifiable randomness
// Ticket prices are locked per round from a stable-unit exchange rate

// Core modules
pub mod engine;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod state;
pub mod utils;

// Round bookkeeping
pub mod events;
pub mod ledger;
pub mod payout;
pub mod selection;

// Oracles and automation
pub mod keeper;
pub mod oracle;
pub mod price_feed;
pub mod vrf;

#[cfg(not(feature = "no-entrypoint"))]
pub mod entrypoint;

#[cfg(test)]
mod test_utils;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, pubkey::Pubkey};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    processor::Processor::process(program_id, accounts, instruction_data)
}
