// Raffle program instructions
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};

use crate::{
    error::RaffleError,
    oracle::{RandomValue, RequestHandle, TokenPair},
    state::RaffleParams,
    utils::find_player_record_address,
};

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RaffleInstruction {
    /// Create the exchange-rate feed
    ///
    /// Accounts expected:
    /// 0. `[signer]` The updater allowed to publish rates
    /// 1. `[writable]` The feed account (program-owned, `PriceFeed::LEN` bytes)
    InitializePriceFeed { pair: TokenPair, rate: u64 },

    /// Publish a new rate
    ///
    /// Accounts expected:
    /// 0. `[signer]` The feed's updater
    /// 1. `[writable]` The feed account
    UpdatePrice { rate: u64 },

    /// Create the raffle and open round 1
    ///
    /// Accounts expected:
    /// 0. `[signer]` The admin
    /// 1. `[writable]` The engine account (program-owned, pre-allocated)
    /// 2. `[]` The price feed account
    InitializeRaffle { params: RaffleParams },

    /// Buy tickets in the open round; `amount` must be a multiple of the ticket price
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The player paying lamports
    /// 1. `[writable]` The engine account
    /// 2. `[writable]` The player's record PDA, created on first purchase
    /// 3. `[]` The system program
    BuyTickets { amount: u64 },

    /// Report whether upkeep is due as return data `[0]` or `[1]`
    ///
    /// Accounts expected:
    /// 0. `[]` The engine account
    CheckUpkeep,

    /// Advance the round: close and request randomness, extend an empty round,
    /// or open the next round after a deferred settlement
    ///
    /// Accounts expected:
    /// 0. `[signer]` Any keeper
    /// 1. `[writable]` The engine account
    /// 2. `[]` The price feed account
    PerformUpkeep,

    /// Deliver the random value for a pending request
    ///
    /// Accounts expected:
    /// 0. `[signer]` The configured randomness authority
    /// 1. `[writable]` The engine account
    /// 2. `[]` The price feed account
    /// 3. ..`[writable]` One player record per winner, in draw order
    FulfillRandomness {
        handle: RequestHandle,
        value: RandomValue,
    },

    /// Replace an unanswered randomness request (admin only)
    ///
    /// Accounts expected:
    /// 0. `[signer]` The admin
    /// 1. `[writable]` The engine account
    ForceRetryRandomness,

    /// Withdraw all credited winnings
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The winner
    /// 1. `[writable]` The engine account
    /// 2. `[writable]` The winner's record PDA
    ClaimPrize,

    /// Freeze the raffle (admin only)
    ///
    /// Accounts expected:
    /// 0. `[signer]` The admin
    /// 1. `[writable]` The engine account
    Pause,

    /// Return to the state held before `Pause` (admin only)
    ///
    /// Accounts expected:
    /// 0. `[signer]` The admin
    /// 1. `[writable]` The engine account
    Resume,
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        Self::try_from_slice(input).map_err(|_| RaffleError::InvalidInstructionData.into())
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        self.try_to_vec()
            .map_err(|_| RaffleError::InvalidInstructionData.into())
    }

    fn into_instruction(
        self,
        program_id: &Pubkey,
        accounts: Vec<AccountMeta>,
    ) -> Result<Instruction, ProgramError> {
        Ok(Instruction {
            program_id: *program_id,
            accounts,
            data: self.pack()?,
        })
    }
}

/// Create initialize_price_feed instruction
pub fn initialize_price_feed(
    program_id: &Pubkey,
    updater: &Pubkey,
    feed: &Pubkey,
    pair: TokenPair,
    rate: u64,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*updater, true),
        AccountMeta::new(*feed, false),
    ];
    RaffleInstruction::InitializePriceFeed { pair, rate }.into_instruction(program_id, accounts)
}

/// Create update_price instruction
pub fn update_price(
    program_id: &Pubkey,
    updater: &Pubkey,
    feed: &Pubkey,
    rate: u64,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*updater, true),
        AccountMeta::new(*feed, false),
    ];
    RaffleInstruction::UpdatePrice { rate }.into_instruction(program_id, accounts)
}

/// Create initialize_raffle instruction
pub fn initialize_raffle(
    program_id: &Pubkey,
    admin: &Pubkey,
    engine: &Pubkey,
    feed: &Pubkey,
    params: RaffleParams,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*admin, true),
        AccountMeta::new(*engine, false),
        AccountMeta::new_readonly(*feed, false),
    ];
    RaffleInstruction::InitializeRaffle { params }.into_instruction(program_id, accounts)
}

/// Create buy_tickets instruction
pub fn buy_tickets(
    program_id: &Pubkey,
    player: &Pubkey,
    engine: &Pubkey,
    amount: u64,
) -> Result<Instruction, ProgramError> {
    let (record, _) = find_player_record_address(program_id, engine, player);
    let accounts = vec![
        AccountMeta::new(*player, true),
        AccountMeta::new(*engine, false),
        AccountMeta::new(record, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    RaffleInstruction::BuyTickets { amount }.into_instruction(program_id, accounts)
}

/// Create check_upkeep instruction
pub fn check_upkeep(program_id: &Pubkey, engine: &Pubkey) -> Result<Instruction, ProgramError> {
    let accounts = vec![AccountMeta::new_readonly(*engine, false)];
    RaffleInstruction::CheckUpkeep.into_instruction(program_id, accounts)
}

/// Create perform_upkeep instruction
pub fn perform_upkeep(
    program_id: &Pubkey,
    keeper: &Pubkey,
    engine: &Pubkey,
    feed: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*keeper, true),
        AccountMeta::new(*engine, false),
        AccountMeta::new_readonly(*feed, false),
    ];
    RaffleInstruction::PerformUpkeep.into_instruction(program_id, accounts)
}

/// Create fulfill_randomness instruction. `winners` comes from
/// `RaffleEngine::preview_winners` on the current engine state.
pub fn fulfill_randomness(
    program_id: &Pubkey,
    oracle: &Pubkey,
    engine: &Pubkey,
    feed: &Pubkey,
    handle: RequestHandle,
    value: RandomValue,
    winners: &[Pubkey],
) -> Result<Instruction, ProgramError> {
    let mut accounts = vec![
        AccountMeta::new_readonly(*oracle, true),
        AccountMeta::new(*engine, false),
        AccountMeta::new_readonly(*feed, false),
    ];
    for winner in winners {
        let (record, _) = find_player_record_address(program_id, engine, winner);
        accounts.push(AccountMeta::new(record, false));
    }
    RaffleInstruction::FulfillRandomness { handle, value }.into_instruction(program_id, accounts)
}

/// Create force_retry_randomness instruction
pub fn force_retry_randomness(
    program_id: &Pubkey,
    admin: &Pubkey,
    engine: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*admin, true),
        AccountMeta::new(*engine, false),
    ];
    RaffleInstruction::ForceRetryRandomness.into_instruction(program_id, accounts)
}

/// Create claim_prize instruction
pub fn claim_prize(
    program_id: &Pubkey,
    player: &Pubkey,
    engine: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let (record, _) = find_player_record_address(program_id, engine, player);
    let accounts = vec![
        AccountMeta::new(*player, true),
        AccountMeta::new(*engine, false),
        AccountMeta::new(record, false),
    ];
    RaffleInstruction::ClaimPrize.into_instruction(program_id, accounts)
}

/// Create pause instruction
pub fn pause(
    program_id: &Pubkey,
    admin: &Pubkey,
    engine: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*admin, true),
        AccountMeta::new(*engine, false),
    ];
    RaffleInstruction::Pause.into_instruction(program_id, accounts)
}

/// Create resume instruction
pub fn resume(
    program_id: &Pubkey,
    admin: &Pubkey,
    engine: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let accounts = vec![
        AccountMeta::new_readonly(*admin, true),
        AccountMeta::new(*engine, false),
    ];
    RaffleInstruction::Resume.into_instruction(program_id, accounts)
}
