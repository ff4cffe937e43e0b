use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed, set_return_data},
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction, system_program,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

use crate::{
    engine::RaffleEngine,
    error::RaffleError,
    events::RaffleEvent,
    instruction::RaffleInstruction,
    oracle::{RandomValue, RequestHandle, TokenPair},
    price_feed::{initialize_feed, update_rate, PriceFeedReader},
    state::{PlayerRecord, PriceFeed, RaffleConfig, RaffleParams},
    utils::{find_player_record_address, PLAYER_RECORD_SEED},
    vrf::{verify_fulfiller, VrfRequester},
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::InitializePriceFeed { pair, rate } => {
                msg!("Instruction: Initialize Price Feed");
                Self::process_initialize_price_feed(accounts, pair, rate, program_id)
            }
            RaffleInstruction::UpdatePrice { rate } => {
                msg!("Instruction: Update Price");
                Self::process_update_price(accounts, rate, program_id)
            }
            RaffleInstruction::InitializeRaffle { params } => {
                msg!("Instruction: Initialize Raffle");
                Self::process_initialize_raffle(accounts, params, program_id)
            }
            RaffleInstruction::BuyTickets { amount } => {
                msg!("Instruction: Buy Tickets");
                Self::process_buy_tickets(accounts, amount, program_id)
            }
            RaffleInstruction::CheckUpkeep => {
                msg!("Instruction: Check Upkeep");
                Self::process_check_upkeep(accounts, program_id)
            }
            RaffleInstruction::PerformUpkeep => {
                msg!("Instruction: Perform Upkeep");
                Self::process_perform_upkeep(accounts, program_id)
            }
            RaffleInstruction::FulfillRandomness { handle, value } => {
                msg!("Instruction: Fulfill Randomness");
                Self::process_fulfill_randomness(accounts, handle, value, program_id)
            }
            RaffleInstruction::ForceRetryRandomness => {
                msg!("Instruction: Force Retry Randomness");
                Self::process_force_retry_randomness(accounts, program_id)
            }
            RaffleInstruction::ClaimPrize => {
                msg!("Instruction: Claim Prize");
                Self::process_claim_prize(accounts, program_id)
            }
            RaffleInstruction::Pause => {
                msg!("Instruction: Pause");
                Self::process_admin_toggle(accounts, program_id, true)
            }
            RaffleInstruction::Resume => {
                msg!("Instruction: Resume");
                Self::process_admin_toggle(accounts, program_id, false)
            }
        }
    }

    /// Process the InitializePriceFeed instruction
    fn process_initialize_price_feed(
        accounts: &[AccountInfo],
        pair: TokenPair,
        rate: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let updater_info = next_account_info(account_info_iter)?;
        let feed_info = next_account_info(account_info_iter)?;

        assert_signer(updater_info, "Updater")?;
        assert_owned_by(feed_info, program_id)?;

        let now = Clock::get()?.unix_timestamp;
        let mut feed = PriceFeed::unpack_unchecked(&feed_info.data.borrow())?;
        initialize_feed(&mut feed, updater_info.key, pair, rate, now)?;
        PriceFeed::pack(feed, &mut feed_info.data.borrow_mut())?;
        Ok(())
    }

    /// Process the UpdatePrice instruction
    fn process_update_price(
        accounts: &[AccountInfo],
        rate: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let updater_info = next_account_info(account_info_iter)?;
        let feed_info = next_account_info(account_info_iter)?;

        assert_signer(updater_info, "Updater")?;
        assert_owned_by(feed_info, program_id)?;

        let now = Clock::get()?.unix_timestamp;
        let mut feed = PriceFeed::unpack_unchecked(&feed_info.data.borrow())?;
        update_rate(&mut feed, updater_info.key, rate, now)?;
        PriceFeed::pack(feed, &mut feed_info.data.borrow_mut())?;
        Ok(())
    }

    /// Process the InitializeRaffle instruction. The engine account must already
    /// exist, owned by this program and large enough for the ledger it will hold.
    fn process_initialize_raffle(
        accounts: &[AccountInfo],
        params: RaffleParams,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let admin_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;
        let feed_info = next_account_info(account_info_iter)?;

        assert_signer(admin_info, "Admin")?;
        assert_owned_by(engine_info, program_id)?;
        if engine_info.data.borrow().first().copied().unwrap_or(0) != 0 {
            msg!("Raffle account is already initialized");
            return Err(ProgramError::AccountAlreadyInitialized);
        }

        let now = Clock::get()?.unix_timestamp;
        let config = RaffleConfig::from_params(*admin_info.key, *feed_info.key, params);
        let price = PriceFeedReader::load(program_id, feed_info, now, config.max_price_age)?;
        let engine = RaffleEngine::new(config, &price, now)?;
        engine.ensure_capacity(engine_info.data_len())?;

        save_engine(&engine, engine_info)?;
        msg!("Raffle {} initialized by {}", engine_info.key, admin_info.key);
        Ok(())
    }

    /// Process the BuyTickets instruction
    fn process_buy_tickets(
        accounts: &[AccountInfo],
        amount: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let player_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;
        let record_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        assert_signer(player_info, "Player")?;
        if *system_program_info.key != system_program::id() {
            return Err(ProgramError::IncorrectProgramId);
        }

        let mut engine = load_engine(program_id, engine_info)?;
        let now = Clock::get()?.unix_timestamp;
        let purchase = engine.buy_tickets(player_info.key, amount, now)?;
        engine.ensure_capacity(engine_info.data_len())?;

        let mut record = if record_info.owner == program_id {
            load_player_record(program_id, engine_info.key, player_info.key, record_info)?
        } else {
            create_player_record(
                program_id,
                player_info,
                engine_info,
                record_info,
                system_program_info,
            )?
        };
        record.record_purchase(purchase.round_id, purchase.count)?;

        if player_info.lamports() < amount {
            msg!(
                "Insufficient funds: needed {} lamports, had {} lamports",
                amount,
                player_info.lamports()
            );
            return Err(ProgramError::InsufficientFunds);
        }
        invoke(
            &system_instruction::transfer(player_info.key, engine_info.key, amount),
            &[
                player_info.clone(),
                engine_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        PlayerRecord::pack(record, &mut record_info.data.borrow_mut())?;
        save_engine(&engine, engine_info)?;
        msg!(
            "Purchased {} tickets in round {} for {} lamports",
            purchase.count,
            purchase.round_id,
            purchase.amount
        );
        Ok(())
    }

    /// Process the CheckUpkeep instruction
    fn process_check_upkeep(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let engine_info = next_account_info(account_info_iter)?;

        let engine = load_engine(program_id, engine_info)?;
        let due = engine.check_upkeep(Clock::get()?.unix_timestamp);
        msg!("Upkeep due: {}", due);
        set_return_data(&[u8::from(due)]);
        Ok(())
    }

    /// Process the PerformUpkeep instruction
    fn process_perform_upkeep(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let keeper_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;
        let feed_info = next_account_info(account_info_iter)?;

        assert_signer(keeper_info, "Keeper")?;
        let mut engine = load_engine(program_id, engine_info)?;
        assert_feed(&engine, feed_info)?;

        let clock = Clock::get()?;
        let price = PriceFeedReader::load(
            program_id,
            feed_info,
            clock.unix_timestamp,
            engine.config.max_price_age,
        )?;
        let mut randomness =
            VrfRequester::new(*engine_info.key, engine.config.randomness_oracle, clock.slot);

        let outcome = engine.perform_upkeep(&mut randomness, &price, clock.unix_timestamp)?;
        save_engine(&engine, engine_info)?;
        msg!("Upkeep by {}: {:?}", keeper_info.key, outcome);
        Ok(())
    }

    /// Process the FulfillRandomness instruction. Each winner's payout moves from
    /// the engine's ledger into the winner's record, so settled rounds leave
    /// nothing behind in the engine account.
    fn process_fulfill_randomness(
        accounts: &[AccountInfo],
        handle: RequestHandle,
        value: RandomValue,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let oracle_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;
        let feed_info = next_account_info(account_info_iter)?;

        let mut engine = load_engine(program_id, engine_info)?;
        verify_fulfiller(oracle_info, &engine.config.randomness_oracle)?;
        assert_feed(&engine, feed_info)?;

        let now = Clock::get()?.unix_timestamp;
        let price = PriceFeedReader::load(program_id, feed_info, now, engine.config.max_price_age)?;
        let settlement = engine.fulfill_randomness(oracle_info.key, handle, value, &price, now)?;

        for winner in &settlement.winners {
            let record_info = next_account_info(account_info_iter)?;
            let mut record =
                load_player_record(program_id, engine_info.key, &winner.player, record_info)?;
            let amount = engine.take_winnings(&winner.player)?;
            record.credit(amount)?;
            PlayerRecord::pack(record, &mut record_info.data.borrow_mut())?;
            msg!("Credited {} lamports to {}", amount, winner.player);
        }

        save_engine(&engine, engine_info)?;
        match settlement.next_round {
            Some(next) => msg!("Round {} settled, round {} open", settlement.round_id, next),
            None => msg!("Round {} settled, waiting for upkeep", settlement.round_id),
        }
        Ok(())
    }

    /// Process the ForceRetryRandomness instruction
    fn process_force_retry_randomness(
        accounts: &[AccountInfo],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let admin_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;

        assert_signer(admin_info, "Admin")?;
        let mut engine = load_engine(program_id, engine_info)?;

        let clock = Clock::get()?;
        let mut randomness =
            VrfRequester::new(*engine_info.key, engine.config.randomness_oracle, clock.slot);
        engine.force_retry_randomness(admin_info.key, &mut randomness, clock.unix_timestamp)?;
        save_engine(&engine, engine_info)
    }

    /// Process the ClaimPrize instruction. Pays out of the engine account, which
    /// holds the pool plus its own rent reserve. Works while the raffle is paused.
    fn process_claim_prize(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let player_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;
        let record_info = next_account_info(account_info_iter)?;

        assert_signer(player_info, "Player")?;
        assert_owned_by(engine_info, program_id)?;
        let mut record =
            load_player_record(program_id, engine_info.key, player_info.key, record_info)?;
        let amount = record.take_claimable()?;

        let rent_reserve = Rent::get()?.minimum_balance(engine_info.data_len());
        pay_out(engine_info, player_info, amount, rent_reserve)?;
        PlayerRecord::pack(record, &mut record_info.data.borrow_mut())?;

        RaffleEvent::PrizeClaimed {
            player: *player_info.key,
            amount,
        }
        .emit();
        Ok(())
    }

    /// Process the Pause and Resume instructions
    fn process_admin_toggle(
        accounts: &[AccountInfo],
        program_id: &Pubkey,
        pause: bool,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let admin_info = next_account_info(account_info_iter)?;
        let engine_info = next_account_info(account_info_iter)?;

        assert_signer(admin_info, "Admin")?;
        let mut engine = load_engine(program_id, engine_info)?;
        if pause {
            engine.pause(admin_info.key)?;
        } else {
            engine.resume(admin_info.key)?;
        }
        save_engine(&engine, engine_info)
    }
}

fn assert_signer(info: &AccountInfo, role: &str) -> ProgramResult {
    if !info.is_signer {
        msg!("{} must sign the transaction", role);
        return Err(ProgramError::MissingRequiredSignature);
    }
    Ok(())
}

fn assert_owned_by(info: &AccountInfo, program_id: &Pubkey) -> ProgramResult {
    if info.owner != program_id {
        msg!("Account {} must be owned by this program", info.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

fn assert_feed(engine: &RaffleEngine, feed_info: &AccountInfo) -> ProgramResult {
    if *feed_info.key != engine.config.price_feed {
        msg!("Price feed {} is not the one configured", feed_info.key);
        return Err(ProgramError::InvalidArgument);
    }
    Ok(())
}

/// Read the engine from its account; unused trailing bytes are ignored
pub fn load_engine(
    program_id: &Pubkey,
    engine_info: &AccountInfo,
) -> Result<RaffleEngine, ProgramError> {
    assert_owned_by(engine_info, program_id)?;
    let data = engine_info.data.borrow();
    if data.first().copied().unwrap_or(0) == 0 {
        msg!("Raffle account is not initialized");
        return Err(ProgramError::UninitializedAccount);
    }
    RaffleEngine::deserialize(&mut &data[..]).map_err(|_| ProgramError::InvalidAccountData)
}

/// Write the engine in place, without an intermediate buffer
pub fn save_engine(engine: &RaffleEngine, engine_info: &AccountInfo) -> ProgramResult {
    let len = engine.packed_len();
    let mut data = engine_info.data.borrow_mut();
    if len > data.len() {
        msg!(
            "Raffle account too small: need {} bytes, have {}",
            len,
            data.len()
        );
        return Err(ProgramError::AccountDataTooSmall);
    }
    engine
        .serialize(&mut &mut data[..])
        .map_err(|_| ProgramError::InvalidAccountData)
}

/// Load `player`'s record for the raffle at `engine`
fn load_player_record(
    program_id: &Pubkey,
    engine: &Pubkey,
    player: &Pubkey,
    record_info: &AccountInfo,
) -> Result<PlayerRecord, ProgramError> {
    let (expected, _) = find_player_record_address(program_id, engine, player);
    if *record_info.key != expected {
        msg!("Player record {} does not belong to {}", record_info.key, player);
        return Err(ProgramError::InvalidSeeds);
    }
    assert_owned_by(record_info, program_id)?;

    let record = PlayerRecord::unpack(&record_info.data.borrow())?;
    if record.engine != *engine || record.player != *player {
        msg!("Player record does not match the raffle or player");
        return Err(ProgramError::InvalidAccountData);
    }
    Ok(record)
}

/// Allocate the record PDA, funded by the player
fn create_player_record<'a>(
    program_id: &Pubkey,
    player_info: &AccountInfo<'a>,
    engine_info: &AccountInfo<'a>,
    record_info: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
) -> Result<PlayerRecord, ProgramError> {
    let (expected, bump) =
        find_player_record_address(program_id, engine_info.key, player_info.key);
    if *record_info.key != expected {
        msg!("Invalid player record address");
        return Err(ProgramError::InvalidSeeds);
    }
    if record_info.owner != &system_program::id() {
        msg!("Player record must be owned by the system program before creation");
        return Err(ProgramError::IncorrectProgramId);
    }

    let rent_lamports = Rent::get()?.minimum_balance(PlayerRecord::LEN);
    invoke_signed(
        &system_instruction::create_account(
            player_info.key,
            record_info.key,
            rent_lamports,
            PlayerRecord::LEN as u64,
            program_id,
        ),
        &[
            player_info.clone(),
            record_info.clone(),
            system_program_info.clone(),
        ],
        &[&[
            PLAYER_RECORD_SEED,
            engine_info.key.as_ref(),
            player_info.key.as_ref(),
            &[bump],
        ]],
    )?;
    msg!("Created player record {}", record_info.key);
    Ok(PlayerRecord::new(*engine_info.key, *player_info.key, bump))
}

/// Move `amount` lamports out of the program-owned `from` account, leaving at least
/// `rent_reserve` behind. Nothing changes on error.
fn pay_out(from: &AccountInfo, to: &AccountInfo, amount: u64, rent_reserve: u64) -> ProgramResult {
    let remaining = from
        .lamports()
        .checked_sub(amount)
        .filter(|remaining| *remaining >= rent_reserve)
        .ok_or(ProgramError::InsufficientFunds)?;
    let credited = to
        .lamports()
        .checked_add(amount)
        .ok_or(RaffleError::AccountingMismatch)?;

    **from.lamports.borrow_mut() = remaining;
    **to.lamports.borrow_mut() = credited;
    msg!("Paid {} lamports to {}", amount, to.key);
    Ok(())
}
