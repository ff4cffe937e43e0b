//! Exchange-rate feed used to lock each round's ticket price.

use solana_program::{
    account_info::AccountInfo,
    clock::UnixTimestamp,
    msg,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack},
    pubkey::Pubkey,
};

use crate::{
    error::RaffleError,
    oracle::{PriceOracle, TokenPair},
    state::PriceFeed,
};

/// A price feed snapshot read in the current transaction
pub struct PriceFeedReader {
    pub feed: PriceFeed,
    pub now: UnixTimestamp,
    pub max_age: i64,
}

impl PriceFeedReader {
    pub fn new(feed: PriceFeed, now: UnixTimestamp, max_age: i64) -> Self {
        Self { feed, now, max_age }
    }

    pub fn load(
        program_id: &Pubkey,
        feed_info: &AccountInfo,
        now: UnixTimestamp,
        max_age: i64,
    ) -> Result<Self, ProgramError> {
        if feed_info.owner != program_id {
            msg!("Price feed {} is not owned by this program", feed_info.key);
            return Err(ProgramError::IncorrectProgramId);
        }
        let feed = PriceFeed::unpack_unchecked(&feed_info.data.borrow())?;
        Ok(Self::new(feed, now, max_age))
    }
}

impl PriceOracle for PriceFeedReader {
    fn current_rate(&self, pair: &TokenPair) -> Result<u64, RaffleError> {
        let feed = &self.feed;
        if !feed.is_initialized() {
            msg!("Price feed is not initialized");
            return Err(RaffleError::PriceUnavailable);
        }
        if feed.pair != *pair {
            msg!("Price feed quotes {}, raffle needs {}", feed.pair, pair);
            return Err(RaffleError::PriceUnavailable);
        }
        if feed.rate == 0 {
            return Err(RaffleError::PriceUnavailable);
        }
        let age = self.now.saturating_sub(feed.last_updated);
        if age > self.max_age {
            msg!("Price for {} is {}s old, limit {}s", pair, age, self.max_age);
            return Err(RaffleError::PriceUnavailable);
        }
        Ok(feed.rate)
    }
}

/// Set up a fresh feed owned by `updater`
pub fn initialize_feed(
    feed: &mut PriceFeed,
    updater: &Pubkey,
    pair: TokenPair,
    rate: u64,
    now: UnixTimestamp,
) -> Result<(), ProgramError> {
    if feed.is_initialized() {
        return Err(ProgramError::AccountAlreadyInitialized);
    }
    if rate == 0 {
        return Err(RaffleError::InvalidConfig.into());
    }
    *feed = PriceFeed {
        is_initialized: true,
        updater: *updater,
        pair,
        rate,
        last_updated: now,
    };
    msg!("Price feed {} initialized at {}", pair, rate);
    Ok(())
}

/// Publish a new rate; only the feed's updater may do so
pub fn update_rate(
    feed: &mut PriceFeed,
    updater: &Pubkey,
    rate: u64,
    now: UnixTimestamp,
) -> Result<(), ProgramError> {
    if !feed.is_initialized() {
        return Err(ProgramError::UninitializedAccount);
    }
    if feed.updater != *updater {
        return Err(RaffleError::Unauthorized.into());
    }
    if rate == 0 {
        return Err(RaffleError::PriceUnavailable.into());
    }
    feed.rate = rate;
    feed.last_updated = now;
    msg!("Price feed {} updated to {}", feed.pair, rate);
    Ok(())
}
