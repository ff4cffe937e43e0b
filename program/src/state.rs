use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::Pubkey,
};

use crate::{
    error::RaffleError,
    oracle::{RandomValue, RequestHandle, TokenPair},
    payout::BASIS_POINTS,
};

/// Lifecycle of a round
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    /// Accepting tickets until the closing deadline
    Open,
    /// Deadline reached, randomness not yet requested
    Closing,
    /// Randomness requested, waiting for the oracle callback
    AwaitingRandomness,
    /// Winners paid, next round not opened yet
    Distributing,
    /// Frozen by the admin
    Paused,
}

/// One purchased unit of entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub owner: Pubkey,
    pub round_id: u64,
    /// Position in the round's ticket sequence, which is also its draw weight slot
    pub sequence: u64,
    /// Lamports paid for this ticket
    pub amount: u64,
}

/// Consecutive tickets bought by one owner.
///
/// Tickets are stored as runs so that a purchase costs the same account space
/// whatever its size. A purchase that directly follows the same owner's previous
/// one extends that run.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicketRun {
    pub owner: Pubkey,
    pub first_sequence: u64,
    pub count: u64,
}

impl TicketRun {
    /// One past the last sequence number in the run
    pub fn end(&self) -> u64 {
        self.first_sequence + self.count
    }

    pub fn contains(&self, sequence: u64) -> bool {
        sequence >= self.first_sequence && sequence < self.end()
    }
}

/// A participant of the current round, or a winner who has not been paid out yet.
/// Lifetime history lives in the player's `PlayerRecord` account.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Player {
    /// Tickets held in the current round
    pub tickets: u64,
    /// Prize credited but not withdrawn yet
    pub claimable: u64,
}

impl Player {
    /// Nothing left worth keeping in the engine account
    pub fn is_settled(&self) -> bool {
        self.tickets == 0 && self.claimable == 0
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Winner {
    pub player: Pubkey,
    /// Ticket that was drawn
    pub ticket_index: u64,
    pub payout: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub handle: RequestHandle,
    pub requested_at: UnixTimestamp,
    /// 1 for the first request, incremented by every forced retry
    pub attempt: u32,
}

/// The active round
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Round {
    pub id: u64,
    pub status: RoundStatus,
    pub opened_at: UnixTimestamp,
    pub closes_at: UnixTimestamp,
    /// Lamports per ticket, locked at open
    pub ticket_price: u64,
    pub winner_count: u8,
    pub total_pool: u64,
    pub ticket_count: u64,
    /// Ticket runs in arrival order
    pub runs: Vec<TicketRun>,
    pub request: Option<PendingRequest>,
    pub random_value: Option<RandomValue>,
    pub winners: Vec<Winner>,
}

impl Round {
    pub fn new(
        id: u64,
        opened_at: UnixTimestamp,
        closes_at: UnixTimestamp,
        ticket_price: u64,
        winner_count: u8,
    ) -> Self {
        Self {
            id,
            status: RoundStatus::Open,
            opened_at,
            closes_at,
            ticket_price,
            winner_count,
            total_pool: 0,
            ticket_count: 0,
            runs: Vec::new(),
            request: None,
            random_value: None,
            winners: Vec::new(),
        }
    }

    /// Sales end at the deadline whether or not upkeep already ran
    pub fn has_ended(&self, current_time: UnixTimestamp) -> bool {
        current_time >= self.closes_at
    }

    /// Run holding the ticket at `sequence`
    pub fn run_at(&self, sequence: u64) -> Option<&TicketRun> {
        let position = self.runs.partition_point(|run| run.end() <= sequence);
        self.runs.get(position).filter(|run| run.contains(sequence))
    }

    pub fn ticket(&self, sequence: u64) -> Option<Ticket> {
        self.run_at(sequence).map(|run| Ticket {
            owner: run.owner,
            round_id: self.id,
            sequence,
            amount: self.ticket_price,
        })
    }

    /// Tickets in sequence order
    pub fn tickets(&self) -> impl Iterator<Item = Ticket> + '_ {
        (0..self.ticket_count).filter_map(move |sequence| self.ticket(sequence))
    }
}

/// Read-only summary of a settled round
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ArchivedRound {
    pub id: u64,
    pub opened_at: UnixTimestamp,
    pub closes_at: UnixTimestamp,
    pub ticket_price: u64,
    pub ticket_count: u64,
    pub total_pool: u64,
    pub request_handle: Option<RequestHandle>,
    pub random_value: Option<RandomValue>,
    pub winners: Vec<Winner>,
}

impl From<Round> for ArchivedRound {
    fn from(round: Round) -> Self {
        Self {
            id: round.id,
            opened_at: round.opened_at,
            closes_at: round.closes_at,
            ticket_price: round.ticket_price,
            ticket_count: round.ticket_count,
            total_pool: round.total_pool,
            request_handle: round.request.map(|request| request.handle),
            random_value: round.random_value,
            winners: round.winners,
        }
    }
}

/// How a round's pool is split between its winners
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum PayoutPolicy {
    /// Every winner receives the same share
    EqualShare,
    /// Basis-point weight per placement, first drawn first
    Placement(Vec<u16>),
}

/// Parameters supplied when the raffle is created
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RaffleParams {
    /// Authority allowed to deliver randomness
    pub randomness_oracle: Pubkey,
    pub token_pair: TokenPair,
    /// Ticket price in stable units, converted with the feed rate at round open
    pub ticket_price_units: u64,
    pub winner_count: u8,
    /// Seconds a round accepts tickets
    pub round_duration: i64,
    /// Seconds before a pending randomness request may be force-retried
    pub randomness_timeout: i64,
    /// Oldest acceptable price update, in seconds
    pub max_price_age: i64,
    pub payout_policy: PayoutPolicy,
}

/// Immutable configuration of one raffle instance
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RaffleConfig {
    pub admin: Pubkey,
    pub randomness_oracle: Pubkey,
    pub price_feed: Pubkey,
    pub token_pair: TokenPair,
    pub ticket_price_units: u64,
    pub winner_count: u8,
    pub round_duration: i64,
    pub randomness_timeout: i64,
    pub max_price_age: i64,
    pub payout_policy: PayoutPolicy,
}

impl RaffleConfig {
    pub fn from_params(admin: Pubkey, price_feed: Pubkey, params: RaffleParams) -> Self {
        Self {
            admin,
            randomness_oracle: params.randomness_oracle,
            price_feed,
            token_pair: params.token_pair,
            ticket_price_units: params.ticket_price_units,
            winner_count: params.winner_count,
            round_duration: params.round_duration,
            randomness_timeout: params.randomness_timeout,
            max_price_age: params.max_price_age,
            payout_policy: params.payout_policy,
        }
    }

    pub fn validate(&self) -> Result<(), RaffleError> {
        if self.winner_count < 1 || self.round_duration <= 0 {
            return Err(RaffleError::InvalidConfig);
        }
        if self.randomness_timeout <= 0 || self.max_price_age <= 0 {
            return Err(RaffleError::InvalidConfig);
        }
        if self.ticket_price_units == 0 {
            return Err(RaffleError::InvalidConfig);
        }
        if let PayoutPolicy::Placement(weights) = &self.payout_policy {
            let total: u64 = weights.iter().map(|w| *w as u64).sum();
            if weights.len() != self.winner_count as usize
                || weights.iter().any(|w| *w == 0)
                || total != BASIS_POINTS
            {
                return Err(RaffleError::InvalidConfig);
            }
        }
        Ok(())
    }
}

/// Exchange-rate account maintained by the price updater
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceFeed {
    pub is_initialized: bool,
    /// Only this key may publish new rates
    pub updater: Pubkey,
    pub pair: TokenPair,
    /// Lamports per one stable unit
    pub rate: u64,
    pub last_updated: UnixTimestamp,
}

impl Sealed for PriceFeed {}

impl IsInitialized for PriceFeed {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for PriceFeed {
    const LEN: usize = 1 + 32 + 8 + 8 + 8 + 8;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, PriceFeed::LEN];
        let (is_initialized, updater, base, quote, rate, last_updated) =
            array_refs![src, 1, 32, 8, 8, 8, 8];

        let is_initialized = match is_initialized[0] {
            0 => false,
            1 => true,
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(PriceFeed {
            is_initialized,
            updater: Pubkey::new_from_array(*updater),
            pair: TokenPair {
                base: *base,
                quote: *quote,
            },
            rate: u64::from_le_bytes(*rate),
            last_updated: UnixTimestamp::from_le_bytes(*last_updated),
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, PriceFeed::LEN];
        let (is_initialized_dst, updater_dst, base_dst, quote_dst, rate_dst, last_updated_dst) =
            mut_array_refs![dst, 1, 32, 8, 8, 8, 8];

        is_initialized_dst[0] = self.is_initialized as u8;
        updater_dst.copy_from_slice(self.updater.as_ref());
        *base_dst = self.pair.base;
        *quote_dst = self.pair.quote;
        *rate_dst = self.rate.to_le_bytes();
        *last_updated_dst = self.last_updated.to_le_bytes();
    }
}

/// Per-player history for one raffle, at the PDA `["player", engine, player]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerRecord {
    pub is_initialized: bool,
    pub engine: Pubkey,
    pub player: Pubkey,
    pub bump: u8,
    pub rounds_entered: u64,
    pub lifetime_tickets: u64,
    pub total_won: u64,
    /// Winnings moved out of the engine and not yet withdrawn
    pub claimable: u64,
    pub last_round: u64,
}

impl PlayerRecord {
    pub fn new(engine: Pubkey, player: Pubkey, bump: u8) -> Self {
        Self {
            is_initialized: true,
            engine,
            player,
            bump,
            ..Self::default()
        }
    }

    pub fn record_purchase(&mut self, round_id: u64, count: u64) -> Result<(), RaffleError> {
        if self.last_round != round_id {
            self.last_round = round_id;
            self.rounds_entered = self.rounds_entered.saturating_add(1);
        }
        self.lifetime_tickets = self
            .lifetime_tickets
            .checked_add(count)
            .ok_or(RaffleError::AccountingMismatch)?;
        Ok(())
    }

    pub fn credit(&mut self, amount: u64) -> Result<(), RaffleError> {
        self.claimable = self
            .claimable
            .checked_add(amount)
            .ok_or(RaffleError::AccountingMismatch)?;
        self.total_won = self.total_won.saturating_add(amount);
        Ok(())
    }

    pub fn take_claimable(&mut self) -> Result<u64, RaffleError> {
        if self.claimable == 0 {
            return Err(RaffleError::NothingToClaim);
        }
        let amount = self.claimable;
        self.claimable = 0;
        Ok(amount)
    }
}

impl Sealed for PlayerRecord {}

impl IsInitialized for PlayerRecord {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for PlayerRecord {
    const LEN: usize = 1 + 32 + 32 + 1 + 8 + 8 + 8 + 8 + 8;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, PlayerRecord::LEN];
        let (
            is_initialized,
            engine,
            player,
            bump,
            rounds_entered,
            lifetime_tickets,
            total_won,
            claimable,
            last_round,
        ) = array_refs![src, 1, 32, 32, 1, 8, 8, 8, 8, 8];

        let is_initialized = match is_initialized[0] {
            0 => false,
            1 => true,
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(PlayerRecord {
            is_initialized,
            engine: Pubkey::new_from_array(*engine),
            player: Pubkey::new_from_array(*player),
            bump: bump[0],
            rounds_entered: u64::from_le_bytes(*rounds_entered),
            lifetime_tickets: u64::from_le_bytes(*lifetime_tickets),
            total_won: u64::from_le_bytes(*total_won),
            claimable: u64::from_le_bytes(*claimable),
            last_round: u64::from_le_bytes(*last_round),
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, PlayerRecord::LEN];
        let (
            is_initialized_dst,
            engine_dst,
            player_dst,
            bump_dst,
            rounds_entered_dst,
            lifetime_tickets_dst,
            total_won_dst,
            claimable_dst,
            last_round_dst,
        ) = mut_array_refs![dst, 1, 32, 32, 1, 8, 8, 8, 8, 8];

        is_initialized_dst[0] = self.is_initialized as u8;
        engine_dst.copy_from_slice(self.engine.as_ref());
        player_dst.copy_from_slice(self.player.as_ref());
        bump_dst[0] = self.bump;
        *rounds_entered_dst = self.rounds_entered.to_le_bytes();
        *lifetime_tickets_dst = self.lifetime_tickets.to_le_bytes();
        *total_won_dst = self.total_won.to_le_bytes();
        *claimable_dst = self.claimable.to_le_bytes();
        *last_round_dst = self.last_round.to_le_bytes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RaffleConfig {
        RaffleConfig {
            admin: Pubkey::new_unique(),
            randomness_oracle: Pubkey::new_unique(),
            price_feed: Pubkey::new_unique(),
            token_pair: TokenPair::new("SOL", "DAI"),
            ticket_price_units: 1,
            winner_count: 3,
            round_duration: 3_600,
            randomness_timeout: 600,
            max_price_age: 300,
            payout_policy: PayoutPolicy::EqualShare,
        }
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(config().validate(), Ok(()));

        let mut bad = config();
        bad.winner_count = 0;
        assert_eq!(bad.validate(), Err(RaffleError::InvalidConfig));

        let mut bad = config();
        bad.round_duration = 0;
        assert_eq!(bad.validate(), Err(RaffleError::InvalidConfig));

        let mut bad = config();
        bad.round_duration = -5;
        assert_eq!(bad.validate(), Err(RaffleError::InvalidConfig));
    }

    #[test]
    fn test_placement_weights_must_cover_every_winner() {
        let mut placed = config();
        placed.payout_policy = PayoutPolicy::Placement(vec![5_000, 3_000, 2_000]);
        assert_eq!(placed.validate(), Ok(()));

        placed.payout_policy = PayoutPolicy::Placement(vec![5_000, 5_000]);
        assert_eq!(placed.validate(), Err(RaffleError::InvalidConfig));

        placed.payout_policy = PayoutPolicy::Placement(vec![5_000, 3_000, 1_000]);
        assert_eq!(placed.validate(), Err(RaffleError::InvalidConfig));
    }

    #[test]
    fn test_price_feed_pack_layout() {
        let feed = PriceFeed {
            is_initialized: true,
            updater: Pubkey::new_unique(),
            pair: TokenPair::new("SOL", "DAI"),
            rate: 42_000,
            last_updated: 1_700_000_000,
        };
        let mut data = vec![0u8; PriceFeed::LEN];
        PriceFeed::pack(feed, &mut data).unwrap();
        assert_eq!(data[0], 1);
        assert_eq!(PriceFeed::unpack(&data).unwrap(), feed);

        data[0] = 7;
        assert!(PriceFeed::unpack_unchecked(&data).is_err());
    }

    #[test]
    fn test_archived_round_drops_tickets() {
        let mut round = Round::new(4, 100, 200, 10, 1);
        round.runs.push(TicketRun {
            owner: Pubkey::new_unique(),
            first_sequence: 0,
            count: 1,
        });
        round.ticket_count = 1;
        round.total_pool = 10;
        let archived = ArchivedRound::from(round);
        assert_eq!(archived.ticket_count, 1);
        assert_eq!(archived.total_pool, 10);
        assert_eq!(archived.request_handle, None);
    }

    #[test]
    fn test_ticket_lookup_across_runs() {
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let mut round = Round::new(2, 0, 100, 7, 1);
        let run = |owner, first_sequence, count| TicketRun {
            owner,
            first_sequence,
            count,
        };
        round.runs = vec![run(a, 0, 3), run(b, 3, 1), run(a, 4, 2)];
        round.ticket_count = 6;

        let owners: Vec<Pubkey> = round.tickets().map(|ticket| ticket.owner).collect();
        assert_eq!(owners, vec![a, a, a, b, a, a]);
        let third = round.ticket(3).unwrap();
        assert_eq!((third.owner, third.round_id), (b, 2));
        assert_eq!((third.sequence, third.amount), (3, 7));
        assert_eq!(round.ticket(6), None);
    }

    #[test]
    fn test_player_record_history() {
        let mut record = PlayerRecord::new(Pubkey::new_unique(), Pubkey::new_unique(), 254);
        record.record_purchase(1, 3).unwrap();
        record.record_purchase(1, 2).unwrap();
        record.record_purchase(2, 1).unwrap();
        assert_eq!((record.rounds_entered, record.lifetime_tickets), (2, 6));
        assert_eq!(record.last_round, 2);

        assert_eq!(record.take_claimable(), Err(RaffleError::NothingToClaim));
        record.credit(40).unwrap();
        record.credit(2).unwrap();
        assert_eq!(record.take_claimable(), Ok(42));
        assert_eq!((record.claimable, record.total_won), (0, 42));

        let mut data = vec![0u8; PlayerRecord::LEN];
        PlayerRecord::pack(record, &mut data).unwrap();
        assert_eq!(PlayerRecord::unpack(&data).unwrap(), record);
    }
}
