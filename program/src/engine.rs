//! The raffle round state machine.
//!
//! `Open -> Closing -> AwaitingRandomness -> Distributing -> Open(next)`, with `Paused`
//! reachable from anywhere by the admin. Every transition validates first and writes
//! last, so a returned error leaves the engine exactly as it was. Callers hold the
//! engine by `&mut`, which makes every round-mutating call exclusive.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{borsh::get_instance_packed_len, clock::UnixTimestamp, msg, pubkey::Pubkey};

use crate::{
    error::RaffleError,
    events::RaffleEvent,
    ledger::Ledger,
    oracle::{PriceOracle, RandomValue, RandomnessOracle, RequestHandle},
    payout::{split_pool, verify_allocation},
    selection::select_winners,
    state::{PendingRequest, RaffleConfig, Round, RoundStatus, Winner},
};

pub const MAX_TICKETS_PER_PURCHASE: u64 = 500;

/// Request handles remembered for replay detection
pub const HANDLE_HISTORY: usize = 32;

/// Bytes a purchase must leave free in the engine account so that the round can
/// still be archived and the next one opened in place
pub const SETTLEMENT_HEADROOM: usize = 512;

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Fulfilled,
    Invalidated,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleRecord {
    pub handle: RequestHandle,
    pub round_id: u64,
    pub state: HandleState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicketPurchase {
    pub round_id: u64,
    pub first_sequence: u64,
    pub count: u64,
    pub amount: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpkeepOutcome {
    /// Nothing was due
    NotDue,
    /// Deadline passed without tickets; the round keeps running
    Extended {
        round_id: u64,
        closes_at: UnixTimestamp,
    },
    RandomnessRequested {
        round_id: u64,
        handle: RequestHandle,
    },
    /// A settled round was followed by a freshly opened one
    RoundOpened { round_id: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub round_id: u64,
    pub winners: Vec<Winner>,
    /// `None` when the next round could not be opened yet
    pub next_round: Option<u64>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RaffleEngine {
    pub is_initialized: bool,
    pub config: RaffleConfig,
    ledger: Ledger,
    handles: Vec<HandleRecord>,
    paused_from: Option<RoundStatus>,
}

impl RaffleEngine {
    /// Validate `config` and open the first round at the current price
    pub fn new<P: PriceOracle>(
        config: RaffleConfig,
        price: &P,
        now: UnixTimestamp,
    ) -> Result<Self, RaffleError> {
        config.validate()?;
        let mut engine = Self {
            is_initialized: true,
            config,
            ledger: Ledger::new(),
            handles: Vec::new(),
            paused_from: None,
        };
        engine.enter_round(price, now)?;
        Ok(engine)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.ledger.current_round()
    }

    pub fn status(&self) -> RoundStatus {
        self.ledger
            .current_round()
            .map_or(RoundStatus::Distributing, |round| round.status)
    }

    pub fn is_paused(&self) -> bool {
        self.paused_from.is_some()
    }

    /// Serialized size of the engine
    pub fn packed_len(&self) -> usize {
        get_instance_packed_len(self).unwrap_or(usize::MAX)
    }

    /// Fail with `LedgerFull` unless the engine, plus settlement headroom, fits in
    /// `capacity` bytes
    pub fn ensure_capacity(&self, capacity: usize) -> Result<usize, RaffleError> {
        let len = self.packed_len();
        if len.saturating_add(SETTLEMENT_HEADROOM) > capacity {
            msg!("Engine needs {} of {} bytes", len, capacity);
            return Err(RaffleError::LedgerFull);
        }
        Ok(len)
    }

    pub fn handle_state(&self, handle: &RequestHandle) -> Option<HandleState> {
        self.handles
            .iter()
            .rev()
            .find(|record| record.handle == *handle)
            .map(|record| record.state)
    }

    /// Winners of the current or an archived round
    pub fn winners_of(&self, round_id: u64) -> Option<&[Winner]> {
        match self.ledger.current_round() {
            Some(round) if round.id == round_id => Some(&round.winners),
            _ => self
                .ledger
                .archived_round(round_id)
                .map(|round| round.winners.as_slice()),
        }
    }

    /// Open the next round, locking its ticket price from `price`.
    /// Legal before the first round and after a round has been paid out.
    pub fn enter_round<P: PriceOracle>(
        &mut self,
        price: &P,
        now: UnixTimestamp,
    ) -> Result<u64, RaffleError> {
        self.config.validate()?;
        match self.ledger.current_round().map(|round| round.status) {
            None | Some(RoundStatus::Distributing) => {}
            Some(RoundStatus::Paused) => return Err(RaffleError::RafflePaused),
            Some(_) => return Err(RaffleError::InvalidTransition),
        }

        let rate = price.current_rate(&self.config.token_pair)?;
        if rate == 0 {
            msg!("Price feed returned a zero rate for {}", self.config.token_pair);
            return Err(RaffleError::PriceUnavailable);
        }
        let ticket_price = self
            .config
            .ticket_price_units
            .checked_mul(rate)
            .ok_or(RaffleError::PriceUnavailable)?;
        let closes_at = now
            .checked_add(self.config.round_duration)
            .ok_or(RaffleError::InvalidConfig)?;

        let round_id =
            self.ledger
                .open_round(now, closes_at, ticket_price, self.config.winner_count);
        RaffleEvent::RoundOpened {
            round_id,
            ticket_price,
            closes_at,
        }
        .emit();
        Ok(round_id)
    }

    /// Buy `amount / ticket_price` tickets for `player`
    pub fn buy_tickets(
        &mut self,
        player: &Pubkey,
        amount: u64,
        now: UnixTimestamp,
    ) -> Result<TicketPurchase, RaffleError> {
        let round = self.ledger.current_round().ok_or(RaffleError::RoundClosed)?;
        match round.status {
            RoundStatus::Open => {}
            RoundStatus::Paused => return Err(RaffleError::RafflePaused),
            _ => return Err(RaffleError::RoundClosed),
        }
        if round.has_ended(now) {
            return Err(RaffleError::RoundClosed);
        }

        let price = round.ticket_price;
        if amount == 0 || amount % price != 0 {
            return Err(RaffleError::InsufficientPayment);
        }
        let count = amount / price;
        if count > MAX_TICKETS_PER_PURCHASE {
            return Err(RaffleError::TicketLimitExceeded);
        }

        let round_id = round.id;
        let first_sequence = self.ledger.append_tickets(player, count, price)?;
        RaffleEvent::TicketsPurchased {
            round_id,
            player: *player,
            first_sequence,
            count,
            amount,
        }
        .emit();

        Ok(TicketPurchase {
            round_id,
            first_sequence,
            count,
            amount,
        })
    }

    /// Whether `perform_upkeep` has work to do. Never mutates.
    pub fn check_upkeep(&self, now: UnixTimestamp) -> bool {
        match self.ledger.current_round() {
            Some(round) => match round.status {
                RoundStatus::Open => round.has_ended(now),
                RoundStatus::Closing | RoundStatus::Distributing => true,
                RoundStatus::AwaitingRandomness | RoundStatus::Paused => false,
            },
            None => false,
        }
    }

    /// Advance the round if something is due
    pub fn perform_upkeep<R: RandomnessOracle, P: PriceOracle>(
        &mut self,
        randomness: &mut R,
        price: &P,
        now: UnixTimestamp,
    ) -> Result<UpkeepOutcome, RaffleError> {
        match self.status() {
            RoundStatus::Paused => Err(RaffleError::RafflePaused),
            RoundStatus::AwaitingRandomness => Err(RaffleError::AlreadyRequested),
            RoundStatus::Distributing => {
                let round_id = self.enter_round(price, now)?;
                Ok(UpkeepOutcome::RoundOpened { round_id })
            }
            RoundStatus::Closing => self.request_randomness(randomness, now),
            RoundStatus::Open => {
                let duration = self.config.round_duration;
                let round = self
                    .ledger
                    .current_round_mut()
                    .ok_or(RaffleError::InvalidTransition)?;
                if !round.has_ended(now) {
                    return Ok(UpkeepOutcome::NotDue);
                }

                if round.ticket_count == 0 {
                    let closes_at = now
                        .checked_add(duration)
                        .ok_or(RaffleError::InvalidConfig)?;
                    round.closes_at = closes_at;
                    let round_id = round.id;
                    RaffleEvent::RoundExtended {
                        round_id,
                        closes_at,
                    }
                    .emit();
                    return Ok(UpkeepOutcome::Extended {
                        round_id,
                        closes_at,
                    });
                }

                // one-way gate: nothing is sold from here on even if the request fails
                round.status = RoundStatus::Closing;
                RaffleEvent::RoundClosing {
                    round_id: round.id,
                    ticket_count: round.ticket_count,
                    total_pool: round.total_pool,
                }
                .emit();
                self.request_randomness(randomness, now)
            }
        }
    }

    fn request_randomness<R: RandomnessOracle>(
        &mut self,
        randomness: &mut R,
        now: UnixTimestamp,
    ) -> Result<UpkeepOutcome, RaffleError> {
        let round_id = self.round()?.id;
        let handle = randomness.request(round_id).map_err(|err| {
            msg!("Randomness request for round {} failed: {}", round_id, err);
            err
        })?;
        if self.handle_state(&handle).is_some() {
            msg!("Oracle reissued known handle {}", handle);
            return Err(RaffleError::OracleUnavailable);
        }

        let round = self
            .ledger
            .current_round_mut()
            .ok_or(RaffleError::InvalidTransition)?;
        round.request = Some(PendingRequest {
            handle,
            requested_at: now,
            attempt: 1,
        });
        round.status = RoundStatus::AwaitingRandomness;
        self.record_handle(handle, round_id);

        RaffleEvent::RandomnessRequested { round_id, handle }.emit();
        Ok(UpkeepOutcome::RandomnessRequested { round_id, handle })
    }

    /// Oracle callback: draw winners, credit payouts, then open the next round.
    ///
    /// Only the configured oracle may call, once per pending handle. If the next round
    /// cannot be opened (e.g. no fresh price) the settlement still stands and the engine
    /// waits in `Distributing` for the keeper.
    pub fn fulfill_randomness<P: PriceOracle>(
        &mut self,
        caller: &Pubkey,
        handle: RequestHandle,
        random_value: RandomValue,
        price: &P,
        now: UnixTimestamp,
    ) -> Result<Settlement, RaffleError> {
        if *caller != self.config.randomness_oracle {
            return Err(RaffleError::Unauthorized);
        }
        match self.handle_state(&handle) {
            Some(HandleState::Pending) => {}
            Some(HandleState::Fulfilled) => return Err(RaffleError::DuplicateFulfillment),
            Some(HandleState::Invalidated) | None => return Err(RaffleError::StaleRequest),
        }

        let round = self.round()?;
        if round.status == RoundStatus::Paused {
            return Err(RaffleError::RafflePaused);
        }
        let is_pending = matches!(
            (round.status, round.request),
            (RoundStatus::AwaitingRandomness, Some(request)) if request.handle == handle
        );
        if !is_pending {
            return Err(RaffleError::StaleRequest);
        }

        let pool = self.ledger.reconcile()?;
        let draws = select_winners(&random_value, &round.runs, round.winner_count);
        let payouts = split_pool(pool, draws.len(), &self.config.payout_policy)?;
        verify_allocation(round.total_pool, &payouts)?;
        let winners: Vec<Winner> = draws
            .iter()
            .zip(payouts.iter())
            .map(|(draw, payout)| Winner {
                player: draw.player,
                ticket_index: draw.ticket_index,
                payout: *payout,
            })
            .collect();
        for winner in &winners {
            let credited = self.ledger.player(&winner.player).map(|p| p.claimable);
            if credited.and_then(|c| c.checked_add(winner.payout)).is_none() {
                return Err(RaffleError::AccountingMismatch);
            }
        }
        let round_id = round.id;

        for winner in &winners {
            self.ledger.credit(&winner.player, winner.payout)?;
        }
        let round = self
            .ledger
            .current_round_mut()
            .ok_or(RaffleError::InvalidTransition)?;
        round.random_value = Some(random_value);
        round.winners = winners.clone();
        round.status = RoundStatus::Distributing;
        self.set_handle_state(&handle, HandleState::Fulfilled);
        RaffleEvent::WinnersDrawn {
            round_id,
            winners: winners.clone(),
        }
        .emit();

        let next_round = match self.enter_round(price, now) {
            Ok(next) => Some(next),
            Err(err) => {
                msg!("Round {} settled, next round deferred: {}", round_id, err);
                None
            }
        };

        Ok(Settlement {
            round_id,
            winners,
            next_round,
        })
    }

    /// Admin recovery for a request the oracle never answered. The replacement is
    /// requested first; the old handle is invalidated only once it exists.
    pub fn force_retry_randomness<R: RandomnessOracle>(
        &mut self,
        caller: &Pubkey,
        randomness: &mut R,
        now: UnixTimestamp,
    ) -> Result<RequestHandle, RaffleError> {
        self.assert_admin(caller)?;
        let round = self.round()?;
        match round.status {
            RoundStatus::AwaitingRandomness => {}
            RoundStatus::Paused => return Err(RaffleError::RafflePaused),
            _ => return Err(RaffleError::InvalidTransition),
        }
        let pending = round.request.ok_or(RaffleError::InvalidTransition)?;
        let expires_at = pending
            .requested_at
            .saturating_add(self.config.randomness_timeout);
        if now < expires_at {
            return Err(RaffleError::RandomnessNotExpired);
        }
        let round_id = round.id;

        let handle = randomness.request(round_id)?;
        if self.handle_state(&handle).is_some() {
            msg!("Oracle reissued known handle {}", handle);
            return Err(RaffleError::OracleUnavailable);
        }

        let attempt = pending.attempt.saturating_add(1);
        let round = self
            .ledger
            .current_round_mut()
            .ok_or(RaffleError::InvalidTransition)?;
        round.request = Some(PendingRequest {
            handle,
            requested_at: now,
            attempt,
        });
        self.set_handle_state(&pending.handle, HandleState::Invalidated);
        self.record_handle(handle, round_id);

        RaffleEvent::RandomnessRetried {
            round_id,
            invalidated: pending.handle,
            handle,
            attempt,
        }
        .emit();
        Ok(handle)
    }

    /// Players `random_value` would select for the pending round, in draw order
    pub fn preview_winners(
        &self,
        random_value: &RandomValue,
    ) -> Result<Vec<Pubkey>, RaffleError> {
        let round = self.round()?;
        if round.status != RoundStatus::AwaitingRandomness {
            return Err(RaffleError::InvalidTransition);
        }
        Ok(select_winners(random_value, &round.runs, round.winner_count)
            .iter()
            .map(|draw| draw.player)
            .collect())
    }

    /// Hand over everything credited to `player`. The player is forgotten once it
    /// holds no tickets in the current round.
    pub fn take_winnings(&mut self, player: &Pubkey) -> Result<u64, RaffleError> {
        self.ledger.take_claimable(player)
    }

    pub fn pause(&mut self, caller: &Pubkey) -> Result<(), RaffleError> {
        self.assert_admin(caller)?;
        if self.is_paused() {
            return Err(RaffleError::InvalidTransition);
        }
        let round = self
            .ledger
            .current_round_mut()
            .ok_or(RaffleError::InvalidTransition)?;
        let from = round.status;
        round.status = RoundStatus::Paused;
        self.paused_from = Some(from);
        RaffleEvent::Paused { from }.emit();
        Ok(())
    }

    pub fn resume(&mut self, caller: &Pubkey) -> Result<(), RaffleError> {
        self.assert_admin(caller)?;
        let to = self.paused_from.ok_or(RaffleError::InvalidTransition)?;
        let round = self
            .ledger
            .current_round_mut()
            .ok_or(RaffleError::InvalidTransition)?;
        round.status = to;
        self.paused_from = None;
        RaffleEvent::Resumed { to }.emit();
        Ok(())
    }

    fn round(&self) -> Result<&Round, RaffleError> {
        self.ledger
            .current_round()
            .ok_or(RaffleError::InvalidTransition)
    }

    fn assert_admin(&self, caller: &Pubkey) -> Result<(), RaffleError> {
        if *caller != self.config.admin {
            return Err(RaffleError::Unauthorized);
        }
        Ok(())
    }

    fn record_handle(&mut self, handle: RequestHandle, round_id: u64) {
        self.handles.push(HandleRecord {
            handle,
            round_id,
            state: HandleState::Pending,
        });
        if self.handles.len() > HANDLE_HISTORY {
            if let Some(oldest) = self
                .handles
                .iter()
                .position(|record| record.state != HandleState::Pending)
            {
                self.handles.remove(oldest);
            }
        }
    }

    fn set_handle_state(&mut self, handle: &RequestHandle, state: HandleState) {
        if let Some(record) = self
            .handles
            .iter_mut()
            .rev()
            .find(|record| record.handle == *handle)
        {
            record.state = state;
        }
    }
}
