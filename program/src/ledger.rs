//! Round and ticket accounting.
//!
//! Append-only while a round is open; settled rounds are kept as read-only summaries.
//! Mutators are crate-private so that only the engine's transitions change the books.
//!
//! The ledger is persisted inside the engine account, so it only keeps what the current
//! round needs: ticket runs, the round's participants and winners still owed a payout.
//! Players are dropped once they hold no tickets and are owed nothing.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{clock::UnixTimestamp, pubkey::Pubkey};

use crate::{
    error::RaffleError,
    state::{ArchivedRound, Player, Round, TicketRun},
};

/// Settled rounds retained in the archive
pub const ARCHIVE_CAPACITY: usize = 16;

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    next_round_id: u64,
    current: Option<Round>,
    /// Oldest first
    archive: Vec<ArchivedRound>,
    players: BTreeMap<Pubkey, Player>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            next_round_id: 1,
            current: None,
            archive: Vec::new(),
            players: BTreeMap::new(),
        }
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current.as_ref()
    }

    pub(crate) fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.current.as_mut()
    }

    pub fn total_pool(&self) -> u64 {
        self.current.as_ref().map_or(0, |round| round.total_pool)
    }

    pub fn ticket_count(&self) -> u64 {
        self.current.as_ref().map_or(0, |round| round.ticket_count)
    }

    pub fn player(&self, id: &Pubkey) -> Option<&Player> {
        self.players.get(id)
    }

    /// Players currently tracked by the engine account
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Tickets `id` holds in the current round
    pub fn player_ticket_count(&self, id: &Pubkey) -> u64 {
        self.players.get(id).map_or(0, |player| player.tickets)
    }

    /// Sequence numbers of the tickets `id` holds in the current round
    pub fn player_tickets(&self, id: &Pubkey) -> Vec<u64> {
        self.current.as_ref().map_or_else(Vec::new, |round| {
            round
                .runs
                .iter()
                .filter(|run| run.owner == *id)
                .flat_map(|run| run.first_sequence..run.end())
                .collect()
        })
    }

    /// Owner of the ticket at cumulative-weight position `index`
    pub fn owner_at(&self, index: u64) -> Option<Pubkey> {
        self.current
            .as_ref()
            .and_then(|round| round.run_at(index))
            .map(|run| run.owner)
    }

    pub fn distinct_players(&self) -> usize {
        self.players
            .values()
            .filter(|player| player.tickets > 0)
            .count()
    }

    pub fn claimable(&self, id: &Pubkey) -> u64 {
        self.players.get(id).map_or(0, |player| player.claimable)
    }

    /// Lamports owed to players and still held by the engine
    pub fn total_claimable(&self) -> u64 {
        self.players.values().map(|player| player.claimable).sum()
    }

    pub fn archived_rounds(&self) -> &[ArchivedRound] {
        &self.archive
    }

    pub fn archived_round(&self, id: u64) -> Option<&ArchivedRound> {
        self.archive.iter().find(|round| round.id == id)
    }

    /// Recompute the pool from the ticket runs
    pub fn reconcile(&self) -> Result<u64, RaffleError> {
        let round = match &self.current {
            Some(round) => round,
            None => return Ok(0),
        };
        let mut next_sequence = 0u64;
        for run in &round.runs {
            if run.first_sequence != next_sequence || run.count == 0 {
                return Err(RaffleError::AccountingMismatch);
            }
            next_sequence = next_sequence
                .checked_add(run.count)
                .ok_or(RaffleError::AccountingMismatch)?;
        }
        let summed = next_sequence
            .checked_mul(round.ticket_price)
            .ok_or(RaffleError::AccountingMismatch)?;
        if next_sequence != round.ticket_count || summed != round.total_pool {
            return Err(RaffleError::AccountingMismatch);
        }
        Ok(summed)
    }

    /// Archive the current round, if any, and start a new one
    pub(crate) fn open_round(
        &mut self,
        opened_at: UnixTimestamp,
        closes_at: UnixTimestamp,
        ticket_price: u64,
        winner_count: u8,
    ) -> u64 {
        if let Some(previous) = self.current.take() {
            self.archive.push(ArchivedRound::from(previous));
            if self.archive.len() > ARCHIVE_CAPACITY {
                self.archive.remove(0);
            }
        }
        self.players.retain(|_, player| {
            player.tickets = 0;
            !player.is_settled()
        });

        let id = self.next_round_id;
        self.next_round_id += 1;
        self.current = Some(Round::new(
            id,
            opened_at,
            closes_at,
            ticket_price,
            winner_count,
        ));
        id
    }

    /// Append `count` tickets for `owner`, each worth `price`, and return the first
    /// sequence number. Nothing changes on error.
    pub(crate) fn append_tickets(
        &mut self,
        owner: &Pubkey,
        count: u64,
        price: u64,
    ) -> Result<u64, RaffleError> {
        let round = self.current.as_mut().ok_or(RaffleError::RoundClosed)?;
        let cost = count
            .checked_mul(price)
            .ok_or(RaffleError::AccountingMismatch)?;
        let new_pool = round
            .total_pool
            .checked_add(cost)
            .ok_or(RaffleError::AccountingMismatch)?;
        let first = round.ticket_count;
        let new_count = first
            .checked_add(count)
            .ok_or(RaffleError::AccountingMismatch)?;

        match round.runs.last_mut() {
            Some(last) if last.owner == *owner => last.count += count,
            _ => round.runs.push(TicketRun {
                owner: *owner,
                first_sequence: first,
                count,
            }),
        }
        self.players.entry(*owner).or_default().tickets += count;
        round.ticket_count = new_count;
        round.total_pool = new_pool;
        Ok(first)
    }

    pub(crate) fn credit(&mut self, id: &Pubkey, amount: u64) -> Result<(), RaffleError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or(RaffleError::AccountingMismatch)?;
        player.claimable = player
            .claimable
            .checked_add(amount)
            .ok_or(RaffleError::AccountingMismatch)?;
        Ok(())
    }

    pub(crate) fn take_claimable(&mut self, id: &Pubkey) -> Result<u64, RaffleError> {
        let player = self
            .players
            .get_mut(id)
            .filter(|player| player.claimable > 0)
            .ok_or(RaffleError::NothingToClaim)?;
        let amount = player.claimable;
        player.claimable = 0;
        if player.is_settled() {
            self.players.remove(id);
        }
        Ok(amount)
    }
}
