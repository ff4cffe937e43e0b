use solana_program::{clock::UnixTimestamp, msg, pubkey::Pubkey};

use crate::{
    oracle::RequestHandle,
    state::{RoundStatus, Winner},
};

/// Record of a committed transition, written to the program log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaffleEvent {
    RoundOpened {
        round_id: u64,
        ticket_price: u64,
        closes_at: UnixTimestamp,
    },
    RoundExtended {
        round_id: u64,
        closes_at: UnixTimestamp,
    },
    TicketsPurchased {
        round_id: u64,
        player: Pubkey,
        first_sequence: u64,
        count: u64,
        amount: u64,
    },
    RoundClosing {
        round_id: u64,
        ticket_count: u64,
        total_pool: u64,
    },
    RandomnessRequested {
        round_id: u64,
        handle: RequestHandle,
    },
    RandomnessRetried {
        round_id: u64,
        invalidated: RequestHandle,
        handle: RequestHandle,
        attempt: u32,
    },
    WinnersDrawn {
        round_id: u64,
        winners: Vec<Winner>,
    },
    PrizeClaimed {
        player: Pubkey,
        amount: u64,
    },
    Paused {
        from: RoundStatus,
    },
    Resumed {
        to: RoundStatus,
    },
}

impl RaffleEvent {
    pub fn emit(&self) {
        match self {
            RaffleEvent::RoundOpened {
                round_id,
                ticket_price,
                closes_at,
            } => msg!(
                "Round {} opened: ticket price {} lamports, closes at {}",
                round_id,
                ticket_price,
                closes_at
            ),
            RaffleEvent::RoundExtended {
                round_id,
                closes_at,
            } => msg!("Round {} had no tickets, extended to {}", round_id, closes_at),
            RaffleEvent::TicketsPurchased {
                round_id,
                player,
                first_sequence,
                count,
                amount,
            } => msg!(
                "Round {}: {} bought {} tickets from #{} for {} lamports",
                round_id,
                player,
                count,
                first_sequence,
                amount
            ),
            RaffleEvent::RoundClosing {
                round_id,
                ticket_count,
                total_pool,
            } => msg!(
                "Round {} closing with {} tickets, pool {} lamports",
                round_id,
                ticket_count,
                total_pool
            ),
            RaffleEvent::RandomnessRequested { round_id, handle } => {
                msg!("Round {}: randomness requested, handle {}", round_id, handle)
            }
            RaffleEvent::RandomnessRetried {
                round_id,
                invalidated,
                handle,
                attempt,
            } => msg!(
                "Round {}: handle {} invalidated, retry #{} under {}",
                round_id,
                invalidated,
                attempt,
                handle
            ),
            RaffleEvent::WinnersDrawn { round_id, winners } => {
                msg!("Round {}: {} winners drawn", round_id, winners.len());
                for (place, winner) in winners.iter().enumerate() {
                    msg!(
                        "  #{} {} ticket {} payout {}",
                        place + 1,
                        winner.player,
                        winner.ticket_index,
                        winner.payout
                    );
                }
            }
            RaffleEvent::PrizeClaimed { player, amount } => {
                msg!("{} claimed {} lamports", player, amount)
            }
            RaffleEvent::Paused { from } => msg!("Raffle paused while {:?}", from),
            RaffleEvent::Resumed { to } => msg!("Raffle resumed to {:?}", to),
        }
    }
}
