//! Deterministic winner selection from one random value.
//!
//! Draw `i` hashes `(random_value, i)` into a ticket index. A player already selected
//! triggers a redraw at `i + winner_count`. The result depends only on the random value
//! and the ticket sequence, so anyone can recompute it from the archived round.

use std::collections::BTreeSet;

use arrayref::array_ref;
use solana_program::{keccak::hashv, pubkey::Pubkey};

use crate::{oracle::RandomValue, state::TicketRun};

/// Redraws per placement before falling back to a forward scan
pub const MAX_REDRAWS: u64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Draw {
    pub player: Pubkey,
    pub ticket_index: u64,
    /// Draw counter that produced this pick
    pub draw_index: u64,
}

/// Map draw number `draw_index` onto `[0, total_tickets)`
pub fn ticket_index_for_draw(
    random_value: &RandomValue,
    draw_index: u64,
    total_tickets: u64,
) -> u64 {
    if total_tickets == 0 {
        return 0;
    }
    let digest = hashv(&[&random_value[..], &draw_index.to_le_bytes()[..]]).to_bytes();
    let wide = u128::from_le_bytes(*array_ref![digest, 0, 16]);
    (wide % total_tickets as u128) as u64
}

fn run_position(runs: &[TicketRun], index: u64) -> usize {
    runs.partition_point(|run| run.end() <= index)
}

/// Select `min(winner_count, distinct players)` distinct winners, in draw order.
///
/// After `MAX_REDRAWS` repeats for one placement, the pick moves forward from the last
/// drawn ticket to the first ticket, wrapping around, whose owner has not won yet.
pub fn select_winners(
    random_value: &RandomValue,
    runs: &[TicketRun],
    winner_count: u8,
) -> Vec<Draw> {
    let total = runs.last().map_or(0, |run| run.end());
    let distinct = runs
        .iter()
        .map(|run| run.owner)
        .collect::<BTreeSet<_>>()
        .len();
    let target = std::cmp::min(winner_count as usize, distinct);
    let stride = winner_count as u64;

    let mut chosen = BTreeSet::new();
    let mut draws = Vec::with_capacity(target);

    for place in 0..target as u64 {
        let mut draw_index = place;
        let mut redraws = 0;
        loop {
            let index = ticket_index_for_draw(random_value, draw_index, total);
            let position = run_position(runs, index);
            let owner = runs[position].owner;
            if !chosen.contains(&owner) {
                chosen.insert(owner);
                draws.push(Draw {
                    player: owner,
                    ticket_index: index,
                    draw_index,
                });
                break;
            }

            redraws += 1;
            if redraws >= MAX_REDRAWS {
                // a distinct holder exists because target <= distinct
                let picked = (1..runs.len())
                    .map(|offset| &runs[(position + offset) % runs.len()])
                    .find(|run| !chosen.contains(&run.owner));
                if let Some(run) = picked {
                    chosen.insert(run.owner);
                    draws.push(Draw {
                        player: run.owner,
                        ticket_index: run.first_sequence,
                        draw_index,
                    });
                }
                break;
            }
            draw_index += stride;
        }
    }

    draws
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::random_value_from_u64;

    fn tickets_for(holdings: &[(Pubkey, u64)]) -> Vec<TicketRun> {
        let mut runs: Vec<TicketRun> = Vec::new();
        for (owner, count) in holdings {
            let first_sequence = runs.last().map_or(0, |run| run.end());
            runs.push(TicketRun {
                owner: *owner,
                first_sequence,
                count: *count,
            });
        }
        runs
    }

    fn owner_of(runs: &[TicketRun], index: u64) -> Pubkey {
        runs[run_position(runs, index)].owner
    }

    #[test]
    fn test_index_is_in_range() {
        let seed = random_value_from_u64(777);
        for draw in 0..200 {
            assert!(ticket_index_for_draw(&seed, draw, 7) < 7);
        }
        assert_eq!(ticket_index_for_draw(&seed, 0, 0), 0);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let players: Vec<Pubkey> = (0..5).map(|_| Pubkey::new_unique()).collect();
        let tickets = tickets_for(&[
            (players[0], 3),
            (players[1], 1),
            (players[2], 4),
            (players[3], 1),
            (players[4], 2),
        ]);
        let seed = random_value_from_u64(777);

        let first = select_winners(&seed, &tickets, 3);
        let second = select_winners(&seed, &tickets, 3);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_winners_are_distinct_and_hold_the_drawn_ticket() {
        let players: Vec<Pubkey> = (0..4).map(|_| Pubkey::new_unique()).collect();
        let tickets = tickets_for(&[
            (players[0], 10),
            (players[1], 1),
            (players[2], 1),
            (players[3], 1),
        ]);

        for seed in 0..50u64 {
            let draws = select_winners(&random_value_from_u64(seed), &tickets, 4);
            assert_eq!(draws.len(), 4);
            let distinct: BTreeSet<_> = draws.iter().map(|d| d.player).collect();
            assert_eq!(distinct.len(), 4);
            for draw in &draws {
                assert_eq!(owner_of(&tickets, draw.ticket_index), draw.player);
            }
        }
    }

    #[test]
    fn test_single_holder_wins_once() {
        let only = Pubkey::new_unique();
        let tickets = tickets_for(&[(only, 5)]);

        let draws = select_winners(&random_value_from_u64(9), &tickets, 3);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].player, only);
    }

    #[test]
    fn test_no_tickets_no_winners() {
        assert!(select_winners(&random_value_from_u64(1), &[], 3).is_empty());
    }

    #[test]
    fn test_first_draw_matches_raw_index() {
        let players: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let tickets = tickets_for(&[(players[0], 2), (players[1], 2), (players[2], 2)]);
        let seed = random_value_from_u64(42);

        let draws = select_winners(&seed, &tickets, 1);
        let expected = ticket_index_for_draw(&seed, 0, 6);
        assert_eq!(draws[0].ticket_index, expected);
        assert_eq!(draws[0].draw_index, 0);
    }

    #[test]
    fn test_dominant_holder_falls_back_to_scan() {
        let whale = Pubkey::new_unique();
        let minnow = Pubkey::new_unique();
        let tickets = tickets_for(&[(whale, 5_000), (minnow, 1)]);

        let draws = select_winners(&random_value_from_u64(3), &tickets, 2);
        let players: BTreeSet<_> = draws.iter().map(|d| d.player).collect();
        assert_eq!(players.len(), 2);
        assert!(players.contains(&minnow));
        for draw in &draws {
            assert_eq!(owner_of(&tickets, draw.ticket_index), draw.player);
        }
    }
}
