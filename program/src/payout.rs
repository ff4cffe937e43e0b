//! Pool split between winners.

use crate::{error::RaffleError, state::PayoutPolicy};

/// Denominator of placement weights
pub const BASIS_POINTS: u64 = 10_000;

/// Split `pool` across `winners` payouts, first-drawn first. Any integer remainder is
/// added to the first winner; the result always sums to `pool` or the call fails.
pub fn split_pool(
    pool: u64,
    winners: usize,
    policy: &PayoutPolicy,
) -> Result<Vec<u64>, RaffleError> {
    if winners == 0 {
        return if pool == 0 {
            Ok(Vec::new())
        } else {
            Err(RaffleError::AccountingMismatch)
        };
    }

    let mut shares = match policy {
        PayoutPolicy::EqualShare => vec![pool / winners as u64; winners],
        PayoutPolicy::Placement(weights) => {
            if weights.len() < winners {
                return Err(RaffleError::AccountingMismatch);
            }
            // renormalised when fewer winners were drawn than configured
            let weights = &weights[..winners];
            let total_weight: u128 = weights.iter().map(|w| *w as u128).sum();
            if total_weight == 0 {
                return Err(RaffleError::AccountingMismatch);
            }
            weights
                .iter()
                .map(|w| (pool as u128 * *w as u128 / total_weight) as u64)
                .collect()
        }
    };

    let allocated = checked_sum(&shares)?;
    let remainder = pool
        .checked_sub(allocated)
        .ok_or(RaffleError::AccountingMismatch)?;
    shares[0] = shares[0]
        .checked_add(remainder)
        .ok_or(RaffleError::AccountingMismatch)?;

    verify_allocation(pool, &shares)?;
    Ok(shares)
}

/// Payouts must add up to the pool exactly
pub fn verify_allocation(pool: u64, payouts: &[u64]) -> Result<(), RaffleError> {
    if checked_sum(payouts)? != pool {
        return Err(RaffleError::AccountingMismatch);
    }
    Ok(())
}

fn checked_sum(values: &[u64]) -> Result<u64, RaffleError> {
    values
        .iter()
        .try_fold(0u64, |acc, v| acc.checked_add(*v))
        .ok_or(RaffleError::AccountingMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_share_remainder_goes_to_first() {
        assert_eq!(split_pool(5, 3, &PayoutPolicy::EqualShare), Ok(vec![3, 1, 1]));
        assert_eq!(split_pool(9, 3, &PayoutPolicy::EqualShare), Ok(vec![3, 3, 3]));
        assert_eq!(split_pool(1, 2, &PayoutPolicy::EqualShare), Ok(vec![1, 0]));
    }

    #[test]
    fn test_every_split_is_exact() {
        let placement = PayoutPolicy::Placement(vec![5_000, 3_000, 1_500, 500]);
        for pool in [0u64, 1, 7, 99, 1_000_003, u64::MAX] {
            for winners in 1..=4 {
                let equal = split_pool(pool, winners, &PayoutPolicy::EqualShare).unwrap();
                assert_eq!(equal.iter().map(|v| *v as u128).sum::<u128>(), pool as u128);

                let placed = split_pool(pool, winners, &placement).unwrap();
                assert_eq!(placed.iter().map(|v| *v as u128).sum::<u128>(), pool as u128);
                assert_eq!(placed.len(), winners);
            }
        }
    }

    #[test]
    fn test_placement_weights() {
        let placement = PayoutPolicy::Placement(vec![6_000, 3_000, 1_000]);
        assert_eq!(split_pool(1_000, 3, &placement), Ok(vec![600, 300, 100]));
        // two winners drawn: 6000/9000 and 3000/9000 of 1000
        assert_eq!(split_pool(1_000, 2, &placement), Ok(vec![667, 333]));
    }

    #[test]
    fn test_pool_without_winners_is_rejected() {
        assert_eq!(
            split_pool(10, 0, &PayoutPolicy::EqualShare),
            Err(RaffleError::AccountingMismatch)
        );
        assert_eq!(split_pool(0, 0, &PayoutPolicy::EqualShare), Ok(vec![]));
    }

    #[test]
    fn test_verify_allocation() {
        assert_eq!(verify_allocation(10, &[5, 5]), Ok(()));
        assert_eq!(
            verify_allocation(10, &[5, 4]),
            Err(RaffleError::AccountingMismatch)
        );
        assert_eq!(
            verify_allocation(10, &[u64::MAX, 11]),
            Err(RaffleError::AccountingMismatch)
        );
    }
}
