#[cfg(test)]
pub mod tests {
    use solana_program::pubkey::Pubkey;

    use crate::{
        error::RaffleError,
        oracle::{PriceOracle, RandomnessOracle, RequestHandle, TokenPair},
        state::{PayoutPolicy, RaffleConfig},
    };

    /// Price oracle answering with whatever the test sets
    pub struct FixedPrice {
        pub rate: Result<u64, RaffleError>,
    }

    impl FixedPrice {
        pub fn new(rate: u64) -> Self {
            Self { rate: Ok(rate) }
        }
    }

    impl PriceOracle for FixedPrice {
        fn current_rate(&self, _pair: &TokenPair) -> Result<u64, RaffleError> {
            self.rate
        }
    }

    /// Randomness oracle issuing handles [1; 32], [2; 32], ...
    pub struct MockVrf {
        pub available: bool,
        pub issued: Vec<(u64, RequestHandle)>,
    }

    impl MockVrf {
        pub fn new() -> Self {
            Self {
                available: true,
                issued: Vec::new(),
            }
        }

        pub fn last_handle(&self) -> RequestHandle {
            self.issued.last().map(|(_, handle)| *handle).unwrap()
        }
    }

    impl RandomnessOracle for MockVrf {
        fn request(&mut self, round_id: u64) -> Result<RequestHandle, RaffleError> {
            if !self.available {
                return Err(RaffleError::OracleUnavailable);
            }
            let handle = RequestHandle([self.issued.len() as u8 + 1; 32]);
            self.issued.push((round_id, handle));
            Ok(handle)
        }
    }

    pub const ROUND_DURATION: i64 = 3_600;
    pub const RANDOMNESS_TIMEOUT: i64 = 600;

    pub fn config() -> RaffleConfig {
        RaffleConfig {
            admin: Pubkey::new_unique(),
            randomness_oracle: Pubkey::new_unique(),
            price_feed: Pubkey::new_unique(),
            token_pair: TokenPair::new("SOL", "DAI"),
            ticket_price_units: 1,
            winner_count: 3,
            round_duration: ROUND_DURATION,
            randomness_timeout: RANDOMNESS_TIMEOUT,
            max_price_age: 300,
            payout_policy: PayoutPolicy::EqualShare,
        }
    }
}
