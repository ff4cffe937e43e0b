use solana_program::{clock::UnixTimestamp, msg};

use crate::{
    engine::{RaffleEngine, UpkeepOutcome},
    error::RaffleError,
    oracle::{PriceOracle, RandomnessOracle},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeeperReport {
    Idle,
    Performed(UpkeepOutcome),
    /// Someone else advanced the round first
    AlreadyAdvanced,
    /// An oracle was down; the same upkeep is retried on the next poll
    Deferred(RaffleError),
}

/// Time-based trigger: asks the engine whether upkeep is due and performs it.
/// Transient oracle failures are reported, not raised, so the next poll retries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeeperTrigger {
    pub polls: u64,
    pub performed: u64,
}

impl KeeperTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll<R: RandomnessOracle, P: PriceOracle>(
        &mut self,
        engine: &mut RaffleEngine,
        randomness: &mut R,
        price: &P,
        now: UnixTimestamp,
    ) -> Result<KeeperReport, RaffleError> {
        self.polls += 1;
        if !engine.check_upkeep(now) {
            return Ok(KeeperReport::Idle);
        }

        match engine.perform_upkeep(randomness, price, now) {
            Ok(UpkeepOutcome::NotDue) => Ok(KeeperReport::Idle),
            Ok(outcome) => {
                self.performed += 1;
                Ok(KeeperReport::Performed(outcome))
            }
            Err(RaffleError::AlreadyRequested) => Ok(KeeperReport::AlreadyAdvanced),
            Err(err) if err.is_transient() => {
                msg!("Upkeep deferred: {}", err);
                Ok(KeeperReport::Deferred(err))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use solana_program::pubkey::Pubkey;

    use super::*;
    use crate::{
        state::RoundStatus,
        test_utils::tests::{config, FixedPrice, MockVrf, ROUND_DURATION},
    };

    #[test]
    fn test_keeper_drives_round_to_request() {
        let price = FixedPrice::new(1);
        let mut vrf = MockVrf::new();
        let mut engine = RaffleEngine::new(config(), &price, 0).unwrap();
        engine.buy_tickets(&Pubkey::new_unique(), 4, 1).unwrap();
        let mut keeper = KeeperTrigger::new();

        assert_eq!(
            keeper.poll(&mut engine, &mut vrf, &price, 60),
            Ok(KeeperReport::Idle)
        );
        let report = keeper
            .poll(&mut engine, &mut vrf, &price, ROUND_DURATION)
            .unwrap();
        assert_eq!(
            report,
            KeeperReport::Performed(UpkeepOutcome::RandomnessRequested {
                round_id: 1,
                handle: vrf.last_handle()
            })
        );
        assert_eq!(
            keeper.poll(&mut engine, &mut vrf, &price, ROUND_DURATION + 1),
            Ok(KeeperReport::Idle)
        );
        assert_eq!(keeper.polls, 3);
        assert_eq!(keeper.performed, 1);
        assert_eq!(vrf.issued.len(), 1);
    }

    #[test]
    fn test_oracle_outage_is_deferred() {
        let price = FixedPrice::new(1);
        let mut vrf = MockVrf::new();
        let mut engine = RaffleEngine::new(config(), &price, 0).unwrap();
        engine.buy_tickets(&Pubkey::new_unique(), 1, 1).unwrap();
        let mut keeper = KeeperTrigger::new();

        vrf.available = false;
        assert_eq!(
            keeper.poll(&mut engine, &mut vrf, &price, ROUND_DURATION),
            Ok(KeeperReport::Deferred(RaffleError::OracleUnavailable))
        );
        assert_eq!(engine.status(), RoundStatus::Closing);

        vrf.available = true;
        assert!(matches!(
            keeper.poll(&mut engine, &mut vrf, &price, ROUND_DURATION + 10),
            Ok(KeeperReport::Performed(UpkeepOutcome::RandomnessRequested { .. }))
        ));
        assert_eq!(engine.status(), RoundStatus::AwaitingRandomness);
    }

    #[test]
    fn test_paused_engine_is_left_alone() {
        let price = FixedPrice::new(1);
        let mut vrf = MockVrf::new();
        let cfg = config();
        let admin = cfg.admin;
        let mut engine = RaffleEngine::new(cfg, &price, 0).unwrap();
        engine.pause(&admin).unwrap();

        let mut keeper = KeeperTrigger::new();
        assert_eq!(
            keeper.poll(&mut engine, &mut vrf, &price, ROUND_DURATION * 2),
            Ok(KeeperReport::Idle)
        );
        assert!(vrf.issued.is_empty());
    }
}
