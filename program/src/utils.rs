// Program derived addresses
use solana_program::pubkey::Pubkey;

pub const PLAYER_RECORD_SEED: &[u8] = b"player";

/// Find the program derived address of a player's record for one raffle
pub fn find_player_record_address(
    program_id: &Pubkey,
    engine: &Pubkey,
    player: &Pubkey,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[PLAYER_RECORD_SEED, engine.as_ref(), player.as_ref()],
        program_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_address_is_per_engine_and_player() {
        let program_id = Pubkey::new_unique();
        let (engine, player) = (Pubkey::new_unique(), Pubkey::new_unique());

        let (address, bump) = find_player_record_address(&program_id, &engine, &player);
        assert_eq!(
            find_player_record_address(&program_id, &engine, &player),
            (address, bump)
        );
        let seeds: &[&[u8]] = &[PLAYER_RECORD_SEED, engine.as_ref(), player.as_ref(), &[bump]];
        assert_eq!(
            Pubkey::create_program_address(seeds, &program_id).unwrap(),
            address
        );
        assert_ne!(
            find_player_record_address(&program_id, &Pubkey::new_unique(), &player).0,
            address
        );
    }
}
