//! Stake sizing for simulated players.

use rollquest_types::constants::{NET_ODDS, PAYOUT_MULTIPLIER};
use rollquest_types::BetStrategy;

/// What the player does next round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stake {
    Bet(f64),
    /// The balance cannot cover the required stake.
    Insufficient,
    /// The strategy declines to bet (Kelly with no edge).
    Idle,
}

/// Kelly fraction for a bet paying `NET_ODDS` to one with win probability `p`.
///
/// `f = (b * p - q) / b`, floored at zero.
pub fn kelly_fraction(win_prob: f64) -> f64 {
    let f = (NET_ODDS * win_prob - (1.0 - win_prob)) / NET_ODDS;
    if f.is_finite() {
        f.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Tracks the stake between rounds for one strategy.
#[derive(Clone, Debug)]
pub struct Staking {
    strategy: BetStrategy,
    base: f64,
    current: f64,
    kelly: f64,
}

impl Staking {
    pub fn new(strategy: BetStrategy, base: f64, win_prob: f64) -> Self {
        Self {
            strategy,
            base,
            current: base,
            kelly: kelly_fraction(win_prob),
        }
    }

    pub fn strategy(&self) -> BetStrategy {
        self.strategy
    }

    pub fn next_stake(&self, balance: f64) -> Stake {
        if balance <= 0.0 {
            return Stake::Insufficient;
        }
        match self.strategy {
            BetStrategy::Fixed => {
                if self.base > balance {
                    Stake::Insufficient
                } else {
                    Stake::Bet(self.base)
                }
            }
            BetStrategy::Martingale | BetStrategy::AntiMartingale => {
                Stake::Bet(self.current.min(balance))
            }
            BetStrategy::Kelly => {
                let stake = (balance * self.kelly).clamp(0.0, balance);
                if stake > 0.0 {
                    Stake::Bet(stake)
                } else {
                    Stake::Idle
                }
            }
        }
    }

    /// Update the progression after a settled round.
    pub fn record(&mut self, won: bool, stake: f64) {
        self.current = match (self.strategy, won) {
            (BetStrategy::Martingale, false) | (BetStrategy::AntiMartingale, true) => stake * 2.0,
            (BetStrategy::Martingale, true) | (BetStrategy::AntiMartingale, false) => self.base,
            (BetStrategy::Fixed | BetStrategy::Kelly, _) => self.base,
        };
    }
}

/// Win probability at which the bet is exactly fair.
pub fn break_even_probability() -> f64 {
    1.0 / PAYOUT_MULTIPLIER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kelly_fraction() {
        assert_eq!(kelly_fraction(1.0 / 6.0), 0.0);
        assert_eq!(kelly_fraction(0.1), 0.0);
        assert!((kelly_fraction(0.5) - 0.4).abs() < 1e-12);
        assert_eq!(kelly_fraction(1.0), 1.0);
        assert!((break_even_probability() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_needs_full_stake() {
        let staking = Staking::new(BetStrategy::Fixed, 10.0, 1.0 / 6.0);
        assert_eq!(staking.next_stake(100.0), Stake::Bet(10.0));
        assert_eq!(staking.next_stake(10.0), Stake::Bet(10.0));
        assert_eq!(staking.next_stake(9.0), Stake::Insufficient);
    }

    #[test]
    fn test_martingale_progression() {
        let mut staking = Staking::new(BetStrategy::Martingale, 10.0, 1.0 / 6.0);
        staking.record(false, 10.0);
        assert_eq!(staking.next_stake(1_000.0), Stake::Bet(20.0));
        staking.record(false, 20.0);
        assert_eq!(staking.next_stake(1_000.0), Stake::Bet(40.0));
        assert_eq!(staking.next_stake(25.0), Stake::Bet(25.0));
        staking.record(true, 40.0);
        assert_eq!(staking.next_stake(1_000.0), Stake::Bet(10.0));
    }

    #[test]
    fn test_anti_martingale_progression() {
        let mut staking = Staking::new(BetStrategy::AntiMartingale, 10.0, 1.0 / 6.0);
        staking.record(true, 10.0);
        assert_eq!(staking.next_stake(1_000.0), Stake::Bet(20.0));
        staking.record(false, 20.0);
        assert_eq!(staking.next_stake(1_000.0), Stake::Bet(10.0));
    }

    #[test]
    fn test_kelly_idles_without_edge() {
        let fair = Staking::new(BetStrategy::Kelly, 10.0, 1.0 / 6.0);
        assert_eq!(fair.next_stake(1_000.0), Stake::Idle);

        let edge = Staking::new(BetStrategy::Kelly, 10.0, 0.5);
        match edge.next_stake(1_000.0) {
            Stake::Bet(stake) => assert!((stake - 400.0).abs() < 1e-9),
            other => panic!("expected a bet, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_balance_is_insufficient() {
        for strategy in BetStrategy::ALL {
            let staking = Staking::new(strategy, 10.0, 0.5);
            assert_eq!(staking.next_stake(0.0), Stake::Insufficient);
        }
    }
}
