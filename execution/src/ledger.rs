//! Per-player session ledger.
//!
//! A [`Session`] owns the balance, the ordered round history and the running
//! counters for one player. It is only mutated through [`Session::apply`] (and the
//! deposit/reset/name operations); callers sharing a session across tasks must
//! serialize access to it.

use std::collections::VecDeque;

use rollquest_types::constants::{
    DEFAULT_BALANCE, DEFAULT_PLAYER_NAME, FACES, MAX_BET, MAX_FUNDS_ADD, MAX_NAME_LENGTH, MIN_BET,
    PAYOUT_MULTIPLIER, STREAK_HISTORY_LEN,
};
use rollquest_types::session::{
    BasicStats, BetAnalysis, FaceDistribution, FacePerformance, ProfitOverTime, RoundOutcome,
    SessionExport, SessionSnapshot, StreakAnalysis,
};
use rollquest_types::{Distribution, EngineError, Face};

use crate::resolver::{net_delta, parse_bet_face, resolve};
use crate::rng::DiceRng;

/// Slack allowed when checking a recorded balance against the ledger.
const BALANCE_EPSILON: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct Session {
    player_name: String,
    initial_balance: f64,
    balance: f64,
    profit: f64,
    total_rounds: u64,
    wins: u64,
    losses: u64,
    history: VecDeque<RoundOutcome>,
    history_limit: Option<usize>,
    face_counts: [u64; FACES],
    face_bets: [u64; FACES],
    face_wins: [u64; FACES],
    total_wagered: f64,
    total_won: f64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE)
    }
}

impl Session {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            player_name: DEFAULT_PLAYER_NAME.to_string(),
            initial_balance,
            balance: initial_balance,
            profit: 0.0,
            total_rounds: 0,
            wins: 0,
            losses: 0,
            history: VecDeque::new(),
            history_limit: None,
            face_counts: [0; FACES],
            face_bets: [0; FACES],
            face_wins: [0; FACES],
            total_wagered: 0.0,
            total_won: 0.0,
        }
    }

    /// Keep at most `limit` rounds of history. Counters still cover every round.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self.trim_history();
        self
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn profit(&self) -> f64 {
        self.profit
    }

    pub fn total_rounds(&self) -> u64 {
        self.total_rounds
    }

    pub fn wins(&self) -> u64 {
        self.wins
    }

    pub fn losses(&self) -> u64 {
        self.losses
    }

    pub fn history(&self) -> impl Iterator<Item = &RoundOutcome> {
        self.history.iter()
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.wins, self.total_rounds)
    }

    /// Record a resolved round.
    ///
    /// The outcome must be the next round, consistent with its own faces, and its
    /// balance must equal the current balance plus the bet's net delta.
    pub fn apply(&mut self, outcome: RoundOutcome) -> Result<(), EngineError> {
        if outcome.round != self.total_rounds + 1 {
            return Err(EngineError::InvalidState(format!(
                "round {} out of order (expected {})",
                outcome.round,
                self.total_rounds + 1
            )));
        }
        if !outcome.bet_amount.is_finite() || outcome.bet_amount <= 0.0 {
            return Err(EngineError::InvalidState(format!(
                "recorded bet amount must be positive (got {})",
                outcome.bet_amount
            )));
        }
        if outcome.won != (outcome.bet_face == outcome.result) {
            return Err(EngineError::InvalidState(
                "recorded win flag disagrees with faces".to_string(),
            ));
        }
        let delta = net_delta(outcome.won, outcome.bet_amount);
        let expected = self.balance + delta;
        if expected < 0.0 || outcome.balance < 0.0 {
            return Err(EngineError::InvalidState(format!(
                "balance would go negative ({expected})"
            )));
        }
        if (outcome.balance - expected).abs() > BALANCE_EPSILON {
            return Err(EngineError::InvalidState(format!(
                "recorded balance {} does not match ledger balance {expected}",
                outcome.balance
            )));
        }

        self.balance = expected;
        self.profit += delta;
        self.total_rounds += 1;
        self.total_wagered += outcome.bet_amount;
        self.face_counts[outcome.result.index()] += 1;
        self.face_bets[outcome.bet_face.index()] += 1;
        if outcome.won {
            self.wins += 1;
            self.total_won += outcome.bet_amount * PAYOUT_MULTIPLIER;
            self.face_wins[outcome.bet_face.index()] += 1;
        } else {
            self.losses += 1;
        }

        self.history.push_back(outcome);
        self.trim_history();
        Ok(())
    }

    /// Validate a bet, roll the die and record the round.
    pub fn play_round(
        &mut self,
        bet_face: i64,
        bet_amount: f64,
        distribution: &Distribution,
        rng: &mut DiceRng,
    ) -> Result<RoundOutcome, EngineError> {
        if !bet_amount.is_finite() || !(MIN_BET..=MAX_BET).contains(&bet_amount) {
            return Err(EngineError::invalid_bet(format!(
                "bet must be between {MIN_BET} and {MAX_BET} (got {bet_amount})"
            )));
        }
        let bet_face = parse_bet_face(bet_face)?;
        if bet_amount > self.balance {
            return Err(EngineError::invalid_bet(format!(
                "insufficient balance: bet {bet_amount} exceeds balance {}",
                self.balance
            )));
        }

        let result = rng.sample(distribution);
        let resolution = resolve(bet_face, bet_amount, result, self.balance)?;
        let outcome = RoundOutcome {
            round: self.total_rounds + 1,
            bet_face,
            bet_amount,
            result,
            won: resolution.won,
            balance: self.balance + resolution.delta,
        };
        self.apply(outcome.clone())?;
        Ok(outcome)
    }

    /// Back to the starting balance with empty history. The player name is kept.
    pub fn reset(&mut self) {
        let name = std::mem::take(&mut self.player_name);
        *self = Session::new(self.initial_balance).with_history_limit(self.history_limit);
        self.player_name = name;
    }

    pub fn add_funds(&mut self, amount: f64) -> Result<f64, EngineError> {
        if !amount.is_finite() || amount <= 0.0 || amount > MAX_FUNDS_ADD {
            return Err(EngineError::invalid_parameter(format!(
                "amount must be between 1 and {MAX_FUNDS_ADD} (got {amount})"
            )));
        }
        self.balance += amount;
        Ok(self.balance)
    }

    pub fn set_player_name(&mut self, name: &str) -> &str {
        let trimmed = name.trim();
        self.player_name = if trimmed.is_empty() {
            DEFAULT_PLAYER_NAME.to_string()
        } else {
            trimmed.chars().take(MAX_NAME_LENGTH).collect()
        };
        &self.player_name
    }

    pub fn basic_stats(&self) -> BasicStats {
        BasicStats {
            player_name: self.player_name.clone(),
            initial_balance: self.initial_balance,
            balance: self.balance,
            profit: self.profit,
            profit_fraction: if self.initial_balance > 0.0 {
                self.profit / self.initial_balance
            } else {
                0.0
            },
            total_rounds: self.total_rounds,
            wins: self.wins,
            losses: self.losses,
            win_rate: self.win_rate(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            basic_stats: self.basic_stats(),
            streak_analysis: streak_analysis(self.history.iter()),
            face_distribution: self.face_distribution(),
            profit_over_time: self.profit_over_time(),
            bet_analysis: self.bet_analysis(),
        }
    }

    pub fn export(&self) -> SessionExport {
        SessionExport {
            player_name: self.player_name.clone(),
            balance: self.balance,
            initial_balance: self.initial_balance,
            profit: self.profit,
            total_rounds: self.total_rounds,
            wins: self.wins,
            losses: self.losses,
            win_rate: self.win_rate(),
            history: self.history.iter().cloned().collect(),
        }
    }

    fn face_distribution(&self) -> FaceDistribution {
        let total_rolls: u64 = self.face_counts.iter().sum();
        let mut fractions = [0.0; FACES];
        for (fraction, count) in fractions.iter_mut().zip(self.face_counts) {
            *fraction = ratio(count, total_rolls);
        }
        FaceDistribution {
            counts: self.face_counts,
            fractions,
            total_rolls,
            expected_fraction: 1.0 / FACES as f64,
        }
    }

    fn profit_over_time(&self) -> ProfitOverTime {
        let retained: f64 = self
            .history
            .iter()
            .map(|round| net_delta(round.won, round.bet_amount))
            .sum();
        // Profit accrued by rounds that fell out of the retained history.
        let mut running = self.profit - retained;

        let mut series = ProfitOverTime::default();
        for round in &self.history {
            running += net_delta(round.won, round.bet_amount);
            series.rounds.push(round.round);
            series.balances.push(round.balance);
            series.profits.push(running);
        }
        series
    }

    fn bet_analysis(&self) -> BetAnalysis {
        let bet_face_performance = Face::all()
            .filter(|face| self.face_bets[face.index()] > 0)
            .map(|face| {
                let times_bet = self.face_bets[face.index()];
                let wins = self.face_wins[face.index()];
                FacePerformance {
                    face,
                    times_bet,
                    wins,
                    win_rate: ratio(wins, times_bet),
                }
            })
            .collect();

        BetAnalysis {
            total_wagered: self.total_wagered,
            total_won: self.total_won,
            total_lost: self.total_wagered - self.total_won,
            avg_bet: if self.total_rounds > 0 {
                self.total_wagered / self.total_rounds as f64
            } else {
                0.0
            },
            bet_face_performance,
        }
    }

    fn trim_history(&mut self) {
        if let Some(limit) = self.history_limit {
            while self.history.len() > limit {
                self.history.pop_front();
            }
        }
    }
}

/// Single pass over the history tracking signed streak lengths.
///
/// A win after losses (or a loss after wins) closes the current streak and
/// starts a new one of length one with the opposite sign.
pub fn streak_analysis<'a>(history: impl IntoIterator<Item = &'a RoundOutcome>) -> StreakAnalysis {
    let mut analysis = StreakAnalysis::default();
    let mut streaks = Vec::new();
    let mut current: i64 = 0;

    for round in history {
        if round.won {
            if current > 0 {
                current += 1;
            } else {
                if current != 0 {
                    streaks.push(current);
                }
                current = 1;
            }
            analysis.max_win_streak = analysis.max_win_streak.max(current as u64);
        } else {
            if current < 0 {
                current -= 1;
            } else {
                if current != 0 {
                    streaks.push(current);
                }
                current = -1;
            }
            analysis.max_lose_streak = analysis.max_lose_streak.max(current.unsigned_abs());
        }
    }
    if current != 0 {
        streaks.push(current);
    }

    let skip = streaks.len().saturating_sub(STREAK_HISTORY_LEN);
    analysis.streak_history = streaks.split_off(skip);
    analysis.current_streak = current;
    analysis
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(value: u8) -> Face {
        Face::new(value).unwrap()
    }

    fn outcome(session: &Session, bet: u8, result: u8, amount: f64) -> RoundOutcome {
        let won = bet == result;
        RoundOutcome {
            round: session.total_rounds() + 1,
            bet_face: face(bet),
            bet_amount: amount,
            result: face(result),
            won,
            balance: session.balance() + net_delta(won, amount),
        }
    }

    fn apply_sequence(session: &mut Session, wins: &[bool]) {
        for &won in wins {
            let round = outcome(session, 1, if won { 1 } else { 2 }, 10.0);
            session.apply(round).unwrap();
        }
    }

    #[test]
    fn test_apply_reflects_single_round() {
        let mut session = Session::default();
        let win = outcome(&session, 4, 4, 10.0);
        session.apply(win).unwrap();
        let stats = session.snapshot().basic_stats;
        assert_eq!(stats.total_rounds, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.balance, 1_050.0);
        assert_eq!(stats.profit, 50.0);

        let loss = outcome(&session, 4, 2, 10.0);
        session.apply(loss).unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.basic_stats.total_rounds, 2);
        assert_eq!(snapshot.basic_stats.losses, 1);
        assert_eq!(snapshot.basic_stats.balance, 1_040.0);
        assert_eq!(snapshot.basic_stats.win_rate, 0.5);
        assert_eq!(snapshot.face_distribution.counts, [0, 1, 0, 1, 0, 0]);
        assert_eq!(snapshot.profit_over_time.profits, vec![50.0, 40.0]);
        assert_eq!(snapshot.bet_analysis.total_wagered, 20.0);
        assert_eq!(snapshot.bet_analysis.total_won, 60.0);
        assert_eq!(snapshot.bet_analysis.bet_face_performance.len(), 1);
        assert_eq!(snapshot.bet_analysis.bet_face_performance[0].times_bet, 2);
    }

    #[test]
    fn test_apply_rejects_negative_balance() {
        let mut session = Session::new(5.0);
        let mut round = outcome(&session, 1, 2, 10.0);
        round.balance = -5.0;
        assert!(matches!(
            session.apply(round),
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(session.total_rounds(), 0);
        assert_eq!(session.balance(), 5.0);
    }

    #[test]
    fn test_apply_rejects_inconsistent_rounds() {
        let mut session = Session::default();
        let mut skipped = outcome(&session, 1, 1, 10.0);
        skipped.round = 3;
        assert!(session.apply(skipped).is_err());

        let mut lying = outcome(&session, 1, 2, 10.0);
        lying.won = true;
        assert!(session.apply(lying).is_err());

        let mut wrong_balance = outcome(&session, 1, 2, 10.0);
        wrong_balance.balance = 2_000.0;
        assert!(session.apply(wrong_balance).is_err());
        assert_eq!(session.total_rounds(), 0);
    }

    #[test]
    fn test_play_round_validates_bet() {
        let mut session = Session::new(50.0);
        let fair = Distribution::fair();
        let mut rng = DiceRng::from_seed(3);
        assert!(matches!(
            session.play_round(0, 10.0, &fair, &mut rng),
            Err(EngineError::InvalidBet(_))
        ));
        assert!(matches!(
            session.play_round(1, 0.5, &fair, &mut rng),
            Err(EngineError::InvalidBet(_))
        ));
        assert!(matches!(
            session.play_round(1, 60.0, &fair, &mut rng),
            Err(EngineError::InvalidBet(_))
        ));
        assert_eq!(session.total_rounds(), 0);

        let round = session.play_round(2, 10.0, &fair, &mut rng).unwrap();
        assert_eq!(round.round, 1);
        assert_eq!(session.balance(), round.balance);
        assert_eq!(round.won, round.result == face(2));
    }

    #[test]
    fn test_play_round_loaded_die() {
        let mut session = Session::default();
        let loaded = Distribution::tweaked(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let mut rng = DiceRng::from_seed(11);
        for _ in 0..5 {
            let round = session.play_round(6, 10.0, &loaded, &mut rng).unwrap();
            assert!(round.won);
        }
        assert_eq!(session.balance(), 1_250.0);
        assert_eq!(session.snapshot().streak_analysis.current_streak, 5);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut session = Session::default();
        session.set_player_name("Ada");
        apply_sequence(&mut session, &[true, false, false]);
        session.add_funds(500.0).unwrap();

        session.reset();
        let first = session.snapshot();
        session.reset();
        let second = session.snapshot();
        assert_eq!(first, second);
        assert_eq!(first.basic_stats.balance, 1_000.0);
        assert_eq!(first.basic_stats.total_rounds, 0);
        assert_eq!(first.basic_stats.player_name, "Ada");
        assert!(session.export().history.is_empty());
    }

    #[test]
    fn test_streak_sign_flips() {
        let mut session = Session::default();
        apply_sequence(&mut session, &[true, true, false, false, false, true]);
        let streaks = session.snapshot().streak_analysis;
        assert_eq!(streaks.current_streak, 1);
        assert_eq!(streaks.max_win_streak, 2);
        assert_eq!(streaks.max_lose_streak, 3);
        assert_eq!(streaks.streak_history, vec![2, -3, 1]);
    }

    #[test]
    fn test_streak_history_keeps_last_twenty() {
        let mut session = Session::new(1_000_000.0);
        let alternating: Vec<bool> = (0..30).map(|i| i % 2 == 0).collect();
        apply_sequence(&mut session, &alternating);
        let streaks = session.snapshot().streak_analysis;
        assert_eq!(streaks.streak_history.len(), STREAK_HISTORY_LEN);
        assert_eq!(streaks.current_streak, -1);
    }

    #[test]
    fn test_history_limit_keeps_counters() {
        let mut session = Session::default().with_history_limit(Some(2));
        apply_sequence(&mut session, &[true, false, false]);
        let export = session.export();
        assert_eq!(export.history.len(), 2);
        assert_eq!(export.history[0].round, 2);
        assert_eq!(export.total_rounds, 3);

        let profits = session.snapshot().profit_over_time.profits;
        assert_eq!(profits, vec![40.0, 30.0]);
    }

    #[test]
    fn test_add_funds_bounds() {
        let mut session = Session::default();
        assert!(session.add_funds(0.0).is_err());
        assert!(session.add_funds(100_001.0).is_err());
        assert!(session.add_funds(f64::NAN).is_err());
        assert_eq!(session.add_funds(100_000.0).unwrap(), 101_000.0);
        assert_eq!(session.profit(), 0.0);
    }

    #[test]
    fn test_player_name_is_truncated() {
        let mut session = Session::default();
        assert_eq!(session.set_player_name("   "), "Player");
        let long = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(session.set_player_name(long).chars().count(), MAX_NAME_LENGTH);
    }

    #[test]
    fn test_export_serializes_history() {
        let mut session = Session::default();
        apply_sequence(&mut session, &[true]);
        let json = serde_json::to_value(session.export()).unwrap();
        assert_eq!(json["history"][0]["bet_face"], 1);
        assert_eq!(json["history"][0]["won"], true);
    }
}
