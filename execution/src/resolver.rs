//! Single-bet resolution.
//!
//! A hit returns `PAYOUT_MULTIPLIER` times the stake, so the net balance change
//! is `+5 * stake` on a win and `-stake` on a loss. At p = 1/6 the game carries
//! no house edge.

use rollquest_types::constants::NET_ODDS;
use rollquest_types::{EngineError, Face};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub won: bool,
    /// Net change applied to the balance.
    pub delta: f64,
}

/// Resolve a bet on `bet_face` against the rolled `outcome`.
pub fn resolve(
    bet_face: Face,
    bet_amount: f64,
    outcome: Face,
    balance: f64,
) -> Result<Resolution, EngineError> {
    if !bet_amount.is_finite() || bet_amount <= 0.0 {
        return Err(EngineError::invalid_bet(format!(
            "bet amount must be positive (got {bet_amount})"
        )));
    }
    if bet_amount > balance {
        return Err(EngineError::invalid_bet(format!(
            "insufficient balance: bet {bet_amount} exceeds balance {balance}"
        )));
    }

    let won = bet_face == outcome;
    Ok(Resolution {
        won,
        delta: net_delta(won, bet_amount),
    })
}

/// Same as [`resolve`] for an unvalidated bet face.
pub fn resolve_raw(
    bet_face: i64,
    bet_amount: f64,
    outcome: Face,
    balance: f64,
) -> Result<Resolution, EngineError> {
    let face = parse_bet_face(bet_face)?;
    resolve(face, bet_amount, outcome, balance)
}

pub fn parse_bet_face(bet_face: i64) -> Result<Face, EngineError> {
    u8::try_from(bet_face)
        .ok()
        .and_then(Face::new)
        .ok_or_else(|| EngineError::invalid_bet(format!("bet face must be 1-6 (got {bet_face})")))
}

/// Balance change for a settled bet.
pub fn net_delta(won: bool, bet_amount: f64) -> f64 {
    if won {
        bet_amount * NET_ODDS
    } else {
        -bet_amount
    }
}
