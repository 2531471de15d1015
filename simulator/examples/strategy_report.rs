use rollquest_execution::{run_batch, EngineLimits};
use rollquest_types::{BetStrategy, GameMode, SimulationParams};

const SIMULATIONS: u64 = 1_000;
const TRIALS: u64 = 1_000;
const BET: f64 = 10.0;
const SEED: u64 = 42;
// Six is twice as likely as any other face.
const LOADED: [f64; 6] = [1.0, 1.0, 1.0, 1.0, 1.0, 2.0];

struct Row {
    mode: &'static str,
    strategy: &'static str,
    mean_profit: f64,
    median_profit: f64,
    ruin: f64,
    var_5: f64,
    edge: f64,
}

fn main() {
    let limits = EngineLimits {
        max_batch_simulations: SIMULATIONS,
        max_batch_trials: TRIALS,
        ..EngineLimits::default()
    };
    let mut rows = Vec::new();

    for (mode, probabilities) in [
        (GameMode::Fair, None),
        (GameMode::Tweaked, Some(LOADED.to_vec())),
    ] {
        for strategy in BetStrategy::ALL {
            let params = SimulationParams {
                num_trials: TRIALS,
                bet_amount: BET,
                bet_strategy: strategy,
                game_mode: mode,
                probabilities: probabilities.clone(),
                target_face: Some(6),
                seed: Some(SEED),
                ..SimulationParams::default()
            };
            let batch = match run_batch(params, SIMULATIONS, &limits) {
                Ok(batch) => batch,
                Err(err) => {
                    eprintln!("{} {}: {err}", mode.as_str(), strategy.as_str());
                    continue;
                }
            };
            let stats = &batch.statistics;
            rows.push(Row {
                mode: mode.as_str(),
                strategy: strategy.as_str(),
                mean_profit: stats.mean_profit,
                median_profit: stats.median_profit,
                ruin: stats.ruin_probability,
                var_5: stats.value_at_risk_5,
                // Realized edge per unit of base stake over the whole run.
                edge: -stats.mean_profit / (BET * TRIALS as f64),
            });
        }
    }

    // Print CSV
    println!("mode,strategy,mean_profit,median_profit,ruin_probability,var_5,edge");
    for row in rows {
        println!(
            "{},{},{:.4},{:.4},{:.4},{:.4},{:.6}",
            row.mode,
            row.strategy,
            row.mean_profit,
            row.median_profit,
            row.ruin,
            row.var_5,
            row.edge
        );
    }
}
