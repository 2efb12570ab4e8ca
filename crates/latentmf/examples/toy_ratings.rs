//! Factorizing a small rating matrix.
//!
//! This example shows how to:
//! - Build a model over a rating matrix with missing entries
//! - Train it with a convergence tolerance and a history callback
//! - Read back the learned biases and the completed rating matrix

use latentmf::prelude::*;
use std::time::Instant;

fn main() -> Result<()> {
    println!("=== Toy Rating Matrix ===\n");

    // Zero marks a missing rating
    let ratings = DMatrix::from_row_slice(
        3,
        4,
        &[1.0, 0.0, 0.0, 4.0, 0.0, 3.0, 2.0, 2.0, 3.0, 4.0, 0.0, 0.0],
    );
    println!("Ratings (0 = missing):{ratings}");

    let config = FactorConfig::new(10)
        .with_learning_rate(2e-4)
        .with_regularization(0.02);
    let mut model = FactorModel::new(&ratings, config)?;
    println!(
        "{} users, {} items, {} observed ratings, global mean {:.4}\n",
        model.n_users(),
        model.n_items(),
        model.n_observed(),
        model.global_mean()
    );

    let mut history = HistoryCallback::new();
    let start = Instant::now();
    let result = model.train_with_callback(
        &TrainingConfig::new()
            .with_tolerance(1e-3)
            .with_check_interval(1000)
            .with_seed(7),
        &mut history,
    )?;
    let elapsed = start.elapsed();

    println!("Training:");
    println!("  Stopped: {:?}", result.termination_reason);
    println!("  Iterations: {}", result.iterations);
    println!("  Error checks: {}", result.checks);
    println!("  Initial error: {:.6}", result.initial_error);
    println!("  Final error: {:.6}", result.final_error);
    println!("  Observed RMSE: {:.6}", model.observed_rmse()?);
    println!("  Time: {elapsed:?}");

    println!("\nError every 10 checks:");
    for (iteration, error) in history.history().iter().step_by(10) {
        println!("  {iteration:>8}: {error:.6}");
    }

    println!("\nUser biases:{}", model.user_biases()?.transpose());
    println!("Item biases:{}", model.item_biases()?.transpose());

    let predicted = model.rating_matrix()?;
    println!("Predicted ratings:{predicted:.3}");

    println!("Predictions for the missing cells:");
    for user in 0..model.n_users() {
        for item in 0..model.n_items() {
            if !model.ratings().is_observed(user, item) {
                println!("  user {user}, item {item}: {:.3}", model.rating(user, item)?);
            }
        }
    }

    Ok(())
}
