use std::process::ExitCode;

use battle_sim::{run, Scenario, SimError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: battle-sim <scenario.json>";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    match simulate(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, scenario = %path, "simulation failed");
            ExitCode::FAILURE
        }
    }
}

async fn simulate(path: &str) -> Result<(), SimError> {
    let scenario = Scenario::load(path)?;
    let report = run(scenario).await?;

    for rejection in &report.rejections {
        warn!(at = rejection.at, error = %rejection.error, "event rejected");
    }
    // one update per line on stdout
    for update in &report.updates {
        println!("{}", serde_json::to_string(update)?);
    }

    let result = &report.result;
    info!(
        winner = %result.winning_creator,
        score_a = result.final_score_a,
        score_b = result.final_score_b,
        pool = result.total_pool,
        paid = result.total_paid(),
        retained = result.retained,
        "battle settled"
    );
    Ok(())
}
