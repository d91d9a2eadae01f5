//! Runs one house affordability plan against the configured backend.
//!
//! Usage: `plan-house <income> <rent> <risk> [location] [credit-card]`

use rust_affordability_api::config::Config;
use rust_affordability_api::handlers::AppState;
use rust_affordability_api::models::{AffordabilityForm, DataSource, Goal};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: plan-house <income> <rent> <risk> [location] [credit-card]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_affordability_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        anyhow::bail!(USAGE);
    }

    let form = AffordabilityForm {
        monthly_income: Some(Value::String(args[0].clone())),
        monthly_rent: Some(Value::String(args[1].clone())),
        risk_tolerance: Some(args[2].clone()),
        location: args.get(3).cloned(),
        monthly_credit_card_spend: args.get(4).cloned().map(Value::String),
    };

    let config = Config::from_env()?;
    let state = AppState::new(config)?;
    let planner = state.new_planner();

    planner.select_goal(Goal::House).await?;
    let projection = planner.submit_analysis(&form).await?;
    planner.wait_for_searches().await;
    let snapshot = planner.snapshot().await;

    println!("Five-year projection ({})", projection.portfolio_type);
    if projection.data_source == DataSource::EstimatedFallback {
        println!("  (estimated locally, the analysis service was not used)");
    }
    println!("  Monthly income:        ${:>12.2}", projection.monthly_income);
    println!("  Monthly rent:          ${:>12.2}", projection.monthly_rent);
    println!(
        "  Monthly credit card:   ${:>12.2}  ({:?})",
        projection.monthly_credit_card, projection.credit_card_source
    );
    println!("  Disposable income:     ${:>12.2}", projection.disposable_income);
    println!("  Monthly savings:       ${:>12.2}", projection.monthly_savings);
    println!("  Total contributions:   ${:>12.2}", projection.total_contributions);
    println!("  Projected value:       ${:>12.2}", projection.projected_value_5_years);
    println!("  Investment growth:     ${:>12.2}", projection.investment_growth);
    println!(
        "  Expected return:       {:>12.1}%",
        projection.expected_annual_return * 100.0
    );

    if !projection.recommendations.is_empty() {
        println!();
        println!("Recommendations");
        for recommendation in &projection.recommendations {
            println!("  - {}", recommendation);
        }
    }

    println!();
    match snapshot.search_location {
        Some(location) if !snapshot.listings.is_empty() => {
            println!("Listings in {}", location);
            for house in &snapshot.listings {
                println!(
                    "  {} | ${:.0} | {:.1}% down | ${:.2}/month",
                    house.address,
                    house.price,
                    house.downpayment_coverage_percent,
                    house.monthly_payment
                );
            }
        }
        Some(location) => println!("No listings found in {}", location),
        None => println!("No down payment saved, house search skipped"),
    }

    Ok(())
}
