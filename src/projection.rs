//! Local projection arithmetic.
//!
//! Used when the Analysis Service cannot answer. Everything here is a pure
//! function of its inputs and the constants below, so repeated calls with the
//! same input produce identical projections.

use crate::models::{
    AffordabilityInput, AffordabilityProjection, CreditCardSource, DataSource,
};

/// Share of disposable income assumed to be invested each month.
pub const SAVINGS_RATE: f64 = 0.30;
/// Nominal annual return, compounded monthly.
pub const FALLBACK_ANNUAL_RETURN: f64 = 0.07;
pub const INVESTMENT_PERIOD_YEARS: u32 = 5;
/// Credit-card spend assumed when neither the user nor statement history supplies one.
pub const CREDIT_CARD_ESTIMATE_RATE: f64 = 0.15;
pub const MORTGAGE_RATE: f64 = 0.065;
pub const MORTGAGE_YEARS: u32 = 30;

/// Why the projection had to be estimated locally.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// No answer within the analysis ceiling.
    Timeout { seconds: u64 },
    /// Non-success status, transport failure, or open circuit.
    Unavailable(String),
    /// The service answered without a projected value.
    IncompleteResponse,
}

impl FallbackReason {
    fn disclosure(&self) -> String {
        match self {
            FallbackReason::Timeout { seconds } => format!(
                "Estimates used: the analysis service did not respond within {} second{}",
                seconds,
                if *seconds == 1 { "" } else { "s" }
            ),
            FallbackReason::Unavailable(_) => {
                "Estimates used: the analysis service is currently unavailable".to_string()
            }
            FallbackReason::IncompleteResponse => {
                "Estimates used: the analysis service returned an incomplete projection"
                    .to_string()
            }
        }
    }
}

/// `max(0, disposable × SAVINGS_RATE)`.
pub fn monthly_savings(disposable_income: f64) -> f64 {
    (disposable_income * SAVINGS_RATE).max(0.0)
}

/// Future value of an ordinary annuity paying `payment` at the end of each month.
pub fn future_value_of_annuity(payment: f64, annual_rate: f64, months: u32) -> f64 {
    let r = annual_rate / 12.0;
    if r == 0.0 {
        return payment * f64::from(months);
    }
    payment * (((1.0 + r).powi(months as i32) - 1.0) / r)
}

pub fn estimated_credit_card(monthly_income: f64) -> f64 {
    monthly_income * CREDIT_CARD_ESTIMATE_RATE
}

/// Resolves card spend: user value first, statement history second.
///
/// Returns `None` when neither is known.
pub fn known_credit_card(
    input: &AffordabilityInput,
    observed: Option<f64>,
) -> Option<(f64, CreditCardSource)> {
    input
        .monthly_credit_card_spend
        .map(|v| (v, CreditCardSource::UserProvided))
        .or_else(|| observed.map(|v| (v, CreditCardSource::TransactionHistory)))
}

/// Like [`known_credit_card`] but falls back to the 15%-of-income estimate.
pub fn resolve_credit_card(
    input: &AffordabilityInput,
    observed: Option<f64>,
) -> (f64, CreditCardSource) {
    known_credit_card(input, observed).unwrap_or_else(|| {
        (
            estimated_credit_card(input.monthly_income),
            CreditCardSource::Estimated,
        )
    })
}

/// Builds the locally estimated projection.
pub fn fallback_projection(
    input: &AffordabilityInput,
    observed_credit_card: Option<f64>,
    reason: &FallbackReason,
) -> AffordabilityProjection {
    let (monthly_credit_card, credit_card_source) =
        resolve_credit_card(input, observed_credit_card);
    let disposable_income = input.monthly_income - input.monthly_rent - monthly_credit_card;
    let monthly_savings = monthly_savings(disposable_income);
    let months = INVESTMENT_PERIOD_YEARS * 12;
    let total_contributions = monthly_savings * f64::from(months);
    let projected = future_value_of_annuity(monthly_savings, FALLBACK_ANNUAL_RETURN, months);
    let investment_growth = projected - total_contributions;

    let mut recommendations = vec![
        reason.disclosure(),
        credit_card_source.disclosure().to_string(),
        format!(
            "Assumes {:.0}% of disposable income is invested at {:.1}% a year, compounded monthly for {} years",
            SAVINGS_RATE * 100.0,
            FALLBACK_ANNUAL_RETURN * 100.0,
            INVESTMENT_PERIOD_YEARS
        ),
    ];
    if monthly_savings > 0.0 {
        recommendations.push(format!(
            "With ${:.0}/month savings over {} years, you'll contribute ${:.0}",
            monthly_savings, INVESTMENT_PERIOD_YEARS, total_contributions
        ));
        recommendations.push(format!(
            "Your investments could grow to ${:.0}, ${:.0} beyond your contributions",
            projected, investment_growth
        ));
    } else {
        recommendations.push(
            "Rent and card spending use up your income; reduce expenses before saving for a down payment"
                .to_string(),
        );
    }

    AffordabilityProjection {
        monthly_income: input.monthly_income,
        monthly_rent: input.monthly_rent,
        monthly_credit_card,
        credit_card_source,
        disposable_income,
        monthly_savings,
        investment_period_years: INVESTMENT_PERIOD_YEARS,
        total_contributions,
        projected_value_5_years: projected,
        investment_growth,
        expected_annual_return: FALLBACK_ANNUAL_RETURN,
        risk_profile: input.risk_tolerance,
        portfolio_type: format!("{} (estimated)", input.risk_tolerance.label()),
        portfolio_id: None,
        rbc_api_used: false,
        data_source: DataSource::EstimatedFallback,
        recommendations,
    }
}

/// Monthly payment on `price − down_payment` over 30 years at 6.5%.
pub fn monthly_mortgage_payment(price: f64, down_payment: f64) -> f64 {
    let loan = price - down_payment;
    if loan <= 0.0 {
        return 0.0;
    }
    let r = MORTGAGE_RATE / 12.0;
    let n = (MORTGAGE_YEARS * 12) as i32;
    let growth = (1.0 + r).powi(n);
    let payment = loan * (r * growth) / (growth - 1.0);
    (payment * 100.0).round() / 100.0
}

pub fn downpayment_coverage_percent(down_payment: f64, price: f64) -> f64 {
    if price > 0.0 {
        down_payment / price * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskTolerance;

    fn input(income: f64, rent: f64, card: Option<f64>, risk: RiskTolerance) -> AffordabilityInput {
        AffordabilityInput {
            monthly_income: income,
            monthly_rent: rent,
            monthly_credit_card_spend: card,
            risk_tolerance: risk,
            location: "Waterloo, ON".to_string(),
        }
    }

    #[test]
    fn test_moderate_scenario() {
        let input = input(5000.0, 1500.0, Some(800.0), RiskTolerance::Moderate);
        let p = fallback_projection(&input, None, &FallbackReason::Unavailable("down".into()));

        let r: f64 = 0.07 / 12.0;
        let expected = 810.0 * (((1.0 + r).powi(60) - 1.0) / r);

        assert_eq!(p.data_source, DataSource::EstimatedFallback);
        assert_eq!(p.credit_card_source, CreditCardSource::UserProvided);
        assert!((p.disposable_income - 2700.0).abs() < 1e-9);
        assert!((p.monthly_savings - 810.0).abs() < 1e-9);
        assert!((p.total_contributions - 48600.0).abs() < 1e-6);
        assert!((p.projected_value_5_years - expected).abs() < 1e-6);
        assert!(p.projected_value_5_years > 57_900.0 && p.projected_value_5_years < 58_100.0);
        assert!(p.recommendations[0].starts_with("Estimates used"));
    }

    #[test]
    fn test_negative_disposable_clamps_to_zero() {
        let input = input(3000.0, 2900.0, Some(500.0), RiskTolerance::Conservative);
        let p = fallback_projection(&input, None, &FallbackReason::IncompleteResponse);

        assert!((p.disposable_income + 400.0).abs() < 1e-9);
        assert_eq!(p.monthly_savings, 0.0);
        assert_eq!(p.total_contributions, 0.0);
        assert_eq!(p.projected_value_5_years, 0.0);
    }

    #[test]
    fn test_credit_card_precedence() {
        let with_card = input(4000.0, 1000.0, Some(300.0), RiskTolerance::Moderate);
        assert_eq!(
            resolve_credit_card(&with_card, Some(900.0)),
            (300.0, CreditCardSource::UserProvided)
        );

        let without = input(4000.0, 1000.0, None, RiskTolerance::Moderate);
        assert_eq!(
            resolve_credit_card(&without, Some(900.0)),
            (900.0, CreditCardSource::TransactionHistory)
        );
        assert_eq!(
            resolve_credit_card(&without, None),
            (600.0, CreditCardSource::Estimated)
        );
    }

    #[test]
    fn test_timeout_disclosure_pluralizes() {
        assert!(FallbackReason::Timeout { seconds: 1 }
            .disclosure()
            .ends_with("within 1 second"));
        assert!(FallbackReason::Timeout { seconds: 60 }
            .disclosure()
            .ends_with("within 60 seconds"));
    }

    #[test]
    fn test_zero_rate_annuity_is_plain_sum() {
        assert_eq!(future_value_of_annuity(100.0, 0.0, 60), 6000.0);
    }

    #[test]
    fn test_mortgage_payment() {
        assert_eq!(monthly_mortgage_payment(300_000.0, 300_000.0), 0.0);
        // 320k loan, 6.5%, 30 years
        let payment = monthly_mortgage_payment(400_000.0, 80_000.0);
        assert!((payment - 2022.62).abs() < 0.01);
        assert_eq!(downpayment_coverage_percent(80_000.0, 0.0), 0.0);
    }
}
