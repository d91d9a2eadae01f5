use crate::errors::AppError;
use crate::projection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ============ Planner Input ============

/// Investment aggressiveness tag.
///
/// Opaque to this service: it is validated, displayed, and forwarded to the
/// analysis backend as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTolerance {
    VeryAggressive,
    Aggressive,
    Moderate,
    Conservative,
    VeryConservative,
}

impl RiskTolerance {
    pub const ALL: [RiskTolerance; 5] = [
        RiskTolerance::VeryAggressive,
        RiskTolerance::Aggressive,
        RiskTolerance::Moderate,
        RiskTolerance::Conservative,
        RiskTolerance::VeryConservative,
    ];

    /// Wire tag, e.g. `very-aggressive`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTolerance::VeryAggressive => "very-aggressive",
            RiskTolerance::Aggressive => "aggressive",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::Conservative => "conservative",
            RiskTolerance::VeryConservative => "very-conservative",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskTolerance::VeryAggressive => "Very Aggressive",
            RiskTolerance::Aggressive => "Aggressive",
            RiskTolerance::Moderate => "Moderate",
            RiskTolerance::Conservative => "Conservative",
            RiskTolerance::VeryConservative => "Very Conservative",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskTolerance::VeryAggressive => "Maximum growth, comfortable with large swings",
            RiskTolerance::Aggressive => "Growth focused, accepts significant volatility",
            RiskTolerance::Moderate => "Balanced growth approach",
            RiskTolerance::Conservative => "Capital preservation with modest growth",
            RiskTolerance::VeryConservative => "Capital preservation first",
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTolerance {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(&['_', ' '][..], "-");
        RiskTolerance::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "risk_tolerance must be one of: {}",
                    RiskTolerance::ALL.map(|r| r.as_str()).join(", ")
                ))
            })
    }
}

/// Goals offered on the selection screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    House,
    Wealth,
    Retirement,
}

/// Raw affordability form as submitted by a client.
///
/// Amounts may arrive as JSON numbers or numeric strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffordabilityForm {
    #[serde(default)]
    pub monthly_income: Option<Value>,
    #[serde(default)]
    pub monthly_rent: Option<Value>,
    #[serde(default, alias = "monthly_credit_card")]
    pub monthly_credit_card_spend: Option<Value>,
    #[serde(default)]
    pub risk_tolerance: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl AffordabilityForm {
    /// Validates the form, filling `location` with `default_location` when blank.
    ///
    /// Missing required fields are reported together so a client can fix
    /// them in one pass.
    pub fn validate(&self, default_location: &str) -> Result<AffordabilityInput, AppError> {
        let income = coerce_amount("monthly_income", self.monthly_income.as_ref())?;
        let rent = coerce_amount("monthly_rent", self.monthly_rent.as_ref())?;
        let credit_card =
            coerce_amount("monthly_credit_card", self.monthly_credit_card_spend.as_ref())?;
        let risk = self
            .risk_tolerance
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let mut missing = Vec::new();
        if income.is_none() {
            missing.push("monthly_income");
        }
        if rent.is_none() {
            missing.push("monthly_rent");
        }
        if risk.is_none() {
            missing.push("risk_tolerance");
        }
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let (Some(monthly_income), Some(monthly_rent), Some(risk)) = (income, rent, risk) else {
            return Err(AppError::BadRequest("Missing required fields".to_string()));
        };

        let location = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(default_location)
            .to_string();

        Ok(AffordabilityInput {
            monthly_income,
            monthly_rent,
            monthly_credit_card_spend: credit_card,
            risk_tolerance: risk.parse()?,
            location,
        })
    }
}

/// Coerces a form value into a non-negative amount.
///
/// `None`, `null` and blank strings count as absent.
pub fn coerce_amount(field: &str, value: Option<&Value>) -> Result<Option<f64>, AppError> {
    let amount = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().replace(&[',', '$'][..], "").parse::<f64>().ok(),
        Some(_) => None,
    };

    match amount {
        Some(a) if a.is_finite() && a >= 0.0 => Ok(Some(a)),
        Some(_) => Err(AppError::BadRequest(format!(
            "{} must be a non-negative amount",
            field
        ))),
        None => Err(AppError::BadRequest(format!("{} must be numeric", field))),
    }
}

/// Validated planner input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffordabilityInput {
    pub monthly_income: f64,
    pub monthly_rent: f64,
    pub monthly_credit_card_spend: Option<f64>,
    pub risk_tolerance: RiskTolerance,
    pub location: String,
}

// ============ Projection ============

/// Provenance of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    ExternalApi,
    EstimatedFallback,
}

/// Where the monthly credit-card figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreditCardSource {
    UserProvided,
    TransactionHistory,
    Estimated,
}

impl CreditCardSource {
    pub fn disclosure(&self) -> &'static str {
        match self {
            CreditCardSource::UserProvided => "Credit card spending as entered by you",
            CreditCardSource::TransactionHistory => {
                "Credit card spending taken from your uploaded statement history"
            }
            CreditCardSource::Estimated => {
                "Credit card spending estimated at 15% of monthly income (no statement history available)"
            }
        }
    }
}

/// Five-year savings and investment projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffordabilityProjection {
    pub monthly_income: f64,
    pub monthly_rent: f64,
    pub monthly_credit_card: f64,
    pub credit_card_source: CreditCardSource,
    pub disposable_income: f64,
    pub monthly_savings: f64,
    pub investment_period_years: u32,
    pub total_contributions: f64,
    pub projected_value_5_years: f64,
    pub investment_growth: f64,
    /// Fraction, e.g. `0.07`.
    pub expected_annual_return: f64,
    pub risk_profile: RiskTolerance,
    pub portfolio_type: String,
    pub portfolio_id: Option<String>,
    pub rbc_api_used: bool,
    pub data_source: DataSource,
    pub recommendations: Vec<String>,
}

// ============ Analysis Service Wire Models ============

/// Body sent to `POST /api/v1/house-analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseAnalysisRequest {
    pub monthly_income: f64,
    pub monthly_rent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_credit_card: Option<f64>,
    pub risk_tolerance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl HouseAnalysisRequest {
    pub fn new(input: &AffordabilityInput, credit_card: Option<f64>) -> Self {
        Self {
            monthly_income: input.monthly_income,
            monthly_rent: input.monthly_rent,
            monthly_credit_card: credit_card,
            risk_tolerance: input.risk_tolerance.as_str().to_string(),
            location: Some(input.location.clone()),
        }
    }
}

/// RBC InvestEase portfolio details attached to an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbcAnalysis {
    #[serde(default)]
    pub rbc_portfolio_type: Option<String>,
    #[serde(default)]
    pub portfolio_id: Option<String>,
}

/// Analysis Service response. Every field is optional so partial answers
/// still decode; [`HouseAnalysisResponse::into_projection`] decides whether
/// the answer is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseAnalysisResponse {
    pub monthly_income: Option<f64>,
    pub monthly_rent: Option<f64>,
    pub monthly_credit_card: Option<f64>,
    pub disposable_income: Option<f64>,
    pub monthly_savings: Option<f64>,
    pub investment_period_years: Option<u32>,
    pub total_contributions: Option<f64>,
    pub projected_value_5_years: Option<f64>,
    pub investment_growth: Option<f64>,
    /// Either a fraction (`0.08`) or a percent string (`"8.0%"`).
    pub expected_annual_return: Option<Value>,
    pub risk_profile: Option<String>,
    pub portfolio_type: Option<String>,
    pub rbc_api_used: Option<bool>,
    pub rbc_analysis: Option<RbcAnalysis>,
    pub recommendations: Vec<String>,
}

impl HouseAnalysisResponse {
    /// Builds a projection from the service answer.
    ///
    /// Returns `None` when the answer lacks `projected_value_5_years`, which
    /// the caller treats like any other service failure.
    pub fn into_projection(
        self,
        input: &AffordabilityInput,
        credit_card: f64,
        credit_card_source: CreditCardSource,
    ) -> Option<AffordabilityProjection> {
        let projected = self.projected_value_5_years.filter(|v| v.is_finite())?;

        let monthly_credit_card = self.monthly_credit_card.unwrap_or(credit_card);
        let disposable_income = self
            .disposable_income
            .unwrap_or(input.monthly_income - input.monthly_rent - monthly_credit_card);
        let monthly_savings = self
            .monthly_savings
            .unwrap_or_else(|| projection::monthly_savings(disposable_income))
            .max(0.0);
        let years = self
            .investment_period_years
            .unwrap_or(projection::INVESTMENT_PERIOD_YEARS);
        let total_contributions = self
            .total_contributions
            .unwrap_or(monthly_savings * f64::from(years) * 12.0);
        let investment_growth = self
            .investment_growth
            .unwrap_or(projected - total_contributions);
        let rbc = self.rbc_analysis.unwrap_or_default();

        Some(AffordabilityProjection {
            monthly_income: self.monthly_income.unwrap_or(input.monthly_income),
            monthly_rent: self.monthly_rent.unwrap_or(input.monthly_rent),
            monthly_credit_card,
            credit_card_source,
            disposable_income,
            monthly_savings,
            investment_period_years: years,
            total_contributions,
            projected_value_5_years: projected,
            investment_growth,
            expected_annual_return: self
                .expected_annual_return
                .as_ref()
                .and_then(parse_rate)
                .unwrap_or(0.0),
            risk_profile: self
                .risk_profile
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(input.risk_tolerance),
            portfolio_type: rbc
                .rbc_portfolio_type
                .or(self.portfolio_type)
                .unwrap_or_else(|| "balanced".to_string()),
            portfolio_id: rbc.portfolio_id,
            rbc_api_used: self.rbc_api_used.unwrap_or(false),
            data_source: DataSource::ExternalApi,
            recommendations: self.recommendations,
        })
    }
}

/// Parses a return rate given as a fraction, a percent number, or a `"8.0%"` string.
pub fn parse_rate(value: &Value) -> Option<f64> {
    let (rate, is_percent) = match value {
        Value::Number(n) => {
            let v = n.as_f64()?;
            (v, v > 1.0)
        }
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.strip_suffix('%') {
                Some(p) => (p.trim().parse::<f64>().ok()?, true),
                None => {
                    let v = trimmed.parse::<f64>().ok()?;
                    (v, v > 1.0)
                }
            }
        }
        _ => return None,
    };
    let rate = if is_percent { rate / 100.0 } else { rate };
    rate.is_finite().then_some(rate)
}

// ============ Search Service Wire Models ============

/// Body sent to `POST /api/v1/house-search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseSearchRequest {
    pub location: String,
    pub downpayment: f64,
    pub leverage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffordabilityAnalysis {
    #[serde(default)]
    pub downpayment_coverage: Option<Value>,
    #[serde(default)]
    pub estimated_monthly_payment: Option<f64>,
}

/// Listing as the backend returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHouseListing {
    pub address: Option<String>,
    pub price: Option<f64>,
    #[serde(alias = "livingArea")]
    pub living_area: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub downpayment_needed: Option<f64>,
    pub monthly_payment: Option<f64>,
    pub downpayment_coverage_percent: Option<f64>,
    pub affordability_analysis: Option<AffordabilityAnalysis>,
    #[serde(alias = "imgSrc")]
    pub image_url: Option<String>,
    #[serde(alias = "zillow_url", alias = "detailUrl")]
    pub listing_url: Option<String>,
}

impl RawHouseListing {
    /// Normalizes the listing, deriving coverage and payment when the backend
    /// left them out.
    pub fn into_listing(self, down_payment: f64) -> HouseListing {
        let price = self.price.unwrap_or(0.0);
        let downpayment_needed = self.downpayment_needed.unwrap_or(down_payment);
        let analysis = self.affordability_analysis.unwrap_or_default();

        let downpayment_coverage_percent = self
            .downpayment_coverage_percent
            .or_else(|| {
                analysis
                    .downpayment_coverage
                    .as_ref()
                    .and_then(parse_rate)
                    .map(|r| r * 100.0)
            })
            .unwrap_or_else(|| projection::downpayment_coverage_percent(downpayment_needed, price));
        let monthly_payment = self
            .monthly_payment
            .or(analysis.estimated_monthly_payment)
            .unwrap_or_else(|| projection::monthly_mortgage_payment(price, downpayment_needed));

        HouseListing {
            address: self.address.unwrap_or_default(),
            price,
            living_area: self.living_area,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            downpayment_needed,
            monthly_payment,
            downpayment_coverage_percent,
            image_url: self.image_url.filter(|u| !u.trim().is_empty()),
            listing_url: self.listing_url.filter(|u| !u.trim().is_empty()),
        }
    }
}

/// Search Service response; a missing or null `houses` means no results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HouseSearchResponse {
    #[serde(default)]
    pub houses: Option<Vec<RawHouseListing>>,
}

impl HouseSearchResponse {
    pub fn into_listings(self, down_payment: f64) -> Vec<HouseListing> {
        self.houses
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.into_listing(down_payment))
            .collect()
    }
}

/// Candidate property, displayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseListing {
    pub address: String,
    pub price: f64,
    pub living_area: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub downpayment_needed: f64,
    pub monthly_payment: f64,
    pub downpayment_coverage_percent: f64,
    pub image_url: Option<String>,
    pub listing_url: Option<String>,
}

// ============ Dashboard Models ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySpending {
    pub category: String,
    pub transaction_count: u64,
    pub total_amount: f64,
}

/// Aggregate spending of the uploaded monthly statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub total_spent: f64,
    pub total_transactions: u64,
    pub avg_transaction: f64,
    pub spending_by_category: Vec<CategorySpending>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(value: Value) -> AffordabilityForm {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_coerces_numeric_strings() {
        let input = form(json!({
            "monthly_income": "5000",
            "monthly_rent": 1500,
            "risk_tolerance": "moderate"
        }))
        .validate("Waterloo, ON")
        .unwrap();

        assert_eq!(input.monthly_income, 5000.0);
        assert_eq!(input.monthly_rent, 1500.0);
        assert_eq!(input.monthly_credit_card_spend, None);
        assert_eq!(input.risk_tolerance, RiskTolerance::Moderate);
        assert_eq!(input.location, "Waterloo, ON");
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let err = form(json!({ "monthly_rent": "" }))
            .validate("Waterloo, ON")
            .unwrap_err();
        assert_eq!(
            err.public_message(),
            "Missing required fields: monthly_income, monthly_rent, risk_tolerance"
        );
    }

    #[test]
    fn test_validate_rejects_negative_and_garbage() {
        let err = form(json!({
            "monthly_income": -10,
            "monthly_rent": 100,
            "risk_tolerance": "moderate"
        }))
        .validate("x")
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = form(json!({
            "monthly_income": "lots",
            "monthly_rent": 100,
            "risk_tolerance": "moderate"
        }))
        .validate("x")
        .unwrap_err();
        assert_eq!(err.public_message(), "monthly_income must be numeric");
    }

    #[test]
    fn test_risk_tolerance_tags() {
        assert_eq!(
            "Very Aggressive".parse::<RiskTolerance>().unwrap(),
            RiskTolerance::VeryAggressive
        );
        assert_eq!(
            "very_conservative".parse::<RiskTolerance>().unwrap(),
            RiskTolerance::VeryConservative
        );
        assert!("yolo".parse::<RiskTolerance>().is_err());
        assert_eq!(
            serde_json::to_value(RiskTolerance::VeryAggressive).unwrap(),
            json!("very-aggressive")
        );
    }

    #[test]
    fn test_parse_rate_variants() {
        assert_eq!(parse_rate(&json!("8.0%")), Some(0.08));
        assert_eq!(parse_rate(&json!(0.07)), Some(0.07));
        assert_eq!(parse_rate(&json!(12)), Some(0.12));
        assert_eq!(parse_rate(&json!(true)), None);
    }

    #[test]
    fn test_analysis_response_without_projection_is_unusable() {
        let input = form(json!({
            "monthly_income": 5000,
            "monthly_rent": 1500,
            "risk_tolerance": "moderate"
        }))
        .validate("Waterloo, ON")
        .unwrap();

        let response: HouseAnalysisResponse =
            serde_json::from_value(json!({ "monthly_savings": 810 })).unwrap();
        assert!(response
            .into_projection(&input, 750.0, CreditCardSource::Estimated)
            .is_none());
    }

    #[test]
    fn test_backend_listing_shape_is_normalized() {
        let response: HouseSearchResponse = serde_json::from_value(json!({
            "houses": [{
                "address": "12 King St, Waterloo, ON",
                "price": 400000,
                "downpayment_needed": 80000,
                "monthly_payment": 2022.62,
                "living_area": 1450,
                "bedrooms": 3,
                "bathrooms": 2,
                "image_url": "",
                "zillow_url": "https://example.com/home/1",
                "affordability_analysis": { "downpayment_coverage": "20.0%" }
            }]
        }))
        .unwrap();

        let listings = response.into_listings(80000.0);
        assert_eq!(listings.len(), 1);
        let house = &listings[0];
        assert!((house.downpayment_coverage_percent - 20.0).abs() < 1e-9);
        assert_eq!(house.image_url, None);
        assert_eq!(house.listing_url.as_deref(), Some("https://example.com/home/1"));
    }

    #[test]
    fn test_missing_houses_means_no_results() {
        let response: HouseSearchResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.into_listings(1.0).is_empty());

        let response: HouseSearchResponse =
            serde_json::from_value(json!({ "houses": null })).unwrap();
        assert!(response.into_listings(1.0).is_empty());
    }
}
