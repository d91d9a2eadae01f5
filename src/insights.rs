//! Spending insights derived from the dashboard summary.
//!
//! Category advice comes from an ordered rule table: the first rule whose
//! pattern matches the category name wins, and the last rule matches
//! everything.

use crate::errors::AppError;
use crate::models::{CategorySpending, DashboardSummary};
use regex::Regex;
use serde::Serialize;

/// Share of total spend above which a category is flagged.
const HIGH_SHARE_PERCENT: f64 = 25.0;
/// Transaction count above which a category is flagged as frequent.
const FREQUENT_TRANSACTIONS: u64 = 15;
const BUSY_MONTH_TRANSACTIONS: u64 = 30;
const PREMIUM_AVERAGE_TRANSACTION: f64 = 20.0;
const SAVINGS_POTENTIAL_RATE: f64 = 0.15;
const BUDGET_BUFFER: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Frequent,
    Balanced,
}

impl Severity {
    pub fn classify(share_percent: f64, transaction_count: u64) -> Self {
        if share_percent > HIGH_SHARE_PERCENT {
            Severity::High
        } else if transaction_count > FREQUENT_TRANSACTIONS {
            Severity::Frequent
        } else {
            Severity::Balanced
        }
    }
}

enum Advice {
    BySeverity {
        high: &'static str,
        frequent: &'static str,
        balanced: &'static str,
    },
    Always(&'static str),
}

struct InsightRule {
    name: &'static str,
    pattern: Regex,
    advice: Advice,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryInsight {
    pub category: String,
    pub rule: &'static str,
    pub severity: Severity,
    pub share_percent: f64,
    pub total_amount: f64,
    pub transaction_count: u64,
    pub average_transaction: f64,
    /// Spend after trimming 15%.
    pub target_amount: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Info,
    Warning,
    Success,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewCard {
    pub kind: CardKind,
    pub title: String,
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingInsights {
    pub total_spent: f64,
    pub total_transactions: u64,
    pub overview: Vec<OverviewCard>,
    pub categories: Vec<CategoryInsight>,
}

/// Ordered category rules.
pub struct InsightTable {
    rules: Vec<InsightRule>,
}

impl InsightTable {
    /// Builds the standard rule set.
    pub fn standard() -> Result<Self, AppError> {
        let specs: [(&'static str, &str, Advice); 7] = [
            (
                "food",
                r"food|dining|restaurant|grocery",
                Advice::BySeverity {
                    high: "{percent}% on food is a lot: ${amount} where meal prepping would cost about ${meal_prep}. Cook most weekdays and batch cook on weekends.",
                    frequent: "{count} food purchases this month. Plan meals ahead and keep a grocery list to cut down on ordering out.",
                    balanced: "{percent}% on food is reasonable. Keep using loyalty programs and store brands.",
                },
            ),
            (
                "transport",
                r"transport|gas|uber|taxi|car",
                Advice::BySeverity {
                    high: "{percent}% on transport is steep. A monthly transit pass usually costs far less than rideshares; combine errands into one trip.",
                    frequent: "{count} transport purchases suggests many short trips. Walk or bike short distances and batch your errands.",
                    balanced: "Transport spending is under control. Keep planning efficient routes.",
                },
            ),
            (
                "entertainment",
                r"entertainment|movie|game|streaming",
                Advice::BySeverity {
                    high: "{percent}% on entertainment is high. Cancel unused subscriptions and look for free local events.",
                    frequent: "{count} entertainment charges suggests subscription overload. Audit them and keep two services at most.",
                    balanced: "Entertainment spending is balanced. Rotate subscriptions month to month to keep it that way.",
                },
            ),
            (
                "shopping",
                r"shopping|retail|amazon|clothes",
                Advice::BySeverity {
                    high: "{percent}% on shopping points to impulse buying. Wait 30 days before non-essential purchases and shop from a list.",
                    frequent: "{count} shopping orders this month. Batch purchases and leave items in the cart for 24 hours before buying.",
                    balanced: "Good shopping discipline. Keep comparing prices and waiting for sales.",
                },
            ),
            (
                "health",
                r"health|medical|pharmacy|doctor",
                Advice::Always(
                    "{percent}% on health is money well spent. Prefer generic medication and check what your insurance covers.",
                ),
            ),
            (
                "education",
                r"education|book|course|learning",
                Advice::Always(
                    "{percent}% on learning pays off. Check libraries and free courses first, but do not skimp on quality education.",
                ),
            ),
            (
                "general",
                r".*",
                Advice::BySeverity {
                    high: "{percent}% is a lot for this category. Set a monthly limit of ${limit} and track every purchase.",
                    frequent: "{count} purchases suggests frequent small buys. Make lists and wait 24 hours before buying.",
                    balanced: "{percent}% is reasonable for this category. Keep tracking purchases for savings opportunities.",
                },
            ),
        ];

        let rules = specs
            .into_iter()
            .map(|(name, pattern, advice)| -> Result<InsightRule, AppError> {
                let pattern = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
                    AppError::InternalError(format!("Invalid insight pattern '{}': {}", name, e))
                })?;
                Ok(InsightRule {
                    name,
                    pattern,
                    advice,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(Self { rules })
    }

    /// Advice for one category.
    pub fn category_insight(&self, category: &CategorySpending, total_spent: f64) -> CategoryInsight {
        let share_percent = share_percent(category.total_amount, total_spent);
        let severity = Severity::classify(share_percent, category.transaction_count);
        let average_transaction = if category.transaction_count > 0 {
            category.total_amount / category.transaction_count as f64
        } else {
            0.0
        };

        let (rule, template) = match self
            .rules
            .iter()
            .find(|rule| rule.pattern.is_match(&category.category))
        {
            Some(rule) => (rule.name, rule.advice.template(severity)),
            None => ("general", "{percent}% of your spending."),
        };

        CategoryInsight {
            category: category.category.clone(),
            rule,
            severity,
            share_percent,
            total_amount: category.total_amount,
            transaction_count: category.transaction_count,
            average_transaction,
            target_amount: category.total_amount * (1.0 - SAVINGS_POTENTIAL_RATE),
            message: render(template, category, share_percent),
        }
    }

    /// Category advice plus the overview cards for a dashboard summary.
    pub fn analyze(&self, summary: &DashboardSummary) -> SpendingInsights {
        let categories = summary
            .spending_by_category
            .iter()
            .map(|c| self.category_insight(c, summary.total_spent))
            .collect();

        SpendingInsights {
            total_spent: summary.total_spent,
            total_transactions: summary.total_transactions,
            overview: overview_cards(summary),
            categories,
        }
    }
}

impl Advice {
    fn template(&self, severity: Severity) -> &'static str {
        match (self, severity) {
            (Advice::Always(message), _) => *message,
            (Advice::BySeverity { high, .. }, Severity::High) => *high,
            (Advice::BySeverity { frequent, .. }, Severity::Frequent) => *frequent,
            (Advice::BySeverity { balanced, .. }, Severity::Balanced) => *balanced,
        }
    }
}

fn share_percent(amount: f64, total_spent: f64) -> f64 {
    let total = total_spent.abs();
    if total > 0.0 {
        amount.abs() / total * 100.0
    } else {
        0.0
    }
}

fn render(template: &str, category: &CategorySpending, share_percent: f64) -> String {
    let amount = category.total_amount.abs();
    template
        .replace("{percent}", &format!("{:.0}", share_percent))
        .replace("{amount}", &format!("{:.0}", amount))
        .replace("{count}", &category.transaction_count.to_string())
        .replace("{meal_prep}", &format!("{:.0}", amount * 0.4))
        .replace("{limit}", &format!("{:.0}", amount * 0.8))
}

fn overview_cards(summary: &DashboardSummary) -> Vec<OverviewCard> {
    let total = summary.total_spent.abs();
    let mut cards = Vec::new();

    if let Some(top) = summary
        .spending_by_category
        .iter()
        .max_by(|a, b| a.total_amount.abs().total_cmp(&b.total_amount.abs()))
    {
        cards.push(OverviewCard {
            kind: CardKind::Info,
            title: format!("{} is your biggest expense", top.category),
            description: format!(
                "You spent ${:.2} ({:.1}%) on {} this period",
                top.total_amount.abs(),
                share_percent(top.total_amount, summary.total_spent),
                top.category.to_lowercase()
            ),
            value: format!("${:.2}", top.total_amount.abs()),
        });
    }

    let average = summary.avg_transaction.abs();
    cards.push(if average > PREMIUM_AVERAGE_TRANSACTION {
        OverviewCard {
            kind: CardKind::Warning,
            title: "Higher than average transactions".to_string(),
            description: format!(
                "Your average transaction of ${:.2} suggests premium spending habits",
                average
            ),
            value: format!("${:.2}", average),
        }
    } else {
        OverviewCard {
            kind: CardKind::Success,
            title: "Controlled spending pattern".to_string(),
            description: format!(
                "Your average transaction of ${:.2} shows disciplined spending",
                average
            ),
            value: format!("${:.2}", average),
        }
    });

    if summary.total_transactions > BUSY_MONTH_TRANSACTIONS {
        cards.push(OverviewCard {
            kind: CardKind::Warning,
            title: "High transaction frequency".to_string(),
            description: format!(
                "{} transactions suggest active spending, consider consolidating purchases",
                summary.total_transactions
            ),
            value: format!("{} txns", summary.total_transactions),
        });
    }

    let potential_savings = total * SAVINGS_POTENTIAL_RATE;
    cards.push(OverviewCard {
        kind: CardKind::Success,
        title: "Savings opportunity identified".to_string(),
        description: format!(
            "By optimizing your top categories, you could save up to ${:.2}",
            potential_savings
        ),
        value: format!("${:.2}", potential_savings),
    });

    let budget = total * BUDGET_BUFFER;
    cards.push(OverviewCard {
        kind: CardKind::Info,
        title: "Recommended monthly budget".to_string(),
        description: format!(
            "Based on your spending pattern, set a budget of ${:.2} for better control",
            budget
        ),
        value: format!("${:.2}", budget),
    });

    cards
}
