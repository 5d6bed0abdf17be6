use serde::Serialize;

/// How many readings a plan advertises per month. Labeling only: the
/// enforcement path checks `is_premium`, never this figure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReadingAllowance {
    Limited { count: u32 },
    Unlimited,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPlan {
    pub id: &'static str,
    pub display_name: &'static str,
    pub monthly_price_usd_cents: u32,
    pub features: &'static [&'static str],
    pub monthly_reading_allowance: ReadingAllowance,
}

pub const PAYMENT_PLANS: &[PricingPlan] = &[
    PricingPlan {
        id: "basic",
        display_name: "Basic",
        monthly_price_usd_cents: 999,
        features: &["30 readings per month", "All reading types", "Basic support"],
        monthly_reading_allowance: ReadingAllowance::Limited { count: 30 },
    },
    PricingPlan {
        id: "premium",
        display_name: "Premium",
        monthly_price_usd_cents: 1999,
        features: &[
            "Unlimited readings",
            "Priority support",
            "Detailed interpretations",
            "Personal reading history",
        ],
        monthly_reading_allowance: ReadingAllowance::Unlimited,
    },
];
