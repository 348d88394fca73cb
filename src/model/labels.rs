use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftStrength {
    VeryStrong,
    Good,
    Moderate,
    Weak,
}

impl LiftStrength {
    pub fn from_lift(lift: f64) -> Self {
        if lift > 2.0 {
            LiftStrength::VeryStrong
        } else if lift > 1.5 {
            LiftStrength::Good
        } else if lift > 1.0 {
            LiftStrength::Moderate
        } else {
            LiftStrength::Weak
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LiftStrength::VeryStrong => "very strong",
            LiftStrength::Good => "good",
            LiftStrength::Moderate => "moderate",
            LiftStrength::Weak => "weak",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 33.0 {
            RiskLevel::Low
        } else if score < 67.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueTier {
    #[serde(rename = "High-value")]
    HighValue,
    Medium,
    Low,
}

impl ValueTier {
    pub fn from_order_value(avg_order_value: f64) -> Self {
        if avg_order_value > 500.0 {
            ValueTier::HighValue
        } else if avg_order_value > 200.0 {
            ValueTier::Medium
        } else {
            ValueTier::Low
        }
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/labels.rs"]
mod tests;
