use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Champions,
    Loyal,
    AtRisk,
    Hibernating,
    Regulars,
}

/// Reporting order.
pub const SEGMENT_ORDER: [Segment; 5] = [
    Segment::Champions,
    Segment::Loyal,
    Segment::AtRisk,
    Segment::Hibernating,
    Segment::Regulars,
];

impl Segment {
    pub fn name(self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::Loyal => "Loyal",
            Segment::AtRisk => "At-Risk",
            Segment::Hibernating => "Hibernating",
            Segment::Regulars => "Regulars",
        }
    }

    pub fn id(self) -> usize {
        match self {
            Segment::Champions => 0,
            Segment::Loyal => 1,
            Segment::AtRisk => 2,
            Segment::Hibernating => 3,
            Segment::Regulars => 4,
        }
    }

    pub fn from_id(id: usize) -> Option<Self> {
        SEGMENT_ORDER.get(id).copied()
    }

    /// Accepts `At-Risk`, `at_risk`, `AtRisk` and friends, case-insensitively.
    pub fn from_name(raw: &str) -> Option<Self> {
        let key = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>();
        match key.as_str() {
            "champions" | "champion" => Some(Segment::Champions),
            "loyal" | "loyalcustomers" => Some(Segment::Loyal),
            "atrisk" => Some(Segment::AtRisk),
            "hibernating" => Some(Segment::Hibernating),
            "regulars" | "regular" => Some(Segment::Regulars),
            _ => None,
        }
    }

    pub fn characteristics(self) -> &'static str {
        match self {
            Segment::Champions => {
                "VIP customers: bought recently, buy often and spend the most"
            }
            Segment::Loyal => "Reliable customers with recent and regular purchases",
            Segment::AtRisk => {
                "Customers who used to buy but have not purchased for a long time; churn risk"
            }
            Segment::Hibernating => "Inactive customers with few, old purchases",
            Segment::Regulars => "Steady customers with average recency, frequency and spend",
        }
    }

    pub fn recommended_actions(self) -> &'static [&'static str] {
        match self {
            Segment::Champions => &[
                "VIP early access to new products",
                "Exclusive rewards program",
                "Personalized product recommendations",
            ],
            Segment::Loyal => &[
                "Loyalty rewards",
                "Upsell premium products",
                "Referral program incentives",
            ],
            Segment::AtRisk => &[
                "Win-back campaigns with special offers",
                "Survey to understand churn reasons",
                "Re-engagement email series",
            ],
            Segment::Hibernating => &[
                "Low-cost reactivation emails",
                "Deep discount on best sellers",
                "Remove from expensive channels if no response",
            ],
            Segment::Regulars => &[
                "General marketing campaigns",
                "Cross-sell related products",
                "A/B test different offers",
            ],
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
