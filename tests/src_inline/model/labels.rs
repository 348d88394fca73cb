use super::*;
use crate::model::segment::{SEGMENT_ORDER, Segment};

#[test]
fn test_lift_strength_bands() {
    assert_eq!(LiftStrength::from_lift(2.5), LiftStrength::VeryStrong);
    assert_eq!(LiftStrength::from_lift(2.0), LiftStrength::Good);
    assert_eq!(LiftStrength::from_lift(1.6), LiftStrength::Good);
    assert_eq!(LiftStrength::from_lift(1.5), LiftStrength::Moderate);
    assert_eq!(LiftStrength::from_lift(1.0), LiftStrength::Weak);
    assert_eq!(LiftStrength::VeryStrong.label(), "very strong");
}

#[test]
fn test_risk_level_bands() {
    assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(32.99), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(33.0), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_score(66.99), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_score(67.0), RiskLevel::High);
    assert_eq!(RiskLevel::from_score(100.0), RiskLevel::High);
}

#[test]
fn test_value_tier_bands_and_serde_names() {
    assert_eq!(ValueTier::from_order_value(500.01), ValueTier::HighValue);
    assert_eq!(ValueTier::from_order_value(500.0), ValueTier::Medium);
    assert_eq!(ValueTier::from_order_value(200.0), ValueTier::Low);
    assert_eq!(
        serde_json::to_string(&ValueTier::HighValue).unwrap(),
        "\"High-value\""
    );
    assert_eq!(
        serde_json::to_string(&LiftStrength::VeryStrong).unwrap(),
        "\"very_strong\""
    );
}

#[test]
fn test_segment_names_roundtrip() {
    for (i, segment) in SEGMENT_ORDER.iter().enumerate() {
        assert_eq!(segment.id(), i);
        assert_eq!(Segment::from_id(i), Some(*segment));
        assert_eq!(Segment::from_name(segment.name()), Some(*segment));
        assert_eq!(segment.recommended_actions().len(), 3);
    }
    assert_eq!(Segment::from_name("at_risk"), Some(Segment::AtRisk));
    assert_eq!(Segment::from_name("CHAMPIONS"), Some(Segment::Champions));
    assert_eq!(Segment::from_name("whales"), None);
    assert_eq!(Segment::from_id(5), None);
    assert_eq!(
        serde_json::to_string(&Segment::AtRisk).unwrap(),
        "\"At-Risk\""
    );
}
