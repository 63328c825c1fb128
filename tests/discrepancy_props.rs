// tests/discrepancy_props.rs
//
// Property checks for the discrepancy detector over seeded random data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use health_data_hub::discrepancy::{percent_difference, DiscrepancyDetector};
use health_data_hub::normalize::NormalizedRecord;

fn rec(provider: &str, period: usize, value: f64) -> NormalizedRecord {
    NormalizedRecord {
        location: "United States".into(),
        value,
        category: "chronic-disease".into(),
        period: (2000 + period).to_string(),
        demographic_segment: None,
        source_provider_id: provider.into(),
        was_defaulted: false,
        defaulted_fields: vec![],
    }
}

#[test]
fn percent_difference_is_symmetric() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..1_000 {
        let a: f64 = rng.random_range(-500.0..500.0);
        let b: f64 = rng.random_range(-500.0..500.0);
        let ab = percent_difference(a, b);
        let ba = percent_difference(b, a);
        assert_eq!(ab, ba, "a={a} b={b}");
        assert!(ab >= 0.0);
    }
}

#[test]
fn discrepancy_set_is_symmetric_up_to_role_swap() {
    let mut rng = StdRng::seed_from_u64(42);
    let detector = DiscrepancyDetector::default();

    for _ in 0..50 {
        let n = rng.random_range(1..20usize);
        let a: Vec<_> = (0..n).map(|i| rec("a", i, rng.random_range(1.0..100.0))).collect();
        let b: Vec<_> = (0..n).map(|i| rec("b", i, rng.random_range(1.0..100.0))).collect();

        let ab = detector.compare(&a, &b);
        let ba = detector.compare(&b, &a);
        assert_eq!(ab.joined, ba.joined);
        assert_eq!(ab.discrepancies.len(), ba.discrepancies.len());

        let mut periods_ab: Vec<_> = ab.discrepancies.iter().map(|d| d.period.clone()).collect();
        let mut periods_ba: Vec<_> = ba.discrepancies.iter().map(|d| d.period.clone()).collect();
        periods_ab.sort();
        periods_ba.sort();
        assert_eq!(periods_ab, periods_ba);

        for (x, y) in ab.discrepancies.iter().zip(&ba.discrepancies) {
            assert_eq!(x.primary_value, y.comparison_value);
            assert_eq!(x.percent_difference, y.percent_difference);
        }
    }
}

#[test]
fn identical_datasets_never_disagree() {
    let mut rng = StdRng::seed_from_u64(7);
    let values: Vec<f64> = (0..30).map(|_| rng.random_range(0.0..1_000.0)).collect();
    let a: Vec<_> = values.iter().enumerate().map(|(i, v)| rec("a", i, *v)).collect();
    let b: Vec<_> = values.iter().enumerate().map(|(i, v)| rec("b", i, *v)).collect();
    let cmp = DiscrepancyDetector::default().compare(&a, &b);
    assert_eq!(cmp.joined, 30);
    assert!(!cmp.has_discrepancies());
    assert_eq!(cmp.unmatched, 0);
}
