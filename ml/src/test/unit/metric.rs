use strum::VariantArray;

use crate::metric::{Metric, Verbosity};

#[test]
fn test_metric_values_are_wire_stable() {
    assert_eq!(Metric::L2Expanded as i32, 0);
    assert_eq!(Metric::CosineExpanded as i32, 2);
    assert_eq!(Metric::DiceExpanded as i32, 19);
    assert_eq!(Metric::Precomputed as i32, 100);

    for metric in Metric::VARIANTS {
        assert_eq!(Metric::from_repr(*metric as i32), Some(*metric));
    }
    assert_eq!(Metric::from_repr(20), None);
    assert_eq!(Metric::default(), Metric::L2Expanded);
}

#[test]
fn test_verbosity_orders_by_chattiness() {
    assert!(Verbosity::Off < Verbosity::Critical);
    assert!(Verbosity::Info < Verbosity::Trace);
    assert_eq!(Verbosity::from_repr(6), Some(Verbosity::Trace));
    assert_eq!(Verbosity::from_repr(7), None);
    assert_eq!(Verbosity::default(), Verbosity::Info);
}
