//! Distance metrics and log verbosity, kept numerically stable for callers
//! that configure estimators from integers.

/// Pairwise distance metric.
///
/// Discriminants match the engine's wire values; [`Metric::Precomputed`]
/// deliberately sits apart from the computed family.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[repr(i32)]
pub enum Metric {
    #[default]
    L2Expanded = 0,
    L2SqrtExpanded = 1,
    CosineExpanded = 2,
    L1 = 3,
    L2Unexpanded = 4,
    L2SqrtUnexpanded = 5,
    InnerProduct = 6,
    Linf = 7,
    Canberra = 8,
    LpUnexpanded = 9,
    CorrelationExpanded = 10,
    JaccardExpanded = 11,
    HellingerExpanded = 12,
    Haversine = 13,
    BrayCurtis = 14,
    JensenShannon = 15,
    HammingUnexpanded = 16,
    KLDivergence = 17,
    RusselRaoExpanded = 18,
    DiceExpanded = 19,
    Precomputed = 100,
}

/// How chatty the engine is while fitting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[repr(i32)]
pub enum Verbosity {
    Off = 0,
    Critical = 1,
    Error = 2,
    Warn = 3,
    #[default]
    Info = 4,
    Debug = 5,
    Trace = 6,
}
