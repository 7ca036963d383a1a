use wellspring_types::ActivityKind;

/// Rough energy burn per minute for an average adult.
pub fn kcal_per_minute(kind: ActivityKind) -> u32 {
    match kind {
        ActivityKind::Walking => 4,
        ActivityKind::Running => 11,
        ActivityKind::Cycling => 8,
        ActivityKind::Swimming => 9,
        ActivityKind::Yoga => 3,
        ActivityKind::Strength => 6,
        ActivityKind::Hiit => 12,
        ActivityKind::Other => 5,
    }
}

/// Estimate calories when the user did not record them.
pub fn estimate(kind: ActivityKind, duration_minutes: u32) -> u32 {
    kcal_per_minute(kind).saturating_mul(duration_minutes)
}
