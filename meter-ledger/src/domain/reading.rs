/// One committed meter reading. `opening` is always derived from the previous
/// reading of the same meter (0.0 for the first), never user-supplied, and
/// `consumption = closing - opening` is stored redundantly for reporting.
#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub id: i64,
    pub meter_id: String,
    pub opening: f64,
    pub closing: f64,
    pub consumption: f64,
    pub user: String,
    pub date: String,
    pub photo: String,
}

/// `Reading` joined with the registry's location, as shown in listings and
/// the CSV export. Readings whose meter is absent from the registry do not
/// appear in this shape at all (inner-join semantics).
#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingWithLocation {
    pub id: i64,
    pub meter_id: String,
    pub location: String,
    pub opening: f64,
    pub closing: f64,
    pub consumption: f64,
    pub user: String,
    pub date: String,
    pub photo: String,
}
