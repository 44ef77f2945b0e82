pub mod serde_arc_str {
    use serde::Serializer;
    use std::sync::Arc;

    pub fn serialize<S>(s: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(s)
    }
}

/// Formats a rate in Mbps without trailing zeros, e.g. `8` or `6.667`
pub fn format_mbps(rate_mbps: f64) -> String {
    let rounded = (rate_mbps * 1000.0).round() / 1000.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        let formatted = format!("{rounded:.3}");
        formatted.trim_end_matches('0').to_string()
    }
}
