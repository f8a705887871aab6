//! Machine topology: which cryomodules live in which linac section.

/// Cavities per cryomodule, numbered 1..=8.
pub const CAVITIES_PER_CM: u8 = 8;

const L0B: &[&str] = &["01"];
const L1B: &[&str] = &["02", "03", "H1", "H2"];
const L2B: &[&str] = &[
    "04", "05", "06", "07", "08", "09", "10", "11", "12", "13", "14", "15",
];
const L3B: &[&str] = &[
    "16", "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27", "28", "29", "30",
    "31", "32", "33", "34", "35",
];

/// Linac sections in beam order.
pub const LINACS: [(&str, &[&str]); 4] = [("L0B", L0B), ("L1B", L1B), ("L2B", L2B), ("L3B", L3B)];

/// Section holding cryomodule `cm`, if it exists.
pub fn linac_for(cm: &str) -> Option<&'static str> {
    LINACS
        .iter()
        .find(|(_, cms)| cms.contains(&cm))
        .map(|(name, _)| *name)
}

/// Every cryomodule in beam order.
pub fn all_cryomodules() -> impl Iterator<Item = &'static str> {
    LINACS.iter().flat_map(|(_, cms)| cms.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_lookup() {
        assert_eq!(linac_for("01"), Some("L0B"));
        assert_eq!(linac_for("H2"), Some("L1B"));
        assert_eq!(linac_for("15"), Some("L2B"));
        assert_eq!(linac_for("35"), Some("L3B"));
        assert_eq!(linac_for("36"), None);
        assert_eq!(all_cryomodules().count(), 37);
    }
}
