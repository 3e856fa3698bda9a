use std::collections::HashSet;

/// Fail closed: only an explicit `true` counts as trusted.
pub fn is_trusted_network(signal: Option<bool>) -> bool {
    matches!(signal, Some(true))
}

/// Allow-list of campus access-point identifiers (SSIDs or BSSIDs), used by
/// the boundary to turn what the device reports into a trust signal.
#[derive(Debug, Clone, Default)]
pub struct TrustedAccessPoints {
    allowed: HashSet<String>,
}

impl TrustedAccessPoints {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = identifiers
            .into_iter()
            .map(|s| normalize(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        Self { allowed }
    }

    /// `None` when the device reported nothing to compare.
    pub fn resolve(&self, access_point: Option<&str>) -> Option<bool> {
        let access_point = normalize(access_point?);
        if access_point.is_empty() {
            return None;
        }
        Some(self.allowed.contains(&access_point))
    }

    /// An access point, when reported, decides; otherwise the device's own
    /// claim passes through.
    pub fn signal(&self, access_point: Option<&str>, claimed: Option<bool>) -> Option<bool> {
        match self.resolve(access_point) {
            Some(resolved) => Some(resolved),
            None => claimed,
        }
    }
}

#[inline]
fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
