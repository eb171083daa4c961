//! Update severity classification.

use node_semver::Version;

use super::types::{Severity, UpdateEnrichment};

/// Classify an update for notification urgency.
///
/// Security updates are critical regardless of the version delta; breaking
/// changes and major bumps are important; everything else is informational.
#[must_use]
pub fn classify_update(
    previous: Option<&str>,
    new_version: &str,
    enrichment: &UpdateEnrichment,
) -> Severity {
    if enrichment.is_security_update {
        return Severity::Critical;
    }

    if enrichment.is_breaking_change || is_major_bump(previous, new_version) {
        return Severity::Important;
    }

    Severity::Info
}

/// Whether the major component increased between two versions. Unparseable
/// versions never count as a bump.
#[must_use]
pub fn is_major_bump(previous: Option<&str>, new_version: &str) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    let (Ok(previous), Ok(new_version)) =
        (previous.parse::<Version>(), new_version.parse::<Version>())
    else {
        return false;
    };

    new_version.major > previous.major
}
