//! Per-user notification preferences with missing-record defaults.

use crate::entity::notification_preference::Model as PreferenceModel;

use super::types::Severity;

/// Resolved preference flags for one user.
///
/// A user without a stored record gets these defaults; a missing record
/// must never degrade into "notify nothing".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub notify_all_updates: bool,
    pub notify_major_only: bool,
    pub notify_security_only: bool,
    pub in_app_enabled: bool,
    pub email_immediate_critical: bool,
    pub email_digest: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notify_all_updates: false,
            notify_major_only: true,
            notify_security_only: true,
            in_app_enabled: true,
            email_immediate_critical: true,
            email_digest: false,
        }
    }
}

impl Preferences {
    /// Resolve a possibly-missing stored record into concrete flags.
    #[must_use]
    pub fn from_model(model: Option<&PreferenceModel>) -> Self {
        match model {
            Some(model) => Self {
                notify_all_updates: model.notify_all_updates,
                notify_major_only: model.notify_major_only,
                notify_security_only: model.notify_security_only,
                in_app_enabled: model.in_app_enabled,
                email_immediate_critical: model.email_immediate_critical,
                email_digest: model.email_digest,
            },
            None => Self::default(),
        }
    }

    /// The notification filter: all-updates, security, or non-info
    /// severity, in that order.
    #[must_use]
    pub fn should_notify(&self, severity: Severity, is_security_update: bool) -> bool {
        self.notify_all_updates
            || (self.notify_security_only && is_security_update)
            || (self.notify_major_only && severity != Severity::Info)
    }
}
