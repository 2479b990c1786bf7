//! Usage/Debug hooks (component I): a pluggable counter sink plus the
//! append-only routing-debug trail helpers. The trail itself lives on
//! [`crate::context::RequestContext`]; this module is the notifier seam and
//! a couple of ready-made implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::context::FilterStatus;

/// Pluggable counter sink. Default behavior increments a
/// `zuul.filter-<name>` counter tagged by `status`/`kind`; the host may
/// wire this to any metrics backend without the core knowing about it.
pub trait FilterUsageNotifier: Send + Sync {
    fn notify(&self, filter_name: &str, status: FilterStatus, kind: &str);
}

/// Forwards every notification to `tracing` at debug level. Reasonable
/// default when no metrics backend is wired up.
#[derive(Default)]
pub struct TracingUsageNotifier;

impl FilterUsageNotifier for TracingUsageNotifier {
    fn notify(&self, filter_name: &str, status: FilterStatus, kind: &str) {
        tracing::debug!(filter = filter_name, %status, kind, "zuul.filter-{filter_name}");
    }
}

/// In-memory counter, for tests and for hosts that want to poll counts
/// directly instead of going through a metrics sink.
#[derive(Default)]
pub struct CountingUsageNotifier {
    counts: Mutex<HashMap<(String, FilterStatus, String), u64>>,
}

impl CountingUsageNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, filter_name: &str, status: FilterStatus, kind: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(&(filter_name.to_string(), status, kind.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl FilterUsageNotifier for CountingUsageNotifier {
    fn notify(&self, filter_name: &str, status: FilterStatus, kind: &str) {
        *self
            .counts
            .lock()
            .unwrap()
            .entry((filter_name.to_string(), status, kind.to_string()))
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_notifier_tallies_by_name_status_kind() {
        let notifier = CountingUsageNotifier::new();
        notifier.notify("f", FilterStatus::Success, "pre");
        notifier.notify("f", FilterStatus::Success, "pre");
        notifier.notify("f", FilterStatus::Failed, "pre");

        assert_eq!(notifier.count("f", FilterStatus::Success, "pre"), 2);
        assert_eq!(notifier.count("f", FilterStatus::Failed, "pre"), 1);
    }
}
