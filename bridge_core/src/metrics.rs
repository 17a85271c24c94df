use crate::dispatch::DispatchReport;

/// Running counters for one bridge session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeMetrics {
    pub steps_completed: u64,
    pub commands_applied: u64,
    pub commands_skipped: u64,
    /// Replies refused as stale or arriving early under the drop policy.
    pub replies_rejected: u64,
    pub replies_buffered: u64,
    pub events_delivered: u64,
    pub raw_responses: u64,
}

impl BridgeMetrics {
    pub fn record_dispatch(&mut self, report: &DispatchReport) {
        self.commands_applied += u64::from(report.applied);
        self.commands_skipped += u64::from(report.skipped);
        if report.raw_response.is_some() {
            self.raw_responses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_reports_accumulate() {
        let mut metrics = BridgeMetrics::default();
        metrics.record_dispatch(&DispatchReport {
            applied: 3,
            skipped: 1,
            raw_response: Some(vec![1]),
        });
        metrics.record_dispatch(&DispatchReport {
            applied: 2,
            skipped: 0,
            raw_response: None,
        });
        assert_eq!(metrics.commands_applied, 5);
        assert_eq!(metrics.commands_skipped, 1);
        assert_eq!(metrics.raw_responses, 1);
    }
}
