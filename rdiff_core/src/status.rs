use rdiff_common::Severity;

/// Running maximum over the pairs visited at one aggregation point
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusAggregator {
    severity: Severity,
    visited: usize,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, severity: Severity) {
        self.severity = self.severity.merge(severity);
        self.visited += 1;
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn visited(&self) -> usize {
        self.visited
    }
}

impl Extend<Severity> for StatusAggregator {
    fn extend<I: IntoIterator<Item = Severity>>(&mut self, iter: I) {
        for severity in iter {
            self.record(severity);
        }
    }
}
