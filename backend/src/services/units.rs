//! Unit consistency checks shared by the aggregations.

use log::warn;

/// Watches the units of a streamed series.
///
/// Mixed units are reported once per query and never stop the fold.
#[derive(Debug, Clone, Default)]
pub(crate) struct UnitsTracker {
    expected: Option<String>,
    seen: Option<String>,
    mismatches: usize,
}

impl UnitsTracker {
    /// Tracker expecting `output_units` when given, otherwise the units of
    /// the first sample that carries any.
    pub(crate) fn new(output_units: Option<&str>) -> Self {
        Self {
            expected: output_units.map(str::to_string),
            seen: None,
            mismatches: 0,
        }
    }

    pub(crate) fn observe(&mut self, units: Option<&str>) {
        let Some(units) = units else {
            return;
        };
        if self.seen.is_none() {
            self.seen = Some(units.to_string());
        }
        let reference = self.expected.as_deref().or(self.seen.as_deref());
        if reference.is_some_and(|r| r != units) {
            self.mismatches += 1;
        }
    }

    /// Units reported with the result.
    pub(crate) fn units(&self) -> Option<String> {
        self.expected.clone().or_else(|| self.seen.clone())
    }

    #[cfg(test)]
    pub(crate) fn mismatches(&self) -> usize {
        self.mismatches
    }

    /// Log a warning when mismatching units were observed.
    pub(crate) fn report(&self, device_key: &str) {
        if self.mismatches > 0 {
            warn!(
                "Device '{}': {} sample(s) with units other than {:?}",
                device_key,
                self.mismatches,
                self.units().unwrap_or_default()
            );
        }
    }
}
