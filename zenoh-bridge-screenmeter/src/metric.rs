//! The two readings shown on the meter's display.

use serde::{Deserialize, Serialize};

/// A monitored metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Instantaneous flow rate.
    Throughput,
    /// Cumulative volume counter.
    Volume,
}

impl Metric {
    /// Every metric, in the order a cycle reads them.
    pub const ALL: [Metric; 2] = [Metric::Throughput, Metric::Volume];

    /// Return the string name for this metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Throughput => "throughput",
            Metric::Volume => "volume",
        }
    }

    /// Screen region the device firmware draws this value into.
    pub(crate) fn default_region(&self) -> &'static str {
        match self {
            Metric::Throughput => "60,70,80,25",
            Metric::Volume => "70,150,60,24",
        }
    }

    /// Extraction pattern matching the unit suffix the firmware renders.
    pub(crate) fn default_pattern(&self) -> &'static str {
        match self {
            Metric::Throughput => r"(.*)\|*\.?/h",
            Metric::Volume => r"(.*)\|*\.",
        }
    }

    pub(crate) fn default_name(&self) -> &'static str {
        match self {
            Metric::Throughput => "Throughput",
            Metric::Volume => "Volume",
        }
    }

    pub(crate) fn default_unit(&self) -> &'static str {
        match self {
            Metric::Throughput => "L/h",
            Metric::Volume => "L",
        }
    }

    pub(crate) fn default_device_class(&self) -> &'static str {
        match self {
            Metric::Throughput => "volume_flow_rate",
            Metric::Volume => "water",
        }
    }

    pub(crate) fn default_state_class(&self) -> &'static str {
        match self {
            Metric::Throughput => "measurement",
            Metric::Volume => "total_increasing",
        }
    }

    pub(crate) fn default_icon(&self) -> &'static str {
        match self {
            Metric::Throughput => "mdi:water-pump",
            Metric::Volume => "mdi:water",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
