/// Default key expression prefix for all screenmeter data.
pub const DEFAULT_KEY_PREFIX: &str = "screenmeter";

/// Builder for screenmeter key expressions.
///
/// Key expressions follow the pattern:
/// - readings: `<prefix>/<device>/<metric>`
/// - availability: `<prefix>/<device>/status`
/// - discovery documents: `<prefix>/@/discovery/<device>/<metric>`
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
    device: String,
}

impl KeyExprBuilder {
    /// Create a builder for a device under the default prefix.
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_prefix(DEFAULT_KEY_PREFIX, device)
    }

    /// Create a builder with a custom prefix.
    ///
    /// A trailing `/` on the prefix is ignored.
    pub fn with_prefix(prefix: impl Into<String>, device: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            device: device.into(),
        }
    }

    /// Prefix this builder was created with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key for a metric reading.
    ///
    /// # Example
    /// ```
    /// use screenmeter_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new("perla");
    /// assert_eq!(builder.metric("volume"), "screenmeter/perla/volume");
    /// ```
    pub fn metric(&self, metric: &str) -> String {
        format!("{}/{}/{}", self.prefix, self.device, metric)
    }

    /// Build the availability (online/offline) key for the device.
    ///
    /// # Example
    /// ```
    /// use screenmeter_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new("perla");
    /// assert_eq!(builder.status(), "screenmeter/perla/status");
    /// ```
    pub fn status(&self) -> String {
        format!("{}/{}/status", self.prefix, self.device)
    }

    /// Build the discovery document key for a metric.
    ///
    /// # Example
    /// ```
    /// use screenmeter_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new("perla");
    /// assert_eq!(
    ///     builder.discovery("throughput"),
    ///     "screenmeter/@/discovery/perla/throughput"
    /// );
    /// ```
    pub fn discovery(&self, metric: &str) -> String {
        format!("{}/@/discovery/{}/{}", self.prefix, self.device, metric)
    }

    /// Wildcard matching every reading of the device.
    pub fn device_wildcard(&self) -> String {
        format!("{}/{}/**", self.prefix, self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder() {
        let builder = KeyExprBuilder::new("perla");

        assert_eq!(builder.metric("throughput"), "screenmeter/perla/throughput");
        assert_eq!(builder.status(), "screenmeter/perla/status");
        assert_eq!(
            builder.discovery("volume"),
            "screenmeter/@/discovery/perla/volume"
        );
        assert_eq!(builder.device_wildcard(), "screenmeter/perla/**");
    }

    #[test]
    fn test_custom_prefix_trailing_slash() {
        let builder = KeyExprBuilder::with_prefix("home/water/", "softener");
        assert_eq!(builder.prefix(), "home/water");
        assert_eq!(builder.metric("volume"), "home/water/softener/volume");
    }
}
