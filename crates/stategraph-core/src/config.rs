#![forbid(unsafe_code)]

//! Runtime configuration.

/// Knobs for a [`StateContext`](crate::StateContext).
///
/// Construct with [`StateConfig::default`] and adjust with the `with_*`
/// builders. With the `serde` feature the struct can be loaded from a policy
/// file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct StateConfig {
    /// Record cell → element dependencies while rendering.
    /// Default: true
    pub partial_update: bool,

    /// Upper bound on fixed-point passes in a single dirty flush, at least 1.
    /// Default: 1024
    #[cfg_attr(feature = "serde", serde(deserialize_with = "at_least_one_pass"))]
    pub max_flush_passes: usize,

    /// Let the list reconciler reuse nodes of removed keys for new keys.
    /// Default: false
    pub recycle_list_nodes: bool,

    /// Emit a `trace` event for every delivered notification.
    /// Default: false
    pub trace_notifications: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            partial_update: true,
            max_flush_passes: 1024,
            recycle_list_nodes: false,
            trace_notifications: false,
        }
    }
}

#[cfg(feature = "serde")]
fn at_least_one_pass<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let passes = <usize as serde::Deserialize>::deserialize(deserializer)?;
    Ok(passes.max(1))
}

impl StateConfig {
    #[must_use]
    pub fn with_partial_update(mut self, enabled: bool) -> Self {
        self.partial_update = enabled;
        self
    }

    /// Clamped to at least one pass.
    #[must_use]
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }

    #[must_use]
    pub fn with_recycle_list_nodes(mut self, enabled: bool) -> Self {
        self.recycle_list_nodes = enabled;
        self
    }

    #[must_use]
    pub fn with_trace_notifications(mut self, enabled: bool) -> Self {
        self.trace_notifications = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = StateConfig::default()
            .with_partial_update(false)
            .with_max_flush_passes(0)
            .with_recycle_list_nodes(true);
        assert!(!config.partial_update);
        assert_eq!(config.max_flush_passes, 1);
        assert!(config.recycle_list_nodes);
        assert!(!config.trace_notifications);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_fills_defaults() {
        let config: StateConfig =
            serde_json::from_str(r#"{ "recycle_list_nodes": true }"#).expect("valid config");
        assert!(config.recycle_list_nodes);
        assert_eq!(config.max_flush_passes, 1024);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn loaded_pass_limit_is_clamped() {
        let config: StateConfig =
            serde_json::from_str(r#"{ "max_flush_passes": 0 }"#).expect("valid config");
        assert_eq!(config.max_flush_passes, 1);
        let config: StateConfig =
            serde_json::from_str(r#"{ "max_flush_passes": 7 }"#).expect("valid config");
        assert_eq!(config.max_flush_passes, 7);
    }
}
