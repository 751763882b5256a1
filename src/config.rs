use std::env;

/// Environment variable switching validating dissection on or off
pub const ENV_VALIDATING: &str = "TSREADER_VALIDATING";

/// Environment variable naming the source in reader descriptions
pub const ENV_LABEL: &str = "TSREADER_LABEL";

/// Per-reader configuration.
///
/// There is no process-wide configuration: every reader carries its own
/// copy, so two readers in the same process can run in different modes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Whether packets produced by the reader dissect in validating mode
    pub validating: bool,
    /// Byte offset of the source's current position within the stream
    pub initial_offset: u64,
    /// Index to give the first packet read
    pub initial_count: u64,
    /// Name used for the source in descriptions and errors
    pub label: Option<String>,
}

impl ReaderConfig {
    /// Default configuration: forgiving dissection, counting from zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from the defaults overridden by
    /// `TSREADER_VALIDATING` and `TSREADER_LABEL`.
    ///
    /// Unrecognised values for `TSREADER_VALIDATING` are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var(ENV_VALIDATING) {
            match parse_flag(&value) {
                Some(flag) => config.validating = flag,
                None => log::warn!("ignoring {}={:?}: not a boolean", ENV_VALIDATING, value),
            }
        }

        if let Ok(label) = env::var(ENV_LABEL) {
            let label = label.trim();
            if !label.is_empty() {
                config.label = Some(label.to_string());
            }
        }

        config
    }

    /// Sets whether packets dissect in validating mode.
    pub fn with_validating(mut self, validating: bool) -> Self {
        self.validating = validating;
        self
    }

    /// Sets the byte offset the source is positioned at.
    pub fn with_initial_offset(mut self, offset: u64) -> Self {
        self.initial_offset = offset;
        self
    }

    /// Sets the index given to the first packet read.
    pub fn with_initial_count(mut self, count: u64) -> Self {
        self.initial_count = count;
        self
    }

    /// Names the source in descriptions and errors.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::new();
        assert!(!config.validating);
        assert_eq!(config.initial_offset, 0);
        assert_eq!(config.initial_count, 0);
        assert_eq!(config.label, None);
    }

    #[test]
    fn test_builder() {
        let config = ReaderConfig::new()
            .with_validating(true)
            .with_initial_offset(376)
            .with_initial_count(2)
            .with_label("capture");
        assert!(config.validating);
        assert_eq!(config.initial_offset, 376);
        assert_eq!(config.initial_count, 2);
        assert_eq!(config.label.as_deref(), Some("capture"));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" Yes "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_from_env() {
        env::set_var(ENV_VALIDATING, "true");
        env::set_var(ENV_LABEL, "  multicast-capture ");
        let config = ReaderConfig::from_env();
        env::remove_var(ENV_VALIDATING);
        env::remove_var(ENV_LABEL);

        assert!(config.validating);
        assert_eq!(config.label.as_deref(), Some("multicast-capture"));
    }
}
