//! Volatile host detection
//!
//! A volatile host is one whose local filesystem does not survive a restart.
//! The signals are injected by the hosting platform at launch, so the
//! classification is recomputed on every call and never cached.

use std::collections::HashMap;

/// Variables whose presence alone marks the host as volatile
const PRESENCE_INDICATORS: &[&str] = &[
    "RENDER_SERVICE_NAME",
    "RENDER_EXTERNAL_HOSTNAME",
    "RENDER_SERVICE_ID",
    "RENDER_INSTANCE_ID",
];

/// Variables that must hold a truthy value
const TRUTHY_INDICATORS: &[&str] = &["RENDER", "LEDGER_VOLATILE_HOST"];

/// Variables whose value mentions the hosting platform
const HOSTNAME_INDICATORS: &[&str] = &["HOSTNAME", "RENDER_EXTERNAL_HOSTNAME"];

const HOSTNAME_MARKER: &str = "render";

/// Classifies the current host from a set of environment signals
#[derive(Debug, Clone, Default)]
pub struct HostClassifier {
    /// Fixed variable set; `None` reads the live process environment
    vars: Option<HashMap<String, String>>,
}

impl HostClassifier {
    /// Classifier backed by the process environment
    pub fn from_process() -> Self {
        Self { vars: None }
    }

    /// Classifier backed by a fixed set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Classifier that always reports a durable host
    pub fn durable() -> Self {
        Self::from_vars(std::iter::empty::<(String, String)>())
    }

    /// Classifier that always reports a volatile host
    pub fn volatile() -> Self {
        Self::from_vars([("LEDGER_VOLATILE_HOST", "1")])
    }

    fn lookup(&self, key: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
    }

    /// Returns true if any indicator is present
    pub fn is_volatile_host(&self) -> bool {
        self.matched_indicator().is_some()
    }

    /// Name of the first indicator that matched, for logging
    pub fn matched_indicator(&self) -> Option<&'static str> {
        for &key in TRUTHY_INDICATORS {
            if self.lookup(key).is_some_and(|v| is_truthy(&v)) {
                return Some(key);
            }
        }

        for &key in PRESENCE_INDICATORS {
            if self.lookup(key).is_some() {
                return Some(key);
            }
        }

        for &key in HOSTNAME_INDICATORS {
            if self
                .lookup(key)
                .is_some_and(|v| v.to_ascii_lowercase().contains(HOSTNAME_MARKER))
            {
                return Some(key);
            }
        }

        None
    }
}

/// Classify the running process's host
pub fn is_volatile_host() -> bool {
    HostClassifier::from_process().is_volatile_host()
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_indicators_is_durable() {
        let classifier = HostClassifier::from_vars([("HOME", "/home/me"), ("HOSTNAME", "laptop")]);
        assert!(!classifier.is_volatile_host());
        assert_eq!(classifier.matched_indicator(), None);
    }

    #[test]
    fn test_truthy_flag() {
        assert!(HostClassifier::from_vars([("RENDER", "true")]).is_volatile_host());
        assert!(!HostClassifier::from_vars([("RENDER", "false")]).is_volatile_host());
        assert!(!HostClassifier::from_vars([("RENDER", "")]).is_volatile_host());
        assert!(!HostClassifier::from_vars([("LEDGER_VOLATILE_HOST", "0")]).is_volatile_host());
    }

    #[test]
    fn test_presence_indicators() {
        for key in PRESENCE_INDICATORS {
            let classifier = HostClassifier::from_vars([(*key, "")]);
            assert!(classifier.is_volatile_host(), "{} should flip classification", key);
        }
    }

    #[test]
    fn test_hostname_marker_is_case_insensitive() {
        let classifier = HostClassifier::from_vars([("HOSTNAME", "srv-Render-abc123")]);
        assert!(classifier.is_volatile_host());
        assert_eq!(classifier.matched_indicator(), Some("HOSTNAME"));
    }

    #[test]
    fn test_fixed_constructors() {
        assert!(HostClassifier::volatile().is_volatile_host());
        assert!(!HostClassifier::durable().is_volatile_host());
    }
}
