//! Named-environment detection (`test`, `production`, ...).

use std::fmt;

use super::process::ProcessSnapshot;

/// A non-blank environment name. Surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentName(String);

impl EnvironmentName {
    /// Returns `None` for empty or whitespace-only names.
    pub fn new(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the overlay resource for this environment, e.g.
    /// `test.application` for base `application`.
    pub fn overlay_resource(&self, base: &str) -> String {
        format!("{}.{base}", self.0)
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the active environment from a process snapshot.
///
/// The environment variable named `variable` is consulted first, then the
/// process property of the same name. Blank values count as absent.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentSelector<'a> {
    variable: &'a str,
    snapshot: &'a ProcessSnapshot,
}

impl<'a> EnvironmentSelector<'a> {
    pub fn new(variable: &'a str, snapshot: &'a ProcessSnapshot) -> Self {
        Self { variable, snapshot }
    }

    pub fn resolve(&self) -> Option<EnvironmentName> {
        self.snapshot
            .env_var(self.variable)
            .and_then(EnvironmentName::new)
            .or_else(|| {
                self.snapshot
                    .property(self.variable)
                    .and_then(EnvironmentName::new)
            })
    }
}
