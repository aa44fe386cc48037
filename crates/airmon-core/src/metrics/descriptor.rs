//! Naming and help metadata for a metric series

use core::fmt;
use core::iter;

/// Immutable naming/help metadata for one series.
///
/// The exported name is `{namespace_}{subsystem_}name`, with missing parts
/// left out entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub namespace: Option<&'static str>,
    pub subsystem: Option<&'static str>,
    pub name: &'static str,
    pub help: &'static str,
}

impl MetricDescriptor {
    /// Create a descriptor with neither namespace nor subsystem.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            namespace: None,
            subsystem: None,
            name,
            help,
        }
    }

    pub const fn with_namespace(mut self, namespace: &'static str) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub const fn with_subsystem(mut self, subsystem: &'static str) -> Self {
        self.subsystem = Some(subsystem);
        self
    }

    /// Displayable full name, written piecewise so no buffer is needed.
    pub const fn full_name(&self) -> FullName<'_> {
        FullName(self)
    }

    /// Characters of the full name, in order.
    fn name_chars(&self) -> impl Iterator<Item = char> + '_ {
        let prefix = |part: Option<&'static str>| {
            part.into_iter()
                .flat_map(|p| p.chars().chain(iter::once('_')))
        };

        prefix(self.namespace)
            .chain(prefix(self.subsystem))
            .chain(self.name.chars())
    }

    /// Whether two descriptors export under the same full name.
    ///
    /// `("a", "b_c")` and `("a_b", "c")` collide, so this compares the joined
    /// names rather than the parts.
    pub fn same_full_name(&self, other: &MetricDescriptor) -> bool {
        self.name_chars().eq(other.name_chars())
    }
}

/// The `{namespace_}{subsystem_}name` rendering of a [`MetricDescriptor`].
#[derive(Debug, Clone, Copy)]
pub struct FullName<'a>(&'a MetricDescriptor);

impl fmt::Display for FullName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = self.0.namespace {
            f.write_str(namespace)?;
            f.write_str("_")?;
        }
        if let Some(subsystem) = self.0.subsystem {
            f.write_str(subsystem)?;
            f.write_str("_")?;
        }
        f.write_str(self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_joins_present_parts() {
        let d = MetricDescriptor::new("errors", "help")
            .with_namespace("airmon")
            .with_subsystem("sensors");
        assert_eq!(d.full_name().to_string(), "airmon_sensors_errors");

        let d = MetricDescriptor::new("errors", "help").with_subsystem("sensors");
        assert_eq!(d.full_name().to_string(), "sensors_errors");

        let d = MetricDescriptor::new("reboot_count", "help");
        assert_eq!(d.full_name().to_string(), "reboot_count");
    }

    #[test]
    fn test_same_full_name_compares_joined_names() {
        let a = MetricDescriptor::new("c", "").with_subsystem("a_b");
        let b = MetricDescriptor::new("b_c", "").with_subsystem("a");
        let c = MetricDescriptor::new("c", "").with_subsystem("a");

        assert!(a.same_full_name(&b));
        assert!(!a.same_full_name(&c));
    }
}
