//! Post-reset isolation checks.

use crate::sandbox::Namespace;

/// A check run against a namespace right after it has been reset.
///
/// Returning `Some(details)` reports a leak; the sandbox is poisoned and the enclosing task
/// fails with [`Error::IsolationLeak`](crate::Error::IsolationLeak).
pub trait LeakCheck: Send + Sync {
    /// Short name used in leak reports.
    fn name(&self) -> &str;

    /// Inspects a freshly reset namespace.
    fn check(&self, namespace: &Namespace) -> Option<String>;
}

/// Verifies that statics, shadow state and heap all match the declared initial state.
///
/// Installed by default whenever leak detection is enabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct PristineNamespaceCheck;

impl LeakCheck for PristineNamespaceCheck {
    fn name(&self) -> &str {
        "pristine-namespace"
    }

    fn check(&self, namespace: &Namespace) -> Option<String> {
        let violations = namespace.pristine_violations();
        if violations.is_empty() {
            None
        } else {
            Some(violations.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::widget_universe, value::Value};

    #[test]
    fn test_pristine_check() {
        let mut ns = Namespace::new();
        ns.load(&widget_universe());
        assert_eq!(PristineNamespaceCheck.check(&ns), None);

        ns.set_static("com.example.Clock", "now", Value::I64(1));
        let report = PristineNamespaceCheck.check(&ns).unwrap();
        assert!(report.contains("com.example.Clock.now"));
    }
}
