// Logging facade for lancom_common
//
// INTENTION: Give every subsystem a small, cheaply-cloneable logger that
// carries its own component tag and scope string, so log lines are
// self-describing without each call site having to repeat "[Discovery]"
// or similar prefixes by hand.

use std::fmt;

/// Which subsystem a log line originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Discovery,
    Service,
    PubSub,
    Node,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Discovery => "discovery",
            Component::Service => "service",
            Component::PubSub => "pubsub",
            Component::Node => "node",
        };
        write!(f, "{name}")
    }
}

/// A scoped logger. Cheap to clone; cloning just copies the component tag
/// and the (already-built) scope string.
#[derive(Debug, Clone)]
pub struct Logger {
    component: Component,
    scope: String,
}

impl Logger {
    /// Create a root logger for a subsystem.
    pub fn new_root(component: Component, scope: impl Into<String>) -> Self {
        Self {
            component,
            scope: scope.into(),
        }
    }

    /// Derive a child logger with an extended scope, e.g. a per-topic or
    /// per-service logger nested under a subsystem's root logger.
    pub fn with_scope(&self, child: impl fmt::Display) -> Self {
        Self {
            component: self.component,
            scope: format!("{}/{}", self.scope, child),
        }
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        log::debug!(target: "lancom", "[{}:{}] {}", self.component, self.scope, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        log::info!(target: "lancom", "[{}:{}] {}", self.component, self.scope, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        log::warn!(target: "lancom", "[{}:{}] {}", self.component, self.scope, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        log::error!(target: "lancom", "[{}:{}] {}", self.component, self.scope, message.as_ref());
    }
}

/// Implemented by types that carry a logger and know which component and
/// scope they should be attributed to, so they can log without plumbing a
/// `&Logger` through every method signature.
pub trait LoggingContext {
    fn component(&self) -> Component;
    fn logger(&self) -> &Logger;
}
