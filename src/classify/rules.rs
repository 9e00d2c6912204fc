//! Static message rules for untagged errors.
//!
//! Rules are checked in order and the first rule with a matching needle
//! wins. Needles are lowercase; messages are lowercased before matching.

use super::{ErrorCategory, RecoveryStrategy, Severity};

/// A single message rule.
#[derive(Debug, Clone, Copy)]
pub struct MessageRule {
    /// Substrings that select this rule.
    pub needles: &'static [&'static str],
    /// Assigned category.
    pub category: ErrorCategory,
    /// Assigned severity.
    pub severity: Severity,
    /// Suggested recovery.
    pub strategy: RecoveryStrategy,
}

/// Ordered rule table.
///
/// `connection refused` sits first so that messages mentioning both a refusal
/// and a timeout are still treated as an unreachable server.
pub const MESSAGE_RULES: &[MessageRule] = &[
    MessageRule {
        needles: &[
            "connection refused",
            "could not connect",
            "no route to host",
            "unable to open database",
        ],
        category: ErrorCategory::Network,
        severity: Severity::Critical,
        strategy: RecoveryStrategy::CircuitBreak,
    },
    MessageRule {
        needles: &[
            "connection reset",
            "connection lost",
            "connection closed",
            "server closed the connection",
            "broken pipe",
            "network is unreachable",
        ],
        category: ErrorCategory::Network,
        severity: Severity::High,
        strategy: RecoveryStrategy::Retry,
    },
    MessageRule {
        needles: &["timed out", "timeout", "statement cancelled"],
        category: ErrorCategory::Timeout,
        severity: Severity::Medium,
        strategy: RecoveryStrategy::Retry,
    },
    MessageRule {
        needles: &[
            "deadlock",
            "database is locked",
            "lock wait",
            "could not serialize",
            "database table is locked",
            "busy",
        ],
        category: ErrorCategory::Concurrency,
        severity: Severity::Medium,
        strategy: RecoveryStrategy::Retry,
    },
    MessageRule {
        needles: &[
            "unique constraint",
            "duplicate key",
            "foreign key",
            "not null constraint",
            "check constraint",
            "integrity",
        ],
        category: ErrorCategory::Integrity,
        severity: Severity::High,
        strategy: RecoveryStrategy::FailFast,
    },
    MessageRule {
        needles: &[
            "permission denied",
            "access denied",
            "authentication failed",
            "readonly database",
            "read-only",
            "not authorized",
        ],
        category: ErrorCategory::Permission,
        severity: Severity::Critical,
        strategy: RecoveryStrategy::FailFast,
    },
    MessageRule {
        needles: &[
            "too many connections",
            "too many clients",
            "out of memory",
            "disk full",
            "no space left",
            "database or disk is full",
        ],
        category: ErrorCategory::Resource,
        severity: Severity::High,
        strategy: RecoveryStrategy::CircuitBreak,
    },
    MessageRule {
        needles: &[
            "syntax error",
            "no such table",
            "no such column",
            "does not exist",
            "ambiguous column",
        ],
        category: ErrorCategory::Query,
        severity: Severity::Medium,
        strategy: RecoveryStrategy::FailFast,
    },
];

/// Find the first rule matching `message`.
#[must_use]
pub fn match_message(message: &str) -> Option<&'static MessageRule> {
    let lowered = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| lowered.contains(needle)))
}
