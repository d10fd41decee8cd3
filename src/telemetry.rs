//! Reporting for conditions the engine survives but the host should hear about.
//!
//! Every such condition becomes a [`Violation`] handed to a [`ViolationObserver`]. Entities,
//! histories, channels and links each hold an optional observer; without one, reports go
//! to [`TracingObserver`]. Tests install a [`CollectingObserver`] and assert on what it saw.
//!
//! A prediction that disagrees with the server is normal operation, not a violation.
//! Corrections are logged at `debug` and counted in
//! [`ReconcileStats`](crate::ReconcileStats).
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | `TickOrder` | a history append or a publish goes backwards |
//! | `History` | a full history discards its oldest prediction |
//! | `CatchUp` | a catch-up plan hits the step cap |
//! | `Replication` | a notification is stale, or fails to decode or reach an entity |
//! | `Configuration` | a link setting is out of range and was clamped |
//! | `Invariant` | a runtime invariant check fails (debug or `paranoid` builds) |
//!
//! ```
//! use rebound::telemetry::{CollectingObserver, ViolationKind};
//! use rebound::{HistoryLog, Tick, TickState, EntityState};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! let mut log = HistoryLog::new(1).with_violation_observer(observer.clone());
//! log.append(TickState::new(Tick::new(1), EntityState::default()))?;
//! log.append(TickState::new(Tick::new(2), EntityState::default()))?;
//!
//! let discarded = observer.violations_of_kind(ViolationKind::History);
//! assert_eq!(discarded[0].tick, Some(Tick::new(1)));
//! # Ok::<(), rebound::ReboundError>(())
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::Tick;

/// How bad a [`Violation`] is, from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// The engine substituted a fallback and carried on.
    Warning,
    /// Data was lost, such as a notification that never reached its entity.
    Error,
    /// A broken invariant. The entity should be despawned.
    Critical,
}

impl ViolationSeverity {
    /// Lower-case label for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the engine raised a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Ticks went backwards where they must increase.
    TickOrder,
    /// The prediction history discarded an entry.
    History,
    /// Catch-up was clamped to the step cap.
    CatchUp,
    /// An authoritative notification was stale, undecodable or rejected.
    Replication,
    /// A configuration value was clamped into range.
    Configuration,
    /// A runtime invariant check failed.
    Invariant,
}

impl ViolationKind {
    /// Lower-case label for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TickOrder => "tick_order",
            Self::History => "history",
            Self::CatchUp => "catch_up",
            Self::Replication => "replication",
            Self::Configuration => "configuration",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// `Tick::NULL` and `None` both serialize as `null`.
#[allow(clippy::ref_option)]
fn serialize_tick<S: serde::Serializer>(tick: &Option<Tick>, serializer: S) -> Result<S::Ok, S::Error> {
    match tick.filter(|t| !t.is_null()) {
        Some(t) => serializer.serialize_i32(t.as_i32()),
        None => serializer.serialize_none(),
    }
}

/// One reported condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Where it came from.
    pub kind: ViolationKind,
    /// What happened.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
    /// The tick the condition concerns, when there is one.
    #[serde(serialize_with = "serialize_tick")]
    pub tick: Option<Tick>,
}

impl Violation {
    /// A violation with no tick attached.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            tick: None,
        }
    }

    /// Attaches the tick the condition concerns.
    #[must_use]
    pub fn with_tick(mut self, tick: Tick) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Serializes this violation to a JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Serializes this violation to a pretty-printed JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.severity, self.kind, self.message)?;
        if let Some(tick) = self.tick {
            write!(f, " at tick {tick}")?;
        }
        write!(f, " ({})", self.location)
    }
}

/// Receives violations. Called synchronously from inside `tick` and notification handling.
#[cfg(feature = "sync-send")]
pub trait ViolationObserver: Send + Sync {
    /// Handles one violation.
    fn on_violation(&self, violation: &Violation);
}

/// Receives violations. Called synchronously from inside `tick` and notification handling.
#[cfg(not(feature = "sync-send"))]
pub trait ViolationObserver {
    /// Handles one violation.
    fn on_violation(&self, violation: &Violation);
}

/// Logs violations through `tracing`: warnings at `warn`, everything else at `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &Violation) {
        let tick = violation.tick.map(Tick::as_i32);
        let kind = violation.kind.as_str();
        if violation.severity == ViolationSeverity::Warning {
            tracing::warn!(kind, tick, location = violation.location, "{}", violation.message);
        } else {
            tracing::error!(
                severity = violation.severity.as_str(),
                kind,
                tick,
                location = violation.location,
                "{}",
                violation.message
            );
        }
    }
}

/// Keeps every violation in memory.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    seen: Mutex<Vec<Violation>>,
}

impl CollectingObserver {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything collected so far, oldest first.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.seen.lock().clone()
    }

    /// Collected violations of one kind, oldest first.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<Violation> {
        self.seen
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Whether any violation of `kind` was collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.seen.lock().iter().any(|v| v.kind == kind)
    }

    /// Number collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &Violation) {
        self.seen.lock().push(violation.clone());
    }
}

/// Hands `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn dispatch<O: ViolationObserver + ?Sized>(observer: Option<&Arc<O>>, violation: &Violation) {
    match observer {
        Some(observer) => observer.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation through [`TracingObserver`], for code that holds no observer.
///
/// ```
/// use rebound::report_violation;
/// use rebound::telemetry::{ViolationKind, ViolationSeverity};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::Configuration,
///     "loss rate {} clamped to {}", 1.5, 1.0);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        use $crate::telemetry::ViolationObserver as _;
        $crate::telemetry::TracingObserver.on_violation(&$crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt $(, $($arg)+)?),
            concat!(file!(), ":", line!()),
        ));
    }};
}

/// Reports a violation through an `&Option<Arc<dyn ViolationObserver>>`, optionally
/// attaching a tick.
///
/// ```
/// use rebound::report_violation_to;
/// use rebound::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
/// use rebound::Tick;
/// use std::sync::Arc;
///
/// let collector = Arc::new(CollectingObserver::new());
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
/// report_violation_to!(&observer, ViolationSeverity::Warning, ViolationKind::CatchUp,
///     tick = Tick::new(12), "catch-up of {} steps clamped to {}", 500, 240);
///
/// assert_eq!(collector.violations()[0].tick, Some(Tick::new(12)));
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, tick = $tick:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt $(, $($arg)+)?),
            concat!(file!(), ":", line!()),
        )
        .with_tick($tick);
        $crate::telemetry::dispatch($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt $(, $($arg)+)?),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::dispatch($observer.as_ref(), &violation);
    }};
}

/// Asserts that a [`CollectingObserver`] saw nothing.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(violations.is_empty(), "expected no violations, got {:#?}", violations);
    }};
}

/// Asserts that a [`CollectingObserver`] saw at least one violation of `kind`.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "expected a {:?} violation, got {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}

/// A broken runtime invariant of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// The type whose invariant broke.
    pub type_name: &'static str,
    /// The invariant, stated as it should hold.
    pub invariant: String,
    /// The offending values.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// A violation of `invariant` in `type_name`.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Attaches the offending values.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// Types that can check their own invariants at runtime.
pub trait InvariantChecker {
    /// `Ok(())` if every invariant holds, otherwise the first broken one.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// In debug builds (or with `paranoid`), checks `$target`'s invariants and reports a
/// failure as a `Critical` [`ViolationKind::Invariant`] to `$observer`.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($target:expr, $observer:expr, $context:literal) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(broken) = $target.check_invariants() {
            $crate::report_violation_to!(
                $observer,
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [{}]",
                broken,
                $context
            );
        }
    }};
}

/// Release builds without `paranoid` skip invariant checks.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($target:expr, $observer:expr, $context:literal) => {{}};
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    struct AlwaysBroken;

    impl InvariantChecker for AlwaysBroken {
        fn check_invariants(&self) -> Result<(), InvariantViolation> {
            Err(InvariantViolation::new("AlwaysBroken", "never holds").with_details("x = 1"))
        }
    }

    #[test]
    fn display_names_severity_kind_and_tick() {
        let violation = Violation::new(
            ViolationSeverity::Warning,
            ViolationKind::History,
            "history full",
            "history.rs:1",
        )
        .with_tick(Tick::new(9));
        assert_eq!(
            violation.to_string(),
            "[warning/history] history full at tick 9 (history.rs:1)"
        );
    }

    #[test]
    fn report_with_tick_reaches_collector() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Error,
            ViolationKind::Replication,
            tick = Tick::new(3),
            "notification for tick {} lost",
            3
        );

        let seen = collector.violations_of_kind(ViolationKind::Replication);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "notification for tick 3 lost");
        assert_eq!(seen[0].tick, Some(Tick::new(3)));
        assert!(collector.violations_of_kind(ViolationKind::CatchUp).is_empty());
    }

    #[test]
    fn missing_observer_falls_back_to_tracing() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::CatchUp,
            "clamped"
        );
    }

    #[test]
    fn failed_invariant_is_reported_as_critical() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        crate::debug_check_invariants!(AlwaysBroken, &observer, "in test");

        if cfg!(any(debug_assertions, feature = "paranoid")) {
            let seen = collector.violations();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].severity, ViolationSeverity::Critical);
            assert_eq!(seen[0].message, "AlwaysBroken: never holds (x = 1) [in test]");
        } else {
            assert!(collector.is_empty());
        }
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_writes_tick_as_plain_integer() {
        let violation = Violation::new(
            ViolationSeverity::Warning,
            ViolationKind::CatchUp,
            "clamped",
            "entity.rs:1",
        );
        let json = violation.clone().with_tick(Tick::new(100)).to_json().unwrap();
        assert!(json.contains(r#""kind":"catch_up""#));
        assert!(json.contains(r#""tick":100"#));

        let null = violation.with_tick(Tick::NULL).to_json().unwrap();
        assert!(null.contains(r#""tick":null"#));
    }
}
