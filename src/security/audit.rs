//! Bounded in-memory audit trail and brute-force detection.
//!
//! Two independent FIFO buffers (security events and login attempts), each
//! capped at `capacity`; the oldest entry is evicted first. Every append is
//! also handed to the configured [`AuditSink`] after the local write.
//!
//! Lockout: [`LOCKOUT_THRESHOLD`] failed attempts from one address within
//! [`LOCKOUT_WINDOW_MINUTES`].

use super::clock::Clock;
use super::sink::{AuditRecord, AuditSink};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;
pub const LOCKOUT_THRESHOLD: usize = 5;
pub const LOCKOUT_WINDOW_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    /// Overwritten with the log's clock when recorded.
    pub timestamp: DateTime<Utc>,
    pub principal_id: String,
    pub principal_email: String,
    pub principal_role: String,
    pub source_address: String,
    pub action: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(action: impl Into<String>, resource: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            principal_id: String::new(),
            principal_email: String::new(),
            principal_role: String::new(),
            source_address: String::new(),
            action: action.into(),
            resource: resource.into(),
            details: None,
            success,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    /// Overwritten with the log's clock when recorded.
    pub timestamp: DateTime<Utc>,
    pub email: String,
    pub source_address: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl LoginAttempt {
    #[must_use]
    pub fn new(email: impl Into<String>, source_address: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            email: email.into(),
            source_address: source_address.into(),
            success,
            user_agent: None,
            failure_reason: None,
        }
    }
}

/// Point-in-time copy of both buffers, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditExport {
    pub events: Vec<SecurityEvent>,
    pub login_attempts: Vec<LoginAttempt>,
}

pub struct AuditLog {
    capacity: usize,
    events: Mutex<VecDeque<SecurityEvent>>,
    login_attempts: Mutex<VecDeque<LoginAttempt>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    buffer.push_back(item);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

fn newest_first<T: Clone>(buffer: &Mutex<VecDeque<T>>, limit: usize) -> Vec<T> {
    let buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    buffer.iter().rev().take(limit).cloned().collect()
}

impl AuditLog {
    #[must_use]
    pub fn new(capacity: usize, clock: Arc<dyn Clock>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_AUDIT_CAPACITY))),
            login_attempts: Mutex::new(VecDeque::with_capacity(
                capacity.min(DEFAULT_AUDIT_CAPACITY),
            )),
            clock,
            sink,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stamp, append and forward. Returns the stored copy.
    pub fn record_event(&self, mut event: SecurityEvent) -> SecurityEvent {
        event.timestamp = self.clock.now();
        {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            push_bounded(&mut events, event.clone(), self.capacity);
        }

        debug!(
            action = %event.action,
            resource = %event.resource,
            success = event.success,
            "security event recorded"
        );
        self.sink.forward(AuditRecord::Event(event.clone()));
        event
    }

    /// Stamp, append and forward. Returns the stored copy.
    pub fn record_login_attempt(&self, mut attempt: LoginAttempt) -> LoginAttempt {
        attempt.timestamp = self.clock.now();
        {
            let mut attempts = self
                .login_attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            push_bounded(&mut attempts, attempt.clone(), self.capacity);
        }

        debug!(
            source_address = %attempt.source_address,
            success = attempt.success,
            "login attempt recorded"
        );
        self.sink.forward(AuditRecord::LoginAttempt(attempt.clone()));
        attempt
    }

    /// Failed attempts from `address` strictly newer than `now - window`.
    #[must_use]
    pub fn failed_attempts_from(
        &self,
        address: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        let cutoff = now - window;
        let attempts = self
            .login_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        attempts
            .iter()
            .filter(|attempt| {
                !attempt.success && attempt.source_address == address && attempt.timestamp > cutoff
            })
            .count()
    }

    #[must_use]
    pub fn is_locked_out(&self, address: &str, now: DateTime<Utc>) -> bool {
        self.failed_attempts_from(address, Duration::minutes(LOCKOUT_WINDOW_MINUTES), now)
            >= LOCKOUT_THRESHOLD
    }

    /// Up to `limit` events, newest first.
    #[must_use]
    pub fn security_events(&self, limit: usize) -> Vec<SecurityEvent> {
        newest_first(&self.events, limit)
    }

    /// Up to `limit` login attempts, newest first.
    #[must_use]
    pub fn login_attempts(&self, limit: usize) -> Vec<LoginAttempt> {
        newest_first(&self.login_attempts, limit)
    }

    #[must_use]
    pub fn export_logs(&self) -> AuditExport {
        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        let login_attempts = self
            .login_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        AuditExport {
            events,
            login_attempts,
        }
    }

    pub fn clear_logs(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.login_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use crate::security::sink::NoopAuditSink;
    use chrono::TimeZone;

    #[derive(Default)]
    struct RecordingSink {
        kinds: Mutex<Vec<&'static str>>,
    }

    impl AuditSink for RecordingSink {
        fn forward(&self, record: AuditRecord) {
            self.kinds.lock().unwrap().push(record.kind());
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn log_with(capacity: usize) -> (AuditLog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let log = AuditLog::new(capacity, clock.clone(), Arc::new(NoopAuditSink));
        (log, clock)
    }

    fn fail_from(log: &AuditLog, address: &str) {
        log.record_login_attempt(LoginAttempt::new("ops@skyship.dev", address, false));
    }

    #[test]
    fn five_failures_lock_out_only_that_address() {
        let (log, clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        for _ in 0..4 {
            fail_from(&log, "198.51.100.7");
            clock.advance(Duration::minutes(1));
        }
        assert!(!log.is_locked_out("198.51.100.7", clock.now()));

        fail_from(&log, "198.51.100.7");
        assert!(log.is_locked_out("198.51.100.7", clock.now()));
        assert!(!log.is_locked_out("198.51.100.8", clock.now()));

        for _ in 0..5 {
            fail_from(&log, "198.51.100.8");
        }
        assert!(log.is_locked_out("198.51.100.8", clock.now()));
    }

    #[test]
    fn lockout_expires_with_window() {
        let (log, clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        for _ in 0..5 {
            fail_from(&log, "198.51.100.7");
        }
        assert!(log.is_locked_out("198.51.100.7", clock.now()));

        // Exactly at the boundary the attempts are no longer strictly inside.
        let later = start() + Duration::minutes(LOCKOUT_WINDOW_MINUTES);
        assert_eq!(
            log.failed_attempts_from("198.51.100.7", Duration::minutes(15), later),
            0
        );
        assert!(!log.is_locked_out("198.51.100.7", later));
    }

    #[test]
    fn successes_do_not_count_toward_lockout() {
        let (log, clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        for _ in 0..10 {
            log.record_login_attempt(LoginAttempt::new("ops@skyship.dev", "10.0.0.1", true));
        }
        assert_eq!(
            log.failed_attempts_from("10.0.0.1", Duration::minutes(15), clock.now()),
            0
        );
    }

    #[test]
    fn eviction_is_oldest_first() {
        let (log, _clock) = log_with(3);
        for i in 0..5 {
            log.record_event(SecurityEvent::new(format!("action-{i}"), "/admin", true));
        }

        let export = log.export_logs();
        assert_eq!(export.events.len(), 3);
        let actions: Vec<_> = export.events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["action-2", "action-3", "action-4"]);
    }

    #[test]
    fn login_buffer_is_bounded_independently() {
        let (log, _clock) = log_with(2);
        log.record_event(SecurityEvent::new("one", "/", true));
        for i in 0..4 {
            log.record_login_attempt(LoginAttempt::new(
                format!("{i}@skyship.dev"),
                "10.0.0.1",
                false,
            ));
        }

        let export = log.export_logs();
        assert_eq!(export.events.len(), 1);
        assert_eq!(export.login_attempts.len(), 2);
        assert_eq!(export.login_attempts[0].email, "2@skyship.dev");
    }

    #[test]
    fn recent_queries_are_newest_first_and_limited() {
        let (log, clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        for i in 0..5 {
            log.record_event(SecurityEvent::new(format!("action-{i}"), "/admin", true));
            clock.advance(Duration::seconds(1));
        }

        let recent = log.security_events(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "action-4");
        assert_eq!(recent[1].action, "action-3");
        assert!(recent[0].timestamp > recent[1].timestamp);
        assert_eq!(log.security_events(100).len(), 5);
        assert!(log.login_attempts(10).is_empty());
    }

    #[test]
    fn records_are_stamped_by_the_clock() {
        let (log, clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        clock.advance(Duration::minutes(3));
        let stored = log.record_event(SecurityEvent::new("x", "y", false));
        assert_eq!(stored.timestamp, start() + Duration::minutes(3));
    }

    #[test]
    fn export_is_a_snapshot() {
        let (log, _clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        log.record_event(SecurityEvent::new("before", "/", true));
        let export = log.export_logs();
        log.record_event(SecurityEvent::new("after", "/", true));
        assert_eq!(export.events.len(), 1);
    }

    #[test]
    fn clear_empties_both_buffers() {
        let (log, clock) = log_with(DEFAULT_AUDIT_CAPACITY);
        log.record_event(SecurityEvent::new("x", "/", true));
        for _ in 0..5 {
            fail_from(&log, "10.0.0.1");
        }
        log.clear_logs();

        assert_eq!(log.export_logs(), AuditExport::default());
        assert!(!log.is_locked_out("10.0.0.1", clock.now()));
    }

    #[test]
    fn every_record_is_forwarded() {
        let sink = Arc::new(RecordingSink::default());
        let log = AuditLog::new(
            1,
            Arc::new(ManualClock::new(start())),
            sink.clone(),
        );
        log.record_event(SecurityEvent::new("x", "/", true));
        log.record_event(SecurityEvent::new("y", "/", true));
        log.record_login_attempt(LoginAttempt::new("a", "10.0.0.1", true));

        assert_eq!(
            *sink.kinds.lock().unwrap(),
            ["security_event", "security_event", "login_attempt"]
        );
    }

    #[test]
    fn concurrent_appends_respect_capacity() {
        let clock = Arc::new(ManualClock::new(start()));
        let log = Arc::new(AuditLog::new(50, clock, Arc::new(NoopAuditSink)));

        let writers: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        log.record_login_attempt(LoginAttempt::new(
                            format!("{t}-{i}"),
                            "10.0.0.1",
                            false,
                        ));
                        assert!(log.export_logs().login_attempts.len() <= 50);
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(log.export_logs().login_attempts.len(), 50);
    }

    #[test]
    fn event_json_uses_camel_case() {
        let mut event = SecurityEvent::new("policy.update", "/admin/access-policy", true);
        event.principal_email = "ops@skyship.dev".to_string();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["principalEmail"], "ops@skyship.dev");
        assert!(value.get("details").is_none());
    }
}
