//! Connection-side interpretation of heartbeat and close policies.
//!
//! Monitors only call [`Connection::monitor`](crate::Connection::monitor).
//! What to do on that call depends on the connection's own traffic
//! bookkeeping, which [`AcmActivity`] captures so that every connection
//! implementation applies the policies the same way.

use std::time::{Duration, Instant};

use super::{AcmClose, AcmConfig, AcmHeartbeat};

/// How an idle connection should be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Finish in-flight work, then close.
    Graceful,
    /// Close immediately.
    Forceful,
}

/// Outcome of evaluating the policies on one monitor tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcmAction {
    /// Send a heartbeat now.
    pub heartbeat: bool,
    /// Close the connection, and how.
    pub close: Option<CloseMode>,
}

/// Traffic bookkeeping of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcmActivity {
    /// Last time a message was sent or received.
    pub last_activity: Instant,
    /// Requests sent and still waiting for a reply.
    pub outstanding_invocations: usize,
    /// Incoming requests being dispatched.
    pub dispatches_in_progress: usize,
}

impl AcmActivity {
    /// Fresh activity with no traffic in flight.
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            outstanding_invocations: 0,
            dispatches_in_progress: 0,
        }
    }

    /// Record traffic at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Decide what the connection should do on a monitor tick at `now`.
    ///
    /// A connection that is about to close does not also heartbeat.
    pub fn evaluate(&self, now: Instant, config: &AcmConfig) -> AcmAction {
        if !config.is_enabled() {
            return AcmAction::default();
        }

        let idle = now.saturating_duration_since(self.last_activity);
        let close = if idle >= config.timeout {
            self.close_mode(config.close)
        } else {
            None
        };

        let heartbeat = close.is_none()
            && match config.heartbeat {
                AcmHeartbeat::Always => true,
                AcmHeartbeat::OnIdle => idle >= quarter(config.timeout),
                AcmHeartbeat::Off | AcmHeartbeat::OnDispatch | AcmHeartbeat::OnInvocation => false,
            };

        AcmAction { heartbeat, close }
    }

    fn close_mode(&self, policy: AcmClose) -> Option<CloseMode> {
        match policy {
            AcmClose::Off => None,
            AcmClose::OnIdle => Some(CloseMode::Graceful),
            AcmClose::OnInvocation => {
                (self.outstanding_invocations == 0).then_some(CloseMode::Graceful)
            }
            AcmClose::OnInvocationAndIdle => (self.outstanding_invocations == 0
                && self.dispatches_in_progress == 0)
                .then_some(CloseMode::Graceful),
            AcmClose::OnIdleForceful => Some(CloseMode::Forceful),
        }
    }
}

fn quarter(timeout: Duration) -> Duration {
    timeout / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(heartbeat: AcmHeartbeat, close: AcmClose) -> AcmConfig {
        AcmConfig::client()
            .with_timeout(Duration::from_secs(8))
            .with_heartbeat(heartbeat)
            .with_close(close)
    }

    #[test]
    fn test_disabled_config_does_nothing() {
        let start = Instant::now();
        let activity = AcmActivity::new(start);
        let disabled = config(AcmHeartbeat::Always, AcmClose::OnIdleForceful)
            .with_timeout(Duration::ZERO);
        let action = activity.evaluate(start + Duration::from_secs(100), &disabled);
        assert_eq!(action, AcmAction::default());
    }

    #[test]
    fn test_heartbeat_always_fires_on_every_tick() {
        let start = Instant::now();
        let activity = AcmActivity::new(start);
        let action = activity.evaluate(start, &config(AcmHeartbeat::Always, AcmClose::Off));
        assert!(action.heartbeat);
    }

    #[test]
    fn test_heartbeat_on_idle_waits_a_quarter_timeout() {
        let start = Instant::now();
        let activity = AcmActivity::new(start);
        let cfg = config(AcmHeartbeat::OnIdle, AcmClose::Off);
        assert!(!activity.evaluate(start + Duration::from_secs(1), &cfg).heartbeat);
        assert!(activity.evaluate(start + Duration::from_secs(2), &cfg).heartbeat);
    }

    #[test]
    fn test_passive_heartbeat_policies_never_fire() {
        let start = Instant::now();
        let activity = AcmActivity::new(start);
        let later = start + Duration::from_secs(7);
        for policy in [
            AcmHeartbeat::Off,
            AcmHeartbeat::OnDispatch,
            AcmHeartbeat::OnInvocation,
        ] {
            assert!(!activity.evaluate(later, &config(policy, AcmClose::Off)).heartbeat);
        }
    }

    #[test]
    fn test_close_policies_after_idle_timeout() {
        let start = Instant::now();
        let idle = start + Duration::from_secs(8);
        let mut activity = AcmActivity::new(start);
        activity.outstanding_invocations = 1;

        let on_idle = activity.evaluate(idle, &config(AcmHeartbeat::Off, AcmClose::OnIdle));
        assert_eq!(on_idle.close, Some(CloseMode::Graceful));

        let on_invocation =
            activity.evaluate(idle, &config(AcmHeartbeat::Off, AcmClose::OnInvocation));
        assert_eq!(on_invocation.close, None);

        let forceful =
            activity.evaluate(idle, &config(AcmHeartbeat::Off, AcmClose::OnIdleForceful));
        assert_eq!(forceful.close, Some(CloseMode::Forceful));

        let off = activity.evaluate(idle, &config(AcmHeartbeat::Off, AcmClose::Off));
        assert_eq!(off.close, None);
    }

    #[test]
    fn test_close_on_invocation_and_idle_waits_for_dispatch() {
        let start = Instant::now();
        let idle = start + Duration::from_secs(9);
        let cfg = config(AcmHeartbeat::Off, AcmClose::OnInvocationAndIdle);

        let mut activity = AcmActivity::new(start);
        activity.dispatches_in_progress = 1;
        assert_eq!(activity.evaluate(idle, &cfg).close, None);

        activity.dispatches_in_progress = 0;
        assert_eq!(activity.evaluate(idle, &cfg).close, Some(CloseMode::Graceful));
    }

    #[test]
    fn test_touch_resets_idle_time() {
        let start = Instant::now();
        let mut activity = AcmActivity::new(start);
        let cfg = config(AcmHeartbeat::Off, AcmClose::OnIdle);
        activity.touch(start + Duration::from_secs(5));
        assert_eq!(
            activity.evaluate(start + Duration::from_secs(10), &cfg).close,
            None
        );
    }

    #[test]
    fn test_closing_connection_skips_heartbeat() {
        let start = Instant::now();
        let activity = AcmActivity::new(start);
        let action = activity.evaluate(
            start + Duration::from_secs(8),
            &config(AcmHeartbeat::Always, AcmClose::OnIdle),
        );
        assert!(!action.heartbeat);
        assert_eq!(action.close, Some(CloseMode::Graceful));
    }
}
