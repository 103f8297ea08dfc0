//! Public types for the hub connection layer.

use std::fmt;
use std::time::Duration;

use serde_json::{Value, json};

use hilolink_auth::TokenKind;
use hilolink_protocol::targets;

/// The two real-time hubs exposed by the automation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubKind {
    DeviceHub,
    ChallengeHub,
}

impl HubKind {
    /// Path segment used in the negotiate URL.
    pub fn hub_path(self) -> &'static str {
        match self {
            Self::DeviceHub => "DeviceHub",
            Self::ChallengeHub => "ChallengeHub",
        }
    }

    /// The bearer token kind this hub authenticates with.
    pub fn token_kind(self) -> TokenKind {
        match self {
            Self::DeviceHub => TokenKind::DeviceHub,
            Self::ChallengeHub => TokenKind::ChallengeHub,
        }
    }
}

impl fmt::Display for HubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeviceHub => "device-hub",
            Self::ChallengeHub => "challenge-hub",
        })
    }
}

/// Connection state for one hub.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No socket and no attempt in progress.
    Disconnected,
    /// Negotiate request in flight.
    Negotiating,
    /// Socket open, waiting for the handshake response.
    HandshakeSent,
    /// Handshake accepted, pumps running.
    Connected,
    /// Connection lost, waiting out the backoff delay.
    Reconnecting { attempt: u32 },
}

/// Events emitted by a hub connection.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Connection state changed.
    StateChanged { hub: HubKind, state: ConnectionState },
    /// A push invocation arrived from the hub.
    Invocation {
        hub: HubKind,
        target: String,
        arguments: Vec<Value>,
    },
    /// A reconnect attempt is pending.
    Reconnecting {
        hub: HubKind,
        attempt: u32,
        next_retry_secs: f64,
    },
    /// The connection gave up permanently (repeated auth failures).
    Fatal { hub: HubKind, reason: String },
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// A connection that survived this long resets the backoff.
    pub stability_threshold: Duration,
    /// Consecutive token refresh failures tolerated before giving up.
    pub auth_retry_limit: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            stability_threshold: Duration::from_secs(30),
            auth_retry_limit: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before a reconnect attempt (1-based), exponential with ±25%
    /// jitter so a fleet of clients does not redial a recovering hub in
    /// lockstep. Never exceeds `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1).min(32) as i32;
        let base = self
            .initial_delay
            .mul_f64(self.backoff_factor.powi(step))
            .min(self.max_delay);

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let spread = 0.75 + 0.5 * f64::from(nanos) / f64::from(u32::MAX);
        base.mul_f64(spread).min(self.max_delay)
    }
}

/// One subscription issued after each connection establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTarget {
    pub target: &'static str,
    pub location_id: i64,
    pub event_id: Option<i64>,
}

impl SubscriptionTarget {
    /// Device hub: subscribe to a location's device updates.
    pub fn location(location_id: i64) -> Self {
        Self {
            target: targets::SUBSCRIBE_TO_LOCATION,
            location_id,
            event_id: None,
        }
    }

    /// Device hub: subscribe to per-attribute readings for the location.
    pub fn devices_attributes(location_id: i64) -> Self {
        Self {
            target: targets::SUBSCRIBE_DEVICES_ATTRIBUTES,
            location_id,
            event_id: None,
        }
    }

    /// Challenge hub: subscribe to a CH-program event.
    pub fn event_ch(location_id: i64, event_id: i64) -> Self {
        Self {
            target: targets::SUBSCRIBE_TO_EVENT_CH,
            location_id,
            event_id: Some(event_id),
        }
    }

    /// Challenge hub: subscribe to a Flex-program event.
    pub fn event_flex(location_id: i64, event_id: i64) -> Self {
        Self {
            target: targets::SUBSCRIBE_TO_EVENT_FLEX,
            location_id,
            event_id: Some(event_id),
        }
    }

    /// Invocation arguments in the shape each target expects.
    pub fn arguments(&self) -> Vec<Value> {
        match self.event_id {
            Some(event_id) => vec![json!({
                "locationHiloId": self.location_id,
                "eventId": event_id,
            })],
            None => vec![json!(self.location_id)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_kind_names() {
        assert_eq!(HubKind::DeviceHub.hub_path(), "DeviceHub");
        assert_eq!(HubKind::ChallengeHub.hub_path(), "ChallengeHub");
        assert_eq!(HubKind::DeviceHub.to_string(), "device-hub");
        assert_eq!(HubKind::DeviceHub.token_kind(), TokenKind::DeviceHub);
    }

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.stability_threshold, Duration::from_secs(30));
    }

    #[test]
    fn reconnect_config_delay_backoff() {
        let config = ReconnectConfig::default();
        // Base delays: 1s, 2s, 4s, 8s, 16s, 32s, then capped at 60s.
        let expected_base: [f64; 8] = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 60.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let delay = config.delay_for_attempt((i + 1) as u32);
            let secs = delay.as_secs_f64();
            let lo = base * 0.74;
            let hi = (base * 1.26).min(config.max_delay.as_secs_f64());
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn jittered_delay_never_exceeds_the_cap() {
        let config = ReconnectConfig::default();
        for attempt in 1..=20 {
            assert!(config.delay_for_attempt(attempt) <= config.max_delay);
        }
    }

    #[test]
    fn location_subscription_arguments() {
        let sub = SubscriptionTarget::location(4242);
        assert_eq!(sub.target, "SubscribeToLocation");
        assert_eq!(sub.arguments(), vec![json!(4242)]);
    }

    #[test]
    fn event_subscription_arguments() {
        let sub = SubscriptionTarget::event_ch(4242, 7);
        assert_eq!(sub.target, "SubscribeToEventCH");
        assert_eq!(
            sub.arguments(),
            vec![json!({"locationHiloId": 4242, "eventId": 7})]
        );

        let flex = SubscriptionTarget::event_flex(4242, 8);
        assert_eq!(flex.target, "SubscribeToEventFlex");
    }
}
