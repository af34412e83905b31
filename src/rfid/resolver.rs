//! Subject identity resolution over a noisy tag stream.
//!
//! Tag scanners misread: a neighbouring animal brushing the antenna, or a
//! single garbled frame, must not evict the subject mid-trial. The
//! resolver therefore layers a reliability filter over the raw stream:
//! identity switches are trusted quickly only once readings have been
//! dense for a sustained period. Without that confidence, a foreign tag
//! has to dominate for `new_animal_timeout` before the tracked subject is
//! considered replaced.
//!
//! All methods take `now` explicitly, so the filter is deterministic
//! under test.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::PresenceConfig;

/// Presence decision for the tracked subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// The tracked subject is (still) at the device
    Present(String),
    /// The tracked subject has left, or been replaced; tracking cleared
    Departed,
    /// No subject is being tracked and none has been seen
    Unknown,
}

/// Thresholds driving the resolver, all as [`Duration`]s.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Silence before the tracked subject counts as departed
    pub rfid_timeout: Duration,
    /// Time a foreign tag must dominate before the subject is switched
    pub new_animal_timeout: Duration,
    /// Read gap after which readings count as noisy again
    pub reliability_delay_threshold: Duration,
    /// Dense-reading time required before fast switches are trusted
    pub time_until_reliable: Duration,
}

impl From<&PresenceConfig> for ResolverConfig {
    fn from(config: &PresenceConfig) -> Self {
        Self {
            rfid_timeout: Duration::from_secs_f64(config.rfid_timeout_secs),
            new_animal_timeout: Duration::from_secs_f64(config.new_animal_timeout_secs),
            reliability_delay_threshold: Duration::from_secs_f64(
                config.reliability_delay_threshold_secs,
            ),
            time_until_reliable: Duration::from_secs_f64(config.time_until_reliable_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    id: String,
    /// When a frame last confirmed this subject
    last_confirmed: Instant,
}

/// Maintains current-subject identity and the reliability hysteresis
/// flag; decides presence, departure, and identity switches.
pub struct IdentityResolver {
    config: ResolverConfig,
    /// Most recent frame from any tag, and when it arrived
    last_frame: Option<(String, Instant)>,
    /// Start of the current dense-readings stretch
    reliability_anchor: Instant,
    reliable: bool,
    tracked: Option<Tracked>,
}

impl IdentityResolver {
    /// A resolver with no subject and no frame history.
    #[must_use]
    pub fn new(config: ResolverConfig, now: Instant) -> Self {
        Self {
            config,
            last_frame: None,
            reliability_anchor: now,
            reliable: true,
            tracked: None,
        }
    }

    /// Whether the filter currently trusts fast identity switches.
    #[must_use]
    pub const fn is_reliable(&self) -> bool {
        self.reliable
    }

    /// The tag id being tracked, if any.
    #[must_use]
    pub fn tracked(&self) -> Option<&str> {
        self.tracked.as_ref().map(|t| t.id.as_str())
    }

    /// Feed one poll cycle: the frame read this cycle (if any) and the
    /// current instant.
    ///
    /// With no subject tracked, a known frame acquires it. While tracking,
    /// the decision follows the filter: a matching frame refreshes the
    /// confirmation time; silence beyond `rfid_timeout` departs; a foreign
    /// frame departs only when the subject has not been confirmed for
    /// `new_animal_timeout` or the filter is reliable. `Departed` clears
    /// the tracked subject, so the next poll re-acquires whoever is at
    /// the antenna.
    pub fn poll(&mut self, now: Instant, frame: Option<&str>) -> Presence {
        // The gap is judged against the previous frame, before this
        // cycle's frame is recorded.
        self.update_reliability(now);
        if let Some(id) = frame {
            self.last_frame = Some((id.to_string(), now));
        }

        let Some((observed_id, observed_at)) = self.last_frame.clone() else {
            return Presence::Unknown;
        };

        let Some(mut tracked) = self.tracked.take() else {
            info!(tag = %observed_id, "subject acquired");
            self.tracked = Some(Tracked { id: observed_id.clone(), last_confirmed: observed_at });
            return Presence::Present(observed_id);
        };

        if observed_id == tracked.id {
            tracked.last_confirmed = observed_at;
            if now.duration_since(tracked.last_confirmed) > self.config.rfid_timeout {
                return self.depart(tracked, "tag silent past timeout");
            }
            self.tracked = Some(tracked);
            Presence::Present(observed_id)
        } else {
            let unconfirmed = now.duration_since(tracked.last_confirmed);
            if unconfirmed > self.config.new_animal_timeout {
                return self.depart(tracked, "foreign tag dominating past timeout");
            }
            if self.reliable {
                return self.depart(tracked, "foreign tag while readings reliable");
            }
            debug!(tag = %observed_id, "ignoring foreign tag while readings unreliable");
            let id = tracked.id.clone();
            self.tracked = Some(tracked);
            Presence::Present(id)
        }
    }

    /// Drop the tracked subject and frame history (used when the engine
    /// ends an interaction on its own, e.g. after a timeout departure).
    pub fn release(&mut self) {
        self.tracked = None;
        self.last_frame = None;
    }

    fn depart(&mut self, tracked: Tracked, reason: &str) -> Presence {
        info!(tag = %tracked.id, reason, "subject departed");
        self.last_frame = None;
        Presence::Departed
    }

    fn update_reliability(&mut self, now: Instant) {
        if let Some((_, at)) = self.last_frame {
            if now.duration_since(at) > self.config.reliability_delay_threshold {
                // A long silence makes subsequent readings suspect; the
                // dense-readings clock starts over.
                self.reliability_anchor = now;
            }
            self.reliable =
                now.duration_since(self.reliability_anchor) > self.config.time_until_reliable;
        } else {
            self.reliable = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ResolverConfig {
        ResolverConfig {
            rfid_timeout: Duration::from_secs(5),
            new_animal_timeout: Duration::from_secs(1),
            reliability_delay_threshold: Duration::from_secs(3),
            time_until_reliable: Duration::from_secs(10),
        }
    }

    fn s(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_unknown_until_first_frame() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        assert_eq!(r.poll(t0, None), Presence::Unknown);
        assert_eq!(r.poll(t0 + s(1), Some("A")), Presence::Present("A".into()));
        assert_eq!(r.tracked(), Some("A"));
    }

    #[test]
    fn test_departs_after_silence() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        r.poll(t0, Some("A"));
        // Quiet polls short of the timeout keep the subject present.
        assert_eq!(r.poll(t0 + s(4), None), Presence::Present("A".into()));
        assert_eq!(r.poll(t0 + s(6), None), Presence::Departed);
        assert_eq!(r.tracked(), None);
    }

    #[test]
    fn test_brief_foreign_tag_is_noise_while_unreliable() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        r.poll(t0, Some("A"));
        // A read gap beyond the delay threshold makes the filter
        // unreliable once frames resume.
        let t1 = t0 + s(4);
        assert_eq!(r.poll(t1, Some("A")), Presence::Present("A".into()));
        assert!(!r.is_reliable());
        // 0.3s later the reader briefly reports subject B; A was
        // confirmed recently, so the frame is treated as noise.
        let t2 = t1 + ms(300);
        assert_eq!(r.poll(t2, Some("B")), Presence::Present("A".into()));
        // A re-confirms and stays tracked.
        assert_eq!(r.poll(t2 + ms(200), Some("A")), Presence::Present("A".into()));
    }

    #[test]
    fn test_foreign_tag_switches_after_domination() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        r.poll(t0, Some("A"));
        let t1 = t0 + s(4);
        r.poll(t1, Some("A"));
        assert!(!r.is_reliable());
        // B reports while A has been silent past new_animal_timeout;
        // the filter is still unreliable, so it is domination, not
        // reliability, that forces the switch.
        assert_eq!(r.poll(t1 + s(2), Some("B")), Presence::Departed);
        // Next poll re-acquires B.
        assert_eq!(r.poll(t1 + s(2), Some("B")), Presence::Present("B".into()));
    }

    #[test]
    fn test_foreign_tag_switches_when_reliable() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        // Dense frames from A for longer than time_until_reliable.
        let mut t = t0;
        for _ in 0..12 {
            t += s(1);
            r.poll(t, Some("A"));
        }
        assert!(r.is_reliable());
        // A single B frame is now trusted immediately even though A was
        // confirmed within new_animal_timeout.
        assert_eq!(r.poll(t + s(1), Some("B")), Presence::Departed);
    }

    #[test]
    fn test_reliability_hysteresis_after_gap() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        let mut t = t0;
        for _ in 0..12 {
            t += s(1);
            r.poll(t, Some("A"));
        }
        assert!(r.is_reliable());

        // A gap beyond the delay threshold resets the anchor...
        t += s(4);
        r.poll(t, Some("A"));
        assert!(!r.is_reliable());

        // ...and dense readings must persist for time_until_reliable
        // before the filter trusts switches again.
        for _ in 0..10 {
            t += s(1);
            r.poll(t, Some("A"));
            assert!(!r.is_reliable());
        }
        t += s(1);
        r.poll(t, Some("A"));
        assert!(r.is_reliable());
    }

    #[test]
    fn test_release_requires_fresh_frames_to_reacquire() {
        let t0 = Instant::now();
        let mut r = IdentityResolver::new(config(), t0);
        r.poll(t0, Some("A"));
        r.release();
        // The stale frame history is gone with the subject.
        assert_eq!(r.poll(t0 + ms(100), None), Presence::Unknown);
        assert_eq!(r.poll(t0 + ms(200), Some("A")), Presence::Present("A".into()));
    }
}
