use std::time::{Duration, Instant};
use tracing::debug;

/// Trigger policy for automatic captures: debounce plus wall-clock cooldown.
///
/// Both rules must clear before an automatic capture fires. Manual captures
/// never touch this gate; in particular they do not advance the cooldown
/// clock.
pub struct CooldownGate {
    debounce_frame_count: u32,
    cooldown: Duration,
    consecutive_motion: u32,
    last_automatic: Option<Instant>,
}

impl CooldownGate {
    pub fn new(debounce_frame_count: u32, cooldown: Duration) -> Self {
        Self {
            debounce_frame_count,
            cooldown,
            consecutive_motion: 0,
            last_automatic: None,
        }
    }

    /// Feed one classification result. Motion-positive frames advance the
    /// debounce counter; any motion-negative frame resets it to zero.
    pub fn observe(&mut self, motion: bool) {
        if motion {
            self.consecutive_motion += 1;
        } else if self.consecutive_motion > 0 {
            debug!(
                "Debounce reset after {} consecutive motion frames",
                self.consecutive_motion
            );
            self.consecutive_motion = 0;
        }
    }

    /// Whether an automatic capture may fire at `now`
    pub fn automatic_permitted(&self, now: Instant) -> bool {
        self.debounce_satisfied() && self.cooldown_elapsed(now)
    }

    /// Record a successful automatic capture: the debounce counter resets
    /// and the cooldown window restarts at `now`.
    pub fn mark_automatic(&mut self, now: Instant) {
        self.consecutive_motion = 0;
        self.last_automatic = Some(now);
    }

    /// Seconds until the cooldown window reopens, zero when it already has
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        match self.last_automatic {
            Some(last) => self.cooldown.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn consecutive_motion(&self) -> u32 {
        self.consecutive_motion
    }

    fn debounce_satisfied(&self) -> bool {
        self.consecutive_motion >= self.debounce_frame_count
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_automatic {
            Some(last) => now.duration_since(last) >= self.cooldown,
            None => true,
        }
    }
}
