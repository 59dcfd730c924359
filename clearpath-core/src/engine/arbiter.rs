//! Cooldown state machine for directional events.
//!
//! ```text
//!            actionable estimate
//!   Idle ─────────────────────────► CooldownActive
//!    ▲                                    │
//!    └──── now - armed_at ≥ cooldown ─────┘
//! ```
//!
//! Expiry is a timestamp comparison made at the start of each frame; there
//! are no timers. Every window remembers the generation it was armed under
//! and `reset()` bumps the generation, so a window that outlives a reset can
//! never clear state belonging to a newer trigger.

use crate::analysis::DirectionEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    Idle,
    CooldownActive,
}

/// Outcome of offering an estimate to the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Emit a directional event.
    Triggered,
    /// Suppressed: a previous trigger's cooldown is still open.
    CoolingDown,
    /// Suppressed: confidence did not clear the gate.
    LowConfidence,
}

#[derive(Debug, Clone, Copy)]
struct CooldownWindow {
    armed_at_ms: u64,
    azimuth_degrees: f32,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct EventArbiter {
    cooldown_ms: u64,
    window: Option<CooldownWindow>,
    generation: u64,
    last_trigger_ms: Option<u64>,
}

impl EventArbiter {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            window: None,
            generation: 0,
            last_trigger_ms: None,
        }
    }

    /// Close the cooldown window if it has run its course by `now_ms`.
    ///
    /// Returns `true` when this call performed the `CooldownActive → Idle`
    /// transition.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        match self.window {
            Some(w)
                if w.generation == self.generation
                    && now_ms.saturating_sub(w.armed_at_ms) >= self.cooldown_ms =>
            {
                self.window = None;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> ArbiterState {
        if self.window.is_some() {
            ArbiterState::CooldownActive
        } else {
            ArbiterState::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == ArbiterState::Idle
    }

    /// Offer a fresh estimate. Only an idle arbiter with an actionable
    /// estimate triggers.
    pub fn offer(&mut self, estimate: &DirectionEstimate, now_ms: u64) -> Verdict {
        if self.window.is_some() {
            return Verdict::CoolingDown;
        }
        if !estimate.is_actionable() {
            return Verdict::LowConfidence;
        }
        self.generation = self.generation.wrapping_add(1);
        self.window = Some(CooldownWindow {
            armed_at_ms: now_ms,
            azimuth_degrees: estimate.azimuth_degrees,
            generation: self.generation,
        });
        self.last_trigger_ms = Some(now_ms);
        Verdict::Triggered
    }

    /// Azimuth of the last trigger while its window is open.
    pub fn current_direction(&self) -> Option<f32> {
        self.window.map(|w| w.azimuth_degrees)
    }

    pub fn last_trigger_ms(&self) -> Option<u64> {
        self.last_trigger_ms
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// Back to a fresh `Idle` state.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.window = None;
        self.last_trigger_ms = None;
    }
}
