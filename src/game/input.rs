//! Input Capture and Normalization
//!
//! Client input is never rejected: every field is coerced into a safe
//! range before the simulation sees it. Each session owns a single-slot
//! mailbox that keeps only the newest accepted frame, ordered by the
//! client's sequence number.

use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

use serde::{Serialize, Deserialize};

use crate::core::constants::{INPUT_DEADZONE, MAX_ANIM_STATE_LEN};
use crate::game::state::PlayerId;

// =============================================================================
// INPUT FRAME
// =============================================================================

/// Sanitized input state for one player.
///
/// Invariant after [`InputFrame::sanitize`]: all floats finite,
/// `|(move_x, move_z)| <= 1`, `look_pitch` in [-π/2, π/2], `anim_time >= 0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Strafe axis, -1 (left) to +1 (right)
    pub move_x: f32,
    /// Forward axis, -1 to +1
    pub move_z: f32,
    /// Camera yaw (radians), echoed to other clients
    pub look_yaw: f32,
    /// Camera pitch (radians)
    pub look_pitch: f32,
    /// Client-driven animation tag, echoed verbatim
    pub anim_state: String,
    /// Client-driven animation clock
    pub anim_time: f32,
    /// Sprint held
    pub sprint: bool,
    /// Attack requested
    pub attack: bool,
    /// Interact requested
    pub interact: bool,
    /// Jump requested
    pub jump: bool,
    /// Crouch held
    pub crouch: bool,
    /// Ragdoll toggled on
    pub ragdoll: bool,
}

impl InputFrame {
    /// Create an idle frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create input with a movement direction.
    pub fn with_movement(move_x: f32, move_z: f32) -> Self {
        Self {
            move_x,
            move_z,
            ..Self::default()
        }
        .sanitize()
    }

    /// Coerce every field into its valid range.
    ///
    /// Non-finite numbers become 0, a movement vector longer than 1 is
    /// rescaled to exactly 1, pitch is clamped, and the animation tag is
    /// truncated on a character boundary.
    pub fn sanitize(mut self) -> Self {
        self.move_x = finite_or_zero(self.move_x);
        self.move_z = finite_or_zero(self.move_z);

        let len_sq = self.move_x * self.move_x + self.move_z * self.move_z;
        if len_sq > 1.0 {
            let len = len_sq.sqrt();
            self.move_x /= len;
            self.move_z /= len;
        }

        self.look_yaw = finite_or_zero(self.look_yaw);
        self.look_pitch = finite_or_zero(self.look_pitch).clamp(-FRAC_PI_2, FRAC_PI_2);
        self.anim_time = finite_or_zero(self.anim_time).max(0.0);

        if self.anim_state.chars().count() > MAX_ANIM_STATE_LEN {
            self.anim_state = self.anim_state.chars().take(MAX_ANIM_STATE_LEN).collect();
        }

        self
    }

    /// Movement stick magnitude in [0, 1].
    #[inline]
    pub fn move_magnitude(&self) -> f32 {
        (self.move_x * self.move_x + self.move_z * self.move_z).sqrt()
    }

    /// Check if the movement stick is released.
    #[inline]
    pub fn is_idle_stick(&self) -> bool {
        self.move_magnitude() < INPUT_DEADZONE
    }
}

#[inline]
fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// =============================================================================
// INPUT SLOT
// =============================================================================

/// Latest-wins mailbox for one session.
///
/// Holds exactly the newest accepted frame. It is never cleared between
/// ticks, so a quiet client keeps being simulated with its last input.
#[derive(Clone, Debug, Default)]
pub struct InputSlot {
    latest: Option<InputFrame>,
    last_seq: Option<u64>,
}

impl InputSlot {
    /// Offer a frame; returns false if `seq` is not newer than the last accepted one.
    pub fn offer(&mut self, seq: u64, frame: InputFrame) -> bool {
        if self.last_seq.is_some_and(|last| seq <= last) {
            return false;
        }
        self.last_seq = Some(seq);
        self.latest = Some(frame.sanitize());
        true
    }

    /// Newest accepted frame, if any.
    pub fn latest(&self) -> Option<&InputFrame> {
        self.latest.as_ref()
    }

    /// Sequence number of the newest accepted frame.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }
}

// =============================================================================
// INPUT BUFFER
// =============================================================================

/// Per-session input slots keyed by player/connection id.
///
/// Only sessions opened on join accept input; frames for unknown ids are
/// dropped silently.
#[derive(Clone, Debug, Default)]
pub struct InputBuffer {
    slots: BTreeMap<PlayerId, InputSlot>,
}

impl InputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for a joining session.
    pub fn open(&mut self, player_id: PlayerId) {
        self.slots.entry(player_id).or_default();
    }

    /// Discard a leaving session's slot.
    pub fn close(&mut self, player_id: &PlayerId) -> bool {
        self.slots.remove(player_id).is_some()
    }

    /// Offer a frame to a session. Returns whether it was accepted.
    pub fn offer(&mut self, player_id: &PlayerId, seq: u64, frame: InputFrame) -> bool {
        match self.slots.get_mut(player_id) {
            Some(slot) => slot.offer(seq, frame),
            None => false,
        }
    }

    /// Newest accepted frame for a session.
    pub fn latest(&self, player_id: &PlayerId) -> Option<&InputFrame> {
        self.slots.get(player_id).and_then(InputSlot::latest)
    }

    /// Slot for a session.
    pub fn slot(&self, player_id: &PlayerId) -> Option<&InputSlot> {
        self.slots.get(player_id)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no session is open.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
