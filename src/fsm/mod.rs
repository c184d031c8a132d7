//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │  StateTable                                        │
//! │  ┌───────────────┬───────────┬───────────────────┐ │
//! │  │ ContactorState│ on_enter  │ on_update         │ │
//! │  ├───────────────┼───────────┼───────────────────┤ │
//! │  │ Disconnected  │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  │ Connecting    │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  │ Connected     │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  │ Faulting      │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  │ Faulted       │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  │ Resetting     │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  │ Disconnecting │ fn(ctx)   │ fn(ctx)->Option<> │ │
//! │  └───────────────┴───────────┴───────────────────┘ │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is stepped once per wake of the control task, after the
//! event handler for that wake has run.  `on_update` of the current
//! state may return `Some(next)`; the engine then runs `on_enter` for
//! the next state.  At most one transition happens per step.  States
//! have no exit actions.

pub mod context;
pub mod states;

use context::ContactorContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Contactor states.  The discriminant is the code reported on the bus.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContactorState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Faulting = 3,
    Faulted = 4,
    Resetting = 5,
    Disconnecting = 6,
}

impl ContactorState {
    pub const COUNT: usize = 7;

    /// Convert a table index back to a state.  Out-of-range indices
    /// assert in debug builds and fall back to `Faulted`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Faulting,
            4 => Self::Faulted,
            5 => Self::Resetting,
            6 => Self::Disconnecting,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Faulted
            }
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// States in which a fault code is recorded.
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Faulting | Self::Faulted)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` actions.
pub type StateActionFn = fn(&mut ContactorContext);

/// Per-step update.  Returns `Some(next)` to transition.
pub type StateUpdateFn = fn(&mut ContactorContext) -> Option<ContactorState>;

/// One row of the state table.
pub struct StateDescriptor {
    pub id: ContactorState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `ContactorState as usize`.
    table: [StateDescriptor; ContactorState::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; ContactorState::COUNT], initial: ContactorState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first `step()`.
    pub fn start(&mut self, ctx: &mut ContactorContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state = self.current_state();
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one step.  Returns the state after the step.
    pub fn step(&mut self, ctx: &mut ContactorContext) -> ContactorState {
        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
        self.current_state()
    }

    pub fn current_state(&self) -> ContactorState {
        ContactorState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: ContactorState, ctx: &mut ContactorContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        self.current = next_idx;
        ctx.state = next_id;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
