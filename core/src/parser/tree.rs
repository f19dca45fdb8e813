//! Parse tree data model (spec.md §3 "Script (parse tree)", "ParseOperator").
//!
//! Operators live in one flat arena (`ParseTree::operators`) and are
//! referenced by index (`OpId`) everywhere else — labels, modulator lists,
//! carrier lists, and composite back-references all resolve through this
//! arena rather than through pointers, the Rust-safe equivalent of the
//! historical pool-backed node graph (see `sau_engine::MemoryPool`, used one
//! layer down by the built `Program`'s `IdArr`s).

use sau_engine::{RampSpec, WaveId};

use crate::symtab::SymbolId;

pub type OpId = usize;

/// Bits of `ParseOperator::flags` (spec.md §3 "Flags include NESTED,
/// MULTIPLE, HAS_COMPOSITE, LATER_USED").
pub mod op_flags {
    /// The operator occurs inside a modulator list, not at top level.
    pub const NESTED: u8 = 1 << 0;
    /// This node is a bind-multiple set (`@[...]`) rather than a single
    /// operator; `ParseOperator::members` holds the set.
    pub const MULTIPLE: u8 = 1 << 1;
    /// This operator has at least one composite (`;`) follow-on sub-event.
    pub const HAS_COMPOSITE: u8 = 1 << 2;
    /// This operator's label is referenced again later in the script.
    pub const LATER_USED: u8 = 1 << 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModUse {
    Fm,
    Pm,
    Am,
}

/// One modulator sub-list attached to an operator (spec.md §4.4 "a list of
/// child modulator lists each tagged by use").
#[derive(Debug, Clone)]
pub struct ModList {
    pub use_: ModUse,
    /// `[-...]` extends the previous list instead of replacing it (spec.md
    /// §4.4 "append flag").
    pub append: bool,
    pub members: Vec<OpId>,
}

/// Time-with-flags, mirroring `sau_engine::program::TimeSpec` one layer
/// before it is finalised (the timing resolver still needs to distinguish
/// "never set" from "set to zero").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeSpec {
    pub ms: u32,
    pub set: bool,
    pub implicit: bool,
    pub default: bool,
}

#[derive(Debug, Clone)]
pub struct ParseOperator {
    pub label: Option<SymbolId>,
    pub wave: Option<WaveId>,
    pub time: TimeSpec,
    pub silence_ms: u32,
    pub silence_added: bool,
    pub amp: RampSpec,
    pub amp2: RampSpec,
    pub freq: RampSpec,
    pub freq2: RampSpec,
    pub phase: f32,
    pub mods: Vec<ModList>,
    /// The previous operator sharing this one's logical identity (same
    /// label, reached via `@label`), if any (spec.md §3 "a back-reference
    /// to a prior operator of the same logical identity").
    pub prior: Option<OpId>,
    pub flags: u8,
    /// Populated only for `MULTIPLE` nodes (`@[...]` bind-sets).
    pub members: Vec<OpId>,
    /// Bitmask (`sau_engine::program::param_mask`) of which fields this
    /// statement actually set, as opposed to left at their struct default.
    /// The program builder needs this to tell "explicitly set to zero"
    /// apart from "inherited from the previous event" when an `@label`
    /// update only touches some of an operator's parameters.
    pub changed: u32,
}

impl Default for ParseOperator {
    fn default() -> Self {
        ParseOperator {
            label: None,
            wave: None,
            time: TimeSpec::default(),
            silence_ms: 0,
            silence_added: false,
            amp: RampSpec::default(),
            amp2: RampSpec::default(),
            freq: RampSpec::default(),
            freq2: RampSpec::default(),
            phase: 0.0,
            mods: Vec::new(),
            prior: None,
            flags: 0,
            members: Vec::new(),
            changed: 0,
        }
    }
}

impl ParseOperator {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u8) {
        self.flags |= flag;
    }

    pub fn mark_changed(&mut self, mask: u32) {
        self.changed |= mask;
    }
}

/// One time-advancing construct in the script (spec.md §3 "ParseEvent").
#[derive(Debug, Clone, Default)]
pub struct ParseEvent {
    pub wait_ms: u32,
    /// Operators introduced or updated at this event. For a voice-root
    /// event these are the voice's carriers.
    pub operators: Vec<OpId>,
    /// A prior event for the same voice, if this event updates rather than
    /// begins a voice.
    pub voice_predecessor: Option<usize>,
    /// Head of this event's composite ("forks") chain, indexing into
    /// `ParseTree::forks` (spec.md §3 "an optional pointer to a 'composite'
    /// follow-on event chain").
    pub composite: Option<usize>,
    /// If this event opens or continues a `{ ... }` duration group, the
    /// index of the group's first event.
    pub group_start: Option<usize>,
    /// Per-voice panning ramp published at this event, if changed.
    pub pan: Option<RampSpec>,
    /// Set when a `\t` ("one full duration") wait needs this event's
    /// resolved operator time added to the next event's wait once timing
    /// resolution knows that time (spec.md §4.5 Pass 1).
    pub add_wait_duration: bool,
    /// `(start, end)` range of operator-arena indices freshly pushed while
    /// parsing this statement (the top-level operator plus any nested
    /// operators defined inline in its modulator brackets). A plain tuple
    /// rather than `std::ops::Range` so `ParseEvent` keeps deriving
    /// `Default`. The program builder (C6) uses this, not `operators`, to
    /// decide which operators need a published `OperatorData` at this
    /// event — an `@label` reference named only inside a modulator bracket
    /// reuses an existing arena slot and must *not* be republished (that
    /// would replay its original creation parameters over whatever the
    /// runtime has since done with it).
    pub new_ops: (OpId, OpId),
}

impl ParseEvent {
    /// The freshly introduced operator range as an iterable `Range`.
    pub fn new_ops_range(&self) -> std::ops::Range<OpId> {
        self.new_ops.0..self.new_ops.1
    }
}

impl ParseEvent {
    pub fn new(wait_ms: u32) -> ParseEvent {
        ParseEvent {
            wait_ms,
            ..Default::default()
        }
    }
}

/// A sub-event in a composite (`;`) chain, stored out of line in
/// `ParseTree::forks` so the main `events` vector stays linear until the
/// timing resolver's flatten pass splices forks back in (spec.md §4.5 Pass
/// 4).
#[derive(Debug, Clone, Default)]
pub struct ForkEvent {
    pub wait_ms: u32,
    pub operator: OpId,
    /// The next sub-event in this composite chain, if `;` repeats.
    pub next: Option<usize>,
    /// Same meaning as `ParseEvent::new_ops` (see there).
    pub new_ops: (OpId, OpId),
}

impl ForkEvent {
    pub fn new_ops_range(&self) -> std::ops::Range<OpId> {
        self.new_ops.0..self.new_ops.1
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseTree {
    pub operators: Vec<ParseOperator>,
    pub events: Vec<ParseEvent>,
    pub forks: Vec<ForkEvent>,
}

impl ParseTree {
    pub fn new() -> ParseTree {
        ParseTree::default()
    }

    pub fn push_operator(&mut self, op: ParseOperator) -> OpId {
        self.operators.push(op);
        self.operators.len() - 1
    }

    pub fn op(&self, id: OpId) -> &ParseOperator {
        &self.operators[id]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut ParseOperator {
        &mut self.operators[id]
    }
}
