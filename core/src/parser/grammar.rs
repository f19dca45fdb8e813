//! Token-level grammar (spec.md §4.4 table of top-level tokens and per-op
//! letters). Scope-based: a scope is opened by `{ ... }` (duration group),
//! `[ ... ]` (modulator-list nest), or the implicit top level.
//!
//! Ramp-goal brackets (`value[shape time target]`) and modulator-list
//! brackets (`,w[ ... ]` / `p[ ... ]`) both use `[...]`; this grammar
//! disambiguates them positionally — a bracket immediately after a bare
//! value is always a ramp goal, a bracket after `,w` or after a bare `p`/`P`
//! with no preceding value is always a modulator (or pan-ramp) list. This
//! positional rule, and the `S<letter><value>` settings-key scheme below,
//! are this crate's concrete choice where spec.md §4.4 only sketches the
//! token shapes (see DESIGN.md).

use sau_engine::program::param_mask;
use sau_engine::{RampShape, RampSpec, WaveId};

use crate::diagnostics::Diagnostics;
use crate::error::ParseError;
use crate::notes::parse_note_name;
use crate::numeric::eval_expr;
use crate::reader::Reader;
use crate::symtab::{Item, SymbolTable};

use super::tree::{op_flags, ForkEvent, ModList, ModUse, OpId, ParseEvent, ParseOperator, ParseTree, TimeSpec};

const COMPONENT: &str = "parser";

/// Script-wide defaults set by the `S` settings scope (spec.md §4.4
/// "Settings scope: sets script defaults").
#[derive(Debug, Clone, Copy)]
pub struct ScriptSettings {
    pub a4_hz: f64,
    pub def_time_ms: u32,
    pub def_freq: f64,
    pub def_ratio: bool,
    /// `None` until the script sets an explicit amplitude multiplier via
    /// `Sa<value>`; its presence is what spec.md §3 calls "the AMPMULT
    /// option" and suppresses the generator's automatic per-voice division.
    pub ampmult: Option<f64>,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        ScriptSettings {
            a4_hz: 440.0,
            def_time_ms: 1000,
            def_freq: 440.0,
            def_ratio: false,
            ampmult: None,
        }
    }
}

pub struct ParseOutput {
    pub tree: ParseTree,
    pub settings: ScriptSettings,
}

struct Parser<'a> {
    r: Reader,
    symtab: SymbolTable,
    tree: ParseTree,
    settings: ScriptSettings,
    diag: &'a Diagnostics,
    /// Event index that began the duration group currently open, if any
    /// (spec.md §4.5 Pass 3 "A group back-reference spans an inclusive
    /// slice of events").
    group_start: Option<usize>,
    /// Event index that began the current `|`-delimited sub-run of the
    /// open duration group, for the hard time barrier's timeline flush
    /// (spec.md §4.4 "`|` hard time barrier").
    group_sub_start: Option<usize>,
    /// The most recently completed top-level event, for voice-predecessor
    /// linking when `@label` updates an existing carrier.
    last_voice_event: Option<usize>,
    /// Accumulated wait-ms from `\t` / `\n.nn` tokens not yet attached to
    /// an event.
    pending_wait: u32,
    /// A `P<value>[...]` pan ramp parsed before the event it belongs to
    /// has been created.
    pending_pan: Option<RampSpec>,
}

pub fn parse_script(source: &str, file_name: &str, diag: &Diagnostics) -> ParseOutput {
    parse_reader(Reader::from_str_named(source, file_name.to_string()), diag)
}

/// As [`parse_script`], but reads the source text from disk first (spec.md
/// §6 "Script input contract": `read_script(source)` where `source` is
/// either a path or an in-memory string). The only way this can fail is an
/// I/O error opening/reading the file, which spec.md §7 classifies as fatal
/// ("ReaderIOError ... fatal to parse") rather than a recoverable warning.
pub fn parse_script_path(path: impl AsRef<std::path::Path>, diag: &Diagnostics) -> Result<ParseOutput, ParseError> {
    let reader = Reader::from_path(path).map_err(|e| ParseError::Io(e.to_string()))?;
    Ok(parse_reader(reader, diag))
}

fn parse_reader(r: Reader, diag: &Diagnostics) -> ParseOutput {
    let mut p = Parser {
        r,
        symtab: SymbolTable::new(),
        tree: ParseTree::new(),
        settings: ScriptSettings::default(),
        diag,
        group_start: None,
        group_sub_start: None,
        last_voice_event: None,
        pending_wait: 0,
        pending_pan: None,
    };
    p.run();
    ParseOutput {
        tree: p.tree,
        settings: p.settings,
    }
}

impl<'a> Parser<'a> {
    fn warn(&self, message: impl Into<String>) {
        self.diag.warning(COMPONENT, self.r.file_name(), self.r.line(), Some(self.r.col()), message);
    }

    fn run(&mut self) {
        loop {
            self.skip_inert();
            match self.r.peek() {
                None => break,
                Some('Q') => {
                    self.r.next();
                    break;
                }
                Some('S') => {
                    self.r.next();
                    self.parse_settings();
                }
                Some('{') => {
                    self.r.next();
                    self.group_start = Some(self.tree.events.len());
                    self.group_sub_start = Some(self.tree.events.len());
                }
                Some('}') => {
                    self.r.next();
                    self.flush_duration_barrier();
                    self.group_start = None;
                    self.group_sub_start = None;
                }
                Some('|') => {
                    self.r.next();
                    self.flush_duration_barrier();
                }
                Some('\t') => {
                    self.r.next();
                    self.push_wait_full_duration();
                }
                Some('\n') => {
                    self.r.next();
                    self.parse_newline_wait();
                }
                Some('\'') => {
                    self.r.next();
                    let name = self.r.read_ident();
                    self.parse_labeled_statement(name);
                }
                Some('@') => {
                    self.r.next();
                    self.parse_reference_statement();
                }
                Some(c) if c.is_ascii_uppercase() => {
                    self.parse_new_operator_statement(None);
                }
                Some(c) => {
                    self.warn(ParseError::Unexpected(c).to_string());
                    self.r.next();
                }
            }
        }
    }

    /// Whitespace that never itself begins a token (plain spaces; `\n`/`\t`
    /// are handled explicitly since they carry timing meaning).
    fn skip_inert(&mut self) {
        self.r.skip_spaces();
    }

    fn parse_settings(&mut self) {
        loop {
            self.skip_inert();
            match self.r.peek() {
                Some(c) if c.is_ascii_alphabetic() => {
                    self.r.next();
                    let value = eval_expr(&mut self.r, self.settings.a4_hz).ok();
                    match (c, value) {
                        ('a', Some(v)) => self.settings.ampmult = Some(v),
                        ('t', Some(v)) => self.settings.def_time_ms = v.max(0.0) as u32,
                        ('f', Some(v)) => self.settings.def_freq = v,
                        ('r', Some(v)) => self.settings.def_ratio = v != 0.0,
                        ('n', Some(v)) => self.settings.a4_hz = v,
                        _ => self.warn("malformed settings entry"),
                    }
                }
                _ => break,
            }
        }
    }

    fn push_wait_full_duration(&mut self) {
        if let Some(ev) = self.tree.events.last_mut() {
            ev.add_wait_duration = true;
        }
    }

    /// `|` hard time barrier, and a `{ ... }` group's close: the events
    /// since the last barrier (or the group's open) ran concurrently, so
    /// whatever comes next must wait out the longest of them (spec.md §4.5
    /// Pass 3 "longest time plus the remaining wait"). Every operator here
    /// already carries its resolved-or-default `time.ms` at parse time
    /// (explicit `t` sets it directly; an untouched operator still holds
    /// the settings scope's default), so the barrier can fold it straight
    /// into `pending_wait` without waiting on the timing resolver.
    fn flush_duration_barrier(&mut self) {
        let Some(start) = self.group_sub_start else {
            return;
        };
        let end = self.tree.events.len();
        let mut longest = 0u32;
        for ev in &self.tree.events[start..end] {
            for &op_id in &ev.operators {
                longest = longest.max(self.tree.op(op_id).time.ms);
            }
        }
        self.pending_wait = self.pending_wait.saturating_add(longest);
        self.group_sub_start = Some(end);
    }

    fn parse_newline_wait(&mut self) {
        if self.r.peek() == Some('.') {
            self.r.next();
            if let Some(ms) = self.r.read_f64() {
                self.pending_wait = self.pending_wait.saturating_add((ms.max(0.0)) as u32);
            }
        }
    }

    fn parse_labeled_statement(&mut self, name: String) {
        self.skip_inert();
        match self.r.peek() {
            Some(c) if c.is_ascii_uppercase() => {
                self.parse_new_operator_statement(Some(name));
            }
            _ => self.warn(ParseError::TruncatedLabel.to_string()),
        }
    }

    fn parse_reference_statement(&mut self) {
        if self.r.peek() == Some('[') {
            self.parse_bind_multiple_statement();
            return;
        }
        let new_ops_start = self.tree.operators.len();
        let name = self.r.read_ident();
        let prior = self.symtab.find_item_by_text(&name).map(|Item::Operator(id)| id as OpId);
        let Some(prior) = prior else {
            self.warn(ParseError::UndefinedLabel(name).to_string());
            return;
        };
        let label = self.symtab.intern(&name);
        let op = ParseOperator {
            label: Some(label),
            prior: Some(prior),
            ..ParseOperator::default()
        };
        let op_id = self.tree.push_operator(op);
        self.parse_op_params(op_id);
        self.finish_voice_event(op_id, true, new_ops_start);
    }

    fn parse_bind_multiple_statement(&mut self) {
        let new_ops_start = self.tree.operators.len();
        self.r.next(); // consume '['
        let mut members = Vec::new();
        loop {
            self.skip_inert();
            match self.r.peek() {
                Some(']') => {
                    self.r.next();
                    break;
                }
                None => break,
                _ => {
                    if let Some(id) = self.parse_modulator_operand() {
                        members.push(id);
                    } else {
                        self.r.next();
                    }
                }
            }
        }
        let op = ParseOperator {
            flags: op_flags::MULTIPLE,
            members,
            ..ParseOperator::default()
        };
        let op_id = self.tree.push_operator(op);
        self.finish_voice_event(op_id, false, new_ops_start);
    }

    fn parse_new_operator_statement(&mut self, label: Option<String>) {
        let new_ops_start = self.tree.operators.len();
        let Some(op_id) = self.parse_operator_head(false) else {
            return;
        };
        if let Some(name) = label {
            let sym = self.symtab.intern(&name);
            self.tree.op_mut(op_id).label = Some(sym);
            self.symtab.add_item(sym, Item::Operator(op_id as u32));
        }
        self.parse_op_params(op_id);
        self.finish_voice_event(op_id, false, new_ops_start);

        // Composite chain: `;` begins a sub-event updating the same operator.
        while self.r.peek() == Some(';') {
            self.r.next();
            self.parse_composite_sub_event(op_id);
        }
    }

    /// Reads `Owave` and allocates a fresh operator node; returns `None` on
    /// a malformed wave name (already warned).
    fn parse_operator_head(&mut self, nested: bool) -> Option<OpId> {
        self.r.next(); // consume 'O'
        let name = self.r.read_ident();
        let Some(wave) = WaveId::from_name(&name) else {
            self.warn(ParseError::InvalidWave(name).to_string());
            return None;
        };
        let mut op = ParseOperator {
            wave: Some(wave),
            freq: RampSpec {
                ratio: self.settings.def_ratio,
                ..RampSpec::constant(self.settings.def_freq)
            },
            amp: RampSpec::constant(1.0),
            time: TimeSpec {
                ms: self.settings.def_time_ms,
                set: false,
                implicit: false,
                default: true,
            },
            ..ParseOperator::default()
        };
        if nested {
            op.set_flag(op_flags::NESTED);
        }
        Some(self.tree.push_operator(op))
    }

    fn parse_composite_sub_event(&mut self, parent: OpId) {
        self.tree.op_mut(parent).set_flag(op_flags::HAS_COMPOSITE);
        self.skip_inert();
        let wait_ms = self.take_pending_wait();
        let new_ops_start = self.tree.operators.len();
        let mut wave = self.tree.op(parent).wave;
        // A composite step may restate its operator head (`Wsin t1000 ;
        // Wsin t2000`) rather than bare parameters; consume it here so the
        // restated wave and params land on this sub-event's own operator
        // instead of being left for `run()` to mistake for a new voice.
        if matches!(self.r.peek(), Some(c) if c.is_ascii_uppercase()) {
            self.r.next();
            let name = self.r.read_ident();
            match WaveId::from_name(&name) {
                Some(w) => wave = Some(w),
                None => self.warn(ParseError::InvalidWave(name).to_string()),
            }
        }
        let sub = ParseOperator {
            prior: Some(parent),
            wave,
            ..ParseOperator::default()
        };
        let sub_id = self.tree.push_operator(sub);
        self.parse_op_params(sub_id);

        let fork = ForkEvent {
            wait_ms,
            operator: sub_id,
            next: None,
            new_ops: (new_ops_start, self.tree.operators.len()),
        };
        let fork_idx = self.tree.forks.len();
        self.tree.forks.push(fork);

        if let Some(ev) = self.tree.events.last_mut() {
            match ev.composite {
                None => ev.composite = Some(fork_idx),
                Some(head) => {
                    let mut cur = head;
                    while let Some(next) = self.tree.forks[cur].next {
                        cur = next;
                    }
                    self.tree.forks[cur].next = Some(fork_idx);
                }
            }
        }
    }

    /// Operand inside a modulator/bind-multiple list: either a fresh
    /// `Owave` or an `@label` reference.
    fn parse_modulator_operand(&mut self) -> Option<OpId> {
        match self.r.peek() {
            Some(c) if c.is_ascii_uppercase() => {
                let op_id = self.parse_operator_head(true)?;
                self.parse_op_params(op_id);
                Some(op_id)
            }
            Some('@') => {
                self.r.next();
                let name = self.r.read_ident();
                let prior = self.symtab.find_item_by_text(&name).map(|Item::Operator(id)| id as OpId);
                match prior {
                    Some(id) => Some(id),
                    None => {
                        self.warn(ParseError::UndefinedLabel(name).to_string());
                        None
                    }
                }
            }
            _ => None,
        }
    }

    fn parse_op_params(&mut self, op_id: OpId) {
        loop {
            self.skip_inert();
            match self.r.peek() {
                Some('w') => {
                    self.r.next();
                    let name = self.r.read_ident();
                    match WaveId::from_name(&name) {
                        Some(w) => {
                            let op = self.tree.op_mut(op_id);
                            op.wave = Some(w);
                            op.mark_changed(param_mask::WAVE);
                        }
                        None => self.warn(ParseError::InvalidWave(name).to_string()),
                    }
                }
                Some('f') => {
                    self.r.next();
                    self.parse_value_letter(op_id, ValueField::Freq, ModUse::Fm);
                }
                Some('r') => {
                    self.r.next();
                    self.parse_value_letter(op_id, ValueField::Freq2, ModUse::Fm);
                }
                Some('a') => {
                    self.r.next();
                    self.parse_value_letter(op_id, ValueField::Amp, ModUse::Am);
                }
                Some('p') => {
                    self.r.next();
                    self.parse_phase_letter(op_id);
                }
                Some('s') => {
                    self.r.next();
                    if let Some(v) = eval_expr(&mut self.r, self.settings.a4_hz).ok() {
                        let op = self.tree.op_mut(op_id);
                        op.silence_ms = v.max(0.0) as u32;
                        op.mark_changed(param_mask::SILENCE);
                    }
                }
                Some('t') => {
                    self.r.next();
                    if let Some(v) = eval_expr(&mut self.r, self.settings.a4_hz).ok() {
                        let op = self.tree.op_mut(op_id);
                        op.time.ms = v.max(0.0) as u32;
                        op.time.set = true;
                        op.time.default = false;
                        op.mark_changed(param_mask::TIME);
                    }
                }
                Some('P') => {
                    self.r.next();
                    self.parse_pan_letter();
                }
                _ => break,
            }
        }
    }

    fn parse_phase_letter(&mut self, op_id: OpId) {
        self.skip_inert();
        match self.r.peek() {
            Some(c) if c.is_ascii_digit() || c == '.' || c == '-' => {
                if let Some(v) = eval_expr(&mut self.r, self.settings.a4_hz).ok() {
                    let op = self.tree.op_mut(op_id);
                    op.phase = v as f32;
                    op.mark_changed(param_mask::PHASE);
                }
            }
            Some('[') => {
                let list = self.parse_modulator_bracket(ModUse::Pm);
                let op = self.tree.op_mut(op_id);
                op.mods.push(list);
                op.mark_changed(param_mask::PMODS);
            }
            _ => {}
        }
    }

    fn parse_pan_letter(&mut self) {
        self.skip_inert();
        let Some(value) = eval_expr(&mut self.r, self.settings.a4_hz).ok() else {
            return;
        };
        let mut spec = RampSpec::constant(value.clamp(0.0, 1.0));
        self.maybe_parse_ramp_goal(&mut spec);
        if let Some(ev) = self.tree.events.last_mut() {
            ev.pan = Some(spec);
        } else {
            self.pending_pan = Some(spec);
        }
    }

    fn parse_value_letter(&mut self, op_id: OpId, field: ValueField, use_: ModUse) {
        self.skip_inert();
        let value = match self.r.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                let ident = self.r.read_ident();
                match parse_note_name(&ident) {
                    Some(note) => note.to_hz(self.settings.a4_hz),
                    None => {
                        self.warn(ParseError::BadNote(ident).to_string());
                        return;
                    }
                }
            }
            _ => match eval_expr(&mut self.r, self.settings.a4_hz) {
                Ok(v) => v,
                Err(_) => return,
            },
        };
        let mut spec = RampSpec::constant(value);
        if matches!(field, ValueField::Freq | ValueField::Freq2) {
            spec.ratio = self.settings.def_ratio;
        }
        self.maybe_parse_ramp_goal(&mut spec);
        self.store_value_field(op_id, field, spec);

        // `,w[...]` attaches a modulator list (spec.md §4.4).
        if self.r.peek() == Some(',') {
            self.r.next();
            if self.r.peek() == Some('w') {
                self.r.next();
                let list = self.parse_modulator_bracket(use_);
                let op = self.tree.op_mut(op_id);
                let mods_mask = match use_ {
                    ModUse::Fm => param_mask::FMODS,
                    ModUse::Pm => param_mask::PMODS,
                    ModUse::Am => param_mask::AMODS,
                };
                op.mods.push(list);
                op.mark_changed(mods_mask);
            } else {
                self.r.unget();
            }
        }
    }

    fn store_value_field(&mut self, op_id: OpId, field: ValueField, spec: RampSpec) {
        let op = self.tree.op_mut(op_id);
        match field {
            ValueField::Freq => {
                op.freq = spec;
                op.mark_changed(param_mask::FREQ);
            }
            ValueField::Freq2 => {
                op.freq2 = spec;
                op.mark_changed(param_mask::FREQ2);
            }
            ValueField::Amp => {
                op.amp = spec;
                op.mark_changed(param_mask::AMP);
            }
        }
    }

    /// `value[shape time target]` — a ramp goal directly following a base
    /// value (spec.md §4.4 "Ramp parameter list: fill type, time, target
    /// value").
    fn maybe_parse_ramp_goal(&mut self, spec: &mut RampSpec) {
        if self.r.peek() != Some('[') {
            return;
        }
        self.r.next();
        self.skip_inert();
        let shape_name = self.r.read_ident();
        spec.shape = RampShape::from_name(&shape_name).unwrap_or_else(|| {
            self.warn(ParseError::InvalidRampShape(shape_name).to_string());
            RampShape::default()
        });
        loop {
            self.skip_inert();
            match self.r.peek() {
                Some(']') => {
                    self.r.next();
                    break;
                }
                Some('t') => {
                    self.r.next();
                    if let Some(v) = eval_expr(&mut self.r, self.settings.a4_hz).ok() {
                        spec.time_ms = Some(v.max(0.0) as u32);
                    }
                }
                Some('v') => {
                    self.r.next();
                    if let Some(v) = eval_expr(&mut self.r, self.settings.a4_hz).ok() {
                        spec.goal = Some(v);
                    }
                }
                None => break,
                _ => {
                    self.r.next();
                }
            }
        }
    }

    /// `[ ... ]` / `[-...]` modulator list: zero or more nested operators or
    /// `@label` references (spec.md §4.4).
    fn parse_modulator_bracket(&mut self, use_: ModUse) -> ModList {
        self.skip_inert();
        if self.r.peek() != Some('[') {
            return ModList { use_, append: false, members: Vec::new() };
        }
        self.r.next();
        self.skip_inert();
        let append = if self.r.peek() == Some('-') {
            self.r.next();
            true
        } else {
            false
        };
        let mut members = Vec::new();
        loop {
            self.skip_inert();
            match self.r.peek() {
                Some(']') => {
                    self.r.next();
                    break;
                }
                None => break,
                _ => {
                    if let Some(id) = self.parse_modulator_operand() {
                        members.push(id);
                    } else {
                        self.r.next();
                    }
                }
            }
        }
        ModList { use_, append, members }
    }

    fn take_pending_wait(&mut self) -> u32 {
        let w = self.pending_wait;
        self.pending_wait = 0;
        w
    }

    fn finish_voice_event(&mut self, op_id: OpId, is_update: bool, new_ops_start: usize) {
        let wait_ms = self.take_pending_wait();
        let mut ev = ParseEvent::new(wait_ms);
        ev.operators.push(op_id);
        ev.group_start = self.group_start;
        ev.pan = self.pending_pan.take();
        ev.new_ops = (new_ops_start, self.tree.operators.len());
        if is_update {
            ev.voice_predecessor = self.last_voice_event;
        }
        self.tree.events.push(ev);
        self.last_voice_event = Some(self.tree.events.len() - 1);
    }
}

#[derive(Debug, Clone, Copy)]
enum ValueField {
    Freq,
    Freq2,
    Amp,
}
