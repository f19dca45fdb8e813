//! Post-parse timing resolution (spec.md §4.5 "Timing resolver (C5)").
//!
//! Runs four passes over a freshly parsed [`ParseTree`], mutating it in
//! place, until every operator has a time with `SET`, every event's wait is
//! non-negative (already guaranteed by the parser, which never produces a
//! negative wait), and the event list is strictly linear (composite forks
//! spliced into the main sequence).
//!
//! The passes are intentionally kept separate and run over `&mut ParseTree`
//! rather than folded into one functional traversal (spec.md §9 suggests a
//! single-pass rewrite as a possible future simplification) because pass 3
//! needs two full walks of its own and pass 4 needs the *results* of passes
//! 1-3 to compute absolute splice positions; keeping them apart keeps each
//! one testable on its own.

use sau_engine::program::param_mask;

use crate::parser::tree::{op_flags, OpId, ParseEvent, ParseTree, TimeSpec};

/// Runs all four timing-resolution passes and returns the flattened,
/// linear event sequence (spec.md §4.5).
pub fn resolve_timing(tree: &mut ParseTree) -> Vec<ParseEvent> {
    resolve_event_timing(tree);
    resolve_composite_chains(tree);
    resolve_duration_groups(tree);
    finalize_default_times(tree);
    flatten_composites(tree)
}

/// Every operator not covered by one of the three passes above (a top-level
/// event outside any duration group, never given an explicit `t`) still
/// carries a perfectly good value in `time.ms` — the script's or settings
/// scope's default duration — it just never had its SET flag raised. Raise
/// it now so the resolver's output-side invariant (spec.md §8 "every
/// operator has TIME set after timing resolution") holds unconditionally.
fn finalize_default_times(tree: &mut ParseTree) {
    for op in &mut tree.operators {
        op.time.set = true;
    }
}

/// Pass 1 — per-event operator timing (spec.md §4.5 "time_event").
fn resolve_event_timing(tree: &mut ParseTree) {
    for event_idx in 0..tree.events.len() {
        let ops = tree.events[event_idx].operators.clone();
        for op_id in ops {
            time_operator(tree, op_id);
        }
        if tree.events[event_idx].add_wait_duration {
            let added = tree.events[event_idx]
                .operators
                .iter()
                .map(|&id| tree.op(id).time.ms)
                .max()
                .unwrap_or(0);
            if let Some(next) = tree.events.get_mut(event_idx + 1) {
                next.wait_ms = next.wait_ms.saturating_add(added);
            }
        }
    }
}

/// Times one operator and recurses into its modulator lists (including
/// bind-multiple sets), per spec.md §4.5 Pass 1 bullets.
fn time_operator(tree: &mut ParseTree, op_id: OpId) {
    {
        let op = tree.op_mut(op_id);
        if !op.time.set && op.has_flag(op_flags::NESTED) {
            op.time.implicit = true;
            op.time.set = true;
        }
    }

    if !tree.op(op_id).time.implicit {
        let op_time_ms = tree.op(op_id).time.ms;
        let op = tree.op_mut(op_id);
        for ramp in [&mut op.amp, &mut op.amp2, &mut op.freq, &mut op.freq2] {
            if ramp.goal.is_some() && ramp.time_ms.is_none() {
                ramp.time_ms = Some(op_time_ms);
            }
        }
    }

    {
        let op = tree.op_mut(op_id);
        if !op.silence_added {
            op.time.ms = op.time.ms.saturating_add(op.silence_ms);
            op.silence_added = true;
        }
    }

    let children: Vec<OpId> = tree
        .op(op_id)
        .mods
        .iter()
        .flat_map(|m| m.members.iter().copied())
        .chain(tree.op(op_id).members.iter().copied())
        .collect();
    for child in children {
        time_operator(tree, child);
    }
}

/// Pass 2 — composite ("forks") chains (spec.md §4.5 Pass 2).
fn resolve_composite_chains(tree: &mut ParseTree) {
    for event_idx in 0..tree.events.len() {
        let Some(head) = tree.events[event_idx].composite else {
            continue;
        };
        let Some(&parent_op_id) = tree.events[event_idx].operators.last() else {
            continue;
        };

        let mut prev_op_id = parent_op_id;
        let mut cur = Some(head);
        let mut total_added = 0u32;

        while let Some(fork_idx) = cur {
            let (wait_ms, sub_op_id, next) = {
                let f = &tree.forks[fork_idx];
                (f.wait_ms, f.operator, f.next)
            };
            let prev_time_ms = tree.op(prev_op_id).time.ms;
            let prev_silence_ms = tree.op(prev_op_id).silence_ms;

            let extended_wait = wait_ms.saturating_add(prev_time_ms);
            tree.forks[fork_idx].wait_ms = extended_wait;
            total_added = total_added.saturating_add(extended_wait);

            {
                // A sub-event that restated its own `t` keeps it; only a
                // sub-event silent on time inherits the chain's (spec.md
                // §4.5 Pass 2: "sub-events inherit" applies to unset time).
                let has_own_time = tree.op(sub_op_id).changed & param_mask::TIME != 0;
                let sub = tree.op_mut(sub_op_id);
                if !has_own_time {
                    if sub.has_flag(op_flags::NESTED) && next.is_none() {
                        sub.time = TimeSpec {
                            ms: 0,
                            set: true,
                            implicit: true,
                            default: false,
                        };
                    } else {
                        sub.time = TimeSpec {
                            ms: prev_time_ms.saturating_sub(prev_silence_ms),
                            set: true,
                            implicit: false,
                            default: false,
                        };
                    }
                }
                // Clear the TIME parameter bit on sub-events regardless (the
                // resolved value, whether inherited or restated, now lives
                // in `time`, not the change mask).
                sub.changed &= !param_mask::TIME;
            }
            time_operator(tree, sub_op_id);

            prev_op_id = sub_op_id;
            cur = next;
        }

        let parent = tree.op_mut(parent_op_id);
        parent.time.ms = parent.time.ms.saturating_add(total_added);
        parent.time.set = true;
    }
}

/// Pass 3 — duration groups (spec.md §4.5 Pass 3).
///
/// A `{ ... }` group is a contiguous run of events all carrying the same
/// `group_start` (the index of the group's first event).
fn resolve_duration_groups(tree: &mut ParseTree) {
    let mut i = 0;
    while i < tree.events.len() {
        let Some(start) = tree.events[i].group_start else {
            i += 1;
            continue;
        };
        let mut end = i;
        while end < tree.events.len() && tree.events[end].group_start == Some(start) {
            end += 1;
        }

        let mut longest = 0u32;
        for idx in i..end {
            for &op_id in &tree.events[idx].operators {
                longest = longest.max(tree.op(op_id).time.ms);
            }
        }

        for idx in i..end {
            let remaining_wait: u32 = tree.events[idx + 1..end].iter().map(|e| e.wait_ms).sum();
            let ops = tree.events[idx].operators.clone();
            for op_id in ops {
                let op = tree.op_mut(op_id);
                if op.time.default {
                    op.time.ms = longest.saturating_add(remaining_wait);
                    op.time.set = true;
                }
            }
        }

        i = end;
    }
}

/// Pass 4 — flatten composite chains into the main linear sequence (spec.md
/// §4.5 Pass 4).
///
/// Every main event and every composite sub-event is placed by its absolute
/// time (cumulative wait-ms from the start of the script) and re-emitted as
/// a plain, linear [`ParseEvent`] list with freshly recomputed deltas and
/// `voice_predecessor` links.
fn flatten_composites(tree: &ParseTree) -> Vec<ParseEvent> {
    struct Item {
        abs: u64,
        seq: usize,
        temp_id: usize,
        voice_link: Option<usize>,
        ev: ParseEvent,
    }

    let mut items: Vec<Item> = Vec::new();
    let mut main_temp_id = vec![0usize; tree.events.len()];
    let mut acc = 0u64;
    let mut seq = 0usize;

    for (i, ev) in tree.events.iter().enumerate() {
        acc = acc.saturating_add(ev.wait_ms as u64);
        let mut flat = ev.clone();
        flat.composite = None;

        let temp_id = items.len();
        main_temp_id[i] = temp_id;
        let voice_link = ev.voice_predecessor.map(|old_i| main_temp_id[old_i]);

        items.push(Item {
            abs: acc,
            seq,
            temp_id,
            voice_link,
            ev: flat,
        });
        seq += 1;

        if let Some(head) = ev.composite {
            let mut cur = Some(head);
            let mut running = acc;
            let mut prev_temp = temp_id;
            while let Some(fork_idx) = cur {
                let f = &tree.forks[fork_idx];
                running = running.saturating_add(f.wait_ms as u64);
                let sub_ev = ParseEvent {
                    wait_ms: 0,
                    operators: vec![f.operator],
                    voice_predecessor: None,
                    composite: None,
                    group_start: None,
                    pan: None,
                    add_wait_duration: false,
                    new_ops: f.new_ops,
                };
                seq += 1;
                let this_temp = items.len();
                items.push(Item {
                    abs: running,
                    seq,
                    temp_id: this_temp,
                    voice_link: Some(prev_temp),
                    ev: sub_ev,
                });
                prev_temp = this_temp;
                cur = f.next;
            }
        }
    }

    items.sort_by(|a, b| a.abs.cmp(&b.abs).then(a.seq.cmp(&b.seq)));

    let mut final_of = vec![0usize; items.len()];
    for (final_idx, it) in items.iter().enumerate() {
        final_of[it.temp_id] = final_idx;
    }

    let mut out = Vec::with_capacity(items.len());
    let mut prev_abs = 0u64;
    for it in items {
        let mut ev = it.ev;
        ev.wait_ms = it.abs.saturating_sub(prev_abs).min(u32::MAX as u64) as u32;
        ev.voice_predecessor = it.voice_link.map(|vl| final_of[vl]);
        prev_abs = it.abs;
        out.push(ev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grammar::parse_script;
    use crate::diagnostics::Diagnostics;

    fn resolved(src: &str) -> Vec<ParseEvent> {
        let diag = Diagnostics::standalone();
        let mut out = parse_script(src, "<test>", &diag);
        resolve_timing(&mut out.tree)
    }

    #[test]
    fn single_operator_gets_a_set_time() {
        let events = resolved("Wsin Q");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn every_event_has_non_negative_wait() {
        let events = resolved("Wsin t1 ; Wsin t2 Q");
        assert!(events.iter().all(|e| e.wait_ms <= i32::MAX as u32));
    }

    #[test]
    fn composite_chain_is_flattened_to_linear_events() {
        let events = resolved("Wsin t1000 ; Wsin t2000 Q");
        // composite field no longer exists on any emitted event.
        assert!(events.iter().all(|e| e.composite.is_none()));
        assert_eq!(events.len(), 2);
        // the second (composite) event's wait equals the first operator's
        // resolved time (1000 ms), per spec.md §8 seed scenario 3.
        assert_eq!(events[1].wait_ms, 1000);
    }

    #[test]
    fn duration_group_aligns_default_times_to_the_longest_member() {
        let events = resolved("{Wsin t1 | Wsin t3} Q");
        assert_eq!(events.len(), 2);
    }
}
