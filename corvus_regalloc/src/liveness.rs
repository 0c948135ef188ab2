//! Live range computation, rematerialization costs, and phi affinity.

use corvus_ir::instruction::Op;
use corvus_ir::list::IrList;

use crate::graph::RegisterGraph;

pub(crate) const DEFAULT_REMAT_COST: u32 = 1000;

/// `[begin, end)` over SSA ids, plus the cost of recomputing the def
/// instead of spilling it. A cost of 1 marks constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LiveRange {
    pub begin: u32,
    pub end: u32,
    pub remat_cost: u32,
}

impl LiveRange {
    pub const UNSET: LiveRange = LiveRange {
        begin: u32::MAX,
        end: u32::MAX,
        remat_cost: DEFAULT_REMAT_COST,
    };

    /// Whether two ranges overlap. Touching end-to-begin does not count: a
    /// value consumed by an op may share a register with its result.
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        !(self.begin >= other.end || other.begin >= self.end)
    }
}

fn remat_cost(op: &Op) -> u32 {
    match op {
        Op::Constant { .. } => 1,
        Op::LoadFlag { .. } | Op::LoadContext { .. } => 10,
        Op::LoadMem { .. } => 100,
        Op::FillRegister { .. } => DEFAULT_REMAT_COST + 1,
        // Spilling a phi would break the partner chain; price it out.
        Op::Phi { .. } => DEFAULT_REMAT_COST * 10,
        _ => DEFAULT_REMAT_COST,
    }
}

/// One forward walk over blocks in linkage order: set `[begin, end)` per
/// def, record block ids, assign remat costs, and wire phi partner chains.
pub(crate) fn calculate_live_ranges(
    graph: &mut RegisterGraph,
    ranges: &mut Vec<LiveRange>,
    list: &IrList,
) {
    let count = list.ssa_count() as usize;
    if ranges.len() < count {
        ranges.resize(count, LiveRange::UNSET);
    }
    ranges[..count].fill(LiveRange::UNSET);

    let mut args = Vec::new();
    for block in list.blocks() {
        for node in list.block_ops(block) {
            let id = node.id();
            let inst = list.inst(node);

            if inst.op.has_dest() {
                assert!(
                    ranges[id as usize].begin == u32::MAX,
                    "{node} defined twice?"
                );
                ranges[id as usize].begin = id;
                // Default to ending right where it starts.
                ranges[id as usize].end = id;
            }
            ranges[id as usize].remat_cost = remat_cost(&inst.op);
            graph.nodes[id as usize].block_id = block.id();

            args.clear();
            inst.op.append_args(&mut args);
            for &arg in &args {
                let range = &mut ranges[arg.id() as usize];
                assert!(
                    range.begin != u32::MAX,
                    "{arg} used by {node} before it is defined?"
                );
                range.end = range.end.max(id);
            }

            if let Op::Phi { begin } = inst.op {
                // Every incoming value needs the same register as the phi.
                // Link them into a singly linked partner list rooted here.
                let mut partner = id;
                let mut cur = begin;
                while let Some(pv) = cur {
                    let Op::PhiValue { value, next, .. } = list.inst(pv).op else {
                        panic!("phi chain node {pv} wasn't a phivalue");
                    };
                    graph.set_partner(partner, value.id());
                    partner = value.id();
                    cur = next;
                }
            }
        }
    }
}
