//! Interference construction: which defs are simultaneously live.
//!
//! Two strategies produce the same adjacency. A pairwise O(N²) scan is
//! cache-friendly for small IRs; a block-partitioned pass that only tests
//! each node against its block's locals and the cross-block globals wins
//! once the node count grows.

use std::collections::HashMap;

use corvus_ir::list::IrList;

use crate::graph::RegisterGraph;
use crate::liveness::LiveRange;

/// Node count at which the block-partitioned strategy takes over.
pub(crate) const BLOCK_STRATEGY_THRESHOLD: u32 = 2048;

/// Pairwise scan over every `(i, j)` with `i < j`.
pub(crate) fn calculate_node_interference(
    graph: &mut RegisterGraph,
    ranges: &[LiveRange],
    node_count: u32,
) {
    for i in 0..node_count {
        for j in i + 1..node_count {
            if ranges[i as usize].overlaps(&ranges[j as usize]) {
                graph.add_interference(i, j);
                graph.add_interference(j, i);
            }
        }
    }
}

/// First pass of the block-partitioned strategy: classify each node as
/// local (live range fully inside its block) or global.
pub(crate) fn calculate_block_interferences(
    local: &mut HashMap<u32, Vec<u32>>,
    global: &mut Vec<u32>,
    ranges: &[LiveRange],
    list: &IrList,
) {
    for block in list.blocks() {
        let (Some(begin), Some(last)) = list.block_range(block) else {
            continue;
        };
        let locals = local.entry(block.id()).or_default();
        locals.reserve((last.id().saturating_sub(begin.id())) as usize);
        for node in list.block_ops(block) {
            let range = &ranges[node.id() as usize];
            if range.begin >= begin.id() && range.end <= last.id() {
                locals.push(node.id());
            } else {
                global.push(node.id());
            }
        }
    }
}

/// Second pass: for each node, collect overlaps against its block's locals
/// and the globals, then insert symmetric adjacency.
pub(crate) fn calculate_block_node_interference(
    graph: &mut RegisterGraph,
    local: &HashMap<u32, Vec<u32>>,
    global: &[u32],
    ranges: &[LiveRange],
    list: &IrList,
) {
    let mut overlapping = Vec::new();
    for block in list.blocks() {
        let Some(locals) = local.get(&block.id()) else {
            continue;
        };
        for node in list.block_ops(block) {
            let id = node.id();
            let range = &ranges[id as usize];

            overlapping.clear();
            for &rhs in locals.iter().chain(global.iter()) {
                if rhs != id && range.overlaps(&ranges[rhs as usize]) {
                    overlapping.push(rhs);
                }
            }
            for &rhs in &overlapping {
                graph.add_interference(id, rhs);
                graph.add_interference(rhs, id);
            }
        }
    }
}
