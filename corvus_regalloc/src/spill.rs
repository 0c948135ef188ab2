//! Spill planning: when a def lands above its class's physical budget,
//! rewrite the IR to shorten someone's live range.
//!
//! The planner makes at most one change per invocation. The driver rebuilds
//! liveness and interference before coloring again, so every decision here
//! is taken against fresh ranges.

use tracing::{error, trace};

use corvus_ir::builder::IrBuilder;
use corvus_ir::instruction::{Op, RegClass};
use corvus_ir::value::NodeRef;

use crate::allocator::{AllocError, RegisterAllocator};
use crate::graph::{INVALID_REG, SpillStackUnit};
use crate::liveness::LiveRange;

impl RegisterAllocator {
    /// Scan for the first def colored past its class's physical budget and
    /// relieve it. Returns whether the IR changed.
    pub(crate) fn spill_registers(&mut self, builder: &mut IrBuilder) -> Result<bool, AllocError> {
        let saved_cursor = builder.write_cursor();

        let blocks: Vec<NodeRef> = builder.view().blocks().collect();
        for block in blocks {
            let (Some(begin), Some(last)) = builder.view().block_range(block) else {
                continue;
            };
            let mut cursor = Some(begin);
            while let Some(node) = cursor {
                if builder.view().inst(node).op.has_dest() {
                    let id = node.id();
                    let assignment = self.graph.nodes[id as usize]
                        .assignment()
                        .expect("def was never colored");
                    let needs_spill =
                        assignment.reg >= self.physical_count[assignment.class.index()];

                    if needs_spill {
                        let result = self.relieve_pressure(builder, id, node, block, last);
                        builder.set_write_cursor(saved_cursor);
                        result?;
                        return Ok(true);
                    }
                }

                if node == last {
                    break;
                }
                cursor = builder.view().next_of(node);
            }
        }

        builder.set_write_cursor(saved_cursor);
        Ok(false)
    }

    /// Rematerialize a constant neighbor if one qualifies, otherwise spill
    /// a victim for real.
    fn relieve_pressure(
        &mut self,
        builder: &mut IrBuilder,
        id: u32,
        node: NodeRef,
        block: NodeRef,
        block_last: NodeRef,
    ) -> Result<(), AllocError> {
        let op_range = self.live_ranges[id as usize];

        // Cheapest first: a constant neighbor that outlives this def gets
        // recomputed at its next use instead of occupying a register.
        let constant = self.graph.nodes[id as usize]
            .neighbors
            .iter()
            .copied()
            .find(|&neighbor| {
                let range = &self.live_ranges[neighbor as usize];
                range.remat_cost == 1 && range.end > op_range.end
            });
        if let Some(constant) = constant
            && self.remat_constant(builder, constant, node, block_last)
        {
            return Ok(());
        }

        let victim = self
            .find_node_to_spill(id, id, &op_range)
            .ok_or(AllocError::InfeasibleSpill { node: id })?;
        self.spill_victim(builder, victim, node, block, block_last);
        Ok(())
    }

    /// End `constant`'s current live range: re-emit the literal right
    /// before its next use and point the remaining uses at the copy.
    /// Returns false when the constant has no further use in this block.
    fn remat_constant(
        &mut self,
        builder: &mut IrBuilder,
        constant: u32,
        node: NodeRef,
        block_last: NodeRef,
    ) -> bool {
        let constant_ref = NodeRef::from_id(constant);
        let Op::Constant { value } = builder.view().inst(constant_ref).op else {
            panic!("remat candidate {constant_ref} wasn't a constant");
        };

        // First use at or after the overflow point, this block only.
        let Some(first_use) = builder.view().find_first_use(constant_ref, node, block_last)
        else {
            return false;
        };

        builder.set_write_cursor(builder.view().prev_of(first_use));
        let filled = builder.constant(value);
        trace!(constant, filled = filled.id(), "rematerialized constant");
        builder.replace_all_uses_with_inclusive(constant_ref, filled, first_use, block_last);
        true
    }

    /// Pick the neighbor of `node` whose eviction frees a register.
    ///
    /// Candidates must already be live at `current` and cost more than a
    /// constant to recompute. Prefer the farthest-ending range, breaking
    /// ties on cheaper rematerialization; if no range outlives the
    /// overflowed def's, fall back to any live neighbor whose range ends
    /// elsewhere.
    pub(crate) fn find_node_to_spill(
        &self,
        node: u32,
        current: u32,
        op_range: &LiveRange,
    ) -> Option<u32> {
        let neighbors = &self.graph.nodes[node as usize].neighbors;

        let mut victim = None;
        let mut farthest = 0u32;
        let mut lowest_cost = u32::MAX;

        for &neighbor in neighbors {
            let range = &self.live_ranges[neighbor as usize];
            if current < range.begin {
                continue;
            }
            if range.end > op_range.end && range.remat_cost != 1 {
                let better = range.end > farthest
                    || (range.end == farthest && range.remat_cost < lowest_cost);
                if better {
                    victim = Some(neighbor);
                    farthest = range.end;
                    lowest_cost = range.remat_cost;
                }
            }
        }

        if victim.is_none() {
            // Nothing outlives the overflowed def. Be more aggressive: any
            // live neighbor with a distinguishable range will do.
            for &neighbor in neighbors {
                let range = &self.live_ranges[neighbor as usize];
                if current < range.begin {
                    continue;
                }
                if range.remat_cost != 1 && range.end != op_range.end {
                    let better = victim.is_none()
                        || range.end > farthest
                        || (range.end == farthest && range.remat_cost < lowest_cost);
                    if better {
                        victim = Some(neighbor);
                        farthest = range.end;
                        lowest_cost = range.remat_cost;
                    }
                }
            }
        }

        if victim.is_none() {
            error!(node, interferences = neighbors.len(), "couldn't find a node to spill");
            for (i, &neighbor) in neighbors.iter().enumerate() {
                let range = &self.live_ranges[neighbor as usize];
                error!(
                    "  int{i}: %ssa{neighbor} remat {} [{}, {})",
                    range.remat_cost, range.begin, range.end
                );
            }
        }
        victim
    }

    /// Find or allocate a spill slot for `node`. A unit whose recorded
    /// range overlaps the node's reuses its slot and unions the ranges.
    pub(crate) fn find_spill_slot(&mut self, node: u32, class: RegClass) -> u32 {
        let range = self.live_ranges[node as usize];
        for (slot, unit) in self.graph.spill_stack.iter_mut().enumerate() {
            if range.begin <= unit.end && unit.begin <= range.end {
                unit.begin = unit.begin.min(range.begin);
                unit.end = unit.end.max(range.end);
                self.graph.nodes[node as usize].spill_slot = slot as u32;
                return slot as u32;
            }
        }

        let slot = self.spill_slot_count;
        self.graph.spill_stack.push(SpillStackUnit {
            node,
            class,
            begin: range.begin,
            end: range.end,
        });
        self.graph.nodes[node as usize].spill_slot = slot;
        self.spill_slot_count += 1;
        slot
    }

    /// Park `victim` in a spill slot: store it ahead of the overflow point
    /// and reload it in front of its next use.
    fn spill_victim(
        &mut self,
        builder: &mut IrBuilder,
        victim: u32,
        node: NodeRef,
        block: NodeRef,
        block_last: NodeRef,
    ) {
        let class = {
            let victim_node = &self.graph.nodes[victim as usize];
            assert!(
                victim_node.partner.is_none() && !victim_node.partner_target,
                "can't spill phi partner %ssa{victim}"
            );
            assert!(
                victim_node.reg != INVALID_REG,
                "victim %ssa{victim} was never assigned a register"
            );
            victim_node.class.expect("victim was never classified")
        };

        let slot = self.find_spill_slot(victim, class);
        let victim_ref = NodeRef::from_id(victim);
        let (size, elements) = {
            let inst = builder.view().inst(victim_ref);
            (inst.size, inst.elements)
        };

        // Store above the overflow point so the slot is populated before
        // the register gets reused: two ops back, clamped to the block top.
        let mut cursor = node;
        for _ in 0..2 {
            if cursor == block {
                break;
            }
            cursor = builder
                .view()
                .prev_of(cursor)
                .expect("op chain ended before its block node");
        }
        builder.set_write_cursor(Some(cursor));
        let spill = builder.spill_register(victim_ref, slot, class);
        {
            let inst = builder.inst_mut(spill);
            inst.size = size;
            inst.elements = elements;
        }

        // Reload in front of the victim's next use after the overflow
        // point, and route the remaining uses through the fill.
        let search_from = builder
            .view()
            .next_of(node)
            .expect("overflowed def had no successor");
        let first_use = builder
            .view()
            .find_first_use(victim_ref, search_from, block_last)
            .expect("victim has no use after the spill point");

        builder.set_write_cursor(builder.view().prev_of(first_use));
        let fill = builder.fill_register(slot, class);
        {
            let inst = builder.inst_mut(fill);
            inst.size = size;
            inst.elements = elements;
        }
        trace!(victim, slot, fill = fill.id(), "spilled register");
        builder.replace_all_uses_with_inclusive(victim_ref, fill, first_use, block_last);
    }
}
