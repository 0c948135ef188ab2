//! The allocation pass: coloring and the fixed-point driver that
//! alternates virtual allocation with spilling.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, instrument};

use corvus_ir::builder::IrBuilder;
use corvus_ir::compaction;
use corvus_ir::instruction::RegClass;

use crate::classes;
use crate::graph::{DEFAULT_VIRTUAL_REG_COUNT, RegAssignment, RegisterGraph};
use crate::interference;
use crate::liveness::{self, LiveRange};

/// Allocation failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum AllocError {
    /// An overflowed def had no spillable neighbor; the IR cannot be
    /// allocated with the configured registers.
    #[error("no spillable interference for %ssa{node}")]
    InfeasibleSpill { node: u32 },
}

/// Graph-coloring register allocator with cross-class conflict support.
///
/// Configure classes up front, then call [`run`](Self::run) once per IR.
/// Assignments are read back per SSA id with
/// [`node_register`](Self::node_register).
pub struct RegisterAllocator {
    pub(crate) graph: RegisterGraph,
    pub(crate) physical_count: Vec<u32>,
    pub(crate) top_pressure: Vec<u32>,
    pub(crate) live_ranges: Vec<LiveRange>,
    pub(crate) local_block_interferences: HashMap<u32, Vec<u32>>,
    pub(crate) global_block_interferences: Vec<u32>,
    pub(crate) spill_slot_count: u32,
    had_full_ra: bool,
}

impl RegisterAllocator {
    /// Create an allocator for `class_count` register classes.
    pub fn with_classes(class_count: u32) -> Self {
        Self {
            graph: RegisterGraph::with_classes(class_count),
            physical_count: vec![0; class_count as usize],
            top_pressure: vec![0; class_count as usize],
            live_ranges: Vec::new(),
            local_block_interferences: HashMap::new(),
            global_block_interferences: Vec::new(),
            spill_slot_count: 0,
            had_full_ra: false,
        }
    }

    /// Register `physical_count` allocatable registers for `class`. The
    /// virtual space starts at the default size and doubles on demand.
    pub fn add_registers(&mut self, class: RegClass, physical_count: u32) {
        let info = self.graph.set.class_mut(class);
        info.virtual_count = DEFAULT_VIRTUAL_REG_COUNT;
        info.physical_count = physical_count;
        self.physical_count[class.index()] = physical_count;
    }

    /// Declare a symmetric hardware aliasing conflict between
    /// `(class_a, reg_a)` and `(class_b, reg_b)`.
    pub fn add_register_conflict(
        &mut self,
        class_a: RegClass,
        reg_a: u32,
        class_b: RegClass,
        reg_b: u32,
    ) {
        self.graph.set.add_conflict(class_a, reg_a, class_b, reg_b);
    }

    /// Size `class`'s conflict vector to cover registers `0..count`.
    pub fn reserve_conflicts(&mut self, class: RegClass, count: u32) {
        self.graph.set.reserve_conflicts(class, count);
    }

    /// The assignment for an SSA id, if that def was colored.
    pub fn node_register(&self, node: u32) -> Option<RegAssignment> {
        self.graph.nodes.get(node as usize)?.assignment()
    }

    /// Whether the last run fit every class within its physical budget.
    pub fn had_full_ra(&self) -> bool {
        self.had_full_ra
    }

    /// Spill slots allocated by the last run.
    pub fn spill_slot_count(&self) -> u32 {
        self.spill_slot_count
    }

    /// Allocate registers for the IR owned by `builder`, rewriting it with
    /// spill code as needed. Returns whether the IR was mutated.
    #[instrument(skip_all)]
    pub fn run(&mut self, builder: &mut IrBuilder) -> Result<bool, AllocError> {
        let mut changed = false;

        self.spill_slot_count = 0;
        self.graph.spill_stack.clear();

        loop {
            changed |= self.run_allocate_virtual_registers(builder);

            self.had_full_ra = true;
            for (class, &physical) in self.physical_count.iter().enumerate() {
                self.had_full_ra &= self.top_pressure[class] < physical;
            }
            if self.had_full_ra {
                break;
            }

            // One spill per iteration; liveness and interference are rebuilt
            // from scratch before the next coloring attempt.
            if !self.spill_registers(builder)? {
                break;
            }
            changed = true;
        }

        Ok(changed)
    }

    /// Compaction, class inference, liveness, interference, coloring.
    fn run_allocate_virtual_registers(&mut self, builder: &mut IrBuilder) -> bool {
        self.global_block_interferences.clear();
        self.local_block_interferences.clear();
        self.top_pressure.fill(0);

        // Compaction must rerun every iteration so id order equals program
        // order.
        let changed = compaction::compact(builder);

        let list = builder.view();
        let ssa_count = list.ssa_count();
        self.graph.reset(ssa_count);

        classes::find_node_classes(&mut self.graph, list);
        liveness::calculate_live_ranges(&mut self.graph, &mut self.live_ranges, list);

        if ssa_count >= interference::BLOCK_STRATEGY_THRESHOLD {
            interference::calculate_block_interferences(
                &mut self.local_block_interferences,
                &mut self.global_block_interferences,
                &self.live_ranges,
                list,
            );
            interference::calculate_block_node_interference(
                &mut self.graph,
                &self.local_block_interferences,
                &self.global_block_interferences,
                &self.live_ranges,
                list,
            );
        } else {
            interference::calculate_node_interference(&mut self.graph, &self.live_ranges, ssa_count);
        }

        self.allocate_virtual_registers();
        debug!(ssa_count, pressure = ?self.top_pressure, "virtual allocation pass");

        changed
    }

    /// Assign each classified node the lowest virtual register its
    /// neighbors (and their cross-class conflicts) permit. Phi partner
    /// chains are colored jointly from their head.
    pub(crate) fn allocate_virtual_registers(&mut self) {
        let mut chain = Vec::new();
        for i in 0..self.graph.node_count() {
            let node = &self.graph.nodes[i as usize];
            let Some(class) = node.class else { continue };

            let is_chain_head = node.partner.is_some() && !node.partner_target;
            let singleton = [i];
            let members: &[u32] = if is_chain_head {
                chain.clear();
                let mut cur = Some(i);
                while let Some(member) = cur {
                    chain.push(member);
                    cur = self.graph.nodes[member as usize].partner;
                }
                &chain
            } else {
                &singleton
            };

            let reg = self.select_register(class, members);
            self.top_pressure[class.index()] = self.top_pressure[class.index()].max(reg);
            for &member in members {
                let node = &mut self.graph.nodes[member as usize];
                node.class = Some(class);
                node.reg = reg;
            }
        }
    }

    /// The lowest register in `class` no member conflicts with, growing the
    /// virtual space when every existing register is taken.
    fn select_register(&mut self, class: RegClass, members: &[u32]) -> u32 {
        let virtual_count = self.graph.set.class(class).virtual_count;
        for candidate in 0..virtual_count {
            let assignment = RegAssignment {
                class,
                reg: candidate,
            };
            if !self.graph.set_interferes_with(members, assignment) {
                return candidate;
            }
        }
        // Out of colors: the fresh index is disjoint from every existing
        // color, so no conflict check is needed.
        self.graph.set.grow_virtual(class)
    }
}
