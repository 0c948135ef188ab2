//! Interference graph storage: bit matrix, register classes, node pool.

use corvus_ir::instruction::RegClass;

pub(crate) const INVALID_REG: u32 = u32::MAX;
pub(crate) const INVALID_SPILL_SLOT: u32 = u32::MAX;
pub(crate) const DEFAULT_VIRTUAL_REG_COUNT: u32 = 1024;
pub(crate) const DEFAULT_INTERFERENCE_LIST_CAPACITY: usize = 128;
const DEFAULT_NODE_COUNT: u32 = 8192;

/// A concrete `(class, register)` assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegAssignment {
    pub class: RegClass,
    pub reg: u32,
}

/// Packed N×N symmetric bit matrix over node ids.
///
/// Sized once per pass iteration. Growth drops the old contents; the
/// interference builder repopulates from scratch each iteration anyway.
#[derive(Debug, Default)]
struct InterferenceMatrix {
    bits: Vec<u64>,
    words_per_row: usize,
}

impl InterferenceMatrix {
    fn reallocate(&mut self, node_capacity: u32) {
        self.words_per_row = (node_capacity as usize).div_ceil(64);
        let words = self.words_per_row * node_capacity as usize;
        self.bits.clear();
        self.bits.resize(words, 0);
    }

    fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Set bit `(row, col)`; returns whether it was already set.
    fn test_and_set(&mut self, row: u32, col: u32) -> bool {
        let word = row as usize * self.words_per_row + col as usize / 64;
        let mask = 1u64 << (col % 64);
        let was_set = self.bits[word] & mask != 0;
        self.bits[word] |= mask;
        was_set
    }
}

/// Virtual and physical register counts for one class, plus the cross-class
/// conflict table.
#[derive(Debug, Default, Clone)]
pub(crate) struct RegisterClassInfo {
    pub virtual_count: u32,
    pub physical_count: u32,
    /// `conflicts[reg]` names a register in another class that aliases this
    /// one at the hardware level.
    pub conflicts: Vec<Option<RegAssignment>>,
}

/// Ordered collection of register classes.
#[derive(Debug, Default)]
pub(crate) struct RegisterSet {
    pub classes: Vec<RegisterClassInfo>,
}

impl RegisterSet {
    pub fn class(&self, class: RegClass) -> &RegisterClassInfo {
        &self.classes[class.index()]
    }

    pub fn class_mut(&mut self, class: RegClass) -> &mut RegisterClassInfo {
        &mut self.classes[class.index()]
    }

    /// Size `class`'s conflict vector to cover registers `0..count`.
    pub fn reserve_conflicts(&mut self, class: RegClass, count: u32) {
        self.class_mut(class).conflicts.resize(count as usize, None);
    }

    /// Record a hardware aliasing conflict in both directions. The conflict
    /// vectors must already be sized via `reserve_conflicts`.
    pub fn add_conflict(&mut self, class_a: RegClass, reg_a: u32, class_b: RegClass, reg_b: u32) {
        let a = self.class_mut(class_a);
        assert!(
            (reg_a as usize) < a.conflicts.len(),
            "reg {reg_a} outside conflict vector of len {}",
            a.conflicts.len()
        );
        a.conflicts[reg_a as usize] = Some(RegAssignment {
            class: class_b,
            reg: reg_b,
        });

        let b = self.class_mut(class_b);
        assert!(
            (reg_b as usize) < b.conflicts.len(),
            "reg {reg_b} outside conflict vector of len {}",
            b.conflicts.len()
        );
        b.conflicts[reg_b as usize] = Some(RegAssignment {
            class: class_a,
            reg: reg_a,
        });
    }

    /// The conflicting assignment registered for `assignment`, if any.
    pub fn conflict_of(&self, assignment: RegAssignment) -> Option<RegAssignment> {
        self.classes[assignment.class.index()]
            .conflicts
            .get(assignment.reg as usize)
            .copied()
            .flatten()
    }

    /// Double `class`'s virtual register space; returns the first new index.
    pub fn grow_virtual(&mut self, class: RegClass) -> u32 {
        let info = self.class_mut(class);
        let old_count = info.virtual_count;
        info.virtual_count *= 2;
        old_count
    }
}

/// Per-def node state plus dense adjacency.
#[derive(Debug, Default)]
pub(crate) struct RegisterNode {
    pub class: Option<RegClass>,
    pub reg: u32,
    pub block_id: u32,
    pub spill_slot: u32,
    /// Forward link in the phi partner chain.
    pub partner: Option<u32>,
    /// Whether another node links to this one (a non-head chain member).
    pub partner_target: bool,
    /// Dense neighbor list; allocation is retained across pass iterations.
    pub neighbors: Vec<u32>,
}

impl RegisterNode {
    fn reset(&mut self) {
        self.class = None;
        self.reg = INVALID_REG;
        self.block_id = u32::MAX;
        self.spill_slot = INVALID_SPILL_SLOT;
        self.partner = None;
        self.partner_target = false;
        self.neighbors.clear();
    }

    /// The node's full assignment, present only once colored.
    pub fn assignment(&self) -> Option<RegAssignment> {
        match (self.class, self.reg) {
            (Some(class), reg) if reg != INVALID_REG => Some(RegAssignment { class, reg }),
            _ => None,
        }
    }
}

/// A spill slot and the union of live ranges parked in it.
#[derive(Debug)]
pub(crate) struct SpillStackUnit {
    pub node: u32,
    pub class: RegClass,
    pub begin: u32,
    pub end: u32,
}

/// The allocator's graph: class set, node pool, bit matrix, spill stack.
/// Buffers grow monotonically and are reset at the top of each iteration.
#[derive(Debug, Default)]
pub(crate) struct RegisterGraph {
    pub set: RegisterSet,
    pub nodes: Vec<RegisterNode>,
    matrix: InterferenceMatrix,
    node_count: u32,
    pub spill_stack: Vec<SpillStackUnit>,
}

impl RegisterGraph {
    pub fn with_classes(class_count: u32) -> Self {
        let mut graph = Self::default();
        graph
            .set
            .classes
            .resize(class_count as usize, RegisterClassInfo::default());
        graph.reset(DEFAULT_NODE_COUNT);
        graph
    }

    /// Logical node count for the current iteration (word-aligned).
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Reset logical node state for a pass over `ssa_count` ids, growing the
    /// pool and matrix if needed. Neighbor list allocations are reused.
    pub fn reset(&mut self, ssa_count: u32) {
        let node_count = ssa_count.next_multiple_of(64);
        self.node_count = node_count;
        if node_count as usize > self.nodes.len() {
            self.nodes.resize_with(node_count as usize, || RegisterNode {
                neighbors: Vec::with_capacity(DEFAULT_INTERFERENCE_LIST_CAPACITY),
                ..RegisterNode::default()
            });
            self.matrix.reallocate(node_count);
            for node in &mut self.nodes {
                node.reset();
            }
        } else {
            self.matrix.clear();
            for node in &mut self.nodes[..node_count as usize] {
                node.reset();
            }
        }
    }

    pub fn set_node_class(&mut self, node: u32, class: RegClass) {
        self.nodes[node as usize].class = Some(class);
    }

    /// Link `partner` into `node`'s phi chain.
    pub fn set_partner(&mut self, node: u32, partner: u32) {
        self.nodes[node as usize].partner = Some(partner);
        self.nodes[partner as usize].partner_target = true;
    }

    /// Record `b` as interfering with `a`. The bit matrix dedupes; the
    /// dense list grows only on first insertion.
    pub fn add_interference(&mut self, a: u32, b: u32) {
        if !self.matrix.test_and_set(a, b) {
            self.nodes[a as usize].neighbors.push(b);
        }
    }

    /// Whether assigning `candidate` to `node` clashes with a colored
    /// neighbor, directly or through the cross-class conflict table.
    pub fn node_interferes_with(&self, node: u32, candidate: RegAssignment) -> bool {
        for &neighbor in &self.nodes[node as usize].neighbors {
            if let Some(assigned) = self.nodes[neighbor as usize].assignment() {
                if assigned == candidate {
                    return true;
                }
                if self.set.conflict_of(assigned) == Some(candidate) {
                    return true;
                }
            }
        }
        false
    }

    /// Chain-wide interference check for phi partner groups.
    pub fn set_interferes_with(&self, nodes: &[u32], candidate: RegAssignment) -> bool {
        nodes
            .iter()
            .any(|&n| self.node_interferes_with(n, candidate))
    }
}
