//! Unit tests for liveness, interference, class inference, and the spill
//! bookkeeping. Whole-pass behavior is covered by `tests/allocation.rs`.

use corvus_ir::builder::IrBuilder;
use corvus_ir::compaction::compact;
use corvus_ir::instruction::RegClass;

use crate::allocator::RegisterAllocator;
use crate::classes::class_of;
use crate::interference;
use crate::liveness::{self, LiveRange};

fn gpr_alloc(physical: u32) -> RegisterAllocator {
    let mut ra = RegisterAllocator::with_classes(3);
    ra.add_registers(RegClass::GPR, physical);
    ra.add_registers(RegClass::FPR, 16);
    ra.add_registers(RegClass::GPR_PAIR, 8);
    ra
}

/// Run the analysis phases (no coloring, no spilling) for unit inspection.
fn analyze(ra: &mut RegisterAllocator, b: &mut IrBuilder) {
    compact(b);
    let count = b.view().ssa_count();
    ra.graph.reset(count);
    crate::classes::find_node_classes(&mut ra.graph, b.view());
    liveness::calculate_live_ranges(&mut ra.graph, &mut ra.live_ranges, b.view());
}

// ── Liveness ──

#[test]
fn live_ranges_and_remat_costs() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(7); // 2
    let l = b.load_context(0, RegClass::GPR, 8); // 3
    let m = b.load_mem(l, RegClass::GPR, 8); // 4
    let s = b.add(c, m); // 5
    b.store_context(s, 8, RegClass::GPR, 8); // 6
    b.exit_function(); // 7

    let mut ra = gpr_alloc(8);
    analyze(&mut ra, &mut b);

    let r = |n: u32| ra.live_ranges[n as usize];
    assert_eq!((r(c.id()).begin, r(c.id()).end), (2, 5));
    assert_eq!((r(l.id()).begin, r(l.id()).end), (3, 4));
    assert_eq!((r(m.id()).begin, r(m.id()).end), (4, 5));
    assert_eq!((r(s.id()).begin, r(s.id()).end), (5, 6));

    assert_eq!(r(c.id()).remat_cost, 1);
    assert_eq!(r(l.id()).remat_cost, 10);
    assert_eq!(r(m.id()).remat_cost, 100);
    assert_eq!(r(s.id()).remat_cost, 1000);

    // Every op recorded its block.
    assert_eq!(ra.graph.nodes[c.id() as usize].block_id, blk.id());
}

#[test]
fn fill_and_flag_costs() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let f = b.load_flag(0); // 2
    let fill = b.fill_register(0, RegClass::GPR); // 3
    b.store_flag(f, 1);
    b.exit_function();

    let mut ra = gpr_alloc(8);
    analyze(&mut ra, &mut b);

    assert_eq!(ra.live_ranges[f.id() as usize].remat_cost, 10);
    assert_eq!(ra.live_ranges[fill.id() as usize].remat_cost, 1001);
}

#[test]
fn phi_linking_builds_partner_chain() {
    let mut b = IrBuilder::new();
    let b0 = b.create_block();
    let b1 = b.create_block();
    let b2 = b.create_block();

    b.switch_to_block(b0);
    let x = b.load_context(0, RegClass::GPR, 8);
    b.jump(b2);
    b.switch_to_block(b1);
    let y = b.load_context(8, RegClass::GPR, 8);
    b.jump(b2);
    b.switch_to_block(b2);
    let phi = b.phi(&[(x, b0), (y, b1)], 8);
    b.exit_function();

    let mut ra = gpr_alloc(8);
    analyze(&mut ra, &mut b);

    // Ids were renumbered by compaction; re-derive them from the chain.
    let list = b.view();
    let blocks: Vec<_> = list.blocks().collect();
    let x = list.block_ops(blocks[0]).next().unwrap().id();
    let y = list.block_ops(blocks[1]).next().unwrap().id();
    let phi = list
        .block_ops(blocks[2])
        .find(|n| list.inst(*n).op.has_dest())
        .unwrap()
        .id();

    assert_eq!(ra.graph.nodes[phi as usize].partner, Some(x));
    assert_eq!(ra.graph.nodes[x as usize].partner, Some(y));
    assert_eq!(ra.graph.nodes[y as usize].partner, None);
    assert!(ra.graph.nodes[x as usize].partner_target);
    assert!(ra.graph.nodes[y as usize].partner_target);
    assert!(!ra.graph.nodes[phi as usize].partner_target);

    assert_eq!(ra.live_ranges[phi as usize].remat_cost, 10000);
}

#[test]
#[should_panic(expected = "before it is defined")]
fn use_before_def_is_rejected() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let s = b.add(c, c);
    let e = b.exit_function();
    // Point the add at a def that sits after it in program order.
    let late = b.constant(2);
    b.replace_all_uses_with_inclusive(c, late, s, e);

    let mut ra = gpr_alloc(8);
    analyze(&mut ra, &mut b);
}

// ── Interference ──

#[test]
fn pairwise_interference_is_symmetric_and_minimal() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let a = b.load_context(0, RegClass::GPR, 8); // 2
    let c = b.load_context(8, RegClass::GPR, 8); // 3
    let s = b.add(a, c); // 4
    let t = b.add(s, s); // 5
    b.store_context(t, 0, RegClass::GPR, 8);
    b.exit_function();

    let mut ra = gpr_alloc(8);
    analyze(&mut ra, &mut b);
    let count = b.view().ssa_count();
    interference::calculate_node_interference(&mut ra.graph, &ra.live_ranges, count);

    // Only a and c are simultaneously live; a value consumed by an op does
    // not interfere with the op's own result.
    assert_eq!(ra.graph.nodes[a.id() as usize].neighbors, vec![c.id()]);
    assert_eq!(ra.graph.nodes[c.id() as usize].neighbors, vec![a.id()]);
    assert!(ra.graph.nodes[s.id() as usize].neighbors.is_empty());
    assert!(ra.graph.nodes[t.id() as usize].neighbors.is_empty());
}

#[test]
fn block_strategy_matches_pairwise() {
    let mut b = IrBuilder::new();
    let blocks: Vec<_> = (0..30).map(|_| b.create_block()).collect();

    b.switch_to_block(blocks[0]);
    let seed = b.load_context(0, RegClass::GPR, 8);
    let mut carried = seed;
    for (i, &blk) in blocks.iter().enumerate() {
        if i > 0 {
            b.switch_to_block(blk);
        }
        for _ in 0..35 {
            let x = b.load_context(8, RegClass::GPR, 8);
            let y = b.add(x, seed);
            carried = b.add(y, carried);
        }
        if i + 1 < blocks.len() {
            b.jump(blocks[i + 1]);
        } else {
            b.store_context(carried, 0, RegClass::GPR, 8);
            b.exit_function();
        }
    }

    let mut ra = gpr_alloc(8);
    analyze(&mut ra, &mut b);
    let count = b.view().ssa_count();
    assert!(count >= interference::BLOCK_STRATEGY_THRESHOLD);

    interference::calculate_node_interference(&mut ra.graph, &ra.live_ranges, count);
    let mut pairwise: Vec<Vec<u32>> = ra
        .graph
        .nodes
        .iter()
        .take(count as usize)
        .map(|n| n.neighbors.clone())
        .collect();
    for list in &mut pairwise {
        list.sort_unstable();
    }

    analyze(&mut ra, &mut b);
    let mut local = std::collections::HashMap::new();
    let mut global = Vec::new();
    interference::calculate_block_interferences(&mut local, &mut global, &ra.live_ranges, b.view());
    interference::calculate_block_node_interference(
        &mut ra.graph,
        &local,
        &global,
        &ra.live_ranges,
        b.view(),
    );
    let mut partitioned: Vec<Vec<u32>> = ra
        .graph
        .nodes
        .iter()
        .take(count as usize)
        .map(|n| n.neighbors.clone())
        .collect();
    for list in &mut partitioned {
        list.sort_unstable();
    }

    assert_eq!(pairwise, partitioned);
}

// ── Register set ──

#[test]
fn grow_virtual_doubles_and_returns_previous_top() {
    let mut ra = gpr_alloc(8);
    assert_eq!(ra.graph.set.class(RegClass::GPR).virtual_count, 1024);
    let first_new = ra.graph.set.grow_virtual(RegClass::GPR);
    assert_eq!(first_new, 1024);
    assert_eq!(ra.graph.set.class(RegClass::GPR).virtual_count, 2048);
}

#[test]
fn register_conflicts_are_symmetric() {
    let mut ra = gpr_alloc(8);
    ra.reserve_conflicts(RegClass::GPR, 16);
    ra.reserve_conflicts(RegClass::FPR, 16);
    ra.add_register_conflict(RegClass::GPR, 3, RegClass::FPR, 7);

    let gpr3 = crate::graph::RegAssignment {
        class: RegClass::GPR,
        reg: 3,
    };
    let fpr7 = crate::graph::RegAssignment {
        class: RegClass::FPR,
        reg: 7,
    };
    assert_eq!(ra.graph.set.conflict_of(gpr3), Some(fpr7));
    assert_eq!(ra.graph.set.conflict_of(fpr7), Some(gpr3));

    let gpr4 = crate::graph::RegAssignment {
        class: RegClass::GPR,
        reg: 4,
    };
    assert_eq!(ra.graph.set.conflict_of(gpr4), None);
}

// ── Class inference ──

#[test]
fn class_inference_follows_op_identity() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let z32 = b.zext(c, 32);
    let z64 = b.zext(c, 64);
    let cp = b.cpuid(c);
    let pair = b.load_context_pair(0);
    let ex = b.extract_element_pair(pair, 0);
    let v = b.vadd(cp, cp, 16, 4);
    let fl = b.fill_register(0, RegClass::FPR);
    let mem = b.load_mem(c, RegClass::FPR, 16);
    b.exit_function();

    let list = b.view();
    assert_eq!(class_of(list, c), RegClass::GPR);
    assert_eq!(class_of(list, z32), RegClass::GPR);
    assert_eq!(class_of(list, z64), RegClass::FPR);
    assert_eq!(class_of(list, cp), RegClass::FPR);
    assert_eq!(class_of(list, pair), RegClass::GPR_PAIR);
    assert_eq!(class_of(list, ex), RegClass::GPR);
    assert_eq!(class_of(list, v), RegClass::FPR);
    assert_eq!(class_of(list, fl), RegClass::FPR);
    assert_eq!(class_of(list, mem), RegClass::FPR);
}

#[test]
fn phi_class_comes_from_first_incoming() {
    let mut b = IrBuilder::new();
    let b0 = b.create_block();
    let b1 = b.create_block();
    b.switch_to_block(b0);
    let x = b.load_context(0, RegClass::FPR, 16);
    b.jump(b1);
    b.switch_to_block(b1);
    let phi = b.phi(&[(x, b0)], 16);
    b.exit_function();

    assert_eq!(class_of(b.view(), phi), RegClass::FPR);
}

#[test]
#[should_panic(expected = "zero-extend")]
fn oversized_zext_is_rejected() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let z = b.zext(c, 65);
    b.exit_function();

    class_of(b.view(), z);
}

#[test]
fn coloring_grows_virtual_space_when_exhausted() {
    let mut ra = gpr_alloc(8);
    ra.graph.reset(64);
    ra.graph.set.class_mut(RegClass::GPR).virtual_count = 2;
    for node in 0..3u32 {
        ra.graph.set_node_class(node, RegClass::GPR);
    }
    for i in 0..3u32 {
        for j in 0..3u32 {
            if i != j {
                ra.graph.add_interference(i, j);
            }
        }
    }

    ra.allocate_virtual_registers();

    let mut regs: Vec<u32> = (0..3).map(|n| ra.graph.nodes[n].reg).collect();
    regs.sort_unstable();
    assert_eq!(regs, vec![0, 1, 2]);
    assert_eq!(ra.graph.set.class(RegClass::GPR).virtual_count, 4);
    assert_eq!(ra.top_pressure[RegClass::GPR.index()], 2);
}

// ── Spill bookkeeping ──

#[test]
fn spill_slots_reuse_on_overlap_and_union_ranges() {
    let mut ra = gpr_alloc(4);
    ra.graph.reset(64);
    ra.live_ranges.resize(64, LiveRange::UNSET);
    ra.live_ranges[1] = LiveRange {
        begin: 10,
        end: 20,
        remat_cost: 1000,
    };
    ra.live_ranges[2] = LiveRange {
        begin: 15,
        end: 25,
        remat_cost: 1000,
    };
    ra.live_ranges[3] = LiveRange {
        begin: 30,
        end: 40,
        remat_cost: 1000,
    };

    assert_eq!(ra.find_spill_slot(1, RegClass::GPR), 0);
    assert_eq!(ra.find_spill_slot(2, RegClass::GPR), 0);
    assert_eq!(ra.graph.spill_stack[0].begin, 10);
    assert_eq!(ra.graph.spill_stack[0].end, 25);

    assert_eq!(ra.find_spill_slot(3, RegClass::GPR), 1);
    assert_eq!(ra.spill_slot_count, 2);
    assert_eq!(ra.graph.nodes[3].spill_slot, 1);
}

#[test]
fn spill_victim_prefers_farthest_end_then_cost() {
    let mut ra = gpr_alloc(4);
    ra.graph.reset(64);
    ra.live_ranges.resize(64, LiveRange::UNSET);

    // Overflowed node 5, live [10, 12).
    let op_range = LiveRange {
        begin: 10,
        end: 12,
        remat_cost: 1000,
    };
    // Neighbors: 1 ends farthest, 2 same end but cheaper, 3 is a constant,
    // 4 not yet live at the decision point.
    ra.live_ranges[1] = LiveRange {
        begin: 2,
        end: 30,
        remat_cost: 1000,
    };
    ra.live_ranges[2] = LiveRange {
        begin: 3,
        end: 30,
        remat_cost: 100,
    };
    ra.live_ranges[3] = LiveRange {
        begin: 4,
        end: 40,
        remat_cost: 1,
    };
    ra.live_ranges[4] = LiveRange {
        begin: 20,
        end: 45,
        remat_cost: 1000,
    };
    for n in 1..=4 {
        ra.graph.add_interference(5, n);
    }

    // 3 is excluded (constant), 4 is excluded (not live yet); between 1 and
    // 2 the tie on end breaks toward the cheaper remat cost.
    assert_eq!(ra.find_node_to_spill(5, 10, &op_range), Some(2));
}

#[test]
fn spill_victim_falls_back_to_any_live_neighbor() {
    let mut ra = gpr_alloc(4);
    ra.graph.reset(64);
    ra.live_ranges.resize(64, LiveRange::UNSET);

    let op_range = LiveRange {
        begin: 10,
        end: 50,
        remat_cost: 1000,
    };
    // Nothing outlives the overflowed def; 1 is live with a shorter range.
    ra.live_ranges[1] = LiveRange {
        begin: 2,
        end: 20,
        remat_cost: 1000,
    };
    ra.graph.add_interference(5, 1);
    assert_eq!(ra.find_node_to_spill(5, 10, &op_range), Some(1));
}

#[test]
fn spill_victim_none_when_only_constants_interfere() {
    let mut ra = gpr_alloc(4);
    ra.graph.reset(64);
    ra.live_ranges.resize(64, LiveRange::UNSET);

    let op_range = LiveRange {
        begin: 10,
        end: 50,
        remat_cost: 1000,
    };
    ra.live_ranges[1] = LiveRange {
        begin: 2,
        end: 60,
        remat_cost: 1,
    };
    ra.graph.add_interference(5, 1);
    assert_eq!(ra.find_node_to_spill(5, 10, &op_range), None);
}
