//! Unit tests for the ordered list, builder, and compaction.

use crate::builder::IrBuilder;
use crate::compaction::compact;
use crate::instruction::Op;
use crate::value::NodeRef;

#[test]
fn linear_build_has_dense_ids() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(42);
    let s = b.add(c, c);
    let e = b.exit_function();

    assert_eq!(b.view().ssa_count(), 5);
    assert_eq!(blk.id(), 1);
    assert_eq!(c.id(), 2);
    assert_eq!(s.id(), 3);
    assert_eq!(e.id(), 4);

    let ops: Vec<_> = b.view().block_ops(blk).collect();
    assert_eq!(ops, vec![c, s, e]);
    assert_eq!(b.view().block_range(blk), (Some(c), Some(e)));
}

#[test]
fn empty_block_has_no_ops() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    assert_eq!(b.view().block_ops(blk).count(), 0);
    assert_eq!(b.view().block_range(blk), (None, None));
}

#[test]
fn block_chain_links_in_creation_order() {
    let mut b = IrBuilder::new();
    let b0 = b.create_block();
    let b1 = b.create_block();
    let b2 = b.create_block();
    let blocks: Vec<_> = b.view().blocks().collect();
    assert_eq!(blocks, vec![b0, b1, b2]);
}

#[test]
fn insert_mid_block_splices_into_chain() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let s = b.add(c, c);
    let e = b.exit_function();

    b.set_write_cursor(Some(c));
    let extra = b.constant(2);

    let ops: Vec<_> = b.view().block_ops(blk).collect();
    assert_eq!(ops, vec![c, extra, s, e]);
    // Arena ids keep their allocation order until compaction.
    assert_eq!(extra.id(), 5);
}

#[test]
fn insert_after_block_node_lands_at_block_top() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    b.exit_function();

    b.set_write_cursor(Some(blk));
    let top = b.constant(2);

    let ops: Vec<_> = b.view().block_ops(blk).collect();
    assert_eq!(ops[0], top);
    assert_eq!(ops[1], c);
    assert_eq!(b.view().block_range(blk).0, Some(top));
}

#[test]
fn insert_after_last_extends_block() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    b.constant(1);
    let e = b.exit_function();

    b.set_write_cursor(Some(e));
    let tail = b.constant(2);
    assert_eq!(b.view().block_range(blk).1, Some(tail));
}

#[test]
fn find_first_use_scans_argument_lists() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let d = b.constant(2);
    let s1 = b.add(d, d);
    let s2 = b.add(c, d);
    let e = b.exit_function();

    let list = b.view();
    assert_eq!(list.find_first_use(c, c, e), Some(s2));
    assert_eq!(list.find_first_use(d, s1, e), Some(s1));
    assert_eq!(list.find_first_use(c, c, s1), None);
}

#[test]
fn replace_uses_is_range_scoped() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let s1 = b.add(c, c);
    let s2 = b.add(c, c);
    let e = b.exit_function();

    let fresh = b.constant(9);
    b.replace_all_uses_with_inclusive(c, fresh, s2, e);

    let Op::Add { lhs, rhs } = b.view().inst(s1).op else {
        panic!("expected add");
    };
    assert_eq!((lhs, rhs), (c, c));
    let Op::Add { lhs, rhs } = b.view().inst(s2).op else {
        panic!("expected add");
    };
    assert_eq!((lhs, rhs), (fresh, fresh));
}

#[test]
fn phi_builder_wires_incoming_chain() {
    let mut b = IrBuilder::new();
    let b0 = b.create_block();
    let b1 = b.create_block();
    let b2 = b.create_block();

    b.switch_to_block(b0);
    let x = b.constant(1);
    b.jump(b2);
    b.switch_to_block(b1);
    let y = b.constant(2);
    b.jump(b2);
    b.switch_to_block(b2);
    let phi = b.phi(&[(x, b0), (y, b1)], 8);
    b.exit_function();

    let Op::Phi { begin } = b.view().inst(phi).op else {
        panic!("expected phi");
    };
    let pv1 = begin.unwrap();
    let Op::PhiValue { value, block, next } = b.view().inst(pv1).op else {
        panic!("expected phivalue");
    };
    assert_eq!((value, block), (x, b0));
    let pv2 = next.unwrap();
    let Op::PhiValue { value, block, next } = b.view().inst(pv2).op else {
        panic!("expected phivalue");
    };
    assert_eq!((value, block), (y, b1));
    assert!(next.is_none());
}

#[test]
fn compaction_renumbers_in_program_order() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(1);
    let s = b.add(c, c);
    b.exit_function();

    // Splice a node mid-block so arena order diverges from program order.
    b.set_write_cursor(Some(c));
    let extra = b.constant(2);
    assert_eq!(extra.id(), 5);

    assert!(compact(&mut b));

    // Chain order now equals id order.
    let list = b.view();
    let blk = list.first_block().unwrap();
    let ops: Vec<u32> = list.block_ops(blk).map(NodeRef::id).collect();
    assert_eq!(ops, vec![2, 3, 4, 5]);

    // The add's arguments were remapped to the constant's new id.
    let Op::Add { lhs, rhs } = list.inst(NodeRef::from_id(4)).op else {
        panic!("expected add");
    };
    assert_eq!(lhs.id(), 2);
    assert_eq!(rhs.id(), 2);
    // Old names moved: s is now id 4, extra id 3.
    assert!(matches!(
        list.inst(NodeRef::from_id(3)).op,
        Op::Constant { value: 2 }
    ));
    let _ = s;

    // The cursor followed the node it pointed at.
    assert_eq!(b.write_cursor(), Some(NodeRef::from_id(3)));

    // Already-compact IR reports no change.
    assert!(!compact(&mut b));
}

#[test]
fn display_formats_ops() {
    let mut b = IrBuilder::new();
    let blk = b.create_block();
    b.switch_to_block(blk);
    let c = b.constant(42);
    b.add(c, c);
    b.exit_function();

    let text = b.view().display().to_string();
    assert!(text.contains("constant 0x2a"), "{text}");
    assert!(text.contains("add %ssa2, %ssa2"), "{text}");
    assert!(text.contains("exit"), "{text}");
}
