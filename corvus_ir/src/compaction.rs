//! IR compaction: renumber nodes densely in program order.
//!
//! After spill insertion, new nodes sit at the end of the arena with ids
//! out of program order. Compaction rebuilds the arena so that id order
//! equals chain order (the header first, then each block node followed by
//! its code nodes) and remaps every node reference, including the
//! builder's write cursor.

use tracing::trace;

use crate::builder::IrBuilder;
use crate::list::IrList;
use crate::value::NodeRef;

/// Renumber `builder`'s IR. Returns whether any id changed.
pub fn compact(builder: &mut IrBuilder) -> bool {
    let list = builder.view();
    let count = list.ssa_count() as usize;

    let mut order = Vec::with_capacity(count);
    order.push(list.header());
    for block in list.blocks() {
        order.push(block);
        for op in list.block_ops(block) {
            order.push(op);
        }
    }
    assert!(
        order.len() == count,
        "chain covered {} of {count} nodes",
        order.len()
    );

    if order.iter().enumerate().all(|(i, o)| o.id() == i as u32) {
        return false;
    }

    let mut remap = vec![u32::MAX; count];
    for (new_id, old) in order.iter().enumerate() {
        remap[old.id() as usize] = new_id as u32;
    }

    let mut insts = Vec::with_capacity(count);
    for old in &order {
        let mut inst = list.inst(*old).clone();
        inst.op
            .for_each_ref_mut(|r| *r = NodeRef::from_id(remap[r.id() as usize]));
        insts.push(inst);
    }

    trace!(count, "compacted IR");
    builder.apply_compaction(IrList::from_ordered(insts), &remap);
    true
}
