//! Builder for constructing and rewriting corvus IR.
//!
//! Emission inserts after a movable write cursor and advances it. The
//! cursor is how spill code gets threaded into an existing instruction
//! stream: park it before an op, emit, restore.

use crate::instruction::{Inst, Op, RegClass};
use crate::list::IrList;
use crate::value::NodeRef;

/// Owns an [`IrList`] and a write cursor.
pub struct IrBuilder {
    list: IrList,
    write_cursor: Option<NodeRef>,
    current_block: Option<NodeRef>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            list: IrList::new(),
            write_cursor: None,
            current_block: None,
        }
    }

    /// Non-copying view of the IR.
    pub fn view(&self) -> &IrList {
        &self.list
    }

    pub fn inst_mut(&mut self, node: NodeRef) -> &mut Inst {
        self.list.inst_mut(node)
    }

    pub fn write_cursor(&self) -> Option<NodeRef> {
        self.write_cursor
    }

    /// Park the cursor; subsequent emission inserts after `node`.
    pub fn set_write_cursor(&mut self, node: Option<NodeRef>) {
        self.write_cursor = node;
    }

    /// Swap in a compacted list with every reference remapped through
    /// `remap` (old id -> new id).
    pub(crate) fn apply_compaction(&mut self, list: IrList, remap: &[u32]) {
        self.list = list;
        self.write_cursor = self
            .write_cursor
            .map(|c| NodeRef::from_id(remap[c.id() as usize]));
        self.current_block = self
            .current_block
            .map(|b| NodeRef::from_id(remap[b.id() as usize]));
    }

    // ── Block management ──

    /// Create a new code block at the end of the block chain.
    pub fn create_block(&mut self) -> NodeRef {
        let block = self.list.append(Inst::new(
            Op::CodeBlock {
                begin: None,
                last: None,
                next: None,
            },
            0,
        ));

        let mut prev = None;
        let mut cur = self.list.first_block();
        while let Some(b) = cur {
            if b == block {
                break;
            }
            prev = Some(b);
            cur = match self.list.inst(b).op {
                Op::CodeBlock { next, .. } => next,
                _ => unreachable!(),
            };
        }
        match prev {
            None => {
                let Op::IrHeader { blocks } = &mut self.list.inst_mut(self.list.header()).op
                else {
                    panic!("first op wasn't IrHeader");
                };
                *blocks = Some(block);
            }
            Some(p) => {
                let Op::CodeBlock { next, .. } = &mut self.list.inst_mut(p).op else {
                    panic!("block chain node wasn't a code block");
                };
                *next = Some(block);
            }
        }
        block
    }

    /// Make `block` the emission target: the cursor moves to its last op,
    /// or to the block node itself if it is empty.
    pub fn switch_to_block(&mut self, block: NodeRef) {
        let (_, last) = self.list.block_range(block);
        self.current_block = Some(block);
        self.write_cursor = Some(last.unwrap_or(block));
    }

    /// The block most recently switched to, if any.
    pub fn current_block(&self) -> Option<NodeRef> {
        self.current_block
    }

    // ── Instruction emission ──

    fn emit(&mut self, inst: Inst) -> NodeRef {
        let cursor = self.write_cursor.expect("no write cursor");
        let node = self.list.insert_after(cursor, inst);
        self.write_cursor = Some(node);
        node
    }

    /// Integer literal.
    pub fn constant(&mut self, value: u64) -> NodeRef {
        self.emit(Inst::new(Op::Constant { value }, 8))
    }

    pub fn load_context(&mut self, offset: u32, class: RegClass, size: u8) -> NodeRef {
        self.emit(Inst::new(Op::LoadContext { offset, class }, size))
    }

    pub fn store_context(&mut self, value: NodeRef, offset: u32, class: RegClass, size: u8) -> NodeRef {
        self.emit(Inst::new(Op::StoreContext { value, offset, class }, size))
    }

    pub fn load_context_pair(&mut self, offset: u32) -> NodeRef {
        let mut inst = Inst::new(Op::LoadContextPair { offset }, 8);
        inst.elements = 2;
        self.emit(inst)
    }

    pub fn store_context_pair(&mut self, value: NodeRef, offset: u32) -> NodeRef {
        let mut inst = Inst::new(Op::StoreContextPair { value, offset }, 8);
        inst.elements = 2;
        self.emit(inst)
    }

    pub fn load_flag(&mut self, flag: u32) -> NodeRef {
        self.emit(Inst::new(Op::LoadFlag { flag }, 1))
    }

    pub fn store_flag(&mut self, value: NodeRef, flag: u32) -> NodeRef {
        self.emit(Inst::new(Op::StoreFlag { value, flag }, 1))
    }

    pub fn load_mem(&mut self, addr: NodeRef, class: RegClass, size: u8) -> NodeRef {
        self.emit(Inst::new(Op::LoadMem { addr, class }, size))
    }

    pub fn store_mem(&mut self, addr: NodeRef, value: NodeRef, class: RegClass, size: u8) -> NodeRef {
        self.emit(Inst::new(Op::StoreMem { addr, value, class }, size))
    }

    pub fn add(&mut self, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::Add { lhs, rhs }, 8))
    }

    pub fn sub(&mut self, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::Sub { lhs, rhs }, 8))
    }

    pub fn mul(&mut self, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::Mul { lhs, rhs }, 8))
    }

    pub fn and(&mut self, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::And { lhs, rhs }, 8))
    }

    pub fn or(&mut self, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::Or { lhs, rhs }, 8))
    }

    pub fn xor(&mut self, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::Xor { lhs, rhs }, 8))
    }

    pub fn zext(&mut self, value: NodeRef, src_size: u8) -> NodeRef {
        self.emit(Inst::new(Op::Zext { value, src_size }, 8))
    }

    pub fn get_host_flag(&mut self, value: NodeRef, flag: u32) -> NodeRef {
        self.emit(Inst::new(Op::GetHostFlag { value, flag }, 1))
    }

    pub fn cpuid(&mut self, function: NodeRef) -> NodeRef {
        let mut inst = Inst::new(Op::Cpuid { function }, 8);
        inst.elements = 4;
        self.emit(inst)
    }

    pub fn vadd(&mut self, lhs: NodeRef, rhs: NodeRef, size: u8, elements: u8) -> NodeRef {
        let mut inst = Inst::new(Op::VAdd { lhs, rhs }, size);
        inst.elements = elements;
        self.emit(inst)
    }

    pub fn vxor(&mut self, lhs: NodeRef, rhs: NodeRef, size: u8, elements: u8) -> NodeRef {
        let mut inst = Inst::new(Op::VXor { lhs, rhs }, size);
        inst.elements = elements;
        self.emit(inst)
    }

    pub fn create_element_pair(&mut self, lo: NodeRef, hi: NodeRef) -> NodeRef {
        let mut inst = Inst::new(Op::CreateElementPair { lo, hi }, 8);
        inst.elements = 2;
        self.emit(inst)
    }

    pub fn extract_element_pair(&mut self, pair: NodeRef, element: u8) -> NodeRef {
        self.emit(Inst::new(Op::ExtractElementPair { pair, element }, 8))
    }

    pub fn trunc_element_pair(&mut self, pair: NodeRef) -> NodeRef {
        let mut inst = Inst::new(Op::TruncElementPair { pair }, 4);
        inst.elements = 2;
        self.emit(inst)
    }

    pub fn cas_pair(&mut self, expected: NodeRef, desired: NodeRef, addr: NodeRef) -> NodeRef {
        let mut inst = Inst::new(
            Op::CasPair {
                expected,
                desired,
                addr,
            },
            8,
        );
        inst.elements = 2;
        self.emit(inst)
    }

    /// Emit a phi with its incoming `(value, block)` chain.
    pub fn phi(&mut self, incoming: &[(NodeRef, NodeRef)], size: u8) -> NodeRef {
        let mut head = None;
        let mut prev: Option<NodeRef> = None;
        for &(value, block) in incoming {
            let pv = self.emit(Inst::new(
                Op::PhiValue {
                    value,
                    block,
                    next: None,
                },
                size,
            ));
            match prev {
                None => head = Some(pv),
                Some(p) => {
                    let Op::PhiValue { next, .. } = &mut self.list.inst_mut(p).op else {
                        unreachable!();
                    };
                    *next = Some(pv);
                }
            }
            prev = Some(pv);
        }
        self.emit(Inst::new(Op::Phi { begin: head }, size))
    }

    pub fn spill_register(&mut self, value: NodeRef, slot: u32, class: RegClass) -> NodeRef {
        self.emit(Inst::new(Op::SpillRegister { value, slot, class }, 8))
    }

    pub fn fill_register(&mut self, slot: u32, class: RegClass) -> NodeRef {
        self.emit(Inst::new(Op::FillRegister { slot, class }, 8))
    }

    pub fn jump(&mut self, target: NodeRef) -> NodeRef {
        self.emit(Inst::new(Op::Jump { target }, 0))
    }

    pub fn cond_jump(
        &mut self,
        cond: NodeRef,
        true_target: NodeRef,
        false_target: NodeRef,
    ) -> NodeRef {
        self.emit(Inst::new(
            Op::CondJump {
                cond,
                true_target,
                false_target,
            },
            0,
        ))
    }

    pub fn exit_function(&mut self) -> NodeRef {
        self.emit(Inst::new(Op::ExitFunction, 0))
    }

    /// Rewrite every use of `old` to `new` in `[from, to]` inclusive.
    pub fn replace_all_uses_with_inclusive(
        &mut self,
        old: NodeRef,
        new: NodeRef,
        from: NodeRef,
        to: NodeRef,
    ) {
        self.list.replace_all_uses_with_inclusive(old, new, from, to);
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
