//! The ordered node list backing corvus IR.
//!
//! Nodes live in a `Vec` arena; the arena index is the SSA id. A doubly
//! linked chain threads the arena in program order: the header node first,
//! then each `CodeBlock` node followed by its code nodes. Insertion appends
//! to the arena and splices into the chain, so ids drift out of program
//! order until `compaction::compact` renumbers them.

use crate::instruction::{Inst, Op};
use crate::value::NodeRef;

#[derive(Debug, Clone)]
struct Entry {
    inst: Inst,
    prev: Option<NodeRef>,
    next: Option<NodeRef>,
}

/// Arena plus chain. The first node is always the `IrHeader`.
#[derive(Debug, Clone)]
pub struct IrList {
    nodes: Vec<Entry>,
    tail: NodeRef,
}

impl IrList {
    /// A list holding only the header node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Entry {
                inst: Inst::new(Op::IrHeader { blocks: None }, 0),
                prev: None,
                next: None,
            }],
            tail: NodeRef(0),
        }
    }

    /// Rebuild a list from instructions already in program order.
    /// The first instruction must be the header.
    pub(crate) fn from_ordered(insts: Vec<Inst>) -> Self {
        assert!(
            matches!(insts.first().map(|i| &i.op), Some(Op::IrHeader { .. })),
            "first op wasn't IrHeader"
        );
        let count = insts.len();
        let nodes = insts
            .into_iter()
            .enumerate()
            .map(|(i, inst)| Entry {
                inst,
                prev: (i > 0).then(|| NodeRef((i - 1) as u32)),
                next: (i + 1 < count).then(|| NodeRef((i + 1) as u32)),
            })
            .collect();
        Self {
            nodes,
            tail: NodeRef((count - 1) as u32),
        }
    }

    /// Total number of nodes, including the header and block nodes.
    pub fn ssa_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// The header node.
    pub fn header(&self) -> NodeRef {
        NodeRef(0)
    }

    pub fn inst(&self, node: NodeRef) -> &Inst {
        &self.nodes[node.0 as usize].inst
    }

    pub fn inst_mut(&mut self, node: NodeRef) -> &mut Inst {
        &mut self.nodes[node.0 as usize].inst
    }

    pub fn next_of(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0 as usize].next
    }

    pub fn prev_of(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0 as usize].prev
    }

    /// The first code block, if any blocks exist.
    pub fn first_block(&self) -> Option<NodeRef> {
        match self.inst(self.header()).op {
            Op::IrHeader { blocks } => blocks,
            _ => panic!("first op wasn't IrHeader"),
        }
    }

    /// The `begin` and `last` code nodes of `block`.
    pub fn block_range(&self, block: NodeRef) -> (Option<NodeRef>, Option<NodeRef>) {
        match self.inst(block).op {
            Op::CodeBlock { begin, last, .. } => (begin, last),
            _ => panic!("{block} isn't a code block"),
        }
    }

    /// Iterate code blocks in linkage order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            list: self,
            cur: self.first_block(),
        }
    }

    /// Iterate the code nodes of `block`, `begin..=last` inclusive.
    pub fn block_ops(&self, block: NodeRef) -> BlockOps<'_> {
        let (begin, last) = self.block_range(block);
        BlockOps {
            list: self,
            cur: begin,
            last,
        }
    }

    /// Append a node to the arena and the tail of the chain.
    pub(crate) fn append(&mut self, inst: Inst) -> NodeRef {
        let node = NodeRef(self.nodes.len() as u32);
        let tail = self.tail;
        self.nodes.push(Entry {
            inst,
            prev: Some(tail),
            next: None,
        });
        self.nodes[tail.0 as usize].next = Some(node);
        self.tail = node;
        node
    }

    /// Splice a new node into the chain immediately after `cursor`,
    /// maintaining block metadata: inserting after a block node puts the
    /// new node at the block's top; inserting after a block's last op
    /// extends the block.
    pub(crate) fn insert_after(&mut self, cursor: NodeRef, inst: Inst) -> NodeRef {
        let node = NodeRef(self.nodes.len() as u32);
        let old_next = self.nodes[cursor.0 as usize].next;
        self.nodes.push(Entry {
            inst,
            prev: Some(cursor),
            next: old_next,
        });
        self.nodes[cursor.0 as usize].next = Some(node);
        match old_next {
            Some(n) => self.nodes[n.0 as usize].prev = Some(node),
            None => self.tail = node,
        }

        if let Op::CodeBlock { begin, last, .. } = &mut self.nodes[cursor.0 as usize].inst.op {
            if begin.is_none() {
                *last = Some(node);
            }
            *begin = Some(node);
            return node;
        }

        let mut block = self.first_block();
        while let Some(b) = block {
            let Op::CodeBlock { last, next, .. } = &mut self.nodes[b.0 as usize].inst.op else {
                panic!("block chain node wasn't a code block");
            };
            if *last == Some(cursor) {
                *last = Some(node);
                break;
            }
            block = *next;
        }
        node
    }

    /// Find the first op in `[from, to]` (chain order, inclusive) that takes
    /// `value` as an argument.
    pub fn find_first_use(&self, value: NodeRef, from: NodeRef, to: NodeRef) -> Option<NodeRef> {
        let mut args = Vec::new();
        let mut cur = from;
        loop {
            args.clear();
            self.inst(cur).op.append_args(&mut args);
            if args.contains(&value) {
                return Some(cur);
            }
            if cur == to {
                return None;
            }
            cur = self.next_of(cur)?;
        }
    }

    /// Rewrite every use of `old` to `new` in `[from, to]` inclusive.
    pub fn replace_all_uses_with_inclusive(
        &mut self,
        old: NodeRef,
        new: NodeRef,
        from: NodeRef,
        to: NodeRef,
    ) {
        let mut cur = from;
        loop {
            self.nodes[cur.0 as usize].inst.op.replace_arg(old, new);
            if cur == to {
                break;
            }
            match self.next_of(cur) {
                Some(n) => cur = n,
                None => break,
            }
        }
    }
}

impl Default for IrList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over code blocks.
pub struct Blocks<'a> {
    list: &'a IrList,
    cur: Option<NodeRef>,
}

impl Iterator for Blocks<'_> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let cur = self.cur?;
        let Op::CodeBlock { next, .. } = self.list.inst(cur).op else {
            panic!("block chain node wasn't a code block");
        };
        self.cur = next;
        Some(cur)
    }
}

/// Iterator over the code nodes of one block, last-inclusive.
pub struct BlockOps<'a> {
    list: &'a IrList,
    cur: Option<NodeRef>,
    last: Option<NodeRef>,
}

impl Iterator for BlockOps<'_> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let cur = self.cur?;
        self.cur = if Some(cur) == self.last {
            None
        } else {
            self.list.next_of(cur)
        };
        Some(cur)
    }
}
