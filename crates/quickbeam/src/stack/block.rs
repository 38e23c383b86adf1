//! Segmented stack of fixed-capacity blocks

/// One fixed-capacity block. Slots are allocated once and reused.
#[derive(Debug)]
struct Block<T> {
    slots: Vec<T>,
    used: usize,
}

impl<T: Default> Block<T> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| T::default()).collect(),
            used: 0,
        }
    }
}

/// A stack stored as a chain of fixed-size blocks.
///
/// Pushing fills the current block and moves to the next one, allocating
/// it only if it does not exist yet. Popping the last slot of a block frees
/// the block after it, so at most one empty block is kept beyond the
/// current one and growth and shrink around a block boundary never thrash
/// the allocator.
#[derive(Debug)]
pub struct BlockChain<T> {
    blocks: Vec<Block<T>>,
    current: usize,
    block_size: usize,
    len: usize,
}

impl<T: Default> BlockChain<T> {
    /// Create a chain with one empty block of `block_size` slots.
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            blocks: vec![Block::new(block_size)],
            current: 0,
            block_size,
            len: 0,
        }
    }

    /// Push onto the top slot.
    pub fn push(&mut self, value: T) {
        if self.blocks[self.current].used == self.block_size {
            self.current += 1;
            if self.current == self.blocks.len() {
                self.blocks.push(Block::new(self.block_size));
            }
        }
        let block = &mut self.blocks[self.current];
        block.slots[block.used] = value;
        block.used += 1;
        self.len += 1;
    }

    /// Pop the top slot, leaving it reset to its default for reuse.
    pub fn pop(&mut self) -> Option<T> {
        let block = &mut self.blocks[self.current];
        if block.used == 0 {
            return None;
        }
        block.used -= 1;
        let value = std::mem::take(&mut block.slots[block.used]);
        self.len -= 1;
        if block.used == 0 {
            self.blocks.truncate(self.current + 1);
            if self.current > 0 {
                self.current -= 1;
            }
        }
        Some(value)
    }

    /// The top slot
    pub fn last_mut(&mut self) -> Option<&mut T> {
        let block = &mut self.blocks[self.current];
        match block.used {
            0 => None,
            n => block.slots.get_mut(n - 1),
        }
    }

    /// Iterate from the top of the stack down.
    pub fn iter_rev(&self) -> impl Iterator<Item = &T> {
        self.blocks[..=self.current]
            .iter()
            .rev()
            .flat_map(|b| b.slots[..b.used].iter().rev())
    }

    /// Iterate mutably from the top of the stack down.
    pub fn iter_rev_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.blocks[..=self.current]
            .iter_mut()
            .rev()
            .flat_map(|b| b.slots[..b.used].iter_mut().rev())
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated blocks, including the spare one
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
