use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::bitstream::BitReader;
use crate::DecodeError;

/// Prefix-free code table built with the classic weight-merge algorithm.
///
/// Determinism matters more than compression here: the certificate issuer
/// derives the identical codes from the same weight table, so tie-breaking
/// must be fixed. Ties pop in insertion order, combined nodes are sequenced
/// after every leaf, and the earlier-popped node becomes the `0` child.
pub struct CodeTable<T> {
    codes: HashMap<(u8, u64), T>,
    max_len: u8,
}

enum TreeNode<T> {
    Leaf(Option<T>),
    Internal(usize, usize),
}

impl<T> CodeTable<T> {
    pub fn build(symbols: impl IntoIterator<Item = (u64, T)>) -> Result<Self, DecodeError> {
        let mut arena: Vec<TreeNode<T>> = Vec::new();
        let mut heap: BinaryHeap<Reverse<(u64, u64, usize)>> = BinaryHeap::new();
        let mut seq = 0u64;
        for (weight, value) in symbols {
            arena.push(TreeNode::Leaf(Some(value)));
            heap.push(Reverse((weight, seq, arena.len() - 1)));
            seq += 1;
        }

        let root = loop {
            let Some(Reverse((w0, _, zero))) = heap.pop() else {
                // no symbols at all: a table that can never match
                return Ok(CodeTable { codes: HashMap::new(), max_len: 0 });
            };
            let Some(Reverse((w1, _, one))) = heap.pop() else {
                break zero;
            };
            arena.push(TreeNode::Internal(zero, one));
            heap.push(Reverse((w0 + w1, seq, arena.len() - 1)));
            seq += 1;
        };

        let mut codes = HashMap::new();
        let mut max_len = 0u8;
        let mut stack = vec![(root, 0u8, 0u64)];
        while let Some((idx, len, bits)) = stack.pop() {
            match &mut arena[idx] {
                TreeNode::Leaf(slot) => {
                    if let Some(value) = slot.take() {
                        max_len = max_len.max(len);
                        codes.insert((len, bits), value);
                    }
                }
                TreeNode::Internal(zero, one) => {
                    if len == 64 {
                        return Err(DecodeError::MalformedHeader("code table too deep"));
                    }
                    let (zero, one) = (*zero, *one);
                    stack.push((zero, len + 1, bits << 1));
                    stack.push((one, len + 1, (bits << 1) | 1));
                }
            }
        }

        Ok(CodeTable { codes, max_len })
    }

    /// Greedy longest-match decode of the next symbol. `Ok(None)` means the
    /// stream ran out mid-code (trailing pad bits); `UnknownCode` means the
    /// accumulated bits outgrew every known code, i.e. a corrupt stream.
    pub fn decode_next(&self, bits: &mut BitReader<'_>) -> Result<Option<&T>, DecodeError> {
        let mut acc = 0u64;
        let mut len = 0u8;
        while bits.has_bits() {
            acc = (acc << 1) | bits.read_bit()? as u64;
            len += 1;
            if len > self.max_len {
                return Err(DecodeError::UnknownCode);
            }
            if let Some(value) = self.codes.get(&(len, acc)) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    #[cfg(test)]
    fn codes(&self) -> impl Iterator<Item = (u8, u64, &T)> + '_ {
        self.codes.iter().map(|(&(len, bits), v)| (len, bits, v))
    }
}
