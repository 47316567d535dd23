use std::collections::BTreeMap;

use crate::codec::{FieldRule, RegisterSpace};

/// Size of a register block. Both holding and input registers are organised in
/// blocks of 40 and a single read may not cross from one block to the next.
pub const BLOCK_SIZE: u16 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    pub space: RegisterSpace,
    pub address: u16,
    pub count: u16,
}

impl ReadRequest {
    pub fn last_address(&self) -> u16 {
        self.address.saturating_add(self.count.saturating_sub(1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteGroup {
    pub address: u16,
    pub words: Vec<u16>,
}

pub fn block_of(register: u16) -> u16 {
    register / BLOCK_SIZE
}

/// True if reading `count` registers from `register` would cross a block boundary.
///
/// ```
/// use tou_bridge::plan::crosses_block_boundary;
///
/// assert!(!crosses_block_boundary(35, 5));
/// assert!(crosses_block_boundary(35, 6));
/// ```
pub fn crosses_block_boundary(register: u16, count: u16) -> bool {
    if count == 0 {
        return false;
    }
    block_of(register) != block_of(register.saturating_add(count - 1))
}

/// Coalesces the registers behind `rules` into as few reads as possible.
///
/// Rules in the same space share a read when they sit in the same block;
/// registers in the gaps between fields are read and ignored.
pub fn plan_reads<'a, I>(rules: I) -> Vec<ReadRequest>
where
    I: IntoIterator<Item = &'a FieldRule>,
{
    let mut rules: Vec<&FieldRule> = rules.into_iter().collect();
    rules.sort_by_key(|r| (r.space, r.address));

    let mut reads: Vec<ReadRequest> = Vec::new();
    for rule in rules {
        let end = rule.last_address();

        if let Some(current) = reads.last_mut() {
            if current.space == rule.space && block_of(current.address) == block_of(end) {
                let new_end = current.last_address().max(end);
                current.count = new_end - current.address + 1;
                continue;
            }
        }

        reads.push(ReadRequest {
            space: rule.space,
            address: rule.address,
            count: rule.word_span(),
        });
    }

    reads
}

/// Splits encoded words into runs of consecutive addresses, in address order.
pub fn write_groups(words: &BTreeMap<u16, u16>) -> Vec<WriteGroup> {
    let mut groups: Vec<WriteGroup> = Vec::new();

    for (&address, &word) in words {
        match groups.last_mut() {
            Some(group) if usize::from(group.address) + group.words.len() == usize::from(address) => {
                group.words.push(word);
            }
            _ => groups.push(WriteGroup {
                address,
                words: vec![word],
            }),
        }
    }

    groups
}
