//! Block posting lists with impact skip data
//!
//! Postings are stored in blocks of [`BLOCK_SIZE`] documents. Each block is
//! encoded as a fixed `count(u32) + first_doc(u32)` prefix followed by varint
//! `(doc delta, term freq, length norm)` triples.
//!
//! The skip list records, for every block, the competitive impacts of that
//! block: the Pareto frontier of its `(freq, norm)` pairs. A second, coarser
//! level groups [`BLOCKS_PER_GROUP`] blocks. Together they form the two-level
//! impacts hierarchy a [`PostingsCursor`] exposes through
//! [`ImpactsSource`](crate::query::ImpactsSource).

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::query::{DocSet, ImpactsSource, Postings, TERMINATED};
use crate::{DocId, Error, Result};

/// Block-based posting list for skip-list style access
/// Each block contains up to BLOCK_SIZE postings
pub const BLOCK_SIZE: usize = 128;

/// Number of blocks summarised by one level-1 impacts entry.
pub const BLOCKS_PER_GROUP: usize = 8;

/// Upper bound of score contributions: a `(term freq, length norm)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Impact {
    pub freq: u32,
    pub norm: u32,
}

/// A posting entry containing doc_id, term frequency and the doc's length norm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
    pub norm: u32,
}

#[derive(Debug, Clone)]
struct SkipEntry {
    first_doc: DocId,
    last_doc: DocId,
    offset: u32,
    impacts: Vec<Impact>,
}

#[derive(Debug, Clone)]
struct GroupEntry {
    last_doc: DocId,
    impacts: Vec<Impact>,
}

/// Keep only `(freq, norm)` pairs not dominated by another pair with a
/// greater-or-equal freq and a smaller-or-equal norm. Sorted by ascending freq.
pub fn competitive_impacts(impacts: impl IntoIterator<Item = Impact>) -> Vec<Impact> {
    let mut all: Vec<Impact> = impacts.into_iter().collect();
    all.sort_unstable_by(|a, b| b.freq.cmp(&a.freq).then(a.norm.cmp(&b.norm)));

    let mut frontier = Vec::new();
    let mut best_norm = u32::MAX;
    for impact in all {
        if impact.norm < best_norm {
            best_norm = impact.norm;
            frontier.push(impact);
        }
    }
    frontier.reverse();
    frontier
}

#[derive(Debug, Clone, Default)]
pub struct PostingList {
    skip_list: Vec<SkipEntry>,
    groups: Vec<GroupEntry>,
    /// Encoded block data
    data: Vec<u8>,
    doc_count: u32,
    max_freq: u32,
}

impl PostingList {
    /// Build from postings sorted by doc id.
    pub fn from_postings(postings: &[Posting]) -> Result<Self> {
        if postings.windows(2).any(|w| w[0].doc_id >= w[1].doc_id) {
            return Err(Error::Query(
                "postings must be sorted by strictly increasing doc id".to_string(),
            ));
        }

        let mut skip_list = Vec::with_capacity(postings.len().div_ceil(BLOCK_SIZE));
        let mut data = Vec::new();
        let mut max_freq = 0u32;

        for block in postings.chunks(BLOCK_SIZE) {
            let offset = data.len() as u32;
            let first_doc = block[0].doc_id;
            let last_doc = block[block.len() - 1].doc_id;

            data.write_u32::<LittleEndian>(block.len() as u32)?;
            data.write_u32::<LittleEndian>(first_doc)?;
            let mut prev_doc_id = first_doc;
            for (j, posting) in block.iter().enumerate() {
                if j > 0 {
                    write_vint(&mut data, u64::from(posting.doc_id - prev_doc_id))?;
                }
                write_vint(&mut data, u64::from(posting.term_freq))?;
                write_vint(&mut data, u64::from(posting.norm))?;
                prev_doc_id = posting.doc_id;
                max_freq = max_freq.max(posting.term_freq);
            }

            let impacts = competitive_impacts(block.iter().map(|p| Impact {
                freq: p.term_freq,
                norm: p.norm,
            }));
            skip_list.push(SkipEntry {
                first_doc,
                last_doc,
                offset,
                impacts,
            });
        }

        let groups = Self::build_groups(&skip_list);

        Ok(Self {
            skip_list,
            groups,
            data,
            doc_count: postings.len() as u32,
            max_freq,
        })
    }

    fn build_groups(skip_list: &[SkipEntry]) -> Vec<GroupEntry> {
        skip_list
            .chunks(BLOCKS_PER_GROUP)
            .map(|blocks| GroupEntry {
                last_doc: blocks[blocks.len() - 1].last_doc,
                impacts: competitive_impacts(
                    blocks.iter().flat_map(|b| b.impacts.iter().copied()),
                ),
            })
            .collect()
    }

    /// Serialize the block posting list
    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.doc_count)?;
        writer.write_u32::<LittleEndian>(self.max_freq)?;

        writer.write_u32::<LittleEndian>(self.skip_list.len() as u32)?;
        for entry in &self.skip_list {
            writer.write_u32::<LittleEndian>(entry.first_doc)?;
            writer.write_u32::<LittleEndian>(entry.last_doc)?;
            writer.write_u32::<LittleEndian>(entry.offset)?;
            writer.write_u32::<LittleEndian>(entry.impacts.len() as u32)?;
            for impact in &entry.impacts {
                write_vint(writer, u64::from(impact.freq))?;
                write_vint(writer, u64::from(impact.norm))?;
            }
        }

        writer.write_u32::<LittleEndian>(self.data.len() as u32)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Deserialize. Structural inconsistencies are reported as corruption;
    /// block contents are only validated when a cursor decodes them.
    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let doc_count = reader.read_u32::<LittleEndian>()?;
        let max_freq = reader.read_u32::<LittleEndian>()?;

        let skip_count = reader.read_u32::<LittleEndian>()? as usize;
        if skip_count != (doc_count as usize).div_ceil(BLOCK_SIZE) {
            return Err(Error::Corruption(format!(
                "{} skip entries for {} docs",
                skip_count, doc_count
            )));
        }
        let mut skip_list = Vec::with_capacity(skip_count);
        for _ in 0..skip_count {
            let first_doc = reader.read_u32::<LittleEndian>()?;
            let last_doc = reader.read_u32::<LittleEndian>()?;
            let offset = reader.read_u32::<LittleEndian>()?;
            let num_impacts = reader.read_u32::<LittleEndian>()? as usize;
            let mut impacts = Vec::with_capacity(num_impacts.min(BLOCK_SIZE));
            for _ in 0..num_impacts {
                let freq = read_u32_vint(reader)?;
                let norm = read_u32_vint(reader)?;
                impacts.push(Impact { freq, norm });
            }
            if first_doc > last_doc || skip_list.last().is_some_and(|p: &SkipEntry| p.last_doc >= first_doc) {
                return Err(Error::Corruption(format!(
                    "skip entry [{}, {}] out of order",
                    first_doc, last_doc
                )));
            }
            skip_list.push(SkipEntry {
                first_doc,
                last_doc,
                offset,
                impacts,
            });
        }

        let data_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut data = vec![0u8; data_len];
        reader.read_exact(&mut data)?;
        if skip_list.iter().any(|e| e.offset as usize >= data_len) {
            return Err(Error::Corruption("block offset past end of data".to_string()));
        }

        let groups = Self::build_groups(&skip_list);
        Ok(Self {
            skip_list,
            groups,
            data,
            doc_count,
            max_freq,
        })
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Maximum term frequency across all postings
    pub fn max_freq(&self) -> u32 {
        self.max_freq
    }

    pub fn num_blocks(&self) -> usize {
        self.skip_list.len()
    }

    /// Competitive impacts of the whole list.
    pub fn global_impacts(&self) -> Vec<Impact> {
        competitive_impacts(self.groups.iter().flat_map(|g| g.impacts.iter().copied()))
    }

    /// Cursor positioned on the first posting.
    pub fn cursor(&self) -> Result<PostingsCursor<'_>> {
        PostingsCursor::new(self)
    }

    fn decode_block(&self, block_idx: usize, out: &mut Vec<Posting>) -> Result<()> {
        let entry = &self.skip_list[block_idx];
        let mut reader = &self.data[entry.offset as usize..];

        let count = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let first_doc = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        if count == 0 || count > BLOCK_SIZE || first_doc != entry.first_doc {
            return Err(Error::Corruption(format!(
                "block {} header mismatch (count={}, first_doc={})",
                block_idx, count, first_doc
            )));
        }

        out.clear();
        out.reserve(count);
        let mut doc_id = first_doc;
        for i in 0..count {
            if i > 0 {
                let delta = read_u32_vint(&mut reader).map_err(|_| truncated_block(block_idx))?;
                doc_id = match doc_id.checked_add(delta) {
                    Some(next) if delta > 0 && next != TERMINATED => next,
                    _ => {
                        return Err(Error::Corruption(format!(
                            "block {} has a non-increasing doc id",
                            block_idx
                        )));
                    }
                };
            }
            let term_freq = read_u32_vint(&mut reader).map_err(|_| truncated_block(block_idx))?;
            let norm = read_u32_vint(&mut reader).map_err(|_| truncated_block(block_idx))?;
            out.push(Posting {
                doc_id,
                term_freq,
                norm,
            });
        }
        if doc_id != entry.last_doc {
            return Err(Error::Corruption(format!(
                "block {} ends at doc {} but skip data says {}",
                block_idx, doc_id, entry.last_doc
            )));
        }
        Ok(())
    }
}

fn truncated(_: io::Error) -> Error {
    Error::Corruption("truncated block header".to_string())
}

fn truncated_block(block_idx: usize) -> Error {
    Error::Corruption(format!("block {} is truncated", block_idx))
}

/// Write variable-length integer
fn write_vint<W: Write>(writer: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            writer.write_u8(byte)?;
            return Ok(());
        } else {
            writer.write_u8(byte | 0x80)?;
        }
    }
}

/// Read variable-length integer that must fit in a u32
fn read_u32_vint<R: Read>(reader: &mut R) -> Result<u32> {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 35 {
            return Err(Error::Corruption("varint too long".to_string()));
        }
    }
    u32::try_from(result).map_err(|_| Error::Corruption(format!("varint {} overflows u32", result)))
}

/// Cursor over a block posting list with skip and impacts support
pub struct PostingsCursor<'a> {
    list: &'a PostingList,
    current_block: usize,
    block_postings: Vec<Posting>,
    position_in_block: usize,
    exhausted: bool,
    /// Block whose impacts are exposed; only moves forward.
    shallow_block: usize,
}

impl<'a> PostingsCursor<'a> {
    fn new(list: &'a PostingList) -> Result<Self> {
        let mut cursor = Self {
            list,
            current_block: 0,
            block_postings: Vec::with_capacity(BLOCK_SIZE),
            position_in_block: 0,
            exhausted: list.skip_list.is_empty(),
            shallow_block: 0,
        };
        if !cursor.exhausted {
            cursor.load_block(0)?;
        }
        Ok(cursor)
    }

    fn load_block(&mut self, block_idx: usize) -> Result<()> {
        if block_idx >= self.list.skip_list.len() {
            self.exhausted = true;
            self.current_block = self.list.skip_list.len();
            self.block_postings.clear();
            return Ok(());
        }
        self.current_block = block_idx;
        self.position_in_block = 0;
        self.list.decode_block(block_idx, &mut self.block_postings)
    }

    #[inline]
    fn current(&self) -> Option<&Posting> {
        if self.exhausted {
            None
        } else {
            self.block_postings.get(self.position_in_block)
        }
    }

    /// First block, at or after `from`, whose last doc is >= `target`.
    fn block_for(&self, from: usize, target: DocId) -> usize {
        let skip = &self.list.skip_list;
        let from = from.min(skip.len());
        from + skip[from..].partition_point(|e| e.last_doc < target)
    }

    /// Block currently described by the impacts view.
    pub fn impacts_block(&self) -> usize {
        self.shallow_block
    }
}

impl DocSet for PostingsCursor<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.current().map(|p| p.doc_id).unwrap_or(TERMINATED)
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.exhausted {
            return Ok(TERMINATED);
        }
        self.position_in_block += 1;
        if self.position_in_block >= self.block_postings.len() {
            self.load_block(self.current_block + 1)?;
        }
        Ok(self.doc())
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.exhausted || self.doc() >= target {
            return Ok(self.doc());
        }
        let block_idx = self.block_for(self.current_block, target);
        if block_idx != self.current_block {
            self.load_block(block_idx)?;
            if self.exhausted {
                return Ok(TERMINATED);
            }
        }
        let in_block = &self.block_postings[self.position_in_block..];
        self.position_in_block += in_block.partition_point(|p| p.doc_id < target);
        Ok(self.doc())
    }

    fn cost(&self) -> u64 {
        u64::from(self.list.doc_count)
    }
}

impl Postings for PostingsCursor<'_> {
    #[inline]
    fn term_freq(&self) -> u32 {
        self.current().map(|p| p.term_freq).unwrap_or(0)
    }

    #[inline]
    fn norm(&self) -> u32 {
        self.current().map(|p| p.norm).unwrap_or(0)
    }
}

impl ImpactsSource for PostingsCursor<'_> {
    fn advance_shallow(&mut self, target: DocId) -> Result<()> {
        self.shallow_block = self.block_for(self.shallow_block, target);
        Ok(())
    }

    fn num_levels(&self) -> usize {
        if self.shallow_block >= self.list.skip_list.len() {
            1
        } else {
            2
        }
    }

    fn doc_id_up_to(&self, level: usize) -> DocId {
        let num_blocks = self.list.skip_list.len();
        let block = self.shallow_block;
        if block >= num_blocks {
            return TERMINATED;
        }
        match level {
            0 if block + 1 == num_blocks => TERMINATED,
            0 => self.list.skip_list[block].last_doc,
            _ => {
                let group = block / BLOCKS_PER_GROUP;
                if group + 1 == self.list.groups.len() {
                    TERMINATED
                } else {
                    self.list.groups[group].last_doc
                }
            }
        }
    }

    fn impacts(&self, level: usize) -> &[Impact] {
        let block = self.shallow_block;
        if block >= self.list.skip_list.len() {
            return &[];
        }
        match level {
            0 => &self.list.skip_list[block].impacts,
            _ => &self.list.groups[block / BLOCKS_PER_GROUP].impacts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postings(n: u32, step: u32) -> Vec<Posting> {
        (0..n)
            .map(|i| Posting {
                doc_id: i * step,
                term_freq: (i % 10) + 1,
                norm: 10 + (i % 7),
            })
            .collect()
    }

    #[test]
    fn test_competitive_impacts_frontier() {
        let frontier = competitive_impacts(vec![
            Impact { freq: 1, norm: 5 },
            Impact { freq: 3, norm: 9 },
            Impact { freq: 2, norm: 4 },
            Impact { freq: 3, norm: 12 },
            Impact { freq: 1, norm: 20 },
        ]);
        assert_eq!(
            frontier,
            vec![Impact { freq: 2, norm: 4 }, Impact { freq: 3, norm: 9 }]
        );
    }

    #[test]
    fn test_cursor_iteration_and_seek() {
        let list = PostingList::from_postings(&postings(500, 2)).unwrap();
        assert_eq!(list.doc_count(), 500);
        assert_eq!(list.num_blocks(), 4);
        assert_eq!(list.max_freq(), 10);

        let mut cursor = list.cursor().unwrap();
        assert_eq!(cursor.doc(), 0);
        assert_eq!(cursor.term_freq(), 1);
        assert_eq!(cursor.norm(), 10);
        assert_eq!(cursor.advance().unwrap(), 2);

        // Test seek across blocks
        assert_eq!(cursor.seek(500).unwrap(), 500);
        assert_eq!(cursor.term_freq(), 1);
        assert_eq!(cursor.seek(501).unwrap(), 502);
        assert_eq!(cursor.seek(998).unwrap(), 998);
        assert_eq!(cursor.advance().unwrap(), TERMINATED);
        assert_eq!(cursor.seek(1000).unwrap(), TERMINATED);
    }

    #[test]
    fn test_rejects_unsorted_postings() {
        let mut p = postings(3, 1);
        p.swap(0, 2);
        assert!(PostingList::from_postings(&p).is_err());
    }

    #[test]
    fn test_impact_levels() {
        let list = PostingList::from_postings(&postings(2000, 1)).unwrap();
        assert_eq!(list.num_blocks(), 16);

        let mut cursor = list.cursor().unwrap();
        cursor.advance_shallow(0).unwrap();
        assert_eq!(cursor.num_levels(), 2);
        assert_eq!(cursor.doc_id_up_to(0), 127);
        assert_eq!(cursor.doc_id_up_to(1), 8 * 128 - 1);
        assert!(cursor.doc_id_up_to(0) <= cursor.doc_id_up_to(1));
        assert!(!cursor.impacts(0).is_empty());

        // shallow advance never moves the real cursor
        cursor.advance_shallow(1500).unwrap();
        assert_eq!(cursor.doc(), 0);
        assert_eq!(cursor.impacts_block(), 11);
        // last block and last group extend to the end of the doc id space
        assert_eq!(cursor.doc_id_up_to(1), TERMINATED);

        cursor.advance_shallow(1999).unwrap();
        assert_eq!(cursor.doc_id_up_to(0), TERMINATED);

        cursor.advance_shallow(5000).unwrap();
        assert_eq!(cursor.num_levels(), 1);
        assert!(cursor.impacts(0).is_empty());
    }

    #[test]
    fn test_block_impacts_bound_block_postings() {
        let list = PostingList::from_postings(&postings(300, 3)).unwrap();
        let mut cursor = list.cursor().unwrap();
        let mut probe = list.cursor().unwrap();
        while cursor.doc() != TERMINATED {
            probe.advance_shallow(cursor.doc()).unwrap();
            let (freq, norm) = (cursor.term_freq(), cursor.norm());
            assert!(
                probe
                    .impacts(0)
                    .iter()
                    .any(|i| i.freq >= freq && i.norm <= norm)
            );
            cursor.advance().unwrap();
        }
    }

    #[test]
    fn test_serialization() {
        let list = PostingList::from_postings(&postings(300, 3)).unwrap();

        let mut buffer = Vec::new();
        list.serialize(&mut buffer).unwrap();
        let deserialized = PostingList::deserialize(&mut &buffer[..]).unwrap();
        assert_eq!(deserialized.doc_count(), list.doc_count());
        assert_eq!(deserialized.global_impacts(), list.global_impacts());

        let mut iter1 = list.cursor().unwrap();
        let mut iter2 = deserialized.cursor().unwrap();
        while iter1.doc() != TERMINATED {
            assert_eq!(iter1.doc(), iter2.doc());
            assert_eq!(iter1.term_freq(), iter2.term_freq());
            assert_eq!(iter1.norm(), iter2.norm());
            iter1.advance().unwrap();
            iter2.advance().unwrap();
        }
        assert_eq!(iter2.doc(), TERMINATED);
    }

    #[test]
    fn test_corrupt_block_surfaces_on_decode() {
        let list = PostingList::from_postings(&postings(300, 3)).unwrap();
        let mut buffer = Vec::new();
        list.serialize(&mut buffer).unwrap();

        // Zero out the tail of the encoded data: the skip data stays consistent
        // but the last block no longer decodes to its recorded last doc.
        let len = buffer.len();
        for b in &mut buffer[len - 40..] {
            *b = 0;
        }
        let corrupt = PostingList::deserialize(&mut &buffer[..]).unwrap();
        let mut cursor = corrupt.cursor().unwrap();
        let err = cursor.seek(800).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let list = PostingList::from_postings(&postings(10, 1)).unwrap();
        let mut buffer = Vec::new();
        list.serialize(&mut buffer).unwrap();
        buffer.truncate(buffer.len() - 3);
        assert!(PostingList::deserialize(&mut &buffer[..]).is_err());
    }
}
