//! In-memory segment: per-term block posting lists plus per-document length norms

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use rustc_hash::FxHashMap;

use super::postings::{Posting, PostingList};
use crate::{DocId, Error, Result};

/// Read-only segment of the collection.
///
/// Local doc ids start at 0; `doc_base` maps them into the global id space
/// when results of several segments are merged.
#[derive(Debug, Clone)]
pub struct MemorySegment {
    segment_id: u32,
    doc_base: DocId,
    norms: Vec<u32>,
    total_len: u64,
    terms: FxHashMap<String, PostingList>,
}

impl MemorySegment {
    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    pub fn doc_base(&self) -> DocId {
        self.doc_base
    }

    pub fn num_docs(&self) -> u32 {
        self.norms.len() as u32
    }

    /// Sum of all document lengths
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Length norm of a local doc, 0 when out of range.
    pub fn norm(&self, doc: DocId) -> u32 {
        self.norms.get(doc as usize).copied().unwrap_or(0)
    }

    pub fn postings(&self, term: &str) -> Option<&PostingList> {
        self.terms.get(term)
    }

    pub fn doc_freq(&self, term: &str) -> u32 {
        self.terms.get(term).map(|p| p.doc_count()).unwrap_or(0)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    /// Serialize norms and every posting list, terms in sorted order.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.segment_id)?;
        writer.write_u32::<LittleEndian>(self.doc_base)?;
        writer.write_u32::<LittleEndian>(self.norms.len() as u32)?;
        for &norm in &self.norms {
            writer.write_u32::<LittleEndian>(norm)?;
        }

        let mut terms: Vec<_> = self.terms.iter().collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(b.0));
        writer.write_u32::<LittleEndian>(terms.len() as u32)?;
        for (term, postings) in terms {
            writer.write_u32::<LittleEndian>(term.len() as u32)?;
            writer.write_all(term.as_bytes())?;
            postings.serialize(writer)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let segment_id = reader.read_u32::<LittleEndian>()?;
        let doc_base = reader.read_u32::<LittleEndian>()?;
        let num_docs = reader.read_u32::<LittleEndian>()? as usize;
        let mut norms = Vec::with_capacity(num_docs.min(1 << 20));
        for _ in 0..num_docs {
            norms.push(reader.read_u32::<LittleEndian>()?);
        }
        let total_len = norms.iter().map(|&n| u64::from(n)).sum();

        let num_terms = reader.read_u32::<LittleEndian>()? as usize;
        let mut terms = FxHashMap::default();
        for _ in 0..num_terms {
            let len = reader.read_u32::<LittleEndian>()? as usize;
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes)?;
            let term = String::from_utf8(bytes)
                .map_err(|e| Error::Corruption(format!("term is not utf-8: {}", e)))?;
            let postings = PostingList::deserialize(reader)?;
            terms.insert(term, postings);
        }

        Ok(Self {
            segment_id,
            doc_base,
            norms,
            total_len,
            terms,
        })
    }
}

/// Accumulates documents in id order and encodes them into a [`MemorySegment`].
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    segment_id: u32,
    doc_base: DocId,
    norms: Vec<u32>,
    inverted: FxHashMap<String, Vec<Posting>>,
}

impl SegmentBuilder {
    pub fn new(segment_id: u32) -> Self {
        Self {
            segment_id,
            ..Default::default()
        }
    }

    pub fn with_doc_base(mut self, doc_base: DocId) -> Self {
        self.doc_base = doc_base;
        self
    }

    pub fn num_docs(&self) -> u32 {
        self.norms.len() as u32
    }

    /// Add a document given as a token sequence. Returns its local doc id.
    /// The length norm is the token count.
    pub fn add_document<'t>(&mut self, tokens: impl IntoIterator<Item = &'t str>) -> DocId {
        let doc_id = self.norms.len() as DocId;
        let mut freqs: FxHashMap<&str, u32> = FxHashMap::default();
        let mut len = 0u32;
        for token in tokens {
            *freqs.entry(token).or_insert(0) += 1;
            len += 1;
        }
        for (term, term_freq) in freqs {
            self.inverted
                .entry(term.to_string())
                .or_default()
                .push(Posting {
                    doc_id,
                    term_freq,
                    norm: len,
                });
        }
        self.norms.push(len);
        doc_id
    }

    /// Lowercase, whitespace-tokenized text document.
    pub fn add_text(&mut self, text: &str) -> DocId {
        let lowered = text.to_lowercase();
        self.add_document(lowered.split_whitespace())
    }

    pub fn build(self) -> Result<MemorySegment> {
        let mut terms = FxHashMap::default();
        terms.reserve(self.inverted.len());
        for (term, postings) in self.inverted {
            terms.insert(term, PostingList::from_postings(&postings)?);
        }
        let total_len = self.norms.iter().map(|&n| u64::from(n)).sum();

        debug!(
            "Built segment: id={}, doc_base={}, docs={}, terms={}",
            self.segment_id,
            self.doc_base,
            self.norms.len(),
            terms.len()
        );

        Ok(MemorySegment {
            segment_id: self.segment_id,
            doc_base: self.doc_base,
            norms: self.norms,
            total_len,
            terms,
        })
    }
}
