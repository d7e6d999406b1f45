//! Storage structures backing query execution

mod postings;
mod segment;

pub use postings::{
    BLOCK_SIZE, BLOCKS_PER_GROUP, Impact, Posting, PostingList, PostingsCursor,
    competitive_impacts,
};
pub use segment::{MemorySegment, SegmentBuilder};
