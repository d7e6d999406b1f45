//! Query types and search execution

mod accumulator;
mod block_max;
mod boolean;
mod collector;
mod conjunction;
mod constant;
mod disjunction;
mod docset;
mod impacts;
mod max_score;
mod req_excl;
mod req_opt;
mod scored_docs;
mod searcher;
mod similarity;
mod stats;
mod term;
mod traits;
mod two_phase;
mod wand;

pub use accumulator::*;
pub use block_max::*;
pub use boolean::*;
pub use collector::*;
pub use conjunction::*;
pub use constant::*;
pub use disjunction::*;
pub use docset::*;
pub use impacts::*;
pub use max_score::*;
pub use req_excl::*;
pub use req_opt::*;
pub use scored_docs::*;
pub use searcher::*;
pub use similarity::*;
pub use stats::*;
pub use term::*;
pub use traits::*;
pub use two_phase::*;
pub use wand::*;
