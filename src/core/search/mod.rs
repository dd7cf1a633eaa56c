//! Tree search over candidate refinements.
//!
//! - `state`: value-typed search state (`SearchNode`, `SearchState`)
//! - `beam`: verifier-guided beam search

pub mod beam;
pub mod state;

pub use beam::{select_top_k, BeamSearch, BeamSearchConfig, BeamSearchOutcome};
pub use state::{SearchNode, SearchState};
