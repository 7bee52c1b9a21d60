//! Page-level state machines: the document filter sweep and the forum
//! traversal.

mod documents;
mod forum;
mod gate;

pub use documents::{DocumentSweep, PartFailure, SweepReport};
pub use forum::{CategoryFailure, ForumReport, ForumTraversal, PostFailure};
pub use gate::{is_present, ClickGate};
