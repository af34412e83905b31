//! Per-subject and global experiment state.
//!
//! One [`AnimalRecord`] per tag id tracks a subject's progress through the
//! experiment; one [`GlobalRecord`] tracks process-wide counters (daily
//! reward budget, shared shuffle state). Both persist across restarts via
//! [`RecordStore`]; the [`schema`] module declares which fields reset at
//! the start of a new session.

pub mod schema;

mod animal;
mod global;
mod store;
mod window;

pub use animal::AnimalRecord;
pub use global::GlobalRecord;
pub use store::RecordStore;
pub use window::SlidingWindow;
