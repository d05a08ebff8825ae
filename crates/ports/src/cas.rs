//! Three-way compare-and-swap outcome at the storage-adapter boundary
//!
//! The underlying document store has no row locking visible to this layer.
//! Version-matched conditional replacement is the substitute, and its
//! outcome must stay three-way all the way up to the repositories: an
//! update that matched nothing is either a record that never existed or a
//! record another writer already advanced, and those map to different
//! caller-visible errors.

/// Result of a conditional replace matched on (id, expected version).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write matched and replaced the stored document.
    Updated,
    /// A document exists at this id but its version differs from the
    /// expected one; carries the version currently stored.
    StaleVersion { current: i32 },
    /// No document exists at this id.
    NotFound,
}
