//! Units of work: one uniquely named file change each.

use uuid::Uuid;

/// An immutable file change to land on the branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    /// Globally unique identifier
    pub id: Uuid,
    /// Dispatch index within the run
    pub index: usize,
    /// Repository path of the file
    pub path: String,
    /// File content
    pub content: String,
    /// Commit message
    pub message: String,
}

impl UnitOfWork {
    /// Build the unit for `index` with a fresh random identifier
    pub fn new(index: usize) -> Self {
        Self::with_id(index, Uuid::new_v4())
    }

    /// Build the unit for `index` with a given identifier
    pub fn with_id(index: usize, id: Uuid) -> Self {
        Self {
            id,
            index,
            path: format!("unique-file-{id}.txt"),
            content: format!("This is unique content for file {index} with UUID {id}"),
            message: format!("Adding file {index} with UUID {id}"),
        }
    }
}
