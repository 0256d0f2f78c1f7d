pub mod error;
pub mod remote;
pub mod source;
pub mod task;

pub use error::{CoreError, CoreErrorKind};
pub use remote::{InstallScope, InstalledRef, RefKind, Remote};
pub use source::SourceLine;
pub use task::{TaskId, TaskKind, TaskStatus};
