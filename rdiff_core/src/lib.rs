pub mod comparison;
pub mod lister;
pub mod pair;
pub mod reporter;
pub mod resolver;
pub mod status;
pub mod text_diff;

pub use comparison::ComparisonEngine;
pub use lister::{ChildNames, DirectoryLister, FsLister, ListingError};
pub use pair::{classify, Action, ComparisonPair};
pub use reporter::{AnnouncingSink, Reporter, Sink};
pub use resolver::{Descriptor, EntityResolver, EntitySlot, Handle, SlotError, STDIN_NAME};
pub use status::StatusAggregator;
pub use text_diff::{ContentDiffer, ContentInput, TextDiffEngine};
