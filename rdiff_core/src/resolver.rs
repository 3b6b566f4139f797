use crate::pair::ComparisonPair;
use rdiff_common::{DiffOptions, EntityMetadata, Side};
use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;
use tracing::debug;

/// Operand name that stands for standard input
pub const STDIN_NAME: &str = "-";

#[cfg(unix)]
const EBADF: i32 = 9;

/// Shared read handle; both sides hold the same `Rc` when they are one file.
pub type Handle = Rc<File>;

/// OS error recorded on a slot that failed to resolve or open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotError {
    kind: io::ErrorKind,
    raw_os_error: Option<i32>,
    message: String,
}

impl SlotError {
    /// Not-found or bad-descriptor failures, which `-N` may turn into absence
    pub fn is_missing(&self) -> bool {
        if self.kind == io::ErrorKind::NotFound {
            return true;
        }
        #[cfg(unix)]
        if self.raw_os_error == Some(EBADF) {
            return true;
        }
        false
    }
}

impl From<&io::Error> for SlotError {
    fn from(err: &io::Error) -> Self {
        let raw_os_error = err.raw_os_error();
        let mut message = err.to_string();
        // Print "No such file or directory", not "... (os error 2)".
        if let Some(code) = raw_os_error {
            let suffix = format!(" (os error {code})");
            if let Some(stripped) = message.strip_suffix(&suffix) {
                message = stripped.to_string();
            }
        }
        Self {
            kind: err.kind(),
            raw_os_error,
            message,
        }
    }
}

impl From<io::Error> for SlotError {
    fn from(err: io::Error) -> Self {
        SlotError::from(&err)
    }
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Resolution state of one side of a pair
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Never supplied, or standing in for a missing file
    Absent,
    /// Stated but not opened; directories stay here
    Unopened,
    Open(Handle),
    Failed(SlotError),
}

#[derive(Debug, Clone)]
pub struct EntitySlot {
    pub name: PathBuf,
    pub descriptor: Descriptor,
    pub metadata: EntityMetadata,
}

impl EntitySlot {
    pub fn absent(name: PathBuf) -> Self {
        Self {
            name,
            descriptor: Descriptor::Absent,
            metadata: EntityMetadata::default(),
        }
    }

    pub fn failed(name: PathBuf, err: SlotError) -> Self {
        Self {
            name,
            descriptor: Descriptor::Failed(err),
            metadata: EntityMetadata::default(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.descriptor, Descriptor::Absent)
    }

    pub fn failure(&self) -> Option<&SlotError> {
        match &self.descriptor {
            Descriptor::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }

    /// Stated or already open (standard input)
    pub fn is_resolved(&self) -> bool {
        matches!(self.descriptor, Descriptor::Unopened | Descriptor::Open(_))
    }

    pub fn is_stdin(&self) -> bool {
        self.name.as_os_str() == STDIN_NAME
    }
}

/// Turns operand names into resolved `EntitySlot`s
pub struct EntityResolver<'a> {
    options: &'a DiffOptions,
}

impl<'a> EntityResolver<'a> {
    pub fn new(options: &'a DiffOptions) -> Self {
        Self { options }
    }

    /// Resolve both sides of a pair. Names are joined onto the parent's
    /// directories; a missing name borrows the other side's basename.
    /// Failures are recorded on the slots, never returned.
    pub fn resolve_pair<'p>(
        &self,
        parent: Option<&'p ComparisonPair<'p>>,
        left: Option<&OsStr>,
        right: Option<&OsStr>,
    ) -> ComparisonPair<'p> {
        let left_name = left.or(right).unwrap_or_default();
        let right_name = right.or(left).unwrap_or_default();

        let (left_path, right_path) = match parent {
            Some(parent) => (
                parent.left.name.join(left_name),
                parent.right.name.join(right_name),
            ),
            None => (PathBuf::from(left_name), PathBuf::from(right_name)),
        };

        let mut left_slot = match left {
            Some(_) => self.resolve(&left_path),
            None => EntitySlot::absent(left_path),
        };
        let mut right_slot = match right {
            Some(_) if left.is_some() && right_path == left_slot.name => EntitySlot {
                name: right_path,
                ..left_slot.clone()
            },
            Some(_) => self.resolve(&right_path),
            None => EntitySlot::absent(right_path),
        };

        let top_level = parent.is_none();
        if self.promote_to_absent(Side::Left, &left_slot, &right_slot, top_level) {
            left_slot.descriptor = Descriptor::Absent;
        }
        if self.promote_to_absent(Side::Right, &right_slot, &left_slot, top_level) {
            right_slot.descriptor = Descriptor::Absent;
        }

        if left_slot.is_absent() {
            left_slot.metadata = EntityMetadata::absent_like(&right_slot.metadata);
        }
        if right_slot.is_absent() {
            right_slot.metadata = EntityMetadata::absent_like(&left_slot.metadata);
        }

        ComparisonPair {
            left: left_slot,
            right: right_slot,
            parent,
        }
    }

    /// Whether `slot` should be treated as a missing file under `-N`/`-P`.
    fn promote_to_absent(
        &self,
        side: Side,
        slot: &EntitySlot,
        other: &EntitySlot,
        top_level: bool,
    ) -> bool {
        if !self.options.absent_allowed(side) {
            return false;
        }

        match &slot.descriptor {
            Descriptor::Unopened => slot.metadata.is_placeholder_for_missing(),
            Descriptor::Failed(err) => err.is_missing() && top_level && other.is_resolved(),
            Descriptor::Absent | Descriptor::Open(_) => false,
        }
    }

    /// Stat `name` (or take standard input for `-`).
    pub fn resolve(&self, name: &Path) -> EntitySlot {
        if name.as_os_str() == STDIN_NAME {
            return self.resolve_stdin(name);
        }

        match self.stat(name) {
            Ok(meta) => {
                debug!("Resolved {:?} as {:?}", name, meta.file_type());
                EntitySlot {
                    name: name.to_path_buf(),
                    descriptor: Descriptor::Unopened,
                    metadata: EntityMetadata::from_fs(&meta),
                }
            }
            Err(e) => {
                debug!("Failed to stat {:?}: {}", name, e);
                EntitySlot::failed(name.to_path_buf(), SlotError::from(e))
            }
        }
    }

    #[cfg(unix)]
    fn resolve_stdin(&self, name: &Path) -> EntitySlot {
        use std::io::Seek;
        use std::os::fd::AsFd;

        let file = match io::stdin().as_fd().try_clone_to_owned() {
            Ok(fd) => File::from(fd),
            Err(e) => return EntitySlot::failed(name.to_path_buf(), SlotError::from(e)),
        };
        let meta = match file.metadata() {
            Ok(meta) => meta,
            Err(e) => return EntitySlot::failed(name.to_path_buf(), SlotError::from(e)),
        };

        let mut metadata = EntityMetadata::from_fs(&meta);
        if metadata.is_regular() {
            let mut reader = &file;
            match reader.stream_position() {
                Ok(pos) => metadata.size = metadata.size.saturating_sub(pos),
                Err(e) => return EntitySlot::failed(name.to_path_buf(), SlotError::from(e)),
            }
        }
        // Pipes have no meaningful mtime; POSIX asks for the current time.
        metadata.modified = SystemTime::now();

        EntitySlot {
            name: name.to_path_buf(),
            descriptor: Descriptor::Open(Rc::new(file)),
            metadata,
        }
    }

    #[cfg(not(unix))]
    fn resolve_stdin(&self, name: &Path) -> EntitySlot {
        EntitySlot::failed(
            name.to_path_buf(),
            SlotError::from(io::Error::new(
                io::ErrorKind::Unsupported,
                "reading standard input is not supported on this platform",
            )),
        )
    }

    /// `stat`, or `lstat` when symbolic links are compared as such
    pub fn stat(&self, path: &Path) -> io::Result<fs::Metadata> {
        if self.options.no_dereference {
            fs::symlink_metadata(path)
        } else {
            fs::metadata(path)
        }
    }

    /// Point `slot` at `name` and stat it again.
    pub fn restat(&self, slot: &mut EntitySlot, name: PathBuf) -> Result<(), SlotError> {
        let result = self.stat(&name);
        slot.name = name;
        match result {
            Ok(meta) => {
                slot.metadata = EntityMetadata::from_fs(&meta);
                Ok(())
            }
            Err(e) => {
                let err = SlotError::from(e);
                slot.descriptor = Descriptor::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Open a slot for reading. Absent slots read as empty and yield `None`.
    pub fn open(&self, slot: &EntitySlot) -> Result<Option<Handle>, SlotError> {
        match &slot.descriptor {
            Descriptor::Absent => Ok(None),
            Descriptor::Open(handle) => Ok(Some(Rc::clone(handle))),
            Descriptor::Unopened => {
                let file = File::open(&slot.name)?;
                Ok(Some(Rc::new(file)))
            }
            Descriptor::Failed(err) => Err(err.clone()),
        }
    }
}
