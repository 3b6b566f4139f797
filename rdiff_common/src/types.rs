use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Outcome of comparing one pair, ordered by how bad it is.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// Inputs are the same
    #[default]
    Success,
    /// Inputs differ
    Differ,
    /// A file could not be resolved, opened or read
    Trouble,
}

impl Severity {
    /// Process exit status for this severity.
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Success => 0,
            Severity::Differ => 1,
            Severity::Trouble => 2,
        }
    }

    pub fn merge(self, other: Severity) -> Severity {
        self.max(other)
    }

    pub fn is_success(self) -> bool {
        self == Severity::Success
    }
}

impl FromIterator<Severity> for Severity {
    fn from_iter<I: IntoIterator<Item = Severity>>(iter: I) -> Self {
        iter.into_iter().fold(Severity::Success, Severity::merge)
    }
}

/// Which operand of a pair a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// File type as reported by `stat`/`lstat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Fifo,
    Socket,
    CharDevice,
    BlockDevice,
    Unknown,
}

impl FileKind {
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_file() {
            return FileKind::Regular;
        }
        if file_type.is_dir() {
            return FileKind::Directory;
        }
        if file_type.is_symlink() {
            return FileKind::Symlink;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_fifo() {
                return FileKind::Fifo;
            }
            if file_type.is_socket() {
                return FileKind::Socket;
            }
            if file_type.is_char_device() {
                return FileKind::CharDevice;
            }
            if file_type.is_block_device() {
                return FileKind::BlockDevice;
            }
        }

        FileKind::Unknown
    }

    /// Human-readable name used in "File A is a ... while file B is a ..."
    pub fn describe(self, size: u64) -> &'static str {
        match self {
            FileKind::Regular if size == 0 => "regular empty file",
            FileKind::Regular => "regular file",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symbolic link",
            FileKind::Fifo => "fifo",
            FileKind::Socket => "socket",
            FileKind::CharDevice => "character special file",
            FileKind::BlockDevice => "block special file",
            FileKind::Unknown => "weird file",
        }
    }
}

/// Attributes of one resolved entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub kind: FileKind,
    pub size: u64,
    /// Full `st_mode`, type bits included
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub dev: u64,
    pub ino: u64,
    pub modified: SystemTime,
    pub changed: SystemTime,
}

impl Default for EntityMetadata {
    fn default() -> Self {
        Self {
            kind: FileKind::Unknown,
            size: 0,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            dev: 0,
            ino: 0,
            modified: UNIX_EPOCH,
            changed: UNIX_EPOCH,
        }
    }
}

impl EntityMetadata {
    #[cfg(unix)]
    pub fn from_fs(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            kind: FileKind::from_file_type(meta.file_type()),
            size: meta.len(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            dev: meta.dev(),
            ino: meta.ino(),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            changed: unix_time(meta.ctime(), meta.ctime_nsec()),
        }
    }

    #[cfg(not(unix))]
    pub fn from_fs(meta: &Metadata) -> Self {
        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
        Self {
            kind: FileKind::from_file_type(meta.file_type()),
            size: meta.len(),
            mode,
            nlink: 1,
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            ..Self::default()
        }
    }

    /// Stand-in for a missing file: the other side's type, everything else zeroed.
    pub fn absent_like(other: &EntityMetadata) -> Self {
        Self {
            kind: other.kind,
            mode: other.mode,
            ..Self::default()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    pub fn describe(&self) -> &'static str {
        self.kind.describe(self.size)
    }

    /// Both names lead to the same device and inode
    pub fn same_file(&self, other: &EntityMetadata) -> bool {
        self.ino != 0 && self.dev == other.dev && self.ino == other.ino
    }

    /// Attribute equality required on top of `same_file` before a pair is
    /// considered identical without reading it.
    pub fn same_attributes(&self, other: &EntityMetadata) -> bool {
        self.mode == other.mode
            && self.nlink == other.nlink
            && self.uid == other.uid
            && self.gid == other.gid
            && self.size == other.size
            && self.modified == other.modified
            && self.changed == other.changed
    }

    /// A zero-length regular file without any permission bits, as left
    /// behind by `patch` for a file that does not exist.
    pub fn is_placeholder_for_missing(&self) -> bool {
        self.is_regular() && self.mode & 0o777 == 0 && self.size == 0
    }
}

#[cfg(unix)]
fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs.clamp(0, 999_999_999) as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
