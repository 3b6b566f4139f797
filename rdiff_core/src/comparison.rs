use crate::lister::DirectoryLister;
use crate::pair::{classify, Action, ComparisonPair};
use crate::reporter::{AnnouncingSink, Sink};
use crate::resolver::{EntityResolver, SlotError};
use crate::status::StatusAggregator;
use crate::text_diff::{ContentDiffer, ContentInput};
use rdiff_common::{DiffOptions, RDiffError, Result, Severity, Side};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Walks operand pairs depth-first and decides how each pair compares.
///
/// Resolution problems are reported to the sink and surface as
/// `Severity::Trouble`; only usage and output failures come back as `Err`.
pub struct ComparisonEngine<'a> {
    options: &'a DiffOptions,
    resolver: EntityResolver<'a>,
    lister: &'a dyn DirectoryLister,
    differ: &'a dyn ContentDiffer,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(
        options: &'a DiffOptions,
        lister: &'a dyn DirectoryLister,
        differ: &'a dyn ContentDiffer,
    ) -> Self {
        Self {
            options,
            resolver: EntityResolver::new(options),
            lister,
            differ,
        }
    }

    /// Compare every top-level operand pair. All pairs are visited even after
    /// a failure; the result is the worst severity seen.
    pub fn compare_all<I, L, R>(&self, pairs: I, sink: &mut dyn Sink) -> Result<Severity>
    where
        I: IntoIterator<Item = (L, R)>,
        L: AsRef<OsStr>,
        R: AsRef<OsStr>,
    {
        let mut status = StatusAggregator::new();
        for (left, right) in pairs {
            let severity =
                self.compare_files(None, Some(left.as_ref()), Some(right.as_ref()), sink)?;
            status.record(severity);
        }

        info!(
            "Compared {} operand pairs: {:?}",
            status.visited(),
            status.severity()
        );
        Ok(status.severity())
    }

    /// Compare one pair of names. Top-level operands have no `parent`; for
    /// children the names are basenames inside the parent's directories and
    /// one of them may be missing.
    pub fn compare_files<'p>(
        &self,
        parent: Option<&'p ComparisonPair<'p>>,
        left: Option<&OsStr>,
        right: Option<&OsStr>,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        if let Some(parent) = parent {
            if let Some(severity) = self.report_only_in(parent, left, right, sink)? {
                return Ok(severity);
            }
        }

        let mut pair = self.resolver.resolve_pair(parent, left, right);

        let mut severity = self.report_failures(&pair, sink);
        if severity.is_success() && pair.is_top_level() {
            severity = self.redirect_directory_operand(&mut pair, sink)?;
        }

        let action = if severity.is_success() {
            classify(&pair, self.options)
        } else {
            Action::Trouble
        };
        debug!(
            "{:?} for {:?} and {:?}",
            action, pair.left.name, pair.right.name
        );

        let severity = self.execute(&pair, action, sink)?;

        if severity.is_success() {
            if self.options.report_identical
                && action != Action::NothingToCompare
                && !pair.left.metadata.is_dir()
            {
                sink.message(format_args!(
                    "Files {} and {} are identical\n",
                    self.display_label(&pair, Side::Left),
                    self.display_label(&pair, Side::Right)
                ))?;
            }
        } else {
            sink.flush()?;
        }
        Ok(severity)
    }

    /// A child present on one side only is reported without any I/O unless
    /// `-N` (or `--unidirectional-new-file` for a missing left) admits it.
    fn report_only_in(
        &self,
        parent: &ComparisonPair<'_>,
        left: Option<&OsStr>,
        right: Option<&OsStr>,
        sink: &mut dyn Sink,
    ) -> Result<Option<Severity>> {
        let admitted = (left.is_some() && right.is_some())
            || self.options.new_file
            || (self.options.unidirectional_new_file && right.is_some());
        if admitted {
            return Ok(None);
        }

        let (side, name) = match (left, right) {
            (Some(name), _) => (Side::Left, name),
            (None, Some(name)) => (Side::Right, name),
            (None, None) => return Ok(Some(Severity::Success)),
        };
        self.only_in(&parent.slot(side).name, name, sink)?;
        sink.flush()?;
        Ok(Some(Severity::Differ))
    }

    fn only_in(&self, dir: &Path, name: &OsStr, sink: &mut dyn Sink) -> Result<()> {
        sink.message(format_args!(
            "Only in {}: {}\n",
            dir.display(),
            Path::new(name).display()
        ))
    }

    /// Report slot failures once each; a deduplicated right side is not
    /// reported again.
    fn report_failures(&self, pair: &ComparisonPair<'_>, sink: &mut dyn Sink) -> Severity {
        let mut severity = Severity::Success;
        if let Some(err) = pair.left.failure() {
            sink.error(&pair.left.name, err);
            severity = Severity::Trouble;
        }
        if let Some(err) = pair.right.failure() {
            if pair.right.name != pair.left.name || pair.left.failure().is_none() {
                sink.error(&pair.right.name, err);
            }
            severity = Severity::Trouble;
        }
        severity
    }

    /// A top-level directory compared with a file stands for the file of the
    /// same basename inside that directory.
    fn redirect_directory_operand(
        &self,
        pair: &mut ComparisonPair<'_>,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        let left_is_dir = pair.left.metadata.is_dir();
        if left_is_dir == pair.right.metadata.is_dir() {
            return Ok(Severity::Success);
        }

        let (file_slot, dir_slot) = if left_is_dir {
            (&pair.right, &mut pair.left)
        } else {
            (&pair.left, &mut pair.right)
        };
        if file_slot.is_stdin() {
            return Err(RDiffError::usage("cannot compare '-' to a directory"));
        }

        let basename: OsString = file_slot
            .name
            .components()
            .next_back()
            .map(|c| c.as_os_str().to_os_string())
            .unwrap_or_else(|| file_slot.name.clone().into_os_string());
        let target = dir_slot.name.join(basename);
        debug!("Comparing {:?} with {:?}", file_slot.name, target);

        match self.resolver.restat(dir_slot, target) {
            Ok(()) => Ok(Severity::Success),
            Err(err) => {
                sink.error(&dir_slot.name, &err);
                Ok(Severity::Trouble)
            }
        }
    }

    fn execute(
        &self,
        pair: &ComparisonPair<'_>,
        action: Action,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        match action {
            Action::Trouble => Ok(Severity::Trouble),
            Action::NothingToCompare | Action::SameFile => Ok(Severity::Success),
            Action::CommonSubdirectories => {
                sink.message(format_args!(
                    "Common subdirectories: {} and {}\n",
                    pair.left.name.display(),
                    pair.right.name.display()
                ))?;
                Ok(Severity::Success)
            }
            Action::Recurse => self.compare_directories(pair, sink),
            Action::OnlyIn(present) => match pair.parent {
                Some(parent) => {
                    let name = pair
                        .slot(present)
                        .name
                        .file_name()
                        .unwrap_or_else(|| pair.slot(present).name.as_os_str());
                    self.only_in(&parent.slot(present).name, name, sink)?;
                    Ok(Severity::Differ)
                }
                None => self.type_mismatch(pair, sink),
            },
            Action::TypeMismatch => self.type_mismatch(pair, sink),
            Action::CompareSymlinks => self.compare_symlinks(pair, sink),
            Action::QuickDiffer => {
                sink.message(format_args!(
                    "Files {} and {} differ\n",
                    self.display_label(pair, Side::Left),
                    self.display_label(pair, Side::Right)
                ))?;
                Ok(Severity::Differ)
            }
            Action::ContentDiff => self.compare_contents(pair, sink),
        }
    }

    fn type_mismatch(&self, pair: &ComparisonPair<'_>, sink: &mut dyn Sink) -> Result<Severity> {
        sink.message(format_args!(
            "File {} is a {} while file {} is a {}\n",
            self.display_label(pair, Side::Left),
            pair.left.metadata.describe(),
            self.display_label(pair, Side::Right),
            pair.right.metadata.describe()
        ))?;
        Ok(Severity::Differ)
    }

    fn compare_directories(
        &self,
        pair: &ComparisonPair<'_>,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        // Descending stops only once neither side can reach a new directory.
        let stuck = |side: Side| {
            let slot = pair.slot(side);
            slot.is_absent()
                || pair
                    .ancestors()
                    .any(|ancestor| ancestor.slot(side).metadata.same_file(&slot.metadata))
        };
        if stuck(Side::Left) && stuck(Side::Right) {
            let named = if pair.left.is_absent() {
                &pair.right
            } else {
                &pair.left
            };
            sink.error(&named.name, &"recursive directory loop");
            return Ok(Severity::Trouble);
        }

        let dir = |side: Side| {
            let slot = pair.slot(side);
            (!slot.is_absent()).then_some(slot.name.as_path())
        };
        let children =
            match self
                .lister
                .list_children(dir(Side::Left), dir(Side::Right), pair.is_top_level())
            {
                Ok(children) => children,
                Err(err) => {
                    sink.error(&err.path, &SlotError::from(&err.source));
                    return Ok(Severity::Trouble);
                }
            };
        debug!(
            "Descending into {:?} and {:?}: {} entries",
            pair.left.name,
            pair.right.name,
            children.len()
        );

        let mut status = StatusAggregator::new();
        for child in &children {
            let severity = self.compare_files(
                Some(pair),
                child.left.as_deref(),
                child.right.as_deref(),
                sink,
            )?;
            status.record(severity);
        }
        Ok(status.severity())
    }

    fn compare_symlinks(
        &self,
        pair: &ComparisonPair<'_>,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        let mut targets = Vec::with_capacity(2);
        for slot in [&pair.left, &pair.right] {
            // An absent link has no target.
            if slot.is_absent() {
                targets.push(OsString::new());
                continue;
            }
            match fs::read_link(&slot.name) {
                Ok(target) => targets.push(target.into_os_string()),
                Err(e) => {
                    sink.error(&slot.name, &SlotError::from(&e));
                    return Ok(Severity::Trouble);
                }
            }
        }

        if targets[0] == targets[1] {
            return Ok(Severity::Success);
        }
        sink.message(format_args!(
            "Symbolic links {} and {} differ\n",
            pair.left.name.display(),
            pair.right.name.display()
        ))?;
        Ok(Severity::Differ)
    }

    /// Open both sides and hand them to the content engine. Handles are
    /// dropped on return; a shared handle is closed once.
    fn compare_contents(
        &self,
        pair: &ComparisonPair<'_>,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        let mut trouble = false;

        let left_handle = match self.resolver.open(&pair.left) {
            Ok(handle) => handle,
            Err(err) => {
                sink.error(&pair.left.name, &err);
                trouble = true;
                None
            }
        };
        let right_handle = if pair.same_file() && left_handle.is_some() {
            left_handle.clone()
        } else {
            match self.resolver.open(&pair.right) {
                Ok(handle) => handle,
                Err(err) => {
                    sink.error(&pair.right.name, &err);
                    trouble = true;
                    None
                }
            }
        };
        if trouble {
            return Ok(Severity::Trouble);
        }

        let left = ContentInput {
            slot: &pair.left,
            label: self.options.label(Side::Left),
            handle: left_handle.as_ref(),
        };
        let right = ContentInput {
            slot: &pair.right,
            label: self.options.label(Side::Right),
            handle: right_handle.as_ref(),
        };
        if pair.parent.is_none() {
            return self.differ.diff(&left, &right, sink);
        }
        let header = format!(
            "diff{} {} {}\n",
            self.options.switches,
            pair.left.name.display(),
            pair.right.name.display()
        );
        self.differ
            .diff(&left, &right, &mut AnnouncingSink::new(sink, header))
    }

    fn display_label(&self, pair: &ComparisonPair<'_>, side: Side) -> String {
        match self.options.label(side) {
            Some(label) => label.to_string(),
            None => pair.slot(side).name.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::{ChildNames, FsLister, ListingError};
    use crate::reporter::testing::{memory_reporter, stdout_of};
    use crate::text_diff::TextDiffEngine;
    use std::cell::Cell;
    use std::io;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct TestFixture {
        _temp_dir: TempDir,
        left_dir: PathBuf,
        right_dir: PathBuf,
    }

    impl TestFixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let left_dir = temp_dir.path().join("D1");
            let right_dir = temp_dir.path().join("D2");
            fs::create_dir_all(&left_dir).unwrap();
            fs::create_dir_all(&right_dir).unwrap();
            Self {
                _temp_dir: temp_dir,
                left_dir,
                right_dir,
            }
        }

        fn left(&self, name: &str, content: &str) -> PathBuf {
            write_file(&self.left_dir.join(name), content)
        }

        fn right(&self, name: &str, content: &str) -> PathBuf {
            write_file(&self.right_dir.join(name), content)
        }
    }

    fn write_file(path: &Path, content: &str) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        path.to_path_buf()
    }

    fn announced(switches: &str, left: &Path, right: &Path) -> String {
        format!("diff{} {} {}\n", switches, left.display(), right.display())
    }

    struct Outcome {
        severity: Severity,
        out: String,
        err: String,
    }

    fn compare_with(
        options: &DiffOptions,
        differ: &dyn ContentDiffer,
        left: &Path,
        right: &Path,
    ) -> Outcome {
        let lister = FsLister::new(options).unwrap();
        let engine = ComparisonEngine::new(options, &lister, differ);
        let mut reporter = memory_reporter();
        let severity = engine
            .compare_files(
                None,
                Some(left.as_os_str()),
                Some(right.as_os_str()),
                &mut reporter,
            )
            .unwrap();
        reporter.finish().unwrap();
        let (out, err) = stdout_of(reporter);
        Outcome { severity, out, err }
    }

    fn compare(options: &DiffOptions, left: &Path, right: &Path) -> Outcome {
        let differ = TextDiffEngine::new(options).unwrap();
        compare_with(options, &differ, left, right)
    }

    fn recursive() -> DiffOptions {
        DiffOptions {
            recursive: true,
            ..DiffOptions::default()
        }
    }

    /// Content engine stand-in that counts how often it is asked
    struct CountingDiffer {
        calls: Cell<usize>,
        result: Severity,
    }

    impl CountingDiffer {
        fn new(result: Severity) -> Self {
            Self {
                calls: Cell::new(0),
                result,
            }
        }
    }

    impl ContentDiffer for CountingDiffer {
        fn diff(
            &self,
            _left: &ContentInput<'_>,
            _right: &ContentInput<'_>,
            _sink: &mut dyn Sink,
        ) -> Result<Severity> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.result)
        }
    }

    #[test]
    fn test_directory_round_trip() {
        let fixture = TestFixture::new();
        fixture.left("a", "x");
        fixture.left("b", "y");
        fixture.right("a", "x");
        fixture.right("c", "z");

        let outcome = compare(&recursive(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "Only in {}: b\nOnly in {}: c\n",
                fixture.left_dir.display(),
                fixture.right_dir.display()
            )
        );
        assert!(outcome.err.is_empty());
    }

    #[test]
    fn test_content_difference_in_directory() {
        let fixture = TestFixture::new();
        fixture.left("a", "x\n");
        fixture.right("a", "y\n");

        let outcome = compare(&DiffOptions::default(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "{}1c1\n< x\n---\n> y\n",
                announced("", &fixture.left_dir.join("a"), &fixture.right_dir.join("a"))
            )
        );
    }

    #[test]
    fn test_nested_diff_is_announced_with_switches() {
        let fixture = TestFixture::new();
        fixture.left("same", "s\n");
        fixture.right("same", "s\n");
        fixture.left("bin", "a\0b");
        fixture.right("bin", "a\0c");
        fixture.left("text", "x\n");
        fixture.right("text", "y\n");

        let options = DiffOptions {
            switches: " -r".to_string(),
            ..recursive()
        };
        let outcome = compare(&options, &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "Binary files {} and {} differ\n{}1c1\n< x\n---\n> y\n",
                fixture.left_dir.join("bin").display(),
                fixture.right_dir.join("bin").display(),
                announced(
                    " -r",
                    &fixture.left_dir.join("text"),
                    &fixture.right_dir.join("text")
                )
            )
        );
    }

    #[test]
    fn test_nested_directories_without_recursion() {
        let fixture = TestFixture::new();
        fixture.left("sub/f", "1");
        fixture.right("sub/f", "2");

        let outcome = compare(&DiffOptions::default(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Success);
        assert_eq!(
            outcome.out,
            format!(
                "Common subdirectories: {} and {}\n",
                fixture.left_dir.join("sub").display(),
                fixture.right_dir.join("sub").display()
            )
        );

        let outcome = compare(&recursive(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "{}1c1\n< 1\n\\ No newline at end of file\n---\n> 2\n\\ No newline at end of file\n",
                announced(
                    "",
                    &fixture.left_dir.join("sub/f"),
                    &fixture.right_dir.join("sub/f")
                )
            )
        );
    }

    #[test]
    fn test_only_in_nested_directory() {
        let fixture = TestFixture::new();
        fixture.left("sub/only", "x");
        fs::create_dir(fixture.right_dir.join("sub")).unwrap();

        let outcome = compare(&recursive(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!("Only in {}: only\n", fixture.left_dir.join("sub").display())
        );
    }

    #[test]
    fn test_new_file_compares_against_empty() {
        let fixture = TestFixture::new();
        fixture.right("c", "z\n");

        let options = DiffOptions {
            new_file: true,
            ..DiffOptions::default()
        };
        let outcome = compare(&options, &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "{}0a1\n> z\n",
                announced("", &fixture.left_dir.join("c"), &fixture.right_dir.join("c"))
            )
        );
    }

    #[test]
    fn test_unidirectional_new_file_only_admits_missing_left() {
        let fixture = TestFixture::new();
        fixture.left("b", "y\n");
        fixture.right("c", "z\n");

        let options = DiffOptions {
            unidirectional_new_file: true,
            ..DiffOptions::default()
        };
        let outcome = compare(&options, &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "Only in {}: b\n{}0a1\n> z\n",
                fixture.left_dir.display(),
                announced("", &fixture.left_dir.join("c"), &fixture.right_dir.join("c"))
            )
        );
    }

    #[test]
    fn test_both_operands_missing_is_trouble() {
        let fixture = TestFixture::new();
        let outcome = compare(
            &DiffOptions::default(),
            &fixture.left_dir.join("nope"),
            &fixture.right_dir.join("nope"),
        );
        assert_eq!(outcome.severity, Severity::Trouble);
        assert!(outcome.out.is_empty());
        assert_eq!(outcome.err.lines().count(), 2);
        assert!(outcome.err.contains("No such file or directory"));
    }

    #[test]
    fn test_same_missing_name_reported_once() {
        let fixture = TestFixture::new();
        let missing = fixture.left_dir.join("nope");
        let outcome = compare(&DiffOptions::default(), &missing, &missing);
        assert_eq!(outcome.severity, Severity::Trouble);
        assert_eq!(outcome.err.lines().count(), 1);
    }

    #[test]
    fn test_missing_operand_with_new_file() {
        let fixture = TestFixture::new();
        let present = fixture.right("f", "line\n");
        let outcome = compare(
            &DiffOptions {
                new_file: true,
                ..DiffOptions::default()
            },
            &fixture.left_dir.join("f"),
            &present,
        );
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(outcome.out, "0a1\n> line\n");
        assert!(outcome.err.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_hard_link_is_same_file_without_reading() {
        let fixture = TestFixture::new();
        let original = fixture.left("a", "x\n");
        let link = fixture.left_dir.join("b");
        fs::hard_link(&original, &link).unwrap();

        let differ = CountingDiffer::new(Severity::Differ);
        let outcome = compare_with(&DiffOptions::default(), &differ, &original, &link);
        assert_eq!(outcome.severity, Severity::Success);
        assert_eq!(differ.calls.get(), 0);
        assert!(outcome.out.is_empty());

        let options = DiffOptions {
            report_identical: true,
            ..DiffOptions::default()
        };
        let outcome = compare_with(&options, &differ, &original, &link);
        assert_eq!(differ.calls.get(), 0);
        assert_eq!(
            outcome.out,
            format!(
                "Files {} and {} are identical\n",
                original.display(),
                link.display()
            )
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_quick_differ_never_fires_for_equal_sizes() {
        let fixture = TestFixture::new();
        let left = fixture.left("a", "abc");
        let right = fixture.right("a", "abd");

        let options = DiffOptions {
            brief: true,
            ..DiffOptions::default()
        };
        let differ = CountingDiffer::new(Severity::Differ);
        let outcome = compare_with(&options, &differ, &left, &right);
        assert_eq!(differ.calls.get(), 1);
        assert_eq!(outcome.severity, Severity::Differ);

        let longer = fixture.right("b", "abcd");
        let differ = CountingDiffer::new(Severity::Success);
        let outcome = compare_with(&options, &differ, &left, &longer);
        assert_eq!(differ.calls.get(), 0);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!("Files {} and {} differ\n", left.display(), longer.display())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_compared_by_target() {
        let fixture = TestFixture::new();
        let l1 = fixture.left_dir.join("L1");
        let l2 = fixture.left_dir.join("L2");
        let l3 = fixture.left_dir.join("L3");
        std::os::unix::fs::symlink("/tmp/foo", &l1).unwrap();
        std::os::unix::fs::symlink("/tmp/bar", &l2).unwrap();
        std::os::unix::fs::symlink("/tmp/foo", &l3).unwrap();

        let options = DiffOptions {
            no_dereference: true,
            ..DiffOptions::default()
        };
        let outcome = compare(&options, &l1, &l2);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!("Symbolic links {} and {} differ\n", l1.display(), l2.display())
        );

        let outcome = compare(&options, &l1, &l3);
        assert_eq!(outcome.severity, Severity::Success);
        assert!(outcome.out.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_against_file_is_type_mismatch() {
        let fixture = TestFixture::new();
        let link = fixture.left_dir.join("link");
        std::os::unix::fs::symlink("/tmp/foo", &link).unwrap();
        let file = fixture.right("file", "x\n");

        let options = DiffOptions {
            no_dereference: true,
            ..DiffOptions::default()
        };
        let outcome = compare(&options, &link, &file);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "File {} is a symbolic link while file {} is a regular file\n",
                link.display(),
                file.display()
            )
        );
    }

    #[test]
    fn test_nested_type_mismatch_uses_labels() {
        let fixture = TestFixture::new();
        fixture.left("x/inner", "1");
        fixture.right("x", "");

        let outcome = compare(&recursive(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(
            outcome.out,
            format!(
                "File {} is a directory while file {} is a regular empty file\n",
                fixture.left_dir.join("x").display(),
                fixture.right_dir.join("x").display()
            )
        );

        let labelled = DiffOptions {
            labels: [Some("old".to_string()), Some("new".to_string())],
            ..recursive()
        };
        let outcome = compare(&labelled, &fixture.left_dir, &fixture.right_dir);
        assert_eq!(
            outcome.out,
            "File old is a directory while file new is a regular empty file\n"
        );
    }

    #[test]
    fn test_directory_against_file_uses_basename() {
        let fixture = TestFixture::new();
        let file = fixture.right("notes.txt", "same\n");
        fixture.left("notes.txt", "same\n");

        let outcome = compare(&DiffOptions::default(), &fixture.left_dir, &file);
        assert_eq!(outcome.severity, Severity::Success);

        let other = fixture.right("other.txt", "x\n");
        let outcome = compare(&DiffOptions::default(), &fixture.left_dir, &other);
        assert_eq!(outcome.severity, Severity::Trouble);
        assert!(outcome
            .err
            .contains(&fixture.left_dir.join("other.txt").display().to_string()));
    }

    #[test]
    fn test_report_identical_files() {
        let fixture = TestFixture::new();
        let left = fixture.left("a", "same\n");
        let right = fixture.right("a", "same\n");

        let options = DiffOptions {
            report_identical: true,
            ..DiffOptions::default()
        };
        let outcome = compare(&options, &left, &right);
        assert_eq!(outcome.severity, Severity::Success);
        assert_eq!(
            outcome.out,
            format!(
                "Files {} and {} are identical\n",
                left.display(),
                right.display()
            )
        );

        // Directories are never reported as identical themselves.
        let outcome = compare(&options, &fixture.left_dir, &fixture.right_dir);
        assert_eq!(
            outcome.out,
            format!(
                "Files {} and {} are identical\n",
                fixture.left_dir.join("a").display(),
                fixture.right_dir.join("a").display()
            )
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_loop_is_trouble() {
        let fixture = TestFixture::new();
        std::os::unix::fs::symlink(&fixture.left_dir, fixture.left_dir.join("loop")).unwrap();
        std::os::unix::fs::symlink(&fixture.right_dir, fixture.right_dir.join("loop")).unwrap();

        let outcome = compare(&recursive(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Trouble);
        assert_eq!(
            outcome.err,
            format!(
                "rdiff: {}: recursive directory loop\n",
                fixture.left_dir.join("loop").display()
            )
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_loop_on_one_side_keeps_descending() {
        let fixture = TestFixture::new();
        std::os::unix::fs::symlink(&fixture.left_dir, fixture.left_dir.join("loop")).unwrap();
        fixture.right("loop/f", "x");

        let outcome = compare(&recursive(), &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Differ);
        assert_eq!(
            outcome.out,
            format!(
                "Only in {}: f\nOnly in {}: loop\n",
                fixture.right_dir.join("loop").display(),
                fixture.left_dir.join("loop").display()
            )
        );
        assert!(outcome.err.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_loop_against_absent_side_is_trouble() {
        let fixture = TestFixture::new();
        std::os::unix::fs::symlink(&fixture.left_dir, fixture.left_dir.join("loop")).unwrap();
        let options = DiffOptions {
            new_file: true,
            ..recursive()
        };

        let outcome = compare(&options, &fixture.left_dir, &fixture.right_dir);
        assert_eq!(outcome.severity, Severity::Trouble);
        assert_eq!(
            outcome.err,
            format!(
                "rdiff: {}: recursive directory loop\n",
                fixture.left_dir.join("loop").display()
            )
        );
    }

    struct FailingLister;

    impl DirectoryLister for FailingLister {
        fn list_children(
            &self,
            left: Option<&Path>,
            _right: Option<&Path>,
            _top_level: bool,
        ) -> std::result::Result<Vec<ChildNames>, ListingError> {
            Err(ListingError {
                path: left.map(Path::to_path_buf).unwrap_or_default(),
                source: io::Error::from_raw_os_error(13),
            })
        }
    }

    #[test]
    fn test_listing_failure_is_trouble() {
        let fixture = TestFixture::new();
        let options = DiffOptions::default();
        let differ = CountingDiffer::new(Severity::Success);
        let engine = ComparisonEngine::new(&options, &FailingLister, &differ);
        let mut reporter = memory_reporter();
        let severity = engine
            .compare_files(
                None,
                Some(fixture.left_dir.as_os_str()),
                Some(fixture.right_dir.as_os_str()),
                &mut reporter,
            )
            .unwrap();
        assert_eq!(severity, Severity::Trouble);
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn test_compare_all_visits_every_pair() {
        let fixture = TestFixture::new();
        let same_left = fixture.left("same", "s\n");
        let same_right = fixture.right("same", "s\n");
        let diff_left = fixture.left("diff", "1\n");
        let diff_right = fixture.right("diff", "2\n");
        let missing = fixture.left_dir.join("missing");

        let options = DiffOptions::default();
        let lister = FsLister::new(&options).unwrap();
        let differ = TextDiffEngine::new(&options).unwrap();
        let engine = ComparisonEngine::new(&options, &lister, &differ);
        let mut reporter = memory_reporter();

        let severity = engine
            .compare_all(
                vec![
                    (missing.clone(), same_right.clone()),
                    (same_left, same_right),
                    (diff_left, diff_right),
                ],
                &mut reporter,
            )
            .unwrap();
        assert_eq!(severity, Severity::Trouble);

        let (out, err) = stdout_of(reporter);
        assert_eq!(out, "1c1\n< 1\n---\n> 2\n");
        assert!(err.contains(&missing.display().to_string()));
    }

    #[test]
    fn test_stdin_cannot_be_compared_to_directory() {
        let fixture = TestFixture::new();
        let options = DiffOptions::default();
        let lister = FsLister::new(&options).unwrap();
        let differ = CountingDiffer::new(Severity::Success);
        let engine = ComparisonEngine::new(&options, &lister, &differ);

        // Build the pair by hand so the test never touches the real stdin.
        let resolver = EntityResolver::new(&options);
        let mut pair = resolver.resolve_pair(
            None,
            Some(fixture.left_dir.as_os_str()),
            Some(fixture.left_dir.as_os_str()),
        );
        pair.right = resolver.resolve(&fixture.right("f", "x"));
        pair.right.name = PathBuf::from("-");

        let mut reporter = memory_reporter();
        let err = engine
            .redirect_directory_operand(&mut pair, &mut reporter)
            .unwrap_err();
        assert!(err.is_usage());
        assert_eq!(err.to_string(), "cannot compare '-' to a directory");
    }
}
