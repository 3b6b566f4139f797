use crate::resolver::EntitySlot;
use rdiff_common::{DiffOptions, Side};

/// One node of the comparison walk. `parent` borrows the enclosing
/// directory pair for as long as this pair is being compared.
#[derive(Debug)]
pub struct ComparisonPair<'p> {
    pub left: EntitySlot,
    pub right: EntitySlot,
    pub parent: Option<&'p ComparisonPair<'p>>,
}

impl<'p> ComparisonPair<'p> {
    pub fn slot(&self, side: Side) -> &EntitySlot {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// Enclosing pairs, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &ComparisonPair<'p>> {
        std::iter::successors(self.parent, |pair| pair.parent)
    }

    /// Both sides are present and name the same physical file with
    /// identical attributes.
    pub fn same_file(&self) -> bool {
        !self.left.is_absent()
            && !self.right.is_absent()
            && self.left.metadata.same_file(&self.right.metadata)
            && self.left.metadata.same_attributes(&self.right.metadata)
    }

    fn either_absent(&self) -> Option<Side> {
        if self.left.is_absent() {
            Some(Side::Right)
        } else if self.right.is_absent() {
            Some(Side::Left)
        } else {
            None
        }
    }
}

/// What to do with a resolved pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A slot failed to resolve; already reported
    Trouble,
    /// Neither side exists
    NothingToCompare,
    /// Same physical file and identical files print nothing
    SameFile,
    /// Nested directory pair without recursion
    CommonSubdirectories,
    Recurse,
    /// Present only on the given side
    OnlyIn(Side),
    TypeMismatch,
    CompareSymlinks,
    /// Sizes differ, so the files differ without reading them
    QuickDiffer,
    ContentDiff,
}

/// Decide the action for a fully resolved pair. Pure: no I/O happens here.
pub fn classify(pair: &ComparisonPair<'_>, options: &DiffOptions) -> Action {
    let (left, right) = (&pair.left.metadata, &pair.right.metadata);

    if pair.left.is_failed() || pair.right.is_failed() {
        return Action::Trouble;
    }
    if pair.left.is_absent() && pair.right.is_absent() {
        return Action::NothingToCompare;
    }
    if pair.same_file() && options.no_diff_means_no_output() {
        return Action::SameFile;
    }

    if left.is_dir() && right.is_dir() {
        return if !pair.is_top_level() && !options.recursive {
            Action::CommonSubdirectories
        } else {
            Action::Recurse
        };
    }

    let comparable = |slot: &EntitySlot| slot.metadata.is_regular() || slot.metadata.is_symlink();
    if left.is_dir()
        || right.is_dir()
        || (!pair.is_top_level() && !(comparable(&pair.left) && comparable(&pair.right)))
    {
        return match pair.either_absent() {
            Some(present) => {
                let absent_allowed = options.absent_allowed(present.other());
                if (left.is_dir() || right.is_dir()) && options.recursive && absent_allowed {
                    Action::Recurse
                } else if pair.is_top_level() {
                    Action::TypeMismatch
                } else {
                    Action::OnlyIn(present)
                }
            }
            None => Action::TypeMismatch,
        };
    }

    if left.is_symlink() || right.is_symlink() {
        return if left.is_symlink() && right.is_symlink() {
            Action::CompareSymlinks
        } else {
            Action::TypeMismatch
        };
    }

    if options.files_can_be_treated_as_binary()
        && left.is_regular()
        && right.is_regular()
        && left.size != right.size
        && left.size > 0
        && right.size > 0
    {
        return Action::QuickDiffer;
    }

    Action::ContentDiff
}
