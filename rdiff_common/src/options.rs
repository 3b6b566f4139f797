use crate::Side;

/// Minimum gutter between the two columns of side-by-side output
pub const GUTTER_WIDTH_MINIMUM: usize = 3;

/// Output format requested for content differences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    /// `NcM` change commands (the default)
    #[default]
    Normal,
    /// Copied context (`-c`)
    Context,
    /// Unified context (`-u`)
    Unified,
    /// ed script (`-e`)
    Ed,
    /// Two columns (`-y`)
    SideBySide,
}

/// How white space takes part in line comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WhitespaceMode {
    /// Compare white space exactly
    #[default]
    Exact,
    /// Ignore changes due to tab expansion (`-E`)
    TabExpansion,
    /// Ignore white space at line end (`-Z`)
    TrailingSpace,
    /// `-E` and `-Z` together
    TabExpansionAndTrailingSpace,
    /// Ignore changes in the amount of white space (`-b`)
    SpaceChange,
    /// Ignore all white space (`-w`)
    AllSpace,
}

impl WhitespaceMode {
    /// Combine the individual white-space flags; the strongest one wins.
    pub fn from_flags(
        all_space: bool,
        space_change: bool,
        tab_expansion: bool,
        trailing_space: bool,
    ) -> Self {
        if all_space {
            WhitespaceMode::AllSpace
        } else if space_change {
            WhitespaceMode::SpaceChange
        } else {
            match (tab_expansion, trailing_space) {
                (true, true) => WhitespaceMode::TabExpansionAndTrailingSpace,
                (true, false) => WhitespaceMode::TabExpansion,
                (false, true) => WhitespaceMode::TrailingSpace,
                (false, false) => WhitespaceMode::Exact,
            }
        }
    }
}

/// Finished, read-only configuration consumed by the comparison core
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub output_style: OutputStyle,
    /// Lines of context for `-c`/`-u`
    pub context: usize,
    /// Total width for side-by-side output
    pub width: usize,
    pub tabsize: usize,
    pub expand_tabs: bool,
    pub suppress_common_lines: bool,

    /// Only report whether files differ
    pub brief: bool,
    pub report_identical: bool,
    pub recursive: bool,
    /// Treat absent files as empty (`-N`)
    pub new_file: bool,
    /// Treat absent left files as empty
    pub unidirectional_new_file: bool,
    /// Compare symbolic links themselves instead of their targets
    pub no_dereference: bool,

    /// Treat all files as text
    pub text: bool,
    pub binary: bool,
    pub ignore_case: bool,
    pub ignore_blank_lines: bool,
    pub strip_trailing_cr: bool,
    pub whitespace: WhitespaceMode,
    pub ignore_matching_lines: Vec<String>,

    /// `--label` values shown instead of file names
    pub labels: [Option<String>; 2],

    pub exclude_patterns: Vec<String>,
    pub ignore_file_name_case: bool,
    /// Skip top-level directory entries sorting before this name
    pub starting_file: Option<String>,

    /// Command-line options as typed, shell-quoted, each preceded by a
    /// space; repeated in the `diff` line announcing a nested file pair
    pub switches: String,

    /// Dates follow a non-C locale; context headers then use the ISO layout
    pub localized_time: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            output_style: OutputStyle::Normal,
            context: 3,
            width: 130,
            tabsize: 8,
            expand_tabs: false,
            suppress_common_lines: false,
            brief: false,
            report_identical: false,
            recursive: false,
            new_file: false,
            unidirectional_new_file: false,
            no_dereference: false,
            text: false,
            binary: false,
            ignore_case: false,
            ignore_blank_lines: false,
            strip_trailing_cr: false,
            whitespace: WhitespaceMode::Exact,
            ignore_matching_lines: Vec::new(),
            labels: [None, None],
            exclude_patterns: Vec::new(),
            ignore_file_name_case: false,
            starting_file: None,
            switches: String::new(),
            localized_time: false,
        }
    }
}

impl DiffOptions {
    /// True when identical inputs would print nothing in the chosen style,
    /// which makes skipping same-inode pairs unobservable.
    pub fn no_diff_means_no_output(&self) -> bool {
        self.output_style != OutputStyle::SideBySide || self.suppress_common_lines
    }

    /// POSIX hosts never translate line endings, so I/O is always binary there.
    pub fn binary_io(&self) -> bool {
        self.binary || !cfg!(windows)
    }

    /// True when any option makes line content comparison differ from a
    /// byte comparison.
    pub fn alters_line_content(&self) -> bool {
        self.ignore_blank_lines
            || self.ignore_case
            || self.strip_trailing_cr
            || !self.ignore_matching_lines.is_empty()
            || self.whitespace != WhitespaceMode::Exact
    }

    /// Gate for inferring "differ" from differing sizes alone.
    pub fn files_can_be_treated_as_binary(&self) -> bool {
        self.brief && self.binary_io() && !self.alters_line_content()
    }

    /// Whether a missing entity on `side` may be treated as an empty file.
    pub fn absent_allowed(&self, side: Side) -> bool {
        self.new_file || (side == Side::Left && self.unidirectional_new_file)
    }

    /// `strftime` layout for header timestamps. Context output in the C
    /// locale keeps the POSIX `ctime`-style layout.
    pub fn time_format(&self) -> &'static str {
        if self.output_style == OutputStyle::Context && !self.localized_time {
            "%a %b %e %H:%M:%S %Y"
        } else {
            "%Y-%m-%d %H:%M:%S%.9f %z"
        }
    }

    pub fn label(&self, side: Side) -> Option<&str> {
        self.labels[side.index()].as_deref()
    }

    /// Half-line width and second-column offset for side-by-side output.
    ///
    /// The half line is maximized first, then the gutter; when tabs are not
    /// expanded a half line plus gutter is a whole number of tab stops.
    pub fn side_by_side_geometry(&self) -> (usize, usize) {
        let t = if self.expand_tabs { 1 } else { self.tabsize.max(1) };
        let w = self.width;
        let t_plus_g = t + GUTTER_WIDTH_MINIMUM;
        let unaligned_off = (w >> 1) + (t_plus_g >> 1) + (w & t_plus_g & 1);
        let off = unaligned_off - unaligned_off % t;
        let half_width = if off <= GUTTER_WIDTH_MINIMUM || w <= off {
            0
        } else {
            (off - GUTTER_WIDTH_MINIMUM).min(w - off)
        };
        let column2_offset = if half_width > 0 { off } else { w };
        (half_width, column2_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DiffOptions::default();
        assert_eq!(options.output_style, OutputStyle::Normal);
        assert_eq!(options.context, 3);
        assert_eq!(options.width, 130);
        assert!(options.no_diff_means_no_output());
        assert!(!options.files_can_be_treated_as_binary());
    }

    #[test]
    fn test_no_diff_means_no_output_side_by_side() {
        let mut options = DiffOptions {
            output_style: OutputStyle::SideBySide,
            ..DiffOptions::default()
        };
        assert!(!options.no_diff_means_no_output());

        options.suppress_common_lines = true;
        assert!(options.no_diff_means_no_output());
    }

    #[test]
    fn test_no_diff_means_no_output_ignores_report_identical() {
        let options = DiffOptions {
            report_identical: true,
            ..DiffOptions::default()
        };
        assert!(options.no_diff_means_no_output());
    }

    #[cfg(unix)]
    #[test]
    fn test_binary_gate() {
        let mut options = DiffOptions {
            brief: true,
            ..DiffOptions::default()
        };
        assert!(options.files_can_be_treated_as_binary());

        for alter in 0..5 {
            let mut altered = options.clone();
            match alter {
                0 => altered.ignore_blank_lines = true,
                1 => altered.ignore_case = true,
                2 => altered.strip_trailing_cr = true,
                3 => altered.ignore_matching_lines.push("^#".to_string()),
                _ => altered.whitespace = WhitespaceMode::TrailingSpace,
            }
            assert!(!altered.files_can_be_treated_as_binary());
        }

        options.brief = false;
        assert!(!options.files_can_be_treated_as_binary());
    }

    #[test]
    fn test_time_format() {
        let mut options = DiffOptions {
            output_style: OutputStyle::Context,
            ..DiffOptions::default()
        };
        assert_eq!(options.time_format(), "%a %b %e %H:%M:%S %Y");

        options.localized_time = true;
        assert_eq!(options.time_format(), "%Y-%m-%d %H:%M:%S%.9f %z");

        options.localized_time = false;
        options.output_style = OutputStyle::Unified;
        assert_eq!(options.time_format(), "%Y-%m-%d %H:%M:%S%.9f %z");
    }

    #[test]
    fn test_whitespace_flags() {
        assert_eq!(
            WhitespaceMode::from_flags(true, true, true, true),
            WhitespaceMode::AllSpace
        );
        assert_eq!(
            WhitespaceMode::from_flags(false, true, true, false),
            WhitespaceMode::SpaceChange
        );
        assert_eq!(
            WhitespaceMode::from_flags(false, false, true, true),
            WhitespaceMode::TabExpansionAndTrailingSpace
        );
        assert_eq!(
            WhitespaceMode::from_flags(false, false, false, false),
            WhitespaceMode::Exact
        );
    }

    #[test]
    fn test_absent_allowed() {
        let unidirectional = DiffOptions {
            unidirectional_new_file: true,
            ..DiffOptions::default()
        };
        assert!(unidirectional.absent_allowed(Side::Left));
        assert!(!unidirectional.absent_allowed(Side::Right));

        let new_file = DiffOptions {
            new_file: true,
            ..DiffOptions::default()
        };
        assert!(new_file.absent_allowed(Side::Left));
        assert!(new_file.absent_allowed(Side::Right));
    }

    #[test]
    fn test_side_by_side_geometry_default_width() {
        let options = DiffOptions::default();
        assert_eq!(options.side_by_side_geometry(), (61, 64));
    }

    #[test]
    fn test_side_by_side_geometry_expanded_tabs() {
        let options = DiffOptions {
            width: 80,
            expand_tabs: true,
            ..DiffOptions::default()
        };
        // t = 1: unaligned = 40 + 2 + 0 = 42, half = min(39, 38)
        assert_eq!(options.side_by_side_geometry(), (38, 42));
    }
}
