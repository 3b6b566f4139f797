use crate::reporter::Sink;
use crate::resolver::{EntitySlot, Handle, SlotError};
use chrono::{DateTime, Local};
use rdiff_common::{DiffOptions, OutputStyle, RDiffError, Result, Severity, WhitespaceMode};
use regex::bytes::Regex;
use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::rc::Rc;
use tracing::debug;

/// Bytes inspected when deciding whether an input is binary
const BINARY_PROBE_LEN: usize = 32 * 1024;

const NO_NEWLINE_MARKER: &[u8] = b"\\ No newline at end of file\n";

/// One side handed to the content engine. `handle` is `None` for a file
/// that is absent and reads as empty.
pub struct ContentInput<'a> {
    pub slot: &'a EntitySlot,
    pub label: Option<&'a str>,
    pub handle: Option<&'a Handle>,
}

impl ContentInput<'_> {
    /// Label if one was given, otherwise the file name
    pub fn display_name(&self) -> String {
        match self.label {
            Some(label) => label.to_string(),
            None => self.slot.name.display().to_string(),
        }
    }
}

/// Line-level comparison of two open inputs
pub trait ContentDiffer {
    /// Compare the inputs, writing any output to `sink`. Read failures are
    /// reported to the sink and come back as `Severity::Trouble`.
    fn diff(
        &self,
        left: &ContentInput<'_>,
        right: &ContentInput<'_>,
        sink: &mut dyn Sink,
    ) -> Result<Severity>;
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a [u8],
    newline: bool,
}

/// A run of differing lines; either range may be empty but not both
#[derive(Debug, Clone, PartialEq, Eq)]
struct Change {
    left: Range<usize>,
    right: Range<usize>,
    ignorable: bool,
}

/// Content engine producing normal, context, unified, ed and side-by-side output
pub struct TextDiffEngine<'a> {
    options: &'a DiffOptions,
    ignore_regexes: Vec<Regex>,
}

impl<'a> TextDiffEngine<'a> {
    pub fn new(options: &'a DiffOptions) -> std::result::Result<Self, RDiffError> {
        let ignore_regexes = options
            .ignore_matching_lines
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| RDiffError::Pattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            options,
            ignore_regexes,
        })
    }

    fn read(&self, input: &ContentInput<'_>, sink: &mut dyn Sink) -> Option<Vec<u8>> {
        let mut data = Vec::new();
        if let Some(handle) = input.handle {
            let mut reader: &File = handle;
            if let Err(e) = reader.read_to_end(&mut data) {
                sink.error(&input.slot.name, &SlotError::from(&e));
                return None;
            }
        }
        Some(data)
    }

    /// Read both inputs; a handle shared by both sides is read once.
    fn read_both(
        &self,
        left: &ContentInput<'_>,
        right: &ContentInput<'_>,
        sink: &mut dyn Sink,
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        let left_data = self.read(left, sink)?;
        let shared = matches!(
            (left.handle, right.handle),
            (Some(l), Some(r)) if Rc::ptr_eq(l, r)
        );
        let right_data = if shared {
            left_data.clone()
        } else {
            self.read(right, sink)?
        };
        Some((left_data, right_data))
    }

    fn split_lines<'d>(&self, data: &'d [u8]) -> Vec<Line<'d>> {
        data.split_inclusive(|&b| b == b'\n')
            .map(|raw| {
                let (mut text, newline) = match raw.strip_suffix(b"\n") {
                    Some(text) => (text, true),
                    None => (raw, false),
                };
                if self.options.strip_trailing_cr {
                    if let Some(stripped) = text.strip_suffix(b"\r") {
                        text = stripped;
                    }
                }
                Line { text, newline }
            })
            .collect()
    }

    /// Comparison key for a line after white-space and case folding
    fn key(&self, line: &Line<'_>) -> Vec<u8> {
        let tabsize = self.options.tabsize;
        let mut key = match self.options.whitespace {
            WhitespaceMode::Exact => line.text.to_vec(),
            WhitespaceMode::TabExpansion => expand_tabs(line.text, tabsize),
            WhitespaceMode::TrailingSpace => trim_end(line.text).to_vec(),
            WhitespaceMode::TabExpansionAndTrailingSpace => {
                trim_end(&expand_tabs(line.text, tabsize)).to_vec()
            }
            WhitespaceMode::SpaceChange => collapse_space(line.text),
            WhitespaceMode::AllSpace => line
                .text
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect(),
        };
        if self.options.ignore_case {
            key.make_ascii_lowercase();
        }
        if line.newline {
            key.push(b'\n');
        }
        key
    }

    fn changes(&self, left: &[Line<'_>], right: &[Line<'_>]) -> Vec<Change> {
        let left_keys: Vec<Vec<u8>> = left.iter().map(|l| self.key(l)).collect();
        let right_keys: Vec<Vec<u8>> = right.iter().map(|l| self.key(l)).collect();

        let mut changes: Vec<Change> = Vec::new();
        for op in capture_diff_slices(Algorithm::Myers, &left_keys, &right_keys) {
            let (tag, l, r) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                continue;
            }
            match changes.last_mut() {
                Some(last) if last.left.end == l.start && last.right.end == r.start => {
                    last.left.end = l.end;
                    last.right.end = r.end;
                }
                _ => changes.push(Change {
                    left: l,
                    right: r,
                    ignorable: false,
                }),
            }
        }

        for change in &mut changes {
            change.ignorable =
                self.is_ignorable(&left[change.left.clone()], &right[change.right.clone()]);
        }
        changes
    }

    /// Every line of the change is blank (`-B`) or matches an `-I` pattern.
    fn is_ignorable(&self, left: &[Line<'_>], right: &[Line<'_>]) -> bool {
        if !self.options.ignore_blank_lines && self.ignore_regexes.is_empty() {
            return false;
        }
        left.iter().chain(right).all(|line| {
            (self.options.ignore_blank_lines && line.text.iter().all(u8::is_ascii_whitespace))
                || self.ignore_regexes.iter().any(|re| re.is_match(line.text))
        })
    }

    fn header(&self, input: &ContentInput<'_>) -> String {
        if let Some(label) = input.label {
            return label.to_string();
        }
        let time: DateTime<Local> = input.slot.metadata.modified.into();
        format!(
            "{}\t{}",
            input.slot.name.display(),
            time.format(self.options.time_format())
        )
    }

    fn render(
        &self,
        left_input: &ContentInput<'_>,
        right_input: &ContentInput<'_>,
        left: &[Line<'_>],
        right: &[Line<'_>],
        changes: &[Change],
    ) -> Vec<u8> {
        let mut out = Output::new(self.options);
        match self.options.output_style {
            OutputStyle::Normal => render_normal(&mut out, left, right, changes),
            OutputStyle::Ed => render_ed(&mut out, right, changes),
            OutputStyle::Unified => {
                out.push_str(&format!("--- {}\n", self.header(left_input)));
                out.push_str(&format!("+++ {}\n", self.header(right_input)));
                for hunk in hunks(changes, self.options.context) {
                    render_unified_hunk(&mut out, left, right, hunk, self.options.context);
                }
            }
            OutputStyle::Context => {
                out.push_str(&format!("*** {}\n", self.header(left_input)));
                out.push_str(&format!("--- {}\n", self.header(right_input)));
                for hunk in hunks(changes, self.options.context) {
                    render_context_hunk(&mut out, left, right, hunk, self.options.context);
                }
            }
            OutputStyle::SideBySide => render_side_by_side(&mut out, left, right, changes),
        }
        out.buf
    }
}

impl ContentDiffer for TextDiffEngine<'_> {
    fn diff(
        &self,
        left: &ContentInput<'_>,
        right: &ContentInput<'_>,
        sink: &mut dyn Sink,
    ) -> Result<Severity> {
        let Some((left_data, right_data)) = self.read_both(left, right, sink) else {
            return Ok(Severity::Trouble);
        };

        let show_all_lines = self.options.output_style == OutputStyle::SideBySide
            && !self.options.suppress_common_lines;
        if left_data == right_data && (self.options.brief || !show_all_lines) {
            return Ok(Severity::Success);
        }

        if !self.options.text && (is_binary(&left_data) || is_binary(&right_data)) {
            if left_data == right_data {
                return Ok(Severity::Success);
            }
            let kind = if self.options.brief { "Files" } else { "Binary files" };
            sink.message(format_args!(
                "{} {} and {} differ\n",
                kind,
                left.display_name(),
                right.display_name()
            ))?;
            return Ok(Severity::Differ);
        }

        if self.options.brief && !self.options.alters_line_content() {
            sink.message(format_args!(
                "Files {} and {} differ\n",
                left.display_name(),
                right.display_name()
            ))?;
            return Ok(Severity::Differ);
        }

        let left_lines = self.split_lines(&left_data);
        let right_lines = self.split_lines(&right_data);
        let changes = self.changes(&left_lines, &right_lines);
        let significant = changes.iter().filter(|c| !c.ignorable).count();
        debug!(
            "{} changes ({} significant) between {:?} and {:?}",
            changes.len(),
            significant,
            left.slot.name,
            right.slot.name
        );

        let severity = if significant > 0 {
            Severity::Differ
        } else {
            Severity::Success
        };

        if self.options.brief {
            if severity == Severity::Differ {
                sink.message(format_args!(
                    "Files {} and {} differ\n",
                    left.display_name(),
                    right.display_name()
                ))?;
            }
            return Ok(severity);
        }

        if significant > 0 || show_all_lines {
            let output = self.render(left, right, &left_lines, &right_lines, &changes);
            sink.write_output(&output)?;
        }
        Ok(severity)
    }
}

/// Accumulates rendered output
struct Output {
    buf: Vec<u8>,
    tabsize: usize,
    expand_tabs: bool,
    suppress_common_lines: bool,
    /// Half-line width and second-column offset for side-by-side rows
    geometry: (usize, usize),
}

impl Output {
    fn new(options: &DiffOptions) -> Self {
        Self {
            buf: Vec::new(),
            tabsize: options.tabsize.max(1),
            expand_tabs: options.expand_tabs,
            suppress_common_lines: options.suppress_common_lines,
            geometry: options.side_by_side_geometry(),
        }
    }

    fn push_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn push_line(&mut self, prefix: &str, line: &Line<'_>) {
        self.push_str(prefix);
        if self.expand_tabs {
            let expanded = expand_tabs(line.text, self.tabsize);
            self.buf.extend_from_slice(&expanded);
        } else {
            self.buf.extend_from_slice(line.text);
        }
        self.buf.push(b'\n');
        if !line.newline {
            self.buf.extend_from_slice(NO_NEWLINE_MARKER);
        }
    }

    /// Pad from column `from` to column `to`, with tabs where allowed.
    fn pad(&mut self, mut from: usize, to: usize) -> usize {
        if !self.expand_tabs {
            let mut tab = from + self.tabsize - from % self.tabsize;
            while tab <= to {
                self.buf.push(b'\t');
                from = tab;
                tab += self.tabsize;
            }
        }
        while from < to {
            self.buf.push(b' ');
            from += 1;
        }
        to
    }

    /// Write at most `width` columns of `text`, returning the end column.
    fn push_half_line(&mut self, text: &[u8], start: usize, width: usize) -> usize {
        let mut col = 0;
        for ch in String::from_utf8_lossy(text).chars() {
            if ch == '\t' {
                let next = ((start + col) / self.tabsize + 1) * self.tabsize - start;
                if next > width {
                    break;
                }
                while col < next {
                    self.buf.push(b' ');
                    col += 1;
                }
                continue;
            }
            if col + 1 > width {
                break;
            }
            let mut encoded = [0u8; 4];
            self.buf
                .extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
            col += 1;
        }
        start + col
    }

    /// One side-by-side row; `sep` is `' '` for common lines.
    fn push_row(&mut self, left: Option<&Line<'_>>, sep: u8, right: Option<&Line<'_>>) {
        let (half_width, column2_offset) = self.geometry;
        let sep_column = (half_width + column2_offset).saturating_sub(1) / 2;

        let mut col = match left {
            Some(line) => self.push_half_line(line.text, 0, half_width),
            None => 0,
        };
        if sep != b' ' {
            col = self.pad(col, sep_column);
            self.buf.push(sep);
            col += 1;
        }
        if let Some(line) = right {
            if !line.text.is_empty() {
                col = self.pad(col, column2_offset);
                self.push_half_line(line.text, col, half_width);
            }
        }
        self.buf.push(b'\n');
    }
}

fn render_normal(out: &mut Output, left: &[Line<'_>], right: &[Line<'_>], changes: &[Change]) {
    for change in changes.iter().filter(|c| !c.ignorable) {
        let command = if change.left.is_empty() {
            format!("{}a{}\n", change.left.start, line_range(&change.right))
        } else if change.right.is_empty() {
            format!("{}d{}\n", line_range(&change.left), change.right.start)
        } else {
            format!("{}c{}\n", line_range(&change.left), line_range(&change.right))
        };
        out.push_str(&command);

        for line in &left[change.left.clone()] {
            out.push_line("< ", line);
        }
        if !change.left.is_empty() && !change.right.is_empty() {
            out.push_str("---\n");
        }
        for line in &right[change.right.clone()] {
            out.push_line("> ", line);
        }
    }
}

/// ed script; commands run bottom-up so earlier line numbers stay valid.
fn render_ed(out: &mut Output, right: &[Line<'_>], changes: &[Change]) {
    for change in changes.iter().rev().filter(|c| !c.ignorable) {
        if change.right.is_empty() {
            out.push_str(&format!("{}d\n", line_range(&change.left)));
            continue;
        }
        if change.left.is_empty() {
            out.push_str(&format!("{}a\n", change.left.start));
        } else {
            out.push_str(&format!("{}c\n", line_range(&change.left)));
        }
        let mut inserting = true;
        for line in &right[change.right.clone()] {
            if !inserting {
                out.push_str("a\n");
                inserting = true;
            }
            if line.text == b"." {
                // A lone dot ends input mode: write two, then strip one.
                out.push_str("..\n.\ns/.//\n");
                inserting = false;
            } else {
                out.buf.extend_from_slice(line.text);
                out.buf.push(b'\n');
            }
        }
        if inserting {
            out.push_str(".\n");
        }
    }
}

fn render_unified_hunk(
    out: &mut Output,
    left: &[Line<'_>],
    right: &[Line<'_>],
    hunk: &[Change],
    context: usize,
) {
    let (left_span, right_span) = hunk_spans(left, right, hunk, context);
    out.push_str(&format!(
        "@@ -{} +{} @@\n",
        unified_range(&left_span),
        unified_range(&right_span)
    ));

    let mut next = left_span.start;
    for change in hunk {
        for line in &left[next..change.left.start] {
            out.push_line(" ", line);
        }
        for line in &left[change.left.clone()] {
            out.push_line("-", line);
        }
        for line in &right[change.right.clone()] {
            out.push_line("+", line);
        }
        next = change.left.end;
    }
    for line in &left[next..left_span.end] {
        out.push_line(" ", line);
    }
}

fn render_context_hunk(
    out: &mut Output,
    left: &[Line<'_>],
    right: &[Line<'_>],
    hunk: &[Change],
    context: usize,
) {
    let (left_span, right_span) = hunk_spans(left, right, hunk, context);

    out.push_str("***************\n");
    out.push_str(&format!("*** {} ****\n", context_range(&left_span)));
    if hunk.iter().any(|c| !c.left.is_empty()) {
        let ranges = hunk.iter().map(|c| (c.left.clone(), c.right.is_empty()));
        context_side(out, left, left_span, ranges, "- ");
    }
    out.push_str(&format!("--- {} ----\n", context_range(&right_span)));
    if hunk.iter().any(|c| !c.right.is_empty()) {
        let ranges = hunk.iter().map(|c| (c.right.clone(), c.left.is_empty()));
        context_side(out, right, right_span, ranges, "+ ");
    }
}

/// One half of a context hunk. `ranges` yields each change's lines on this
/// side and whether the other side of that change is empty.
fn context_side(
    out: &mut Output,
    lines: &[Line<'_>],
    span: Range<usize>,
    ranges: impl Iterator<Item = (Range<usize>, bool)>,
    one_sided: &str,
) {
    let mut next = span.start;
    for (range, other_empty) in ranges {
        for line in &lines[next..range.start] {
            out.push_line("  ", line);
        }
        let prefix = if other_empty { one_sided } else { "! " };
        for line in &lines[range.clone()] {
            out.push_line(prefix, line);
        }
        next = range.end;
    }
    for line in &lines[next..span.end] {
        out.push_line("  ", line);
    }
}

fn render_side_by_side(out: &mut Output, left: &[Line<'_>], right: &[Line<'_>], changes: &[Change]) {
    let show_common = !out.suppress_common_lines;
    let (mut li, mut ri) = (0, 0);

    for change in changes {
        while li < change.left.start {
            if show_common {
                out.push_row(Some(&left[li]), b' ', Some(&right[ri]));
            }
            li += 1;
            ri += 1;
        }
        let removed = &left[change.left.clone()];
        let added = &right[change.right.clone()];
        for k in 0..removed.len().max(added.len()) {
            let (l, r) = (removed.get(k), added.get(k));
            let sep = match (l, r) {
                (Some(_), Some(_)) => b'|',
                (Some(_), None) => b'<',
                _ => b'>',
            };
            out.push_row(l, sep, r);
        }
        li = change.left.end;
        ri = change.right.end;
    }
    while li < left.len() && ri < right.len() {
        if show_common {
            out.push_row(Some(&left[li]), b' ', Some(&right[ri]));
        }
        li += 1;
        ri += 1;
    }
}

/// Consecutive changes whose gap is small enough to share context,
/// dropping groups made only of ignorable changes.
fn hunks(changes: &[Change], context: usize) -> Vec<&[Change]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=changes.len() {
        if i == changes.len() || changes[i].left.start - changes[i - 1].left.end > 2 * context {
            groups.push(&changes[start..i]);
            start = i;
        }
    }
    groups.retain(|group| group.iter().any(|c| !c.ignorable));
    groups
}

/// Line spans of a hunk including its surrounding context
fn hunk_spans(
    left: &[Line<'_>],
    right: &[Line<'_>],
    hunk: &[Change],
    context: usize,
) -> (Range<usize>, Range<usize>) {
    let (first, last) = match (hunk.first(), hunk.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return (0..0, 0..0),
    };
    let before = context.min(first.left.start).min(first.right.start);
    let after = context
        .min(left.len() - last.left.end)
        .min(right.len() - last.right.end);
    (
        first.left.start - before..last.left.end + after,
        first.right.start - before..last.right.end + after,
    )
}

/// `N` or `N,M` as used by normal and ed output
fn line_range(range: &Range<usize>) -> String {
    if range.len() == 1 {
        format!("{}", range.start + 1)
    } else {
        format!("{},{}", range.start + 1, range.end)
    }
}

fn unified_range(range: &Range<usize>) -> String {
    match range.len() {
        0 => format!("{},0", range.start),
        1 => format!("{}", range.start + 1),
        len => format!("{},{}", range.start + 1, len),
    }
}

fn context_range(range: &Range<usize>) -> String {
    match range.len() {
        0 => format!("{}", range.start),
        1 => format!("{}", range.start + 1),
        _ => format!("{},{}", range.start + 1, range.end),
    }
}

fn is_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_PROBE_LEN)].contains(&0)
}

fn expand_tabs(text: &[u8], tabsize: usize) -> Vec<u8> {
    let tabsize = tabsize.max(1);
    let mut out = Vec::with_capacity(text.len());
    for &b in text {
        if b == b'\t' {
            let spaces = tabsize - out.len() % tabsize;
            out.extend(std::iter::repeat(b' ').take(spaces));
        } else {
            out.push(b);
        }
    }
    out
}

fn trim_end(text: &[u8]) -> &[u8] {
    let end = text
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &text[..end]
}

/// Runs of white space become one space; trailing white space goes.
fn collapse_space(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut pending = false;
    for &b in text {
        if b.is_ascii_whitespace() {
            pending = true;
        } else {
            if pending {
                out.push(b' ');
                pending = false;
            }
            out.push(b);
        }
    }
    out
}
