use clap::{Arg, CommandFactory, Parser};
use rdiff_common::{
    load_config, time_locale_is_localized, AppConfig, DiffOptions, OutputStyle, RDiffError,
    Result, Severity, WhitespaceMode,
};
use rdiff_core::{ComparisonEngine, FsLister, Reporter, Sink, SlotError, TextDiffEngine};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const PROGRAM: &str = "rdiff";

/// Environment variable holding the log filter
const LOG_ENV_VAR: &str = "RDIFF_LOG";

#[derive(Parser, Debug)]
#[command(name = "rdiff")]
#[command(author = "RDiff Contributors")]
#[command(version)]
#[command(about = "Compare files line by line and directories by name", long_about = None)]
struct Cli {
    /// Files or directories to compare; `-` reads standard input
    #[arg(value_name = "FILE")]
    operands: Vec<OsString>,

    /// Report only when files differ
    #[arg(short = 'q', long)]
    brief: bool,

    /// Report when two files are the same
    #[arg(short = 's', long)]
    report_identical_files: bool,

    /// Output a normal diff (the default)
    #[arg(long)]
    normal: bool,

    /// Output 3 lines of copied context
    #[arg(short = 'c')]
    copied: bool,

    /// Output NUM lines of copied context
    #[arg(short = 'C', value_name = "NUM")]
    context_lines: Option<usize>,

    /// Output NUM (default 3) lines of copied context
    #[arg(
        long = "context",
        value_name = "NUM",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "3"
    )]
    context: Option<usize>,

    /// Output 3 lines of unified context
    #[arg(short = 'u')]
    unified_default: bool,

    /// Output NUM lines of unified context
    #[arg(short = 'U', value_name = "NUM")]
    unified_lines: Option<usize>,

    /// Output NUM (default 3) lines of unified context
    #[arg(
        long = "unified",
        value_name = "NUM",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "3"
    )]
    unified: Option<usize>,

    /// Output an ed script
    #[arg(short = 'e', long)]
    ed: bool,

    /// Output in two columns
    #[arg(short = 'y', long)]
    side_by_side: bool,

    /// Output at most NUM print columns
    #[arg(short = 'W', long, value_name = "NUM")]
    width: Option<usize>,

    /// Do not output common lines in side-by-side mode
    #[arg(long)]
    suppress_common_lines: bool,

    /// Use LABEL instead of the file name (may be given twice)
    #[arg(long, value_name = "LABEL")]
    label: Vec<String>,

    /// Recursively compare any subdirectories found
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Do not follow symbolic links
    #[arg(long)]
    no_dereference: bool,

    /// Treat absent files as empty
    #[arg(short = 'N', long)]
    new_file: bool,

    /// Treat absent first files as empty
    #[arg(long)]
    unidirectional_new_file: bool,

    /// Ignore case when comparing file names
    #[arg(long, overrides_with = "no_ignore_file_name_case")]
    ignore_file_name_case: bool,

    /// Consider case when comparing file names
    #[arg(long, overrides_with = "ignore_file_name_case")]
    no_ignore_file_name_case: bool,

    /// Exclude files that match PAT
    #[arg(short = 'x', long, value_name = "PAT")]
    exclude: Vec<String>,

    /// Exclude files that match any pattern in FILE
    #[arg(short = 'X', long, value_name = "FILE")]
    exclude_from: Vec<PathBuf>,

    /// Start with FILE when comparing directories
    #[arg(short = 'S', long, value_name = "FILE")]
    starting_file: Option<String>,

    /// Compare FILE to all operands; FILE can be a directory
    #[arg(long, value_name = "FILE")]
    from_file: Option<OsString>,

    /// Compare all operands to FILE; FILE can be a directory
    #[arg(long, value_name = "FILE")]
    to_file: Option<OsString>,

    /// Ignore case differences in file contents
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Ignore changes due to tab expansion
    #[arg(short = 'E', long)]
    ignore_tab_expansion: bool,

    /// Ignore white space at line end
    #[arg(short = 'Z', long)]
    ignore_trailing_space: bool,

    /// Ignore changes in the amount of white space
    #[arg(short = 'b', long)]
    ignore_space_change: bool,

    /// Ignore all white space
    #[arg(short = 'w', long)]
    ignore_all_space: bool,

    /// Ignore changes whose lines are all blank
    #[arg(short = 'B', long)]
    ignore_blank_lines: bool,

    /// Ignore changes all of whose lines match RE
    #[arg(short = 'I', long, value_name = "RE")]
    ignore_matching_lines: Vec<String>,

    /// Treat all files as text
    #[arg(short = 'a', long)]
    text: bool,

    /// Strip trailing carriage return on input
    #[arg(long)]
    strip_trailing_cr: bool,

    /// Read and write data in binary mode
    #[arg(long)]
    binary: bool,

    /// Expand tabs to spaces in output
    #[arg(short = 't', long)]
    expand_tabs: bool,

    /// Tab stops every NUM (default 8) print columns
    #[arg(long, value_name = "NUM")]
    tabsize: Option<usize>,
}

impl Cli {
    /// The requested output style and any context length given with it
    fn output_style(&self) -> Result<(OutputStyle, Option<usize>)> {
        let context = self.context_lines.or(self.context);
        let unified = self.unified_lines.or(self.unified);

        let mut styles = Vec::new();
        if self.normal {
            styles.push(OutputStyle::Normal);
        }
        if self.copied || context.is_some() {
            styles.push(OutputStyle::Context);
        }
        if self.unified_default || unified.is_some() {
            styles.push(OutputStyle::Unified);
        }
        if self.ed {
            styles.push(OutputStyle::Ed);
        }
        if self.side_by_side {
            styles.push(OutputStyle::SideBySide);
        }

        match styles.as_slice() {
            [] => Ok((OutputStyle::Normal, None)),
            [style] => Ok((*style, context.or(unified))),
            _ => Err(RDiffError::usage("conflicting output style options")),
        }
    }

    /// Finished options: configuration file defaults, then the command line.
    fn build_options(&self, config: &AppConfig) -> Result<DiffOptions> {
        let mut options = DiffOptions::default();
        config.apply_to(&mut options);

        let (style, context) = self.output_style()?;
        options.output_style = style;
        if let Some(context) = context {
            options.context = context;
        }

        if let Some(width) = self.width {
            if width == 0 {
                return Err(RDiffError::usage(format!("invalid width '{width}'")));
            }
            options.width = width;
        }
        if let Some(tabsize) = self.tabsize {
            if tabsize == 0 {
                return Err(RDiffError::usage(format!("invalid tabsize '{tabsize}'")));
            }
            options.tabsize = tabsize;
        }
        options.expand_tabs = self.expand_tabs;
        options.suppress_common_lines = self.suppress_common_lines;

        options.brief = self.brief;
        options.report_identical = self.report_identical_files;
        options.recursive = self.recursive;
        options.new_file = self.new_file;
        options.unidirectional_new_file = self.unidirectional_new_file;
        options.no_dereference |= self.no_dereference;

        options.text = self.text;
        options.binary = self.binary;
        options.ignore_case = self.ignore_case;
        options.ignore_blank_lines = self.ignore_blank_lines;
        options.strip_trailing_cr = self.strip_trailing_cr;
        options.whitespace = WhitespaceMode::from_flags(
            self.ignore_all_space,
            self.ignore_space_change,
            self.ignore_tab_expansion,
            self.ignore_trailing_space,
        );
        options.ignore_matching_lines = self.ignore_matching_lines.clone();

        if self.label.len() > 2 {
            return Err(RDiffError::usage("too many file label options"));
        }
        for (slot, label) in options.labels.iter_mut().zip(&self.label) {
            *slot = Some(label.clone());
        }

        options.exclude_patterns.extend(self.exclude.iter().cloned());
        for path in &self.exclude_from {
            let contents = fs::read_to_string(path).map_err(|e| {
                RDiffError::usage(format!("{}: {}", path.display(), SlotError::from(&e)))
            })?;
            options.exclude_patterns.extend(
                contents
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        if self.no_ignore_file_name_case {
            options.ignore_file_name_case = false;
        } else if self.ignore_file_name_case {
            options.ignore_file_name_case = true;
        }
        options.starting_file = self.starting_file.clone();

        Ok(options)
    }

    /// Operand pairs to compare, in order. `last_arg` is the final raw
    /// command-line argument, named in "missing operand" messages.
    fn plan_operands(&self, last_arg: &OsStr) -> Result<Vec<(OsString, OsString)>> {
        match (&self.from_file, &self.to_file) {
            (Some(_), Some(_)) => Err(RDiffError::usage(
                "--from-file and --to-file both specified",
            )),
            (Some(from), None) => Ok(self
                .operands
                .iter()
                .map(|operand| (from.clone(), operand.clone()))
                .collect()),
            (None, Some(to)) => Ok(self
                .operands
                .iter()
                .map(|operand| (operand.clone(), to.clone()))
                .collect()),
            (None, None) => match self.operands.as_slice() {
                [left, right] => Ok(vec![(left.clone(), right.clone())]),
                [_, _, extra, ..] => Err(RDiffError::usage(format!(
                    "extra operand '{}'",
                    extra.to_string_lossy()
                ))),
                _ => Err(RDiffError::usage(format!(
                    "missing operand after '{}'",
                    last_arg.to_string_lossy()
                ))),
            },
        }
    }
}

fn main() {
    // Logs go to stderr so stdout carries only the comparison output.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<OsString> = std::env::args_os().collect();
    let cli = Cli::parse_from(&args);

    std::process::exit(run(&cli, &args));
}

/// Run the whole comparison and return the process exit status.
fn run(cli: &Cli, args: &[OsString]) -> i32 {
    let (options, pairs) = match prepare(cli, args) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("{PROGRAM}: {err}");
            if err.is_usage() {
                eprintln!("Try '{PROGRAM} --help' for more information.");
            }
            return Severity::Trouble.exit_code();
        }
    };

    match compare(&options, &pairs) {
        Ok(severity) => severity.exit_code(),
        Err(err) => {
            eprintln!("{PROGRAM}: {err}");
            Severity::Trouble.exit_code()
        }
    }
}

/// Everything that can fail before the first comparison
fn prepare(cli: &Cli, args: &[OsString]) -> Result<(DiffOptions, Vec<(OsString, OsString)>)> {
    let loaded = load_config()?;
    if loaded.exists {
        if let Some(path) = &loaded.path {
            info!("Loaded configuration from {}", path.display());
        }
    }

    let mut options = cli.build_options(&loaded.config)?;
    options.switches = switch_string(args);
    options.localized_time = time_locale_is_localized();
    let last_arg = args.last().map(OsString::as_os_str).unwrap_or_default();
    let pairs = cli.plan_operands(last_arg)?;
    debug!("Comparing {} operand pairs with {:?}", pairs.len(), options);
    Ok((options, pairs))
}

/// Every option argument (with its value) in command-line order, each
/// shell-quoted behind a space. Operands are left out.
fn switch_string(args: &[OsString]) -> String {
    let command = Cli::command();
    let separate_value =
        |arg: &&Arg| !arg.is_positional() && arg.get_action().takes_values();
    let short_with_value: Vec<char> = command
        .get_arguments()
        .filter(separate_value)
        .filter_map(Arg::get_short)
        .collect();
    let long_with_value: Vec<&str> = command
        .get_arguments()
        .filter(separate_value)
        .filter(|arg| !arg.is_require_equals_set())
        .filter_map(Arg::get_long)
        .collect();

    let mut switches = String::new();
    let mut push = |arg: &OsStr| {
        switches.push(' ');
        switches.push_str(&shell_quote(&arg.to_string_lossy()));
    };

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        let text = arg.to_string_lossy();
        let value_follows = if text == "--" {
            push(arg.as_os_str());
            break;
        } else if let Some(long) = text.strip_prefix("--") {
            !long.contains('=') && long_with_value.contains(&long)
        } else if let Some(cluster) = text.strip_prefix('-').filter(|c| !c.is_empty()) {
            // The first value-taking letter owns the rest of the cluster.
            match cluster.char_indices().find(|(_, c)| short_with_value.contains(c)) {
                Some((at, c)) => at + c.len_utf8() == cluster.len(),
                None => false,
            }
        } else {
            continue;
        };

        push(arg.as_os_str());
        if value_follows {
            if let Some(value) = rest.next() {
                push(value.as_os_str());
            }
        }
    }
    switches
}

/// Quote `word` for a POSIX shell when it holds anything but plain characters.
fn shell_quote(word: &str) -> String {
    let plain = |c: char| c.is_ascii_alphanumeric() || "%+,-./:=@_^".contains(c);
    if !word.is_empty() && word.chars().all(plain) {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

fn compare(options: &DiffOptions, pairs: &[(OsString, OsString)]) -> Result<Severity> {
    let lister = FsLister::new(options)?;
    let differ = TextDiffEngine::new(options)?;
    let engine = ComparisonEngine::new(options, &lister, &differ);

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut reporter =
        Reporter::new(BufWriter::new(stdout.lock()), stderr.lock()).with_program(PROGRAM);

    let severity = engine.compare_all(pairs.iter().cloned(), &mut reporter)?;
    reporter.finish()?;
    Ok(severity)
}
