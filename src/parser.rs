//! Package-list document parser.
//!
//! The document is line oriented:
//!
//! ```text
//! # comment
//! atop                      # unit with no directives
//! docker-ce:                # unit opening a directive block
//!     repo: ppa:example/docker
//!     flags: lead, post_once
//!     post: usermod -aG docker "$SUDO_USER" && \
//!           systemctl enable docker
//! ```
//!
//! Processing happens in two passes. The first turns physical lines into
//! logical lines (quote-aware comment stripping, then backslash
//! continuation). The second classifies each logical line as a unit name
//! or a directive and folds directives into the open unit.
//!
//! Parsing is fail-fast: the first malformed line aborts with a
//! [`ParseError`] carrying its line number, and no partial [`Registry`] is
//! returned.

use crate::registry::Registry;
use crate::types::{Flag, InstallMethod, ScriptPhase};
use crate::unit::{SourceEntry, Unit};
use std::path::{Path, PathBuf};
use strum::EnumString;
use thiserror::Error;

/// Directory that `source:` file names are resolved under by default.
pub const DEFAULT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Document diagnostics. Every variant carries the 1-based line number of
/// the logical line that caused it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unit name must not contain ':' (directives must be indented): {text}")]
    ColonInUnitName { line: usize, text: String },

    #[error("line {line}: empty unit name")]
    EmptyUnitName { line: usize },

    #[error("line {line}: unit name must not contain '/': {name}")]
    SlashInUnitName { line: usize, name: String },

    #[error("line {line}: indented line is not a `key: value` directive")]
    MissingColon { line: usize },

    #[error("line {line}: directive `{key}` has no value")]
    EmptyDirective { line: usize, key: String },

    #[error("line {line}: directive outside of a unit block (unit lines open a block with a trailing ':')")]
    DirectiveOutsideUnit { line: usize },

    #[error("line {line}: unit '{unit}' opens a directive block but no directive follows")]
    MissingDirectiveBlock { line: usize, unit: String },

    #[error("line {line}: unit '{unit}': unknown directive `{key}`")]
    UnknownDirective {
        line: usize,
        unit: String,
        key: String,
    },

    #[error("line {line}: unit '{unit}': unknown flag `{token}` (valid: {valid})")]
    UnknownFlag {
        line: usize,
        unit: String,
        token: String,
        valid: String,
    },

    #[error("line {line}: unit '{unit}': flag `{flag}` given more than once")]
    DuplicateFlag { line: usize, unit: String, flag: Flag },

    #[error("line {line}: unit '{unit}': flags `{first}` and `{second}` are mutually exclusive")]
    ConflictingFlags {
        line: usize,
        unit: String,
        first: Flag,
        second: Flag,
    },

    #[error("line {line}: unit '{unit}': host pattern `{pattern}` given more than once")]
    DuplicateHost {
        line: usize,
        unit: String,
        pattern: String,
    },

    #[error("line {line}: unit '{unit}': directive `{key}` given more than once")]
    DuplicateDirective {
        line: usize,
        unit: String,
        key: String,
    },

    #[error("line {line}: unit '{unit}': `repo` and `source` directives cannot be combined")]
    RepoSourceConflict { line: usize, unit: String },

    #[error("line {line}: unit '{unit}': `source` must be `<file name> <content>`")]
    MalformedSource { line: usize, unit: String },

    #[error("line {line}: duplicate unit '{name}' (first declared on line {first_line})")]
    DuplicateUnit {
        line: usize,
        name: String,
        first_line: usize,
    },
}

impl ParseError {
    /// Line number the diagnostic refers to.
    pub fn line(&self) -> usize {
        match self {
            Self::ColonInUnitName { line, .. }
            | Self::EmptyUnitName { line }
            | Self::SlashInUnitName { line, .. }
            | Self::MissingColon { line }
            | Self::EmptyDirective { line, .. }
            | Self::DirectiveOutsideUnit { line }
            | Self::MissingDirectiveBlock { line, .. }
            | Self::UnknownDirective { line, .. }
            | Self::UnknownFlag { line, .. }
            | Self::DuplicateFlag { line, .. }
            | Self::ConflictingFlags { line, .. }
            | Self::DuplicateHost { line, .. }
            | Self::DuplicateDirective { line, .. }
            | Self::RepoSourceConflict { line, .. }
            | Self::MalformedSource { line, .. }
            | Self::DuplicateUnit { line, .. } => *line,
        }
    }
}

/// Directive keys. Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DirectiveKey {
    Hosts,
    Flags,
    Deb,
    Repo,
    Source,
    Pre,
    Post,
    Package,
}

/// Flag pairs that may never appear together on one unit.
const EXCLUSIVE_FLAGS: &[(Flag, Flag)] = &[(Flag::Force, Flag::Skip), (Flag::Lead, Flag::Trail)];

/// A comment-stripped, continuation-joined line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Line number of the first physical line
    pub number: usize,
    pub text: String,
}

/// Cut `line` at the first `#` that is not inside a quoted span.
///
/// A span opened by `"` is only closed by `"`, and `'` by `'`, so
/// `echo "it's #1"` is left intact.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match quote {
            None if c == '#' => return &line[..i],
            None if c == '"' || c == '\'' => quote = Some(c),
            Some(q) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

/// A single trailing backslash continues the line; an escaped one does not.
fn is_continued(line: &str) -> bool {
    line.ends_with('\\') && !line.ends_with("\\\\")
}

/// Split a document into logical lines.
///
/// A continued line has its backslash replaced by a newline and is joined
/// with the following physical line, so a continued script value becomes
/// a sequence of shell statements. A continuation on the last line is
/// closed by end of input.
pub fn logical_lines(text: &str) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut pending: Option<LogicalLine> = None;

    for (idx, raw) in text.lines().enumerate() {
        let stripped = strip_comment(raw).trim_end();
        let mut current = pending.take().unwrap_or(LogicalLine {
            number: idx + 1,
            text: String::new(),
        });

        if is_continued(stripped) {
            current.text.push_str(&stripped[..stripped.len() - 1]);
            current.text.push('\n');
            pending = Some(current);
        } else {
            current.text.push_str(stripped);
            lines.push(current);
        }
    }

    if let Some(mut last) = pending {
        last.text.truncate(last.text.trim_end().len());
        lines.push(last);
    }
    lines
}

/// The unit currently receiving directives.
struct OpenUnit {
    line: usize,
    unit: Unit,
    block: bool,
    directives: usize,
}

/// Parser state. Use [`parse_document`] unless a non-default sources
/// directory is needed.
pub struct Parser {
    sources_dir: PathBuf,
    registry: Registry,
    open: Option<OpenUnit>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCES_DIR)
    }
}

impl Parser {
    pub fn new(sources_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources_dir: sources_dir.into(),
            registry: Registry::new(),
            open: None,
        }
    }

    /// Parse a whole document.
    pub fn parse(mut self, text: &str) -> Result<Registry, ParseError> {
        for line in logical_lines(text) {
            self.feed(&line)?;
        }
        self.close_unit()?;
        tracing::debug!("Parsed {} unit(s)", self.registry.len());
        Ok(self.registry)
    }

    fn feed(&mut self, line: &LogicalLine) -> Result<(), ParseError> {
        let text = line.text.as_str();
        if text.trim().is_empty() {
            return Ok(());
        }

        if text.starts_with(char::is_whitespace) {
            self.directive(line.number, text.trim_start())
        } else {
            self.unit_line(line.number, text)
        }
    }

    fn unit_line(&mut self, number: usize, text: &str) -> Result<(), ParseError> {
        let (name, block) = match text.strip_suffix(':') {
            Some(name) => (name.trim(), true),
            None => (text.trim(), false),
        };
        if name.contains(':') {
            return Err(ParseError::ColonInUnitName {
                line: number,
                text: text.to_string(),
            });
        }
        if name.is_empty() {
            return Err(ParseError::EmptyUnitName { line: number });
        }
        // Names become semaphore file names
        if name.contains('/') {
            return Err(ParseError::SlashInUnitName {
                line: number,
                name: name.to_string(),
            });
        }

        self.close_unit()?;
        if let Some(first) = self.registry.entry(name) {
            return Err(ParseError::DuplicateUnit {
                line: number,
                name: name.to_string(),
                first_line: first.line,
            });
        }

        self.open = Some(OpenUnit {
            line: number,
            unit: Unit::new(name),
            block,
            directives: 0,
        });
        Ok(())
    }

    fn close_unit(&mut self) -> Result<(), ParseError> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        if open.block && open.directives == 0 {
            return Err(ParseError::MissingDirectiveBlock {
                line: open.line,
                unit: open.unit.name,
            });
        }
        self.registry.append(open.line, open.unit)
    }

    fn directive(&mut self, number: usize, text: &str) -> Result<(), ParseError> {
        let Some((key, content)) = text.split_once(':') else {
            return Err(ParseError::MissingColon { line: number });
        };
        let key = key.trim().to_lowercase();
        let content = content.trim();
        if content.is_empty() {
            return Err(ParseError::EmptyDirective { line: number, key });
        }

        let sources_dir = self.sources_dir.clone();
        let open = match self.open.as_mut() {
            Some(open) if open.block => open,
            _ => return Err(ParseError::DirectiveOutsideUnit { line: number }),
        };
        open.directives += 1;

        let unit = &mut open.unit;
        let Ok(parsed) = key.parse::<DirectiveKey>() else {
            return Err(ParseError::UnknownDirective {
                line: number,
                unit: unit.name.clone(),
                key,
            });
        };
        apply_directive(unit, number, parsed, content, &sources_dir)
    }
}

fn apply_directive(
    unit: &mut Unit,
    line: usize,
    key: DirectiveKey,
    content: &str,
    sources_dir: &Path,
) -> Result<(), ParseError> {
    let duplicate = |name: &str| ParseError::DuplicateDirective {
        line,
        unit: name.to_string(),
        key: key.to_string(),
    };

    match key {
        DirectiveKey::Hosts => {
            for pattern in split_list(content) {
                let pattern = pattern.to_lowercase();
                if unit.host_patterns.contains(&pattern) {
                    return Err(ParseError::DuplicateHost {
                        line,
                        unit: unit.name.clone(),
                        pattern,
                    });
                }
                unit.host_patterns.insert(pattern);
            }
        }
        DirectiveKey::Flags => {
            for token in split_list(content) {
                let Some(flag) = Flag::parse_token(token) else {
                    return Err(ParseError::UnknownFlag {
                        line,
                        unit: unit.name.clone(),
                        token: token.to_string(),
                        valid: Flag::valid_tokens(),
                    });
                };
                if !unit.flags.insert(flag) {
                    return Err(ParseError::DuplicateFlag {
                        line,
                        unit: unit.name.clone(),
                        flag,
                    });
                }
            }
            for &(first, second) in EXCLUSIVE_FLAGS {
                if unit.has_flag(first) && unit.has_flag(second) {
                    return Err(ParseError::ConflictingFlags {
                        line,
                        unit: unit.name.clone(),
                        first,
                        second,
                    });
                }
            }
        }
        DirectiveKey::Deb => {
            if unit.source_url.is_some() {
                return Err(duplicate(&unit.name));
            }
            unit.install_method = InstallMethod::DownloadedArchive;
            unit.source_url = Some(content.to_string());
        }
        DirectiveKey::Repo => {
            if !unit.source_entries.is_empty() {
                return Err(ParseError::RepoSourceConflict {
                    line,
                    unit: unit.name.clone(),
                });
            }
            if !unit.repositories.iter().any(|r| r == content) {
                unit.repositories.push(content.to_string());
            }
        }
        DirectiveKey::Source => {
            if !unit.repositories.is_empty() {
                return Err(ParseError::RepoSourceConflict {
                    line,
                    unit: unit.name.clone(),
                });
            }
            let malformed = || ParseError::MalformedSource {
                line,
                unit: unit.name.clone(),
            };
            let (file, text) = content.split_once(char::is_whitespace).ok_or_else(malformed)?;
            let text = text.trim_start();
            let base = Path::new(file).file_name().ok_or_else(malformed)?;
            if text.is_empty() {
                return Err(malformed());
            }
            unit.source_entries.push(SourceEntry {
                path: sources_dir.join(base),
                content: text.to_string(),
            });
        }
        DirectiveKey::Pre | DirectiveKey::Post => {
            let phase = if key == DirectiveKey::Pre {
                ScriptPhase::Pre
            } else {
                ScriptPhase::Post
            };
            if unit.scripts.contains_key(&phase) {
                return Err(duplicate(&unit.name));
            }
            unit.scripts.insert(phase, content.to_string());
        }
        DirectiveKey::Package => {
            if unit.package_name.is_some() {
                return Err(duplicate(&unit.name));
            }
            unit.package_name = Some(content.to_string());
        }
    }
    Ok(())
}

/// Comma-separated list items, trimmed, empty items dropped.
fn split_list(content: &str) -> impl Iterator<Item = &str> {
    content.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a document with `source:` files resolved under [`DEFAULT_SOURCES_DIR`].
pub fn parse_document(text: &str) -> Result<Registry, ParseError> {
    Parser::default().parse(text)
}
