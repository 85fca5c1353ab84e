// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment and validation failures into miette reports.
//!
//! Unknown keys get a "did you mean" hint ranked by Jaro-Winkler similarity,
//! and every error that can be located in a TOML file is labelled in place.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Below this Jaro-Winkler score a key is not offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A problem with `lifeline.toml` or the `LIFELINE_*` environment.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(
        code(lifeline::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// `[section]`, or "the top level".
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a lifeline setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(lifeline::config::invalid_type), help("`{key}` takes {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(lifeline::config::missing_key),
        help("set `{key}` in lifeline.toml or through its LIFELINE_* variable")
    )]
    MissingKey { key: String },

    /// The file parsed but a value is out of range or contradicts another.
    #[error("invalid `{key}`: {message}")]
    #[diagnostic(code(lifeline::config::validation))]
    Validation { key: String, message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(lifeline::config::other))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? This section accepts: {valid_keys}"),
        None => format!("this section accepts: {valid_keys}"),
    }
}

/// Split a figment error into one diagnostic per underlying failure so every
/// problem is reported in a single run.
///
/// `toml_sources` holds `(path, content)` for each file that was merged.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let located = SourceFile::of(&error, toml_sources);
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate(located, &error.path, field);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: match error.path.first() {
                            Some(section) => format!("[{section}]"),
                            None => "the top level".to_string(),
                        },
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&error.path, field),
                },
                Kind::InvalidType(actual, expected) => {
                    let (section, field) = match error.path.split_last() {
                        Some((field, section)) => (section, field.as_str()),
                        None => (&[][..], ""),
                    };
                    let (span, src) = locate(located, section, field);
                    ConfigError::InvalidType {
                        key: error.path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn dotted(path: &[String], field: &str) -> String {
    path.iter()
        .map(String::as_str)
        .chain(std::iter::once(field))
        .collect::<Vec<_>>()
        .join(".")
}

/// The TOML file a figment error came from, when it came from one we read.
struct SourceFile<'a> {
    path: &'a str,
    content: &'a str,
}

impl<'a> SourceFile<'a> {
    fn of(error: &figment::error::Error, toml_sources: &'a [(String, String)]) -> Option<Self> {
        let origin = match error.metadata.as_ref()?.source.as_ref()? {
            figment::Source::File(path) => path.display().to_string(),
            figment::Source::Custom(_) => return None,
            // Inline strings are registered under a fixed name.
            _ => "<inline>".to_string(),
        };
        toml_sources
            .iter()
            .find(|(path, _)| *path == origin)
            .map(|(path, content)| SourceFile { path, content })
    }
}

fn locate(
    file: Option<SourceFile<'_>>,
    section: &[String],
    field: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(file) = file else {
        return (None, None);
    };
    match find_key_offset(file.content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(file.path, file.content.to_string())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside the `[section]` table named by
/// `path` (the top level when `path` is empty).
///
/// Tracks table headers line by line, so a key of the same name in another
/// section is never matched.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let wanted = path.first().map(String::as_str);
    let mut current: Option<&str> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            current = header.split(']').next().map(str::trim);
        } else if current == wanted {
            let is_key = trimmed
                .strip_prefix(field)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if is_key {
                return Some(offset + (line.len() - trimmed.len()));
            }
        }
        offset += line.len();
    }
    None
}

/// The valid key closest to `unknown`, if any is close enough to be a typo.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print every error to stderr as a miette report.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    eprintln!(
        "lifeline: {} configuration problem{}",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("  {error}"),
        }
    }
}
