//! Renderers turning configuration state into file lines.
use std::path::Path;

use crate::config::ConfigurationState;
use crate::error::CatalogError;

/// How an artifact's lines are produced from the configuration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renderer {
    /// Fixed text, no substitution.
    Static(Vec<String>),
    /// Text with `{group.key}` and `{group}` placeholders.
    Template(Vec<String>),
    /// Lines assembled from blocks, in order.
    Generated(Vec<Block>),
}

/// One piece of a [`Renderer::Generated`] artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// A literal line.
    Line(String),
    /// One line per scalar of `group`, with `{}` in `pattern` replaced by the scalar.
    Scalars {
        /// Source group.
        group: String,
        /// Line pattern containing `{}`.
        pattern: String,
    },
    /// One `key<separator>value` line per pair of `group`.
    Pairs {
        /// Source group.
        group: String,
        /// Text placed between key and value.
        separator: String,
    },
}

impl Block {
    /// A literal line.
    #[must_use]
    pub fn line(text: &str) -> Self {
        Self::Line(text.to_string())
    }

    /// One line per scalar of `group`.
    #[must_use]
    pub fn scalars(group: &str, pattern: &str) -> Self {
        Self::Scalars {
            group: group.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// One line per pair of `group`.
    #[must_use]
    pub fn pairs(group: &str, separator: &str) -> Self {
        Self::Pairs {
            group: group.to_string(),
            separator: separator.to_string(),
        }
    }
}

impl Renderer {
    /// Build a [`Renderer::Static`] from string slices.
    #[must_use]
    pub fn fixed(lines: &[&str]) -> Self {
        Self::Static(lines.iter().map(ToString::to_string).collect())
    }

    /// Build a [`Renderer::Template`] from string slices.
    #[must_use]
    pub fn template(lines: &[&str]) -> Self {
        Self::Template(lines.iter().map(ToString::to_string).collect())
    }

    /// Produce the lines for the artifact at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unresolved`] if a template placeholder names a
    /// group or key that the state does not define.
    pub fn render(
        &self,
        path: &Path,
        state: &ConfigurationState,
    ) -> Result<Vec<String>, CatalogError> {
        match self {
            Self::Static(lines) => Ok(lines.clone()),
            Self::Template(lines) => lines
                .iter()
                .map(|line| substitute(line, path, state))
                .collect(),
            Self::Generated(blocks) => Ok(blocks
                .iter()
                .flat_map(|block| expand(block, state))
                .collect()),
        }
    }
}

fn expand(block: &Block, state: &ConfigurationState) -> Vec<String> {
    match block {
        Block::Line(text) => vec![text.clone()],
        Block::Scalars { group, pattern } => state
            .scalars(group)
            .map(|value| pattern.replace("{}", value))
            .collect(),
        Block::Pairs { group, separator } => state
            .pairs(group)
            .map(|(key, value)| format!("{key}{separator}{value}"))
            .collect(),
    }
}

/// Whether `name` looks like a placeholder body rather than literal braces
/// (udev `ATTR{power/control}`, shell `${x}` and the like).
fn is_placeholder(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        && !name.starts_with('.')
        && !name.ends_with('.')
}

/// Replace every placeholder in `line`.
fn substitute(
    line: &str,
    path: &Path,
    state: &ConfigurationState,
) -> Result<String, CatalogError> {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('{') {
        let (before, from_open) = rest.split_at(open);
        out.push_str(before);
        let Some(close) = from_open.find('}') else {
            out.push_str(from_open);
            return Ok(out);
        };
        let name = from_open.get(1..close).unwrap_or_default();
        let after = from_open.get(close + 1..).unwrap_or_default();
        if is_placeholder(name) && !before.ends_with('$') {
            out.push_str(&resolve(name, path, state)?);
        } else {
            out.push_str(from_open.get(..=close).unwrap_or_default());
        }
        rest = after;
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve(name: &str, path: &Path, state: &ConfigurationState) -> Result<String, CatalogError> {
    let unresolved = || CatalogError::Unresolved {
        path: path.to_path_buf(),
        placeholder: name.to_string(),
    };
    match name.split_once('.') {
        Some((group, key)) => state
            .value(group, key)
            .map(ToString::to_string)
            .ok_or_else(unresolved),
        None if state.has_group(name) => Ok(state.scalars(name).collect::<Vec<_>>().join(" ")),
        None => Err(unresolved()),
    }
}

/// Join rendered lines into file content: `\n`-separated with a trailing
/// newline, or empty when there are no lines.
///
/// # Examples
///
/// ```
/// use syscfg::catalog::content_bytes;
///
/// assert_eq!(content_bytes(&["a".into(), "b".into()]), b"a\nb\n");
/// assert!(content_bytes(&[]).is_empty());
/// ```
#[must_use]
pub fn content_bytes(lines: &[String]) -> Vec<u8> {
    if lines.is_empty() {
        return Vec::new();
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text.into_bytes()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn state() -> ConfigurationState {
        ConfigurationState::new()
            .with_scalars("kernel_params", ["quiet", "loglevel=3"])
            .with_scalars("empty", Vec::<String>::new())
            .with_pairs("system", [("root", "LABEL=root"), ("regdom", "DE")])
            .with_pairs("journald", [("Storage", "auto"), ("Compress", "yes")])
    }

    fn path() -> &'static Path {
        Path::new("/etc/test.conf")
    }

    #[test]
    fn template_substitutes_pairs_and_scalars() {
        let r = Renderer::template(&["root={system.root} rw {kernel_params}"]);
        insta::assert_snapshot!(r.render(path(), &state()).unwrap()[0], @"root=LABEL=root rw quiet loglevel=3");
    }

    #[test]
    fn template_leaves_literal_braces() {
        let r = Renderer::template(&[
            r#"ATTR{power/control}="auto""#,
            "echo ${HOME} {}",
            "unterminated {system.root",
        ]);
        let lines = r.render(path(), &state()).unwrap();
        assert_eq!(lines[0], r#"ATTR{power/control}="auto""#);
        assert_eq!(lines[1], "echo ${HOME} {}");
        assert_eq!(lines[2], "unterminated {system.root");
    }

    #[test]
    fn template_reports_unresolved() {
        let r = Renderer::template(&["x={system.missing}"]);
        let err = r.render(path(), &state()).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Unresolved {
                path: path().to_path_buf(),
                placeholder: "system.missing".into()
            }
        );
        let r = Renderer::template(&["{nogroup}"]);
        assert!(r.render(path(), &state()).is_err());
    }

    #[test]
    fn template_empty_group_renders_empty() {
        let r = Renderer::template(&["MODULES=({empty})"]);
        assert_eq!(r.render(path(), &state()).unwrap(), ["MODULES=()"]);
    }

    #[test]
    fn generated_expands_blocks_in_order() {
        let r = Renderer::Generated(vec![
            Block::line("[Journal]"),
            Block::pairs("journald", "="),
            Block::scalars("kernel_params", "param {}"),
        ]);
        assert_eq!(
            r.render(path(), &state()).unwrap(),
            [
                "[Journal]",
                "Storage=auto",
                "Compress=yes",
                "param quiet",
                "param loglevel=3"
            ]
        );
    }

    #[test]
    fn generated_missing_group_yields_no_lines() {
        let r = Renderer::Generated(vec![Block::scalars("absent", "{}")]);
        assert!(r.render(path(), &state()).unwrap().is_empty());
    }

    #[test]
    fn static_ignores_placeholders() {
        let r = Renderer::fixed(&["{system.root}"]);
        assert_eq!(r.render(path(), &state()).unwrap(), ["{system.root}"]);
    }

    #[test]
    fn content_bytes_joins_with_trailing_newline() {
        assert_eq!(content_bytes(&["only".into()]), b"only\n");
        assert_eq!(content_bytes(&[String::new()]), b"\n");
    }
}
