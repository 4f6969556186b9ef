//! Freeze spans: destination regions pinned against modification.
//!
//! A region opens on a comment line whose body is `structmerge:freeze`
//! (optionally followed by a reason) and closes on `structmerge:unfreeze`.
//! Which comment syntaxes are recognized is decided by a
//! [`FreezeMarkerRegistry`], owned by the backend that parses documents.

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::error::{ConfigError, StructureError};
use crate::node::Position;

pub const FREEZE_DIRECTIVE: &str = "structmerge:freeze";
pub const UNFREEZE_DIRECTIVE: &str = "structmerge:unfreeze";

/// A parsed freeze region, markers included. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreezeSpan {
    pub start_line: usize,
    pub end_line: usize,
    pub start_marker: String,
    pub end_marker: String,
    pub explicit_reason: Option<String>,
}

impl FreezeSpan {
    pub fn position(&self) -> Position {
        Position::new(self.start_line, self.end_line)
    }

    pub fn intersects(&self, position: &Position) -> bool {
        self.position().intersects(position)
    }
}

/// A line-comment syntax, e.g. `#`, or a delimited one such as `<!-- -->`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentStyle {
    name: String,
    open: String,
    close: Option<String>,
}

impl CommentStyle {
    pub fn new(
        name: impl Into<String>,
        open: impl Into<String>,
        close: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let open = open.into();
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidMarker {
                name,
                reason: "style name must not be empty",
            });
        }
        if open.trim().is_empty() {
            return Err(ConfigError::InvalidMarker {
                name,
                reason: "opening delimiter must not be empty",
            });
        }
        Ok(Self {
            name,
            open: open.trim().to_string(),
            close: close.map(str::trim).filter(|c| !c.is_empty()).map(String::from),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The comment body of `line`, if it is a comment in this style.
    fn body<'a>(&self, line: &'a str) -> Option<&'a str> {
        let rest = line.trim().strip_prefix(self.open.as_str())?;
        let rest = match &self.close {
            Some(close) => rest.strip_suffix(close.as_str())?,
            None => rest,
        };
        Some(rest.trim())
    }
}

/// What a marker line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeMarker {
    Freeze { reason: Option<String> },
    Unfreeze,
}

fn parse_directive(body: &str) -> Option<FreezeMarker> {
    if body == UNFREEZE_DIRECTIVE {
        return Some(FreezeMarker::Unfreeze);
    }
    let rest = body.strip_prefix(FREEZE_DIRECTIVE)?;
    if rest.is_empty() {
        return Some(FreezeMarker::Freeze { reason: None });
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let reason = rest.trim();
    Some(FreezeMarker::Freeze {
        reason: (!reason.is_empty()).then(|| reason.to_string()),
    })
}

/// Registry of recognized comment styles.
///
/// Registration and lookup share one mutex, so styles may be added while the
/// registry is shared between threads. Names are unique.
#[derive(Debug)]
pub struct FreezeMarkerRegistry {
    styles: Mutex<Vec<CommentStyle>>,
}

impl Default for FreezeMarkerRegistry {
    fn default() -> Self {
        Self::with_builtin_styles()
    }
}

impl Clone for FreezeMarkerRegistry {
    fn clone(&self) -> Self {
        Self {
            styles: Mutex::new(self.lock().clone()),
        }
    }
}

impl FreezeMarkerRegistry {
    /// A registry recognizing no comment styles.
    pub fn empty() -> Self {
        Self {
            styles: Mutex::new(Vec::new()),
        }
    }

    /// `hash` (`#`), `slash` (`//`) and `html` (`<!-- -->`).
    pub fn with_builtin_styles() -> Self {
        let builtin = [("html", "<!--", Some("-->")), ("slash", "//", None), ("hash", "#", None)];
        let styles = builtin
            .into_iter()
            .map(|(name, open, close)| CommentStyle {
                name: name.to_string(),
                open: open.to_string(),
                close: close.map(String::from),
            })
            .collect();
        Self {
            styles: Mutex::new(styles),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CommentStyle>> {
        self.styles.lock()
    }

    pub fn register(&self, style: CommentStyle) -> Result<(), ConfigError> {
        let mut styles = self.lock();
        if styles.iter().any(|s| s.name == style.name) {
            return Err(ConfigError::DuplicateMarker(style.name));
        }
        tracing::debug!(style = %style.name, "registered freeze marker style");
        styles.push(style);
        Ok(())
    }

    pub fn style_names(&self) -> Vec<String> {
        self.lock().iter().map(|s| s.name.clone()).collect()
    }

    /// Classify one source line.
    pub fn classify(&self, line: &str) -> Option<FreezeMarker> {
        self.lock()
            .iter()
            .find_map(|style| style.body(line).and_then(parse_directive))
    }

    /// Find every freeze span in `lines` (numbered from 1).
    pub fn scan<'a, I>(&self, lines: I) -> Result<Vec<FreezeSpan>, StructureError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut spans = Vec::new();
        let mut open: Option<(usize, String, Option<String>)> = None;
        let mut last_line = 0;

        for (i, line) in lines.into_iter().enumerate() {
            let line_no = i + 1;
            last_line = line_no;
            match self.classify(line) {
                Some(FreezeMarker::Freeze { reason }) => {
                    if let Some((open_line, _, _)) = &open {
                        return Err(StructureError::NestedFreeze {
                            open_line: *open_line,
                            line: line_no,
                        });
                    }
                    open = Some((line_no, line.trim().to_string(), reason));
                }
                Some(FreezeMarker::Unfreeze) => {
                    let Some((start_line, start_marker, explicit_reason)) = open.take() else {
                        return Err(StructureError::UnexpectedUnfreeze { line: line_no });
                    };
                    spans.push(FreezeSpan {
                        start_line,
                        end_line: line_no,
                        start_marker,
                        end_marker: line.trim().to_string(),
                        explicit_reason,
                    });
                }
                None => {}
            }
        }

        if let Some((start_line, _, _)) = open {
            return Err(StructureError::UnclosedFreeze {
                start_line,
                end_line: last_line,
                unclosed: vec![Position::new(start_line, last_line)],
            });
        }
        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_builtin_styles() {
        let registry = FreezeMarkerRegistry::default();
        assert_eq!(
            registry.classify("# structmerge:freeze"),
            Some(FreezeMarker::Freeze { reason: None })
        );
        assert_eq!(
            registry.classify("  <!-- structmerge:freeze local badges -->"),
            Some(FreezeMarker::Freeze {
                reason: Some("local badges".into())
            })
        );
        assert_eq!(
            registry.classify("// structmerge:unfreeze"),
            Some(FreezeMarker::Unfreeze)
        );
        assert_eq!(registry.classify("# structmerge:freezer"), None);
        assert_eq!(registry.classify("structmerge:freeze"), None);
    }

    #[test]
    fn test_scan_collects_spans() {
        let registry = FreezeMarkerRegistry::default();
        let text = "a\n# structmerge:freeze keep\nb\n# structmerge:unfreeze\nc";
        let spans = registry.scan(text.lines()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].position(), Position::new(2, 4));
        assert_eq!(spans[0].explicit_reason.as_deref(), Some("keep"));
        assert_eq!(spans[0].end_marker, "# structmerge:unfreeze");
        assert!(spans[0].intersects(&Position::single(3)));
        assert!(!spans[0].intersects(&Position::single(5)));
    }

    #[test]
    fn test_scan_structure_errors() {
        let registry = FreezeMarkerRegistry::default();
        let unclosed = registry.scan("a\n# structmerge:freeze\nb".lines()).unwrap_err();
        assert_eq!(
            unclosed,
            StructureError::UnclosedFreeze {
                start_line: 2,
                end_line: 3,
                unclosed: vec![Position::new(2, 3)],
            }
        );
        assert_eq!(
            registry.scan("# structmerge:unfreeze".lines()).unwrap_err(),
            StructureError::UnexpectedUnfreeze { line: 1 }
        );
        assert_eq!(
            registry
                .scan("# structmerge:freeze\n# structmerge:freeze".lines())
                .unwrap_err(),
            StructureError::NestedFreeze { open_line: 1, line: 2 }
        );
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = FreezeMarkerRegistry::empty();
        assert_eq!(registry.classify("-- structmerge:freeze"), None);
        registry
            .register(CommentStyle::new("sql", "--", None).unwrap())
            .unwrap();
        assert!(registry.classify("-- structmerge:freeze").is_some());
        let err = registry
            .register(CommentStyle::new("sql", "--", None).unwrap())
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMarker(name) if name == "sql"));
        assert!(CommentStyle::new("", "#", None).is_err());
    }

    #[test]
    fn test_shared_registration_accepts_each_name_once() {
        let registry = FreezeMarkerRegistry::empty();
        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| registry.register(CommentStyle::new("sql", "--", None).unwrap()).is_ok()))
                .collect();
            handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
        });
        assert_eq!(accepted, 1);
        assert_eq!(registry.style_names(), vec!["sql".to_string()]);
        assert!(registry.classify("-- structmerge:unfreeze").is_some());
    }
}
