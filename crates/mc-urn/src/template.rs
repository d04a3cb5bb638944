//! URN template compilation.
//!
//! A template is a literal string with `{param}` placeholders. Compilation
//! checks the placeholders against the entity's declared parameters; the
//! compiled form builds URNs by literal substitution with escaping, and can
//! parse URNs back into parameters when the template is unambiguous.

use mc_core::{ParamMap, Urn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::escape::{contains_reserved, escape_value, unescape_value};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Errors raised while compiling a template at registry load time.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("unbalanced brace at byte {position}")]
    UnbalancedBrace { position: usize },

    #[error("placeholder {{{param}}} does not name a declared parameter")]
    UnknownPlaceholder { param: String },

    #[error("placeholder {{{param}}} appears more than once")]
    DuplicatePlaceholder { param: String },

    #[error("identifying parameter {param} does not appear in the template")]
    MissingIdentifying { param: String },
}

/// Errors raised while building a URN from caller parameters.
#[derive(Debug, Error)]
pub enum UrnBuildError {
    #[error("missing identifying parameter {param}")]
    MissingParam { param: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled URN template for one entity type.
#[derive(Debug, Clone)]
pub struct UrnTemplate {
    source: String,
    segments: Vec<Segment>,
    params: Vec<String>,
    reversible: bool,
}

impl UrnTemplate {
    /// Compile a template against the entity's declared parameters.
    ///
    /// Every placeholder must name a declared (identifying or optional)
    /// parameter, no placeholder may repeat, and every identifying
    /// parameter must appear so the URN stays a pure function of the
    /// identifying tuple.
    pub fn compile(
        template: &str,
        identifying: &[String],
        optional: &[String],
    ) -> Result<Self, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::Empty);
        }
        if let Some(pos) = stray_brace(template) {
            return Err(TemplateError::UnbalancedBrace { position: pos });
        }

        let mut segments = Vec::new();
        let mut params = Vec::new();
        let mut cursor = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let whole = caps.get(0).expect("capture 0");
            let name = caps.get(1).expect("capture 1").as_str();

            if !identifying.iter().any(|p| p == name) && !optional.iter().any(|p| p == name) {
                return Err(TemplateError::UnknownPlaceholder { param: name.to_string() });
            }
            if params.iter().any(|p| p == name) {
                return Err(TemplateError::DuplicatePlaceholder { param: name.to_string() });
            }

            if whole.start() > cursor {
                segments.push(Segment::Literal(template[cursor..whole.start()].to_string()));
            }
            segments.push(Segment::Param(name.to_string()));
            params.push(name.to_string());
            cursor = whole.end();
        }
        if cursor < template.len() {
            segments.push(Segment::Literal(template[cursor..].to_string()));
        }

        for param in identifying {
            if !params.iter().any(|p| p == param) {
                return Err(TemplateError::MissingIdentifying { param: param.clone() });
            }
        }

        let reversible = is_reversible(&segments);
        Ok(Self {
            source: template.to_string(),
            segments,
            params,
            reversible,
        })
    }

    /// The original template string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameters referenced by the template, in template order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Whether [`UrnTemplate::parse`] is supported.
    ///
    /// A template is reversible when each placeholder is followed by a
    /// literal containing at least one reserved character (which escaping
    /// keeps out of values), or ends the template.
    pub fn is_reversible(&self) -> bool {
        self.reversible
    }

    /// Build a URN by literal substitution. Deterministic: the same params
    /// always yield a byte-identical URN.
    pub fn build(&self, params: &ParamMap) -> Result<Urn, UrnBuildError> {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| UrnBuildError::MissingParam { param: name.clone() })?;
                    out.push_str(&escape_value(value));
                }
            }
        }
        Ok(Urn::new(out))
    }

    /// Parse a URN back into its parameters.
    ///
    /// Returns `None` when the template is not reversible or the URN does
    /// not match it. `parse(build(p)) == p` holds for reversible templates.
    pub fn parse(&self, urn: &str) -> Option<ParamMap> {
        if !self.reversible {
            return None;
        }
        let mut params = ParamMap::new();
        let mut rest = urn;
        let mut iter = self.segments.iter().peekable();
        while let Some(segment) = iter.next() {
            match segment {
                Segment::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_str())?;
                }
                Segment::Param(name) => {
                    let captured = match iter.peek() {
                        Some(Segment::Literal(next)) => {
                            let at = rest.find(next.as_str())?;
                            let (value, tail) = rest.split_at(at);
                            rest = tail;
                            value
                        }
                        // Reversibility guarantees a param is either
                        // followed by a literal or ends the template.
                        Some(Segment::Param(_)) => return None,
                        None => {
                            let value = rest;
                            rest = "";
                            value
                        }
                    };
                    params.insert(name.clone(), unescape_value(captured));
                }
            }
        }
        if rest.is_empty() {
            Some(params)
        } else {
            None
        }
    }
}

fn stray_brace(template: &str) -> Option<usize> {
    // Any brace not consumed by a well-formed placeholder is an error.
    let mut stripped = String::from(template);
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).expect("capture 0").as_str();
        stripped = stripped.replacen(whole, "", 1);
    }
    stripped.find(['{', '}'])
}

fn is_reversible(segments: &[Segment]) -> bool {
    let mut iter = segments.iter().peekable();
    while let Some(segment) = iter.next() {
        if matches!(segment, Segment::Param(_)) {
            match iter.peek() {
                Some(Segment::Literal(lit)) => {
                    if !contains_reserved(lit) {
                        return false;
                    }
                }
                Some(Segment::Param(_)) => return false,
                None => {}
            }
        }
    }
    true
}
