use crate::error::AppError;
use crate::template::Template;
use glob::{MatchOptions, Pattern};
use once_cell::sync::Lazy;

/// Reserved template-map key naming the configured default template.
pub const DEFAULT_TEMPLATE_KEY: &str = "*";

/// Used when neither a model pattern nor a configured default applies:
/// keep the original file name, change nothing.
static FALLBACK_TEMPLATE: Lazy<Template> =
    Lazy::new(|| Template::compile("{filename}").expect("failed to compile fallback template"));

static MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct ModelPattern {
    source: String,
    pattern: Pattern,
    template: Template,
}

/// Chooses which compiled template applies to a file, in order: the
/// session-wide override if one is active, then the first model pattern
/// that matches the file's camera model, then the configured default
/// (`*` key), then the built-in keep-the-name fallback.
///
/// Patterns are tried longest-first (ties lexicographic) so the match is
/// deterministic when several wildcards cover one model.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    override_template: Option<Template>,
    patterns: Vec<ModelPattern>,
    default_template: Option<Template>,
}

impl TemplateResolver {
    /// Builds a resolver from `(pattern, template)` pairs, typically the
    /// parsed `templates` section of the host configuration. Pattern
    /// strings use glob-style wildcards and match case-insensitively;
    /// the reserved `*` key supplies the default template instead.
    pub fn new(entries: impl IntoIterator<Item = (String, Template)>) -> Result<Self, AppError> {
        let mut patterns = Vec::new();
        let mut default_template = None;

        for (key, template) in entries {
            let key = key.trim().to_lowercase();
            if key == DEFAULT_TEMPLATE_KEY {
                default_template = Some(template);
                continue;
            }
            let pattern = Pattern::new(&key).map_err(|e| {
                AppError::InvalidRequest(format!("bad model pattern `{}`: {}", key, e))
            })?;
            patterns.push(ModelPattern {
                source: key,
                pattern,
                template,
            });
        }

        patterns.sort_by(|a, b| {
            b.source
                .len()
                .cmp(&a.source.len())
                .then_with(|| a.source.cmp(&b.source))
        });

        Ok(Self {
            override_template: None,
            patterns,
            default_template,
        })
    }

    /// Activates a template used unconditionally for the whole session.
    pub fn set_override(&mut self, template: Option<Template>) {
        self.override_template = template;
    }

    pub fn resolve(&self, model: &str) -> &Template {
        if let Some(template) = &self.override_template {
            return template;
        }
        if !model.is_empty() {
            let model = model.to_lowercase();
            for entry in &self.patterns {
                if entry.pattern.matches_with(&model, MATCH_OPTIONS) {
                    return &entry.template;
                }
            }
        }
        self.default_template.as_ref().unwrap_or(&FALLBACK_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{FieldKind, TemplateNode};

    fn tpl(input: &str) -> Template {
        Template::compile(input).unwrap()
    }

    #[test]
    fn override_wins_over_everything() {
        let mut resolver = TemplateResolver::new(vec![
            ("*".to_string(), tpl("{year}")),
            ("nikon*".to_string(), tpl("{month}")),
        ])
        .unwrap();
        resolver.set_override(Some(tpl("{day}")));
        assert_eq!(
            resolver.resolve("NIKON D3100").nodes(),
            &[TemplateNode::Field(FieldKind::Day)]
        );
    }

    #[test]
    fn pattern_match_is_case_insensitive() {
        let resolver =
            TemplateResolver::new(vec![("nikon*".to_string(), tpl("{year}"))]).unwrap();
        assert_eq!(
            resolver.resolve("NIKON D3100").nodes(),
            &[TemplateNode::Field(FieldKind::Year)]
        );
    }

    #[test]
    fn longest_pattern_wins() {
        let resolver = TemplateResolver::new(vec![
            ("nikon*".to_string(), tpl("{year}")),
            ("nikon d3*".to_string(), tpl("{month}")),
        ])
        .unwrap();
        assert_eq!(
            resolver.resolve("NIKON D3100").nodes(),
            &[TemplateNode::Field(FieldKind::Month)]
        );
    }

    #[test]
    fn default_key_applies_when_nothing_matches() {
        let resolver = TemplateResolver::new(vec![
            ("*".to_string(), tpl("{year}")),
            ("canon*".to_string(), tpl("{month}")),
        ])
        .unwrap();
        assert_eq!(
            resolver.resolve("NIKON D3100").nodes(),
            &[TemplateNode::Field(FieldKind::Year)]
        );
        assert_eq!(
            resolver.resolve("").nodes(),
            &[TemplateNode::Field(FieldKind::Year)]
        );
    }

    #[test]
    fn built_in_fallback_keeps_original_name() {
        let resolver = TemplateResolver::new(Vec::new()).unwrap();
        assert_eq!(
            resolver.resolve("whatever").nodes(),
            &[TemplateNode::Field(FieldKind::OriginalName)]
        );
    }
}
