use regex::Regex;

use super::query::Term;
use crate::error::Result;

#[derive(Debug, Clone)]
enum Matcher {
    Prefix,
    Expression(Regex),
}

/// A compiled prefix or wildcard pattern over one field's dictionary.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    field: String,
    source: String,
    literal_prefix: String,
    matcher: Matcher,
}

impl CompiledPattern {
    /// Match every term starting with `term.text`.
    pub fn prefix(term: &Term) -> Self {
        Self {
            field: term.field.clone(),
            source: format!("{}*", term.text),
            literal_prefix: term.text.clone(),
            matcher: Matcher::Prefix,
        }
    }

    /// Compile a wildcard pattern: `*` matches any run of chars, `?` exactly
    /// one char and `\` escapes the next char.
    pub fn wildcard(term: &Term) -> Result<Self> {
        let mut expression = String::from("^(?s:");
        let mut literal_prefix = String::new();
        let mut in_prefix = true;
        let mut chars = term.text.chars();

        while let Some(c) = chars.next() {
            let literal = match c {
                '*' => {
                    expression.push_str(".*");
                    None
                }
                '?' => {
                    expression.push('.');
                    None
                }
                '\\' => Some(chars.next().unwrap_or('\\')),
                other => Some(other),
            };
            match literal {
                Some(ch) => {
                    let mut buf = [0u8; 4];
                    let escaped = regex::escape(ch.encode_utf8(&mut buf));
                    expression.push_str(&escaped);
                    if in_prefix {
                        literal_prefix.push(ch);
                    }
                }
                None => in_prefix = false,
            }
        }
        expression.push_str(")$");

        Ok(Self {
            field: term.field.clone(),
            source: term.text.clone(),
            literal_prefix,
            matcher: Matcher::Expression(Regex::new(&expression)?),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Every accepted term starts with this string.
    pub fn literal_prefix(&self) -> &str {
        &self.literal_prefix
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Prefix => text.starts_with(&self.literal_prefix),
            Matcher::Expression(re) => re.is_match(text),
        }
    }
}

impl std::fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, self.source)
    }
}
