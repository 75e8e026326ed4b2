//! LDAP-style environment filters such as `(&(os=linux)(|(arch=x86)(arch=x86_64)))`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use provis_version::Version;

use super::environment::Environment;
use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Equal(String, String),
    Approx(String, String),
    GreaterEq(String, String),
    LessEq(String, String),
    Present(String),
    Substring(String, Regex),
}

impl Node {
    fn matches(&self, env: &Environment) -> bool {
        match self {
            Node::And(children) => children.iter().all(|c| c.matches(env)),
            Node::Or(children) => children.iter().any(|c| c.matches(env)),
            Node::Not(child) => !child.matches(env),
            Node::Present(key) => env.get(key).is_some(),
            Node::Equal(key, expected) => env.get(key) == Some(expected.as_str()),
            Node::Approx(key, expected) => env
                .get(key)
                .map(|actual| normalize_approx(actual) == normalize_approx(expected))
                .unwrap_or(false),
            Node::GreaterEq(key, expected) => env
                .get(key)
                .map(|actual| compare_values(actual, expected) != Ordering::Less)
                .unwrap_or(false),
            Node::LessEq(key, expected) => env
                .get(key)
                .map(|actual| compare_values(actual, expected) != Ordering::Greater)
                .unwrap_or(false),
            Node::Substring(key, pattern) => env.get(key).map(|actual| pattern.is_match(actual)).unwrap_or(false),
        }
    }
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Versions compare as versions, everything else as plain strings
fn compare_values(actual: &str, expected: &str) -> Ordering {
    match (Version::parse(actual), Version::parse(expected)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.cmp(expected),
    }
}

/// A parsed environment filter.
///
/// Two filters are equal when their source text is equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filter {
    text: String,
    root: Node,
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim().to_string();
        let mut parser = Parser {
            input: &text,
            chars: text.chars().collect(),
            pos: 0,
            depth: 0,
        };
        let root = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(Self { text, root })
    }

    /// Evaluate this filter against an environment
    pub fn matches(&self, env: &Environment) -> bool {
        self.root.matches(env)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// True when `filter` is absent or matches `env`
pub fn is_applicable(filter: Option<&Filter>, env: &Environment) -> bool {
    filter.map(|f| f.matches(env)).unwrap_or(true)
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Filter {}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Filter {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Filter {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.text
    }
}

/// Deepest nesting of `(...)` accepted; matching and dropping a filter
/// recurse over the same depth
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> ProvisionError {
        ProvisionError::InvalidFilter {
            filter: self.input.to_string(),
            reason: format!("{} at position {}", reason, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.next() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_filter(&mut self) -> Result<Node> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(&format!("nesting deeper than {} levels", MAX_DEPTH)));
        }
        self.depth += 1;
        let node = self.parse_group();
        self.depth -= 1;
        node
    }

    fn parse_group(&mut self) -> Result<Node> {
        self.skip_whitespace();
        self.expect('(')?;
        self.skip_whitespace();
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Node::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Node::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Node::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(node)
    }

    fn parse_list(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                break;
            }
            nodes.push(self.parse_filter()?);
        }
        if nodes.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(nodes)
    }

    fn parse_item(&mut self) -> Result<Node> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.next() {
            Some('=') => '=',
            Some(c @ ('~' | '<' | '>')) => {
                self.expect('=')?;
                c
            }
            _ => return Err(self.error("expected an operator")),
        };

        // Unescaped '*' splits the value into substring parts
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.next().ok_or_else(|| self.error("dangling escape"))?;
                    if let Some(last) = parts.last_mut() {
                        last.push(escaped);
                    }
                }
                Some('*') if op == '=' => {
                    self.pos += 1;
                    parts.push(String::new());
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                }
            }
        }

        let node = match op {
            '~' => Node::Approx(key, parts.concat()),
            '>' => Node::GreaterEq(key, parts.concat()),
            '<' => Node::LessEq(key, parts.concat()),
            _ if parts.len() == 1 => Node::Equal(key, parts.concat()),
            _ if parts.len() == 2 && parts.iter().all(String::is_empty) => Node::Present(key),
            _ => {
                let escaped: Vec<String> = parts.iter().map(|p| regex::escape(p)).collect();
                let pattern = Regex::new(&format!("^(?s){}$", escaped.join(".*")))
                    .map_err(|e| self.error(&e.to_string()))?;
                Node::Substring(key, pattern)
            }
        };
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(input: &str) -> Environment {
        Environment::parse(input).unwrap()
    }

    #[test]
    fn test_simple_equality() {
        let filter = Filter::parse("(os=linux)").unwrap();
        assert!(filter.matches(&env("os=linux")));
        assert!(!filter.matches(&env("os=win32")));
        assert!(!filter.matches(&env("")));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let filter = Filter::parse("(OS=linux)").unwrap();
        assert!(filter.matches(&env("os=linux")));
    }

    #[test]
    fn test_composite() {
        let filter = Filter::parse("(&(os=linux)(|(arch=x86)(arch=x86_64)))").unwrap();
        assert!(filter.matches(&env("os=linux,arch=x86_64")));
        assert!(!filter.matches(&env("os=linux,arch=ppc")));
        assert!(!filter.matches(&env("os=macosx,arch=x86")));

        let filter = Filter::parse("(!(os=win32))").unwrap();
        assert!(filter.matches(&env("os=linux")));
        assert!(filter.matches(&env("")));
    }

    #[test]
    fn test_presence_and_substring() {
        assert!(Filter::parse("(ws=*)").unwrap().matches(&env("ws=gtk")));
        assert!(!Filter::parse("(ws=*)").unwrap().matches(&env("os=linux")));

        let filter = Filter::parse("(arch=x86*)").unwrap();
        assert!(filter.matches(&env("arch=x86_64")));
        assert!(filter.matches(&env("arch=x86")));
        assert!(!filter.matches(&env("arch=ppc64")));

        let filter = Filter::parse("(name=a\\*b)").unwrap();
        assert!(filter.matches(&env("name=a*b")));
        assert!(!filter.matches(&env("name=axxb")));
    }

    #[test]
    fn test_ordering_operators() {
        let filter = Filter::parse("(java>=1.8)").unwrap();
        assert!(filter.matches(&env("java=11")));
        assert!(filter.matches(&env("java=1.8.0")));
        assert!(!filter.matches(&env("java=1.7")));

        let filter = Filter::parse("(level<=b)").unwrap();
        assert!(filter.matches(&env("level=a")));
        assert!(!filter.matches(&env("level=c")));

        let filter = Filter::parse("(ws~=G T K)").unwrap();
        assert!(filter.matches(&env("ws=gtk")));
    }

    #[test]
    fn test_invalid_filters() {
        for input in ["os=linux", "(os=linux", "(&)", "(=linux)", "(os linux)", "(os=linux))"] {
            let err = Filter::parse(input).unwrap_err();
            assert!(matches!(err, ProvisionError::InvalidFilter { .. }), "{}", input);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let filter: Filter = serde_json::from_str("\"(os=linux)\"").unwrap();
        assert_eq!(filter.as_str(), "(os=linux)");
        assert!(serde_json::from_str::<Filter>("\"(os=linux\"").is_err());
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let nested = |depth: usize| format!("{}(os=linux){}", "(!".repeat(depth), ")".repeat(depth));

        // an even number of negations cancels out
        let filter = Filter::parse(&nested(MAX_DEPTH - 2)).unwrap();
        assert!(filter.matches(&env("os=linux")));

        let err = Filter::parse(&nested(100_000)).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidFilter { ref reason, .. } if reason.contains("nesting")));

        let wide_and_deep = format!("(&{})", nested(MAX_DEPTH));
        assert!(Filter::parse(&wide_and_deep).is_err());
    }
}
