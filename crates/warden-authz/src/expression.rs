//! Scope expression matcher.
//!
//! A route declares its requirement as a list of tokens:
//!
//! | Token          | Bucket    | Passes when                         |
//! |----------------|-----------|-------------------------------------|
//! | `+name`        | required  | scope contains every required token |
//! | `name`         | selection | scope contains at least one         |
//! | `!name`        | forbidden | scope contains none                 |
//!
//! Tokens may embed placeholders such as `user-{params.id}`, resolved
//! against a [`RequestContext`] at evaluation time. The source of a
//! placeholder is one of `params`, `query`, `payload` (alias `body`) or
//! `credentials`; the remaining segments are a dotted path.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::algebra::EffectiveScope;
use crate::error::AuthzError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Required,
    Selection,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    Params,
    Query,
    Payload,
    Credentials,
}

impl ContextSource {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "params" => Some(ContextSource::Params),
            "query" => Some(ContextSource::Query),
            "payload" | "body" => Some(ContextSource::Payload),
            "credentials" => Some(ContextSource::Credentials),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ContextSource::Params => "params",
            ContextSource::Query => "query",
            ContextSource::Payload => "payload",
            ContextSource::Credentials => "credentials",
        }
    }
}

/// A typed reference into the request context, e.g. `params.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPath {
    pub source: ContextSource,
    pub path: Vec<String>,
}

impl ContextPath {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut parts = raw.split('.');
        let source = parts
            .next()
            .and_then(ContextSource::parse)
            .ok_or_else(|| format!("unknown placeholder source in {{{raw}}}"))?;
        let path: Vec<String> = parts.map(str::to_string).collect();
        if path.is_empty() || path.iter().any(String::is_empty) {
            return Err(format!("malformed placeholder path {{{raw}}}"));
        }
        Ok(Self { source, path })
    }

    /// Look the path up and render it as a scalar string.
    pub fn resolve(&self, ctx: &RequestContext) -> Result<String, AuthzError> {
        let resolved = match self.source {
            ContextSource::Params => lookup_flat(&ctx.params, &self.path),
            ContextSource::Query => lookup_flat(&ctx.query, &self.path),
            ContextSource::Payload => walk(&ctx.payload, &self.path).and_then(scalar),
            ContextSource::Credentials => walk(&ctx.credentials, &self.path).and_then(scalar),
        };
        resolved.ok_or_else(|| AuthzError::UnresolvedPlaceholder {
            path: self.to_string(),
        })
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source.as_str(), self.path.join("."))
    }
}

fn lookup_flat(map: &BTreeMap<String, String>, path: &[String]) -> Option<String> {
    match path {
        [key] => map.get(key).cloned(),
        _ => None,
    }
}

fn walk<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, segment| match v {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Per-request data placeholders are resolved against.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub payload: Value,
    pub credentials: Value,
}

impl RequestContext {
    pub fn new(credentials: Value) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(ContextPath),
}

/// A scope token body split into literal text and placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeTemplate {
    segments: Vec<Segment>,
}

impl ScopeTemplate {
    pub fn parse(raw: &str) -> Result<Self, AuthzError> {
        let invalid = |reason: String| AuthzError::InvalidTemplate {
            token: raw.into(),
            reason,
        };

        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unmatched '}'".into()));
            }
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find(['{', '}'])
                .filter(|i| after[*i..].starts_with('}'))
                .ok_or_else(|| invalid("unclosed '{'".into()))?;
            let inner = &after[..close];
            if inner.is_empty() {
                return Err(invalid("empty placeholder".into()));
            }
            segments.push(Segment::Placeholder(ContextPath::parse(inner).map_err(invalid)?));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn is_templated(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Produce the concrete token. Literal-only templates borrow.
    pub fn render(&self, ctx: Option<&RequestContext>) -> Result<Cow<'_, str>, AuthzError> {
        if let [Segment::Literal(s)] = self.segments.as_slice() {
            return Ok(Cow::Borrowed(s));
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(path) => {
                    let ctx = ctx.ok_or_else(|| AuthzError::UnresolvedPlaceholder {
                        path: path.to_string(),
                    })?;
                    out.push_str(&path.resolve(ctx)?);
                }
            }
        }
        Ok(Cow::Owned(out))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeToken {
    pub kind: TokenKind,
    pub template: ScopeTemplate,
}

impl ScopeToken {
    pub fn parse(raw: &str) -> Result<Self, AuthzError> {
        let (kind, body) = if let Some(body) = raw.strip_prefix('+') {
            (TokenKind::Required, body)
        } else if let Some(body) = raw.strip_prefix('!') {
            (TokenKind::Forbidden, body)
        } else {
            (TokenKind::Selection, raw)
        };
        if body.is_empty() {
            return Err(AuthzError::InvalidTemplate {
                token: raw.into(),
                reason: "empty scope name".into(),
            });
        }
        Ok(Self {
            kind,
            template: ScopeTemplate::parse(body)?,
        })
    }
}

/// A route's declared scope requirement. Static per endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeRequirement {
    tokens: Vec<ScopeToken>,
}

impl ScopeRequirement {
    pub fn parse<I>(tokens: I) -> Result<Self, AuthzError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| ScopeToken::parse(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[ScopeToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_templated(&self) -> bool {
        self.tokens.iter().any(|t| t.template.is_templated())
    }

    /// Match `scope` against this requirement.
    ///
    /// An empty scope facing a non-empty requirement is denied before
    /// any placeholder is resolved. The returned denial never names the
    /// failing token.
    pub fn evaluate(
        &self,
        scope: &EffectiveScope,
        ctx: Option<&RequestContext>,
    ) -> Result<(), AuthzError> {
        if self.tokens.is_empty() {
            return Ok(());
        }
        if scope.is_empty() {
            debug!("empty scope against non-empty requirement");
            return Err(AuthzError::InsufficientScope);
        }

        let mut required = Vec::new();
        let mut selection = Vec::new();
        let mut forbidden = Vec::new();
        for token in &self.tokens {
            let value = token.template.render(ctx)?;
            match token.kind {
                TokenKind::Required => required.push(value),
                TokenKind::Selection => selection.push(value),
                TokenKind::Forbidden => forbidden.push(value),
            }
        }

        let required_ok = scope.contains_all(required.iter().map(|t| &**t));
        let selection_ok =
            selection.is_empty() || scope.contains_any(selection.iter().map(|t| &**t));
        let forbidden_ok = !scope.contains_any(forbidden.iter().map(|t| &**t));

        if required_ok && selection_ok && forbidden_ok {
            Ok(())
        } else {
            debug!(
                required_ok,
                selection_ok, forbidden_ok, "scope requirement not met"
            );
            Err(AuthzError::InsufficientScope)
        }
    }
}
