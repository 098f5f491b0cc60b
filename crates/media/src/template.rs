//! Expands pipeline templates into descriptions `gst::parse::launch` accepts.
//!
//! A template is a launch line split over several lines, with `#` comments
//! running to the end of the line and `{{Role}}` placeholders standing for the
//! element names of the [`Role`]s the controller looks up after parsing:
//!
//! ```text
//! videotestsrc name={{Input}} !   # test pattern
//! jpegenc name={{FrameEncoder}} !
//! appsink name={{AppOutput}}
//! ```
//!
//! Text inside double-quoted values is copied verbatim: neither `#` nor
//! `{{...}}` is interpreted there.

use crate::error::RenderError;
use crate::roles::{Role, RoleNames};

/// A template plus the named parameters (`{{location}}`, ...) bound to it.
#[derive(Debug, Clone, Default)]
pub struct GraphTemplate {
    text: String,
    params: Vec<(String, String)>,
}

impl GraphTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Binds `{{name}}` to `value`. Values are inserted after comments are
    /// stripped, so a `#` inside a value is kept.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn render(&self, roles: &RoleNames) -> Result<String, RenderError> {
        let stripped = strip_comments(&self.text);
        substitute(&stripped, |key| {
            if let Some(role) = Role::from_key(key) {
                return roles
                    .get(role)
                    .map(str::to_owned)
                    .ok_or(RenderError::UnmappedRole(role));
            }
            self.params
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| RenderError::UnknownPlaceholder(key.to_string()))
        })
    }
}

/// Renders a template that carries no parameters.
pub fn render(template: &str, roles: &RoleNames) -> Result<String, RenderError> {
    GraphTemplate::new(template).render(roles)
}

/// Drops `#` comments and leading indentation, and skips lines left empty.
/// A `#` inside a double-quoted value is kept.
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| match comment_start(line) {
            Some(idx) => &line[..idx],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn comment_start(line: &str) -> Option<usize> {
    let mut quotes = Quotes::default();
    line.bytes().position(|b| quotes.outside(b) && b == b'#')
}

/// Tracks double-quoted launch values, with `\` escapes, one byte at a time.
#[derive(Default)]
struct Quotes {
    quoted: bool,
    escaped: bool,
}

impl Quotes {
    /// Feeds `b` and tells whether it lies outside any quoted value. The
    /// quotes themselves count as inside.
    fn outside(&mut self, b: u8) -> bool {
        if self.quoted {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.quoted = false;
            }
            return false;
        }
        if b == b'"' {
            self.quoted = true;
            return false;
        }
        true
    }
}

/// Placeholders inside double-quoted values are left alone, so rendered
/// output (whose parameters are quoted) renders to itself.
fn substitute<F>(text: &str, mut resolve: F) -> Result<String, RenderError>
where
    F: FnMut(&str) -> Result<String, RenderError>,
{
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut quotes = Quotes::default();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if !quotes.outside(bytes[i]) || !bytes[i..].starts_with(b"{{") {
            i += 1;
            continue;
        }
        out.push_str(&text[copied..i]);
        let after = &text[i + 2..];
        let Some(end) = after.find("}}") else {
            return Err(RenderError::Unterminated(i));
        };
        let key = after[..end].trim();
        let key = key.strip_prefix('.').unwrap_or(key).trim();
        out.push_str(&resolve(key)?);

        i += 2 + end + 2;
        copied = i;
    }
    out.push_str(&text[copied..]);
    Ok(out)
}

/// Quotes a value for the launch syntax (`location="..."`).
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
