/// Wire encoding of directive lists: `;`-joined tokens in one bounded string
use crate::config::types::{MountError, Result};
use crate::directive::parser::{parse, Bucket, Directive};
use serde::Serialize;

/// Token separator inside the transported string.
pub const SEPARATOR: char = ';';

/// Ordered directive list as carried between capture and node contexts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectiveList {
    entries: Vec<Directive>,
}

impl DirectiveList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.entries.iter()
    }

    pub fn contains(&self, directive: &Directive) -> bool {
        self.entries.contains(directive)
    }

    /// Append without any checks; callers run the conflict detector first.
    pub(crate) fn push(&mut self, directive: Directive) {
        self.entries.push(directive);
    }
}

impl From<Vec<Directive>> for DirectiveList {
    fn from(entries: Vec<Directive>) -> Self {
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a DirectiveList {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// An implicit-bucket token with flags only parses back if the path has a
/// slash before the flag colon.
fn check_encodable(directive: &Directive) -> Result<()> {
    if directive.bucket() == &Bucket::Implicit
        && directive.flags().is_some()
        && !directive.mount_path().contains('/')
    {
        return Err(MountError::Config(format!(
            "Directive '{}' would be read back as a bucket name; use an explicit path",
            directive
        )));
    }
    Ok(())
}

/// Serialize a list without transport checks. Anything that leaves the
/// process goes through `encode_bounded`.
pub fn encode(list: &DirectiveList) -> String {
    list.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// Serialize a list for a transport whose reader uses a `capacity`-byte
/// buffer including the terminating NUL.
pub fn encode_bounded(list: &DirectiveList, capacity: usize) -> Result<String> {
    for directive in list {
        check_encodable(directive)?;
    }

    let encoded = encode(list);
    if encoded.len() + 1 > capacity {
        return Err(MountError::Config(format!(
            "Encoded mount list is {} bytes, transport holds at most {}",
            encoded.len(),
            capacity.saturating_sub(1)
        )));
    }
    Ok(encoded)
}

/// Parse a whole transported string. The first malformed token fails the call.
pub fn decode(encoded: &str) -> Result<DirectiveList> {
    let mut entries = Vec::new();
    for token in tokens(encoded) {
        entries.push(parse(token)?);
    }
    Ok(DirectiveList::from(entries))
}

/// Parse what can be parsed; malformed tokens come back as errors alongside.
pub fn decode_lenient(encoded: &str) -> (DirectiveList, Vec<MountError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    for token in tokens(encoded) {
        match parse(token) {
            Ok(directive) => entries.push(directive),
            Err(e) => errors.push(e),
        }
    }
    (DirectiveList::from(entries), errors)
}

fn tokens(encoded: &str) -> impl Iterator<Item = &str> {
    encoded.split(SEPARATOR).filter(|t| !t.is_empty())
}
