/// Mount directive grammar: `[bucket]:path[:flags]` or `path[:flags]`
use crate::config::types::{MountError, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Which part of the object store a directive exposes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", content = "name", rename_all = "snake_case")]
pub enum Bucket {
    /// Bare path form, no bucket field at all
    Implicit,
    /// Explicit empty bucket field (`:/path`)
    All,
    Named(String),
}

impl Bucket {
    /// Conflict comparison key; both all-bucket forms collapse to "".
    pub fn normalized(&self) -> &str {
        match self {
            Self::Implicit | Self::All => "",
            Self::Named(name) => name,
        }
    }

    /// Positional argument handed to the mount helper, if any.
    pub fn helper_arg(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Implicit | Self::All => None,
        }
    }

    fn validate(name: &str) -> std::result::Result<(), String> {
        if name.is_empty() {
            return Err("bucket name is empty".to_string());
        }
        if let Some(c) = name.chars().find(|c| matches!(c, ':' | ';' | '/')) {
            return Err(format!("bucket name contains '{}'", c));
        }
        Ok(())
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implicit | Self::All => f.write_str("<all buckets>"),
            Self::Named(name) => write!(f, "'{}'", name),
        }
    }
}

/// One requested mount. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Directive {
    bucket: Bucket,
    mount_path: String,
    flags: Option<String>,
}

impl Directive {
    /// Build a directive, enforcing the field rules the wire format relies on.
    pub fn new(bucket: Bucket, mount_path: impl Into<String>, flags: Option<String>) -> Result<Self> {
        let mount_path = mount_path.into();
        let flags = flags.filter(|f| !f.is_empty());

        if let Bucket::Named(name) = &bucket {
            Bucket::validate(name).map_err(|reason| MountError::parse(name, reason))?;
        }
        if mount_path.is_empty() {
            return Err(MountError::parse(&mount_path, "mount path is empty"));
        }
        if mount_path.contains(':') || mount_path.contains(';') {
            return Err(MountError::parse(
                &mount_path,
                "mount path must not contain ':' or ';'",
            ));
        }
        if let Some(flags) = &flags {
            if flags.contains(';') {
                return Err(MountError::parse(flags, "flags must not contain ';'"));
            }
        }

        Ok(Self {
            bucket,
            mount_path,
            flags,
        })
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.mount_path)
    }

    pub fn flags(&self) -> Option<&str> {
        self.flags.as_deref()
    }

    /// User flags as helper arguments. Splits on whitespace only; a value
    /// containing a space cannot be expressed.
    pub fn flag_args(&self) -> impl Iterator<Item = &str> {
        self.flags.as_deref().unwrap_or("").split_whitespace()
    }

    pub fn is_absolute(&self) -> bool {
        self.mount_path.starts_with('/')
    }

    /// Same directive at a different path; used by path resolution.
    pub(crate) fn with_mount_path(&self, mount_path: String) -> Result<Self> {
        Self::new(self.bucket.clone(), mount_path, self.flags.clone())
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bucket {
            Bucket::Implicit => {}
            Bucket::All => f.write_str(":")?,
            Bucket::Named(name) => write!(f, "{}:", name)?,
        }
        f.write_str(&self.mount_path)?;
        if let Some(flags) = &self.flags {
            write!(f, ":{}", flags)?;
        }
        Ok(())
    }
}

/// Parse one token.
pub fn parse(token: &str) -> Result<Directive> {
    let Some((head, rest)) = token.split_once(':') else {
        if token.is_empty() {
            return Err(MountError::parse(token, "empty mount specification"));
        }
        return Directive::new(Bucket::Implicit, token, None);
    };

    // A slash before the first colon means the token starts with a path.
    if head.contains('/') {
        let flags = (!rest.is_empty()).then(|| rest.to_string());
        return Directive::new(Bucket::Implicit, head, flags);
    }

    let bucket = if head.is_empty() {
        Bucket::All
    } else {
        Bucket::Named(head.to_string())
    };

    let (mount_path, flags) = match rest.split_once(':') {
        Some((path, flags)) => (path, Some(flags.to_string())),
        None => (rest, None),
    };
    if mount_path.is_empty() {
        return Err(MountError::parse(token, "no mount path after bucket field"));
    }

    Directive::new(bucket, mount_path, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_and_path() {
        let d = parse("mybucket:/mnt/gcs").unwrap();
        assert_eq!(d.bucket(), &Bucket::Named("mybucket".to_string()));
        assert_eq!(d.mount_path(), "/mnt/gcs");
        assert_eq!(d.flags(), None);
    }

    #[test]
    fn bucket_path_and_flags() {
        let d = parse("mybucket:/mnt/gcs:--implicit-dirs").unwrap();
        assert_eq!(d.bucket(), &Bucket::Named("mybucket".to_string()));
        assert_eq!(d.mount_path(), "/mnt/gcs");
        assert_eq!(d.flags(), Some("--implicit-dirs"));
    }

    #[test]
    fn explicit_all_buckets() {
        let d = parse(":/mnt/gcs").unwrap();
        assert_eq!(d.bucket(), &Bucket::All);
        assert_eq!(d.mount_path(), "/mnt/gcs");
    }

    #[test]
    fn bare_path_is_implicit_all_buckets() {
        let d = parse("/mnt/gcs").unwrap();
        assert_eq!(d.bucket(), &Bucket::Implicit);
        assert_eq!(d.mount_path(), "/mnt/gcs");
        assert_eq!(d.flags(), None);
    }

    #[test]
    fn bare_path_with_flags() {
        let d = parse("/mnt/gcs:--some-flag").unwrap();
        assert_eq!(d.bucket(), &Bucket::Implicit);
        assert_eq!(d.mount_path(), "/mnt/gcs");
        assert_eq!(d.flags(), Some("--some-flag"));
    }

    #[test]
    fn flags_keep_further_colons() {
        let d = parse("b:/mnt/x:--opt=a:b --other").unwrap();
        assert_eq!(d.flags(), Some("--opt=a:b --other"));

        let d = parse("/mnt/x:-o:ro").unwrap();
        assert_eq!(d.bucket(), &Bucket::Implicit);
        assert_eq!(d.flags(), Some("-o:ro"));
    }

    #[test]
    fn relative_paths_parse_unchanged() {
        let d = parse("bucket:./rel/path").unwrap();
        assert_eq!(d.mount_path(), "./rel/path");
        assert!(!d.is_absolute());

        let d = parse("data").unwrap();
        assert_eq!(d.bucket(), &Bucket::Implicit);
        assert_eq!(d.mount_path(), "data");
    }

    #[test]
    fn empty_trailing_flags_are_absent() {
        let d = parse("/mnt/gcs:").unwrap();
        assert_eq!(d.flags(), None);
    }

    #[test]
    fn missing_mount_path_rejected() {
        for token in ["", ":", "bucket:", "bucket::--flag", "::"] {
            assert!(
                matches!(parse(token), Err(MountError::Parse { .. })),
                "token {:?} should not parse",
                token
            );
        }
    }

    #[test]
    fn flag_args_split_on_whitespace() {
        let d = parse("b:/m:--implicit-dirs  --only-dir  sub").unwrap();
        let args: Vec<&str> = d.flag_args().collect();
        assert_eq!(args, vec!["--implicit-dirs", "--only-dir", "sub"]);

        let d = parse("b:/m").unwrap();
        assert_eq!(d.flag_args().count(), 0);
    }

    #[test]
    fn display_reproduces_token() {
        for token in ["b:/p", "b:/p:--f", ":/p", "/p", "/p:--f"] {
            assert_eq!(parse(token).unwrap().to_string(), token);
        }
    }

    #[test]
    fn constructor_rejects_bad_fields() {
        assert!(Directive::new(Bucket::Named(String::new()), "/m", None).is_err());
        assert!(Directive::new(Bucket::Named("a/b".to_string()), "/m", None).is_err());
        assert!(Directive::new(Bucket::All, "/m;x", None).is_err());
        assert!(Directive::new(Bucket::All, "/m", Some("a;b".to_string())).is_err());
    }

    #[test]
    fn bucket_normalization() {
        assert_eq!(Bucket::Implicit.normalized(), Bucket::All.normalized());
        assert_eq!(Bucket::Named("x".to_string()).normalized(), "x");
        assert_eq!(Bucket::All.helper_arg(), None);
        assert_eq!(Bucket::Named("x".to_string()).helper_arg(), Some("x"));
    }
}
