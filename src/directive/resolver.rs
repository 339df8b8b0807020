/// Capture-time path resolution against the submitting command's cwd
use crate::config::types::{MountError, Result};
use crate::directive::codec::DirectiveList;
use crate::directive::parser::Directive;
use std::path::Path;

/// Make a directive's mount path absolute. Absolute input is returned as-is,
/// so applying this twice is harmless.
pub fn resolve(directive: &Directive, base: &Path) -> Result<Directive> {
    if directive.is_absolute() {
        return Ok(directive.clone());
    }

    let base = base.to_str().ok_or_else(|| {
        MountError::Config(format!("Base directory {} is not UTF-8", base.display()))
    })?;
    if !base.starts_with('/') {
        return Err(MountError::Config(format!(
            "Base directory {} is not absolute",
            base
        )));
    }

    let relative = directive
        .mount_path()
        .strip_prefix("./")
        .unwrap_or(directive.mount_path());
    let joined = format!("{}/{}", base.trim_end_matches('/'), relative);

    directive.with_mount_path(joined)
}

/// Resolve every entry of a list, keeping order.
pub fn resolve_all(list: &DirectiveList, base: &Path) -> Result<DirectiveList> {
    let mut resolved = Vec::with_capacity(list.len());
    for directive in list.iter() {
        resolved.push(resolve(directive, base)?);
    }
    Ok(DirectiveList::from(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::codec::{decode, encode};
    use crate::directive::parser::parse;

    const CWD: &str = "/home/user/project";

    fn resolve_str(raw: &str, cwd: &str) -> String {
        let list = decode(raw).unwrap();
        encode(&resolve_all(&list, Path::new(cwd)).unwrap())
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(resolve_str("bucket:/abs/path", CWD), "bucket:/abs/path");
    }

    #[test]
    fn dot_slash_relative_path() {
        assert_eq!(
            resolve_str("bucket:./rel/path", CWD),
            "bucket:/home/user/project/rel/path"
        );
    }

    #[test]
    fn mixed_list() {
        assert_eq!(
            resolve_str("b1:./p1;b2:/p2", CWD),
            "b1:/home/user/project/p1;b2:/p2"
        );
    }

    #[test]
    fn flags_survive_resolution() {
        assert_eq!(
            resolve_str("bucket:./path:--flag", CWD),
            "bucket:/home/user/project/path:--flag"
        );
    }

    #[test]
    fn implicit_all_buckets_relative() {
        assert_eq!(resolve_str("./mnt/gcs", CWD), "/home/user/project/mnt/gcs");
        assert_eq!(resolve_str("mnt", CWD), "/home/user/project/mnt");
    }

    #[test]
    fn trailing_slash_on_base_not_doubled() {
        assert_eq!(resolve_str("b:./x", "/home/user/"), "b:/home/user/x");
        assert_eq!(resolve_str("b:x", "/"), "b:/x");
    }

    #[test]
    fn only_one_dot_slash_stripped() {
        assert_eq!(resolve_str("b:././x", "/base"), "b:/base/./x");
    }

    #[test]
    fn resolution_is_a_fixed_point() {
        let once = resolve_str("b1:./p1;./p2:--f;:rel", CWD);
        let twice = resolve_str(&once, "/somewhere/else");
        assert_eq!(once, twice);
    }

    #[test]
    fn relative_base_rejected() {
        let d = parse("b:./x").unwrap();
        assert!(resolve(&d, Path::new("relative/base")).is_err());
    }
}
