/// Mountpoint conflict detection between independently declared directives
use crate::config::types::{MountError, Result};
use crate::directive::codec::DirectiveList;
use crate::directive::parser::Directive;

/// Fail if `candidate` claims a path already assigned to another bucket scope.
/// Same path with the same normalized bucket is a re-declaration, not a conflict.
pub fn check(existing: &DirectiveList, candidate: &Directive) -> Result<()> {
    for entry in existing {
        if entry.mount_path() == candidate.mount_path()
            && entry.bucket().normalized() != candidate.bucket().normalized()
        {
            return Err(MountError::Conflict {
                path: candidate.mount_path().to_string(),
                existing: entry.bucket().to_string(),
                requested: candidate.bucket().to_string(),
            });
        }
    }
    Ok(())
}

/// Check every candidate against `existing` and against the candidates before
/// it, then return the merged list. `existing` is never modified; exact
/// duplicates are not appended twice.
pub fn merge(existing: &DirectiveList, candidates: &DirectiveList) -> Result<DirectiveList> {
    let mut merged = existing.clone();
    for candidate in candidates {
        check(&merged, candidate)?;
        if merged.contains(candidate) {
            log::debug!("Directive {} already declared", candidate);
            continue;
        }
        merged.push(candidate.clone());
    }
    Ok(merged)
}
