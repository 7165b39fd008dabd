//! Event path helpers.
//!
//! Event definitions live in a tree addressed by slash-separated paths such
//! as `/User/Lighting/Evening`. Paths are always absolute, never end in a
//! slash (except the root itself) and never contain empty segments.

use crate::domain::errors::{DomainError, DomainResult};

/// The root scope, containing every event.
pub const ROOT: &str = "/";

/// Normalize a path: collapse duplicate slashes, strip the trailing slash,
/// force a leading slash. Rejects `.`/`..` segments and the empty path.
pub fn normalize(path: &str) -> DomainResult<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(DomainError::InvalidPath(path.to_string()));
    }
    if segments.is_empty() {
        if path.starts_with('/') {
            return Ok(ROOT.to_string());
        }
        return Err(DomainError::InvalidPath(path.to_string()));
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Join a parent path and a single name.
pub fn join(parent: &str, name: &str) -> DomainResult<String> {
    if name.is_empty() || name.contains('/') {
        return Err(DomainError::InvalidPath(format!("{parent}/{name}")));
    }
    let parent = normalize(parent)?;
    if parent == ROOT {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{parent}/{name}"))
    }
}

/// True when `path` equals `scope` or lies somewhere beneath it.
pub fn is_within(path: &str, scope: &str) -> bool {
    if scope == ROOT {
        return path.starts_with('/');
    }
    path == scope
        || (path.starts_with(scope) && path.as_bytes().get(scope.len()) == Some(&b'/'))
}

/// Re-root `path` from `old_scope` to `new_scope`. Returns `None` when the
/// path is not within `old_scope`.
pub fn rebase(path: &str, old_scope: &str, new_scope: &str) -> Option<String> {
    if !is_within(path, old_scope) {
        return None;
    }
    let rest = if old_scope == ROOT { path } else { &path[old_scope.len()..] };
    if rest.is_empty() || rest == ROOT {
        Some(new_scope.to_string())
    } else if new_scope == ROOT {
        Some(rest.to_string())
    } else {
        Some(format!("{new_scope}{rest}"))
    }
}
