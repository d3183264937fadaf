//! Path-string helpers.
//!
//! Relative paths inside a build tree are handled as `/`-joined strings so they
//! print the same way on every platform and can be used as stable identifiers.

/// Join two relative path strings with `/`.
///
/// An empty `left` yields `right` unchanged, so joining onto the walk root never
/// produces a leading separator. An empty `right` yields `left` unchanged.
///
/// ```
/// use buildstack_lib::util::path::join_skip_empty;
///
/// assert_eq!(join_skip_empty("", "app"), "app");
/// assert_eq!(join_skip_empty("app", "requirements.in"), "app/requirements.in");
/// ```
pub fn join_skip_empty(left: &str, right: &str) -> String {
  match (left.is_empty(), right.is_empty()) {
    (true, _) => right.to_string(),
    (false, true) => left.to_string(),
    (false, false) => format!("{}/{}", left, right),
  }
}

/// Return the directory part of a `/`-joined relative file path.
///
/// A file at the root (`"requirements.in"`) has the empty directory `""`.
pub fn parent_of(rel_path: &str) -> &str {
  match rel_path.rfind('/') {
    Some(idx) => &rel_path[..idx],
    None => "",
  }
}

/// Reduce a name to `[-a-zA-Z0-9]` characters.
///
/// Every other character becomes `-`, runs of `-` collapse into one, and leading
/// or trailing `-` are dropped. Returns `default` when nothing is left.
pub fn sanitize_name(name: &str, default: &str) -> String {
  let mut out = String::with_capacity(name.len());
  for c in name.chars() {
    let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' };
    if c == '-' && (out.is_empty() || out.ends_with('-')) {
      continue;
    }
    out.push(c);
  }
  while out.ends_with('-') {
    out.pop();
  }

  if out.is_empty() { default.to_string() } else { out }
}
