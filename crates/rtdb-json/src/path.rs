//! Slash-delimited path parsing shared by [`crate::put`] and [`crate::patch`].

/// Split a wire-form path (`/`-separated, leading `/`) into its key sequence.
///
/// `"/"` — the empty path — yields an empty vector; every other path yields
/// one string per segment. The leading slash is mandatory and stripped
/// unconditionally; a path without one is treated as if it had been present
/// (mirroring the reference implementation, which never validates the
/// leading slash itself).
#[must_use]
pub fn split(path: &str) -> Vec<String> {
    let rest = path.strip_prefix('/').unwrap_or(path);
    if rest.is_empty() {
        return Vec::new();
    }
    rest.split('/').map(str::to_owned).collect()
}

/// Join a key sequence back into wire form.
#[must_use]
pub fn join(keys: &[String]) -> String {
    if keys.is_empty() {
        return "/".to_owned();
    }
    let mut out = String::new();
    for key in keys {
        out.push('/');
        out.push_str(key);
    }
    out
}
