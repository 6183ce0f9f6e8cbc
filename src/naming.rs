//! Key derivation.
//!
//! Every key belonging to one logical resource shares a single hash tag so
//! that multi-key scripts stay legal on clustered deployments. A name that
//! already carries a `{…}` tag is used verbatim.

/// Wrap `name` in a hash tag unless it already contains one.
pub(crate) fn wrap(name: &str) -> String {
    if name.contains('{') {
        name.to_string()
    } else {
        format!("{{{name}}}")
    }
}

/// Derive `prefix:{name}`, used for channel keys.
pub(crate) fn prefix_name(prefix: &str, name: &str) -> String {
    format!("{prefix}:{}", wrap(name))
}

/// Derive `{name}:suffix`, used for the rate limiter's value and permits
/// keys and their per-client variants.
pub(crate) fn suffix_name(name: &str, suffix: &str) -> String {
    format!("{}:{suffix}", wrap(name))
}
