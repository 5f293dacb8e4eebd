//! URL-safe identifiers derived from logins and forum names.

/// Segments the router matches literally under `/users/`.
pub const RESERVED: &[&str] = &[
    "activate",
    "activate_new_email",
    "forgot_password",
    "reset_password",
    "new",
    "me",
];

const FALLBACK: &str = "user";

/// Lowercases `source` and collapses every run of non-alphanumeric
/// characters into a single `-`.
#[must_use]
pub fn slugify(source: &str) -> String {
    let mut slug = String::with_capacity(source.len());
    let mut pending_dash = false;

    for c in source.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK.to_string()
    } else {
        slug
    }
}

/// Picks `base`, or `base-2`, `base-3`, ... until a value not in `taken`
/// and not reserved shows up.
#[must_use]
pub fn unique_permalink<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    let is_free = |candidate: &str| {
        !RESERVED.contains(&candidate) && !taken.iter().any(|t| t.as_ref() == candidate)
    };

    if is_free(base) {
        return base.to_string();
    }

    (2u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| base.to_string())
}
