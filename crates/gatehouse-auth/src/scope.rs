//! Space-separated scope string helpers.

/// The scope that must always be granted.
pub const SCOPE_OPENID: &str = "openid";
/// Grants nickname and picture in the identity claims.
pub const SCOPE_PROFILE: &str = "profile";
/// Grants the email address in the identity claims.
pub const SCOPE_EMAIL: &str = "email";
/// Grants the phone number in the identity claims.
pub const SCOPE_PHONE: &str = "phone";
/// Requests a refresh token alongside the access token.
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// The standard scopes this server understands.
pub const STANDARD_SCOPES: &[&str] = &[
    SCOPE_OPENID,
    SCOPE_PROFILE,
    SCOPE_EMAIL,
    SCOPE_PHONE,
    SCOPE_OFFLINE_ACCESS,
];

/// Splits a scope string into individual scopes.
#[must_use]
pub fn parse(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Joins scopes back into a space-separated string.
#[must_use]
pub fn join(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Intersects requested scopes with an allowed set, preserving request order.
#[must_use]
pub fn intersection(requested: &[String], allowed: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|s| allowed.iter().any(|a| a == *s))
        .cloned()
        .collect()
}

/// Returns `true` if `scopes` contains `target`.
#[must_use]
pub fn contains(scopes: &[String], target: &str) -> bool {
    scopes.iter().any(|s| s == target)
}
