//! Support code for the exported macros, not part of the public API.

/// Name of the marker function [`call_site!`](crate::call_site) declares.
#[doc(hidden)]
pub const MARKER: &str = "__callspool_marker";

/// Turns the type name of the marker function into the path of the function enclosing it.
#[doc(hidden)]
pub fn strip_marker(name: &'static str) -> &'static str {
    name.strip_suffix(MARKER)
        .and_then(|name| name.strip_suffix("::"))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::strip_marker;

    #[test]
    fn strips_marker_segment() {
        assert_eq!(
            strip_marker("app::handlers::login::__callspool_marker"),
            "app::handlers::login"
        );
        assert_eq!(strip_marker("app::login"), "app::login");
    }
}
