/// Ensure a zone (or rrset) name ends with a trailing dot, as the
/// PowerDNS API expects. Idempotent.
pub fn normalize(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_trailing_dot() {
        assert_eq!(normalize("example.com"), "example.com.");
    }

    #[test]
    fn leaves_trailing_dot_alone() {
        assert_eq!(normalize("example.com."), "example.com.");
    }

    #[test]
    fn idempotent() {
        for s in ["example.com", "example.com.", "a.b.c", ""] {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn always_ends_with_dot() {
        for s in ["example.com", "example.com.", "a", ""] {
            assert!(normalize(s).ends_with('.'));
        }
    }
}
