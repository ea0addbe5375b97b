/// Domains accepted when no `ALLOWED_SCHOOL_DOMAINS` override is set.
pub const DEFAULT_SCHOOL_DOMAINS: &[&str] = &["sawoo.hs.kr"];

/// Parse a comma separated domain list, lower-cased, blanks dropped.
pub fn parse_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().trim_start_matches('@').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

pub fn email_domain(email: &str) -> Option<String> {
    let (local, domain) = email.trim().rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() { return None; }
    Some(domain.to_lowercase())
}

pub fn validate_school_email(email: &str, allowed: &[String]) -> bool {
    match email_domain(email) {
        Some(d) => allowed.iter().any(|a| *a == d),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> { DEFAULT_SCHOOL_DOMAINS.iter().map(|d| d.to_string()).collect() }

    #[test]
    fn accepts_school_domain_case_insensitively() {
        assert!(validate_school_email("kim@sawoo.hs.kr", &defaults()));
        assert!(validate_school_email("Kim@SAWOO.HS.KR", &defaults()));
    }

    #[test]
    fn rejects_other_domains_and_garbage() {
        assert!(!validate_school_email("kim@gmail.com", &defaults()));
        assert!(!validate_school_email("kim@evil.sawoo.hs.kr", &defaults()));
        assert!(!validate_school_email("no-at-sign", &defaults()));
        assert!(!validate_school_email("@sawoo.hs.kr", &defaults()));
    }

    #[test]
    fn parses_override_list() {
        assert_eq!(parse_domains(" a.hs.kr, @B.edu ,,"), vec!["a.hs.kr", "b.edu"]);
    }
}
