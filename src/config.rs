use crate::school::{parse_domains, DEFAULT_SCHOOL_DOMAINS};

pub const DEFAULT_BLIND_THRESHOLD: i64 = 10;

/// Runtime settings read from the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub frontend_url: String,
    pub school_domains: Vec<String>,
    /// Dislikes at which a post is blinded.
    pub blind_threshold: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            frontend_url: "http://localhost:3000".into(),
            school_domains: DEFAULT_SCHOOL_DOMAINS.iter().map(|d| d.to_string()).collect(),
            blind_threshold: DEFAULT_BLIND_THRESHOLD,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let school_domains = std::env::var("ALLOWED_SCHOOL_DOMAINS")
            .ok()
            .map(|v| parse_domains(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or(d.school_domains);
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(d.bind_addr),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.port),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(d.frontend_url),
            school_domains,
            blind_threshold: std::env::var("BLIND_DISLIKE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v > 0)
                .unwrap_or(d.blind_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn env_overrides() {
        std::env::set_var("ALLOWED_SCHOOL_DOMAINS", "a.hs.kr,b.hs.kr");
        std::env::set_var("BLIND_DISLIKE_THRESHOLD", "3");
        let c = AppConfig::from_env();
        assert_eq!(c.school_domains, vec!["a.hs.kr", "b.hs.kr"]);
        assert_eq!(c.blind_threshold, 3);
        std::env::set_var("BLIND_DISLIKE_THRESHOLD", "zero");
        assert_eq!(AppConfig::from_env().blind_threshold, DEFAULT_BLIND_THRESHOLD);
        std::env::remove_var("ALLOWED_SCHOOL_DOMAINS");
        std::env::remove_var("BLIND_DISLIKE_THRESHOLD");
    }
}
