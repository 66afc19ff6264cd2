//! Origin checking for the WebSocket upgrade. `CheckOrigin` is modeled as
//! an injectable trait object; the permissive default is only installed
//! when the caller supplies none, rather than being silently on by
//! default.

/// Decides whether an incoming upgrade's `Origin` header is acceptable.
pub trait OriginChecker: Send + Sync {
    fn check(&self, origin: Option<&str>) -> bool;
}

/// Accepts every origin, including a missing header. Only ever installed
/// explicitly by the caller (e.g. in `RealtimeServerConfig::default`) —
/// never silently substituted when a checker is configured.
pub struct PermissiveOriginChecker;

impl OriginChecker for PermissiveOriginChecker {
    fn check(&self, _origin: Option<&str>) -> bool {
        true
    }
}

/// Accepts only origins present in an explicit allow-list.
pub struct AllowListOriginChecker {
    allowed: Vec<String>,
}

impl AllowListOriginChecker {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }
}

impl OriginChecker for AllowListOriginChecker {
    fn check(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(o) => self.allowed.iter().any(|a| a == o),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_accepts_missing_origin() {
        assert!(PermissiveOriginChecker.check(None));
    }

    #[test]
    fn allow_list_rejects_unknown_origin() {
        let checker = AllowListOriginChecker::new(vec!["https://dashboard.example.com".to_string()]);
        assert!(checker.check(Some("https://dashboard.example.com")));
        assert!(!checker.check(Some("https://evil.example.com")));
        assert!(!checker.check(None));
    }
}
