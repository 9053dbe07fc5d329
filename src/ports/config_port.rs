//! Configuration access port trait.

/// Sectioned key/value lookup. Values come back raw; parsing and
/// validation happen in `domain::config`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn has_key(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key)
            .is_some_and(|v| !v.trim().is_empty())
    }
}
