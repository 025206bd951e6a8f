/// Parse a boolean value from a raw string, accepting common env-style
/// forms, case-insensitively.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_u32(name: &str) -> Option<u32> {
    env_str(name).and_then(|v| v.parse().ok())
}

pub fn env_u16(name: &str) -> Option<u16> {
    env_str(name).and_then(|v| v.parse().ok())
}

pub fn env_i64(name: &str) -> Option<i64> {
    env_str(name).and_then(|v| v.parse().ok())
}

pub fn env_bool(name: &str) -> Option<bool> {
    env_str(name).and_then(|v| parse_bool(&v))
}

pub fn env_csv(name: &str) -> Option<Vec<String>> {
    env_str(name).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
}

pub fn env_duration_secs(name: &str) -> Option<std::time::Duration> {
    env_str(name).and_then(|v| {
        v.parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
            .or_else(|| humantime::parse_duration(&v).ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn env_csv_trims_and_drops_empty_entries() {
        std::env::set_var("DOME_TEST_CSV", " a, ,b ,");
        assert_eq!(env_csv("DOME_TEST_CSV"), Some(vec!["a".to_string(), "b".to_string()]));
        std::env::remove_var("DOME_TEST_CSV");
    }
}
