//! Config validation: unknown-key detection with Levenshtein suggestions
//! and cross-field range checks.
//!
//! Unknown keys are found by parsing the raw TOML into `toml::Value` and
//! comparing every key path against the known field names. These only
//! produce warnings; a typo never breaks an otherwise valid file.

use std::collections::HashSet;

use super::BhpConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ": did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid key in a BHP config file.
///
/// Must match the fields of `BhpConfig`.
pub fn known_config_keys() -> HashSet<&'static str> {
    [
        "max_time_diff_seconds",
        "max_offset_minutes",
        "min_offset_minutes",
        "window_size_seconds",
        "fixed_offset_tolerance_seconds",
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        // parse errors are reported by serde
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Checks
// ============================================================================

/// Suspicious but legal combinations.
///
/// Hard errors live in `BhpConfig::validate`.
pub fn validate_ranges(config: &BhpConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // An offset longer than the window can never find history
    if config.max_offset_minutes * 60.0 > config.window_size_seconds {
        warnings.push(ValidationWarning {
            field: "max_offset_minutes".to_string(),
            message: format!(
                "max_offset_minutes = {:.1} exceeds the window span ({:.0} s); long offsets will stay pending",
                config.max_offset_minutes, config.window_size_seconds
            ),
            suggestion: None,
        });
    }

    if config.max_time_diff_seconds > config.window_size_seconds {
        warnings.push(ValidationWarning {
            field: "max_time_diff_seconds".to_string(),
            message: format!(
                "max_time_diff_seconds = {:.1} is wider than the window span ({:.0} s)",
                config.max_time_diff_seconds, config.window_size_seconds
            ),
            suggestion: None,
        });
    }

    warnings
}
