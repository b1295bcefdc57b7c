//! Name/label sanitization helpers shared by the Dispatcher.
//!
//! Grounded on `ph_operator::controllers::autoheal_controller::execute_runbook_action`,
//! which sanitizes alert label keys into environment variable names with the
//! same replace-non-conforming-chars idiom used here for orchestrator names.

/// Normalizes a string for use in an orchestrator resource name: lower-case
/// ASCII, any byte outside `[a-z0-9-]` replaced with `-`, truncated to 253
/// characters (the Kubernetes name length limit).
///
/// Per §9's "Sanitization open question": this must be used only for
/// *constructing* orchestrator names, never for matching — matching always
/// uses the raw label values so two distinct alertnames can never collapse
/// onto the same descriptor-match key.
pub fn sanitize_name_component(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase();
    let mut out: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    out.truncate(253);
    out
}

/// Uppercases a label key and replaces any non-alphanumeric character with
/// `_`, producing a valid shell environment-variable name fragment. The
/// `OPENFERO_` prefix is applied by the caller.
pub fn sanitize_env_key(raw: &str) -> String {
    raw.to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Truncates a base36-encoded hash to `len` characters, the form required
/// for a Kubernetes label value (§4.5.1 step 3: "truncated to 63 base36
/// characters").
pub fn truncate_base36(s: &str, len: usize) -> String {
    s.chars().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_mixed_case_and_symbols() {
        assert_eq!(sanitize_name_component("DiskFull!"), "diskfull-");
        assert_eq!(sanitize_name_component("CPU_High"), "cpu-high");
    }

    #[test]
    fn truncates_to_253_chars() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_name_component(&long).len(), 253);
    }

    #[test]
    fn env_key_uppercases_and_replaces_non_alphanumeric() {
        assert_eq!(sanitize_env_key("pod-name"), "POD_NAME");
        assert_eq!(sanitize_env_key("region.az"), "REGION_AZ");
    }

    #[test]
    fn distinct_alertnames_sanitize_to_same_name_but_match_on_raw() {
        // Regression guard for the §9 open question: "Foo-Bar" and "foo_bar"
        // sanitize identically but must remain distinguishable when used as
        // a *match* key (callers must compare `Alert::alertname()` directly,
        // never the sanitized form).
        assert_eq!(
            sanitize_name_component("Foo-Bar"),
            sanitize_name_component("foo_bar")
        );
        assert_ne!("Foo-Bar", "foo_bar");
    }
}
