//! Per-task prompt composition: `prefix`/`suffix` wrapping and
//! `{{output:task_name}}` directive resolution against a DAG iteration's
//! shared state directory.

use std::path::Path;

use regex::Regex;

/// Wrap `body` with `prefix`/`suffix`, each separated by a blank line
/// when present — the same "prefix + body + suffix" composition order
/// a task's prompt modifiers apply in.
pub fn compose(body: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(p) = prefix {
        out.push_str(p);
        out.push_str("\n\n");
    }
    out.push_str(body);
    if let Some(s) = suffix {
        out.push_str("\n\n");
        out.push_str(s);
    }
    out
}

/// Resolve every `{{output:task_name}}` directive in `text` by reading
/// `state_dir/task_name`. Resolution is lexical at launch time — a
/// directive referencing a task with no captured output yet (or no
/// output-capture hint at all) is left verbatim, and a warning message
/// is returned for the caller to log.
pub fn resolve_output_directives(text: &str, state_dir: &Path) -> (String, Vec<String>) {
    let re = Regex::new(r"\{\{output:([A-Za-z0-9_-]+)\}\}").expect("static regex is valid");
    let mut warnings = Vec::new();

    let resolved = re.replace_all(text, |caps: &regex::Captures| {
        let task_name = &caps[1];
        let path = state_dir.join(task_name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => {
                warnings.push(format!(
                    "{{{{output:{task_name}}}}} could not be resolved: no output captured at {}",
                    path.display()
                ));
                caps[0].to_string()
            }
        }
    });

    (resolved.into_owned(), warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_wraps_body_with_prefix_and_suffix() {
        let out = compose("do the thing", Some("context:"), Some("be terse"));
        assert_eq!(out, "context:\n\ndo the thing\n\nbe terse");
    }

    #[test]
    fn compose_with_no_modifiers_is_the_bare_body() {
        assert_eq!(compose("do the thing", None, None), "do the thing");
    }

    #[test]
    fn resolves_an_existing_captured_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("build"), "build succeeded\n").unwrap();

        let (resolved, warnings) =
            resolve_output_directives("summary: {{output:build}}", dir.path());
        assert_eq!(resolved, "summary: build succeeded\n");
        assert!(warnings.is_empty());
    }

    #[test]
    fn unresolved_directive_is_left_verbatim_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (resolved, warnings) =
            resolve_output_directives("summary: {{output:missing}}", dir.path());
        assert_eq!(resolved, "summary: {{output:missing}}");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn resolves_multiple_directives_independently() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "A").unwrap();
        std::fs::write(dir.path().join("b"), "B").unwrap();

        let (resolved, warnings) =
            resolve_output_directives("{{output:a}}-{{output:b}}", dir.path());
        assert_eq!(resolved, "A-B");
        assert!(warnings.is_empty());
    }
}
