//! Placeholder Patterns
//!
//! Artifact names and job arguments are written as patterns such as
//! `{stem}.{mask_stem}.fits`. Rendering substitutes every `{name}` with the
//! instance parameter of the same name.

use std::collections::BTreeMap;

/// Parameters bound to one job instance (ordered for deterministic output).
pub type Params = BTreeMap<String, String>;

/// Checks if a string contains placeholder syntax.
pub fn has_wildcards(text: &str) -> bool {
    text.contains('{') && text.contains('}')
}

/// Extracts placeholder names from a pattern, in order of appearance.
///
/// # Example
/// ```
/// use ehtflow::workflow::wildcards::extract_wildcard_names;
///
/// let names = extract_wildcard_names("SR1_M87_2017_{epoch}_{band}.uvfits");
/// assert_eq!(names, vec!["epoch", "band"]);
/// ```
pub fn extract_wildcard_names(pattern: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_wildcard = false;
    let mut current_name = String::new();

    for ch in pattern.chars() {
        match ch {
            '{' => {
                in_wildcard = true;
                current_name.clear();
            }
            '}' => {
                if in_wildcard && !current_name.is_empty() {
                    names.push(current_name.clone());
                    current_name.clear();
                }
                in_wildcard = false;
            }
            _ => {
                if in_wildcard {
                    current_name.push(ch);
                }
            }
        }
    }

    names
}

/// Renders a pattern against a parameter set.
///
/// Returns the name of the first placeholder that has no binding as the error.
///
/// # Example
/// ```
/// use ehtflow::workflow::wildcards::{render, Params};
///
/// let mut params = Params::new();
/// params.insert("epoch".to_string(), "095".to_string());
/// assert_eq!(render("{epoch}.out", &params).unwrap(), "095.out");
/// assert_eq!(render("{band}.out", &params).unwrap_err(), "band");
/// ```
pub fn render(pattern: &str, params: &Params) -> Result<String, String> {
    let mut rendered = String::with_capacity(pattern.len());
    let mut pending: Option<String> = None;

    // Single pass: substituted values are never scanned again
    for ch in pattern.chars() {
        match ch {
            '{' => {
                if let Some(text) = pending.replace(String::new()) {
                    rendered.push('{');
                    rendered.push_str(&text);
                }
            }
            '}' => match pending.take() {
                Some(name) if !name.is_empty() => {
                    let value = params.get(&name).ok_or_else(|| name.clone())?;
                    rendered.push_str(value);
                }
                Some(_) => rendered.push_str("{}"),
                None => rendered.push('}'),
            },
            _ => match pending.as_mut() {
                Some(name) => name.push(ch),
                None => rendered.push(ch),
            },
        }
    }

    if let Some(text) = pending {
        rendered.push('{');
        rendered.push_str(&text);
    }

    Ok(rendered)
}
