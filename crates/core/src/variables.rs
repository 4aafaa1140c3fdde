// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI variable expansion for resource group keys
//!
//! Supports `$VAR`, `${VAR}` and `%VAR%`. Unknown variables expand to the
//! empty string; text that does not form a reference is kept as written.

use std::collections::HashMap;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expand variable references in `input`
pub fn expand(input: &str, variables: &HashMap<String, String>) -> String {
    let lookup = |name: &str| variables.get(name).map(String::as_str).unwrap_or("");
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['$', '%']) {
        out.push_str(&rest[..pos]);
        let sigil = &rest[pos..pos + 1];
        let after = &rest[pos + 1..];

        let reference = match sigil {
            "$" if after.starts_with('{') => after[1..]
                .find('}')
                .map(|end| (&after[1..1 + end], end + 2))
                .filter(|(name, _)| !name.is_empty() && name.chars().all(is_name_char)),
            "$" => {
                let len = after.find(|c| !is_name_char(c)).unwrap_or(after.len());
                (len > 0).then(|| (&after[..len], len))
            }
            _ => after
                .find('%')
                .map(|end| (&after[..end], end + 1))
                .filter(|(name, _)| !name.is_empty() && name.chars().all(is_name_char)),
        };

        match reference {
            Some((name, consumed)) => {
                out.push_str(lookup(name));
                rest = &after[consumed..];
            }
            None => {
                out.push_str(sigil);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn vars() -> HashMap<String, String> {
        [
            ("CI_COMMIT_REF_NAME", "master"),
            ("CI_JOB_NAME", "test"),
            ("CI_ENVIRONMENT_NAME", "production"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[parameterized(
        plain = { "production", "production" },
        dollar = { "$CI_COMMIT_REF_NAME-$CI_JOB_NAME", "master-test" },
        braced = { "deploy-${CI_ENVIRONMENT_NAME}", "deploy-production" },
        percent = { "%CI_JOB_NAME%", "test" },
        unknown = { "env-$UNDEFINED", "env-" },
        lone_dollar = { "cost$", "cost$" },
        dollar_before_symbol = { "$-x", "$-x" },
        unclosed_brace = { "${CI_JOB_NAME", "${CI_JOB_NAME" },
        lone_percent = { "100%", "100%" },
        percent_with_space = { "50% off %CI_JOB_NAME%", "50% off test" },
    )]
    fn expands_references(input: &str, expected: &str) {
        assert_eq!(expand(input, &vars()), expected);
    }

    #[test]
    fn key_of_only_unknown_variables_expands_to_empty() {
        assert_eq!(expand("$NOPE${ALSO_NOPE}", &vars()), "");
    }
}
