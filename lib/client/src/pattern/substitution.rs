use crate::profile::{is_variable_char, ApplicationProfile, OperationTemplate, ProfileError};
use sepa_model::{Bindings, InvalidTerm, RdfTerm};
use std::collections::HashMap;

/// Instantiates a template: the profile's `PREFIX` prologue followed by the SPARQL text with its
/// variables replaced.
///
/// A declared variable takes the caller's value, else the profile's default, coerced to the
/// declared kind. Caller bindings for undeclared variables are substituted as well. Variables
/// without a value stay in the text. A value that is not a valid RDF term is an error, so a value
/// always stays one term of the result.
pub(crate) fn instantiate(
    profile: &ApplicationProfile,
    template: &OperationTemplate,
    forced: &Bindings,
) -> Result<String, ProfileError> {
    let mut values: HashMap<&str, RdfTerm> = forced
        .iter()
        .map(|(variable, value)| (variable, value.clone()))
        .collect();
    for (variable, declaration) in &template.forced_bindings {
        let value = match values.remove(variable.as_str()) {
            Some(value) => Some(value.with_kind(declaration.kind)),
            None => declaration.default_term(),
        };
        if let Some(value) = value {
            values.insert(variable.as_str(), value);
        }
    }

    let rendered = values
        .into_iter()
        .map(|(variable, value)| {
            render(profile, &value)
                .map(|sparql| (variable, sparql))
                .map_err(|source| ProfileError::InvalidBinding {
                    variable: variable.to_owned(),
                    source,
                })
        })
        .collect::<Result<HashMap<_, _>, _>>()?;
    let mut sparql = profile.prologue();
    replace_variables(&template.sparql, &rendered, &mut sparql);
    Ok(sparql)
}

/// Prefixed names whose prefix the profile declares are kept as written.
fn render(profile: &ApplicationProfile, term: &RdfTerm) -> Result<String, InvalidTerm> {
    if let RdfTerm::Uri(uri) = term {
        if let Some((prefix, local)) = uri.split_once(':') {
            if profile.namespace(prefix).is_some() && is_local_name(local) {
                return Ok(uri.clone());
            }
        }
    }
    term.to_sparql()
}

/// A subset of the SPARQL `PN_LOCAL` production, without escapes.
fn is_local_name(local: &str) -> bool {
    !local.starts_with(['-', '.'])
        && !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

/// Replaces `?name` and `$name` outside of string literals, IRIs and comments.
fn replace_variables(sparql: &str, values: &HashMap<&str, String>, output: &mut String) {
    let mut rest = sparql;
    while let Some(start) = rest.find(['?', '$', '"', '\'', '<', '#']) {
        output.push_str(&rest[..start]);
        let token = &rest[start..];
        let len = match token.as_bytes()[0] {
            b'"' => string_len(token, '"'),
            b'\'' => string_len(token, '\''),
            b'<' => iri_len(token),
            b'#' => token.find('\n').unwrap_or(token.len()),
            _ => {
                let after = &token[1..];
                let end = after
                    .find(|c: char| !is_variable_char(c))
                    .unwrap_or(after.len());
                let name = &after[..end];
                match values.get(name) {
                    Some(value) if !name.is_empty() => output.push_str(value),
                    _ => output.push_str(&token[..=end]),
                }
                rest = &after[end..];
                continue;
            }
        };
        output.push_str(&token[..len]);
        rest = &token[len..];
    }
    output.push_str(rest);
}

/// Length of the string literal `token` starts with, quotes included. Unterminated strings run
/// to the end of the text.
fn string_len(token: &str, quote: char) -> usize {
    let long_quote = if quote == '"' { "\"\"\"" } else { "'''" };
    let long = token.starts_with(long_quote);
    let mut chars = token.char_indices().skip(if long { 3 } else { 1 });
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            _ if long => {
                if token[i..].starts_with(long_quote) {
                    return i + long_quote.len();
                }
            }
            '\n' => return i + 1,
            _ if c == quote => return i + 1,
            _ => {}
        }
    }
    token.len()
}

/// Length of the IRI reference `token` starts with, or 1 when the `<` is an operator.
fn iri_len(token: &str) -> usize {
    for (i, c) in token.char_indices().skip(1) {
        match c {
            '>' => return i + 1,
            '<' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => return 1,
            _ if c <= ' ' => return 1,
            _ => {}
        }
    }
    1
}
