use std::collections::HashMap;

use percent_encoding::percent_decode_str;

/// Splits a request path at the first `?` and decodes the query string.
pub fn split_path_query(path_with_query: &str) -> (&str, HashMap<String, String>) {
    match path_with_query.split_once('?') {
        Some((path, query)) => (path, decode_query(query)),
        None => (path_with_query, HashMap::new()),
    }
}

/// Decodes a raw query string into a key -> value map.
///
/// Pairs split on `&`, each pair at its first `=`, and both sides are
/// percent-decoded. A key without `=` maps to itself.
pub fn decode_query(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for pair in query.split('&') {
        match pair.split_once('=') {
            Some((key, value)) => {
                map.insert(unquote(key), unquote(value));
            }
            None => {
                let key = unquote(pair);
                map.insert(key.clone(), key);
            }
        }
    }

    map
}

/// Decodes a form-encoded POST body, preserving duplicate fields so that
/// handlers can reject repeated parameters. Fields with empty values are
/// dropped.
pub fn decode_form(body: &str) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        map.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    map
}

fn unquote(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
