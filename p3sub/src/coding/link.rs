use std::collections::HashMap;

/// Formats one link header value: `<URL>; rel="NAME"`.
///
/// The GET feed response sends one of these per header line; the PUT
/// callback joins several with `, ` into a single header value. Parsers
/// accept both shapes.
pub fn format_link(url: &str, rel: &str) -> String {
    format!("<{url}>; rel=\"{rel}\"")
}

/// Parses `link` header values into a rel -> URL map.
///
/// Each value may carry several entries joined by commas. An entry splits
/// at its first `;` into a URL part (trimmed, with one leading `<` and one
/// trailing `>` stripped) and a parameter part, which must be exactly
/// `rel="..."` with a non-empty, quote-free value. Entries that don't fit
/// are logged and skipped, not fatal.
pub fn parse_links<'a, I>(values: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut rels = HashMap::new();

    for value in values {
        for entry in value.split(',') {
            let Some(semi) = entry.find(';') else {
                log::info!("link value without parameter, skipping: {}", entry.trim());
                continue;
            };

            let url = entry[..semi].trim();
            let url = url.strip_prefix('<').unwrap_or(url);
            let url = url.strip_suffix('>').unwrap_or(url);

            match parse_rel(entry[semi + 1..].trim()) {
                Some(rel) => {
                    rels.insert(rel.to_string(), url.to_string());
                }
                None => log::info!("could not parse link rel, skipping: {}", entry.trim()),
            }
        }
    }

    rels
}

/// Accepts exactly `rel="..."` with at least one character between the
/// quotes and none of them a quote.
fn parse_rel(par: &str) -> Option<&str> {
    let rel = par.strip_prefix("rel=\"")?.strip_suffix('"')?;
    if rel.is_empty() || rel.contains('"') {
        return None;
    }
    Some(rel)
}
