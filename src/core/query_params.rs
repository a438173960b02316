use std::collections::HashMap;

/// Parse query parameters from a URI or bare query string.
///
/// Values are percent-decoded (with `+` read as a space). When a key repeats
/// only the last value is kept.
///
/// # Example
/// ```
/// use quill::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/edit-post/1?_method=PUT&x=a%20b");
/// assert_eq!(params.get("_method"), Some(&"PUT".to_string()));
/// assert_eq!(params.get("x"), Some(&"a b".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let query = match uri.find('?') {
        Some(start) => &uri[start + 1..],
        None if uri.starts_with('/') => return params,
        None => uri,
    };

    for param in query.split('&').filter(|p| !p.is_empty()) {
        match param.split_once('=') {
            Some((key, value)) => {
                params.insert(decode(key), decode(value));
            }
            // Flag parameter without value
            None => {
                params.insert(decode(param), String::new());
            }
        }
    }

    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params
        .get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uri_with_query() {
        let params = parse_query_params("/path?user=john&page=2");
        assert_eq!(params.get("user").map(String::as_str), Some("john"));
        assert_eq!(params.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn parses_bare_query_string() {
        let params = parse_query_params("_method=DELETE");
        assert_eq!(params.get("_method").map(String::as_str), Some("DELETE"));
    }

    #[test]
    fn path_without_query_is_empty() {
        assert!(parse_query_params("/dashboard").is_empty());
        assert!(parse_query_params("").is_empty());
    }

    #[test]
    fn flags_and_decoding() {
        let params = parse_query_params("?all&name=J%C3%BCrgen+M");
        assert_eq!(params.get("all").map(String::as_str), Some(""));
        assert_eq!(params.get("name").map(String::as_str), Some("Jürgen M"));
    }

    #[test]
    fn get_string_falls_back_to_default() {
        let params = parse_query_params("?a=1");
        assert_eq!(get_string(&params, "a", None), Some("1".to_string()));
        assert_eq!(get_string(&params, "b", Some("x")), Some("x".to_string()));
        assert_eq!(get_string(&params, "b", None), None);
    }
}
