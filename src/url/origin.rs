use url::Url;

/// Extracts the host and, when it is not the scheme default, the port
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_host(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Derives the default destination directory from the seed's host
///
/// Dots and any character that is unsafe in a directory name become `_`,
/// so `example.com` maps to `example_com`.
pub fn default_destination(seed: &Url) -> String {
    let host = extract_host(seed).unwrap_or_else(|| "mirror".to_string());
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
