//! Rewrites manifest URIs into absolute URLs on the streaming proxy.

/// Path under which the streaming endpoint is mounted.
pub const PROXY_ROUTE: &str = "streaming/hls";

/// Turns every relative URI line of `content` into
/// `{backend_url}/streaming/hls/{public_id}/{resolved}`.
///
/// `file_path` is the manifest's own path inside the video's HLS tree; relative
/// URIs resolve against its directory. Tags, blank lines and absolute URLs pass
/// through untouched.
pub fn rewrite_to_proxy(content: &str, backend_url: &str, public_id: &str, file_path: &str) -> String {
    let base = format!("{}/{}/{}", backend_url.trim_end_matches('/'), PROXY_ROUTE, public_id);
    let dir = match file_path.rfind('/') {
        Some(idx) => &file_path[..idx],
        None => "",
    };

    content
        .split('\n')
        .map(|line| {
            let uri = line.trim();
            if uri.is_empty() || uri.starts_with('#') || is_absolute_url(uri) {
                return line.to_string();
            }
            if let Some(root_relative) = uri.strip_prefix('/') {
                format!("{}/{}", base, root_relative)
            } else if dir.is_empty() {
                format!("{}/{}", base, uri)
            } else {
                format!("{}/{}/{}", base, dir, uri)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_absolute_url(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}
