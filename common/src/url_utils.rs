use anyhow::anyhow;
use std::net::SocketAddr;
use url::Url;

/// Validates an http(s) address and returns it without a trailing slash.
pub fn sanitize_url(url: &str) -> anyhow::Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("URL cannot be empty"));
    }
    if url.contains(['\0', '\r', '\n']) {
        return Err(anyhow!("URL contains invalid control characters"));
    }

    let parsed = Url::parse(url).map_err(|e| anyhow!("Invalid URL format: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Unsupported URL scheme: {}", other)),
    }

    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

/// Accepts `host:port` or a full URL.
pub fn parse_socket_addr(listen: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = listen.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let url = if listen.starts_with("http://") || listen.starts_with("https://") {
        Url::parse(listen)?
    } else {
        Url::parse(&format!("http://{}", listen))?
    };

    let host = url
        .host_str()
        .ok_or(anyhow!("missing host in {listen}"))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    Ok(addr)
}
