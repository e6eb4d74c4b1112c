use std::net::SocketAddr;

use http::Request;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Derives the rate limit key for a request.
///
/// Any `Fn(&Request<B>) -> String` closure is a key extractor.
pub trait KeyExtractor<B>: Clone + Send + Sync + 'static {
    fn extract(&self, request: &Request<B>) -> String;
}

impl<B, F> KeyExtractor<B> for F
where
    F: Fn(&Request<B>) -> String + Clone + Send + Sync + 'static,
{
    fn extract(&self, request: &Request<B>) -> String {
        self(request)
    }
}

/// The default key: `{client ip}:{path}`.
///
/// The client is the first `X-Forwarded-For` entry when the header is
/// present, else the peer address the server recorded in the request
/// extensions. Requests with neither are keyed as `unknown`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddrPath;

impl<B> KeyExtractor<B> for ClientAddrPath {
    fn extract(&self, request: &Request<B>) -> String {
        let client = client_ip(request).unwrap_or_else(|| "unknown".to_string());
        format!("{client}:{}", request.uri().path())
    }
}

/// The client address of `request`, preferring the proxy-reported one.
pub fn client_ip<B>(request: &Request<B>) -> Option<String> {
    forwarded_for(request).or_else(|| peer_addr(request).map(|addr| addr.ip().to_string()))
}

fn forwarded_for<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(X_FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|client| !client.is_empty())
        .map(str::to_string)
}

fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    let extensions = request.extensions();
    let addr = extensions.get::<SocketAddr>().copied();

    #[cfg(feature = "axum")]
    let addr = addr.or_else(|| {
        extensions
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|info| info.0)
    });

    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> http::request::Builder {
        Request::builder().uri(path)
    }

    #[test]
    fn first_forwarded_entry_wins() {
        let req = request("/login")
            .header("X-Forwarded-For", " 203.0.113.7 , 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(ClientAddrPath.extract(&req), "203.0.113.7:/login");
    }

    #[test]
    fn falls_back_to_the_peer_address() {
        let mut req = request("/search?q=rust").body(()).unwrap();
        req.extensions_mut()
            .insert("198.51.100.2:51000".parse::<SocketAddr>().unwrap());
        assert_eq!(ClientAddrPath.extract(&req), "198.51.100.2:/search");
    }

    #[test]
    fn blank_forwarded_header_is_ignored() {
        let mut req = request("/").header("x-forwarded-for", "  ").body(()).unwrap();
        req.extensions_mut()
            .insert("[2001:db8::1]:443".parse::<SocketAddr>().unwrap());
        assert_eq!(ClientAddrPath.extract(&req), "2001:db8::1:/");
    }

    #[test]
    fn anonymous_requests_share_a_key() {
        let req = request("/health").body(()).unwrap();
        assert_eq!(ClientAddrPath.extract(&req), "unknown:/health");
    }

    #[test]
    fn closures_are_extractors() {
        let by_user = |req: &Request<()>| {
            req.headers()
                .get("x-user")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("anonymous")
                .to_string()
        };
        let req = request("/").header("x-user", "ada").body(()).unwrap();
        assert_eq!(by_user.extract(&req), "ada");
    }
}
