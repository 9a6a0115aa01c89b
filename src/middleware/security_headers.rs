use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};

// Hardened defaults for a JSON-only API: nothing is allowed to load or frame
// these responses. Loosen the policy if the service ever serves HTML.
pub async fn security_headers(req: Request<Body>, next: Next) -> Response<Body> {
    let mut res = next.run(req).await;

    const CSP: &str = "default-src 'none'; frame-ancestors 'none'; base-uri 'none'";

    if res.headers().get("content-security-policy").is_none() {
        let val = HeaderValue::from_static(CSP);
        res.headers_mut()
            .insert(HeaderName::from_static("content-security-policy"), val);
    }

    if res.headers().get("referrer-policy").is_none() {
        let val = HeaderValue::from_static("no-referrer");
        res.headers_mut()
            .insert(HeaderName::from_static("referrer-policy"), val);
    }
    if res.headers().get("x-content-type-options").is_none() {
        let val = HeaderValue::from_static("nosniff");
        res.headers_mut()
            .insert(HeaderName::from_static("x-content-type-options"), val);
    }

    res
}
