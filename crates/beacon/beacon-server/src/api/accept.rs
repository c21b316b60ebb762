use core::convert::Infallible;

use alloy::primitives::Address;
use beacon_core::AddressResponse;
use http_body_util::Full;
use hyper::{
    Method,
    Request,
    Response,
    StatusCode,
    body::Bytes,
    header,
};
use serde_json::json;

/// Route one request. Every handler is a pure read of the address resolved
/// at startup.
pub fn accept_request<B>(
    req: Request<B>,
    resolved: Option<Address>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let method = req.method().clone();

    metrics::counter!("beacon_http_requests_total", "path" => path.to_string()).increment(1);
    tracing::debug!(target: "api", %method, path, "Incoming request");

    if method == Method::GET && path == "/" {
        return Ok(response(
            StatusCode::OK,
            "text/html; charset=utf-8",
            render_page(resolved),
        ));
    }

    if method == Method::GET && path == "/address" {
        return Ok(response(
            StatusCode::OK,
            "application/json",
            json!(AddressResponse { address: resolved }).to_string(),
        ));
    }

    if method == Method::GET && path == "/health" {
        return Ok(response(StatusCode::OK, "text/plain", "ok".to_string()));
    }

    Ok(response(
        StatusCode::NOT_FOUND,
        "text/plain",
        "not found".to_string(),
    ))
}

fn response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// The landing page: a card with the deployed address and a copy button.
/// Unresolved renders the zero address.
fn render_page(resolved: Option<Address>) -> String {
    let address = resolved.unwrap_or(Address::ZERO);
    format!(
        r#"<!doctype html>
<html><head>
  <meta charset="utf-8" />
  <title>Contract Address</title>
  <style>
    body {{ background:#101418; color:#d7e1ea; font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; display:flex; align-items:center; justify-content:center; height:100vh; margin:0; }}
    .card {{ border:1px solid #2c3a47; padding:24px 28px; border-radius:12px; background:#161c22; box-shadow:0 6px 30px rgba(0,0,0,.5); text-align:center; }}
    h1 {{ margin:0 0 12px; font-size:20px; font-weight:700; }}
    code {{ font-size:15px; background:#0b0f13; padding:8px 12px; border-radius:8px; display:inline-block; }}
    button {{ margin-top:14px; padding:9px 14px; border-radius:8px; border:1px solid #2c3a47; background:#0b0f13; color:#d7e1ea; cursor:pointer; }}
    button:active {{ transform: translateY(1px); }}
  </style>
</head><body>
  <div class="card">
    <h1>Deployed Contract Address</h1>
    <code id="addr">{address}</code><br/>
    <button onclick="navigator.clipboard.writeText(document.getElementById('addr').innerText)">Copy</button>
  </div>
</body></html>
"#
    )
}
