use criterion::{black_box, criterion_group, criterion_main, Criterion};
use digestnet::base::neterror::NetError;
use digestnet::http::digestauth::{Challenge, DigestInput};
use digestnet::http::{
    CachedDigestTransport, DigestTransport, RequestBody, ResponseBody, RoundTrip, RoundTripping,
};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use std::sync::Arc;
use tokio::runtime::Runtime;

const CHALLENGE: &str = r#"Digest qop="auth",algorithm=MD5,realm="monero-rpc",nonce="E/fIX+Kmic5GyK1ydhPoFA==",stale=false"#;

/// Accepts any `Authorization` header; challenges requests without one.
struct Server;

impl RoundTrip for Server {
    fn round_trip(&self, req: Request<RequestBody>) -> RoundTripping {
        let status = if req.headers().contains_key(AUTHORIZATION) {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        };
        let resp = Response::builder()
            .status(status)
            .header(WWW_AUTHENTICATE, CHALLENGE)
            .body(ResponseBody::empty())
            .map_err(|_| NetError::InvalidResponse);
        Box::pin(async move { resp })
    }
}

/// Parsing and response computation, no I/O.
fn benchmark_digest(c: &mut Criterion) {
    c.bench_function("challenge_parse", |b| {
        b.iter(|| black_box(Challenge::parse(black_box(CHALLENGE)).unwrap()))
    });

    let challenge = Challenge::parse(CHALLENGE).unwrap();
    let input = DigestInput {
        username: "john".to_string(),
        password: "doe".to_string(),
        digest_uri: "/json_rpc".to_string(),
        method: "POST".to_string(),
        cnonce: "MWI5ZjNlNTc3ZDBhNTUxMWU1NGZmYmI3YzE5YWQ4ODE=".to_string(),
        nonce_count: 1,
    };
    c.bench_function("digest_md5", |b| {
        b.iter(|| black_box(challenge.digest(black_box(&input)).unwrap()))
    });
}

/// Probe-every-time against cached challenges over an in-process server.
fn benchmark_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let server: Arc<dyn RoundTrip> = Arc::new(Server);

    let uncached = DigestTransport::new("john", "hello").with_transport(server.clone());
    let cached = CachedDigestTransport::new("john", "hello")
        .unwrap()
        .with_transport(server);

    let mut group = c.benchmark_group("round_trip");
    group.bench_function("uncached", |b| {
        b.to_async(&rt).iter(|| async {
            let req = Request::get("http://example.com/").body(RequestBody::empty()).unwrap();
            black_box(uncached.round_trip(req).await.unwrap())
        })
    });
    group.bench_function("cached", |b| {
        b.to_async(&rt).iter(|| async {
            let req = Request::get("http://example.com/").body(RequestBody::empty()).unwrap();
            black_box(cached.round_trip(req).await.unwrap())
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_digest, benchmark_round_trip);
criterion_main!(benches);
