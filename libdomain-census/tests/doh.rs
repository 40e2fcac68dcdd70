use libdomain_census::{
    resolver::{DnsTransport, ResolverEndpoint, ResolverError},
    DohTransport, ResolverPool, ResolverSpec,
};
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn spec(name: &str, server: &MockServer) -> ResolverSpec {
    ResolverSpec {
        name: name.into(),
        url: format!("{}/dns-query", server.uri()),
    }
}

fn transport(timeout: Duration) -> DohTransport {
    DohTransport::new(reqwest::Client::new(), timeout, 0)
}

async fn answer(server: &MockServer, domain: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/dns-query"))
        .and(query_param("name", domain))
        .and(query_param("type", "NS"))
        .and(header("accept", "application/dns-json"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn rcode(status: u32) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Status": status, "Answer": [] }))
}

#[tokio::test]
async fn rcodes_map_to_presence() {
    let server = MockServer::start().await;
    answer(&server, "taken.com", rcode(0)).await;
    answer(&server, "free.com", rcode(3)).await;
    answer(&server, "broken.com", rcode(2)).await;

    let endpoint = ResolverEndpoint::from(spec("mock", &server));
    let doh = transport(Duration::from_secs(2));

    assert!(doh.lookup(&endpoint, "taken.com").await.unwrap());
    assert!(!doh.lookup(&endpoint, "free.com").await.unwrap());
    assert!(matches!(
        doh.lookup(&endpoint, "broken.com").await,
        Err(ResolverError::Rcode { rcode: 2, .. })
    ));
}

#[tokio::test]
async fn http_and_body_failures_are_resolver_errors() {
    let server = MockServer::start().await;
    answer(&server, "limited.com", ResponseTemplate::new(429)).await;
    answer(&server, "garbled.com", ResponseTemplate::new(200).set_body_string("<html>")).await;
    answer(
        &server,
        "slow.com",
        rcode(0).set_delay(Duration::from_millis(500)),
    )
    .await;

    let endpoint = ResolverEndpoint::from(spec("mock", &server));
    let doh = transport(Duration::from_millis(100));

    assert!(matches!(
        doh.lookup(&endpoint, "limited.com").await,
        Err(ResolverError::Status { status: 429, .. })
    ));
    assert!(matches!(
        doh.lookup(&endpoint, "garbled.com").await,
        Err(ResolverError::Malformed { .. })
    ));
    assert!(matches!(
        doh.lookup(&endpoint, "slow.com").await,
        Err(ResolverError::Timeout { .. })
    ));
}

#[tokio::test]
async fn pool_falls_back_to_a_healthy_resolver() {
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    let up = MockServer::start().await;
    answer(&up, "taken.com", rcode(0)).await;

    let mut pool = ResolverPool::new(
        vec![spec("down", &down), spec("up", &up)],
        transport(Duration::from_secs(2)),
    )
    .unwrap();

    assert!(pool.query("taken.com").await.unwrap().found);
    assert_eq!(pool.active().name, "up");
    assert!(pool.endpoints()[0].is_degraded);
    assert_eq!(pool.active().queries_since_rotation, 1);
}

#[tokio::test]
async fn pool_reports_exhaustion_when_every_resolver_fails() {
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;

    let mut pool = ResolverPool::new(
        vec![spec("first", &down), spec("second", &down)],
        transport(Duration::from_secs(2)),
    )
    .unwrap();

    let err = pool.query("taken.com").await.unwrap_err();
    assert!(matches!(err, ResolverError::Exhausted { attempts: 2, .. }));
}
