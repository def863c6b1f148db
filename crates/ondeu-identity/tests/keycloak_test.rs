//! Keycloak client tests against a mock HTTP server.
//!
//! Tokens are signed with the RSA key in `fixtures/test_rsa.pem`; the mock
//! certs endpoint publishes the matching public components.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use ondeu_core::{Error, IdentityProvider};
use ondeu_identity::{KeycloakClient, KeycloakConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY_PEM: &[u8] = include_bytes!("fixtures/test_rsa.pem");
const TEST_KEY_N: &str = "wY69tZdEPV-RBYHyrY-Bm0X0IKteQ_VMP80ejy1iACNIfh7Y3E4dNcoeTLR0MeTHd_zvBorGncrMD98X_Xlcvplp20FgtM1ZYIT760gJVDX82iTOBwqyEsnu0VcYSZf8EzfKVecCt4dG1CTazc9vyAW0evAI-zIevDzcpyF0WIDz8mCgXT6iZzwKUZyt52bqrSSBn1aopdaR1rorxMEPTCsBkv8-JkVhg3WxA1Bvqoy2NMA__g7oW3C6d22ILSKNTaOZ_x-EDnG9uL3i3PceAkf7hERzqa4NRmc-SGm-H3tbyuoeoWujGjupJ0UTvWc3YgoVAs6gFeJ9pR2J_TjuOw";
const TEST_KEY_E: &str = "AQAB";
const CERTS_PATH: &str = "/realms/ondeu/protocol/openid-connect/certs";
const TOKEN_PATH: &str = "/realms/ondeu/protocol/openid-connect/token";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn jwks(kid: &str) -> Value {
    json!({
        "keys": [{
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": TEST_KEY_N,
            "e": TEST_KEY_E
        }]
    })
}

fn sign(kid: &str, claims: Value) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM).expect("fixture key");
    encode(&header, &claims, &key).expect("sign token")
}

fn user_claims(exp: u64) -> Value {
    json!({
        "sub": "user-1",
        "azp": "ondeu-front",
        "aud": "account",
        "exp": exp,
        "iat": exp.saturating_sub(300),
        "resource_access": { "ondeu-front": { "roles": ["student"] } }
    })
}

fn client(server: &MockServer) -> KeycloakClient {
    KeycloakClient::new(KeycloakConfig::new(server.uri(), "ondeu")).expect("client")
}

#[tokio::test]
async fn test_decode_token_verifies_against_jwks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("test-key")))
        .expect(1)
        .mount(&server)
        .await;

    let keycloak = client(&server);
    let token = sign("test-key", user_claims(now() + 300));

    let claims = keycloak.decode_token(&token).await.expect("valid token");
    assert_eq!(claims.get("sub").and_then(Value::as_str), Some("user-1"));

    // Second decode uses the cached key set.
    keycloak.decode_token(&token).await.expect("cached key");
}

#[tokio::test]
async fn test_expired_token_is_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("test-key")))
        .mount(&server)
        .await;

    let token = sign("test-key", user_claims(now() - 3600));
    let err = client(&server).decode_token(&token).await.unwrap_err();
    assert!(matches!(err, Error::Unauthenticated(_)), "got {:?}", err);
}

async fn mount_rotating_certs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("old-key")))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("rotated-key")))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_unknown_kid_refetches_key_set_once_interval_passed() {
    let server = MockServer::start().await;
    mount_rotating_certs(&server).await;

    let keycloak = KeycloakClient::new(
        KeycloakConfig::new(server.uri(), "ondeu").with_jwks_refetch_interval(Duration::ZERO),
    )
    .expect("client");

    let old = sign("old-key", user_claims(now() + 300));
    keycloak.decode_token(&old).await.expect("old key");

    let rotated = sign("rotated-key", user_claims(now() + 300));
    let claims = keycloak.decode_token(&rotated).await.expect("rotated key");
    assert_eq!(claims.get("azp").and_then(Value::as_str), Some("ondeu-front"));

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_unknown_kids_do_not_refetch_within_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("test-key")))
        .expect(1)
        .mount(&server)
        .await;

    let keycloak = client(&server);
    let good = sign("test-key", user_claims(now() + 300));
    keycloak.decode_token(&good).await.expect("valid token");

    for i in 0..20 {
        let forged = sign(&format!("bogus-{}", i), user_claims(now() + 300));
        let err = keycloak.decode_token(&forged).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)), "got {:?}", err);
    }

    // Known keys keep working from the cache.
    keycloak.decode_token(&good).await.expect("cached key");

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1, "one certs download for 21 tokens");
}

#[tokio::test]
async fn test_concurrent_misses_on_cold_cache_share_one_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks("test-key"))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let keycloak = std::sync::Arc::new(client(&server));
    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let keycloak = keycloak.clone();
            let forged = sign(&format!("bogus-{}", i), user_claims(now() + 300));
            tokio::spawn(async move { keycloak.decode_token(&forged).await })
        })
        .collect();
    for task in tasks {
        let err = task.await.expect("task").unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)), "got {:?}", err);
    }

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_garbage_and_symmetric_tokens_are_rejected() {
    let server = MockServer::start().await;
    let keycloak = client(&server);

    let err = keycloak.decode_token("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, Error::Unauthenticated(_)));

    let hs = encode(
        &Header::default(),
        &user_claims(now() + 300),
        &EncodingKey::from_secret(b"shared"),
    )
    .unwrap();
    let err = keycloak.decode_token(&hs).await.unwrap_err();
    assert!(matches!(err, Error::Unauthenticated(_)));
}

#[tokio::test]
async fn test_login_client_uses_client_credentials_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=admin-cli"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "admin-token",
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server)
        .login_client("admin-cli", "s3cret")
        .await
        .expect("login");
    assert_eq!(token.access_token, "admin-token");
    assert_eq!(token.expires_in, 300);
}

#[tokio::test]
async fn test_login_rejection_is_identity_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized_client"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .login_client("admin-cli", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Identity(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_get_client_roles_resolves_client_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/ondeu/clients"))
        .and(query_param("clientId", "ondeu-front"))
        .and(header("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "5f1c-internal", "clientId": "ondeu-front" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/ondeu/clients/5f1c-internal/roles"))
        .and(header("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "r1", "name": "student", "composite": false, "clientRole": true, "containerId": "5f1c-internal" },
            { "id": "r2", "name": "manager", "description": "Class managers", "composite": false, "clientRole": true, "containerId": "5f1c-internal" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let roles = client(&server)
        .get_client_roles("admin-token", "ondeu-front")
        .await
        .expect("roles");
    let names: Vec<_> = roles.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["student", "manager"]);
    assert_eq!(roles[1].description.as_deref(), Some("Class managers"));
}

#[tokio::test]
async fn test_get_client_roles_of_unknown_client_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/ondeu/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_client_roles("admin-token", "missing")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
