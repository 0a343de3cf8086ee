//! End-to-end runs against mocked Fluvius and Opinum endpoints.

use meter_domain::{CanonicalReading, MeteringPoint, ReadingBatch, TimeWindow};
use serde_json::json;
use sync_service::{
    auth::{AuthError, BearerToken, CertificateCredential, OAuthTokenProvider, PasswordCredential},
    config::AppConfig,
    pipeline::{PipelineError, RunOutcome, Sink, Source, SyncPipeline, TokenKind},
    sinks::OpinumSink,
    sources::{FluviusSource, ShortUrlClient, ShortUrlRequest},
    transform::Normalizer,
};
use time::macros::{date, datetime};
use time_tz::timezones::db::europe::BRUSSELS;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EAN_A: &str = "541448820055391175";
const EAN_B: &str = "541448820055391069";

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn config(server: &MockServer, identifier_param: &str) -> AppConfig {
    let raw = format!(
        r#"
        [fluvius]
        readings_url = "{uri}/readings"
        identifier_param = "{identifier_param}"
        subscription_key = "sub-key"
        short_url_endpoint = "{uri}/shortUrlIdentifier"

        [fluvius.auth]
        client_id = "fluvius-client"
        tenant_id = "tenant-1"
        authority_host = "{uri}"
        certificate_thumbprint = "95:4E:49:A8:A3:1E:D2:18:12:6B:7B:A2:60:C0:CA:70:B5:F1:03:7A"
        private_key_path = "{key}"
        certificate_path = "{cert}"
        scope = "api://fluvius/.default"

        [opinum]
        push_url = "{uri}/push"
        token_url = "{uri}/opinum/token"
        client_id = "opinum-client"
        client_secret = "s3cret"
        username = "svc@example.com"
        password = "hunter2"
        scope = "push-data"

        [[metering_points]]
        ean = "{EAN_A}"
        variable_id = 6129325

        [[metering_points]]
        ean = "{EAN_B}"
        variable_id = 6129353
        "#,
        uri = server.uri(),
        key = fixture("client.key"),
        cert = fixture("client.cer"),
    );
    toml::from_str(&raw).unwrap()
}

fn pipeline(cfg: &AppConfig) -> SyncPipeline<OAuthTokenProvider, FluviusSource, OpinumSink> {
    let http = cfg.http.client().unwrap();
    SyncPipeline {
        tokens: OAuthTokenProvider::new(
            http.clone(),
            CertificateCredential::from_config(&cfg.fluvius.auth).unwrap(),
            PasswordCredential::from_config(&cfg.opinum).unwrap(),
        ),
        source: FluviusSource::new(http.clone(), &cfg.fluvius).unwrap(),
        sink: OpinumSink::new(http, &cfg.opinum),
        normalizer: Normalizer::default(),
        registry: cfg.metering_points.clone(),
        report_unrecognized_schema: false,
    }
}

fn window() -> TimeWindow {
    TimeWindow::civil_days(date!(2025-01-15), date!(2025-01-15), BRUSSELS).unwrap()
}

async fn mount_tokens(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "source-token"
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/opinum/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sink-token",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn delivers_shape_a_and_skips_malformed_payload() {
    let server = MockServer::start().await;
    mount_tokens(&server).await;

    Mock::given(method("GET"))
        .and(path("/readings"))
        .and(query_param("eanNumber", EAN_A))
        .and(header("Authorization", "Bearer source-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "electricityMeters": [{
                    "quarterHourlyEnergy": [
                        { "timestampStart": "2025-01-15T12:00:00Z", "measurement": [{ "offtakeValue": 0.25 }] },
                        { "timestampStart": "2025-01-15T12:15:00Z", "measurement": [{ "offtakeValue": 0.5 }] }
                    ]
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/readings"))
        .and(query_param("eanNumber", EAN_B))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "meters": "not what you expected" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/push"))
        .and(header("Authorization", "Bearer sink-token"))
        .and(header("scope", "push-data"))
        .and(body_json(json!([{
            "variableId": 6129325,
            "data": [
                { "date": "2025-01-15T13:00:00+01:00", "value": 0.25 },
                { "date": "2025-01-15T13:15:00+01:00", "value": 0.5 }
            ]
        }])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let report = pipeline(&cfg).run(window()).await.unwrap();

    let outcomes: Vec<_> = report.outcomes().cloned().collect();
    assert_eq!(outcomes, vec![RunOutcome::Delivered(2), RunOutcome::SkippedEmpty]);
    assert_eq!(report.outcomes[0].point, MeteringPoint::new(EAN_A, 6129325));
}

#[tokio::test]
async fn rejected_source_token_aborts_without_fetch_or_delivery() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS700027: certificate not registered"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/opinum/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "x" })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/readings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let err = pipeline(&cfg).run(window()).await.unwrap_err();

    match err {
        PipelineError::TokenAcquisition { kind, reason } => {
            assert_eq!(kind, TokenKind::Source);
            assert!(reason.contains("AADSTS700027"));
        }
        other => panic!("expected token failure, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_failure_is_isolated_to_its_metering_point() {
    let server = MockServer::start().await;
    mount_tokens(&server).await;

    Mock::given(method("GET"))
        .and(path("/readings"))
        .and(query_param("eanNumber", EAN_A))
        .respond_with(ResponseTemplate::new(403).set_body_string("mandate revoked"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/readings"))
        .and(query_param("eanNumber", EAN_B))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "headpoint": {
                    "quarterHourlyEnergy": [
                        { "start": "2025-01-15T12:00:00Z", "measurements": [{ "offtake": { "total": { "value": 1.25 } } }] }
                    ]
                }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let report = pipeline(&cfg).run(window()).await.unwrap();

    let outcomes: Vec<_> = report.outcomes().cloned().collect();
    match &outcomes[0] {
        RunOutcome::FetchFailed(reason) => assert!(reason.contains("mandate revoked")),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert_eq!(outcomes[1], RunOutcome::Delivered(1));
}

#[tokio::test]
async fn fetch_sends_window_selectors_and_subscription_key() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/readings"))
        .and(query_param("ean", EAN_A))
        .and(query_param("PeriodType", "readTime"))
        .and(query_param("granularity", "hourly_quarterhourly"))
        .and(query_param("from", "2025-01-14T23:00:00Z"))
        .and(query_param("to", "2025-01-15T23:00:00Z"))
        .and(header("Ocp-Apim-Subscription-Key", "sub-key"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, "ean");
    let source = FluviusSource::new(cfg.http.client().unwrap(), &cfg.fluvius).unwrap();
    let payload = source
        .fetch(&BearerToken::new("tok"), &MeteringPoint::new(EAN_A, 1), &window())
        .await
        .unwrap();

    assert_eq!(payload, json!({ "data": {} }));
}

#[tokio::test]
async fn fetch_treats_any_non_200_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/readings"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let source = FluviusSource::new(cfg.http.client().unwrap(), &cfg.fluvius).unwrap();
    let res = source
        .fetch(&BearerToken::new("tok"), &MeteringPoint::new(EAN_A, 1), &window())
        .await;

    assert!(matches!(res, Err(PipelineError::Fetch { status: 204, .. })));
}

#[tokio::test]
async fn sink_accepts_only_200_and_201() {
    let server = MockServer::start().await;
    let cfg = config(&server, "eanNumber");
    let sink = OpinumSink::new(cfg.http.client().unwrap(), &cfg.opinum);
    let batch = || {
        ReadingBatch::new(
            6129325,
            vec![CanonicalReading::new(datetime!(2025-01-15 13:00:00 +01:00), 0.25).unwrap()],
        )
    };

    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(201))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
        .mount(&server)
        .await;

    let token = BearerToken::new("sink-token");
    sink.deliver(&token, batch()).await.unwrap();

    match sink.deliver(&token, batch()).await {
        Err(PipelineError::Delivery { status, body }) => {
            assert_eq!(status, 202);
            assert_eq!(body, "queued");
        }
        other => panic!("expected delivery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn password_grant_without_access_token_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/opinum/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains("username=svc%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let cred = PasswordCredential::from_config(&cfg.opinum).unwrap();
    let res = cred.acquire(&cfg.http.client().unwrap()).await;

    assert!(matches!(res, Err(AuthError::MissingAccessToken)));
}

#[tokio::test]
async fn short_url_embeds_identifier_in_consumer_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/shortUrlIdentifier"))
        .and(header("Authorization", "Bearer source-token"))
        .and(header("Ocp-Apim-Subscription-Key", "sub-key"))
        .and(body_json(json!({
            "dataAccessContractNumber": "C-100",
            "referenceNumber": "REF-7",
            "flow": "B2B",
            "dataServices": [
                { "dataServiceType": "VH_dag", "dataPeriodFrom": "2023-02-01T00:00:00Z" },
                { "dataServiceType": "VH_kwartier_uur", "dataPeriodFrom": "2023-02-01T00:00:00Z" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "shortUrlIdentifier": "a1b2c3" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let client = ShortUrlClient::new(cfg.http.client().unwrap(), &cfg.fluvius).unwrap();
    let request = ShortUrlRequest {
        contract_number: "C-100".to_string(),
        reference_number: "REF-7".to_string(),
        flow: "B2B".to_string(),
        data_period_from: "2023-02-01T00:00:00Z".to_string(),
    };

    let url = client
        .generate(&BearerToken::new("source-token"), &request)
        .await
        .unwrap();
    assert_eq!(url, "https://mijn.fluvius.be/verbruik/dienstverlener?id=a1b2c3");
}

#[tokio::test]
async fn short_url_without_identifier_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/shortUrlIdentifier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .mount(&server)
        .await;

    let cfg = config(&server, "eanNumber");
    let client = ShortUrlClient::new(cfg.http.client().unwrap(), &cfg.fluvius).unwrap();
    let request = ShortUrlRequest {
        contract_number: "C-100".to_string(),
        reference_number: "REF-7".to_string(),
        flow: "B2B".to_string(),
        data_period_from: "2023-02-01T00:00:00Z".to_string(),
    };

    let res = client.generate(&BearerToken::new("t"), &request).await;
    assert!(matches!(res, Err(PipelineError::UnexpectedResponse(_))));
}
