use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use synergy::api::{router, AppState};
use synergy::config::{ApiConfig, Config, DataConfig, MarketplaceConfig, MatchConfig, Pacing};
use synergy::marketplace::{MarketplaceChecker, SaleStatus};
use synergy::store::FileResultStore;
use synergy::SynergyService;
use tower::ServiceExt;

struct NothingListed;

impl MarketplaceChecker for NothingListed {
    async fn check(&self, _address: &str) -> synergy::Result<SaleStatus> {
        Ok(SaleStatus {
            is_on_sale: false,
            price: None,
        })
    }
}

fn api_config() -> ApiConfig {
    ApiConfig {
        port: 3000,
        host: "127.0.0.1".to_string(),
        request_timeout: Duration::from_secs(30),
        cors_enabled: true,
        result_limit: 1,
    }
}

fn app(dir: &Path) -> Router {
    std::fs::write(
        dir.join("attributes_power_data.json"),
        json!({
            "attributes_power": { "attributes": {
                "Skin Tone": { "Martian": "Common" },
                "Clothing": { "Gold Cape": "Epic", "Golden Crown": "Epic", "Gold Ring": "Common" }
            }}
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("all_nft_info.json"),
        json!({ "nfts": [
            { "index": 0, "address": "0:aaa", "attributes": [
                { "trait_type": "Skin Tone", "value": "Martian" },
                { "trait_type": "Clothing", "value": "Gold Cape" },
                { "trait_type": "Clothing", "value": "Golden Crown" }
            ]},
            { "index": 1, "address": "0:bbb", "attributes": [
                { "trait_type": "Clothing", "value": "Gold Cape" },
                { "trait_type": "Clothing", "value": "Gold Ring" }
            ]}
        ]})
        .to_string(),
    )
    .unwrap();

    let config = Config {
        data: DataConfig::in_dir(dir),
        api: api_config(),
        marketplace: MarketplaceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(1),
            pacing: Pacing::immediate(),
        },
        matching: MatchConfig {
            slow_match_warn: Duration::from_secs(1),
        },
    };
    let store = Arc::new(FileResultStore::new(&config.data.user_files_dir));
    let service = SynergyService::with_parts(config, store, NothingListed);

    router(Arc::new(AppState { service }), &api_config())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn search_flow() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::POST, "/api/synergy/rebuild", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["synergyCount"], 1);

    let (status, body) = send(&app, Method::GET, "/api/sort/data?user_id=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["skinTones"][0]["name"], "Martian");
    assert_eq!(body["data"]["synergyLevels"], json!([2, 3]));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sort/execute",
        Some(json!({ "userId": "7", "synergyLevel": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalResults"], 2);
    // Web responses are capped by the configured limit
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["results"][0]["synergyScore"], 2);

    let (status, body) = send(&app, Method::GET, "/api/sort/results/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["main"]["metadata"]["nftsCount"], 2);
    assert!(body["data"]["onSale"].is_null());

    let (status, _) = send(&app, Method::DELETE, "/api/sort/results/7/main", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/sort/results/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn invalid_level_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sort/execute",
        Some(json!({ "synergyLevel": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_delete_kind_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, _) = send(&app, Method::DELETE, "/api/sort/results/7/everything", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn nft_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::GET, "/api/sort/nft/bbb", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nft"]["index"], 1);
    assert_eq!(body["data"]["attributes"][1]["rarity"], "Common");

    let (status, _) = send(&app, Method::GET, "/api/sort/nft/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_without_map_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::GET, "/api/sort/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["collection"]["totalNfts"], 2);
    assert_eq!(body["data"]["synergies"]["totalSynergies"], 0);

    let (status, body) = send(&app, Method::GET, "/api/synergy/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalSynergies"], 0);
}
