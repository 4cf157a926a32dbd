//! Cross-crate tests: CLI handling, config files, and a full request through
//! the Ollama engine, pipeline and gateway against a stand-in engine server

use axum::{routing::post, Json, Router};
use bicameral::cli::{evaluate_consent, load_config, Cli, Commands};
use bicameral_core::{AuthMode, BicameralConfig, BindMode};
use bicameral_gateway::{router, Gateway};
use bicameral_llm::OllamaEngine;
use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ===========================================================================
// CLI
// ===========================================================================

#[test]
fn serve_flags_parse() {
    let cli = Cli::try_parse_from([
        "bicameral", "--config", "custom.toml", "serve", "--port", "9000", "--bind", "lan", "--no-auth",
    ])
    .unwrap();
    assert_eq!(cli.config.to_str(), Some("custom.toml"));
    let Some(Commands::Serve(args)) = cli.command else {
        panic!("expected serve");
    };

    let mut config = BicameralConfig::default();
    args.apply(&mut config, None);
    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.gateway.bind, BindMode::Lan);
    assert_eq!(config.gateway.auth.mode, AuthMode::None);
}

#[test]
fn consent_subcommand_parses() {
    let cli = Cli::try_parse_from(["bicameral", "consent", "wipe memory", "--system"]).unwrap();
    match cli.command {
        Some(Commands::Consent { text, output, system }) => {
            assert_eq!(text, "wipe memory");
            assert!(output.is_none());
            assert!(system);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn no_subcommand_is_allowed() {
    let cli = Cli::try_parse_from(["bicameral"]).unwrap();
    assert!(cli.command.is_none());
}

// ===========================================================================
// Offline consent
// ===========================================================================

#[test]
fn offline_consent_matches_the_gate() {
    let config = BicameralConfig::default();

    let denied = evaluate_consent(&config, "please delete the vault", None, false);
    assert!(!denied.authorized);
    assert_eq!(denied.matched_block.as_deref(), Some("delete"));
    assert_eq!(denied.matched_resource.as_deref(), Some("vault"));

    let overridden = evaluate_consent(&config, "shutdown the display", None, true);
    assert!(overridden.authorized);
    assert!(overridden.override_reason.is_some());

    let by_output = evaluate_consent(&config, "any ideas?", Some("Just format the drive."), false);
    assert!(!by_output.authorized);
}

#[test]
fn consent_terms_come_from_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bicameral.toml");
    std::fs::write(
        &path,
        r#"
[consent]
hard_block_terms = ["banana"]
protected_resource_terms = []
restricted_terms = []
"#,
    )
    .unwrap();

    let config = load_config(&path);
    assert!(!evaluate_consent(&config, "one banana please", None, false).authorized);
    assert!(evaluate_consent(&config, "delete the vault", None, false).authorized);
}

// ===========================================================================
// End to end
// ===========================================================================

/// Stand-in for an Ollama server: answers by which system prompt it sees.
async fn stand_in_engine() -> String {
    async fn generate(Json(body): Json<Value>) -> Json<Value> {
        let system = body["system"].as_str().unwrap_or_default();
        let text = if system.contains("left hemisphere") {
            "Bring an umbrella.\nconfidence: 0.8"
        } else if system.contains("right hemisphere") {
            "bring an umbrella.\nconfidence: 60%"
        } else {
            "Rain is likely this afternoon."
        };
        Json(json!({ "model": body["model"], "response": text, "done": true }))
    }

    let app = Router::new().route("/api/generate", post(generate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post_json(gateway: &Arc<Gateway>, uri: &str, body: Value) -> (u16, Value) {
    let request = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let response = router(gateway.clone()).oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn think_through_every_layer() {
    let mut config = BicameralConfig::default();
    config.gateway.auth.mode = AuthMode::None;
    config.engine.base_url = stand_in_engine().await;
    config.engine.model = "stand-in".into();

    let engine = Arc::new(OllamaEngine::from_config(&config.engine));
    let gateway = Arc::new(Gateway::new(&config, engine));

    let (status, body) = post_json(&gateway, "/think", json!({ "message": "will it rain?" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["authorized"], true);
    assert_eq!(body["response"], "Bring an umbrella.");

    let verdict = &body["verdict"];
    assert_eq!(verdict["consensus"], "resolved");
    assert_eq!(verdict["confidence"], 0.8);
    assert_eq!(verdict["source_verdicts"]["right"]["confidence"], 0.6);
    assert_eq!(verdict["enhancement"]["applied"], true);
    assert_eq!(verdict["enhancement"]["insights"], "Rain is likely this afternoon.");
    assert_eq!(verdict["enhancement"]["model"], "stand-in");
    assert_eq!(body["seal"].as_str().unwrap().len(), 64);
    assert_eq!(gateway.status().active_connections, 0);
}

#[tokio::test]
async fn unreachable_engine_surfaces_as_503() {
    let mut config = BicameralConfig::default();
    config.gateway.auth.mode = AuthMode::None;
    config.engine.base_url = "http://127.0.0.1:1".into();

    let engine = Arc::new(OllamaEngine::from_config(&config.engine));
    let gateway = Arc::new(Gateway::new(&config, engine));

    let (status, body) = post_json(&gateway, "/think", json!({ "message": "hello" })).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"]["cause"], "HarmonizationImpossible");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("left") && message.contains("right"));
}
