mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use common::{script_context, script_env, Call, FakePlatform};
use zapd::zapscript::link::{self, LinkAction, LinkError, MediaParams, ZAPLINK_MIME};
use zapd::zapscript::{run_script, ScriptError};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn zaplink(body: impl Into<String>) -> Response {
    ([(header::CONTENT_TYPE, ZAPLINK_MIME)], body.into()).into_response()
}

fn zapscript_doc(scripts: &[&str]) -> String {
    let actions: Vec<_> = scripts
        .iter()
        .map(|s| serde_json::json!({ "method": "ZapScript", "params": { "zapscript": s } }))
        .collect();
    serde_json::json!({ "version": 1, "actions": actions }).to_string()
}

fn link_routes() -> Router {
    Router::new()
        .route("/launch", get(|| async { zaplink(zapscript_doc(&["**launch.system:nes"])) }))
        .route(
            "/first-only",
            get(|| async { zaplink(zapscript_doc(&["**launch.system:nes", "**launch.system:snes"])) }),
        )
        .route(
            "/keys",
            get(|| async { zaplink(zapscript_doc(&["**launch.system:nes||**input.keyboard:a"])) }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, [(header::CONTENT_TYPE, ZAPLINK_MIME)], "{}") }),
        )
        .route("/plain", get(|| async { "not a link" }))
        .route("/untyped", get(|| async { Response::new(Body::from("{}")) }))
        .route("/malformed", get(|| async { zaplink("{not json") }))
        .route("/empty", get(|| async { zaplink(r#"{"version":1,"actions":[]}"#) }))
        .route(
            "/unknown",
            get(|| async { zaplink(r#"{"actions":[{"method":"teleport","params":{}}]}"#) }),
        )
}

// ── Fetching ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_reports_each_failure_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = script_context(Arc::new(FakePlatform::new()), dir.path());
    let base = serve(link_routes()).await;

    let err = link::fetch(&ctx, &format!("{base}/missing")).await.unwrap_err();
    assert!(matches!(err, LinkError::Status(s) if s == StatusCode::NOT_FOUND), "{err}");

    let err = link::fetch(&ctx, &format!("{base}/plain")).await.unwrap_err();
    assert!(matches!(err, LinkError::ContentType(ref t) if t.starts_with("text/plain")), "{err}");

    let err = link::fetch(&ctx, &format!("{base}/untyped")).await.unwrap_err();
    assert!(matches!(err, LinkError::MissingContentType), "{err}");

    let err = link::fetch(&ctx, &format!("{base}/malformed")).await.unwrap_err();
    assert!(matches!(err, LinkError::Malformed(_)), "{err}");

    let err = link::fetch(&ctx, &format!("{base}/empty")).await.unwrap_err();
    assert!(matches!(err, LinkError::NoActions), "{err}");

    let err = link::fetch(&ctx, &format!("{base}/unknown")).await.unwrap_err();
    assert!(matches!(err, LinkError::UnknownAction(ref m) if m == "teleport"), "{err}");
}

#[tokio::test]
async fn action_method_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = script_context(Arc::new(FakePlatform::new()), dir.path());
    let base = serve(link_routes()).await;

    match link::fetch(&ctx, &format!("{base}/launch")).await.unwrap() {
        LinkAction::ZapScript(script) => assert_eq!(script, "**launch.system:nes"),
        other => panic!("unexpected action {other:?}"),
    }
}

// ── Running linked scripts ────────────────────────────────────────────────────

#[tokio::test]
async fn linked_script_runs_only_the_first_action() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let ctx = script_context(Arc::clone(&platform), dir.path());
    let (env, _rx) = script_env(false);
    let base = serve(link_routes()).await;

    let effect = run_script(&ctx, &env, &format!("{base}/first-only")).await.unwrap();
    assert!(effect.media_changed);
    assert_eq!(platform.calls(), vec![Call::LaunchSystem("nes".into())]);
}

#[tokio::test]
async fn linked_scripts_are_untrusted() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let ctx = script_context(Arc::clone(&platform), dir.path());
    // A local token: only the linked document is remote.
    let (env, _rx) = script_env(false);
    let base = serve(link_routes()).await;

    let abort = run_script(&ctx, &env, &format!("{base}/keys")).await.unwrap_err();
    assert_eq!(abort.index, 1);
    match &abort.source {
        ScriptError::Linked(inner) => {
            assert_eq!(inner.index, 2);
            assert!(matches!(inner.source, ScriptError::PermissionDenied(_)));
        }
        other => panic!("unexpected error {other}"),
    }
    // The launch that ran before the denied command still counts.
    assert!(abort.effect.media_changed);
    assert_eq!(platform.calls(), vec![Call::LaunchSystem("nes".into())]);
}

// ── Media installs ────────────────────────────────────────────────────────────

fn media_routes(hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/files/mario.nes",
            get(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    b"NES\x1a".to_vec()
                }
            }),
        )
        .route(
            "/gone/lost.nes",
            get(|| async { StatusCode::NOT_FOUND }),
        )
        .route(
            "/media",
            get(|headers: HeaderMap| async move {
                let host = headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let doc = serde_json::json!({
                    "actions": [{
                        "method": "media",
                        "params": {
                            "name": "Mario",
                            "system": "nes",
                            "url": format!("http://{host}/files/mario.nes"),
                        }
                    }]
                });
                zaplink(doc.to_string())
            }),
        )
}

#[tokio::test]
async fn media_outside_the_safe_list_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = script_context(Arc::new(FakePlatform::new()), dir.path());
    let params = MediaParams {
        name: "Mario".into(),
        system: "nes".into(),
        url: Some("http://127.0.0.1:9/files/mario.nes".into()),
    };

    let err = link::install_media(&ctx, &params).await.unwrap_err();
    assert!(matches!(err, LinkError::NotSafe(_)), "{err}");
    assert!(!dir.path().join("games/NES/mario.nes").exists());
}

#[tokio::test]
async fn media_needs_a_url_and_a_launcher() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = script_context(Arc::new(FakePlatform::new()), dir.path());

    let no_url = MediaParams {
        name: "Mario".into(),
        system: "nes".into(),
        url: None,
    };
    assert!(matches!(
        link::install_media(&ctx, &no_url).await,
        Err(LinkError::MissingUrl)
    ));

    let no_launcher = MediaParams {
        name: "Sonic".into(),
        system: "genesis".into(),
        url: Some(format!("{}/sonic.md", link::MEDIA_SAFE_LIST[0])),
    };
    assert!(matches!(
        link::install_media(&ctx, &no_launcher).await,
        Err(LinkError::NoLauncher(system)) if system == "genesis"
    ));
}

#[tokio::test]
async fn media_link_downloads_once_and_launches() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let mut ctx = script_context(Arc::clone(&platform), dir.path());
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(media_routes(Arc::clone(&hits))).await;
    ctx.media_safe_list = vec![base.clone()];
    let (env, _rx) = script_env(false);

    let effect = run_script(&ctx, &env, &format!("{base}/media")).await.unwrap();
    assert!(effect.media_changed);

    let installed = dir.path().join("games/NES/mario.nes");
    assert_eq!(std::fs::read(&installed).unwrap(), b"NES\x1a");
    assert_eq!(platform.calls(), vec![Call::LaunchMedia(installed.clone())]);
    assert!(!dir.path().join("tmp/loader.json").exists());
    assert!(dir.path().join("tmp/.loader-complete").exists());

    // Already installed: launch again without downloading.
    run_script(&ctx, &env, &format!("{base}/media")).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(platform.calls().len(), 2);
}

#[tokio::test]
async fn failed_download_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = script_context(Arc::new(FakePlatform::new()), dir.path());
    let base = serve(media_routes(Arc::new(AtomicUsize::new(0)))).await;
    ctx.media_safe_list = vec![base.clone()];

    let params = MediaParams {
        name: "Lost".into(),
        system: "nes".into(),
        url: Some(format!("{base}/gone/lost.nes")),
    };
    let err = link::install_media(&ctx, &params).await.unwrap_err();
    assert!(matches!(err, LinkError::DownloadStatus(s) if s == StatusCode::NOT_FOUND), "{err}");
    assert!(!dir.path().join("games/NES/lost.nes").exists());
    assert!(!dir.path().join("tmp/loader.json").exists());
}

fn self_link_routes() -> Router {
    Router::new().route(
        "/loop",
        get(|headers: HeaderMap| async move {
            let host = headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let url = format!("http://{host}/loop");
            zaplink(zapscript_doc(&[url.as_str()]))
        }),
    )
}

#[tokio::test]
async fn links_inside_linked_scripts_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let ctx = script_context(Arc::clone(&platform), dir.path());
    let (env, _rx) = script_env(false);
    let base = serve(self_link_routes()).await;

    let abort = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        run_script(&ctx, &env, &format!("{base}/loop")),
    )
    .await
    .expect("self-referencing link should fail quickly")
    .unwrap_err();

    assert_eq!(abort.index, 1);
    match &abort.source {
        ScriptError::Linked(inner) => {
            assert_eq!(inner.index, 1);
            assert!(
                matches!(&inner.source, ScriptError::Link(LinkError::Nested(url)) if url.ends_with("/loop")),
                "{}",
                inner.source
            );
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn safe_list_matches_at_path_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = script_context(Arc::new(FakePlatform::new()), dir.path());

    for url in [
        "https://cdn.zaparoo.com.evil.example/mario.nes",
        "https://cdn.zaparoo.comx/mario.nes",
    ] {
        let params = MediaParams {
            name: "Mario".into(),
            system: "nes".into(),
            url: Some(url.into()),
        };
        let err = link::install_media(&ctx, &params).await.unwrap_err();
        assert!(matches!(err, LinkError::NotSafe(_)), "{url}: {err}");
    }
}
