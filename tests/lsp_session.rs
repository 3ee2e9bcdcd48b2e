//! End-to-end LSP session against an in-process backend

mod common;

use serde_json::json;
use tempfile::TempDir;
use tower_lsp::lsp_types::Url;

use angelscript_language_server::kb::{SnapshotPayload, SnapshotStore};

use common::lsp_client::LspClient;
use common::{class, write_script};

const HERO: &str = "class AHero : APawn\n{\n}\n\nclass AOrphan : AMissing\n{\n}\n";

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "Hero.as", HERO);
    SnapshotStore::for_workspace(dir.path())
        .save(&SnapshotPayload {
            workspace_root: dir.path().to_string_lossy().into_owned(),
            debug_database_chunks: vec![json!({ "types": [class("APawn", None)] })],
            ..Default::default()
        })
        .unwrap();
    dir
}

#[tokio::test]
async fn test_session_serves_queries_and_references() {
    let dir = workspace();
    let root = Url::from_file_path(dir.path()).unwrap();
    let hero = Url::from_file_path(dir.path().join("Hero.as")).unwrap();
    let game = Url::from_file_path(dir.path().join("Game.as")).unwrap();

    let mut client = LspClient::start();
    let init = client.initialize(&root).await;
    let capabilities = &init["result"]["capabilities"];
    assert_eq!(capabilities["referencesProvider"], json!(true));
    assert_eq!(capabilities["renameProvider"], json!(true));
    assert_eq!(init["result"]["serverInfo"]["name"], "angelscript-language-server");

    client.open_document(&hero, &format!("{}\n", HERO)).await;
    let diagnostics = client.await_diagnostics(&hero).await;
    let diagnostics = diagnostics["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["message"], "Unknown base class 'AMissing' for 'AOrphan'");

    let hierarchy = client.send_request("angelscript/getTypeHierarchy", json!({ "name": "AHero" })).await;
    let result = &hierarchy["result"];
    assert_eq!(result["supers"], json!(["APawn"]));
    assert_eq!(result["sourceByClass"]["AHero"]["kind"], "script");
    assert_eq!(result["sourceByClass"]["AHero"]["startLine"], 1);
    assert_eq!(result["sourceByClass"]["APawn"]["kind"], "native");

    let search = client.send_request("angelscript/searchSymbols", json!({ "query": "Orphan" })).await;
    let labels: Vec<_> = search["result"].as_array().unwrap().iter().map(|r| r["label"].clone()).collect();
    assert!(labels.contains(&json!("AOrphan")));

    client.open_document(&game, "AHero Hero;\n").await;
    let references = client
        .send_request(
            "textDocument/references",
            json!({
                "textDocument": { "uri": hero.as_str() },
                "position": { "line": 0, "character": 8 },
                "context": { "includeDeclaration": true }
            }),
        )
        .await;
    let locations = references["result"].as_array().unwrap();
    assert_eq!(locations.len(), 2);
    assert!(locations.iter().any(|l| l["uri"] == json!(game.as_str())));

    client.shutdown().await;
}

#[tokio::test]
async fn test_query_errors_carry_jsonrpc_codes() {
    let dir = workspace();
    let root = Url::from_file_path(dir.path()).unwrap();
    let hero = Url::from_file_path(dir.path().join("Hero.as")).unwrap();

    let mut client = LspClient::start();
    client.initialize(&root).await;

    let missing = client.send_request("angelscript/getTypeHierarchy", json!({ "name": "ANope" })).await;
    assert_eq!(missing["error"]["code"], -32001);

    let blank = client.send_request("angelscript/getTypeMembers", json!({ "name": "" })).await;
    assert_eq!(blank["error"]["code"], -32602);

    client.open_document(&hero, HERO).await;
    let rename = client
        .send_request(
            "textDocument/rename",
            json!({
                "textDocument": { "uri": hero.as_str() },
                "position": { "line": 0, "character": 8 },
                "newName": "1Bad"
            }),
        )
        .await;
    assert_eq!(rename["error"]["code"], -32602);

    client.shutdown().await;
}
