use std::path::Path;
use std::sync::Arc;

use jarvis_gate::{
    AlwaysDeny, Category, ConfirmationDecision, ConfirmationGate, ConfirmationHandler,
    ConfirmationRequest, ScriptedConfirmation, WhitelistStore,
};
use jarvis_resilience::DegradedState;
use jarvis_tools::{ActionExecutor, ActionRequest, ActionResult, ToolsConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tools_config(allowed: &[&str], commands: &[&str]) -> ToolsConfig {
    let mut config = ToolsConfig {
        allowed_directories: allowed.iter().map(|s| (*s).to_owned()).collect(),
        command_whitelist: commands.iter().map(|s| (*s).to_owned()).collect(),
        ..ToolsConfig::default()
    };
    config.fetch.allow_private_hosts = true;
    config
}

fn executor(
    config: &ToolsConfig,
    store: WhitelistStore,
    handler: Arc<dyn ConfirmationHandler>,
) -> ActionExecutor {
    let gate = ConfirmationGate::new(Arc::new(store)).with_handler(handler);
    ActionExecutor::new(config, Arc::new(gate), Arc::new(DegradedState::new()))
}

fn file_request(operation: &str, path: &Path) -> ActionRequest {
    serde_json::from_value(serde_json::json!({
        "kind": "file_operation",
        "operation": operation,
        "path": path.display().to_string(),
    }))
    .unwrap()
}

#[test]
fn whitelisted_action_skips_the_handler() {
    let store = WhitelistStore::in_memory();
    store.add(&Category::Applications, "firefox").unwrap();
    let handler = Arc::new(ScriptedConfirmation::default());
    let gate = ConfirmationGate::new(Arc::new(store)).with_handler(handler.clone());

    let decision = gate.authorize(&ConfirmationRequest::new(
        Category::Applications,
        "Launch: firefox",
        "firefox",
    ));
    assert_eq!(decision, ConfirmationDecision::ONCE);
    assert_eq!(handler.prompt_count(), 0);
}

#[test]
fn forced_action_always_prompts() {
    let store = WhitelistStore::in_memory();
    store.add(&Category::FileOperations, "delete_file:/tmp").unwrap();
    let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::REMEMBER]));
    let gate = ConfirmationGate::new(Arc::new(store)).with_handler(handler.clone());

    let decision = gate.authorize(
        &ConfirmationRequest::new(
            Category::FileOperations,
            "delete_file on /tmp/a",
            "delete_file:/tmp",
        )
        .forced(true),
    );
    assert!(decision.execute);
    assert_eq!(handler.prompt_count(), 1);
}

#[tokio::test]
async fn path_outside_sandbox_is_denied_without_prompt() {
    let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
    let exec = executor(
        &tools_config(&["/tmp"], &["ls", "rm"]),
        WhitelistStore::in_memory(),
        handler.clone(),
    );

    let result = exec
        .execute(&file_request("delete_file", Path::new("/etc/passwd")))
        .await;
    assert!(matches!(result, ActionResult::Denied(_)), "{result}");
    assert!(result.to_string().contains("not in allowed directories"));
    assert_eq!(handler.prompt_count(), 0);
    assert!(Path::new("/etc/passwd").exists());
}

#[tokio::test]
async fn command_outside_allow_list_is_denied_without_prompt() {
    let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
    let exec = executor(
        &tools_config(&["/tmp"], &["ls", "rm"]),
        WhitelistStore::in_memory(),
        handler.clone(),
    );

    let result = exec
        .execute(&ActionRequest::LaunchApplication {
            application: "vim".into(),
            args: vec![],
        })
        .await;
    assert!(matches!(result, ActionResult::Denied(_)), "{result}");
    assert!(result.to_string().contains("'vim' is not in whitelist"));
    assert_eq!(handler.prompt_count(), 0);
}

#[tokio::test]
async fn dangerous_command_prompts_even_when_whitelisted() {
    let store = WhitelistStore::in_memory();
    store.add(&Category::Applications, "rm -rf /tmp/x").unwrap();
    let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::DENY]));
    let exec = executor(&tools_config(&["/tmp"], &["ls", "rm"]), store, handler.clone());

    let result = exec
        .execute(&ActionRequest::LaunchApplication {
            application: "rm".into(),
            args: vec!["-rf".into(), "/tmp/x".into()],
        })
        .await;
    assert!(matches!(result, ActionResult::Cancelled(_)), "{result}");
    assert_eq!(handler.prompt_count(), 1);
    assert!(handler.prompts()[0].0.contains("DANGEROUS"));
}

#[tokio::test]
async fn remembered_domain_is_not_prompted_again() {
    let server = MockServer::start().await;
    for page in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<html><body><p>page {page}</p></body></html>")),
            )
            .mount(&server)
            .await;
    }

    let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::REMEMBER]));
    let store = WhitelistStore::in_memory();
    let exec = executor(&tools_config(&["/tmp"], &["ls"]), store, handler.clone());

    let first = exec
        .execute(&ActionRequest::FetchWebPage {
            url: format!("{}/a", server.uri()),
        })
        .await;
    assert!(first.is_success(), "{first}");
    assert!(first.to_string().contains("page /a"));

    let second = exec
        .execute(&ActionRequest::FetchWebPage {
            url: format!("{}/b", server.uri()),
        })
        .await;
    assert!(second.is_success(), "{second}");
    assert_eq!(handler.prompt_count(), 1);
    assert_eq!(exec.gate().store().all(&Category::WebUrls).len(), 1);
}

#[tokio::test]
async fn remembered_file_approval_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let whitelist_path = dir.path().join("whitelist.json");
    let root = dir.path().display().to_string();
    let config = tools_config(&[root.as_str()], &["ls"]);

    let first = executor(
        &config,
        WhitelistStore::load(&whitelist_path),
        Arc::new(ScriptedConfirmation::new([ConfirmationDecision::REMEMBER])),
    );
    let result = first
        .execute(&file_request("create_file", &dir.path().join("one.txt")))
        .await;
    assert!(result.is_success(), "{result}");

    let second = executor(
        &config,
        WhitelistStore::load(&whitelist_path),
        Arc::new(AlwaysDeny),
    );
    let result = second
        .execute(&file_request("create_file", &dir.path().join("two.txt")))
        .await;
    assert!(result.is_success(), "{result}");
    assert!(dir.path().join("two.txt").exists());
}

#[tokio::test]
async fn headless_gate_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display().to_string();
    let gate = ConfirmationGate::new(Arc::new(WhitelistStore::in_memory()));
    let exec = ActionExecutor::new(
        &tools_config(&[root.as_str()], &["ls"]),
        Arc::new(gate),
        Arc::new(DegradedState::new()),
    );

    let target = dir.path().join("blocked.txt");
    let result = exec.execute(&file_request("create_file", &target)).await;
    assert!(matches!(result, ActionResult::Denied(_)), "{result}");
    assert!(result.to_string().contains("no confirmation handler"));
    assert!(!target.exists());
}
