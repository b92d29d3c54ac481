use std::time::Duration;

use template_sync::provider::{ProviderError, TemplatesProvider};
use template_sync::retry::RetryPolicy;
use template_sync_github::{GitHubProviderConfig, GitHubTemplatesProvider};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, base_path: Option<&str>) -> GitHubProviderConfig {
    GitHubProviderConfig {
        owner: "test-owner".into(),
        repo: "sp-templates".into(),
        branch: "main".into(),
        base_path: base_path.map(|s| s.into()),
        token: None,
        api_base_url: Some(server.uri()),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

async fn mount_templates_fixture(server: &MockServer) {
    let fixture = include_str!("fixtures/contents_templates.json");

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn list_returns_files_and_folders_relative_to_base_path() {
    let server = MockServer::start().await;
    mount_templates_fixture(&server).await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")));
    let items = provider.list("").await.unwrap();

    let paths: Vec<&str> = items.iter().map(|i| i.path().as_str()).collect();
    assert_eq!(paths, vec!["provisioning.xml", "site"]);
    assert!(!items[0].is_folder());
    assert!(items[1].is_folder(), "dir entries become folders");
}

#[tokio::test]
async fn list_skips_symlinks_and_submodules() {
    let server = MockServer::start().await;
    mount_templates_fixture(&server).await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")));
    let items = provider.list("").await.unwrap();

    assert!(
        items.iter().all(|i| i.path().as_str() != "legacy-link"),
        "symlink entries have no mirrored representation"
    );
}

#[tokio::test]
async fn list_addresses_subdirectories_under_base_path() {
    let server = MockServer::start().await;
    let fixture = include_str!("fixtures/contents_site.json");

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates/site"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(&server)
        .await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")));
    let items = provider.list("site").await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path().as_str(), "site/team-site.xml");
}

#[tokio::test]
async fn list_missing_path_is_an_empty_directory() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates/nowhere"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")));
    let items = provider.list("nowhere").await.unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn list_follows_pagination_links() {
    let server = MockServer::start().await;
    let page_one = include_str!("fixtures/contents_templates.json");
    let page_two = include_str!("fixtures/contents_page_two.json");

    // Mounted first so the page=2 request is matched before the generic mock.
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page_two, "application/json"))
        .mount(&server)
        .await;

    let next = format!(
        "<{}/repos/test-owner/sp-templates/contents/templates?ref=main&per_page=100&page=2>; rel=\"next\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(page_one, "application/json")
                .insert_header("link", next.as_str()),
        )
        .mount(&server)
        .await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")));
    let items = provider.list("").await.unwrap();

    let paths: Vec<&str> = items.iter().map(|i| i.path().as_str()).collect();
    assert_eq!(paths, vec!["provisioning.xml", "site", "theme.json"]);
}

#[tokio::test]
async fn list_without_base_path_uses_repo_root() {
    let server = MockServer::start().await;
    let fixture = r#"[{"name": "a.xml", "path": "a.xml", "type": "file", "size": 3,
                      "download_url": "https://raw.example.com/a.xml"}]"#;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(&server)
        .await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, None));
    let items = provider.list("").await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path().as_str(), "a.xml");
}

#[tokio::test]
async fn list_sends_bearer_token_when_configured() {
    let server = MockServer::start().await;
    let fixture = include_str!("fixtures/contents_templates.json");

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .and(header("Authorization", "Bearer ghp_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server, Some("templates"));
    config.token = Some("ghp_secret".into());

    let provider = GitHubTemplatesProvider::new(config);
    provider.list("").await.unwrap();
}

#[tokio::test]
async fn list_retries_after_rate_limit_and_succeeds() {
    let server = MockServer::start().await;
    let fixture = include_str!("fixtures/contents_templates.json");

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("retry-after", "0")
                .insert_header("x-ratelimit-remaining", "0"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(&server)
        .await;

    let provider =
        GitHubTemplatesProvider::new(config_for(&server, Some("templates"))).with_retry(fast_retry());
    let items = provider.list("").await.unwrap();

    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn list_surfaces_rate_limit_after_repeated_throttling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("retry-after", "0")
                .insert_header("x-ratelimit-remaining", "0"),
        )
        .mount(&server)
        .await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")))
        .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));
    let result = provider.list("").await;

    assert!(matches!(result, Err(ProviderError::RateLimited(_))));
}

#[tokio::test]
async fn list_plain_forbidden_is_not_treated_as_throttling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/sp-templates/contents/templates"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHubTemplatesProvider::new(config_for(&server, Some("templates")));
    let result = provider.list("").await;

    assert!(matches!(result, Err(ProviderError::Network(_))));
}

#[tokio::test]
async fn clone_destination_capability_is_declined() {
    let server = MockServer::start().await;
    let provider = GitHubTemplatesProvider::new(config_for(&server, None));
    let source = template_sync::test_support::MemoryProvider::source("src");

    let result = provider
        .clone_from(&source, &template_sync::progress::NoProgress)
        .await;

    assert!(matches!(
        result,
        Err(template_sync::engine::SyncError::ReadOnlyDestination(_))
    ));
}

#[tokio::test]
async fn list_handles_network_error() {
    let config = GitHubProviderConfig {
        owner: "test-owner".into(),
        repo: "sp-templates".into(),
        branch: "main".into(),
        base_path: None,
        token: None,
        api_base_url: Some("http://127.0.0.1:1".into()),
    };

    let provider = GitHubTemplatesProvider::new(config);
    let result = provider.list("").await;

    assert!(matches!(result, Err(ProviderError::Network(_))));
}
