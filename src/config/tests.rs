use super::secrets::{GITHUB_ACCESS_TOKEN_VAR, optional_env, require_env};
use super::*;
use serial_test::serial;

fn set_env(name: &str, value: &str) {
    // SAFETY: env-mutating tests are serialized with #[serial].
    unsafe { std::env::set_var(name, value) };
}

fn remove_env(name: &str) {
    // SAFETY: env-mutating tests are serialized with #[serial].
    unsafe { std::env::remove_var(name) };
}

#[test]
#[serial]
fn missing_required_env_is_an_error() {
    remove_env(GITHUB_ACCESS_TOKEN_VAR);

    let result = IngestSecrets::from_env();
    assert!(matches!(
        result,
        Err(ConfigError::MissingEnv(GITHUB_ACCESS_TOKEN_VAR))
    ));
}

#[test]
#[serial]
fn blank_env_counts_as_missing() {
    set_env("PYPSA_HELPER_TEST_BLANK", "   ");
    assert_eq!(optional_env("PYPSA_HELPER_TEST_BLANK"), None);
    assert!(require_env("PYPSA_HELPER_TEST_BLANK").is_err());
    remove_env("PYPSA_HELPER_TEST_BLANK");
}

#[test]
#[serial]
fn bot_secrets_require_both_tokens() {
    set_env("DISCORD_BOT_TOKEN", "discord-token");
    remove_env("GOOGLE_API_KEY");
    assert!(matches!(
        BotSecrets::from_env(),
        Err(ConfigError::MissingEnv("GOOGLE_API_KEY"))
    ));

    set_env("GOOGLE_API_KEY", "google-key");
    let secrets = BotSecrets::from_env().expect("both tokens are set");
    assert_eq!(secrets.discord_token, "discord-token");
    assert_eq!(secrets.google_api_key, "google-key");

    // Debug output never leaks the values
    let rendered = format!("{:?}", secrets);
    assert!(!rendered.contains("discord-token"));
    assert!(!rendered.contains("google-key"));

    remove_env("DISCORD_BOT_TOKEN");
    remove_env("GOOGLE_API_KEY");
}

#[test]
#[serial]
fn distributor_env_overrides() {
    set_env("GITHUB_REPO_OWNER", "someone-else");
    remove_env("GITHUB_REPO_NAME");

    let config = DistributorConfig::default().with_env_overrides();
    assert_eq!(config.owner, "someone-else");
    assert_eq!(config.repo, "pypsa-helper-bot");

    remove_env("GITHUB_REPO_OWNER");
}
