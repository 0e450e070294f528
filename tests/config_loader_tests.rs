use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};

use ads_sync::config::{ConfigError, ConfigLoader};
use tempfile::TempDir;

// 32 bytes of 'a', base64 encoded
const KEY_B64: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_env() {
    let keys: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("ADS_SYNC_"))
        .collect();
    for key in keys {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).expect("failed to write env file");
}

#[test]
fn loads_defaults_for_local_profile() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", &format!("ADS_SYNC_CRYPTO_KEY={KEY_B64}\n"));

    let cfg = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect("local profile loads without app credentials");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.facebook_graph_version, "v19.0");
    assert_eq!(cfg.sync.max_pages, 1000);
    assert_eq!(cfg.sync.page_size, 500);
    assert_eq!(cfg.refresh.lookback_days, 7);
    assert_eq!(cfg.crypto_key.as_ref().map(Vec::len), Some(32));
    assert_eq!(
        cfg.graph_api_config().base_url,
        "https://graph.facebook.com/v19.0"
    );

    clear_env();
}

#[test]
fn profile_files_layer_over_base_env() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!(
            "ADS_SYNC_PROFILE=test\nADS_SYNC_SYNC_PAGE_SIZE=100\nADS_SYNC_CRYPTO_KEY={KEY_B64}\n"
        ),
    );
    write_env_file(&temp_dir, ".env.test", "ADS_SYNC_SYNC_PAGE_SIZE=250\n");
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "ADS_SYNC_FACEBOOK_APP_SCOPES=\"ads_read, read_insights\"\n",
    );

    let cfg = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.sync.page_size, 250);
    assert_eq!(cfg.facebook_app_scopes, vec!["ads_read", "read_insights"]);

    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("ADS_SYNC_REFRESH_LOOKBACK_DAYS=3\nADS_SYNC_CRYPTO_KEY={KEY_B64}\n"),
    );

    unsafe {
        env::set_var("ADS_SYNC_REFRESH_LOOKBACK_DAYS", "14");
    }

    let cfg = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect("config loads with env override");
    assert_eq!(cfg.refresh.lookback_days, 14);

    clear_env();
}

#[test]
fn production_profile_requires_app_credentials() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ADS_SYNC_PROFILE", "production");
        env::set_var("ADS_SYNC_CRYPTO_KEY", KEY_B64);
    }

    let err = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect_err("missing app id should fail");
    assert!(matches!(err, ConfigError::MissingFacebookAppId));

    unsafe {
        env::set_var("ADS_SYNC_FACEBOOK_APP_ID", "123");
        env::set_var("ADS_SYNC_FACEBOOK_APP_SECRET", "secret");
        env::set_var(
            "ADS_SYNC_FACEBOOK_REDIRECT_URI",
            "https://app.example.test/oauth/callback",
        );
    }

    let cfg = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect("complete production config loads");
    let app = cfg.facebook_app().expect("app config");
    assert_eq!(app.app_access_token(), "123|secret");
    assert!(!format!("{:?}", app).contains("secret\""));

    clear_env();
}

#[test]
fn invalid_crypto_key_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ADS_SYNC_CRYPTO_KEY", "not base64 !!");
    }
    let err = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect_err("invalid base64 should fail");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyBase64 { .. }));

    unsafe {
        // 16 bytes
        env::set_var("ADS_SYNC_CRYPTO_KEY", "YWFhYWFhYWFhYWFhYWFhYQ==");
    }
    let err = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect_err("short key should fail");
    assert!(format!("{}", err).contains("exactly 32 bytes"));

    clear_env();
}

#[test]
fn out_of_range_sync_settings_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ADS_SYNC_CRYPTO_KEY", KEY_B64);
        env::set_var("ADS_SYNC_SYNC_MAX_PAGES", "0");
    }
    let err = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect_err("zero max pages should fail");
    assert!(matches!(err, ConfigError::InvalidSyncMaxPages { value: 0 }));

    unsafe {
        env::remove_var("ADS_SYNC_SYNC_MAX_PAGES");
        env::set_var("ADS_SYNC_OAUTH_STATE_TTL_SECONDS", "3600");
    }
    let err = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()))
        .load()
        .expect_err("state TTL above ten minutes should fail");
    assert!(matches!(
        err,
        ConfigError::InvalidOAuthStateTtl { value: 3600 }
    ));

    clear_env();
}
