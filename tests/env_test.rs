//! Kept in its own test binary: it changes the process environment.

use gitter::Config;

#[test]
fn env_overrides_replace_urls() {
    unsafe {
        std::env::set_var("GITTER_API_URL", "http://localhost:5000/api/v1");
        std::env::set_var("GITTER_STREAM_URL", "http://localhost:5001/stream/v1");
    }

    let cfg = Config::default().with_env_overrides();
    assert_eq!(cfg.api_url, "http://localhost:5000/api/v1");
    assert_eq!(cfg.stream_url, "http://localhost:5001/stream/v1");
    assert_eq!(cfg.keepalive, Config::default().keepalive);

    unsafe {
        std::env::remove_var("GITTER_API_URL");
        std::env::remove_var("GITTER_STREAM_URL");
    }
    let cfg = Config::default().with_env_overrides();
    assert_eq!(cfg, Config::default());
}
