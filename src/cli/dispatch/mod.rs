use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Turn parsed arguments into the action to run and its global settings.
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    // Filter empty strings, clap passes them through when env vars are set to ""
    let get_non_empty = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .filter(|v| !v.trim().is_empty())
    };

    let defaults = GlobalArgs::default();

    let audit_capacity = matches
        .get_one::<usize>("audit-capacity")
        .copied()
        .unwrap_or(defaults.audit_capacity);
    if audit_capacity == 0 {
        return Err(anyhow!("--audit-capacity must be greater than zero"));
    }

    let globals = GlobalArgs {
        policy_store: get_non_empty("policy-store").map(PathBuf::from),
        security_log_url: get_non_empty("security-log-url"),
        security_log_timeout: matches
            .get_one::<u64>("security-log-timeout")
            .map_or(defaults.security_log_timeout, |&secs| Duration::from_secs(secs)),
        audit_capacity,
        issuer: get_non_empty("issuer").unwrap_or(defaults.issuer),
        trust_proxy_headers: matches.get_flag("trust-proxy-headers"),
    };

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
    };

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn test_handler_defaults() {
        temp_env::with_vars_unset(
            [
                "SKYSHIP_PORT",
                "SKYSHIP_POLICY_STORE",
                "SKYSHIP_SECURITY_LOG_URL",
                "SKYSHIP_AUDIT_CAPACITY",
                "SKYSHIP_ISSUER",
                "SKYSHIP_TRUST_PROXY_HEADERS",
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["skyship"]);
                let (action, globals) = handler(&matches).unwrap();
                assert!(matches!(action, Action::Server { port: 8080 }));
                assert_eq!(globals.audit_capacity, 1000);
                assert_eq!(globals.issuer, "SkyShip");
                assert!(globals.security_log_url.is_none());
                assert!(!globals.trust_proxy_headers);
            },
        );
    }

    #[test]
    fn test_handler_all_args() {
        let matches = commands::new().get_matches_from(vec![
            "skyship",
            "--port",
            "9090",
            "--policy-store",
            "/var/lib/skyship/store.json",
            "--security-log-url",
            "https://siem.skyship.dev/ingest",
            "--security-log-timeout",
            "5",
            "--audit-capacity",
            "250",
            "--issuer",
            "SkyShip Staging",
            "--trust-proxy-headers",
        ]);
        let (action, globals) = handler(&matches).unwrap();
        assert!(matches!(action, Action::Server { port: 9090 }));
        assert_eq!(
            globals.policy_store,
            Some(PathBuf::from("/var/lib/skyship/store.json"))
        );
        assert_eq!(
            globals.security_log_url.as_deref(),
            Some("https://siem.skyship.dev/ingest")
        );
        assert_eq!(globals.security_log_timeout, Duration::from_secs(5));
        assert_eq!(globals.audit_capacity, 250);
        assert_eq!(globals.issuer, "SkyShip Staging");
        assert!(globals.trust_proxy_headers);
    }

    #[test]
    fn test_handler_rejects_zero_capacity() {
        let matches =
            commands::new().get_matches_from(vec!["skyship", "--audit-capacity", "0"]);
        assert!(handler(&matches).is_err());
    }

    #[test]
    fn test_handler_ignores_empty_env() {
        temp_env::with_vars(
            [
                ("SKYSHIP_SECURITY_LOG_URL", Some("")),
                ("SKYSHIP_POLICY_STORE", Some("  ")),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["skyship"]);
                let (_, globals) = handler(&matches).unwrap();
                assert!(globals.security_log_url.is_none());
                assert!(globals.policy_store.is_none());
            },
        );
    }
}
