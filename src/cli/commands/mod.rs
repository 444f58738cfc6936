use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("skyship")
        .about("SkyShip access control, second factor and security audit service")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("SKYSHIP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("policy-store")
                .long("policy-store")
                .help("JSON file holding the persisted access policy (in-memory if omitted)")
                .env("SKYSHIP_POLICY_STORE"),
        )
        .arg(
            Arg::new("security-log-url")
                .long("security-log-url")
                .help("Endpoint receiving a POST for every audit record, example: https://siem.tld/ingest")
                .env("SKYSHIP_SECURITY_LOG_URL"),
        )
        .arg(
            Arg::new("security-log-timeout")
                .long("security-log-timeout")
                .help("Timeout in seconds for forwarding one audit record")
                .default_value("3")
                .env("SKYSHIP_SECURITY_LOG_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..=60)),
        )
        .arg(
            Arg::new("audit-capacity")
                .long("audit-capacity")
                .help("Maximum records kept per audit buffer")
                .default_value("1000")
                .env("SKYSHIP_AUDIT_CAPACITY")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("issuer")
                .long("issuer")
                .help("Issuer shown in authenticator apps")
                .default_value("SkyShip")
                .env("SKYSHIP_ISSUER"),
        )
        .arg(
            Arg::new("trust-proxy-headers")
                .long("trust-proxy-headers")
                .help("Take the client address from x-forwarded-for / x-real-ip")
                .env("SKYSHIP_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("SKYSHIP_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "skyship");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "SkyShip access control, second factor and security audit service"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_store() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "skyship",
            "--port",
            "8080",
            "--policy-store",
            "/tmp/skyship.json",
            "--security-log-url",
            "https://siem.tld/ingest",
        ]);

        assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(8080));
        assert_eq!(
            matches
                .get_one::<String>("policy-store")
                .map(|s| s.to_string()),
            Some("/tmp/skyship.json".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("security-log-url")
                .map(|s| s.to_string()),
            Some("https://siem.tld/ingest".to_string())
        );
        assert_eq!(
            matches.get_one::<u64>("security-log-timeout").map(|s| *s),
            Some(3)
        );
        assert!(!matches.get_flag("trust-proxy-headers"));
    }

    #[test]
    fn test_rejects_out_of_range_timeout() {
        let result = new().try_get_matches_from(vec!["skyship", "--security-log-timeout", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("SKYSHIP_PORT", Some("443")),
                ("SKYSHIP_POLICY_STORE", Some("/etc/skyship/store.json")),
                ("SKYSHIP_AUDIT_CAPACITY", Some("50")),
                ("SKYSHIP_ISSUER", Some("SkyShip QA")),
                ("SKYSHIP_TRUST_PROXY_HEADERS", Some("true")),
                ("SKYSHIP_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["skyship"]);
                assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>("policy-store")
                        .map(|s| s.to_string()),
                    Some("/etc/skyship/store.json".to_string())
                );
                assert_eq!(
                    matches.get_one::<usize>("audit-capacity").map(|s| *s),
                    Some(50)
                );
                assert_eq!(
                    matches.get_one::<String>("issuer").map(|s| s.to_string()),
                    Some("SkyShip QA".to_string())
                );
                assert!(matches.get_flag("trust-proxy-headers"));
                assert_eq!(matches.get_one::<u8>("verbosity").map(|s| *s), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("SKYSHIP_LOG_LEVEL", Some(level))], || {
                let command = new();
                let matches = command.get_matches_from(vec!["skyship"]);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").map(|s| *s),
                    Some(index as u8)
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("SKYSHIP_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["skyship".to_string()];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").map(|s| *s),
                    Some(index as u8)
                );
            });
        }
    }
}
