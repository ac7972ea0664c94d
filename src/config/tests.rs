use super::*;
use serial_test::serial;
use tempfile::tempdir;

fn write_config(contents: &str) -> Config {
    let dir = tempdir().unwrap();
    let path = dir.path().join("luptr.toml");
    fs::write(&path, contents).unwrap();
    Config::load_from_path(&path).unwrap()
}

#[test]
fn empty_file_yields_defaults() {
    let config = write_config("");
    assert_eq!(config.zawaal_window(), Duration::minutes(10));
    assert_eq!(config.asr_method(), AsrMethod::Mithl1);
    assert_eq!(config.rollover_policy(), RolloverPolicy::AtMidnight);
    assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::London);
}

#[test]
fn policies_parse_from_toml() {
    let config = write_config(
        r#"
url = "https://example.org/timetable.json"
zawaal_mins = 20
islamic_date_at_maghrib = true
use_asr_mithl_2 = true
timezone = "Europe/Dublin"
"#,
    );
    assert_eq!(config.zawaal_window(), Duration::minutes(20));
    assert_eq!(config.rollover_policy(), RolloverPolicy::AtMaghrib);
    assert_eq!(config.asr_method(), AsrMethod::Mithl2);
    assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Dublin);
}

#[test]
fn zawaal_mins_out_of_range_is_rejected() {
    let config = Config {
        zawaal_mins: Some(0),
        ..Config::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        zawaal_mins: Some(600),
        ..Config::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn empty_prayer_list_is_rejected() {
    let config = Config {
        prayers: Some(vec![]),
        ..Config::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn duplicate_prayer_is_rejected() {
    let config = Config {
        prayers: Some(vec!["Sunrise".into(), "Sunrise".into()]),
        ..Config::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn bad_timezone_is_rejected_at_load() {
    let config = Config {
        timezone: Some("Mars/Olympus_Mons".into()),
        ..Config::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn default_config_file_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("luptr").join("luptr.toml");
    create_default_config(&path).unwrap();
    let config = Config::load_from_path(&path).unwrap();
    assert!(config.url.is_some());
    assert_eq!(config.zawaal_mins, Some(10));
}

#[test]
#[serial]
fn load_creates_a_default_file_on_first_run() {
    let dir = tempdir().unwrap();
    // SAFETY: no other thread touches the environment (#[serial]).
    unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };

    let config = Config::load().unwrap();
    assert!(get_config_path().unwrap().exists());
    assert!(config.url.is_some());

    unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
}

#[test]
fn tracked_events_default_cycle() {
    let tracked = TrackedEvents::from_config(&Config::default());
    assert_eq!(
        tracked.events(),
        &[
            "Fajr Begins",
            "Sunrise",
            "Zuhr Begins",
            "Asr Mithl 1",
            "Maghrib Begins",
            "Ishā Begins",
        ]
    );
}

#[test]
fn asr_substitution_changes_only_the_asr_column() {
    let config = Config {
        use_asr_mithl_2: Some(true),
        ..Config::default()
    };
    let tracked = TrackedEvents::from_config(&config);
    let default_tracked = TrackedEvents::from_config(&Config::default());

    assert!(tracked.events().contains(&"Asr Mithl 2".to_string()));
    assert!(!tracked.events().contains(&"Asr Mithl 1".to_string()));

    // Every other position in the cycle is untouched.
    for (a, b) in tracked.events().iter().zip(default_tracked.events()) {
        if a != "Asr Mithl 2" {
            assert_eq!(a, b);
        }
    }
}

#[test]
fn display_rewrite_strips_suffixes() {
    let tracked = TrackedEvents::from_config(&Config::default());
    assert_eq!(tracked.display("Zuhr Begins"), "Zuhr");
    assert_eq!(tracked.display("Asr Mithl 1"), "Asr");
    assert_eq!(tracked.display("Asr Mithl 2"), "Asr");
    assert_eq!(tracked.display("Sunrise"), "Sunrise");
}

#[test]
fn attr_keys_are_lowercased() {
    let tracked = TrackedEvents::from_config(&Config::default());
    assert_eq!(tracked.attr_key("Zuhr Begins"), "next_zuhr");
    assert_eq!(tracked.attr_key("Fajr Begins"), "next_fajr");
    assert_eq!(tracked.attr_key("Sunrise"), "next_sunrise");
}
