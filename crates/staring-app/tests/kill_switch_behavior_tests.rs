//! Integration tests for the monitoring kill-switch and replay directory env.

use staring_app::{
    MONITORING_ENABLED_ENV, REPLAY_DIR_ENV, monitoring_enabled_from_env, replay_dir_from_env,
};

#[test]
fn kill_switch_behavior_tests_disables_monitoring_when_env_is_off() {
    // Safety:
    // - Integration tests mutate process env in a single-threaded test body.
    // - We reset the variable before returning.
    unsafe { std::env::remove_var(MONITORING_ENABLED_ENV) };
    assert!(monitoring_enabled_from_env());

    for off in ["false", "0", " OFF "] {
        // Safety: see rationale above.
        unsafe { std::env::set_var(MONITORING_ENABLED_ENV, off) };
        assert!(!monitoring_enabled_from_env(), "`{off}` should disable monitoring");
    }

    // Safety: see rationale above.
    unsafe { std::env::set_var(MONITORING_ENABLED_ENV, "yes") };
    assert!(monitoring_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::remove_var(MONITORING_ENABLED_ENV) };
}

#[test]
fn kill_switch_behavior_tests_empty_replay_dir_means_no_export() {
    // Safety: only this test touches the replay dir variable.
    unsafe { std::env::set_var(REPLAY_DIR_ENV, "") };
    assert_eq!(replay_dir_from_env(), None);

    // Safety: see above.
    unsafe { std::env::set_var(REPLAY_DIR_ENV, "/tmp/staring-replays") };
    assert_eq!(
        replay_dir_from_env(),
        Some(std::path::PathBuf::from("/tmp/staring-replays"))
    );

    // Safety: see above.
    unsafe { std::env::remove_var(REPLAY_DIR_ENV) };
}
