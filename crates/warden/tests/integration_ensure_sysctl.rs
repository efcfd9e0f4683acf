//! Integration test for `ensure-sysctl` against the real host `sysctl`.
//!
//! Only exercises the no-op path (current threshold already satisfies a
//! very permissive bound) since lowering the real kernel threshold would
//! require root and would mutate the test host.

use assert_cmd::Command;

fn cmd() -> Command {
    Command::cargo_bin("warden").unwrap()
}

#[test]
fn ensure_sysctl_noop_when_threshold_already_satisfied() {
    cmd()
        .arg("ensure-sysctl")
        .arg("--threshold")
        .arg("65535")
        .assert()
        .success();
}
