use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn test_cli_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op, user, amount, to_account, key").unwrap();
    writeln!(file, "open, alice, , ,").unwrap();
    writeln!(file, "deposit, alice, 100, , d-1").unwrap();
    writeln!(file, "withdraw, alice, 25, , w-1").unwrap();
    writeln!(file, "open, bob, , ,").unwrap();
    writeln!(file, "deposit, bob, 50, , d-2").unwrap();

    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.arg(file.path());

    // alice: 100 - 25 = 75, bob: 50.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("user,account,balance,locked"))
        .stdout(predicate::str::contains(",75,false"))
        .stdout(predicate::str::contains(",50,false"))
        .stdout(predicate::str::contains("pending,0"));
}

#[test]
fn test_replayed_key_credits_once() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op, user, amount, to_account, key").unwrap();
    writeln!(file, "open, alice, , ,").unwrap();
    writeln!(file, "deposit, alice, 100, , d-1").unwrap();
    writeln!(file, "deposit, alice, 100, , d-1").unwrap(); // same key, retried row

    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",100,false"))
        .stdout(predicate::str::contains(",200,").not());
}

#[test]
fn test_malformed_rows_are_reported_and_skipped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op, user, amount, to_account, key").unwrap();
    writeln!(file, "deposit, alice, 1, , d-0").unwrap(); // fails: no account yet
    writeln!(file, "open, alice, , ,").unwrap();
    writeln!(file, "fly, alice, 1, , k-bad").unwrap(); // unknown op code
    writeln!(file, "deposit, alice, , , d-1").unwrap(); // missing amount
    writeln!(file, "deposit, alice, 3, , d-2").unwrap();

    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading operation"))
        .stderr(predicate::str::contains("Error processing operation"))
        .stdout(predicate::str::contains(",3,false"));
}

#[test]
fn test_insufficient_withdrawal_leaves_balance() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op, user, amount, to_account, key").unwrap();
    writeln!(file, "open, alice, , ,").unwrap();
    writeln!(file, "deposit, alice, 10, , d-1").unwrap();
    writeln!(file, "withdraw, alice, 50, , w-1").unwrap();

    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "Insufficient balance or account locked",
        ))
        .stdout(predicate::str::contains(",10,false"));
}

#[test]
fn test_pending_sweep_resolves_deferred_entries() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op, user, amount, to_account, key").unwrap();
    writeln!(file, "open, alice, , ,").unwrap();
    writeln!(file, "deposit, alice, 100000, , d-1").unwrap();
    writeln!(file, "withdraw, alice, 30000, , w-1").unwrap(); // over review threshold

    // Without a sweep the entry stays parked and no funds move.
    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.arg(file.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",100000,false"))
        .stdout(predicate::str::contains("pending,1"));

    // Approving the backlog settles it.
    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.arg(file.path()).arg("--resolve-pending").arg("approve");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",70000,false"))
        .stdout(predicate::str::contains("pending,0"));
}
