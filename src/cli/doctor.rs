//! `apptester doctor`: check what a run depends on.

use std::path::Path;

use crate::config::TesterConfig;
use crate::runtime::check_docker;

enum Check {
    Pass(String),
    Fail(String),
    Skip(String),
}

impl Check {
    fn print(&self, name: &str) {
        match self {
            Check::Pass(detail) => println!("  [pass] {:<12} {}", name, detail),
            Check::Fail(detail) => println!("  [FAIL] {:<12} {}", name, detail),
            Check::Skip(detail) => println!("  [skip] {:<12} {}", name, detail),
        }
    }
}

/// Probe Docker and validate the configuration. Fails when any check fails.
pub async fn run_doctor_command(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("apptester doctor");
    println!();

    let config = TesterConfig::load(config_path);
    let mut checks = Vec::new();

    match &config {
        Ok(c) => checks.push((
            "config",
            Check::Pass(format!(
                "app '{}' on {}",
                c.app_id,
                if c.on_docker { "docker" } else { "local process" }
            )),
        )),
        Err(e) => checks.push(("config", Check::Fail(e.to_string()))),
    }

    let on_docker = config.as_ref().is_ok_and(|c| c.on_docker);
    let docker = check_docker().await;
    let docker_check = if docker.status.is_ok() {
        Check::Pass(docker.summary())
    } else if on_docker {
        Check::Fail(docker.summary())
    } else {
        Check::Skip(docker.summary())
    };
    checks.push(("docker", docker_check));

    if let Ok(c) = &config {
        if !c.on_docker
            && let Some(local) = &c.local
        {
            checks.push(("app command", program_check(&local.command)));
        }
        match &c.tests.command {
            Some(command) => checks.push(("test command", program_check(command))),
            None => checks.push((
                "test command",
                Check::Pass(format!("HTTP smoke checks on {:?}", c.tests.smoke_paths)),
            )),
        }
    }

    for (name, check) in &checks {
        check.print(name);
    }
    println!();
    verdict(&checks)
}

fn verdict(checks: &[(&str, Check)]) -> anyhow::Result<()> {
    let failures = checks
        .iter()
        .filter(|(_, check)| matches!(check, Check::Fail(_)))
        .count();
    if failures > 0 {
        anyhow::bail!("{} check(s) failed", failures);
    }
    println!("All checks passed.");
    Ok(())
}

fn program_check(program: &str) -> Check {
    if program_exists(program) {
        Check::Pass(format!("'{}' found", program))
    } else {
        Check::Fail(format!("'{}' not found on PATH", program))
    }
}

fn program_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.exists();
    }
    let finder = if cfg!(windows) { "where" } else { "which" };
    std::process::Command::new(finder)
        .arg(program)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_program_exists() {
        assert!(program_exists("sh"));
        assert!(program_exists("/bin/sh"));
        assert!(!program_exists("definitely-not-installed-4f1e"));
        assert!(!program_exists("./definitely/not/here"));
    }

    #[test]
    fn test_failed_check_fails_the_command() {
        let checks = vec![
            ("config", Check::Pass("app 'shop' on docker".to_string())),
            ("docker", Check::Fail("not running".to_string())),
            ("test command", Check::Fail("'mvn' not found on PATH".to_string())),
        ];
        let err = verdict(&checks).unwrap_err();
        assert_eq!(err.to_string(), "2 check(s) failed");
    }

    #[test]
    fn test_skipped_checks_do_not_fail() {
        let checks = vec![
            ("config", Check::Pass("app 'shop' on local process".to_string())),
            ("docker", Check::Skip("not installed".to_string())),
        ];
        verdict(&checks).unwrap();
    }
}
