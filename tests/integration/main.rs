//! Integration tests for bos-artifacts

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const CONFIG_HASH: &str = "0123456789abcdef";

    /// Command with its config and audit log confined to `home`
    fn bos(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("bos-artifacts");
        cmd.arg("--config")
            .arg(home.join("config.toml"))
            .env("XDG_STATE_HOME", home.join("state"))
            .env("BOS_ARTIFACTS_PLAIN", "1")
            .env_remove("BUCKOS_BINARY_MIRROR");
        cmd
    }

    fn build_output(root: &Path) -> PathBuf {
        let out = root.join("out");
        fs::create_dir_all(out.join("usr/bin")).unwrap();
        fs::write(out.join("usr/bin/bash"), b"#!/bin/sh\necho bash\n").unwrap();
        fs::write(out.join("usr/README"), b"bash 5.3\n").unwrap();
        out
    }

    /// Package `out` as bash 5.3 and publish it to `<home>/mirror`
    fn published_mirror(home: &Path) -> PathBuf {
        let out = build_output(home);
        let dist = home.join("dist");
        fs::create_dir_all(&dist).unwrap();
        bos(home)
            .args(["package", "-n", "bash", "--version", "5.3", "-t", "//pkgs/bash:bash"])
            .arg("-o")
            .arg(&out)
            .args(["--config-hash", CONFIG_HASH])
            .arg("-d")
            .arg(&dist)
            .assert()
            .success();

        let mirror = home.join("mirror");
        bos(home)
            .arg("publish")
            .arg("-s")
            .arg(&dist)
            .arg("-d")
            .arg(&mirror)
            .assert()
            .success();
        mirror
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        bos(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("publish"))
            .stdout(predicate::str::contains("fetch-sources"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        bos(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bos-artifacts"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        bos(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let home = TempDir::new().unwrap();
        bos(home.path())
            .args(["config", "set", "general.nope", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let home = TempDir::new().unwrap();
        let out = build_output(home.path());

        let first = bos(home.path()).arg("hash").arg(&out).output().unwrap();
        let second = bos(home.path()).arg("hash").arg(&out).output().unwrap();
        assert!(first.status.success());
        let digest = String::from_utf8(first.stdout).unwrap();
        assert_eq!(digest.trim().len(), 64);
        assert_eq!(digest, String::from_utf8(second.stdout).unwrap());

        fs::write(out.join("usr/README"), b"bash 5.3.1\n").unwrap();
        bos(home.path())
            .arg("hash")
            .arg(&out)
            .assert()
            .success()
            .stdout(predicate::str::contains(digest.trim()).not());
    }

    #[test]
    fn hash_missing_path_fails() {
        let home = TempDir::new().unwrap();
        bos(home.path())
            .arg("hash")
            .arg(home.path().join("absent"))
            .assert()
            .failure();
    }

    #[test]
    fn package_publish_query_roundtrip() {
        let home = TempDir::new().unwrap();
        let mirror = published_mirror(home.path());

        assert!(mirror.join("index.json").exists());
        assert!(mirror
            .join(format!("b/bash-5.3-{}-bin.tar.gz", CONFIG_HASH))
            .exists());

        bos(home.path())
            .args(["query", "bash", "5.3", CONFIG_HASH, "-q"])
            .arg("-m")
            .arg(&mirror)
            .assert()
            .success()
            .stdout(predicate::str::contains(format!(
                "bash-5.3-{}-bin.tar.gz",
                CONFIG_HASH
            )));
    }

    #[test]
    fn query_miss_exits_nonzero() {
        let home = TempDir::new().unwrap();
        let mirror = published_mirror(home.path());

        bos(home.path())
            .args(["query", "bash", "5.3", "ffffffffffffffff"])
            .arg("-m")
            .arg(&mirror)
            .assert()
            .failure()
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("not available"));
    }

    #[test]
    fn install_lists_and_installs_from_local_mirror() {
        let home = TempDir::new().unwrap();
        let mirror = published_mirror(home.path());

        bos(home.path())
            .args(["install", "bash", "--list"])
            .arg("-m")
            .arg(&mirror)
            .assert()
            .success()
            .stdout(predicate::str::contains(CONFIG_HASH));

        let prefix = home.path().join("root");
        bos(home.path())
            .args(["install", "bash", "--version", "5.3", "--config-hash", CONFIG_HASH])
            .arg("-m")
            .arg(&mirror)
            .arg("-p")
            .arg(&prefix)
            .arg("--cache-dir")
            .arg(home.path().join("cache"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Successfully installed bash 5.3"));

        assert!(prefix.join("usr/bin/bash").exists());
    }

    #[test]
    fn stamp_then_verify() {
        let home = TempDir::new().unwrap();
        let input = build_output(home.path());
        let output = home.path().join("stamped");
        // No objcopy on this path, so ELF sections are left alone
        let tools = home.path().join("tools/bin");
        fs::create_dir_all(&tools).unwrap();

        bos(home.path())
            .arg("stamp")
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .args(["--name", "bash", "--version", "5.3", "--build-id", "42"])
            .args(["--type", "package", "--target", "//pkgs/bash:bash"])
            .args(["--source-url", "https://ftp.gnu.org/gnu/bash/bash-5.3.tar.gz"])
            .args(["--source-sha256", "aa11"])
            .arg("--hermetic-path")
            .arg(&tools)
            .assert()
            .success()
            .stdout(predicate::str::contains("stamped: bash 5.3 (build 42)"));

        bos(home.path())
            .arg("verify")
            .arg(&output)
            .arg("--hermetic-path")
            .arg(&tools)
            .assert()
            .success();
    }

    #[test]
    fn fetch_sources_dry_run_downloads_nothing() {
        let home = TempDir::new().unwrap();
        let sources = home.path().join("sources.json");
        fs::write(
            &sources,
            r#"[
                {"package": "bash", "url": "https://ftp.gnu.org/gnu/bash/bash-5.3.tar.gz", "sha256": "aa11"},
                {"package": "zlib", "url": "https://zlib.net/zlib-1.3.1.tar.gz"}
            ]"#,
        )
        .unwrap();
        let dest = home.path().join("downloads");

        bos(home.path())
            .arg("fetch-sources")
            .arg("-s")
            .arg(&sources)
            .arg("-d")
            .arg(&dest)
            .arg("--dry-run")
            .assert()
            .success()
            .stdout(predicate::str::contains("bash-5.3.tar.gz"))
            .stdout(predicate::str::contains("zlib-1.3.1.tar.gz"));

        assert!(!dest.exists() || fs::read_dir(&dest).unwrap().next().is_none());
    }

    #[test]
    fn verify_mirror_reports_missing() {
        let home = TempDir::new().unwrap();
        let sources = home.path().join("sources.json");
        fs::write(
            &sources,
            r#"[{"package": "zlib", "url": "https://zlib.net/zlib-1.3.1.tar.gz"}]"#,
        )
        .unwrap();
        let report = home.path().join("report.json");
        let mirror = home.path().join("empty-mirror");
        fs::create_dir_all(&mirror).unwrap();

        bos(home.path())
            .arg("verify-mirror")
            .arg("-s")
            .arg(&sources)
            .arg("-m")
            .arg(&mirror)
            .arg("-r")
            .arg(&report)
            .assert()
            .failure();

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(report["summary"]["missing"], 1);
        assert_eq!(report["missing_files"][0]["filename"], "zlib-1.3.1.tar.gz");
    }

    #[test]
    fn completions_bash() {
        let home = TempDir::new().unwrap();
        bos(home.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("bos-artifacts"));
    }
}
