use std::collections::HashMap;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use upscale_detector::cache::ResultCache;
use upscale_detector::models::{CheckResult, CheckStatus};

/// Write an executable shell script standing in for an external analysis tool.
#[cfg(unix)]
fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Command with HOME pointed at `home` so no real user settings leak in.
fn detector(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("upscale-detector");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("UPSCALE_DETECTOR_CONFIG")
        .env_remove("UPSCALE_DETECTOR_CACHE");
    cmd
}

fn read_cache(path: &Path) -> HashMap<String, CheckResult> {
    let data = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&data).unwrap()
}

/// Helper: a music root with one album folder holding one fake mp3.
fn setup_library() -> (tempfile::TempDir, PathBuf) {
    let base = tempfile::tempdir().unwrap();
    let album = base.path().join("music").join("Album");
    std::fs::create_dir_all(&album).unwrap();
    let song = album.join("01 - Song.mp3");
    std::fs::write(&song, b"not really audio").unwrap();
    (base, song)
}

// --- Library-level tests ---

#[test]
fn test_cache_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    let results = vec![
        (
            "/music/a.mp3",
            CheckResult::failed("Actual 128kbps vs declared 320kbps").with_bitrates(Some(320), Some(128)),
        ),
        ("/music/b.mp3", CheckResult::passed("188kbps (within 10% tolerance)")),
        ("/music/c.mp3", CheckResult::error("File not found")),
        (
            "/music/d.mp3",
            CheckResult::failed("Claims 320 kbps but max frequency is about 11025 Hz")
                .with_bitrates(Some(320), None)
                .with_cutoff(Some(11025)),
        ),
    ];

    let mut cache = ResultCache::load(&path);
    for (file, result) in &results {
        cache.insert(Path::new(file), result.clone());
    }
    cache.save().unwrap();

    let reloaded = ResultCache::load(&path);
    assert_eq!(reloaded.len(), results.len());
    for (file, result) in &results {
        let got = reloaded.get(Path::new(file)).unwrap();
        assert_eq!(got.status, result.status);
        assert_eq!(got.reason, result.reason);
        assert_eq!(got, result);
    }
}

#[test]
fn test_cache_file_is_human_readable_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let mut cache = ResultCache::load(&path);
    cache.insert(Path::new("/music/a.mp3"), CheckResult::passed("320kbps (within 10% tolerance)"));
    cache.save().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"/music/a.mp3\""));
    assert!(text.contains("\"status\": \"Passed\""));
    assert!(text.lines().count() > 1, "cache should be pretty-printed");
}

// --- CLI validation tests ---

#[test]
fn test_tolerance_out_of_range() {
    let home = tempfile::tempdir().unwrap();
    detector(home.path())
        .args(["--tolerance", "60", "check", "x.mp3"])
        .assert()
        .failure();
}

#[test]
fn test_unknown_settings_key_rejected() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("settings.toml");
    std::fs::write(&config, "checkTool = \"ffprobe\"\n").unwrap();

    detector(home.path())
        .args(["--config", config.to_str().unwrap(), "check", "x.mp3"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Invalid settings file"));
}

#[test]
fn test_empty_directory() {
    let home = tempfile::tempdir().unwrap();
    let empty = home.path().join("empty");
    std::fs::create_dir(&empty).unwrap();

    detector(home.path())
        .args(["check", empty.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicates::str::contains("No audio files found"));
}

// --- check command ---

#[cfg(unix)]
#[test]
fn test_check_passes_and_persists() {
    let (base, song) = setup_library();
    let probe = fake_tool(base.path(), "ffprobe", "echo 320000");
    let cache = base.path().join("cache.json");
    let root = base.path().join("music");

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--probe-bin",
            probe.to_str().unwrap(),
            "--cache-file",
            cache.to_str().unwrap(),
            "--music-root",
            root.to_str().unwrap(),
            "check",
            root.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicates::str::contains("\u{2713} Upscale Check: [Passed] 01 - Song.mp3"))
        .stderr(predicates::str::contains("Done: 1 passed, 0 failed, 0 errors, 0 skipped"));

    let entries = read_cache(&cache);
    assert_eq!(entries.len(), 1);
    let result = &entries[song.to_str().unwrap()];
    assert_eq!(result.status, CheckStatus::Passed);
    assert_eq!(result.declared_kbps, Some(320));

    let sidecar = root.join("Album").join("Album - spectro_check.log");
    let log = std::fs::read_to_string(sidecar).unwrap();
    assert!(log.contains("[Passed] 01 - Song.mp3"));
}

#[cfg(unix)]
#[test]
fn test_check_upscaled_file_fails() {
    let (base, song) = setup_library();
    let probe = fake_tool(base.path(), "ffprobe", "echo 320000");
    let estimator = fake_tool(base.path(), "true-bitrate", "echo 'Estimated bitrate: 128 kbps'");
    let cache = base.path().join("cache.json");

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--strategy",
            "true-bitrate-tool",
            "--probe-bin",
            probe.to_str().unwrap(),
            "--true-bitrate-bin",
            estimator.to_str().unwrap(),
            "--cache-file",
            cache.to_str().unwrap(),
            "check",
            song.to_str().unwrap(),
        ])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("Actual 128kbps vs declared 320kbps"))
        .stderr(predicates::str::contains("Done: 0 passed, 1 failed"));

    let entries = read_cache(&cache);
    assert_eq!(entries[song.to_str().unwrap()].status, CheckStatus::Failed);
}

#[cfg(unix)]
#[test]
fn test_check_spectral_from_settings_file() {
    let (base, song) = setup_library();
    let spectro = fake_tool(
        base.path(),
        "spectro",
        "echo \"$2 seems good\"; echo '[320 kbps]'",
    );
    let config = base.path().join("settings.toml");
    std::fs::write(&config, "analysisStrategy = \"spectral-tool\"\n").unwrap();
    let cache = base.path().join("cache.json");

    detector(base.path())
        .args([
            "--config",
            config.to_str().unwrap(),
            "--settle-ms",
            "0",
            "--spectral-bin",
            spectro.to_str().unwrap(),
            "--cache-file",
            cache.to_str().unwrap(),
            "check",
            song.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicates::str::contains("Seems good (320 kbps)"));
}

#[test]
fn test_check_missing_probe_is_error_not_crash() {
    let (base, song) = setup_library();
    let cache = base.path().join("cache.json");
    let other = song.with_file_name("02 - Other.mp3");
    std::fs::write(&other, b"not really audio").unwrap();

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--probe-bin",
            "/nonexistent/ffprobe",
            "--cache-file",
            cache.to_str().unwrap(),
            "check",
            song.to_str().unwrap(),
            other.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicates::str::contains("Could not determine bitrate"))
        .stderr(predicates::str::contains("Done: 0 passed, 0 failed, 2 errors"));

    let entries = read_cache(&cache);
    assert_eq!(entries.len(), 2);
    assert!(entries.values().all(|r| r.status == CheckStatus::Error));
}

#[test]
fn test_check_non_audio_skipped_and_not_cached() {
    let (base, song) = setup_library();
    let notes = song.with_file_name("notes.txt");
    std::fs::write(&notes, b"liner notes").unwrap();
    let cache = base.path().join("cache.json");

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--cache-file",
            cache.to_str().unwrap(),
            "check",
            notes.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicates::str::contains("! Upscale Check: [Skipped] notes.txt - Not an audio file"));

    assert!(!cache.exists() || read_cache(&cache).is_empty());
    assert!(!song.with_file_name("Album - spectro_check.log").exists());
}

#[cfg(unix)]
#[test]
fn test_no_logging_writes_nothing() {
    let (base, song) = setup_library();
    let probe = fake_tool(base.path(), "ffprobe", "echo 320000");
    let cache = base.path().join("cache.json");

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--no-logging",
            "--probe-bin",
            probe.to_str().unwrap(),
            "--cache-file",
            cache.to_str().unwrap(),
            "check",
            song.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicates::str::contains("[Passed]"));

    assert!(!cache.exists());
    assert!(!song.with_file_name("Album - spectro_check.log").exists());
}

#[cfg(unix)]
#[test]
fn test_root_level_file_gets_own_sidecar() {
    let (base, _) = setup_library();
    let root = base.path().join("music");
    let single = root.join("Loose Single.mp3");
    std::fs::write(&single, b"not really audio").unwrap();
    let probe = fake_tool(base.path(), "ffprobe", "echo 256000");
    let cache = base.path().join("cache.json");

    for _ in 0..2 {
        detector(base.path())
            .args([
                "--settle-ms",
                "0",
                "--probe-bin",
                probe.to_str().unwrap(),
                "--cache-file",
                cache.to_str().unwrap(),
                "--music-root",
                root.to_str().unwrap(),
                "check",
                single.to_str().unwrap(),
            ])
            .assert()
            .success();
    }

    // appended, never truncated
    let log = std::fs::read_to_string(root.join("Loose Single - spectro_check.log")).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(!root.join("music - spectro_check.log").exists());
}

// --- watch command ---

#[cfg(unix)]
#[test]
fn test_watch_reads_download_events() {
    let (base, song) = setup_library();
    let other = song.with_file_name("02 - Other.mp3");
    std::fs::write(&other, b"not really audio").unwrap();
    let probe = fake_tool(base.path(), "ffprobe", "echo 192000");
    let cache = base.path().join("cache.json");

    let input = format!(
        "{}\n{}\n\n{}\n",
        song.display(),
        song.display(),
        other.display()
    );

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--probe-bin",
            probe.to_str().unwrap(),
            "--cache-file",
            cache.to_str().unwrap(),
            "watch",
        ])
        .write_stdin(input)
        .assert()
        .success();

    let entries = read_cache(&cache);
    assert_eq!(entries.len(), 2);
    assert!(entries.contains_key(song.to_str().unwrap()));
    assert!(entries.contains_key(other.to_str().unwrap()));
}

#[test]
fn test_watch_respects_auto_check_off() {
    let (base, song) = setup_library();
    let cache = base.path().join("cache.json");

    detector(base.path())
        .args([
            "--settle-ms",
            "0",
            "--no-auto-check",
            "--cache-file",
            cache.to_str().unwrap(),
            "watch",
        ])
        .write_stdin(format!("{}\n", song.display()))
        .assert()
        .success();

    assert!(!cache.exists() || read_cache(&cache).is_empty());
}

// --- cache command ---

fn seed_cache(path: &Path) {
    let mut cache = ResultCache::load(path);
    cache.insert(
        Path::new("/music/a.mp3"),
        CheckResult::failed("Actual 128kbps vs declared 320kbps").with_bitrates(Some(320), Some(128)),
    );
    cache.insert(Path::new("/music/b.mp3"), CheckResult::passed("320kbps (within 10% tolerance)"));
    cache.save().unwrap();
}

#[test]
fn test_cache_table() {
    let home = tempfile::tempdir().unwrap();
    let cache = home.path().join("cache.json");
    seed_cache(&cache);

    detector(home.path())
        .args(["--cache-file", cache.to_str().unwrap(), "cache"])
        .assert()
        .success()
        .stdout(predicates::str::contains("/music/a.mp3"))
        .stdout(predicates::str::contains("/music/b.mp3"))
        .stdout(predicates::str::contains("Number of files: 2"));
}

#[test]
fn test_cache_json_with_status_filter() {
    let home = tempfile::tempdir().unwrap();
    let cache = home.path().join("cache.json");
    seed_cache(&cache);

    let output = detector(home.path())
        .args([
            "--cache-file",
            cache.to_str().unwrap(),
            "cache",
            "--json",
            "--status",
            "failed",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: HashMap<String, CheckResult> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed["/music/a.mp3"].measured_kbps, Some(128));
}
