mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use common::{create_db, ids, noise, text_column, touch, write_wav, Row};
use smdb_companion_core::search::{search, SearchOptions};
use smdb_companion_core::{
    Algorithm, CancelToken, Companion, DetectorConfig, DetectorSet, Error, Preferences,
    SearchAborted, SilentReporter, Source, StatusChannel, StatusReporter, StatusUpdate,
    WaveformMode,
};

fn run(db: &PathBuf, detectors: Vec<DetectorConfig>, pref: &Preferences) -> smdb_companion_core::SearchResults {
    let cancel = CancelToken::new();
    let opts = SearchOptions {
        ignore_patterns: &[],
        decode_threads: 2,
        cancel: &cancel,
        reporter: &SilentReporter,
    };
    search(&Source::Database(db.clone()), &DetectorSet::new(detectors), pref, &opts).unwrap()
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<(StatusChannel, StatusUpdate)>>,
    cancel_on_waveform: Option<CancelToken>,
}

impl StatusReporter for Recorder {
    fn on_status(&self, channel: StatusChannel, update: &StatusUpdate) {
        if channel == StatusChannel::SearchSub && update.stage == "waveform" {
            if let Some(token) = &self.cancel_on_waveform {
                token.cancel();
            }
        }
        self.updates.lock().unwrap().push((channel, update.clone()));
    }
}

impl Recorder {
    fn stages(&self, channel: StatusChannel) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, u)| u.stage.clone())
            .collect()
    }
}

#[test]
fn test_basic_duplicates_keep_described_record() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a/door.wav");
    let b = tmp.path().join("b/door.wav");
    let c = tmp.path().join("c/window.wav");
    let db = tmp.path().join("lib.sqlite");
    create_db(
        &db,
        &[
            Row::new(1, &a),
            Row::new(2, &b).description("Heavy wooden door"),
            Row::new(3, &c),
        ],
    );

    let results = run(&db, vec![DetectorConfig::Basic], &Preferences::default());

    assert_eq!(results.clusters().len(), 1);
    let cluster = &results.clusters()[0];
    assert_eq!(ids(cluster), vec![2, 1]);
    assert!(cluster[0].is_kept());
    assert_eq!(cluster[1].algorithm, vec![Algorithm::Basic]);
    assert_eq!(results.removal_ids(), vec![1]);
    assert!(results.standalone()[0].is_pure_keep());
    assert_eq!(results.relevant().len(), 1);
    assert_eq!(results.groups().len(), 2);
}

#[test]
fn test_undecided_cluster_keeps_lowest_id_every_time() {
    let tmp = tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..3).map(|i| tmp.path().join(format!("{}/hit.wav", i))).collect();
    let db = tmp.path().join("lib.sqlite");
    create_db(
        &db,
        &[Row::new(7, &paths[0]), Row::new(3, &paths[1]), Row::new(5, &paths[2])],
    );

    for _ in 0..3 {
        let results = run(&db, vec![DetectorConfig::Basic], &Preferences::default());
        let cluster = &results.clusters()[0];
        assert_eq!(cluster[0].id, 3);
        assert_eq!(cluster.iter().filter(|r| r.is_kept()).count(), 1);
    }
}

#[test]
fn test_different_durations_do_not_match() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a/door.wav");
    let b = tmp.path().join("b/door.wav");
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &a), Row::new(2, &b).duration("0:02.000")]);

    let results = run(&db, vec![DetectorConfig::Basic], &Preferences::default());
    assert!(results.clusters().is_empty());
    assert!(results.removal_ids().is_empty());
}

#[test]
fn test_short_and_invalid_records_are_flagged() {
    let tmp = tempdir().unwrap();
    let present = touch(&tmp.path().join("sfx/present.wav"));
    let missing = tmp.path().join("sfx/missing.wav");
    let blip = touch(&tmp.path().join("sfx/blip.wav"));
    let db = tmp.path().join("lib.sqlite");
    create_db(
        &db,
        &[
            Row::new(1, &present),
            Row::new(2, &missing),
            Row::new(3, &blip).duration("0:00.200"),
        ],
    );

    let results = run(
        &db,
        vec![
            DetectorConfig::Invalidpath,
            DetectorConfig::Duration { min_dur: 0.5 },
        ],
        &Preferences::default(),
    );

    let flat = results.flat();
    let by_id = |id: i64| flat.iter().find(|r| r.id == id).unwrap();
    assert!(by_id(1).is_pure_keep());
    assert_eq!(by_id(2).algorithm, vec![Algorithm::InvalidPath]);
    assert_eq!(by_id(3).algorithm, vec![Algorithm::Duration]);
    assert_eq!(results.removal_ids(), vec![2, 3]);
}

#[test]
fn test_autoselect_flags_matching_paths() {
    let tmp = tempdir().unwrap();
    let keep = tmp.path().join("library/rain.wav");
    let junk = tmp.path().join("Bounced Files/rain_bounce.wav");
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &keep), Row::new(2, &junk)]);

    let pref = Preferences {
        autoselects: vec!["Bounced Files".to_string()],
        ..Preferences::default()
    };
    let results = run(&db, vec![DetectorConfig::Filetags], &pref);
    assert_eq!(results.removal_ids(), vec![2]);
}

#[test]
fn test_similar_filenames_cluster_with_their_original() {
    let tmp = tempdir().unwrap();
    let original = tmp.path().join("sfx/door slam.wav");
    let numbered = tmp.path().join("sfx/door slam.1.wav");
    let processed = tmp.path().join("sfx/door slam-RVRS_01.wav");
    let db = tmp.path().join("lib.sqlite");
    create_db(
        &db,
        &[Row::new(1, &numbered), Row::new(2, &original), Row::new(3, &processed)],
    );

    let results = run(
        &db,
        vec![
            DetectorConfig::Basic,
            DetectorConfig::Filename,
            DetectorConfig::Audiosuite,
        ],
        &Preferences::default(),
    );

    assert_eq!(results.clusters().len(), 1);
    let cluster = &results.clusters()[0];
    assert_eq!(cluster[0].id, 2);
    assert!(cluster[0].is_kept());
    assert!(cluster[1].has(Algorithm::SimilarFilename));
    assert!(cluster[2].has(Algorithm::Tags));
}

#[test]
fn test_identical_audio_clusters_by_waveform() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a/take.wav");
    let b = tmp.path().join("b/renamed take.wav");
    let c = tmp.path().join("c/other.wav");
    std::fs::create_dir_all(a.parent().unwrap()).unwrap();
    std::fs::create_dir_all(b.parent().unwrap()).unwrap();
    std::fs::create_dir_all(c.parent().unwrap()).unwrap();
    write_wav(&a, 1, 24_000, noise(1));
    write_wav(&b, 1, 24_000, noise(1));
    write_wav(&c, 1, 24_000, noise(2));
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &a), Row::new(2, &b), Row::new(3, &c)]);

    let pref = Preferences {
        waveform_search_type: WaveformMode::Exact,
        ..Preferences::default()
    };
    let results = run(&db, vec![DetectorConfig::Waveform], &pref);

    assert_eq!(results.clusters().len(), 1);
    assert_eq!(ids(&results.clusters()[0]), vec![1, 2]);
    assert!(results.clusters()[0][1].has(Algorithm::Waveforms));
    assert!(results.errors.is_empty());

    let cached = text_column(&db, 1, "_fingerprint").unwrap();
    assert!(!cached.is_empty());
    assert_eq!(text_column(&db, 2, "_fingerprint").unwrap(), cached);
}

#[test]
fn test_similar_mode_matches_near_copies() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("take.wav");
    let b = tmp.path().join("take quiet.wav");
    let c = tmp.path().join("other.wav");
    let base = noise(1);
    write_wav(&a, 1, 24_000, noise(1));
    write_wav(&b, 1, 24_000, move |frame, ch| base(frame, ch) / 2);
    write_wav(&c, 1, 24_000, noise(2));
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &a), Row::new(2, &b), Row::new(3, &c)]);

    let pref = Preferences {
        waveform_search_type: WaveformMode::Similar,
        similarity_threshold: 90.0,
        ..Preferences::default()
    };
    let results = run(&db, vec![DetectorConfig::Waveform], &pref);

    assert_eq!(results.clusters().len(), 1);
    let mut clustered = ids(&results.clusters()[0]);
    clustered.sort_unstable();
    assert_eq!(clustered, vec![1, 2]);
    assert_eq!(results.removal_ids().len(), 1);
    assert!(results.errors.is_empty());
}

#[test]
fn test_undecodable_file_is_reported_not_fatal() {
    let tmp = tempdir().unwrap();
    let good = tmp.path().join("good.wav");
    write_wav(&good, 1, 8_000, noise(3));
    let bad = touch(&tmp.path().join("bad.wav"));
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &good), Row::new(2, &bad)]);

    let results = run(&db, vec![DetectorConfig::Waveform], &Preferences::default());
    assert_eq!(results.errors.len(), 1);
    assert_eq!(results.errors[0].record_id, 2);
    let flat = results.flat();
    let bad_record = flat.iter().find(|r| r.id == 2).unwrap();
    assert!(bad_record.has(Algorithm::Errored));
    assert!(bad_record.is_kept());
}

#[test]
fn test_dual_mono_is_informational() {
    let tmp = tempdir().unwrap();
    let dual = tmp.path().join("dual.wav");
    let stereo = tmp.path().join("stereo.wav");
    write_wav(&dual, 2, 8_000, noise(4));
    let left = noise(5);
    let right = noise(6);
    write_wav(&stereo, 2, 8_000, move |f, ch| if ch == 0 { left(f, 0) } else { right(f, 1) });
    let db = tmp.path().join("lib.sqlite");
    create_db(
        &db,
        &[Row::new(1, &dual).channels(2), Row::new(2, &stereo).channels(2)],
    );

    let results = run(&db, vec![DetectorConfig::DualMono], &Preferences::default());
    let flat = results.flat();
    let dual_record = flat.iter().find(|r| r.id == 1).unwrap();
    assert_eq!(dual_record.algorithm, vec![Algorithm::DualMono, Algorithm::Keep]);
    assert!(flat.iter().find(|r| r.id == 2).unwrap().is_pure_keep());
    assert!(results.removal_ids().is_empty());
}

#[test]
fn test_compare_flags_records_present_in_other_database() {
    let tmp = tempdir().unwrap();
    let shared = tmp.path().join("lib/thunder.wav");
    let own = tmp.path().join("lib/wind.wav");
    let db = tmp.path().join("lib.sqlite");
    let other = tmp.path().join("other.sqlite");
    create_db(&db, &[Row::new(1, &shared), Row::new(2, &own)]);
    create_db(&other, &[Row::new(1, &tmp.path().join("elsewhere/thunder.wav"))]);

    let results = run(
        &db,
        vec![DetectorConfig::Dbcompare { db: Some(other) }],
        &Preferences::default(),
    );
    assert_eq!(results.removal_ids(), vec![1]);
    let flat = results.flat();
    assert!(flat.iter().find(|r| r.id == 1).unwrap().has(Algorithm::Compare));
}

#[test]
fn test_cancelled_search_reports_and_aborts() {
    let tmp = tempdir().unwrap();
    let mut rows_paths = Vec::new();
    for i in 0..4 {
        let path = tmp.path().join(format!("{}.wav", i));
        write_wav(&path, 1, 8_000, noise(i));
        rows_paths.push(path);
    }
    let rows: Vec<Row> = rows_paths
        .iter()
        .enumerate()
        .map(|(i, p)| Row::new(i as i64 + 1, p))
        .collect();
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &rows);

    let cancel = CancelToken::new();
    let recorder = Recorder {
        cancel_on_waveform: Some(cancel.clone()),
        ..Recorder::default()
    };
    let opts = SearchOptions {
        ignore_patterns: &[],
        decode_threads: 1,
        cancel: &cancel,
        reporter: &recorder,
    };
    let result = search(
        &Source::Database(db.clone()),
        &DetectorSet::new(vec![DetectorConfig::Waveform]),
        &Preferences::default(),
        &opts,
    );

    assert!(matches!(result, Err(Error::Aborted(SearchAborted::Cancelled))));
    let stages = recorder.stages(StatusChannel::Search);
    assert_eq!(stages.first().map(String::as_str), Some("starting"));
    assert_eq!(stages.last().map(String::as_str), Some("cancelled"));
}

#[test]
fn test_progress_stages_end_with_complete() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &tmp.path().join("a.wav"))]);

    let recorder = Recorder::default();
    let cancel = CancelToken::new();
    let opts = SearchOptions {
        ignore_patterns: &[],
        decode_threads: 1,
        cancel: &cancel,
        reporter: &recorder,
    };
    search(
        &Source::Database(db),
        &DetectorSet::new(vec![DetectorConfig::Basic]),
        &Preferences::default(),
        &opts,
    )
    .unwrap();

    let stages = recorder.stages(StatusChannel::Search);
    assert_eq!(stages.first().map(String::as_str), Some("starting"));
    assert!(stages.contains(&"dupes".to_string()));
    assert_eq!(stages.last().map(String::as_str), Some("complete"));
}

#[test]
fn test_file_system_search_through_companion() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("library");
    for dir in ["a", "b"] {
        let path = root.join(dir).join("ping.wav");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_wav(&path, 1, 4_800, noise(9));
    }
    std::fs::write(root.join("notes.txt"), "not audio").unwrap();

    let companion = Companion::new(Arc::new(SilentReporter));
    let groups = companion
        .search_file_system(
            DetectorSet::new(vec![DetectorConfig::Basic]),
            &Preferences::default(),
            vec![root],
        )
        .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[0].iter().filter(|r| r.is_kept()).count(), 1);
}

#[test]
fn test_cleared_fingerprints_are_recomputed() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a.wav");
    let b = tmp.path().join("b.wav");
    write_wav(&a, 1, 8_000, noise(4));
    write_wav(&b, 1, 8_000, noise(5));
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &a), Row::new(2, &b)]);

    let companion = Companion::new(Arc::new(SilentReporter));
    companion.open_db(&db, false).unwrap();
    let waveform = || DetectorSet::new(vec![DetectorConfig::Waveform]);
    companion.search_results(waveform(), &Preferences::default()).unwrap();
    let cached = text_column(&db, 1, "_fingerprint").unwrap();

    assert_eq!(companion.clear_fingerprints().unwrap(), 2);
    assert_eq!(text_column(&db, 1, "_fingerprint"), None);
    assert_eq!(text_column(&db, 2, "_fingerprint"), None);

    companion.search_results(waveform(), &Preferences::default()).unwrap();
    assert_eq!(text_column(&db, 1, "_fingerprint"), Some(cached));
}

#[test]
fn test_safe_folders_are_never_loaded() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("work/door.wav");
    let b = tmp.path().join("masters/door.wav");
    let db = tmp.path().join("lib.sqlite");
    create_db(&db, &[Row::new(1, &a), Row::new(2, &b)]);

    let pref = Preferences {
        safe_folders: vec![tmp.path().join("masters")],
        ..Preferences::default()
    };
    let results = run(&db, vec![DetectorConfig::Basic], &pref);
    assert!(results.clusters().is_empty());
    assert_eq!(ids(&results.flat()), vec![1]);
}
