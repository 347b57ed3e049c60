//! End-to-end pipeline tests
//!
//! Exercise the whole flow a user sees: load a playlist, load XMLTV guide
//! sources from disk, run the tiered matcher, and verify the annotated
//! playlist and reports written to the results directory.

use std::path::PathBuf;
use tempfile::TempDir;

use epg_matcher::config::{Config, TierToggles};
use epg_matcher::models::{GuideSource, RunOutcome};
use epg_matcher::service::RunConfig;
use epg_matcher::MatcherService;

const GUIDE_UK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="bbc1.uk">
    <display-name>BBC One</display-name>
  </channel>
  <channel id="bbc2.uk">
    <display-name>BBC Two</display-name>
  </channel>
  <channel id="cmax.us">
    <display-name>Cinemax</display-name>
  </channel>
</tv>"#;

const GUIDE_CN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="cctv1.cn">
    <display-name>CCTV1</display-name>
  </channel>
</tv>"#;

const PLAYLIST: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-id=\"bbc1.uk\" tvg-name=\"BBC One\",BBC One UK\n\
http://example.com/bbc1\n\
#EXTINF:-1 tvg-name=\"bbc2.uk\",BBC Two Backup\n\
http://example.com/bbc2\n\
#EXTINF:-1,BBC Two\n\
http://example.com/bbc2b\n\
#EXTINF:-1,CCTV-1 \u{9ad8}\u{6e05}\n\
http://example.com/cctv1\n\
#EXTINF:-1,Cinemax 2\n\
http://example.com/cmax2\n\
#EXTINF:-1,Totally Unknown Channel\n\
http://example.com/unknown\n";

struct Fixture {
    _tmp: TempDir,
    service: MatcherService,
    playlist_path: PathBuf,
    sources: Vec<GuideSource>,
    results_dir: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let playlist_path = tmp.path().join("channels.m3u");
    std::fs::write(&playlist_path, PLAYLIST).unwrap();

    let uk = tmp.path().join("uk.xml");
    std::fs::write(&uk, GUIDE_UK).unwrap();
    let cn = tmp.path().join("cn.xml");
    std::fs::write(&cn, GUIDE_CN).unwrap();

    let results_dir = tmp.path().join("results");
    let mut config = Config::default();
    config.cache.dir = tmp.path().join("cache");
    config.output.results_dir = results_dir.clone();

    Fixture {
        service: MatcherService::new(config).unwrap(),
        playlist_path,
        sources: vec![GuideSource::File(uk), GuideSource::File(cn)],
        results_dir,
        _tmp: tmp,
    }
}

async fn run_to_completion(fixture: &mut Fixture, run: RunConfig) -> RunOutcome {
    fixture
        .service
        .load_playlist(&fixture.playlist_path)
        .unwrap();
    let mut rx = fixture.service.start(run).unwrap();
    loop {
        match rx.recv().await.expect("stream ended without Done") {
            epg_matcher::models::RunEvent::Done(outcome) => return outcome,
            _ => {}
        }
    }
}

#[tokio::test]
async fn pipeline_matches_across_tiers_and_sources() {
    let mut fixture = fixture();
    let run = RunConfig {
        sources: fixture.sources.clone(),
        tiers: TierToggles::default(),
        workers: 4,
        fuzzy_threshold: 0.8,
    };
    let outcome = run_to_completion(&mut fixture, run).await;

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completed run, got {outcome:?}");
    };

    assert_eq!(summary.total_entries, 6);
    // BBC One UK by tvg-id, BBC Two Backup by tvg-name (id-as-name), BBC Two
    // by display name, CCTV by normalized name, Cinemax 2 by fuzzy
    assert_eq!(summary.matched_entries, 5);
    assert_eq!(
        summary.unmatched_names,
        vec!["Totally Unknown Channel".to_string()]
    );
    assert_eq!(summary.guide_channels, 4);
    assert_eq!(summary.sources_loaded, 2);

    let tier_of = |label: &str| {
        summary
            .tier_counts
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap()
    };
    assert_eq!(tier_of("tvg-id match"), 1);
    assert_eq!(tier_of("tvg-name match"), 1);
    assert_eq!(tier_of("display-name match"), 1);
    assert_eq!(tier_of("normalized match"), 1);
    assert_eq!(tier_of("fuzzy match"), 1);
    assert_eq!(tier_of("unmatched"), 1);
}

#[tokio::test]
async fn annotated_playlist_preserves_structure() {
    let mut fixture = fixture();
    let run = RunConfig {
        sources: fixture.sources.clone(),
        tiers: TierToggles::default(),
        workers: 2,
        fuzzy_threshold: 0.8,
    };
    let RunOutcome::Completed(summary) = run_to_completion(&mut fixture, run).await else {
        panic!("run did not complete");
    };

    let written = std::fs::read_to_string(summary.playlist_path.unwrap()).unwrap();
    let original_lines: Vec<&str> = PLAYLIST.lines().collect();
    let written_lines: Vec<&str> = written.lines().collect();
    assert_eq!(written_lines.len(), original_lines.len());

    // Header and stream URLs are byte-for-byte identical
    assert_eq!(written_lines[0], original_lines[0]);
    for (original, rewritten) in original_lines.iter().zip(&written_lines) {
        if original.starts_with("http://") {
            assert_eq!(original, rewritten);
        }
    }

    assert!(written.contains("BBC One UK [matched: uk.xml]"));
    assert!(written.contains("CCTV-1 \u{9ad8}\u{6e05} [matched: cn.xml]"));
    assert!(written.contains("Totally Unknown Channel\n"));

    let csv = std::fs::read_to_string(summary.csv_path.unwrap()).unwrap();
    assert!(csv.starts_with('\u{feff}'));
    // Header plus one row per entry
    assert_eq!(csv.lines().count(), 7);

    let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert!(report.contains("Matched: 5"));
    assert!(report.contains("Totally Unknown Channel"));
}

#[tokio::test]
async fn disabling_tiers_changes_the_outcome() {
    let mut fixture = fixture();
    let run = RunConfig {
        sources: fixture.sources.clone(),
        tiers: TierToggles {
            tvg_id: true,
            tvg_name: false,
            display_name: false,
            normalized: false,
            fuzzy: false,
        },
        workers: 2,
        fuzzy_threshold: 0.8,
    };
    let RunOutcome::Completed(summary) = run_to_completion(&mut fixture, run).await else {
        panic!("run did not complete");
    };

    // Only the entry with a resolvable tvg-id survives
    assert_eq!(summary.matched_entries, 1);
    assert_eq!(summary.unmatched_names.len(), 5);
}

#[tokio::test]
async fn gzipped_guides_load_transparently() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut fixture = fixture();
    let gz_path = fixture.results_dir.parent().unwrap().join("uk.xml.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(GUIDE_UK.as_bytes()).unwrap();
    std::fs::write(&gz_path, encoder.finish().unwrap()).unwrap();

    let run = RunConfig {
        sources: vec![GuideSource::File(gz_path)],
        tiers: TierToggles::default(),
        workers: 2,
        fuzzy_threshold: 0.8,
    };
    let RunOutcome::Completed(summary) = run_to_completion(&mut fixture, run).await else {
        panic!("run did not complete");
    };
    assert_eq!(summary.guide_channels, 3);
    assert!(summary.matched_entries >= 3);
}
