//! Durable-store ceiling: compaction near full, rejection when nothing
//! can be reclaimed.

mod support;

use guide_directory::storage::keys;
use guide_directory::{
    DirectoryConfig, DirectoryError, GuideDirectory, KeyValueStore, PhotoRef, SponsorEntry,
    StorageRecord,
};
use std::sync::{Arc, Barrier};
use std::thread;
use support::{guide_draft, Browser, START_MS};

const QUOTA: u64 = 20_000;
const DAY_MS: u64 = 24 * 60 * 60 * 1000;

fn tight_browser() -> Browser {
    Browser::with_config(DirectoryConfig {
        quota_bytes: QUOTA,
        max_record_bytes: QUOTA,
        photo_max_bytes: 200,
        poll_interval_ms: 20,
        ..DirectoryConfig::default()
    })
}

/// Bring the store to exactly `target` bytes with an opaque record that
/// compaction cannot touch.
fn pad_to(browser: &Browser, target: u64) {
    let usage = browser.store.usage().unwrap();
    let key = "pagePadding";
    let fill = target - usage - key.len() as u64;
    browser
        .store
        .put(StorageRecord::new(key, "x".repeat(fill as usize), 0))
        .unwrap();
    assert_eq!(browser.store.usage().unwrap(), target);
}

/// Sponsor entries written by another page, straight into the store.
fn seed_sponsors(browser: &Browser, count: usize) {
    for i in 0..count {
        let entry = SponsorEntry::new(format!("s{i}"), format!("Shop {i}"))
            .with_description("Family-run since 1962")
            .with_main_image(PhotoRef::inline("image/jpeg", &vec![7u8; 1500]));
        browser
            .store
            .put(StorageRecord::new(
                keys::sponsor(&entry.id),
                serde_json::to_string(&entry).unwrap(),
                START_MS,
            ))
            .unwrap();
    }
}

#[test]
fn compacts_at_ninety_five_percent_and_commits() {
    let browser = tight_browser();
    let directory = browser.open("writer");
    seed_sponsors(&browser, 6);
    pad_to(&browser, QUOTA * 95 / 100);

    let draft = guide_draft(&directory, "Hanako", "Tokyo", 6000).with_bio("b".repeat(1500));
    let committed = directory.commit_profile(draft).unwrap();

    assert!(directory.usage().unwrap() <= QUOTA);
    assert_eq!(directory.get_guide(&committed.id).unwrap(), committed);

    let sponsors = directory.sponsors();
    let reduced: Vec<_> = (0..6)
        .filter_map(|i| sponsors.get(&format!("s{i}")).unwrap())
        .filter_map(|entry| entry.main_image)
        .filter(|photo| photo.reduced)
        .collect();
    assert!(!reduced.is_empty());
    assert!(reduced.iter().all(|photo| photo.original_bytes == Some(1500)));
}

#[test]
fn rejects_without_partial_commit_when_full_of_guides() {
    let browser = tight_browser();
    let directory = browser.open("writer");

    let mut rejected = None;
    for i in 0..40 {
        let draft = guide_draft(&directory, &format!("Guide{i}"), "Sapporo", 9000)
            .with_bio("b".repeat(1200));
        let id = draft.id.clone();
        match directory.commit_profile(draft) {
            Ok(_) => {}
            Err(e) => {
                rejected = Some((id, e));
                break;
            }
        }
    }

    let (id, err) = rejected.expect("store never filled up");
    assert!(matches!(err, DirectoryError::QuotaExceeded { .. }));
    assert!(err.is_user_facing());
    assert!(directory.usage().unwrap() <= QUOTA);
    assert!(browser.store.get(&keys::guide(id.as_str())).unwrap().is_none());

    let stored_guides = browser
        .store
        .keys()
        .unwrap()
        .iter()
        .filter(|k| k.starts_with(keys::GUIDE_PREFIX))
        .count();
    assert_eq!(stored_guides, directory.list_guides().len());
    assert!(directory.get_guide(&id).is_err());
}

#[test]
fn stale_drafts_go_first() {
    let browser = tight_browser();
    let directory = browser.open("writer");

    let old = START_MS - 4 * DAY_MS;
    let draft_key = keys::draft("abandoned");
    browser
        .store
        .put(StorageRecord::new(&draft_key, "d".repeat(3000), old))
        .unwrap();
    browser
        .store
        .put(StorageRecord::new(keys::timestamp_for(&draft_key), old.to_string(), old))
        .unwrap();
    pad_to(&browser, QUOTA * 95 / 100);

    let draft = guide_draft(&directory, "Ken", "Osaka", 12000).with_bio("b".repeat(1500));
    directory.commit_profile(draft).unwrap();

    assert!(browser.store.get(&draft_key).unwrap().is_none());
    assert!(directory.usage().unwrap() <= QUOTA);
}

#[test]
fn oversized_record_is_rejected_outright() {
    let browser = Browser::with_config(DirectoryConfig {
        max_record_bytes: 2_000,
        ..DirectoryConfig::default()
    });
    let directory = browser.open("writer");

    let draft = guide_draft(&directory, "Verbose", "Fukuoka", 5000).with_bio("b".repeat(5000));
    let err = directory.commit_profile(draft).unwrap_err();
    assert!(matches!(err, DirectoryError::QuotaExceeded { .. }));
    assert!(directory.list_guides().is_empty());
}

#[test]
fn reduced_guide_photo_is_flagged_and_nothing_else_changes() {
    let browser = tight_browser();
    let directory = browser.open("writer");

    let draft = guide_draft(&directory, "Aiko", "Kyoto", 8000)
        .with_bio("Temple walks at dawn")
        .with_photo(PhotoRef::inline("image/png", &vec![3u8; 4000]));
    let committed = directory.commit_profile(draft).unwrap();
    pad_to(&browser, 19_000);

    let next = guide_draft(&directory, "Daichi", "Nara", 7000).with_bio("b".repeat(1500));
    directory.commit_profile(next).unwrap();
    assert!(directory.usage().unwrap() <= QUOTA);

    let stored = directory.get_guide(&committed.id).unwrap();
    let photo = stored.profile_photo_ref.clone().expect("photo kept");
    assert!(photo.reduced);
    assert_eq!(photo.original_bytes, Some(4000));
    assert!(photo.inline_len() < 4000);

    let mut expected = committed.clone();
    expected.profile_photo_ref = Some(photo);
    assert_eq!(stored, expected);
}

#[test]
fn concurrent_contexts_never_overshoot_the_ceiling() {
    const CEILING: u64 = 3_000;
    let browser = Browser::with_config(DirectoryConfig {
        quota_bytes: CEILING,
        max_record_bytes: CEILING,
        poll_interval_ms: 20,
        ..DirectoryConfig::default()
    });
    let tabs = [browser.open("tab-a"), browser.open("tab-b")];
    let writers: Vec<GuideDirectory> = tabs.iter().chain(tabs.iter()).cloned().collect();
    let barrier = Arc::new(Barrier::new(writers.len()));

    for round in 0..300 {
        let handles: Vec<_> = writers
            .iter()
            .cloned()
            .enumerate()
            .map(|(n, directory)| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    directory
                        .storage()
                        .put(&format!("upload{n}"), "x".repeat(2_000))
                        .map(|_| ())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let usage = browser.store.usage().unwrap();
        assert!(usage <= CEILING, "round {round}: usage {usage} over {CEILING}");
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {round}");
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DirectoryError::QuotaExceeded { .. })));

        for n in 0..writers.len() {
            browser.store.delete(&format!("upload{n}")).unwrap();
        }
    }
}
