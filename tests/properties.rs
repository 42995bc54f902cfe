//! Property tests over arbitrary profiles and toggle sequences.

use std::collections::BTreeSet;

use guide_directory::{
    DirectoryError, DraftProfile, FeeBucket, FilterQuery, GuideDirectory, GuideId, GuideProfile,
    PhotoRef, COMPARE_CAPACITY,
};
use proptest::prelude::*;

fn word() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z ]{0,11}"
}

fn photo() -> impl Strategy<Value = Option<PhotoRef>> {
    prop_oneof![
        Just(None),
        "[a-z]{1,8}".prop_map(|name| Some(PhotoRef::from_uri(format!("photos/{name}.jpg")))),
        prop::collection::vec(any::<u8>(), 0..64)
            .prop_map(|bytes| Some(PhotoRef::inline("image/png", &bytes))),
    ]
}

fn draft() -> impl Strategy<Value = DraftProfile> {
    (
        (word(), word(), word(), word()),
        prop::collection::btree_set(word(), 0..4),
        prop::collection::btree_set(word(), 0..4),
        0u64..50_000,
        ".{0,80}",
        photo(),
    )
        .prop_map(
            |((name, username, email, location), languages, specialties, fee, bio, photo)| {
                let mut draft = DraftProfile::new(GuideId::generate())
                    .with_display_name(name)
                    .with_username(username)
                    .with_email(email)
                    .with_location(location)
                    .with_session_fee(fee)
                    .with_bio(bio);
                draft.languages = languages;
                draft.specialties = specialties;
                draft.profile_photo_ref = photo;
                draft
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    #[test]
    fn committed_profiles_round_trip(draft in draft(), rating in 0.0f64..5.0, reviews in 0u32..500) {
        let directory = GuideDirectory::in_memory().unwrap();
        let committed = directory.commit_profile(draft).unwrap();

        let mut rated = committed.clone();
        rated.rating = rating;
        rated.review_count = reviews;
        rated.verified = true;
        let json = serde_json::to_string(&rated).unwrap();
        let back: GuideProfile = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &rated);

        let stored = directory.get_guide(&committed.id).unwrap();
        prop_assert_eq!(&stored, &committed);
        prop_assert_eq!(&directory.list_guides()[0], &committed);
    }

    #[test]
    fn toggling_twice_restores_selection(seed in prop::collection::vec(0usize..6, 0..6), target in 0usize..6) {
        let directory = GuideDirectory::in_memory().unwrap();
        let id = |n: usize| GuideId::from(format!("g{n}"));

        for n in seed {
            directory.toggle_bookmark(&id(n)).unwrap();
            let _ = directory.toggle_compare(&id(n));
        }
        let bookmarks: BTreeSet<_> = directory.bookmarks().unwrap().into_iter().collect();
        let compared = directory.compared().unwrap();

        directory.toggle_bookmark(&id(target)).unwrap();
        directory.toggle_bookmark(&id(target)).unwrap();
        let after: BTreeSet<_> = directory.bookmarks().unwrap().into_iter().collect();
        prop_assert_eq!(after, bookmarks);

        match directory.toggle_compare(&id(target)) {
            Ok(_) => {
                directory.toggle_compare(&id(target)).unwrap();
                let restored: BTreeSet<_> = directory.compared().unwrap().into_iter().collect();
                let original: BTreeSet<_> = compared.iter().cloned().collect();
                prop_assert_eq!(restored, original);
            }
            Err(DirectoryError::CapacityExceeded { capacity }) => {
                prop_assert_eq!(capacity, COMPARE_CAPACITY);
                prop_assert_eq!(directory.compared().unwrap(), compared);
            }
            Err(e) => prop_assert!(false, "unexpected error {}", e),
        }
        prop_assert!(directory.compared().unwrap().len() <= COMPARE_CAPACITY);
    }

    #[test]
    fn fee_filter_agrees_with_bucket_bounds(fees in prop::collection::vec(0u64..40_000, 1..8), pick in 0usize..5) {
        let directory = GuideDirectory::in_memory().unwrap();
        for (i, fee) in fees.iter().enumerate() {
            let draft = directory.begin_draft().unwrap()
                .with_display_name(format!("G{i}"))
                .with_session_fee(*fee);
            directory.commit_profile(draft).unwrap();
        }

        let bucket = FeeBucket::ALL[pick];
        let hits = directory.apply_filter(&FilterQuery::new().with_fee_bucket(bucket));
        let expected = fees.iter().filter(|fee| bucket.contains(**fee)).count();
        prop_assert_eq!(hits.len(), expected);
        prop_assert!(hits.iter().all(|p| bucket.contains(p.session_fee)));
    }
}

#[test]
fn tokyo_and_osaka_under_six_thousand() {
    let directory = GuideDirectory::in_memory().unwrap();
    for (name, location, fee) in [("Hanako", "Tokyo", 6000), ("Ken", "Osaka", 12000)] {
        let draft = directory
            .begin_draft()
            .unwrap()
            .with_display_name(name)
            .with_location(location)
            .with_session_fee(fee);
        directory.commit_profile(draft).unwrap();
    }

    let query = FilterQuery::new().with_fee_bucket("≤6000".parse().unwrap());
    let hits = directory.apply_filter(&query);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].location, "Tokyo");
}

#[test]
fn full_compare_list_rejects_a_fourth() {
    let directory = GuideDirectory::in_memory().unwrap();
    for id in ["a", "b", "c"] {
        directory.toggle_compare(&GuideId::from(id)).unwrap();
    }
    let before = directory.compared().unwrap();

    let err = directory.toggle_compare(&GuideId::from("d")).unwrap_err();
    assert_eq!(err, DirectoryError::CapacityExceeded { capacity: 3 });
    assert_eq!(directory.compared().unwrap(), before);
    assert_eq!(directory.get_selection_counts().unwrap().compared, 3);
}
