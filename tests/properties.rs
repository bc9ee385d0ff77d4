//! Property tests for identifier derivation and the query layer.

use chrono::{TimeZone, Utc};
use observation_store::{derive_image_id, query, Observation, ObservationId};
use proptest::prelude::*;
use uuid::Uuid;

fn observation(species: String, behavior: String, timestamp: i64, favorite: bool) -> Observation {
    let mut obs = Observation::new();
    obs.species = species;
    obs.behavior = behavior;
    obs.date = Utc.timestamp_opt(timestamp, 0).unwrap();
    obs.is_favorite = favorite;
    obs
}

fn arb_observations() -> impl Strategy<Value = Vec<Observation>> {
    prop::collection::vec(
        (
            "[A-Ca-c]{0,3}",
            "[a-z ]{0,6}",
            0i64..4_000_000_000,
            any::<bool>(),
        )
            .prop_map(|(s, b, t, f)| observation(s, b, t, f)),
        0..40,
    )
}

proptest! {
    #[test]
    fn derived_id_is_deterministic(bytes in any::<[u8; 16]>(), slot in 0usize..10_000) {
        let id = ObservationId(Uuid::from_bytes(bytes));
        prop_assert_eq!(derive_image_id(id, slot), derive_image_id(id, slot));
    }

    #[test]
    fn derived_ids_differ_across_slots(
        bytes in any::<[u8; 16]>(),
        a in 0usize..10_000,
        b in 0usize..10_000,
    ) {
        prop_assume!(a != b);
        let id = ObservationId(Uuid::from_bytes(bytes));
        prop_assert_ne!(derive_image_id(id, a), derive_image_id(id, b));
    }

    #[test]
    fn empty_search_is_identity(observations in arb_observations()) {
        prop_assert_eq!(query::search(&observations, ""), observations);
    }

    #[test]
    fn search_results_contain_query(observations in arb_observations(), q in "[A-Ca-c]{1,2}") {
        let found = query::search(&observations, &q);
        prop_assert!(found.len() <= observations.len());
        for obs in &found {
            prop_assert!(
                obs.species.contains(q.as_str())
                    || obs.behavior.contains(q.as_str())
                    || obs.habits.contains(q.as_str())
            );
        }
    }

    #[test]
    fn favorites_are_all_favorite(observations in arb_observations()) {
        let favorites = query::favorites(&observations);
        prop_assert!(favorites.iter().all(|o| o.is_favorite));
        prop_assert_eq!(
            favorites.len(),
            observations.iter().filter(|o| o.is_favorite).count()
        );
    }

    #[test]
    fn histogram_accounts_for_every_observation(observations in arb_observations()) {
        let histogram = query::monthly_histogram(&observations, &Utc);
        prop_assert_eq!(histogram.buckets().len(), 12);
        prop_assert_eq!(histogram.total(), observations.len());
        prop_assert!(histogram.scale_max() >= 1);
    }

    #[test]
    fn top_species_sorted_and_bounded(observations in arb_observations()) {
        let top = query::top_species(&observations, query::TOP_SPECIES_LIMIT);
        prop_assert!(top.len() <= query::TOP_SPECIES_LIMIT);
        prop_assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
        for entry in &top {
            let actual = observations.iter().filter(|o| o.species == entry.species).count();
            prop_assert_eq!(entry.count, actual);
        }
    }
}
