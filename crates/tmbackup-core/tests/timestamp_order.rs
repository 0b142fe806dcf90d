use proptest::prelude::*;
use tmbackup_core::snapshot::{parse_listing, Timestamp};

fn timestamp_strategy() -> impl Strategy<Value = String> {
    (1970u32..=2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
        |(year, month, day, hour, minute, second)| {
            format!("{year:04}-{month:02}-{day:02}-{hour:02}{minute:02}{second:02}")
        },
    )
}

proptest! {
    #[test]
    fn lexical_order_matches_chronological_order(
        a in timestamp_strategy(),
        b in timestamp_strategy(),
    ) {
        let ta = Timestamp::parse(&a).unwrap();
        let tb = Timestamp::parse(&b).unwrap();
        let da = ta.to_datetime().unwrap();
        let db = tb.to_datetime().unwrap();
        prop_assert_eq!(ta.cmp(&tb), da.cmp(&db));
        prop_assert_eq!(a.cmp(&b), da.cmp(&db));
    }

    #[test]
    fn sorted_listing_is_chronological(names in prop::collection::vec(timestamp_strategy(), 0..20)) {
        let listing: String = names
            .iter()
            .map(|n| format!("drwxr-xr-x 4,096 2020/01/01 00:00:00 {n}\n"))
            .collect();
        let parsed = parse_listing(&listing);
        let dates: Vec<_> = parsed.iter().map(|t| t.to_datetime().unwrap()).collect();
        prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }
}
